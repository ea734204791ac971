//! Flattened, renderer-ready scene output.
//!
//! [`ExportScene`] owns one [`ResolvedMaterial`] per source material and one
//! [`MeshPartInfo`] per material partition of every mesh node. Every buffer is
//! an independent copy; the raw graph is retained only until teardown.

use crate::scene::RawScene;
use crate::types::{BoundingBox, CoordinateAxis};
use std::mem;
use std::path::{Path, PathBuf};

/// A resolved texture: a path, embedded bytes, both, or neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureReference {
    /// Source path (filename, else relative, else absolute filename).
    pub path: Option<String>,
    /// Embedded image bytes, undecoded. `None` unless non-empty.
    pub content: Option<Vec<u8>>,
}

impl TextureReference {
    /// An empty reference (no texture).
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns `true` if there is neither a path nor content.
    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.content.is_none()
    }

    /// Length in bytes of the embedded content, 0 if none.
    pub fn content_len(&self) -> usize {
        self.content.as_ref().map_or(0, Vec::len)
    }
}

/// One material with its shading workflow already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMaterial {
    pub name: Option<String>,
    /// RGB premultiplied by the base factor, plus alpha.
    pub base_color: [f32; 4],
    /// RGB premultiplied by the emission factor.
    pub emissive: [f32; 3],
    pub metallic: f32,
    pub roughness: f32,
    pub double_sided: bool,
    pub base_color_texture: TextureReference,
    pub normal_texture: TextureReference,
    pub emissive_texture: TextureReference,
}

impl ResolvedMaterial {
    /// The synthetic white, fully rough material used when a scene has none.
    pub fn default_white() -> Self {
        Self {
            name: None,
            base_color: [1.0, 1.0, 1.0, 1.0],
            emissive: [0.0, 0.0, 0.0],
            metallic: 0.0,
            roughness: 1.0,
            double_sided: false,
            base_color_texture: TextureReference::none(),
            normal_texture: TextureReference::none(),
            emissive_texture: TextureReference::none(),
        }
    }

    /// Returns `true` if the material needs alpha blending.
    pub fn is_transparent(&self) -> bool {
        self.base_color[3] < 1.0
    }

    fn clear(&mut self) {
        self.name = None;
        self.base_color_texture = TextureReference::none();
        self.normal_texture = TextureReference::none();
        self.emissive_texture = TextureReference::none();
    }
}

impl Default for ResolvedMaterial {
    fn default() -> Self {
        Self::default_white()
    }
}

/// Triangle-list geometry for one material partition of a mesh node.
///
/// Every triangle is three unshared vertices; there is no index buffer.
/// Positions and normals are in world space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshPartInfo {
    /// Name of the owning node.
    pub name: Option<String>,
    /// Index into [`ExportScene::materials`].
    pub material_index: u32,
    pub positions: Vec<[f32; 3]>,
    /// Unit-length normals.
    pub normals: Vec<[f32; 3]>,
    /// Texture coordinates with a top-left origin.
    pub uvs: Vec<[f32; 2]>,
    /// RGBA vertex colors, opaque white when the source has none.
    pub colors: Vec<[f32; 4]>,
    /// Normals came from the source rather than flat face normals.
    pub has_normals: bool,
    /// UVs came from the source rather than the (0, 0) default.
    pub has_uvs: bool,
    /// Colors came from the source rather than the white default.
    pub has_colors: bool,
}

impl MeshPartInfo {
    /// Create an empty part.
    pub fn new(name: Option<String>, material_index: u32) -> Self {
        Self {
            name,
            material_index,
            ..Default::default()
        }
    }

    /// Returns `true` if this part contains no vertices.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of vertices in this part (always a multiple of 3).
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles in this part.
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Get positions as a flat array.
    pub fn positions_flat(&self) -> Vec<f32> {
        self.positions.iter().flat_map(|p| p.iter().copied()).collect()
    }

    /// Get normals as a flat array.
    pub fn normals_flat(&self) -> Vec<f32> {
        self.normals.iter().flat_map(|n| n.iter().copied()).collect()
    }

    /// Get UVs as a flat array.
    pub fn uvs_flat(&self) -> Vec<f32> {
        self.uvs.iter().flat_map(|uv| uv.iter().copied()).collect()
    }

    /// Get colors as a flat array.
    pub fn colors_flat(&self) -> Vec<f32> {
        self.colors.iter().flat_map(|c| c.iter().copied()).collect()
    }

    /// Raw bytes of the positions array. Zero-allocation view.
    pub fn positions_bytes(&self) -> &[u8] {
        cast_slice(&self.positions)
    }

    /// Raw bytes of the normals array. Zero-allocation view.
    pub fn normals_bytes(&self) -> &[u8] {
        cast_slice(&self.normals)
    }

    /// Raw bytes of the UVs array. Zero-allocation view.
    pub fn uvs_bytes(&self) -> &[u8] {
        cast_slice(&self.uvs)
    }

    /// Raw bytes of the colors array. Zero-allocation view.
    pub fn colors_bytes(&self) -> &[u8] {
        cast_slice(&self.colors)
    }

    fn clear(&mut self) {
        self.name = None;
        self.positions = Vec::new();
        self.normals = Vec::new();
        self.uvs = Vec::new();
        self.colors = Vec::new();
    }
}

/// Cast a slice of `T` to a byte slice without allocation.
pub(crate) fn cast_slice<T: Copy>(slice: &[T]) -> &[u8] {
    let ptr = slice.as_ptr() as *const u8;
    let len = mem::size_of_val(slice);
    // SAFETY: only used with [f32; N], which has no padding.
    unsafe { std::slice::from_raw_parts(ptr, len) }
}

/// The flattened scene.
///
/// `materials` is never empty for a freshly loaded scene; every part's
/// `material_index` is a valid index into it.
#[derive(Debug)]
pub struct ExportScene {
    materials: Vec<ResolvedMaterial>,
    parts: Vec<MeshPartInfo>,
    right_axis: CoordinateAxis,
    up_axis: CoordinateAxis,
    raw: Option<Box<RawScene>>,
    /// Directory relative texture paths are resolved against.
    source_dir: Option<PathBuf>,
}

impl ExportScene {
    pub(crate) fn new(
        materials: Vec<ResolvedMaterial>,
        parts: Vec<MeshPartInfo>,
        right_axis: CoordinateAxis,
        up_axis: CoordinateAxis,
        raw: RawScene,
    ) -> Self {
        Self {
            materials,
            parts,
            right_axis,
            up_axis,
            raw: Some(Box::new(raw)),
            source_dir: None,
        }
    }

    /// Resolve relative texture paths against `dir` on export.
    ///
    /// [`Flattener::load`](crate::Flattener::load) sets this to the directory
    /// of the loaded document.
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    pub fn materials(&self) -> &[ResolvedMaterial] {
        &self.materials
    }

    pub fn parts(&self) -> &[MeshPartInfo] {
        &self.parts
    }

    pub fn right_axis(&self) -> CoordinateAxis {
        self.right_axis
    }

    pub fn up_axis(&self) -> CoordinateAxis {
        self.up_axis
    }

    /// The source graph, until the scene is released.
    pub fn raw(&self) -> Option<&RawScene> {
        self.raw.as_deref()
    }

    /// The material a part is drawn with.
    pub fn material_for(&self, part: &MeshPartInfo) -> Option<&ResolvedMaterial> {
        self.materials.get(part.material_index as usize)
    }

    /// Total vertex count across all parts.
    pub fn total_vertices(&self) -> usize {
        self.parts.iter().map(MeshPartInfo::vertex_count).sum()
    }

    /// Total triangle count across all parts.
    pub fn total_triangles(&self) -> usize {
        self.parts.iter().map(MeshPartInfo::triangle_count).sum()
    }

    /// World-space bounds of every emitted vertex.
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(
            self.parts
                .iter()
                .flat_map(|part| part.positions.iter().copied()),
        )
    }

    /// Returns `true` if no part has any vertices.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(MeshPartInfo::is_empty)
    }

    /// Release every owned buffer and the retained raw graph.
    ///
    /// Idempotent; dropping the scene has the same effect.
    pub fn release(&mut self) {
        for material in &mut self.materials {
            material.clear();
        }
        for part in &mut self.parts {
            part.clear();
        }
        self.materials = Vec::new();
        self.parts = Vec::new();
        self.raw = None;
    }

    /// Returns `true` once [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.raw.is_none()
    }
}

/// Tear down a scene if there is one; `None` is a no-op.
pub fn release_scene(scene: Option<ExportScene>) {
    if let Some(mut scene) = scene {
        scene.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_part() -> MeshPartInfo {
        MeshPartInfo {
            name: Some("tri".to_string()),
            material_index: 0,
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            uvs: vec![[0.0, 1.0], [1.0, 1.0], [0.0, 0.0]],
            colors: vec![[1.0, 1.0, 1.0, 1.0]; 3],
            has_normals: true,
            has_uvs: true,
            has_colors: false,
        }
    }

    fn scene_with(parts: Vec<MeshPartInfo>) -> ExportScene {
        ExportScene::new(
            vec![ResolvedMaterial::default_white()],
            parts,
            CoordinateAxis::PositiveX,
            CoordinateAxis::PositiveY,
            RawScene::new(),
        )
    }

    #[test]
    fn test_part_bytes_zero_alloc() {
        let part = triangle_part();
        assert_eq!(part.positions_bytes().len(), 36); // 3 * 3 * 4 bytes
        assert_eq!(part.normals_bytes().len(), 36);
        assert_eq!(part.uvs_bytes().len(), 24);
        assert_eq!(part.colors_bytes().len(), 48);
        assert_eq!(part.positions_flat().len(), 9);
        assert_eq!(part.colors_flat().len(), 12);
    }

    #[test]
    fn test_scene_counts() {
        let scene = scene_with(vec![triangle_part(), MeshPartInfo::new(None, 0)]);
        assert_eq!(scene.total_vertices(), 3);
        assert_eq!(scene.total_triangles(), 1);
        assert!(!scene.is_empty());
        assert_eq!(scene.right_axis().code(), 0);
        assert_eq!(scene.up_axis().code(), 2);
        assert!(scene.material_for(&scene.parts()[0]).is_some());
        assert!(scene.source_dir().is_none());
        let bounds = scene.bounds().unwrap();
        assert_eq!(bounds.min, [0.0, 0.0, 0.0]);
        assert_eq!(bounds.max, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_source_dir() {
        let scene = scene_with(Vec::new()).with_source_dir("assets/level1");
        assert_eq!(scene.source_dir(), Some(Path::new("assets/level1")));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut scene = scene_with(vec![triangle_part()]);
        assert!(!scene.is_released());
        scene.release();
        assert!(scene.is_released());
        assert!(scene.parts().is_empty());
        assert!(scene.materials().is_empty());
        scene.release();
        assert!(scene.is_released());
    }

    #[test]
    fn test_release_scene_none_is_noop() {
        release_scene(None);
        release_scene(Some(scene_with(Vec::new())));
    }

    #[test]
    fn test_texture_reference() {
        let empty = TextureReference::none();
        assert!(empty.is_empty());
        assert_eq!(empty.content_len(), 0);
        let embedded = TextureReference {
            path: None,
            content: Some(vec![1, 2, 3]),
        };
        assert!(!embedded.is_empty());
        assert_eq!(embedded.content_len(), 3);
    }
}
