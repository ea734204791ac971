//! Scene loading from JSON scene documents.

use super::RawScene;
use crate::types::CoordinateAxes;
use glam::{DMat3, DMat4, DVec3};
use std::path::Path;

/// Normalization requested from a scene loader.
///
/// The flattener always passes [`LoadOptions::fixed`]; callers can't change
/// the target axes or unit scale.
///
/// `generate_missing_normals` and `normalize_tangents` are hints for loaders
/// whose parser can act on them. [`JsonSceneLoader`] ignores both: documents
/// carry no tangents, and faces without normals already get flat normals
/// from the vertex emitter, which also reports them through
/// `MeshPartInfo::has_normals`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Hint: faces without source normals get a flat face normal.
    pub generate_missing_normals: bool,
    /// Rescale source normals to unit length.
    pub normalize_normals: bool,
    /// Hint: rescale source tangents to unit length.
    pub normalize_tangents: bool,
    /// Keep the 4th component of vertex attributes (color alpha).
    pub retain_vertex_w: bool,
    pub target_axes: CoordinateAxes,
    pub target_unit_meters: f64,
}

impl LoadOptions {
    /// The non-negotiable normalization policy.
    pub fn fixed() -> Self {
        Self {
            generate_missing_normals: true,
            normalize_normals: true,
            normalize_tangents: true,
            retain_vertex_w: true,
            target_axes: CoordinateAxes::RIGHT_HANDED_Y_UP,
            target_unit_meters: 1.0,
        }
    }
}

/// The external scene parser.
///
/// Implementations return a validated [`RawScene`] with evaluated transforms,
/// or a human-readable reason on failure.
pub trait SceneLoader {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<RawScene, String>;
}

/// Loads scene documents serialized as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSceneLoader;

impl SceneLoader for JsonSceneLoader {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<RawScene, String> {
        let data = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => format!("File not found: {}", path.display()),
            _ => format!("Failed to read {}: {}", path.display(), e),
        })?;
        load_from_bytes(&data, options)
    }
}

/// Parse and normalize a JSON scene document held in memory.
pub fn load_from_bytes(data: &[u8], options: &LoadOptions) -> Result<RawScene, String> {
    let mut scene: RawScene =
        serde_json::from_slice(data).map_err(|e| format!("Invalid scene document: {}", e))?;
    normalize_scene(&mut scene, options)?;
    Ok(scene)
}

/// Validate `scene` and bring it into the convention requested by `options`.
pub fn normalize_scene(scene: &mut RawScene, options: &LoadOptions) -> Result<(), String> {
    scene.validate()?;

    if !(scene.unit_meters.is_finite() && scene.unit_meters > 0.0) {
        return Err(format!("Invalid unit scale: {}", scene.unit_meters));
    }
    let axes = scene
        .axes
        .conversion_to(&options.target_axes)
        .ok_or_else(|| format!("Invalid axis convention: {:?}", scene.axes))?;
    let unit_scale = scene.unit_meters / options.target_unit_meters;
    let root = DMat4::from_mat3(axes * DMat3::from_diagonal(DVec3::splat(unit_scale)));
    scene.evaluate_transforms(root)?;

    for mesh in &mut scene.meshes {
        if options.normalize_normals {
            if let Some(normals) = &mut mesh.vertex_normal {
                for n in &mut normals.values {
                    *n = DVec3::from(*n).normalize_or_zero().to_array();
                }
            }
        }
        if !options.retain_vertex_w {
            if let Some(colors) = &mut mesh.vertex_color {
                for c in &mut colors.values {
                    c[3] = 1.0;
                }
            }
        }
    }

    scene.axes = options.target_axes;
    scene.unit_meters = options.target_unit_meters;
    Ok(())
}
