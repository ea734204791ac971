//! glTF/GLB export.

use super::image::{encode_embedded, mime_from_path, EncodedImage};
use crate::error::{FlattenError, Result};
use crate::export_scene::{cast_slice, ExportScene, MeshPartInfo, ResolvedMaterial, TextureReference};
use crate::types::BoundingBox;
use glam::{Vec2, Vec3};
use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use log::{debug, warn};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Byte ranges of one part's attributes inside the BIN chunk.
struct PartOffsets {
    positions: usize,
    normals: usize,
    uvs: usize,
    colors: usize,
    tangents: usize,
    vertex_count: usize,
}

/// Where exported images are stored.
pub enum TextureMode<'a> {
    /// Inside the GLB's BIN chunk.
    Embed,
    /// In a shared directory, referenced by URI.
    External(&'a mut TextureCache),
}

/// A directory of image files shared by several GLB files.
///
/// Each distinct image is written once, named after its content hash.
#[derive(Debug)]
pub struct TextureCache {
    dir: PathBuf,
    uri_prefix: String,
    files: HashMap<u64, String>,
}

impl TextureCache {
    /// Store images in `dir`; GLB files reference them as `uri_prefix/<file>`.
    pub fn new(dir: impl Into<PathBuf>, uri_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            uri_prefix: uri_prefix.into(),
            files: HashMap::new(),
        }
    }

    /// Number of distinct images stored so far.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write `image` unless an identical one is already stored; returns its URI.
    fn store(&mut self, image: &EncodedImage) -> Result<String> {
        let hash = hash_bytes(&image.bytes);
        let ext = if image.mime_type == "image/png" { "png" } else { "jpg" };
        let filename = self
            .files
            .entry(hash)
            .or_insert_with(|| format!("tex_{hash:016x}.{ext}"))
            .clone();
        let path = self.dir.join(&filename);
        if !path.exists() {
            fs::write(&path, &image.bytes)?;
            debug!("Wrote texture {}", path.display());
        }
        let prefix = self.uri_prefix.trim_end_matches('/');
        Ok(if prefix.is_empty() {
            filename
        } else {
            format!("{}/{}", prefix, filename)
        })
    }
}

/// A glTF texture, by source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TextureKey {
    Content(u64),
    Uri(String),
}

/// What a texture reference turned into.
enum ImageSource {
    Encoded(EncodedImage),
    /// The file couldn't be read; reference it by path instead.
    Uri(String),
    Missing,
}

/// Images and textures collected while building materials.
struct TextureTable<'a> {
    base_dir: Option<&'a Path>,
    mode: TextureMode<'a>,
    images: Vec<json::Image>,
    textures: Vec<json::Texture>,
    alpha: Vec<bool>,
    by_key: HashMap<TextureKey, u32>,
    /// Embedded images waiting to be appended to the BIN chunk.
    pending: Vec<(usize, Vec<u8>)>,
}

impl<'a> TextureTable<'a> {
    fn new(base_dir: Option<&'a Path>, mode: TextureMode<'a>) -> Self {
        Self {
            base_dir,
            mode,
            images: Vec::new(),
            textures: Vec::new(),
            alpha: Vec::new(),
            by_key: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// glTF texture index for `reference`, adding it on first use.
    fn texture_for(&mut self, reference: &TextureReference) -> Result<Option<u32>> {
        let key = match (&reference.content, &reference.path) {
            (Some(content), _) => TextureKey::Content(hash_bytes(content)),
            (None, Some(path)) => TextureKey::Uri(path.clone()),
            (None, None) => return Ok(None),
        };
        if let Some(&index) = self.by_key.get(&key) {
            return Ok(Some(index));
        }

        let (image, has_alpha) = match self.load(reference) {
            ImageSource::Encoded(encoded) => {
                let has_alpha = encoded.has_alpha;
                (self.add_encoded(encoded)?, has_alpha)
            }
            ImageSource::Uri(uri) => (
                json::Image {
                    buffer_view: None,
                    mime_type: mime_from_path(&uri).map(|mime| json::image::MimeType(mime.to_string())),
                    uri: Some(uri),
                    extensions: Default::default(),
                    extras: Default::default(),
                },
                false,
            ),
            ImageSource::Missing => return Ok(None),
        };

        let image_index = self.images.len() as u32;
        self.images.push(image);
        let texture_index = self.textures.len() as u32;
        self.textures.push(json::Texture {
            sampler: Some(json::Index::new(0)),
            source: json::Index::new(image_index),
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.alpha.push(has_alpha);
        self.by_key.insert(key, texture_index);
        Ok(Some(texture_index))
    }

    /// Decode embedded content, or read and decode the referenced file.
    fn load(&self, reference: &TextureReference) -> ImageSource {
        let name = reference.path.as_deref();
        let encoded = match (&reference.content, name) {
            (Some(content), _) => encode_embedded(content, name),
            (None, Some(path)) => {
                let file = resolve_texture_path(path, self.base_dir);
                match fs::read(&file) {
                    Ok(bytes) => encode_embedded(&bytes, Some(path)),
                    Err(err) => {
                        warn!("Could not read texture {}: {}", file.display(), err);
                        return ImageSource::Uri(path.replace('\\', "/"));
                    }
                }
            }
            (None, None) => None,
        };
        encoded.map_or(ImageSource::Missing, ImageSource::Encoded)
    }

    fn add_encoded(&mut self, encoded: EncodedImage) -> Result<json::Image> {
        let mime_type = Some(json::image::MimeType(encoded.mime_type.to_string()));
        let uri = match &mut self.mode {
            TextureMode::Embed => {
                self.pending.push((self.images.len(), encoded.bytes));
                None
            }
            TextureMode::External(cache) => Some(cache.store(&encoded)?),
        };
        Ok(json::Image {
            buffer_view: None, // Filled in once the BIN chunk is laid out.
            mime_type,
            uri,
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    fn has_alpha(&self, texture: u32) -> bool {
        self.alpha.get(texture as usize).copied().unwrap_or(false)
    }
}

/// Absolute paths are kept; relative ones are joined onto `base_dir`.
fn resolve_texture_path(path: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(path.replace('\\', "/"));
    match base_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

/// Export a flattened scene to GLB format (binary glTF).
///
/// Each non-empty part becomes a node with a single non-indexed triangle
/// primitive; materials map one-to-one onto the scene's resolved materials.
/// Textures are embedded in the BIN chunk.
pub fn export_glb(scene: &ExportScene) -> Result<Vec<u8>> {
    export_glb_with_textures(scene, TextureMode::Embed)
}

/// Export a flattened scene to GLB, storing textures as `mode` says.
pub fn export_glb_with_textures(scene: &ExportScene, mode: TextureMode<'_>) -> Result<Vec<u8>> {
    if scene.is_empty() {
        return Err(FlattenError::Export("Cannot export empty scene".to_string()));
    }

    // Vertex data first; every attribute is f32 so offsets stay 4-byte aligned.
    let mut buffer_data: Vec<u8> = Vec::new();
    let mut part_offsets: Vec<(&MeshPartInfo, PartOffsets)> = Vec::new();
    for part in scene.parts().iter().filter(|part| !part.is_empty()) {
        let positions = buffer_data.len();
        buffer_data.extend_from_slice(part.positions_bytes());
        let normals = buffer_data.len();
        buffer_data.extend_from_slice(part.normals_bytes());
        let uvs = buffer_data.len();
        buffer_data.extend_from_slice(part.uvs_bytes());
        let colors = buffer_data.len();
        buffer_data.extend_from_slice(part.colors_bytes());
        let tangents = buffer_data.len();
        buffer_data.extend_from_slice(cast_slice(&compute_tangents(part)));
        part_offsets.push((
            part,
            PartOffsets {
                positions,
                normals,
                uvs,
                colors,
                tangents,
                vertex_count: part.vertex_count(),
            },
        ));
    }

    let mut texture_table = TextureTable::new(scene.source_dir(), mode);
    let materials = scene
        .materials()
        .iter()
        .map(|material| create_material(material, &mut texture_table))
        .collect::<Result<Vec<json::Material>>>()?;

    let mut buffer_views = Vec::new();
    let mut accessors = Vec::new();
    let mut meshes = Vec::new();
    let mut nodes = Vec::new();

    for (part, offsets) in &part_offsets {
        let (min, max) = part_bounds(part);
        let n = offsets.vertex_count;
        let accessor_start = accessors.len() as u32;

        let attributes = [
            (offsets.positions, n * 12, json::accessor::Type::Vec3, Some((min, max))),
            (offsets.normals, n * 12, json::accessor::Type::Vec3, None),
            (offsets.uvs, n * 8, json::accessor::Type::Vec2, None),
            (offsets.colors, n * 16, json::accessor::Type::Vec4, None),
            (offsets.tangents, n * 16, json::accessor::Type::Vec4, None),
        ];
        for (offset, size, type_, bounds) in attributes {
            let view = buffer_views.len() as u32;
            buffer_views.push(create_buffer_view(
                offset,
                size,
                Some(json::buffer::Target::ArrayBuffer),
            ));
            accessors.push(create_accessor(view, n, type_, bounds));
        }

        let mesh_index = meshes.len() as u32;
        meshes.push(json::Mesh {
            extensions: Default::default(),
            extras: Default::default(),
            primitives: vec![create_primitive(accessor_start, part.material_index)],
            weights: None,
        });
        nodes.push(json::Node {
            camera: None,
            children: None,
            extensions: Default::default(),
            extras: Default::default(),
            matrix: None,
            mesh: Some(json::Index::new(mesh_index)),
            rotation: None,
            scale: None,
            translation: None,
            skin: None,
            weights: None,
        });
    }

    // Embedded images (aligned to 4 bytes)
    let mut images = texture_table.images;
    for (image_index, bytes) in texture_table.pending {
        let padding = (4 - (buffer_data.len() % 4)) % 4;
        buffer_data.extend(std::iter::repeat(0u8).take(padding));
        let offset = buffer_data.len();
        buffer_data.extend_from_slice(&bytes);

        let view = buffer_views.len() as u32;
        buffer_views.push(create_buffer_view(offset, bytes.len(), None));
        if let Some(image) = images.get_mut(image_index) {
            image.buffer_view = Some(json::Index::new(view));
        }
    }

    let total_buffer_size = buffer_data.len();
    let node_indices = (0..nodes.len() as u32).map(json::Index::new).collect();

    let root = json::Root {
        accessors,
        buffers: vec![json::Buffer {
            byte_length: USize64(total_buffer_size as u64),
            extensions: Default::default(),
            extras: Default::default(),
            uri: None,
        }],
        buffer_views,
        images,
        samplers: vec![json::texture::Sampler {
            mag_filter: Some(Valid(json::texture::MagFilter::Linear)),
            min_filter: Some(Valid(json::texture::MinFilter::LinearMipmapLinear)),
            wrap_s: Valid(json::texture::WrappingMode::Repeat),
            wrap_t: Valid(json::texture::WrappingMode::Repeat),
            extensions: Default::default(),
            extras: Default::default(),
        }],
        textures: texture_table.textures,
        materials,
        meshes,
        nodes,
        scenes: vec![json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            nodes: node_indices,
        }],
        scene: Some(json::Index::new(0)),
        ..Default::default()
    };

    let json_string = json::serialize::to_string(&root)
        .map_err(|e| FlattenError::Export(format!("Failed to serialize glTF JSON: {}", e)))?;
    Ok(write_glb_container(json_string.as_bytes(), &buffer_data))
}

/// Wrap JSON and BIN chunks in a GLB container.
fn write_glb_container(json_bytes: &[u8], buffer_data: &[u8]) -> Vec<u8> {
    let json_padding = (4 - (json_bytes.len() % 4)) % 4;
    let padded_json_len = json_bytes.len() + json_padding;
    let buffer_padding = (4 - (buffer_data.len() % 4)) % 4;
    let padded_buffer_len = buffer_data.len() + buffer_padding;

    let total_size = 12 + // GLB header
        8 + padded_json_len + // JSON chunk
        8 + padded_buffer_len; // BIN chunk

    let mut glb = Vec::with_capacity(total_size);

    // GLB Header
    glb.extend_from_slice(b"glTF"); // magic
    glb.extend_from_slice(&2u32.to_le_bytes()); // version
    glb.extend_from_slice(&(total_size as u32).to_le_bytes()); // length

    // JSON Chunk
    glb.extend_from_slice(&(padded_json_len as u32).to_le_bytes());
    glb.extend_from_slice(&0x4E4F534Au32.to_le_bytes()); // chunk type: JSON
    glb.extend_from_slice(json_bytes);
    glb.extend_from_slice(&vec![0x20u8; json_padding]); // padding (spaces)

    // BIN Chunk
    glb.extend_from_slice(&(padded_buffer_len as u32).to_le_bytes());
    glb.extend_from_slice(&0x004E4942u32.to_le_bytes()); // chunk type: BIN
    glb.extend_from_slice(buffer_data);
    glb.extend_from_slice(&vec![0u8; buffer_padding]); // padding (zeros)

    glb
}

fn part_bounds(part: &MeshPartInfo) -> ([f32; 3], [f32; 3]) {
    BoundingBox::from_points(part.positions.iter().copied())
        .map(|bounds| (bounds.min, bounds.max))
        .unwrap_or(([0.0; 3], [0.0; 3]))
}

/// Per-vertex tangents (xyz plus bitangent sign) derived from each
/// triangle's position and UV deltas.
///
/// Triangles with degenerate UVs get +X; the result always has one entry per
/// vertex.
fn compute_tangents(part: &MeshPartInfo) -> Vec<[f32; 4]> {
    let mut tangents = Vec::with_capacity(part.vertex_count());
    let triangles = part
        .positions
        .chunks_exact(3)
        .zip(part.uvs.chunks_exact(3))
        .zip(part.normals.chunks_exact(3));

    for ((p, uv), normals) in triangles {
        let [p0, p1, p2] = [p[0], p[1], p[2]].map(Vec3::from);
        let [uv0, uv1, uv2] = [uv[0], uv[1], uv[2]].map(Vec2::from);
        let (edge1, edge2) = (p1 - p0, p2 - p0);
        let (duv1, duv2) = (uv1 - uv0, uv2 - uv0);

        let denom = duv1.perp_dot(duv2);
        let (tangent, bitangent) = if denom.abs() > f32::EPSILON {
            let r = 1.0 / denom;
            (
                (edge1 * duv2.y - edge2 * duv1.y) * r,
                (edge2 * duv1.x - edge1 * duv2.x) * r,
            )
        } else {
            (Vec3::X, Vec3::Y)
        };

        for &normal in normals {
            let normal = Vec3::from(normal);
            let t = orthonormalize(normal, tangent);
            let w = if normal.cross(t).dot(bitangent) < 0.0 { -1.0 } else { 1.0 };
            tangents.push([t.x, t.y, t.z, w]);
        }
    }

    tangents.resize(part.vertex_count(), [1.0, 0.0, 0.0, 1.0]);
    tangents
}

/// `tangent` with its `normal` component removed, at unit length.
fn orthonormalize(normal: Vec3, tangent: Vec3) -> Vec3 {
    (tangent - normal * normal.dot(tangent))
        .try_normalize()
        .or_else(|| normal.try_normalize().map(|n| n.any_orthonormal_vector()))
        .unwrap_or(Vec3::X)
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

fn unit(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

fn texture_info(index: u32) -> json::texture::Info {
    json::texture::Info {
        index: json::Index::new(index),
        tex_coord: 0,
        extensions: Default::default(),
        extras: Default::default(),
    }
}

/// Create a glTF PBR material from a resolved material.
fn create_material(
    material: &ResolvedMaterial,
    textures: &mut TextureTable<'_>,
) -> Result<json::Material> {
    let base_texture = textures.texture_for(&material.base_color_texture)?;
    let normal_texture = textures.texture_for(&material.normal_texture)?;
    let emissive_texture = textures.texture_for(&material.emissive_texture)?;

    let [r, g, b, a] = material.base_color;
    let blend = a < 1.0 || base_texture.map_or(false, |t| textures.has_alpha(t));
    let [er, eg, eb] = material.emissive;

    Ok(json::Material {
        pbr_metallic_roughness: json::material::PbrMetallicRoughness {
            base_color_texture: base_texture.map(texture_info),
            base_color_factor: json::material::PbrBaseColorFactor([
                unit(r),
                unit(g),
                unit(b),
                unit(a),
            ]),
            metallic_factor: json::material::StrengthFactor(material.metallic),
            roughness_factor: json::material::StrengthFactor(material.roughness),
            metallic_roughness_texture: None,
            extensions: Default::default(),
            extras: Default::default(),
        },
        alpha_mode: Valid(if blend {
            json::material::AlphaMode::Blend
        } else {
            json::material::AlphaMode::Opaque
        }),
        alpha_cutoff: None,
        double_sided: material.double_sided,
        normal_texture: normal_texture.map(|index| json::material::NormalTexture {
            index: json::Index::new(index),
            scale: 1.0,
            tex_coord: 0,
            extensions: Default::default(),
            extras: Default::default(),
        }),
        occlusion_texture: None,
        emissive_texture: emissive_texture.map(texture_info),
        emissive_factor: json::material::EmissiveFactor([unit(er), unit(eg), unit(eb)]),
        extensions: Default::default(),
        extras: Default::default(),
    })
}

/// Create a buffer view.
fn create_buffer_view(
    offset: usize,
    size: usize,
    target: Option<json::buffer::Target>,
) -> json::buffer::View {
    json::buffer::View {
        buffer: json::Index::new(0),
        byte_length: USize64(size as u64),
        byte_offset: Some(USize64(offset as u64)),
        byte_stride: None,
        extensions: Default::default(),
        extras: Default::default(),
        target: target.map(Valid),
    }
}

/// Create an f32 accessor.
fn create_accessor(
    buffer_view: u32,
    count: usize,
    type_: json::accessor::Type,
    bounds: Option<([f32; 3], [f32; 3])>,
) -> json::Accessor {
    json::Accessor {
        buffer_view: Some(json::Index::new(buffer_view)),
        byte_offset: Some(USize64(0)),
        count: USize64(count as u64),
        component_type: Valid(json::accessor::GenericComponentType(
            json::accessor::ComponentType::F32,
        )),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(type_),
        min: bounds.map(|(min, _)| json::Value::from(min.to_vec())),
        max: bounds.map(|(_, max)| json::Value::from(max.to_vec())),
        normalized: false,
        sparse: None,
    }
}

/// Create a non-indexed triangle primitive whose five attribute accessors
/// start at `first_accessor`.
fn create_primitive(first_accessor: u32, material: u32) -> json::mesh::Primitive {
    let mut attributes = std::collections::BTreeMap::new();
    attributes.insert(
        Valid(json::mesh::Semantic::Positions),
        json::Index::new(first_accessor),
    );
    attributes.insert(
        Valid(json::mesh::Semantic::Normals),
        json::Index::new(first_accessor + 1),
    );
    attributes.insert(
        Valid(json::mesh::Semantic::TexCoords(0)),
        json::Index::new(first_accessor + 2),
    );
    attributes.insert(
        Valid(json::mesh::Semantic::Colors(0)),
        json::Index::new(first_accessor + 3),
    );
    attributes.insert(
        Valid(json::mesh::Semantic::Tangents),
        json::Index::new(first_accessor + 4),
    );

    json::mesh::Primitive {
        attributes,
        extensions: Default::default(),
        extras: Default::default(),
        indices: None,
        material: Some(json::Index::new(material)),
        mode: Valid(json::mesh::Mode::Triangles),
        targets: None,
    }
}
