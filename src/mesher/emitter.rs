//! Emission of world-space, non-indexed triangle vertices for one part.

use super::partition::PartPlan;
use super::triangulate::{face_normal, Triangulator};
use super::FlattenConfig;
use crate::error::{FlattenError, Result};
use crate::export_scene::MeshPartInfo;
use crate::resolver::{uv_source_texture, TextureResolver};
use crate::scene::{Face, VertexAttribute};
use crate::types::{handedness, normal_matrix, normalize_or};
use glam::{DAffine2, DMat3, DMat4, DVec2, DVec3};
use std::collections::TryReserveError;

/// Fallback for normals that can't be normalized.
const DEFAULT_NORMAL: DVec3 = DVec3::Y;
const DEFAULT_UV: [f64; 2] = [0.0, 0.0];
const DEFAULT_COLOR: [f64; 4] = [1.0, 1.0, 1.0, 1.0];

/// The four per-vertex output buffers of a part.
#[derive(Debug, Default)]
pub(crate) struct PartBuffers {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    colors: Vec<[f32; 4]>,
}

impl PartBuffers {
    /// Reserve exactly `vertex_count` vertices in every buffer, all or nothing.
    pub(crate) fn allocate(vertex_count: usize) -> std::result::Result<Self, TryReserveError> {
        let mut buffers = Self::default();
        buffers.positions.try_reserve_exact(vertex_count)?;
        buffers.normals.try_reserve_exact(vertex_count)?;
        buffers.uvs.try_reserve_exact(vertex_count)?;
        buffers.colors.try_reserve_exact(vertex_count)?;
        Ok(buffers)
    }
}

/// UV source of a part: the attribute to read and an optional texture-space
/// transform.
struct UvSource<'a> {
    attribute: Option<&'a VertexAttribute<[f64; 2]>>,
    transform: Option<DAffine2>,
}

/// Emits the vertices of planned parts.
pub struct VertexEmitter<'a> {
    textures: TextureResolver<'a>,
    flip_v: bool,
}

impl<'a> VertexEmitter<'a> {
    pub fn new(textures: TextureResolver<'a>, config: &FlattenConfig) -> Self {
        Self {
            textures,
            flip_v: config.flip_v,
        }
    }

    fn uv_source(&self, plan: &PartPlan<'a>) -> UvSource<'a> {
        let mesh = plan.mesh;
        let texture = plan
            .material
            .and_then(uv_source_texture)
            .and_then(|id| self.textures.leaf(Some(id)));

        let attribute = texture
            .and_then(|tex| mesh.uv_set(&tex.uv_set))
            .map(|set| &set.vertex_uv)
            .or_else(|| mesh.default_uv());
        UvSource {
            attribute,
            transform: texture
                .and_then(|tex| tex.uv_transform)
                .map(|t| t.uv_to_texture()),
        }
    }

    /// Emit the triangles of `plan`.
    ///
    /// Fails with [`FlattenError::PartAllocation`] if the vertex buffers can't
    /// be reserved; nothing is emitted in that case.
    pub fn emit(&self, plan: &PartPlan<'a>) -> Result<MeshPartInfo> {
        let mesh = plan.mesh;
        let name = (!plan.node.name.is_empty()).then(|| plan.node.name.clone());
        let mut part = MeshPartInfo::new(name, plan.material_index);

        let uv = self.uv_source(plan);
        part.has_normals = mesh.vertex_normal.is_some();
        part.has_uvs = uv.attribute.is_some();
        part.has_colors = mesh.vertex_color.is_some();

        let faces: Vec<Face> = plan
            .faces
            .iter()
            .filter_map(|f| mesh.faces.get(f).copied())
            .collect();
        let vertex_count: usize = faces.iter().map(|face| face.triangle_count() * 3).sum();
        if vertex_count == 0 {
            return Ok(part);
        }

        let mut buffers =
            PartBuffers::allocate(vertex_count).map_err(|_| FlattenError::PartAllocation {
                part: plan.node.name.clone(),
                vertex_count,
            })?;

        let geometry_to_world: DMat4 = plan.node.geometry_to_world;
        let normal_m: DMat3 = normal_matrix(&geometry_to_world);
        let flip_winding = handedness(&geometry_to_world) < 0.0;
        let mut triangulator = Triangulator::with_capacity(mesh.max_face_triangles());

        for &face in &faces {
            let flat_normal = if mesh.vertex_normal.is_none() {
                let local = normalize_or(face_normal(&mesh.vertex_position, face), DEFAULT_NORMAL);
                normalize_or(normal_m * local, DEFAULT_NORMAL)
            } else {
                DEFAULT_NORMAL
            };

            for tri in triangulator.triangulate(&mesh.vertex_position, face).chunks_exact(3) {
                let corners = if flip_winding {
                    [tri[0], tri[2], tri[1]]
                } else {
                    [tri[0], tri[1], tri[2]]
                };

                for corner in corners.map(|c| c as usize) {
                    let position = mesh
                        .vertex_position
                        .get(corner)
                        .map(DVec3::from)
                        .unwrap_or(DVec3::ZERO);
                    buffers
                        .positions
                        .push(geometry_to_world.transform_point3(position).as_vec3().to_array());

                    let normal = match &mesh.vertex_normal {
                        Some(normals) => {
                            let n = normals.get(corner).map(DVec3::from).unwrap_or(DEFAULT_NORMAL);
                            normalize_or(normal_m * n, DEFAULT_NORMAL)
                        }
                        None => flat_normal,
                    };
                    buffers.normals.push(normal.as_vec3().to_array());

                    let mut texcoord = DVec2::from(
                        uv.attribute.and_then(|a| a.get(corner)).unwrap_or(DEFAULT_UV),
                    );
                    if let Some(transform) = &uv.transform {
                        texcoord = transform.transform_point2(texcoord);
                    }
                    if self.flip_v {
                        texcoord.y = 1.0 - texcoord.y;
                    }
                    buffers.uvs.push(texcoord.as_vec2().to_array());

                    let color = mesh
                        .vertex_color
                        .as_ref()
                        .and_then(|c| c.get(corner))
                        .unwrap_or(DEFAULT_COLOR);
                    buffers.colors.push(color.map(|c| c as f32));
                }
            }
        }

        part.positions = buffers.positions;
        part.normals = buffers.normals;
        part.uvs = buffers.uvs;
        part.colors = buffers.colors;
        Ok(part)
    }
}
