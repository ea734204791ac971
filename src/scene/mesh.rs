//! Raw mesh geometry: faces, indexed vertex attributes and material parts.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// An indexed per-corner vertex attribute.
///
/// `indices[corner]` selects an entry in `values`. An empty `indices` list
/// means identity indexing (corner `i` reads `values[i]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexAttribute<T> {
    pub values: Vec<T>,
    #[serde(default)]
    pub indices: Vec<u32>,
}

impl<T: Copy> VertexAttribute<T> {
    pub fn new(values: Vec<T>, indices: Vec<u32>) -> Self {
        Self { values, indices }
    }

    /// Create an attribute where every corner has its own value.
    pub fn identity(values: Vec<T>) -> Self {
        Self {
            values,
            indices: Vec::new(),
        }
    }

    /// Number of corners this attribute covers.
    pub fn corner_count(&self) -> usize {
        if self.indices.is_empty() {
            self.values.len()
        } else {
            self.indices.len()
        }
    }

    /// Value slot referenced by a corner.
    pub fn value_index(&self, corner: usize) -> Option<usize> {
        if self.indices.is_empty() {
            (corner < self.values.len()).then_some(corner)
        } else {
            self.indices.get(corner).map(|&i| i as usize)
        }
    }

    /// Value at a corner, `None` if the corner or its index is out of range.
    pub fn get(&self, corner: usize) -> Option<T> {
        self.value_index(corner)
            .and_then(|i| self.values.get(i))
            .copied()
    }

    pub(crate) fn validate(&self, what: &str, corners: usize) -> Result<(), String> {
        if self.corner_count() < corners {
            return Err(format!(
                "{} covers {} corners but the mesh has {}",
                what,
                self.corner_count(),
                corners
            ));
        }
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= self.values.len()) {
            return Err(format!(
                "{} index {} out of range ({} values)",
                what,
                bad,
                self.values.len()
            ));
        }
        Ok(())
    }
}

/// A polygon as a run of corners in the mesh's corner stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Face {
    pub index_begin: u32,
    pub num_indices: u32,
}

impl Face {
    pub fn new(index_begin: u32, num_indices: u32) -> Self {
        Self {
            index_begin,
            num_indices,
        }
    }

    /// Triangles produced by this face; 0 for points and lines.
    pub fn triangle_count(&self) -> usize {
        if self.num_indices >= 3 {
            self.num_indices as usize - 2
        } else {
            0
        }
    }

    /// Corner range of this face.
    pub fn corners(&self) -> Range<usize> {
        let begin = self.index_begin as usize;
        begin..begin + self.num_indices as usize
    }
}

/// A named alternate set of texture coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UvSet {
    pub name: String,
    pub vertex_uv: VertexAttribute<[f64; 2]>,
}

/// Faces of a mesh that share one material slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshPart {
    /// Material slot index (into the node's or mesh's material list).
    pub index: u32,
    #[serde(default)]
    pub face_indices: Vec<u32>,
}

/// Polygonal mesh geometry in local space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMesh {
    #[serde(default)]
    pub faces: Vec<Face>,
    pub vertex_position: VertexAttribute<[f64; 3]>,
    #[serde(default)]
    pub vertex_normal: Option<VertexAttribute<[f64; 3]>>,
    #[serde(default)]
    pub vertex_uv: Option<VertexAttribute<[f64; 2]>>,
    #[serde(default)]
    pub vertex_color: Option<VertexAttribute<[f64; 4]>>,
    #[serde(default)]
    pub uv_sets: Vec<UvSet>,
    #[serde(default)]
    pub material_parts: Vec<MeshPart>,
    #[serde(default)]
    pub materials: Vec<super::MaterialId>,
}

impl RawMesh {
    /// Create a mesh from positions and faces given as corner-position lists.
    pub fn from_polygons(positions: Vec<[f64; 3]>, polygons: &[&[u32]]) -> Self {
        let mut faces = Vec::with_capacity(polygons.len());
        let mut indices = Vec::new();
        for polygon in polygons {
            faces.push(Face::new(indices.len() as u32, polygon.len() as u32));
            indices.extend_from_slice(polygon);
        }
        Self {
            faces,
            vertex_position: VertexAttribute::new(positions, indices),
            ..Default::default()
        }
    }

    /// Largest triangle count of any single face.
    pub fn max_face_triangles(&self) -> usize {
        self.faces
            .iter()
            .map(Face::triangle_count)
            .max()
            .unwrap_or(0)
    }

    /// Total number of corners in the mesh.
    pub fn corner_count(&self) -> usize {
        self.vertex_position.corner_count()
    }

    /// The default UV attribute: `vertex_uv`, else the first UV set.
    pub fn default_uv(&self) -> Option<&VertexAttribute<[f64; 2]>> {
        self.vertex_uv
            .as_ref()
            .or_else(|| self.uv_sets.first().map(|set| &set.vertex_uv))
    }

    /// Find a UV set by exact name. Empty names never match.
    pub fn uv_set(&self, name: &str) -> Option<&UvSet> {
        if name.is_empty() {
            return None;
        }
        self.uv_sets.iter().find(|set| set.name == name)
    }

    pub(crate) fn validate(&self, material_count: usize) -> Result<(), String> {
        let corners = self.corner_count();
        self.vertex_position.validate("vertex_position", corners)?;
        for (i, face) in self.faces.iter().enumerate() {
            if face.corners().end > corners {
                return Err(format!(
                    "face {} spans corners {:?} but the mesh has {}",
                    i,
                    face.corners(),
                    corners
                ));
            }
        }
        if let Some(normals) = &self.vertex_normal {
            normals.validate("vertex_normal", corners)?;
        }
        if let Some(uvs) = &self.vertex_uv {
            uvs.validate("vertex_uv", corners)?;
        }
        if let Some(colors) = &self.vertex_color {
            colors.validate("vertex_color", corners)?;
        }
        for set in &self.uv_sets {
            set.vertex_uv
                .validate(&format!("uv set '{}'", set.name), corners)?;
        }
        for part in &self.material_parts {
            if let Some(bad) = part
                .face_indices
                .iter()
                .find(|&&f| f as usize >= self.faces.len())
            {
                return Err(format!(
                    "material part {} references face {} ({} faces)",
                    part.index,
                    bad,
                    self.faces.len()
                ));
            }
        }
        if let Some(bad) = self.materials.iter().find(|m| m.index() >= material_count) {
            return Err(format!("mesh references missing material {}", bad.0));
        }
        Ok(())
    }
}
