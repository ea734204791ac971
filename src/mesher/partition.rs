//! Splitting mesh nodes into per-material parts.

use crate::resolver::MaterialTable;
use crate::scene::{MaterialId, RawMaterial, RawMesh, RawNode, RawScene};
use std::ops::Range;

/// The faces a part is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceSelection<'a> {
    /// Every face of the mesh, in order.
    All(Range<usize>),
    /// A precomputed list of face indices.
    Listed(&'a [u32]),
}

impl FaceSelection<'_> {
    pub fn iter(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match self {
            FaceSelection::All(range) => Box::new(range.clone()),
            FaceSelection::Listed(indices) => Box::new(indices.iter().map(|&f| f as usize)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FaceSelection::All(range) => range.len(),
            FaceSelection::Listed(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One output part before its vertices are emitted.
#[derive(Debug, Clone)]
pub struct PartPlan<'a> {
    pub node: &'a RawNode,
    pub mesh: &'a RawMesh,
    /// Source material of the part, used to pick its UV set.
    pub material: Option<&'a RawMaterial>,
    pub material_index: u32,
    pub faces: FaceSelection<'a>,
}

/// Material bound to slot `slot` of a node: the node's own slots first, then
/// the mesh's.
pub fn slot_material(node: &RawNode, mesh: &RawMesh, slot: u32) -> Option<MaterialId> {
    let slot = slot as usize;
    node.materials
        .get(slot)
        .or_else(|| mesh.materials.get(slot))
        .copied()
}

/// Plan the parts of one mesh node.
///
/// A mesh with material parts yields one part per material part, in order.
/// A mesh without yields a single part covering every face with material 0.
pub fn plan_node<'a>(
    scene: &'a RawScene,
    node: &'a RawNode,
    mesh: &'a RawMesh,
    table: &MaterialTable,
) -> Vec<PartPlan<'a>> {
    if mesh.material_parts.is_empty() {
        return vec![PartPlan {
            node,
            mesh,
            material: None,
            material_index: 0,
            faces: FaceSelection::All(0..mesh.faces.len()),
        }];
    }

    mesh.material_parts
        .iter()
        .map(|part| {
            let material = slot_material(node, mesh, part.index);
            PartPlan {
                node,
                mesh,
                material: material.and_then(|id| scene.material(id)),
                material_index: table.index_of(material),
                faces: FaceSelection::Listed(&part.face_indices),
            }
        })
        .collect()
}

/// Plan every part of the scene, in node order.
pub fn plan_scene<'a>(scene: &'a RawScene, table: &MaterialTable) -> Vec<PartPlan<'a>> {
    scene
        .mesh_nodes()
        .flat_map(|(node, mesh)| plan_node(scene, node, mesh, table))
        .collect()
}
