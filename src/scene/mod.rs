//! Raw scene graph produced by a scene loader.
//!
//! The graph is an arena: nodes, meshes, materials and textures live in
//! vectors and refer to each other through typed integer handles. The
//! flattening engine only ever reads it.

pub mod loader;
pub mod material;
pub mod mesh;
pub mod texture;

pub use loader::{JsonSceneLoader, LoadOptions, SceneLoader};
pub use material::{LegacyMaps, MapValue, MaterialFeatures, MaterialMap, PbrMaps, RawMaterial};
pub use mesh::{Face, MeshPart, RawMesh, UvSet, VertexAttribute};
pub use texture::{RawTexture, TextureKind};

use crate::types::{CoordinateAxes, Transform};
use glam::DMat4;
use serde::{Deserialize, Serialize};

macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Position of the record in its arena vector.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_handle!(
    /// Handle of a [`RawNode`].
    NodeId
);
arena_handle!(
    /// Handle of a [`RawMesh`].
    MeshId
);
arena_handle!(
    /// Handle of a [`RawMaterial`].
    MaterialId
);
arena_handle!(
    /// Handle of a [`RawTexture`].
    TextureId
);

/// A node in the scene hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub mesh: Option<MeshId>,
    /// Per-node material slots; take precedence over the mesh's slots.
    #[serde(default)]
    pub materials: Vec<MaterialId>,
    /// Local transform relative to the parent.
    #[serde(default)]
    pub transform: Transform,
    /// Offset applied to the attached geometry only, not inherited.
    #[serde(default)]
    pub geometry_transform: Transform,
    /// Evaluated node-to-world matrix.
    #[serde(skip)]
    pub node_to_world: DMat4,
    /// Evaluated geometry-to-world matrix.
    #[serde(skip)]
    pub geometry_to_world: DMat4,
}

impl RawNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_mesh(mut self, mesh: MeshId) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_materials(mut self, materials: Vec<MaterialId>) -> Self {
        self.materials = materials;
        self
    }

    /// Set an already-evaluated geometry-to-world matrix.
    pub fn with_geometry_to_world(mut self, matrix: DMat4) -> Self {
        self.geometry_to_world = matrix;
        self
    }
}

fn default_unit_meters() -> f64 {
    1.0
}

/// The raw scene arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawScene {
    /// Axis convention the document was authored in.
    #[serde(default)]
    pub axes: CoordinateAxes,
    /// Size of one document unit in meters.
    #[serde(default = "default_unit_meters")]
    pub unit_meters: f64,
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub meshes: Vec<RawMesh>,
    #[serde(default)]
    pub materials: Vec<RawMaterial>,
    #[serde(default)]
    pub textures: Vec<RawTexture>,
}

impl Default for RawScene {
    fn default() -> Self {
        Self {
            axes: CoordinateAxes::default(),
            unit_meters: default_unit_meters(),
            nodes: Vec::new(),
            meshes: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
        }
    }
}

impl RawScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&RawNode> {
        self.nodes.get(id.index())
    }

    pub fn mesh(&self, id: MeshId) -> Option<&RawMesh> {
        self.meshes.get(id.index())
    }

    pub fn material(&self, id: MaterialId) -> Option<&RawMaterial> {
        self.materials.get(id.index())
    }

    pub fn texture(&self, id: TextureId) -> Option<&RawTexture> {
        self.textures.get(id.index())
    }

    /// Add a node and return its handle.
    pub fn add_node(&mut self, node: RawNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() as u32 - 1)
    }

    /// Add a mesh and return its handle.
    pub fn add_mesh(&mut self, mesh: RawMesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() as u32 - 1)
    }

    /// Add a material and return its handle.
    pub fn add_material(&mut self, material: RawMaterial) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() as u32 - 1)
    }

    /// Add a texture and return its handle.
    pub fn add_texture(&mut self, texture: RawTexture) -> TextureId {
        self.textures.push(texture);
        TextureId(self.textures.len() as u32 - 1)
    }

    /// Iterate over nodes that carry a mesh, in arena order.
    pub fn mesh_nodes(&self) -> impl Iterator<Item = (&RawNode, &RawMesh)> {
        self.nodes
            .iter()
            .filter_map(|node| node.mesh.and_then(|id| self.mesh(id)).map(|mesh| (node, mesh)))
    }

    /// Check that every handle and attribute index is in range.
    pub fn validate(&self) -> Result<(), String> {
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                if parent.index() >= self.nodes.len() {
                    return Err(format!("node {} has missing parent {}", i, parent.0));
                }
            }
            if let Some(mesh) = node.mesh {
                if mesh.index() >= self.meshes.len() {
                    return Err(format!("node {} has missing mesh {}", i, mesh.0));
                }
            }
            if let Some(bad) = node
                .materials
                .iter()
                .find(|m| m.index() >= self.materials.len())
            {
                return Err(format!("node {} references missing material {}", i, bad.0));
            }
        }

        for (i, mesh) in self.meshes.iter().enumerate() {
            mesh.validate(self.materials.len())
                .map_err(|e| format!("mesh {}: {}", i, e))?;
        }

        for (i, material) in self.materials.iter().enumerate() {
            if let Some(bad) = material
                .texture_refs()
                .into_iter()
                .find(|t| t.index() >= self.textures.len())
            {
                return Err(format!("material {} references missing texture {}", i, bad.0));
            }
        }

        for (i, texture) in self.textures.iter().enumerate() {
            if let Some(bad) = texture
                .texture_refs()
                .into_iter()
                .find(|t| t.index() >= self.textures.len())
            {
                return Err(format!("texture {} references missing texture {}", i, bad.0));
            }
        }

        Ok(())
    }

    /// Evaluate `node_to_world` and `geometry_to_world` for every node.
    ///
    /// `root` is applied above every parentless node. Fails on parent cycles.
    pub fn evaluate_transforms(&mut self, root: DMat4) -> Result<(), String> {
        let count = self.nodes.len();
        let mut world: Vec<Option<DMat4>> = vec![None; count];

        for start in 0..count {
            // Walk up to the first evaluated ancestor (or the root).
            let mut chain = Vec::new();
            let mut current = Some(start);
            while let Some(i) = current {
                if world[i].is_some() {
                    break;
                }
                if chain.len() > count {
                    return Err(format!("node {} is part of a parent cycle", start));
                }
                chain.push(i);
                current = self.nodes[i].parent.map(NodeId::index);
            }

            let mut parent_world = current.and_then(|i| world[i]).unwrap_or(root);
            for &i in chain.iter().rev() {
                let node_world = parent_world * self.nodes[i].transform.to_matrix();
                world[i] = Some(node_world);
                parent_world = node_world;
            }
        }

        for (node, node_world) in self.nodes.iter_mut().zip(world) {
            let node_world = node_world.unwrap_or(root);
            node.node_to_world = node_world;
            node.geometry_to_world = node_world * node.geometry_transform.to_matrix();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn translated(x: f64) -> Transform {
        Transform {
            translation: [x, 0.0, 0.0],
            ..Default::default()
        }
    }

    #[test]
    fn test_handles_index_arena() {
        let mut scene = RawScene::new();
        let mesh = scene.add_mesh(RawMesh::default());
        let a = scene.add_node(RawNode::new("a").with_mesh(mesh));
        let b = scene.add_node(RawNode::new("b"));
        assert_eq!(a, NodeId(0));
        assert_eq!(b, NodeId(1));
        assert_eq!(scene.node(b).unwrap().name, "b");
        assert_eq!(scene.mesh_nodes().count(), 1);
    }

    #[test]
    fn test_evaluate_hierarchy() {
        let mut scene = RawScene::new();
        // Child listed before its parent on purpose.
        scene.nodes.push(RawNode {
            name: "child".to_string(),
            parent: Some(NodeId(1)),
            transform: translated(1.0),
            geometry_transform: translated(0.5),
            ..Default::default()
        });
        scene.nodes.push(RawNode {
            name: "parent".to_string(),
            transform: translated(10.0),
            ..Default::default()
        });

        scene.evaluate_transforms(DMat4::IDENTITY).unwrap();

        let child = &scene.nodes[0];
        let origin = child.node_to_world.transform_point3(DVec3::ZERO);
        assert!((origin - DVec3::new(11.0, 0.0, 0.0)).length() < 1e-12);
        let geometry_origin = child.geometry_to_world.transform_point3(DVec3::ZERO);
        assert!((geometry_origin - DVec3::new(11.5, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_parent_cycle_is_error() {
        let mut scene = RawScene::new();
        scene.nodes.push(RawNode {
            parent: Some(NodeId(1)),
            ..Default::default()
        });
        scene.nodes.push(RawNode {
            parent: Some(NodeId(0)),
            ..Default::default()
        });
        assert!(scene.evaluate_transforms(DMat4::IDENTITY).is_err());
    }

    #[test]
    fn test_validate_missing_handles() {
        let mut scene = RawScene::new();
        scene.add_node(RawNode::new("n").with_mesh(MeshId(3)));
        assert!(scene.validate().unwrap_err().contains("missing mesh"));

        let mut scene = RawScene::new();
        let mut material = RawMaterial::new("m");
        material.pbr.base_color = MaterialMap::textured(TextureId(0));
        scene.add_material(material);
        assert!(scene.validate().unwrap_err().contains("missing texture"));
    }
}
