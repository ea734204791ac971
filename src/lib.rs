//! # Scene Flatten
//!
//! A Rust library for flattening hierarchical 3D scenes into renderer-ready
//! triangle buffers.
//!
//! ## Overview
//!
//! A scene loader parses a scene document into a raw scene graph normalized
//! to a right-handed, Y-up, meter-scaled convention. The flattener then
//! resolves every material into a single PBR-style description, splits each
//! mesh node into one part per material, triangulates its polygons and
//! emits non-indexed world-space vertices.
//!
//! Flattened scenes export to GLB, OBJ, or a georeferenced 3D Tiles 1.1
//! tileset.
//!
//! ## Quick Start
//!
//! ```ignore
//! use scene_flatten::{load_scene, export_glb};
//!
//! let scene = load_scene("path/to/scene.json")?;
//! for part in scene.parts() {
//!     println!("{:?}: {} triangles", part.name, part.triangle_count());
//! }
//!
//! let glb_bytes = export_glb(&scene)?;
//! ```
//!
//! ## Custom Loaders
//!
//! Implement [`SceneLoader`] to feed other formats through the same pipeline:
//!
//! ```ignore
//! use scene_flatten::{FlattenConfig, Flattener};
//!
//! let scene = Flattener::new(MyLoader)
//!     .with_config(FlattenConfig::default().with_flip_v(false))
//!     .load("scene.bin")?;
//! ```

pub mod error;
pub mod types;
pub mod scene;
pub mod resolver;
pub mod mesher;
pub mod export_scene;
pub mod export;
pub mod geo;

// Re-export main types for convenience
pub use error::{FlattenError, Result};
pub use types::{BoundingBox, CoordinateAxes, CoordinateAxis};
pub use scene::{JsonSceneLoader, LoadOptions, RawScene, SceneLoader};
pub use mesher::{flatten_scene, FlattenConfig, Flattener, PartFailurePolicy};
pub use export_scene::{release_scene, ExportScene, MeshPartInfo, ResolvedMaterial, TextureReference};
pub use export::{export_glb, export_obj, export_tileset, TilesetOptions};
pub use geo::GeoContext;

/// Load and flatten a JSON scene document with the default configuration.
///
/// On failure the error carries a human-readable diagnostic of at most
/// [`error::MAX_DIAGNOSTIC_LEN`] bytes.
pub fn load_scene<P: AsRef<std::path::Path>>(path: P) -> Result<ExportScene> {
    Flattener::new(JsonSceneLoader).load(path)
}

/// Load and flatten a JSON scene document held in memory.
pub fn load_scene_from_bytes(data: &[u8], config: &FlattenConfig) -> Result<ExportScene> {
    let raw = scene::loader::load_from_bytes(data, &LoadOptions::fixed())
        .map_err(|reason| FlattenError::load("<memory>", &reason))?;
    flatten_scene(raw, config)
}
