//! Export formats for flattened scenes.

pub mod gltf;
pub mod image;
pub mod obj;
pub mod tiles;

pub use gltf::{export_glb, export_glb_with_textures, TextureCache, TextureMode};
pub use obj::export_obj;
pub use tiles::{export_tileset, TilesetOptions};
