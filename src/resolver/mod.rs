//! Material and texture resolution.
//!
//! Raw materials carry two parallel shading models and textures may hide
//! behind layered or shader indirections. This module collapses both into
//! [`ResolvedMaterial`](crate::export_scene::ResolvedMaterial) values.

pub mod material;
pub mod texture;

pub use material::{uses_pbr, uv_source_texture, MaterialResolver, MaterialTable};
pub use texture::{TextureResolver, MAX_TEXTURE_DEPTH};
