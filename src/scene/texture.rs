//! Raw texture records and their indirection kinds.

use super::TextureId;
use crate::types::UvTransform;
use serde::{Deserialize, Serialize};

/// How a texture produces its texels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextureKind {
    /// A concrete image file (or embedded image).
    #[default]
    File,
    /// A procedural texture, possibly backed by file textures.
    Procedural,
    /// A stack of layers; the last layer is the topmost.
    Layered {
        #[serde(default)]
        layers: Vec<TextureId>,
    },
    /// A shader graph with a designated main texture.
    Shader {
        #[serde(default)]
        main_texture: Option<TextureId>,
    },
}

/// A texture as found in the source scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTexture {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: TextureKind,
    /// Filename as resolved by the loader.
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub relative_filename: String,
    #[serde(default)]
    pub absolute_filename: String,
    /// Embedded image bytes, passed through undecoded.
    #[serde(default)]
    pub content: Vec<u8>,
    /// Name of the UV set this texture samples with; empty for the default set.
    #[serde(default)]
    pub uv_set: String,
    #[serde(default)]
    pub uv_transform: Option<UvTransform>,
    /// File textures this texture is built from.
    #[serde(default)]
    pub file_textures: Vec<TextureId>,
}

impl RawTexture {
    /// A file texture referencing `filename`.
    pub fn file(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// A file texture with embedded content.
    pub fn embedded(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
            ..Default::default()
        }
    }

    /// A layered texture over `layers` (bottom first).
    pub fn layered(layers: Vec<TextureId>) -> Self {
        Self {
            kind: TextureKind::Layered { layers },
            ..Default::default()
        }
    }

    /// A shader texture whose main input is `main_texture`.
    pub fn shader(main_texture: Option<TextureId>) -> Self {
        Self {
            kind: TextureKind::Shader { main_texture },
            ..Default::default()
        }
    }

    /// First non-empty of filename, relative filename, absolute filename.
    pub fn best_path(&self) -> Option<&str> {
        [
            &self.filename,
            &self.relative_filename,
            &self.absolute_filename,
        ]
        .into_iter()
        .find(|p| !p.is_empty())
        .map(String::as_str)
    }

    /// Every texture handle this texture refers to.
    pub fn texture_refs(&self) -> Vec<TextureId> {
        let mut refs = self.file_textures.clone();
        match &self.kind {
            TextureKind::Layered { layers } => refs.extend_from_slice(layers),
            TextureKind::Shader {
                main_texture: Some(main),
            } => refs.push(*main),
            _ => {}
        }
        refs
    }
}
