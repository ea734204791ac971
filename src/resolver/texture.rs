//! Texture indirection resolution.

use crate::export_scene::TextureReference;
use crate::scene::{RawScene, RawTexture, TextureId, TextureKind};
use log::warn;

/// Default bound on layered/shader indirection chains.
pub const MAX_TEXTURE_DEPTH: usize = 16;

/// Follows layered and shader textures down to the texture that holds data.
pub struct TextureResolver<'a> {
    scene: &'a RawScene,
    max_depth: usize,
}

impl<'a> TextureResolver<'a> {
    pub fn new(scene: &'a RawScene) -> Self {
        Self {
            scene,
            max_depth: MAX_TEXTURE_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The leaf texture reached from `texture`, if any.
    ///
    /// Layered textures descend into their topmost layer, shader textures
    /// into their main texture. Anything else yields its first file texture,
    /// or itself.
    pub fn leaf(&self, texture: Option<TextureId>) -> Option<&'a RawTexture> {
        self.leaf_internal(texture?, 0)
    }

    fn leaf_internal(&self, id: TextureId, depth: usize) -> Option<&'a RawTexture> {
        let texture = self.scene.texture(id)?;

        if depth >= self.max_depth {
            warn!(
                "Texture chain through '{}' exceeds depth {}, stopping there",
                texture.name, self.max_depth
            );
            return Some(texture);
        }

        match &texture.kind {
            TextureKind::Layered { layers } if !layers.is_empty() => {
                return layers
                    .last()
                    .and_then(|top| self.leaf_internal(*top, depth + 1));
            }
            TextureKind::Shader {
                main_texture: Some(main),
            } => return self.leaf_internal(*main, depth + 1),
            _ => {}
        }

        match texture.file_textures.first() {
            Some(first) => self.scene.texture(*first),
            None => Some(texture),
        }
    }

    /// Resolve `texture` to an owned reference.
    ///
    /// Content is copied only when non-empty; the path is the first non-empty
    /// of filename, relative filename and absolute filename.
    pub fn resolve(&self, texture: Option<TextureId>) -> TextureReference {
        match self.leaf(texture) {
            Some(leaf) => TextureReference {
                path: leaf.best_path().map(str::to_string),
                content: (!leaf.content.is_empty()).then(|| leaf.content.clone()),
            },
            None => TextureReference::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_resolves_to_empty() {
        let scene = RawScene::new();
        let resolver = TextureResolver::new(&scene);
        assert!(resolver.leaf(None).is_none());
        assert!(resolver.resolve(None).is_empty());
    }

    #[test]
    fn test_layered_uses_topmost_layer() {
        let mut scene = RawScene::new();
        let bottom = scene.add_texture(RawTexture::file("bottom.png"));
        let top = scene.add_texture(RawTexture::file("top.png"));
        let layered = scene.add_texture(RawTexture::layered(vec![bottom, top]));

        let reference = TextureResolver::new(&scene).resolve(Some(layered));
        assert_eq!(reference.path.as_deref(), Some("top.png"));
        assert!(reference.content.is_none());
    }

    #[test]
    fn test_shader_main_texture() {
        let mut scene = RawScene::new();
        let main = scene.add_texture(RawTexture::embedded("main.png", vec![0x89, b'P']));
        let shader = scene.add_texture(RawTexture::shader(Some(main)));

        let reference = TextureResolver::new(&scene).resolve(Some(shader));
        assert_eq!(reference.path.as_deref(), Some("main.png"));
        assert_eq!(reference.content_len(), 2);
    }

    #[test]
    fn test_shader_without_main_uses_file_texture() {
        let mut scene = RawScene::new();
        let file = scene.add_texture(RawTexture::file("backing.png"));
        let mut shader = RawTexture::shader(None);
        shader.file_textures.push(file);
        let shader = scene.add_texture(shader);

        let leaf = TextureResolver::new(&scene).leaf(Some(shader)).unwrap();
        assert_eq!(leaf.filename, "backing.png");
    }

    #[test]
    fn test_empty_layered_is_its_own_leaf() {
        let mut scene = RawScene::new();
        let mut layered = RawTexture::layered(Vec::new());
        layered.relative_filename = "rel/layers.png".to_string();
        let id = scene.add_texture(layered);

        let reference = TextureResolver::new(&scene).resolve(Some(id));
        assert_eq!(reference.path.as_deref(), Some("rel/layers.png"));
    }

    #[test]
    fn test_depth_bound_stops_cycles() {
        let mut scene = RawScene::new();
        // Two shader textures pointing at each other.
        let mut a = RawTexture::shader(Some(TextureId(1)));
        a.filename = "a.png".to_string();
        let mut b = RawTexture::shader(Some(TextureId(0)));
        b.filename = "b.png".to_string();
        scene.add_texture(a);
        scene.add_texture(b);

        let resolver = TextureResolver::new(&scene).with_max_depth(3);
        let leaf = resolver.leaf(Some(TextureId(0))).unwrap();
        // Depths 0..=3 alternate a, b, a, b.
        assert_eq!(leaf.filename, "b.png");
    }

    #[test]
    fn test_empty_content_not_copied() {
        let mut scene = RawScene::new();
        let id = scene.add_texture(RawTexture::embedded("", Vec::new()));
        let reference = TextureResolver::new(&scene).resolve(Some(id));
        assert!(reference.is_empty());
    }
}
