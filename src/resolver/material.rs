//! Material resolution into a single PBR-style description.

use super::texture::TextureResolver;
use crate::export_scene::ResolvedMaterial;
use crate::scene::{MaterialId, MaterialMap, RawMaterial, RawScene, TextureId};
use glam::DVec3;
use std::collections::HashMap;

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn to_rgb(v: DVec3) -> [f32; 3] {
    v.as_vec3().to_array()
}

/// First texture present among `maps`, in order.
fn first_texture(maps: &[&MaterialMap]) -> Option<TextureId> {
    maps.iter().find_map(|map| map.texture)
}

/// Returns `true` if the material is read through its PBR maps.
pub fn uses_pbr(material: &RawMaterial) -> bool {
    material.features.pbr
        || material.pbr.base_color.has_value()
        || material.pbr.base_factor.has_value()
        || material.pbr.base_color.texture.is_some()
}

/// The texture whose UV set drives the texture coordinates of faces drawn
/// with `material`.
pub fn uv_source_texture(material: &RawMaterial) -> Option<TextureId> {
    first_texture(&[
        &material.pbr.base_color,
        &material.legacy.diffuse_color,
        &material.pbr.emission_color,
        &material.legacy.emission_color,
    ])
}

/// Resolves raw materials, following texture indirections along the way.
pub struct MaterialResolver<'a> {
    textures: TextureResolver<'a>,
}

impl<'a> MaterialResolver<'a> {
    pub fn new(textures: TextureResolver<'a>) -> Self {
        Self { textures }
    }

    /// Resolve a single material.
    pub fn resolve(&self, material: &RawMaterial) -> ResolvedMaterial {
        let pbr = &material.pbr;
        let legacy = &material.legacy;

        let (base_color, base_factor) = if uses_pbr(material) {
            (
                pbr.base_color.vec3_or(DVec3::ONE),
                pbr.base_factor.real_or(1.0),
            )
        } else {
            (
                legacy.diffuse_color.vec3_or(DVec3::ONE),
                legacy.diffuse_factor.real_or(1.0),
            )
        };
        let alpha = legacy
            .transparency_factor
            .value
            .map_or(1.0, |t| clamp01(1.0 - t.real()));
        let rgb = base_color * base_factor;

        let metallic = pbr.metalness.real_or(0.0);
        let roughness = if pbr.roughness.has_value() {
            pbr.roughness.real_or(1.0)
        } else if pbr.glossiness.has_value() {
            1.0 - pbr.glossiness.real_or(0.0)
        } else if legacy.specular_exponent.has_value() {
            let shininess = legacy.specular_exponent.real_or(0.0);
            (2.0 / (shininess + 2.0)).sqrt()
        } else {
            1.0
        };

        let (emission, emission_factor) =
            if pbr.emission_color.has_value() || pbr.emission_factor.has_value() {
                (
                    pbr.emission_color.vec3_or(DVec3::ZERO),
                    pbr.emission_factor.real_or(1.0),
                )
            } else if legacy.emission_color.has_value() || legacy.emission_factor.has_value() {
                (
                    legacy.emission_color.vec3_or(DVec3::ZERO),
                    legacy.emission_factor.real_or(1.0),
                )
            } else {
                (DVec3::ZERO, 1.0)
            };

        let base_texture = first_texture(&[&pbr.base_color, &legacy.diffuse_color]);
        let normal_texture = first_texture(&[&pbr.normal_map, &legacy.normal_map, &legacy.bump]);
        let emissive_texture = first_texture(&[&pbr.emission_color, &legacy.emission_color]);

        ResolvedMaterial {
            name: (!material.name.is_empty()).then(|| material.name.clone()),
            base_color: [rgb.x as f32, rgb.y as f32, rgb.z as f32, alpha as f32],
            emissive: to_rgb(emission * emission_factor),
            metallic: clamp01(metallic) as f32,
            // NaN from a shininess of -2 or below ends up fully rough.
            roughness: if roughness.is_nan() { 1.0 } else { clamp01(roughness) as f32 },
            double_sided: material.features.double_sided,
            base_color_texture: self.textures.resolve(base_texture),
            normal_texture: self.textures.resolve(normal_texture),
            emissive_texture: self.textures.resolve(emissive_texture),
        }
    }
}

/// The scene's resolved materials plus the handle-to-index lookup used when
/// partitioning faces.
#[derive(Debug, Clone)]
pub struct MaterialTable {
    materials: Vec<ResolvedMaterial>,
    indices: HashMap<MaterialId, u32>,
}

impl MaterialTable {
    /// Resolve every material of `scene` in arena order.
    ///
    /// A scene without materials gets the single default white material.
    pub fn build(scene: &RawScene, max_texture_depth: usize) -> Self {
        let resolver = MaterialResolver::new(
            TextureResolver::new(scene).with_max_depth(max_texture_depth),
        );

        let mut materials = Vec::with_capacity(scene.materials.len().max(1));
        let mut indices = HashMap::with_capacity(scene.materials.len());
        for (i, material) in scene.materials.iter().enumerate() {
            materials.push(resolver.resolve(material));
            indices.insert(MaterialId(i as u32), i as u32);
        }
        if materials.is_empty() {
            materials.push(ResolvedMaterial::default_white());
        }

        Self { materials, indices }
    }

    /// Output index of `material`; unknown or absent materials map to 0.
    pub fn index_of(&self, material: Option<MaterialId>) -> u32 {
        material
            .and_then(|id| self.indices.get(&id).copied())
            .unwrap_or(0)
    }

    pub fn materials(&self) -> &[ResolvedMaterial] {
        &self.materials
    }

    pub fn into_materials(self) -> Vec<ResolvedMaterial> {
        self.materials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::RawTexture;
    use approx::assert_relative_eq;

    fn resolve(scene: &RawScene, material: &RawMaterial) -> ResolvedMaterial {
        MaterialResolver::new(TextureResolver::new(scene)).resolve(material)
    }

    #[test]
    fn test_legacy_diffuse_with_transparency() {
        let scene = RawScene::new();
        let mut material = RawMaterial::new("legacy");
        material.legacy.diffuse_color = MaterialMap::color([0.5, 0.5, 0.5]);
        material.legacy.diffuse_factor = MaterialMap::real(2.0);
        material.legacy.transparency_factor = MaterialMap::real(0.25);

        let resolved = resolve(&scene, &material);
        assert_eq!(resolved.base_color, [1.0, 1.0, 1.0, 0.75]);
        assert_eq!(resolved.name.as_deref(), Some("legacy"));
        assert!(resolved.is_transparent());
    }

    #[test]
    fn test_unnamed_material_has_no_name() {
        let scene = RawScene::new();
        let resolved = resolve(&scene, &RawMaterial::new(""));
        assert_eq!(resolved.name, None);
    }

    #[test]
    fn test_shininess_to_roughness() {
        let scene = RawScene::new();
        let mut material = RawMaterial::new("shiny");
        material.legacy.specular_exponent = MaterialMap::real(50.0);

        let resolved = resolve(&scene, &material);
        assert_relative_eq!(resolved.roughness, 0.196_116, epsilon = 1e-4);
        assert_eq!(resolved.metallic, 0.0);
    }

    #[test]
    fn test_roughness_precedence() {
        let scene = RawScene::new();
        let mut material = RawMaterial::new("m");
        material.legacy.specular_exponent = MaterialMap::real(50.0);
        material.pbr.glossiness = MaterialMap::real(0.75);
        assert_relative_eq!(resolve(&scene, &material).roughness, 0.25);

        material.pbr.roughness = MaterialMap::real(0.6);
        assert_relative_eq!(resolve(&scene, &material).roughness, 0.6);

        assert_eq!(resolve(&scene, &RawMaterial::new("plain")).roughness, 1.0);
    }

    #[test]
    fn test_metallic_and_roughness_clamped_colors_not() {
        let scene = RawScene::new();
        let mut material = RawMaterial::new("hot");
        material.features.pbr = true;
        material.pbr.base_color = MaterialMap::color([2.0, 0.5, 0.0]);
        material.pbr.metalness = MaterialMap::real(1.5);
        material.pbr.roughness = MaterialMap::real(-0.5);
        material.pbr.emission_color = MaterialMap::color([1.0, 1.0, 1.0]);
        material.pbr.emission_factor = MaterialMap::real(4.0);

        let resolved = resolve(&scene, &material);
        assert_eq!(resolved.metallic, 1.0);
        assert_eq!(resolved.roughness, 0.0);
        assert_eq!(resolved.base_color, [2.0, 0.5, 0.0, 1.0]);
        assert_eq!(resolved.emissive, [4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_pbr_selected_by_base_texture() {
        let mut scene = RawScene::new();
        let tex = scene.add_texture(RawTexture::file("albedo.png"));
        let mut material = RawMaterial::new("m");
        material.pbr.base_color = MaterialMap::textured(tex);
        // Ignored: the PBR path reads the (unset) PBR base color.
        material.legacy.diffuse_color = MaterialMap::color([0.1, 0.2, 0.3]);

        assert!(uses_pbr(&material));
        let resolved = resolve(&scene, &material);
        assert_eq!(resolved.base_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(resolved.base_color_texture.path.as_deref(), Some("albedo.png"));
    }

    #[test]
    fn test_legacy_emission_and_texture_fallbacks() {
        let mut scene = RawScene::new();
        let diffuse = scene.add_texture(RawTexture::file("diffuse.png"));
        let bump = scene.add_texture(RawTexture::file("bump.png"));
        let glow = scene.add_texture(RawTexture::file("glow.png"));

        let mut material = RawMaterial::new("m");
        material.legacy.diffuse_color = MaterialMap::textured(diffuse);
        material.legacy.bump = MaterialMap::textured(bump);
        material.legacy.emission_color = MaterialMap {
            value: Some(crate::scene::MapValue::Vec3([0.5, 0.25, 0.0])),
            texture: Some(glow),
        };
        material.legacy.emission_factor = MaterialMap::real(2.0);

        let resolved = resolve(&scene, &material);
        assert_eq!(resolved.emissive, [1.0, 0.5, 0.0]);
        assert_eq!(resolved.base_color_texture.path.as_deref(), Some("diffuse.png"));
        assert_eq!(resolved.normal_texture.path.as_deref(), Some("bump.png"));
        assert_eq!(resolved.emissive_texture.path.as_deref(), Some("glow.png"));
        assert_eq!(uv_source_texture(&material), Some(diffuse));
    }

    #[test]
    fn test_uv_source_order() {
        let mut material = RawMaterial::new("m");
        assert_eq!(uv_source_texture(&material), None);
        material.legacy.emission_color = MaterialMap::textured(TextureId(3));
        assert_eq!(uv_source_texture(&material), Some(TextureId(3)));
        material.pbr.emission_color = MaterialMap::textured(TextureId(2));
        assert_eq!(uv_source_texture(&material), Some(TextureId(2)));
        material.legacy.diffuse_color = MaterialMap::textured(TextureId(1));
        assert_eq!(uv_source_texture(&material), Some(TextureId(1)));
        material.pbr.base_color = MaterialMap::textured(TextureId(0));
        assert_eq!(uv_source_texture(&material), Some(TextureId(0)));
    }

    #[test]
    fn test_table_default_material() {
        let scene = RawScene::new();
        let table = MaterialTable::build(&scene, 16);
        assert_eq!(table.materials().len(), 1);
        let default = &table.materials()[0];
        assert_eq!(default.base_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(default.roughness, 1.0);
        assert_eq!(default.metallic, 0.0);
        assert!(default.base_color_texture.is_empty());
        assert_eq!(table.index_of(Some(MaterialId(7))), 0);
        assert_eq!(table.index_of(None), 0);
    }

    #[test]
    fn test_table_indices_follow_arena_order() {
        let mut scene = RawScene::new();
        scene.add_material(RawMaterial::new("a"));
        let b = scene.add_material(RawMaterial::new("b"));
        let table = MaterialTable::build(&scene, 16);
        assert_eq!(table.materials().len(), 2);
        assert_eq!(table.index_of(Some(b)), 1);
        assert_eq!(table.materials()[1].name.as_deref(), Some("b"));
    }
}
