//! Raw material properties in both PBR and legacy shading models.

use super::TextureId;
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// A material property value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapValue {
    Real(f64),
    Vec4([f64; 4]),
    Vec3([f64; 3]),
}

impl MapValue {
    /// Scalar reading; vectors yield their first component.
    pub fn real(&self) -> f64 {
        match self {
            MapValue::Real(r) => *r,
            MapValue::Vec3(v) => v[0],
            MapValue::Vec4(v) => v[0],
        }
    }

    /// Vector reading; `None` for values with fewer than three components.
    pub fn vec3(&self) -> Option<DVec3> {
        match self {
            MapValue::Real(_) => None,
            MapValue::Vec3(v) => Some(DVec3::from(*v)),
            MapValue::Vec4([x, y, z, _]) => Some(DVec3::new(*x, *y, *z)),
        }
    }
}

/// A material property: an optional value and an optional texture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialMap {
    #[serde(default)]
    pub value: Option<MapValue>,
    #[serde(default)]
    pub texture: Option<TextureId>,
}

impl MaterialMap {
    pub fn real(value: f64) -> Self {
        Self {
            value: Some(MapValue::Real(value)),
            texture: None,
        }
    }

    pub fn color(rgb: [f64; 3]) -> Self {
        Self {
            value: Some(MapValue::Vec3(rgb)),
            texture: None,
        }
    }

    pub fn textured(texture: TextureId) -> Self {
        Self {
            value: None,
            texture: Some(texture),
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Scalar value, or `default` when unset.
    pub fn real_or(&self, default: f64) -> f64 {
        self.value.map(|v| v.real()).unwrap_or(default)
    }

    /// Color value, or `default` when unset or not a vector.
    pub fn vec3_or(&self, default: DVec3) -> DVec3 {
        self.value.and_then(|v| v.vec3()).unwrap_or(default)
    }

    fn textures(&self) -> impl Iterator<Item = TextureId> {
        self.texture.into_iter()
    }
}

/// Material feature toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialFeatures {
    #[serde(default)]
    pub pbr: bool,
    #[serde(default)]
    pub double_sided: bool,
}

/// Physically-based material inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PbrMaps {
    pub base_color: MaterialMap,
    pub base_factor: MaterialMap,
    pub metalness: MaterialMap,
    pub roughness: MaterialMap,
    pub glossiness: MaterialMap,
    pub emission_color: MaterialMap,
    pub emission_factor: MaterialMap,
    pub normal_map: MaterialMap,
}

/// Legacy (diffuse/specular) material inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyMaps {
    pub diffuse_color: MaterialMap,
    pub diffuse_factor: MaterialMap,
    pub transparency_factor: MaterialMap,
    pub specular_exponent: MaterialMap,
    pub emission_color: MaterialMap,
    pub emission_factor: MaterialMap,
    pub normal_map: MaterialMap,
    pub bump: MaterialMap,
}

/// A material as found in the source scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMaterial {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub features: MaterialFeatures,
    #[serde(default)]
    pub pbr: PbrMaps,
    #[serde(default)]
    pub legacy: LegacyMaps,
}

impl RawMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Every texture handle referenced by this material.
    pub fn texture_refs(&self) -> Vec<TextureId> {
        let p = &self.pbr;
        let l = &self.legacy;
        [
            &p.base_color,
            &p.base_factor,
            &p.metalness,
            &p.roughness,
            &p.glossiness,
            &p.emission_color,
            &p.emission_factor,
            &p.normal_map,
            &l.diffuse_color,
            &l.diffuse_factor,
            &l.transparency_factor,
            &l.specular_exponent,
            &l.emission_color,
            &l.emission_factor,
            &l.normal_map,
            &l.bump,
        ]
        .iter()
        .flat_map(|map| map.textures())
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_value_readings() {
        assert_eq!(MapValue::Real(0.5).real(), 0.5);
        assert_eq!(MapValue::Real(0.5).vec3(), None);
        assert_eq!(MapValue::Vec3([0.1, 0.2, 0.3]).real(), 0.1);
        assert_eq!(
            MapValue::Vec4([1.0, 2.0, 3.0, 4.0]).vec3(),
            Some(DVec3::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn test_map_value_json_shapes() {
        let real: MapValue = serde_json::from_str("0.25").unwrap();
        let vec3: MapValue = serde_json::from_str("[1.0, 0.5, 0.0]").unwrap();
        let vec4: MapValue = serde_json::from_str("[1.0, 0.5, 0.0, 1.0]").unwrap();
        assert_eq!(real, MapValue::Real(0.25));
        assert_eq!(vec3, MapValue::Vec3([1.0, 0.5, 0.0]));
        assert_eq!(vec4, MapValue::Vec4([1.0, 0.5, 0.0, 1.0]));
    }

    #[test]
    fn test_map_defaults() {
        let map = MaterialMap::default();
        assert!(!map.has_value());
        assert_eq!(map.real_or(2.0), 2.0);
        assert_eq!(map.vec3_or(DVec3::ONE), DVec3::ONE);
        // A scalar can't stand in for a color.
        assert_eq!(MaterialMap::real(0.3).vec3_or(DVec3::ONE), DVec3::ONE);
    }

    #[test]
    fn test_texture_refs() {
        let mut material = RawMaterial::new("m");
        material.pbr.base_color = MaterialMap::textured(TextureId(2));
        material.legacy.bump = MaterialMap::textured(TextureId(5));
        assert_eq!(material.texture_refs(), vec![TextureId(2), TextureId(5)]);
    }
}
