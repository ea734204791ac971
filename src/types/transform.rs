//! Transform types for node placement and texture coordinates.

use glam::{DAffine2, DMat3, DMat4, DQuat, DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// Translation/rotation/scale transform of a node or geometry offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub translation: [f64; 3],
    /// Rotation quaternion (x, y, z, w).
    #[serde(default = "identity_rotation")]
    pub rotation: [f64; 4],
    #[serde(default = "unit_scale")]
    pub scale: [f64; 3],
}

fn identity_rotation() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: identity_rotation(),
            scale: unit_scale(),
        }
    }
}

impl Transform {
    /// Check if this is an identity transform.
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Build the affine matrix (scale, then rotate, then translate).
    pub fn to_matrix(&self) -> DMat4 {
        let [x, y, z, w] = self.rotation;
        let rotation = DQuat::from_xyzw(x, y, z, w);
        // A zero quaternion can't be normalized; treat it as no rotation.
        let rotation = if rotation.length_squared() > 0.0 {
            rotation.normalize()
        } else {
            DQuat::IDENTITY
        };
        DMat4::from_scale_rotation_translation(
            DVec3::from(self.scale),
            rotation,
            DVec3::from(self.translation),
        )
    }
}

/// Inverse-transpose of the linear part of `m`, for transforming normals.
///
/// Singular matrices fall back to the plain linear part so that the result is
/// still usable after re-normalization. Singularity is judged relative to the
/// matrix's own scale, so uniformly tiny transforms still get an exact
/// inverse-transpose.
pub fn normal_matrix(m: &DMat4) -> DMat3 {
    let linear = DMat3::from_mat4(*m);
    let det = linear.determinant();
    let magnitude = linear.x_axis.length() * linear.y_axis.length() * linear.z_axis.length();
    if !det.is_finite() || det.abs() <= magnitude * 1e-12 {
        return linear;
    }
    let inverse = linear.inverse();
    if !inverse.is_finite() {
        return linear;
    }
    inverse.transpose()
}

/// Determinant of the linear part of `m`; negative when `m` mirrors.
pub fn handedness(m: &DMat4) -> f64 {
    DMat3::from_mat4(*m).determinant()
}

/// Normalize `v`, returning `fallback` for zero or non-finite vectors.
pub fn normalize_or(v: DVec3, fallback: DVec3) -> DVec3 {
    let n = v.normalize_or_zero();
    if n == DVec3::ZERO {
        fallback
    } else {
        n
    }
}

/// UV-to-texture-space transform declared by a texture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UvTransform {
    #[serde(default)]
    pub translation: [f64; 2],
    /// Rotation in degrees, counter-clockwise.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "unit_scale_2d")]
    pub scale: [f64; 2],
}

fn unit_scale_2d() -> [f64; 2] {
    [1.0, 1.0]
}

impl Default for UvTransform {
    fn default() -> Self {
        Self {
            translation: [0.0; 2],
            rotation: 0.0,
            scale: unit_scale_2d(),
        }
    }
}

impl UvTransform {
    /// The affine map from mesh UV space to texture space.
    pub fn uv_to_texture(&self) -> DAffine2 {
        DAffine2::from_scale_angle_translation(
            DVec2::from(self.scale),
            self.rotation.to_radians(),
            DVec2::from(self.translation),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transform_is_identity() {
        let t = Transform::default();
        assert!(t.is_identity());
        assert_eq!(t.to_matrix(), DMat4::IDENTITY);
    }

    #[test]
    fn test_normal_matrix_non_uniform_scale() {
        let m = DMat4::from_scale(DVec3::new(2.0, 1.0, 1.0));
        let n = normal_matrix(&m);
        // Normal of the plane x = y must stay perpendicular after scaling.
        let normal = (n * DVec3::new(1.0, -1.0, 0.0)).normalize();
        let tangent = m.transform_vector3(DVec3::new(1.0, 1.0, 0.0));
        assert!(normal.dot(tangent).abs() < 1e-12);
    }

    #[test]
    fn test_normal_matrix_tiny_non_uniform_scale() {
        // det is 2e-18, well under f64::EPSILON, but the matrix is regular.
        let m = DMat4::from_scale(DVec3::new(1e-6, 2e-6, 1e-6));
        let n = normal_matrix(&m);
        let normal = (n * DVec3::new(1.0, -1.0, 0.0)).normalize();
        let tangent = m.transform_vector3(DVec3::new(1.0, 1.0, 0.0)).normalize();
        assert!(normal.dot(tangent).abs() < 1e-9);
    }

    #[test]
    fn test_normal_matrix_singular_falls_back() {
        let m = DMat4::from_scale(DVec3::new(1.0, 0.0, 1.0));
        assert_eq!(normal_matrix(&m), DMat3::from_mat4(m));
    }

    #[test]
    fn test_mirror_has_negative_handedness() {
        let m = DMat4::from_scale(DVec3::new(-1.0, 1.0, 1.0));
        assert!(handedness(&m) < 0.0);
        assert!(handedness(&DMat4::IDENTITY) > 0.0);
    }

    #[test]
    fn test_uv_transform_scale_and_offset() {
        let t = UvTransform {
            translation: [0.5, 0.0],
            rotation: 0.0,
            scale: [2.0, 2.0],
        };
        let p = t.uv_to_texture().transform_point2(DVec2::new(0.25, 0.25));
        assert!((p - DVec2::new(1.0, 0.5)).length() < 1e-12);
    }

    #[test]
    fn test_normalize_or_fallback() {
        assert_eq!(normalize_or(DVec3::ZERO, DVec3::Y), DVec3::Y);
        assert_eq!(normalize_or(DVec3::new(0.0, 0.0, 3.0), DVec3::Y), DVec3::Z);
    }
}
