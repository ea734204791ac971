//! Geographic placement of a Y-up scene on the WGS84 ellipsoid.
//!
//! Scene coordinates are meters in a right-handed Y-up frame: +X east, +Y up
//! and +Z south. [`GeoContext`] scales and turns them about +Y by a heading,
//! then anchors the frame at a geodetic origin in Earth-centered, Earth-fixed
//! (ECEF) coordinates.

use glam::{DMat3, DMat4, DVec3};

/// WGS84 semi-major axis, in meters.
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// A scene's placement on the globe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoContext {
    heading: f64,
    scale: f64,
    origin_ecef: DVec3,
    enu_to_ecef: DMat3,
}

impl GeoContext {
    /// Place the scene origin at `lat_deg`/`lon_deg` and `height` meters above
    /// the ellipsoid, rotated by `heading_deg` and scaled by `scale`.
    pub fn new(lat_deg: f64, lon_deg: f64, height: f64, heading_deg: f64, scale: f64) -> Self {
        let lat = lat_deg.to_radians();
        let lon = lon_deg.to_radians();
        Self {
            heading: heading_deg.to_radians(),
            scale,
            origin_ecef: geodetic_to_ecef(lat, lon, height),
            enu_to_ecef: enu_to_ecef_matrix(lat, lon),
        }
    }

    /// Heading in radians.
    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The origin in ECEF meters.
    pub fn origin_ecef(&self) -> DVec3 {
        self.origin_ecef
    }

    /// Scale `pos`, then rotate it about +Y by the heading.
    pub fn transform_local(&self, pos: DVec3) -> DVec3 {
        let p = pos * self.scale;
        let (sin_h, cos_h) = self.heading.sin_cos();
        DVec3::new(p.x * cos_h - p.z * sin_h, p.y, p.x * sin_h + p.z * cos_h)
    }

    /// Local-to-ECEF matrix for content authored Y-up and presented Z-up
    /// (the 3D Tiles convention: glTF +Y becomes tile +Z, glTF +Z becomes
    /// tile -Y).
    ///
    /// Tile +X is east, +Y north and +Z up before the heading, which turns
    /// the frame about up the same way [`transform_local`](Self::transform_local)
    /// does.
    pub fn transform(&self) -> DMat4 {
        let (sin_h, cos_h) = self.heading.sin_cos();
        let heading = DMat3::from_cols(
            DVec3::new(cos_h, -sin_h, 0.0),
            DVec3::new(sin_h, cos_h, 0.0),
            DVec3::Z,
        );
        let linear = self.enu_to_ecef * heading * self.scale;
        DMat4::from_mat3_translation(linear, self.origin_ecef)
    }

    /// [`transform`](Self::transform) as 16 column-major values.
    pub fn transform_matrix(&self) -> [f64; 16] {
        self.transform().to_cols_array()
    }
}

/// Geodetic latitude/longitude (radians) and ellipsoidal height to ECEF.
pub fn geodetic_to_ecef(lat: f64, lon: f64, height: f64) -> DVec3 {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    DVec3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - e2) + height) * sin_lat,
    )
}

/// Columns are the east, north and up directions at the given point.
fn enu_to_ecef_matrix(lat: f64, lon: f64) -> DMat3 {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    DMat3::from_cols(
        DVec3::new(-sin_lon, cos_lon, 0.0),
        DVec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat),
        DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_equator_prime_meridian() {
        let p = geodetic_to_ecef(0.0, 0.0, 0.0);
        assert_relative_eq!(p.x, WGS84_A, epsilon = 1e-6);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_north_pole_uses_polar_radius() {
        let p = geodetic_to_ecef(90f64.to_radians(), 0.0, 10.0);
        let polar = WGS84_A * (1.0 - WGS84_F);
        assert_relative_eq!(p.z, polar + 10.0, epsilon = 1e-6);
        assert!(p.x.abs() < 1e-6);
    }

    #[test]
    fn test_transform_local_heading_and_scale() {
        let geo = GeoContext::new(0.0, 0.0, 0.0, 90.0, 2.0);
        let p = geo.transform_local(DVec3::new(1.0, 3.0, 0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 6.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_maps_axes_at_equator() {
        // At (0, 0): east is ECEF +Y, north is +Z, up is +X.
        let geo = GeoContext::new(0.0, 0.0, 0.0, 0.0, 1.0);
        let m = geo.transform();
        let origin = m.transform_point3(DVec3::ZERO);
        assert_relative_eq!(origin.x, WGS84_A, epsilon = 1e-6);

        assert!((m.transform_vector3(DVec3::X) - DVec3::Y).length() < 1e-12);
        assert!((m.transform_vector3(DVec3::Y) - DVec3::Z).length() < 1e-12);
        assert!((m.transform_vector3(DVec3::Z) - DVec3::X).length() < 1e-12);

        let cols = geo.transform_matrix();
        assert_eq!(cols[15], 1.0);
        assert_relative_eq!(cols[12], WGS84_A, epsilon = 1e-6);
    }

    #[test]
    fn test_heading_agrees_with_transform_local() {
        let geo = GeoContext::new(0.0, 0.0, 0.0, 90.0, 1.0);
        // glTF +X turns to glTF +Z, which faces south.
        let local = geo.transform_local(DVec3::X);
        assert!((local - DVec3::Z).length() < 1e-12);
        let south = geo.transform().transform_vector3(DVec3::X);
        assert!((south - DVec3::NEG_Z).length() < 1e-12);
        // Up is unaffected by heading.
        let up = geo.transform().transform_vector3(DVec3::Z);
        assert!((up - DVec3::X).length() < 1e-12);
    }

    #[test]
    fn test_transform_is_scaled_rotation() {
        let geo = GeoContext::new(39.9, 116.4, 50.0, 30.0, 0.5);
        let m = DMat3::from_mat4(geo.transform());
        for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
            assert_relative_eq!((m * axis).length(), 0.5, epsilon = 1e-12);
        }
        assert!(m.determinant() > 0.0);
    }
}
