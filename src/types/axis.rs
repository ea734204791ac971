//! Coordinate axis types for axis-convention handling.

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

/// A signed coordinate axis.
///
/// The integer codes (`0..=5`) are stable and are what [`ExportScene`](crate::ExportScene)
/// reports for its right/up axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinateAxis {
    #[serde(rename = "+x")]
    PositiveX,
    #[serde(rename = "-x")]
    NegativeX,
    #[serde(rename = "+y")]
    PositiveY,
    #[serde(rename = "-y")]
    NegativeY,
    #[serde(rename = "+z")]
    PositiveZ,
    #[serde(rename = "-z")]
    NegativeZ,
}

impl CoordinateAxis {
    /// All six axes in code order.
    pub const ALL: [CoordinateAxis; 6] = [
        CoordinateAxis::PositiveX,
        CoordinateAxis::NegativeX,
        CoordinateAxis::PositiveY,
        CoordinateAxis::NegativeY,
        CoordinateAxis::PositiveZ,
        CoordinateAxis::NegativeZ,
    ];

    /// Stable integer code of this axis.
    pub fn code(&self) -> i32 {
        match self {
            CoordinateAxis::PositiveX => 0,
            CoordinateAxis::NegativeX => 1,
            CoordinateAxis::PositiveY => 2,
            CoordinateAxis::NegativeY => 3,
            CoordinateAxis::PositiveZ => 4,
            CoordinateAxis::NegativeZ => 5,
        }
    }

    /// Parse an integer code back into an axis.
    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Get the unit vector for this axis.
    pub fn unit_vector(&self) -> DVec3 {
        match self {
            CoordinateAxis::PositiveX => DVec3::X,
            CoordinateAxis::NegativeX => DVec3::NEG_X,
            CoordinateAxis::PositiveY => DVec3::Y,
            CoordinateAxis::NegativeY => DVec3::NEG_Y,
            CoordinateAxis::PositiveZ => DVec3::Z,
            CoordinateAxis::NegativeZ => DVec3::NEG_Z,
        }
    }

    /// Index of the unsigned axis (0 = X, 1 = Y, 2 = Z).
    fn component(&self) -> usize {
        (self.code() / 2) as usize
    }
}

impl std::fmt::Display for CoordinateAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinateAxis::PositiveX => write!(f, "+X"),
            CoordinateAxis::NegativeX => write!(f, "-X"),
            CoordinateAxis::PositiveY => write!(f, "+Y"),
            CoordinateAxis::NegativeY => write!(f, "-Y"),
            CoordinateAxis::PositiveZ => write!(f, "+Z"),
            CoordinateAxis::NegativeZ => write!(f, "-Z"),
        }
    }
}

/// A right/up/front axis convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateAxes {
    pub right: CoordinateAxis,
    pub up: CoordinateAxis,
    pub front: CoordinateAxis,
}

impl CoordinateAxes {
    /// Right-handed, Y-up: X right, Y up, Z front.
    pub const RIGHT_HANDED_Y_UP: CoordinateAxes = CoordinateAxes {
        right: CoordinateAxis::PositiveX,
        up: CoordinateAxis::PositiveY,
        front: CoordinateAxis::PositiveZ,
    };

    /// Check that the three axes lie on distinct unsigned axes.
    pub fn is_valid(&self) -> bool {
        let (r, u, f) = (
            self.right.component(),
            self.up.component(),
            self.front.component(),
        );
        r != u && u != f && r != f
    }

    /// Matrix mapping vectors expressed in `self` into `target`.
    ///
    /// Returns `None` if either convention is degenerate.
    pub fn conversion_to(&self, target: &CoordinateAxes) -> Option<DMat3> {
        if !self.is_valid() || !target.is_valid() {
            return None;
        }
        // Rows of the source basis project a vector onto right/up/front.
        let to_semantic = DMat3::from_cols(
            self.right.unit_vector(),
            self.up.unit_vector(),
            self.front.unit_vector(),
        )
        .transpose();
        let from_semantic = DMat3::from_cols(
            target.right.unit_vector(),
            target.up.unit_vector(),
            target.front.unit_vector(),
        );
        Some(from_semantic * to_semantic)
    }
}

impl Default for CoordinateAxes {
    fn default() -> Self {
        Self::RIGHT_HANDED_Y_UP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_codes_round_trip() {
        for axis in CoordinateAxis::ALL {
            assert_eq!(CoordinateAxis::from_code(axis.code()), Some(axis));
        }
        assert_eq!(CoordinateAxis::from_code(6), None);
        assert_eq!(CoordinateAxis::from_code(-1), None);
    }

    #[test]
    fn test_identity_conversion() {
        let axes = CoordinateAxes::RIGHT_HANDED_Y_UP;
        let m = axes.conversion_to(&axes).unwrap();
        assert_eq!(m, DMat3::IDENTITY);
    }

    #[test]
    fn test_z_up_to_y_up() {
        let z_up = CoordinateAxes {
            right: CoordinateAxis::PositiveX,
            up: CoordinateAxis::PositiveZ,
            front: CoordinateAxis::NegativeY,
        };
        let m = z_up.conversion_to(&CoordinateAxes::RIGHT_HANDED_Y_UP).unwrap();
        // Source up (+Z) must map to target up (+Y).
        assert!((m * DVec3::Z - DVec3::Y).length() < 1e-12);
        // Source front (-Y) must map to target front (+Z).
        assert!((m * DVec3::NEG_Y - DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn test_degenerate_axes_rejected() {
        let bad = CoordinateAxes {
            right: CoordinateAxis::PositiveX,
            up: CoordinateAxis::NegativeX,
            front: CoordinateAxis::PositiveZ,
        };
        assert!(!bad.is_valid());
        assert!(bad.conversion_to(&CoordinateAxes::default()).is_none());
    }
}
