//! Root-state orientation

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Orientation as stored in a root-state row: `(x, y, z, w)`, unit length
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion([f32; 4]);

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion([0.0, 0.0, 0.0, 1.0]);

    /// Rotation about +Z, the only one a planar base can take
    pub fn from_yaw(yaw: f32) -> Self {
        Self::from_nalgebra(UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw))
    }

    /// Normalize a raw `(x, y, z, w)` row; a zero row maps to identity
    pub fn from_xyzw([x, y, z, w]: [f32; 4]) -> Self {
        let q = nalgebra::Quaternion::new(w, x, y, z);
        match UnitQuaternion::try_new(q, f32::EPSILON) {
            Some(unit) => Self::from_nalgebra(unit),
            None => Self::IDENTITY,
        }
    }

    pub fn from_nalgebra(unit: UnitQuaternion<f32>) -> Self {
        let q = unit.quaternion();
        Self([q.i, q.j, q.k, q.w])
    }

    pub fn to_nalgebra(&self) -> UnitQuaternion<f32> {
        let [x, y, z, w] = self.0;
        UnitQuaternion::new_unchecked(nalgebra::Quaternion::new(w, x, y, z))
    }

    /// Values in root-state column order
    pub fn to_xyzw(&self) -> [f32; 4] {
        self.0
    }

    /// Heading in radians
    pub fn yaw(&self) -> f32 {
        self.to_nalgebra().euler_angles().2
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_quarter_turn() {
        let [x, y, z, w] = Quaternion::from_yaw(FRAC_PI_2).to_xyzw();
        assert_relative_eq!(x, 0.0);
        assert_relative_eq!(y, 0.0);
        assert_relative_eq!(z, std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
        assert_relative_eq!(w, std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
    }

    #[test]
    fn test_yaw_recovered_from_row() {
        let row = Quaternion::from_yaw(-0.7).to_xyzw();
        assert_relative_eq!(Quaternion::from_xyzw(row).yaw(), -0.7, epsilon = 1e-5);
    }

    #[test]
    fn test_unnormalized_rows() {
        let q = Quaternion::from_xyzw([0.0, 0.0, 0.0, 2.0]);
        assert_eq!(q, Quaternion::IDENTITY);
        assert_eq!(Quaternion::from_xyzw([0.0; 4]), Quaternion::default());
    }
}
