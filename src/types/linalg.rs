//! Linear algebra helpers for orientation estimation
//!
//! All rotations follow the column-vector convention: a matrix `R` maps a
//! device-frame vector into the Earth frame as `v_earth = R * v_device`.

use nalgebra::{Matrix3, Vector3};

pub type Mat3 = Matrix3<f64>;
pub type Vec3 = Vector3<f64>;

// Tolerance for treating gravity as pointing straight down the device -z axis
const ANTIPARALLEL_EPS: f64 = 1e-12;

/// Expand a unit quaternion into the 9-element row-major array the platform
/// rotation-vector sensor API produces.
pub fn rotation_array_from_quaternion(x: f64, y: f64, z: f64, w: f64) -> [f64; 9] {
    let sq_x = 2.0 * x * x;
    let sq_y = 2.0 * y * y;
    let sq_z = 2.0 * z * z;
    let xy = 2.0 * x * y;
    let zw = 2.0 * z * w;
    let xz = 2.0 * x * z;
    let yw = 2.0 * y * w;
    let yz = 2.0 * y * z;
    let xw = 2.0 * x * w;

    [
        1.0 - sq_y - sq_z, xy - zw, xz + yw,
        xy + zw, 1.0 - sq_x - sq_z, yz - xw,
        xz - yw, yz + xw, 1.0 - sq_x - sq_y,
    ]
}

/// Device→Earth rotation from a rotation-vector reading.
///
/// The platform array, read column-major, is the Earth→device matrix; its
/// transpose is what gets applied to accelerometer vectors.
pub fn rotation_from_quaternion(x: f64, y: f64, z: f64, w: f64) -> Mat3 {
    let array = rotation_array_from_quaternion(x, y, z, w);
    Mat3::from_column_slice(&array).transpose()
}

/// Rotation taking the measured gravity direction onto Earth +z.
///
/// Rodrigues form `R = I + V + V²/(1 + c)` with `v = (g_y, -g_x, 0)/|g|`
/// and `c = g_z/|g|`. Returns `None` when `|g| == 0`.
pub fn gravity_alignment(gravity: &Vec3) -> Option<Mat3> {
    let norm = gravity.norm();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    let unit = gravity / norm;
    let c = unit.z;
    if (c + 1.0).abs() <= ANTIPARALLEL_EPS {
        return Some(reflection());
    }
    let v = Vec3::new(unit.y, -unit.x, 0.0);
    let skew = v.cross_matrix();
    Some(Mat3::identity() + skew + skew * skew / (1.0 + c))
}

/// Point reflection used when gravity is exactly antiparallel to +z.
pub fn reflection() -> Mat3 {
    -Mat3::identity()
}
