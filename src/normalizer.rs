use crate::sensors::RawAccel;
use crate::types::{AccelSample, Mat3, TripId, Vec3};

/// Rotates raw device-frame acceleration into the Earth frame and removes gravity.
#[derive(Clone, Copy, Debug)]
pub struct AccelerationNormalizer {
    gravity: f64,
}

impl AccelerationNormalizer {
    pub fn new(gravity: f64) -> Self {
        Self { gravity }
    }

    pub fn normalize(&self, raw: &RawAccel, rotation: &Mat3, trip_id: TripId, seq: u32) -> AccelSample {
        let earth = rotation * Vec3::new(raw.x, raw.y, raw.z);
        AccelSample {
            timestamp: raw.timestamp,
            seq,
            x: earth.x,
            y: earth.y,
            z: earth.z - self.gravity,
            trip_id,
        }
    }
}

impl Default for AccelerationNormalizer {
    fn default() -> Self {
        Self::new(9.81)
    }
}
