// orientation.rs: device→Earth rotation estimate
//
// Two sources, chosen once per session from sensor availability:
//   - a fused rotation-vector sensor (quaternion), used directly
//   - otherwise a low-pass gravity estimate aligned onto +z
//
// Pure state machine: no I/O, no async, never fails.

use log::debug;

use crate::config::TrackerConfig;
use crate::sensors::{RawAccel, RotationVector};
use crate::types::{gravity_alignment, rotation_from_quaternion, Mat3, Timestamp, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrientationMode {
    RotationVector,
    GravityLowPass,
}

impl OrientationMode {
    pub fn from_sensor_availability(has_rotation_sensor: bool) -> Self {
        if has_rotation_sensor {
            OrientationMode::RotationVector
        } else {
            OrientationMode::GravityLowPass
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RotationState {
    pub rotation: Mat3,
    pub gravity: Vec3,
    pub has_rotation_sensor: bool,
}

impl RotationState {
    pub fn new(has_rotation_sensor: bool, gravity: f64) -> Self {
        Self {
            rotation: Mat3::identity(),
            gravity: Vec3::new(0.0, 0.0, gravity),
            has_rotation_sensor,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum OrientationInput<'a> {
    Accel(&'a RawAccel),
    RotationVector(&'a RotationVector),
}

pub struct OrientationEstimator {
    mode: OrientationMode,
    state: RotationState,
    time_constant: f64,
    first_sample_dt: f64,
    last_accel_ts: Option<Timestamp>,
    updates: u64,
}

impl OrientationEstimator {
    pub fn new(mode: OrientationMode, config: &TrackerConfig) -> Self {
        Self {
            mode,
            state: RotationState::new(mode == OrientationMode::RotationVector, config.gravity),
            time_constant: config.gravity_time_constant,
            first_sample_dt: config.first_sample_dt,
            last_accel_ts: None,
            updates: 0,
        }
    }

    pub fn mode(&self) -> OrientationMode {
        self.mode
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    pub fn rotation(&self) -> &Mat3 {
        &self.state.rotation
    }

    /// Number of inputs that changed the estimate
    pub fn update_count(&self) -> u64 {
        self.updates
    }

    pub fn update(&mut self, input: OrientationInput<'_>) -> &RotationState {
        match (self.mode, input) {
            (OrientationMode::RotationVector, OrientationInput::RotationVector(rv)) => {
                self.apply_rotation_vector(rv);
            }
            (OrientationMode::GravityLowPass, OrientationInput::Accel(accel)) => {
                self.apply_gravity(accel);
            }
            // Inputs for the other mode carry no orientation information here
            _ => {}
        }
        &self.state
    }

    fn apply_rotation_vector(&mut self, rv: &RotationVector) {
        let w = rv.scalar();
        self.state.rotation = rotation_from_quaternion(rv.x, rv.y, rv.z, w);
        self.updates += 1;
    }

    fn apply_gravity(&mut self, accel: &RawAccel) {
        let dt = match self.last_accel_ts {
            Some(prev) => ((accel.timestamp - prev) as f64 / 1000.0).max(0.0),
            None => self.first_sample_dt,
        };
        self.last_accel_ts = Some(accel.timestamp);

        let alpha = self.time_constant / (self.time_constant + dt);
        let raw = Vec3::new(accel.x, accel.y, accel.z);
        self.state.gravity = self.state.gravity * alpha + raw * (1.0 - alpha);

        match gravity_alignment(&self.state.gravity) {
            Some(rotation) => {
                self.state.rotation = rotation;
                self.updates += 1;
            }
            None => debug!("zero gravity estimate, keeping previous rotation"),
        }
    }
}
