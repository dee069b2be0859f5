use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::batcher::{BatchSink, SampleBatcher};
use crate::config::TrackerConfig;
use crate::error::{TResult, TrackerError};
use crate::normalizer::AccelerationNormalizer;
use crate::orientation::{OrientationEstimator, OrientationInput, OrientationMode};
use crate::sensors::{FixGate, GpsFix, RawAccel, RotationVector, SensorEvent, SensorRequest};
use crate::types::{AccelSample, LocationSample, TripId};

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created but not recording
    Idle,
    /// Recording sensor data
    Recording,
    /// Stopped; buffers flushed, trip ready to close
    Finished,
}

/// Session metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub trip_id: TripId,
    pub start_time: Option<String>,
    pub state: SessionState,
    pub orientation_mode: String,
    pub accel_sample_count: u32,
    pub rotation_update_count: u32,
    pub gps_sample_count: u32,
    pub gps_rejected_count: u32,
}

/// Per-trip tracking state, owned by the sensor-thread caller.
///
/// Holds the orientation estimate and both batchers; a fresh session (and
/// therefore a fresh identity rotation) is built for every trip.
pub struct TrackingSession<K: BatchSink> {
    trip_id: TripId,
    state: SessionState,
    started_at: Option<String>,
    estimator: OrientationEstimator,
    normalizer: AccelerationNormalizer,
    fix_gate: FixGate,
    accel: SampleBatcher<AccelSample>,
    locations: SampleBatcher<LocationSample>,
    accel_seq: u32,
    location_seq: u32,
    rotation_updates: u32,
    gps_rejected: u32,
    sink: K,
}

impl<K: BatchSink> TrackingSession<K> {
    /// Create new session in Idle state
    pub fn new(trip_id: TripId, has_rotation_sensor: bool, config: &TrackerConfig, sink: K) -> Self {
        let mode = OrientationMode::from_sensor_availability(has_rotation_sensor);
        Self {
            trip_id,
            state: SessionState::Idle,
            started_at: None,
            estimator: OrientationEstimator::new(mode, config),
            normalizer: AccelerationNormalizer::new(config.gravity),
            fix_gate: SensorRequest::from_config(config).fix_gate(),
            accel: SampleBatcher::new(config.accel_batch_size),
            locations: SampleBatcher::new(config.location_batch_size),
            accel_seq: 0,
            location_seq: 0,
            rotation_updates: 0,
            gps_rejected: 0,
            sink,
        }
    }

    pub fn trip_id(&self) -> TripId {
        self.trip_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn estimator(&self) -> &OrientationEstimator {
        &self.estimator
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Transition to Recording state (Idle → Recording)
    pub fn start(&mut self) -> TResult<()> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Recording;
                self.started_at = Some(Utc::now().to_rfc3339());
                info!("trip {}: recording ({:?})", self.trip_id, self.estimator.mode());
                Ok(())
            }
            SessionState::Recording => Err(TrackerError::AlreadyRunning),
            SessionState::Finished => Err(TrackerError::InvalidParameters(format!(
                "trip {} already finished",
                self.trip_id
            ))),
        }
    }

    /// Flush both streams and end the trip (Recording → Finished)
    pub fn stop(&mut self) -> TResult<TripId> {
        if self.state != SessionState::Recording {
            return Err(TrackerError::NotRunning);
        }
        self.accel.flush(&self.sink)?;
        self.locations.flush(&self.sink)?;
        self.state = SessionState::Finished;
        info!(
            "trip {}: stopped after {} accel, {} gps samples",
            self.trip_id, self.accel_seq, self.location_seq
        );
        Ok(self.trip_id)
    }

    /// Returns the normalized sample, or `None` while not recording
    pub fn on_accel(&mut self, raw: &RawAccel) -> TResult<Option<AccelSample>> {
        if !self.is_recording() {
            return Ok(None);
        }
        let state = self.estimator.update(OrientationInput::Accel(raw));
        let sample = self.normalizer.normalize(raw, &state.rotation, self.trip_id, self.accel_seq);
        self.accel_seq = self.accel_seq.wrapping_add(1);
        self.accel.add(sample, &self.sink)?;
        Ok(Some(sample))
    }

    pub fn on_rotation_vector(&mut self, rv: &RotationVector) {
        if !self.is_recording() {
            return;
        }
        let before = self.estimator.update_count();
        self.estimator.update(OrientationInput::RotationVector(rv));
        if self.estimator.update_count() != before {
            self.rotation_updates += 1;
        }
    }

    /// Returns whether the fix was kept
    pub fn on_location(&mut self, fix: &GpsFix) -> TResult<bool> {
        if !self.is_recording() {
            return Ok(false);
        }
        if !self.fix_gate.accept(fix) {
            self.gps_rejected += 1;
            debug!("trip {}: fix at {} below update thresholds", self.trip_id, fix.timestamp);
            return Ok(false);
        }
        let sample = LocationSample {
            timestamp: fix.timestamp,
            seq: self.location_seq,
            latitude: fix.latitude,
            longitude: fix.longitude,
            trip_id: self.trip_id,
        };
        self.location_seq = self.location_seq.wrapping_add(1);
        self.locations.add(sample, &self.sink)?;
        Ok(true)
    }

    pub fn on_event(&mut self, event: &SensorEvent) -> TResult<()> {
        match event {
            SensorEvent::Accel(a) => {
                self.on_accel(a)?;
            }
            SensorEvent::Rotation(r) => self.on_rotation_vector(r),
            SensorEvent::Fix(f) => {
                self.on_location(f)?;
            }
        }
        Ok(())
    }

    /// Get metadata snapshot
    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            trip_id: self.trip_id,
            start_time: self.started_at.clone(),
            state: self.state,
            orientation_mode: format!("{:?}", self.estimator.mode()),
            accel_sample_count: self.accel_seq,
            rotation_update_count: self.rotation_updates,
            gps_sample_count: self.location_seq,
            gps_rejected_count: self.gps_rejected,
        }
    }

    /// Buffered (not yet flushed) sample counts: (accel, location)
    pub fn pending(&self) -> (usize, usize) {
        (self.accel.len(), self.locations.len())
    }
}
