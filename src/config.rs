// config.rs: tunables for the tracker pipeline
//
// Every constant the estimator, batchers, redactor and summarizer depend on
// lives here so a deployment can override them from a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TResult, TrackerError};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // ── Orientation ──
    pub gravity_time_constant: f64,
    pub first_sample_dt: f64,
    pub gravity: f64,

    // ── Batching ──
    pub accel_batch_size: usize,
    pub location_batch_size: usize,

    // ── Sensor requests ──
    pub sensor_delay_us: u64,
    pub max_report_latency_us: u64,
    pub min_fix_distance_m: f64,
    pub min_fix_interval_ms: i64,

    // ── Privacy ──
    pub privacy_radius_m: f64,

    // ── Display ──
    pub polyline_max_rms: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            gravity_time_constant: 1.8,
            first_sample_dt: 0.2,
            gravity: 9.81,
            accel_batch_size: 250,
            location_batch_size: 10,
            sensor_delay_us: 200_000,
            max_report_latency_us: 1_000_000,
            min_fix_distance_m: 10.0,
            min_fix_interval_ms: 5_000,
            privacy_radius_m: 50.0,
            polyline_max_rms: 3.5,
        }
    }
}

impl TrackerConfig {
    /// Load a config from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> TResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: TrackerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        log::info!("loaded tracker config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> TResult<()> {
        if self.accel_batch_size == 0 || self.location_batch_size == 0 {
            return Err(TrackerError::Config(
                "batch sizes must be at least 1".to_string(),
            ));
        }
        if !(self.gravity_time_constant > 0.0) {
            return Err(TrackerError::Config(format!(
                "gravity_time_constant must be positive, got {}",
                self.gravity_time_constant
            )));
        }
        if !(self.first_sample_dt >= 0.0) {
            return Err(TrackerError::Config(format!(
                "first_sample_dt must be non-negative, got {}",
                self.first_sample_dt
            )));
        }
        if !(self.polyline_max_rms > 0.0) {
            return Err(TrackerError::Config(format!(
                "polyline_max_rms must be positive, got {}",
                self.polyline_max_rms
            )));
        }
        Ok(())
    }
}
