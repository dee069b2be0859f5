use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio::time::{sleep, Duration};

use crate::config::TrackerConfig;
use crate::geodesy::haversine_km;
use crate::types::Timestamp;

/// Raw accelerometer reading in the device frame (m/s², gravity included)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawAccel {
    pub timestamp: Timestamp,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Fused rotation-vector reading: quaternion vector part plus optional scalar
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotationVector {
    pub timestamp: Timestamp,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub w: Option<f64>,
}

impl RotationVector {
    /// Quaternion scalar part, recovered from the unit norm when the sensor omits it
    pub fn scalar(&self) -> f64 {
        match self.w {
            Some(w) => w,
            None => (1.0 - self.x * self.x - self.y * self.y - self.z * self.z)
                .max(0.0)
                .sqrt(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub timestamp: Timestamp,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    Accel(RawAccel),
    Rotation(RotationVector),
    Fix(GpsFix),
}

impl SensorEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            SensorEvent::Accel(a) => a.timestamp,
            SensorEvent::Rotation(r) => r.timestamp,
            SensorEvent::Fix(f) => f.timestamp,
        }
    }

    /// Rewrite the event time, e.g. from the boot clock to wall-clock ms
    pub fn retime(&mut self, f: impl Fn(Timestamp) -> Timestamp) {
        match self {
            SensorEvent::Accel(a) => a.timestamp = f(a.timestamp),
            SensorEvent::Rotation(r) => r.timestamp = f(r.timestamp),
            SensorEvent::Fix(g) => g.timestamp = f(g.timestamp),
        }
    }
}

/// Converts sensor event times (nanoseconds since boot) into wall-clock ms.
///
/// The offset is captured once, from a paired reading of both clocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensorClock {
    offset_ms: i64,
}

impl SensorClock {
    pub fn new(wall_clock_ms: Timestamp, elapsed_realtime_ms: i64) -> Self {
        Self { offset_ms: wall_clock_ms - elapsed_realtime_ms }
    }

    pub fn to_wall_ms(&self, event_nanos: i64) -> Timestamp {
        event_nanos / 1_000_000 + self.offset_ms
    }
}

/// Registration parameters the host platform should use for each sensor
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorRequest {
    pub sampling_period_us: u64,
    pub max_report_latency_us: u64,
    pub min_fix_interval_ms: i64,
    pub min_fix_distance_m: f64,
}

impl SensorRequest {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            sampling_period_us: config.sensor_delay_us,
            max_report_latency_us: config.max_report_latency_us,
            min_fix_interval_ms: config.min_fix_interval_ms,
            min_fix_distance_m: config.min_fix_distance_m,
        }
    }

    pub fn sample_rate_hz(&self) -> f64 {
        1_000_000.0 / self.sampling_period_us.max(1) as f64
    }

    pub fn fix_gate(&self) -> FixGate {
        FixGate::new(self.min_fix_interval_ms, self.min_fix_distance_m)
    }
}

/// Drops fixes that arrive sooner or closer than the requested update thresholds.
#[derive(Clone, Debug)]
pub struct FixGate {
    min_interval_ms: i64,
    min_distance_m: f64,
    last: Option<GpsFix>,
}

impl FixGate {
    pub fn new(min_interval_ms: i64, min_distance_m: f64) -> Self {
        Self { min_interval_ms, min_distance_m, last: None }
    }

    pub fn accept(&mut self, fix: &GpsFix) -> bool {
        if let Some(last) = self.last {
            if fix.timestamp - last.timestamp < self.min_interval_ms {
                return false;
            }
            let moved_m =
                haversine_km(last.latitude, last.longitude, fix.latitude, fix.longitude) * 1000.0;
            if moved_m < self.min_distance_m {
                return false;
            }
        }
        self.last = Some(*fix);
        true
    }
}

// ─── Simulated ride ──────────────────────────────────────────────────────────

/// Deterministic straight ride due north, for demos and tests.
#[derive(Clone, Debug)]
pub struct SimulatedRide {
    pub start_ms: Timestamp,
    pub start_lat: f64,
    pub start_lon: f64,
    pub speed_mps: f64,
    pub duration_s: f64,
    pub accel_hz: f64,
    pub fix_interval_ms: i64,
    pub bump_amplitude: f64,
    pub with_rotation_vector: bool,
}

impl Default for SimulatedRide {
    fn default() -> Self {
        Self {
            start_ms: 1_700_000_000_000,
            start_lat: 53.5232,
            start_lon: -113.5263,
            speed_mps: 5.0,
            duration_s: 300.0,
            accel_hz: 5.0,
            fix_interval_ms: 5_000,
            bump_amplitude: 1.2,
            with_rotation_vector: false,
        }
    }
}

impl SimulatedRide {
    /// Vertical road excitation at `t` seconds; roughness varies slowly along the route
    fn bump(&self, t: f64) -> f64 {
        let patch = 1.0 + (t / 30.0).sin();
        let tau = std::f64::consts::TAU;
        self.bump_amplitude * patch * ((tau * 1.3 * t).sin() + 0.5 * (tau * 3.7 * t).sin())
    }

    pub fn events(&self) -> Vec<SensorEvent> {
        let mut events = Vec::new();
        let accel_step_ms = (1000.0 / self.accel_hz).round().max(1.0) as i64;
        let end_ms = self.start_ms + (self.duration_s * 1000.0) as i64;
        // Device mounted upright: +y points up, so gravity reads on y
        let half = std::f64::consts::FRAC_PI_4;

        let mut ts = self.start_ms;
        while ts <= end_ms {
            let t = (ts - self.start_ms) as f64 / 1000.0;
            if self.with_rotation_vector {
                events.push(SensorEvent::Rotation(RotationVector {
                    timestamp: ts,
                    x: half.sin(),
                    y: 0.0,
                    z: 0.0,
                    w: Some(half.cos()),
                }));
            }
            events.push(SensorEvent::Accel(RawAccel {
                timestamp: ts,
                x: 0.05 * (t * 0.7).sin(),
                y: 9.81 + self.bump(t),
                z: 0.0,
            }));
            ts += accel_step_ms;
        }

        let mut ts = self.start_ms;
        while ts <= end_ms {
            let t = (ts - self.start_ms) as f64 / 1000.0;
            let north_km = self.speed_mps * t / 1000.0;
            events.push(SensorEvent::Fix(GpsFix {
                timestamp: ts,
                latitude: self.start_lat + (north_km / crate::geodesy::EARTH_RADIUS_KM).to_degrees(),
                longitude: self.start_lon,
            }));
            ts += self.fix_interval_ms.max(1);
        }

        events.sort_by_key(|e| e.timestamp());
        events
    }
}

/// Pushes recorded or simulated events into the session channel.
///
/// `pace` replays at that speed-up factor relative to event time; `None` sends
/// as fast as the channel accepts.
pub async fn event_loop(events: Vec<SensorEvent>, tx: Sender<SensorEvent>, pace: Option<f64>) {
    let mut sent = 0u64;
    let mut prev_ts: Option<Timestamp> = None;

    for event in events {
        if let (Some(speedup), Some(prev)) = (pace, prev_ts) {
            let gap_ms = (event.timestamp() - prev).max(0) as f64 / speedup.max(1e-3);
            if gap_ms >= 1.0 {
                sleep(Duration::from_millis(gap_ms as u64)).await;
            }
        }
        prev_ts = Some(event.timestamp());

        if tx.send(event).await.is_err() {
            log::warn!("[sensors] channel closed after {} events", sent);
            return;
        }
        sent += 1;
        if sent % 1000 == 0 {
            log::debug!("[sensors] {} events", sent);
        }
    }
    log::info!("[sensors] source exhausted after {} events", sent);
}
