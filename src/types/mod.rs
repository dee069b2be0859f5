pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Unix epoch milliseconds
pub type Timestamp = i64;
pub type TripId = u32;

/// Gravity-free, Earth-aligned acceleration sample (m/s²)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub timestamp: Timestamp,
    pub seq: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub trip_id: TripId,
}

impl AccelSample {
    pub fn key(&self) -> SampleKey {
        SampleKey::new(self.timestamp, self.trip_id, self.seq)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub timestamp: Timestamp,
    pub seq: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub trip_id: TripId,
}

impl LocationSample {
    pub fn key(&self) -> SampleKey {
        SampleKey::new(self.timestamp, self.trip_id, self.seq)
    }
}

/// Storage key for time-series samples, ordered by timestamp first so range
/// scans walk a trip in time order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleKey {
    pub timestamp: Timestamp,
    pub trip_id: TripId,
    pub seq: u32,
}

impl SampleKey {
    pub fn new(timestamp: Timestamp, trip_id: TripId, seq: u32) -> Self {
        Self { timestamp, trip_id, seq }
    }
}

/// Portion of a trip between two consecutive GPS fixes
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub trip_id: TripId,
    pub loc1: LocationSample,
    pub loc2: LocationSample,
    pub rms_z_accel: f64,
    pub max_z_accel: f64,
}

impl Segment {
    pub fn key(&self) -> (TripId, Timestamp) {
        (self.trip_id, self.loc1.timestamp)
    }
}

/// User-supplied road surface tag for a trip
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripSurface {
    pub trip_id: TripId,
    pub surface: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stream {
    Accel,
    Location,
}

/// Persisted record kinds
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Accel(AccelSample),
    Location(LocationSample),
    Surface(TripSurface),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Sample(Stream, SampleKey),
    Surface(TripId),
}

impl Record {
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Accel(a) => RecordKey::Sample(Stream::Accel, a.key()),
            Record::Location(l) => RecordKey::Sample(Stream::Location, l.key()),
            Record::Surface(s) => RecordKey::Surface(s.trip_id),
        }
    }

    pub fn trip_id(&self) -> TripId {
        match self {
            Record::Accel(a) => a.trip_id,
            Record::Location(l) => l.trip_id,
            Record::Surface(s) => s.trip_id,
        }
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Record::Accel(a) => Some(a.timestamp),
            Record::Location(l) => Some(l.timestamp),
            Record::Surface(_) => None,
        }
    }

    /// Wire representation used by the upload payload
    pub fn to_json(&self) -> Value {
        match self {
            Record::Accel(a) => json!({
                "time_stamp": a.timestamp,
                "x_accel": a.x,
                "y_accel": a.y,
                "z_accel": a.z,
                "trip_id": a.trip_id,
            }),
            Record::Location(l) => json!({
                "time_stamp": l.timestamp,
                "latitude": l.latitude,
                "longitude": l.longitude,
                "trip_id": l.trip_id,
            }),
            Record::Surface(s) => json!({
                "trip_id": s.trip_id,
                "surface": s.surface,
            }),
        }
    }

    pub fn as_accel(&self) -> Option<&AccelSample> {
        match self {
            Record::Accel(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<&LocationSample> {
        match self {
            Record::Location(l) => Some(l),
            _ => None,
        }
    }
}

/// One flush from a batcher: samples of a single stream
#[derive(Clone, Debug, PartialEq)]
pub enum SampleBatch {
    Accel(Vec<AccelSample>),
    Location(Vec<LocationSample>),
}

impl SampleBatch {
    pub fn stream(&self) -> Stream {
        match self {
            SampleBatch::Accel(_) => Stream::Accel,
            SampleBatch::Location(_) => Stream::Location,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleBatch::Accel(v) => v.len(),
            SampleBatch::Location(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<Record> {
        match self {
            SampleBatch::Accel(v) => v.iter().copied().map(Record::Accel).collect(),
            SampleBatch::Location(v) => v.iter().copied().map(Record::Location).collect(),
        }
    }
}

impl From<Vec<AccelSample>> for SampleBatch {
    fn from(samples: Vec<AccelSample>) -> Self {
        SampleBatch::Accel(samples)
    }
}

impl From<Vec<LocationSample>> for SampleBatch {
    fn from(samples: Vec<LocationSample>) -> Self {
        SampleBatch::Location(samples)
    }
}
