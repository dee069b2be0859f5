use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TResult;
use crate::storage::{RangePredicate, Storage, TimeRange, TripFilter};
use crate::types::{Record, Stream, TripId};

/// Everything recorded up to and including `max_trip`, in uploader wire form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadPayload {
    pub user_id: String,
    pub accelerometer: Vec<Value>,
    pub locations: Vec<Value>,
    pub surfaces: Vec<Value>,
}

/// Rows removed after a successful upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadCleanup {
    pub accel_deleted: usize,
    pub locations_deleted: usize,
    pub surfaces_deleted: usize,
}

impl UploadPayload {
    pub fn collect<S: Storage + ?Sized>(storage: &S, user_id: &str, max_trip: TripId) -> TResult<Self> {
        let trips = TripFilter::UpTo(max_trip);
        let to_json = |records: Vec<Record>| records.iter().map(Record::to_json).collect::<Vec<_>>();

        let accelerometer = to_json(storage.query_range(Stream::Accel, trips, TimeRange::all())?);
        let locations = to_json(storage.query_range(Stream::Location, trips, TimeRange::all())?);
        let surfaces = storage
            .surfaces(trips)?
            .into_iter()
            .map(|s| Record::Surface(s).to_json())
            .collect();

        Ok(Self {
            user_id: user_id.to_string(),
            accelerometer,
            locations,
            surfaces,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.accelerometer.is_empty() && self.locations.is_empty() && self.surfaces.is_empty()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Drop uploaded raw records. Segments stay so trips remain viewable.
pub fn delete_uploaded<S: Storage + ?Sized>(storage: &mut S, max_trip: TripId) -> TResult<UploadCleanup> {
    let trips = TripFilter::UpTo(max_trip);
    let accel_deleted = storage.delete_range(Stream::Accel, trips, RangePredicate::All)?;
    let locations_deleted = storage.delete_range(Stream::Location, trips, RangePredicate::All)?;

    let mut surfaces_deleted = 0;
    for surface in storage.surfaces(trips)? {
        if storage.delete_record(Record::Surface(surface).key())? {
            surfaces_deleted += 1;
        }
    }

    log::info!(
        "upload cleanup up to trip {}: {} accel, {} locations, {} surfaces",
        max_trip,
        accel_deleted,
        locations_deleted,
        surfaces_deleted
    );
    Ok(UploadCleanup { accel_deleted, locations_deleted, surfaces_deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{AccelSample, LocationSample, SampleBatch, Segment, TripSurface};

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let accel = (1..=3)
            .map(|trip| AccelSample { timestamp: trip as i64 * 100, seq: 0, x: 0.1, y: 0.2, z: 0.3, trip_id: trip })
            .collect();
        let locs: Vec<LocationSample> = (1..=3)
            .map(|trip| LocationSample { timestamp: trip as i64 * 100, seq: 0, latitude: 53.5, longitude: -113.5, trip_id: trip })
            .collect();
        store.insert_batch(&SampleBatch::Accel(accel)).unwrap();
        store.insert_batch(&SampleBatch::Location(locs.clone())).unwrap();
        store.upsert_surface(TripSurface { trip_id: 1, surface: "gravel".into() }).unwrap();
        store.upsert_surface(TripSurface { trip_id: 3, surface: "paved".into() }).unwrap();
        store
            .insert_segments(&[Segment { trip_id: 1, loc1: locs[0], loc2: locs[0], rms_z_accel: 0.0, max_z_accel: 0.0 }])
            .unwrap();
        store
    }

    #[test]
    fn test_collect_up_to_trip() {
        let store = store();
        let payload = UploadPayload::collect(&store, "rider-1", 2).unwrap();
        assert_eq!(payload.accelerometer.len(), 2);
        assert_eq!(payload.locations.len(), 2);
        assert_eq!(payload.surfaces.len(), 1);
        assert_eq!(payload.surfaces[0]["surface"], "gravel");

        let json = payload.to_json().unwrap();
        assert!(json.contains("\"user_id\":\"rider-1\""));
        assert!(json.contains("time_stamp"));
    }

    #[test]
    fn test_delete_uploaded_keeps_segments_and_later_trips() {
        let mut store = store();
        let cleanup = delete_uploaded(&mut store, 2).unwrap();
        assert_eq!(cleanup, UploadCleanup { accel_deleted: 2, locations_deleted: 2, surfaces_deleted: 1 });
        assert_eq!(store.count(Stream::Accel, TripFilter::Any).unwrap(), 1);
        assert_eq!(store.trips().unwrap(), vec![1]);
        let remaining = UploadPayload::collect(&store, "rider-1", 3).unwrap();
        assert_eq!(remaining.surfaces.len(), 1);
        assert!(!remaining.is_empty());
    }
}
