use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use road_vibes::error::{TResult, TrackerError};
use road_vibes::sensors::{GpsFix, RawAccel, SimulatedRide};
use road_vibes::storage::{Aggregate, Field, RangePredicate, TimeRange, TripFilter};
use road_vibes::types::{AccelSample, LocationSample, Record, RecordKey, SampleBatch, Segment, Stream, TripId, TripSurface};
use road_vibes::{MemoryStore, Storage, TrackerConfig, TrackingSession, TripAnalytics, TripWorker};

const T0: i64 = 1_700_000_000_000;

/// MemoryStore that can be switched offline to simulate an unavailable engine
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryStore,
    offline: Arc<AtomicBool>,
    /// 1-based `delete_range` call that fails once; 0 never fails
    fail_delete_at: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
}

impl FlakyStore {
    fn check(&self) -> TResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(TrackerError::StorageError("disk unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Storage for FlakyStore {
    fn insert_batch(&mut self, batch: &SampleBatch) -> TResult<()> {
        self.check()?;
        self.inner.insert_batch(batch)
    }
    fn query_range(&self, stream: Stream, trips: TripFilter, range: TimeRange) -> TResult<Vec<Record>> {
        self.check()?;
        self.inner.query_range(stream, trips, range)
    }
    fn aggregate(&self, stream: Stream, trips: TripFilter, field: Field, func: Aggregate, range: TimeRange) -> TResult<Option<f64>> {
        self.check()?;
        self.inner.aggregate(stream, trips, field, func, range)
    }
    fn delete_range(&mut self, stream: Stream, trips: TripFilter, predicate: RangePredicate) -> TResult<usize> {
        self.check()?;
        let call = self.delete_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_delete_at.load(Ordering::SeqCst) {
            return Err(TrackerError::StorageError(format!("delete {} interrupted", call)));
        }
        self.inner.delete_range(stream, trips, predicate)
    }
    fn delete_all(&mut self, stream: Stream) -> TResult<()> {
        self.inner.delete_all(stream)
    }
    fn count(&self, stream: Stream, trips: TripFilter) -> TResult<usize> {
        self.inner.count(stream, trips)
    }
    fn delete_record(&mut self, key: RecordKey) -> TResult<bool> {
        self.inner.delete_record(key)
    }
    fn insert_segments(&mut self, segments: &[Segment]) -> TResult<()> {
        self.check()?;
        self.inner.insert_segments(segments)
    }
    fn segments(&self, trip_id: TripId) -> TResult<Vec<Segment>> {
        self.check()?;
        self.inner.segments(trip_id)
    }
    fn delete_segments(&mut self, trip_id: TripId) -> TResult<usize> {
        self.inner.delete_segments(trip_id)
    }
    fn delete_all_segments(&mut self) -> TResult<()> {
        self.inner.delete_all_segments()
    }
    fn trips(&self) -> TResult<Vec<TripId>> {
        self.inner.trips()
    }
    fn upsert_surface(&mut self, surface: TripSurface) -> TResult<()> {
        self.inner.upsert_surface(surface)
    }
    fn surfaces(&self, trips: TripFilter) -> TResult<Vec<TripSurface>> {
        self.inner.surfaces(trips)
    }
    fn delete_surface(&mut self, trip_id: TripId) -> TResult<bool> {
        self.inner.delete_surface(trip_id)
    }
    fn delete_all_surfaces(&mut self) -> TResult<()> {
        self.inner.delete_all_surfaces()
    }
}

/// Flat device, vertical ±1 m/s² at 1 Hz, three fixes 0.01° apart a minute apart
fn record_worked_example<K: road_vibes::BatchSink>(session: &mut TrackingSession<K>) {
    session.start().unwrap();
    for i in 0..=120 {
        let bump = if i % 2 == 0 { 1.0 } else { -1.0 };
        session
            .on_accel(&RawAccel { timestamp: T0 + i * 1000, x: 0.0, y: 0.0, z: 9.81 + bump })
            .unwrap();
    }
    for (i, lat) in [53.50, 53.51, 53.52].iter().enumerate() {
        let kept = session
            .on_location(&GpsFix { timestamp: T0 + i as i64 * 60_000, latitude: *lat, longitude: -113.50 })
            .unwrap();
        assert!(kept);
    }
    session.stop().unwrap();
}

#[tokio::test]
async fn worked_example_end_to_end() {
    let config = TrackerConfig::default();
    let worker = TripWorker::spawn(MemoryStore::new()).unwrap();
    let mut session = TrackingSession::new(1, false, &config, worker.handle());
    record_worked_example(&mut session);

    let handle = worker.handle();
    let closed = handle.close_trip(1, 0.0).await.unwrap();
    assert_eq!(closed.segments.len(), 2);
    for seg in &closed.segments {
        assert!((seg.rms_z_accel - 1.0).abs() < 1e-9);
        assert!((seg.max_z_accel - 1.0).abs() < 1e-9);
    }

    let summary = handle.summary(1).await.unwrap().unwrap();
    assert!((summary.distance_km - 2.22).abs() < 0.01);
    assert!((summary.speed_kmh - 66.7).abs() < 0.1);
    assert!((summary.bumpiness - 1.0).abs() < 1e-9);

    // Rebuilding gives an identical summary
    assert_eq!(handle.summary(1).await.unwrap().unwrap(), summary);
    worker.shutdown().unwrap();
}

#[tokio::test]
async fn short_trip_is_erased_by_privacy_radius() {
    let config = TrackerConfig::default();
    let worker = TripWorker::spawn(MemoryStore::new()).unwrap();
    let mut session = TrackingSession::new(1, false, &config, worker.handle());
    record_worked_example(&mut session);

    let handle = worker.handle();
    let closed = handle.close_trip(1, config.privacy_radius_m).await.unwrap();
    assert_eq!(closed.redaction.locations_deleted, 3);
    assert!(handle.summary(1).await.unwrap().is_none());
    assert!(handle.trips().await.unwrap().is_empty());

    let store = worker.shutdown().unwrap();
    assert_eq!(store.count(Stream::Accel, TripFilter::Any).unwrap(), 0);
}

#[tokio::test]
async fn storage_outage_keeps_batches_for_retry() {
    let store = FlakyStore::default();
    let offline = store.offline.clone();
    let worker = TripWorker::spawn(store).unwrap();
    let config = TrackerConfig::default();
    let mut session = TrackingSession::new(1, false, &config, worker.handle());

    offline.store(true, Ordering::SeqCst);
    record_worked_example(&mut session);

    let handle = worker.handle();
    let err = handle.close_trip(1, 0.0).await.unwrap_err();
    assert!(matches!(err, TrackerError::StorageError(_)));

    offline.store(false, Ordering::SeqCst);
    let closed = handle.close_trip(1, 0.0).await.unwrap();
    assert_eq!(closed.segments.len(), 2);
    assert!(closed.segments.iter().all(|s| (s.rms_z_accel - 1.0).abs() < 1e-9));

    let store = worker.shutdown().unwrap();
    assert_eq!(store.count(Stream::Accel, TripFilter::Only(1)).unwrap(), 121);
}

#[tokio::test]
async fn simulated_ride_both_orientation_modes_agree() {
    let config = TrackerConfig::default();
    let mut bumpiness = Vec::new();

    for rotation_sensor in [false, true] {
        let ride = SimulatedRide { duration_s: 120.0, with_rotation_vector: rotation_sensor, ..SimulatedRide::default() };
        let worker = TripWorker::spawn(MemoryStore::new()).unwrap();
        let mut session = TrackingSession::new(5, rotation_sensor, &config, worker.handle());
        session.start().unwrap();
        for event in ride.events() {
            session.on_event(&event).unwrap();
        }
        session.stop().unwrap();

        let handle = worker.handle();
        let closed = handle.close_trip(5, 0.0).await.unwrap();
        // 120 s at one fix per 5 s
        assert_eq!(closed.segments.len(), 24);
        let summary = handle.summary(5).await.unwrap().unwrap();
        // 5 m/s for 2 minutes
        assert!((summary.distance_km - 0.6).abs() < 0.01);
        assert!((summary.speed_kmh - 18.0).abs() < 0.5);
        bumpiness.push(summary.bumpiness);
        worker.shutdown().unwrap();
    }

    // Low-pass mode converges within a few time constants, so both see the same road
    assert!(bumpiness.iter().all(|b| *b > 0.5));
    assert!((bumpiness[0] - bumpiness[1]).abs() / bumpiness[1] < 0.15);
}

#[tokio::test]
async fn shutdown_reports_unsaved_batches() {
    let store = FlakyStore::default();
    let offline = store.offline.clone();
    let worker = TripWorker::spawn(store).unwrap();
    let config = TrackerConfig::default();
    let mut session = TrackingSession::new(1, false, &config, worker.handle());

    offline.store(true, Ordering::SeqCst);
    record_worked_example(&mut session);

    match worker.shutdown() {
        Err(TrackerError::StorageError(msg)) => assert!(msg.contains("unsaved"), "{}", msg),
        other => panic!("expected storage error, got {:?}", other.map(|_| ())),
    }
}

/// Six fixes 0.01° (~1.1 km) apart; |z| = 3 before the second fix, 1 after
fn seed_rough_start<S: Storage>(store: &mut S) {
    let fixes: Vec<LocationSample> = (0..6)
        .map(|i| LocationSample {
            timestamp: T0 + i * 60_000,
            seq: i as u32,
            latitude: 53.50 + i as f64 * 0.01,
            longitude: -113.50,
            trip_id: 1,
        })
        .collect();
    let accel: Vec<AccelSample> = (0..=300)
        .map(|i| {
            let level = if i < 60 { 3.0 } else { 1.0 };
            AccelSample {
                timestamp: T0 + i * 1000,
                seq: i as u32,
                x: 0.0,
                y: 0.0,
                z: if i % 2 == 0 { level } else { -level },
                trip_id: 1,
            }
        })
        .collect();
    store.insert_batch(&SampleBatch::Location(fixes)).unwrap();
    store.insert_batch(&SampleBatch::Accel(accel)).unwrap();
}

#[test]
fn close_retried_after_partial_redaction_matches_clean_close() {
    let mut clean = MemoryStore::new();
    seed_rough_start(&mut clean);
    let mut analytics = TripAnalytics::new(&mut clean);
    let clean_closed = analytics.close_trip(1, 50.0).unwrap();
    let clean_summary = analytics.summary(1).unwrap().unwrap();
    assert!(clean_closed.segments[0].rms_z_accel > 2.5);

    // Accel is trimmed on both ends, then the first location delete fails
    let mut flaky = FlakyStore::default();
    flaky.fail_delete_at.store(3, Ordering::SeqCst);
    seed_rough_start(&mut flaky);
    let mut analytics = TripAnalytics::new(&mut flaky);
    let err = analytics.close_trip(1, 50.0).unwrap_err();
    assert!(matches!(err, TrackerError::StorageError(_)));

    let retried = analytics.close_trip(1, 50.0).unwrap();
    assert_eq!(retried.segments, clean_closed.segments);
    assert_eq!(analytics.summary(1).unwrap().unwrap(), clean_summary);
    assert_eq!(flaky.count(Stream::Location, TripFilter::Only(1)).unwrap(), 4);
    assert_eq!(
        flaky.count(Stream::Accel, TripFilter::Only(1)).unwrap(),
        clean.count(Stream::Accel, TripFilter::Only(1)).unwrap()
    );
}
