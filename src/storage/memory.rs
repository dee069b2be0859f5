use std::collections::{BTreeMap, BTreeSet};

use crate::error::TResult;
use crate::types::{
    Record, RecordKey, SampleBatch, SampleKey, Segment, Stream, Timestamp, TripId, TripSurface,
};

use super::{Aggregate, Field, RangePredicate, Storage, TimeRange, TripFilter};

/// In-memory tables keyed the same way an on-disk store would be.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    accel: BTreeMap<SampleKey, Record>,
    locations: BTreeMap<SampleKey, Record>,
    segments: BTreeMap<(TripId, Timestamp), Segment>,
    surfaces: BTreeMap<TripId, TripSurface>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, stream: Stream) -> &BTreeMap<SampleKey, Record> {
        match stream {
            Stream::Accel => &self.accel,
            Stream::Location => &self.locations,
        }
    }

    fn table_mut(&mut self, stream: Stream) -> &mut BTreeMap<SampleKey, Record> {
        match stream {
            Stream::Accel => &mut self.accel,
            Stream::Location => &mut self.locations,
        }
    }

    fn scan<'a>(
        &'a self,
        stream: Stream,
        trips: TripFilter,
        range: TimeRange,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        let lo = SampleKey::new(range.start, TripId::MIN, u32::MIN);
        let hi = SampleKey::new(range.end, TripId::MAX, u32::MAX);
        self.table(stream)
            .range(lo..=hi)
            .map(|(_, rec)| rec)
            .filter(move |rec| trips.matches(rec.trip_id()))
    }
}

impl Storage for MemoryStore {
    fn insert_batch(&mut self, batch: &SampleBatch) -> TResult<()> {
        let table = self.table_mut(batch.stream());
        for rec in batch.records() {
            if let RecordKey::Sample(_, key) = rec.key() {
                table.insert(key, rec);
            }
        }
        Ok(())
    }

    fn query_range(&self, stream: Stream, trips: TripFilter, range: TimeRange) -> TResult<Vec<Record>> {
        if range.start > range.end {
            return Ok(Vec::new());
        }
        Ok(self.scan(stream, trips, range).cloned().collect())
    }

    fn aggregate(
        &self,
        stream: Stream,
        trips: TripFilter,
        field: Field,
        func: Aggregate,
        range: TimeRange,
    ) -> TResult<Option<f64>> {
        if range.start > range.end {
            return Ok(None);
        }
        Ok(func.apply(self.scan(stream, trips, range).filter_map(|rec| field.of(rec))))
    }

    fn delete_range(&mut self, stream: Stream, trips: TripFilter, predicate: RangePredicate) -> TResult<usize> {
        let table = self.table_mut(stream);
        let before = table.len();
        table.retain(|key, rec| !(trips.matches(rec.trip_id()) && predicate.matches(key.timestamp)));
        Ok(before - table.len())
    }

    fn delete_all(&mut self, stream: Stream) -> TResult<()> {
        self.table_mut(stream).clear();
        Ok(())
    }

    fn count(&self, stream: Stream, trips: TripFilter) -> TResult<usize> {
        Ok(self.table(stream).values().filter(|rec| trips.matches(rec.trip_id())).count())
    }

    fn delete_record(&mut self, key: RecordKey) -> TResult<bool> {
        Ok(match key {
            RecordKey::Sample(stream, key) => self.table_mut(stream).remove(&key).is_some(),
            RecordKey::Surface(trip_id) => self.surfaces.remove(&trip_id).is_some(),
        })
    }

    fn insert_segments(&mut self, segments: &[Segment]) -> TResult<()> {
        for seg in segments {
            self.segments.insert(seg.key(), *seg);
        }
        Ok(())
    }

    fn segments(&self, trip_id: TripId) -> TResult<Vec<Segment>> {
        Ok(self
            .segments
            .range((trip_id, Timestamp::MIN)..=(trip_id, Timestamp::MAX))
            .map(|(_, seg)| *seg)
            .collect())
    }

    fn delete_segments(&mut self, trip_id: TripId) -> TResult<usize> {
        let before = self.segments.len();
        self.segments.retain(|(id, _), _| *id != trip_id);
        Ok(before - self.segments.len())
    }

    fn delete_all_segments(&mut self) -> TResult<()> {
        self.segments.clear();
        Ok(())
    }

    fn trips(&self) -> TResult<Vec<TripId>> {
        let ids: BTreeSet<TripId> = self.segments.keys().map(|(id, _)| *id).collect();
        Ok(ids.into_iter().collect())
    }

    fn upsert_surface(&mut self, surface: TripSurface) -> TResult<()> {
        self.surfaces.insert(surface.trip_id, surface);
        Ok(())
    }

    fn surfaces(&self, trips: TripFilter) -> TResult<Vec<TripSurface>> {
        Ok(self
            .surfaces
            .values()
            .filter(|s| trips.matches(s.trip_id))
            .cloned()
            .collect())
    }

    fn delete_surface(&mut self, trip_id: TripId) -> TResult<bool> {
        Ok(self.surfaces.remove(&trip_id).is_some())
    }

    fn delete_all_surfaces(&mut self) -> TResult<()> {
        self.surfaces.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccelSample, LocationSample};

    fn accel(ts: i64, seq: u32, z: f64, trip_id: TripId) -> AccelSample {
        AccelSample { timestamp: ts, seq, x: 0.0, y: 0.0, z, trip_id }
    }

    fn loc(ts: i64, seq: u32, trip_id: TripId) -> LocationSample {
        LocationSample { timestamp: ts, seq, latitude: 53.5, longitude: -113.5, trip_id }
    }

    #[test]
    fn test_insert_replaces_on_key() {
        let mut store = MemoryStore::new();
        store.insert_batch(&SampleBatch::Accel(vec![accel(10, 0, 1.0, 1)])).unwrap();
        store.insert_batch(&SampleBatch::Accel(vec![accel(10, 0, 2.0, 1)])).unwrap();
        assert_eq!(store.count(Stream::Accel, TripFilter::Any).unwrap(), 1);
        let max = store
            .aggregate(Stream::Accel, TripFilter::Any, Field::Z, Aggregate::Max, TimeRange::all())
            .unwrap();
        assert_eq!(max, Some(2.0));
    }

    #[test]
    fn test_same_millisecond_samples_survive() {
        let mut store = MemoryStore::new();
        store
            .insert_batch(&SampleBatch::Accel(vec![accel(10, 0, 1.0, 1), accel(10, 1, -3.0, 1)]))
            .unwrap();
        assert_eq!(store.count(Stream::Accel, TripFilter::Only(1)).unwrap(), 2);
    }

    #[test]
    fn test_range_is_inclusive_and_trip_filtered() {
        let mut store = MemoryStore::new();
        store
            .insert_batch(&SampleBatch::Accel(vec![
                accel(10, 0, 1.0, 1),
                accel(20, 1, 2.0, 1),
                accel(30, 2, 3.0, 1),
                accel(20, 0, 9.0, 2),
            ]))
            .unwrap();
        let rows = store.query_range(Stream::Accel, TripFilter::Only(1), TimeRange::new(10, 20)).unwrap();
        assert_eq!(rows.len(), 2);
        let avg = store
            .aggregate(Stream::Accel, TripFilter::Only(1), Field::Z, Aggregate::Avg, TimeRange::new(20, 30))
            .unwrap();
        assert_eq!(avg, Some(2.5));
        let none = store
            .aggregate(Stream::Accel, TripFilter::Only(1), Field::Z, Aggregate::Avg, TimeRange::new(40, 50))
            .unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn test_delete_range_predicates() {
        let mut store = MemoryStore::new();
        store
            .insert_batch(&SampleBatch::Location((0..5).map(|i| loc(i * 10, i as u32, 1)).collect()))
            .unwrap();
        store.insert_batch(&SampleBatch::Location(vec![loc(0, 0, 2)])).unwrap();

        let removed = store.delete_range(Stream::Location, TripFilter::Only(1), RangePredicate::Before(10)).unwrap();
        assert_eq!(removed, 1);
        let removed = store.delete_range(Stream::Location, TripFilter::Only(1), RangePredicate::After(30)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count(Stream::Location, TripFilter::Only(1)).unwrap(), 3);
        // Other trip untouched
        assert_eq!(store.count(Stream::Location, TripFilter::Only(2)).unwrap(), 1);
    }

    #[test]
    fn test_segments_and_trips() {
        let mut store = MemoryStore::new();
        let seg = |trip_id, t1, t2| Segment {
            trip_id,
            loc1: loc(t1, 0, trip_id),
            loc2: loc(t2, 1, trip_id),
            rms_z_accel: 1.0,
            max_z_accel: 1.0,
        };
        store.insert_segments(&[seg(3, 20, 30), seg(3, 10, 20), seg(1, 0, 5)]).unwrap();
        assert_eq!(store.trips().unwrap(), vec![1, 3]);
        let trip3 = store.segments(3).unwrap();
        assert_eq!(trip3.iter().map(|s| s.loc1.timestamp).collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(store.delete_segments(3).unwrap(), 2);
        assert_eq!(store.trips().unwrap(), vec![1]);
    }

    #[test]
    fn test_surface_upsert_and_delete_record() {
        let mut store = MemoryStore::new();
        store.upsert_surface(TripSurface { trip_id: 2, surface: "paved".into() }).unwrap();
        store.upsert_surface(TripSurface { trip_id: 2, surface: "gravel".into() }).unwrap();
        let surfaces = store.surfaces(TripFilter::Any).unwrap();
        assert_eq!(surfaces.len(), 1);
        assert_eq!(surfaces[0].surface, "gravel");
        assert!(store.delete_record(RecordKey::Surface(2)).unwrap());
        assert!(!store.delete_record(RecordKey::Surface(2)).unwrap());
    }
}
