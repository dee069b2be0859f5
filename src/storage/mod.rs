//! Persistence boundary for samples and derived trip data.
//!
//! The engine behind it is pluggable; `MemoryStore` is the reference
//! implementation used by the binaries and tests. Every write is
//! insert-or-replace on the record key.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::TResult;
use crate::types::{
    AccelSample, LocationSample, Record, RecordKey, SampleBatch, Segment, Stream, Timestamp,
    TripId, TripSurface,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TripFilter {
    Any,
    Only(TripId),
    UpTo(TripId),
}

impl TripFilter {
    pub fn matches(&self, trip_id: TripId) -> bool {
        match *self {
            TripFilter::Any => true,
            TripFilter::Only(id) => trip_id == id,
            TripFilter::UpTo(max) => trip_id <= max,
        }
    }
}

/// Inclusive timestamp range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn all() -> Self {
        Self { start: Timestamp::MIN, end: Timestamp::MAX }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangePredicate {
    Before(Timestamp),
    After(Timestamp),
    All,
}

impl RangePredicate {
    pub fn matches(&self, ts: Timestamp) -> bool {
        match *self {
            RangePredicate::Before(limit) => ts < limit,
            RangePredicate::After(limit) => ts > limit,
            RangePredicate::All => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    X,
    Y,
    Z,
    ZSquared,
    AbsZ,
    Latitude,
    Longitude,
}

impl Field {
    pub fn of(&self, record: &Record) -> Option<f64> {
        match (self, record) {
            (Field::X, Record::Accel(a)) => Some(a.x),
            (Field::Y, Record::Accel(a)) => Some(a.y),
            (Field::Z, Record::Accel(a)) => Some(a.z),
            (Field::ZSquared, Record::Accel(a)) => Some(a.z * a.z),
            (Field::AbsZ, Record::Accel(a)) => Some(a.z.abs()),
            (Field::Latitude, Record::Location(l)) => Some(l.latitude),
            (Field::Longitude, Record::Location(l)) => Some(l.longitude),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Avg,
    Min,
    Max,
}

impl Aggregate {
    /// Fold a sequence of values; `None` for an empty input
    pub fn apply<I: IntoIterator<Item = f64>>(&self, values: I) -> Option<f64> {
        let mut count = 0usize;
        let mut acc = 0.0;
        for v in values {
            acc = match (count, self) {
                (0, _) => v,
                (_, Aggregate::Avg) => acc + v,
                (_, Aggregate::Min) => acc.min(v),
                (_, Aggregate::Max) => acc.max(v),
            };
            count += 1;
        }
        match (count, self) {
            (0, _) => None,
            (n, Aggregate::Avg) => Some(acc / n as f64),
            _ => Some(acc),
        }
    }
}

pub trait Storage: Send {
    fn insert_batch(&mut self, batch: &SampleBatch) -> TResult<()>;

    fn query_range(&self, stream: Stream, trips: TripFilter, range: TimeRange) -> TResult<Vec<Record>>;

    fn aggregate(
        &self,
        stream: Stream,
        trips: TripFilter,
        field: Field,
        func: Aggregate,
        range: TimeRange,
    ) -> TResult<Option<f64>>;

    /// Returns the number of deleted samples
    fn delete_range(&mut self, stream: Stream, trips: TripFilter, predicate: RangePredicate) -> TResult<usize>;

    fn delete_all(&mut self, stream: Stream) -> TResult<()>;

    fn count(&self, stream: Stream, trips: TripFilter) -> TResult<usize>;

    fn delete_record(&mut self, key: RecordKey) -> TResult<bool>;

    // ── Derived trip data ──

    fn insert_segments(&mut self, segments: &[Segment]) -> TResult<()>;

    /// Segments of one trip ordered by `loc1.timestamp`
    fn segments(&self, trip_id: TripId) -> TResult<Vec<Segment>>;

    fn delete_segments(&mut self, trip_id: TripId) -> TResult<usize>;

    fn delete_all_segments(&mut self) -> TResult<()>;

    /// Distinct trip ids that have segments, ascending
    fn trips(&self) -> TResult<Vec<TripId>>;

    fn upsert_surface(&mut self, surface: TripSurface) -> TResult<()>;

    fn surfaces(&self, trips: TripFilter) -> TResult<Vec<TripSurface>>;

    fn delete_surface(&mut self, trip_id: TripId) -> TResult<bool>;

    fn delete_all_surfaces(&mut self) -> TResult<()>;
}

/// Location samples of the selected trips in time order
pub fn locations<S: Storage + ?Sized>(storage: &S, trips: TripFilter) -> TResult<Vec<LocationSample>> {
    Ok(storage
        .query_range(Stream::Location, trips, TimeRange::all())?
        .iter()
        .filter_map(Record::as_location)
        .copied()
        .collect())
}

pub fn accel_samples<S: Storage + ?Sized>(storage: &S, trips: TripFilter) -> TResult<Vec<AccelSample>> {
    Ok(storage
        .query_range(Stream::Accel, trips, TimeRange::all())?
        .iter()
        .filter_map(Record::as_accel)
        .copied()
        .collect())
}
