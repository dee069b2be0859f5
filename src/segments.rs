use log::debug;

use crate::error::TResult;
use crate::storage::{Aggregate, Field, Storage, TimeRange, TripFilter};
use crate::types::{LocationSample, Segment, Stream, TripId};

/// Partitions a trip's GPS track into consecutive-fix segments and attaches
/// vertical-acceleration statistics to each.
pub struct SegmentBuilder;

impl SegmentBuilder {
    /// Fixes are sorted by time; fixes sharing a timestamp collapse to the
    /// later one so every segment spans a positive interval.
    pub fn build<S: Storage + ?Sized>(
        storage: &S,
        trip_id: TripId,
        locations: &[LocationSample],
    ) -> TResult<Vec<Segment>> {
        let track = Self::ordered_track(locations);
        let mut segments = Vec::with_capacity(track.len().saturating_sub(1));

        for pair in track.windows(2) {
            let (p, q) = (pair[0], pair[1]);
            let window = TimeRange::new(p.timestamp, q.timestamp);
            let trips = TripFilter::Only(trip_id);

            let mean_sq = storage.aggregate(Stream::Accel, trips, Field::ZSquared, Aggregate::Avg, window)?;
            let max_abs = storage.aggregate(Stream::Accel, trips, Field::AbsZ, Aggregate::Max, window)?;

            segments.push(Segment {
                trip_id,
                loc1: p,
                loc2: q,
                rms_z_accel: mean_sq.map(f64::sqrt).unwrap_or(0.0),
                max_z_accel: max_abs.unwrap_or(0.0),
            });
        }

        debug!(
            "trip {}: {} fixes -> {} segments",
            trip_id,
            locations.len(),
            segments.len()
        );
        Ok(segments)
    }

    fn ordered_track(locations: &[LocationSample]) -> Vec<LocationSample> {
        let mut sorted = locations.to_vec();
        sorted.sort_by_key(|l| (l.timestamp, l.seq));

        let mut track: Vec<LocationSample> = Vec::with_capacity(sorted.len());
        for fix in sorted {
            match track.last_mut() {
                Some(last) if last.timestamp == fix.timestamp => *last = fix,
                _ => track.push(fix),
            }
        }
        track
    }
}
