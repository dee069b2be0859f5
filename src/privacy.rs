// privacy.rs: endpoint blackout
//
// Samples recorded within a radius of where a trip starts or ends are
// deleted for good. Short trips (fewer than 3 segments) are removed entirely.

use log::{debug, info};
use serde::Serialize;

use crate::error::TResult;
use crate::geodesy::distance_km;
use crate::storage::{RangePredicate, Storage, TripFilter};
use crate::types::{LocationSample, Segment, Stream, Timestamp, TripId};

pub const MIN_SEGMENTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlackoutPlan {
    /// Radius disabled
    Skip,
    /// Too short to anonymise: delete everything for the trip
    WholeTrip,
    /// Keep samples with `min_ts <= timestamp <= max_ts`
    Window { min_ts: Timestamp, max_ts: Timestamp },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RedactionReport {
    pub accel_deleted: usize,
    pub locations_deleted: usize,
    pub segments_deleted: usize,
    pub surface_deleted: bool,
}

pub struct PrivacyRedactor;

impl PrivacyRedactor {
    /// Decide what to delete from the trip's segment geometry alone.
    pub fn plan(segments: &[Segment], radius_m: f64) -> BlackoutPlan {
        if !(radius_m > 0.0) {
            return BlackoutPlan::Skip;
        }
        if segments.len() < MIN_SEGMENTS {
            return BlackoutPlan::WholeTrip;
        }

        let points = Self::track_points(segments);
        let first = points[0];
        let last = points[points.len() - 1];
        let outside = |origin: &LocationSample, p: &LocationSample| distance_km(origin, p) * 1000.0 >= radius_m;

        let min_ts = points[1..]
            .iter()
            .find(|p| outside(&first, p))
            .map(|p| p.timestamp)
            .unwrap_or(last.timestamp + 1);

        let max_ts = points[..points.len() - 1]
            .iter()
            .rev()
            .find(|p| outside(&last, p))
            .map(|p| p.timestamp)
            .unwrap_or(first.timestamp - 1);

        let max_ts = if min_ts == max_ts { max_ts - 1 } else { max_ts };
        BlackoutPlan::Window { min_ts, max_ts }
    }

    /// Compute and apply the blackout for one trip. Irreversible.
    pub fn blackout<S: Storage + ?Sized>(
        storage: &mut S,
        trip_id: TripId,
        segments: &[Segment],
        radius_m: f64,
    ) -> TResult<RedactionReport> {
        let plan = Self::plan(segments, radius_m);
        debug!("trip {}: blackout plan {:?}", trip_id, plan);
        let report = Self::apply(storage, trip_id, plan)?;
        if report != RedactionReport::default() {
            info!(
                "trip {}: redacted {} accel, {} location samples",
                trip_id, report.accel_deleted, report.locations_deleted
            );
        }
        Ok(report)
    }

    pub fn apply<S: Storage + ?Sized>(
        storage: &mut S,
        trip_id: TripId,
        plan: BlackoutPlan,
    ) -> TResult<RedactionReport> {
        let trips = TripFilter::Only(trip_id);
        let mut report = RedactionReport::default();

        match plan {
            BlackoutPlan::Skip => return Ok(report),
            BlackoutPlan::WholeTrip => {
                report.accel_deleted = storage.delete_range(Stream::Accel, trips, RangePredicate::All)?;
                report.locations_deleted = storage.delete_range(Stream::Location, trips, RangePredicate::All)?;
            }
            BlackoutPlan::Window { min_ts, max_ts } => {
                for stream in [Stream::Accel, Stream::Location] {
                    let deleted = storage.delete_range(stream, trips, RangePredicate::Before(min_ts))?
                        + storage.delete_range(stream, trips, RangePredicate::After(max_ts))?;
                    match stream {
                        Stream::Accel => report.accel_deleted = deleted,
                        Stream::Location => report.locations_deleted = deleted,
                    }
                }
            }
        }

        if storage.count(Stream::Location, trips)? == 0 {
            report.surface_deleted = storage.delete_surface(trip_id)?;
            report.segments_deleted = storage.delete_segments(trip_id)?;
        }
        Ok(report)
    }

    fn track_points(segments: &[Segment]) -> Vec<LocationSample> {
        let mut points = Vec::with_capacity(segments.len() + 1);
        points.push(segments[0].loc1);
        points.extend(segments.iter().map(|s| s.loc2));
        points
    }
}
