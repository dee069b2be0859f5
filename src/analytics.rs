// analytics.rs: trip-close pipeline and summary rebuild
//
// Runs against a Storage on the worker thread:
//   close:   stored fixes → segments → stored segments → blackout
//            (stored segments, when present, are reused as-is)
//   summary: stored segments → TripSummary

use log::{debug, info, warn};

use crate::error::TResult;
use crate::privacy::{PrivacyRedactor, RedactionReport};
use crate::segments::SegmentBuilder;
use crate::storage::{self, Storage, TripFilter};
use crate::summary::{TripSummarizer, TripSummary};
use crate::types::{Segment, Stream, TripId, TripSurface};

/// Result of closing a trip
#[derive(Clone, Debug, PartialEq)]
pub struct ClosedTrip {
    pub trip_id: TripId,
    pub segments: Vec<Segment>,
    pub redaction: RedactionReport,
}

pub struct TripAnalytics<'a, S: Storage + ?Sized> {
    storage: &'a mut S,
}

impl<'a, S: Storage + ?Sized> TripAnalytics<'a, S> {
    pub fn new(storage: &'a mut S) -> Self {
        Self { storage }
    }

    /// Build and store the trip's segments, then black out its endpoints.
    ///
    /// Segments already stored for the trip are reused, so a repeated close
    /// replays the same blackout window over the same statistics.
    pub fn close_trip(&mut self, trip_id: TripId, radius_m: f64) -> TResult<ClosedTrip> {
        let mut segments = self.storage.segments(trip_id)?;
        let fix_count = if segments.is_empty() {
            let fixes = storage::locations(&*self.storage, TripFilter::Only(trip_id))?;
            segments = SegmentBuilder::build(&*self.storage, trip_id, &fixes)?;
            self.storage.insert_segments(&segments)?;
            fixes.len()
        } else {
            segments.sort_by_key(|s| s.loc1.timestamp);
            debug!("trip {}: reusing {} stored segments", trip_id, segments.len());
            segments.len() + 1
        };

        let redaction = if radius_m > 0.0 {
            PrivacyRedactor::blackout(&mut *self.storage, trip_id, &segments, radius_m)?
        } else {
            RedactionReport::default()
        };

        info!(
            "closed trip {}: {} fixes, {} segments",
            trip_id,
            fix_count,
            segments.len()
        );
        Ok(ClosedTrip { trip_id, segments, redaction })
    }

    /// `None` when the trip has no segments
    pub fn summary(&self, trip_id: TripId) -> TResult<Option<TripSummary>> {
        let mut segments = self.storage.segments(trip_id)?;
        if segments.is_empty() {
            return Ok(None);
        }
        segments.sort_by_key(|s| s.loc1.timestamp);

        let start = segments.iter().map(|s| s.loc1.timestamp).min().unwrap_or_default();
        let end = segments.iter().map(|s| s.loc2.timestamp).max().unwrap_or_default();
        let mean_rms = segments.iter().map(|s| s.rms_z_accel).sum::<f64>() / segments.len() as f64;
        let bumpiness = mean_rms.max(0.0).sqrt();

        Ok(Some(TripSummarizer::summarize(trip_id, segments, start, end, bumpiness)))
    }

    pub fn trips(&self) -> TResult<Vec<TripId>> {
        self.storage.trips()
    }

    pub fn set_surface(&mut self, surface: TripSurface) -> TResult<()> {
        if surface.surface.trim().is_empty() {
            warn!("trip {}: empty surface tag stored", surface.trip_id);
        }
        self.storage.upsert_surface(surface)
    }

    pub fn delete_all(&mut self) -> TResult<()> {
        self.storage.delete_all(Stream::Accel)?;
        self.storage.delete_all(Stream::Location)?;
        self.storage.delete_all_segments()?;
        self.storage.delete_all_surfaces()?;
        info!("deleted all stored trip data");
        Ok(())
    }
}
