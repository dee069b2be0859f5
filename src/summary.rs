use serde::Serialize;

use crate::geodesy::distance_km;
use crate::map::{MapViewport, Polyline};
use crate::types::{Segment, Timestamp, TripId};

const MS_PER_HOUR: f64 = 3_600_000.0;

// Display score saturates at this bumpiness
const SCORE_CEILING: f64 = 5.0;

/// Per-trip metrics, derived from stored segments and never persisted
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TripSummary {
    pub trip_id: TripId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub distance_km: f64,
    pub speed_kmh: f64,
    pub bumpiness: f64,
    pub segments: Vec<Segment>,
    pub viewport: Option<MapViewport>,
}

impl TripSummary {
    /// 0–100 display score, saturating
    pub fn bump_score(&self) -> f64 {
        let f = |x: f64| (2.0 * (x - 0.2).max(0.0) + 1.0).ln();
        (f(self.bumpiness) / f(SCORE_CEILING)).min(1.0) * 100.0
    }

    pub fn polylines(&self, max_rms: f64) -> Vec<Polyline> {
        self.segments
            .iter()
            .map(|s| Polyline::from_segment(s, max_rms))
            .collect()
    }
}

pub struct TripSummarizer;

impl TripSummarizer {
    pub fn summarize(
        trip_id: TripId,
        segments: Vec<Segment>,
        start: Timestamp,
        end: Timestamp,
        raw_bumpiness: f64,
    ) -> TripSummary {
        let distance_km = Self::distance_km(&segments);
        let hours = (end - start) as f64 / MS_PER_HOUR;
        let speed_kmh = if hours == 0.0 { 0.0 } else { distance_km / hours };

        let viewport = segments
            .first()
            .and_then(|first| MapViewport::fit(std::iter::once(&first.loc1).chain(segments.iter().map(|s| &s.loc2))));

        TripSummary {
            trip_id,
            start,
            end,
            distance_km,
            speed_kmh,
            bumpiness: raw_bumpiness,
            segments,
            viewport,
        }
    }

    /// Chained path length: first start point, then every segment end
    fn distance_km(segments: &[Segment]) -> f64 {
        let Some(first) = segments.first() else {
            return 0.0;
        };
        let mut prev = &first.loc1;
        let mut total = 0.0;
        for seg in segments {
            total += distance_km(prev, &seg.loc2);
            prev = &seg.loc2;
        }
        total
    }
}
