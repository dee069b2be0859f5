use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::geodesy::BoundingBox;
use crate::types::{LocationSample, Segment};

pub const MAX_ZOOM: u8 = 20;

/// Camera position for displaying a trip on a slippy map
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapViewport {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
}

impl MapViewport {
    /// Fit the viewport around a set of fixes. `None` for an empty set.
    pub fn fit<'a, I>(locations: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a LocationSample>,
    {
        let bbox = BoundingBox::from_locations(locations)?;
        let (center_lat, center_lon) = bbox.center();
        let zoom = axis_zoom(bbox.lat_extent(), 180.0).min(axis_zoom(bbox.lon_extent(), 360.0));
        Some(Self { center_lat, center_lon, zoom })
    }
}

/// Zoom level at which `extent` degrees fill a `range`-degree world axis
///
/// Formula:
///   zoom = floor(-log2(extent / range) + 0.5), clamped to [0, MAX_ZOOM]
fn axis_zoom(extent: f64, range: f64) -> u8 {
    if !(extent > 0.0) {
        return MAX_ZOOM;
    }
    let level = (-(extent / range).log2() + 0.5).floor();
    level.clamp(0.0, MAX_ZOOM as f64) as u8
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    /// Green → yellow → red over `[0, max]`
    pub fn roughness(value: f64, max: f64) -> Self {
        let clamped = value.clamp(0.0, max);
        let level = (clamped * 510.0 / max).floor() as i32;
        if level > 255 {
            Self { r: 255, g: (510 - level) as u8, b: 0 }
        } else {
            Self { r: level as u8, g: 255, b: 0 }
        }
    }
}

impl Display for RgbColor {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Two-point map line for one segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub points: [(f64, f64); 2],
    pub color: String,
}

impl Polyline {
    pub fn from_segment(segment: &Segment, max_rms: f64) -> Self {
        Self {
            points: [
                (segment.loc1.latitude, segment.loc1.longitude),
                (segment.loc2.latitude, segment.loc2.longitude),
            ],
            color: RgbColor::roughness(segment.rms_z_accel, max_rms).to_string(),
        }
    }
}
