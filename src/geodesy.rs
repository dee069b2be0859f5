use geo::{BoundingRect, MultiPoint, Point};

use crate::types::LocationSample;

/// Earth radius used for all trip distances (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two WGS84 points (degrees)
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn distance_km(a: &LocationSample, b: &LocationSample) -> f64 {
    haversine_km(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Lat/lon extent of a set of fixes
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn from_locations<'a, I>(locations: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a LocationSample>,
    {
        // geo points are (x = lon, y = lat)
        let points: MultiPoint<f64> = locations
            .into_iter()
            .map(|l| Point::new(l.longitude, l.latitude))
            .collect::<Vec<_>>()
            .into();
        let rect = points.bounding_rect()?;
        Some(Self {
            min_lat: rect.min().y,
            min_lon: rect.min().x,
            max_lat: rect.max().y,
            max_lon: rect.max().x,
        })
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn lat_extent(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_extent(&self) -> f64 {
        self.max_lon - self.min_lon
    }
}
