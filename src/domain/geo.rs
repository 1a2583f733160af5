//! Great-circle distance between facility coordinates.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Parses `"lat,lon"` text such as `"40.71,-74.00"`.
    pub fn parse(text: &str) -> Option<Self> {
        let (lat, lon) = text.split_once(',')?;
        let coords = Self::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?);
        coords.is_valid().then_some(coords)
    }

    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        distance_miles(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Haversine distance in miles.
pub fn distance_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push `a` just outside [0, 1] near antipodes.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_MILES * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_are_zero_miles_apart() {
        assert_eq!(distance_miles(40.7128, -74.0060, 40.7128, -74.0060), 0.0);
        assert_eq!(distance_miles(-90.0, 180.0, -90.0, 180.0), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = distance_miles(40.7128, -74.0060, 40.7589, -73.9851);
        let b = distance_miles(40.7589, -73.9851, 40.7128, -74.0060);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn antipodal_points_are_half_the_circumference() {
        let d = distance_miles(0.0, 0.0, 0.0, 180.0);
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_MILES).abs() < 1e-6);

        let poles = distance_miles(90.0, 0.0, -90.0, 0.0);
        assert!(poles.is_finite() && poles > 0.0);
    }

    #[test]
    fn known_city_distance_is_close() {
        // Lower Manhattan to Midtown is roughly 3.4 miles.
        let d = distance_miles(40.7128, -74.0060, 40.7589, -73.9851);
        assert!((3.0..4.0).contains(&d), "got {d}");
    }

    #[test]
    fn parses_coordinate_text() {
        assert_eq!(
            Coordinates::parse(" 40.7128, -74.0060 "),
            Some(Coordinates::new(40.7128, -74.0060))
        );
        assert_eq!(Coordinates::parse("downtown"), None);
        assert_eq!(Coordinates::parse("91.0,0"), None);
    }
}
