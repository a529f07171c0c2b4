//! # Geodesy Module
//!
//! Turns a home coordinate and a tracked coordinate into antenna pointing
//! angles and ranges on a spherical Earth.
//!
//! All functions are pure; a [`GeoPair`] is derived on demand and never
//! stored.

use std::fmt;

use serde::Serialize;

use crate::codec::{FieldValue, Record};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic coordinate in degrees and meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GeoCoordinate {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl GeoCoordinate {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    /// Build from decoded field values; missing or unparsable values are 0.0
    pub fn from_values(lat: &FieldValue, lon: &FieldValue, alt: &FieldValue) -> Self {
        let coerce = |v: &FieldValue| v.as_f64().filter(|x| x.is_finite()).unwrap_or(0.0);
        Self::new(coerce(lat), coerce(lon), coerce(alt))
    }

    /// Build from the named fields of a record
    pub fn from_record(record: &Record, lat_key: &str, lon_key: &str, alt_key: &str) -> Self {
        let absent = FieldValue::Absent;
        Self::from_values(
            record.get(lat_key).unwrap_or(&absent),
            record.get(lon_key).unwrap_or(&absent),
            record.get(alt_key).unwrap_or(&absent),
        )
    }

    /// Whether this looks like a real fix
    ///
    /// Requires `1 <= |lat| <= 90` and `1 <= |lon| <= 180`, which rejects the
    /// origin and the zeroed coordinates radios send before a fix.
    pub fn valid(&self) -> bool {
        (1.0..=90.0).contains(&self.lat.abs()) && (1.0..=180.0).contains(&self.lon.abs())
    }
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.lat, self.lon, self.alt)
    }
}

/// Pointing solution from home to the tracked device
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointingGeometry {
    /// Great-circle surface distance in meters
    pub ground_distance_m: f64,
    /// Straight-line distance in meters
    pub line_of_sight_m: f64,
    /// Compass bearing in degrees, 0..360
    pub azimuth_deg: f64,
    /// Look-up angle in degrees
    pub elevation_deg: f64,
}

/// A (home, current) coordinate pair
#[derive(Debug, Clone, Copy)]
pub struct GeoPair {
    lat0: f64,
    lat1: f64,
    dlat: f64,
    dlon: f64,
    alt1: f64,
    dalt: f64,
}

impl GeoPair {
    pub fn new(home: &GeoCoordinate, current: &GeoCoordinate) -> Self {
        let lat0 = home.lat.to_radians();
        let lat1 = current.lat.to_radians();
        Self {
            lat0,
            lat1,
            dlat: lat1 - lat0,
            dlon: (current.lon - home.lon).to_radians(),
            alt1: current.alt,
            dalt: current.alt - home.alt,
        }
    }

    /// Central angle between the two points (haversine)
    pub fn arc_radians(&self) -> f64 {
        let a = (self.dlat / 2.0).sin().powi(2)
            + self.lat0.cos() * self.lat1.cos() * (self.dlon / 2.0).sin().powi(2);
        2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt())
    }

    pub fn arc_degrees(&self) -> f64 {
        self.arc_radians().to_degrees()
    }

    /// Ground distance in meters
    pub fn ground_distance(&self) -> f64 {
        EARTH_RADIUS_M * self.arc_radians()
    }

    /// Line-of-sight distance in meters
    ///
    /// Takes the chord at the device's radius and closes the triangle with
    /// the altitude difference (law of cosines).
    pub fn line_of_sight(&self) -> f64 {
        let r = EARTH_RADIUS_M + self.alt1;
        let arc = self.arc_radians();
        let base = 2.0 * r * ((std::f64::consts::PI - arc) / 2.0).cos();
        let los = base.powi(2) + self.dalt.powi(2)
            - 2.0 * base * self.dalt * ((std::f64::consts::PI + arc) / 2.0).cos();
        los.abs().sqrt()
    }

    /// Initial great-circle bearing in degrees, 0..360
    pub fn azimuth(&self) -> f64 {
        let y = self.dlon.sin() * self.lat1.cos();
        let x = self.lat0.cos() * self.lat1.sin()
            - self.lat0.sin() * self.lat1.cos() * self.dlon.cos();
        y.atan2(x).to_degrees().rem_euclid(360.0)
    }

    /// Elevation angle in degrees, flat-triangle approximation
    pub fn elevation(&self) -> f64 {
        self.dalt.atan2(self.ground_distance()).to_degrees()
    }

    pub fn pointing(&self) -> PointingGeometry {
        PointingGeometry {
            ground_distance_m: self.ground_distance(),
            line_of_sight_m: self.line_of_sight(),
            azimuth_deg: self.azimuth(),
            elevation_deg: self.elevation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Schema;

    #[test]
    fn test_valid_bounds() {
        assert!(!GeoCoordinate::new(0.0, 0.0, 100.0).valid());
        assert!(GeoCoordinate::new(45.0, 90.0, 100.0).valid());
        assert!(!GeoCoordinate::new(91.0, 0.0, 100.0).valid());
        assert!(!GeoCoordinate::new(45.0, 0.5, 100.0).valid());
        assert!(GeoCoordinate::new(-90.0, -180.0, 0.0).valid());
        assert!(!GeoCoordinate::new(45.0, 180.5, 0.0).valid());
    }

    #[test]
    fn test_from_values_coerces_to_zero() {
        let coord = GeoCoordinate::from_values(
            &FieldValue::Text("bad".to_string()),
            &FieldValue::Integer(100),
            &FieldValue::Absent,
        );
        assert_eq!(coord, GeoCoordinate::new(0.0, 100.0, 0.0));
    }

    #[test]
    fn test_from_record_missing_keys() {
        let schema = Schema::new(["lat", "lon"]);
        let record = Record::from_values(
            &schema,
            vec![FieldValue::Real(13.75), FieldValue::Text("100.5".to_string())],
        )
        .unwrap();

        let coord = GeoCoordinate::from_record(&record, "lat", "lon", "alt");
        assert_eq!(coord, GeoCoordinate::new(13.75, 100.5, 0.0));
    }

    #[test]
    fn test_same_point_is_zero_range() {
        for coord in [
            GeoCoordinate::new(45.0, 90.0, 0.0),
            GeoCoordinate::new(-33.8688, 151.2093, 1200.0),
            GeoCoordinate::new(13.7563, 100.5018, 3.5),
        ] {
            let pair = GeoPair::new(&coord, &coord);
            assert!(pair.ground_distance().abs() < 1e-6);
            assert!(pair.line_of_sight().abs() < 1e-3);
            assert_eq!(pair.elevation(), 0.0);
        }
    }

    #[test]
    fn test_london_to_paris() {
        let london = GeoCoordinate::new(51.5074, -0.1278, 0.0);
        let paris = GeoCoordinate::new(48.8566, 2.3522, 0.0);
        let pointing = GeoPair::new(&london, &paris).pointing();

        assert!((pointing.ground_distance_m - 343_556.0).abs() < 1.0);
        assert!((pointing.line_of_sight_m - 343_514.4).abs() < 1.0);
        assert!((pointing.azimuth_deg - 148.1156).abs() < 1e-3);
        assert_eq!(pointing.elevation_deg, 0.0);
    }

    #[test]
    fn test_climbing_device_north_of_home() {
        let home = GeoCoordinate::new(13.7563, 100.5018, 10.0);
        let device = GeoCoordinate::new(13.7663, 100.5018, 1010.0);
        let pointing = GeoPair::new(&home, &device).pointing();

        assert!((pointing.ground_distance_m - 1111.949).abs() < 0.01);
        assert!((pointing.line_of_sight_m - 1495.666).abs() < 0.01);
        assert!(pointing.azimuth_deg.abs() < 1e-9);
        assert!((pointing.elevation_deg - 41.9657).abs() < 1e-3);
    }

    #[test]
    fn test_azimuth_is_compass_bearing() {
        let home = GeoCoordinate::new(10.0, 20.0, 0.0);
        let east = GeoPair::new(&home, &GeoCoordinate::new(10.0, 21.0, 0.0));
        let south = GeoPair::new(&home, &GeoCoordinate::new(9.0, 20.0, 0.0));
        let west = GeoPair::new(&home, &GeoCoordinate::new(10.0, 19.0, 0.0));

        assert!((east.azimuth() - 89.913).abs() < 1e-3);
        assert!((south.azimuth() - 180.0).abs() < 1e-9);
        assert!((west.azimuth() - 270.087).abs() < 1e-3);
    }

    #[test]
    fn test_directly_overhead() {
        let home = GeoCoordinate::new(45.0, 90.0, 0.0);
        let above = GeoCoordinate::new(45.0, 90.0, 100.0);
        let pair = GeoPair::new(&home, &above);

        assert!((pair.elevation() - 90.0).abs() < 1e-9);
        assert!((pair.line_of_sight() - 100.0).abs() < 1e-3);
    }
}
