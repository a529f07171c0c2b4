//! # Record Dispatcher
//!
//! Consumer side of the record channel. Keeps the outputs a display reads
//! (latest record, rolling series, pointing geometry) and fans every record
//! out to the persistence channels.

use tracing::trace;

use super::channel::Channel;
use super::series::RecordSeries;
use crate::codec::Record;
use crate::geo::{GeoCoordinate, GeoPair, PointingGeometry};

/// Names of the position fields in the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKeys {
    pub lat: String,
    pub lon: String,
    pub alt: String,
}

impl Default for FieldKeys {
    fn default() -> Self {
        Self {
            lat: "lat".to_string(),
            lon: "lon".to_string(),
            alt: "alt".to_string(),
        }
    }
}

/// Splits records into rows and coordinates and tracks pointing
#[derive(Debug)]
pub struct Dispatcher {
    records: Channel<Record>,
    rows: Channel<Vec<String>>,
    coords: Channel<GeoCoordinate>,
    keys: FieldKeys,
    home: GeoCoordinate,
    latest: Option<Record>,
    series: RecordSeries,
    pointing: Option<PointingGeometry>,
    records_seen: u64,
}

impl Dispatcher {
    pub fn new(
        records: Channel<Record>,
        rows: Channel<Vec<String>>,
        coords: Channel<GeoCoordinate>,
        keys: FieldKeys,
        home: GeoCoordinate,
        series_capacity: usize,
    ) -> Self {
        Self {
            records,
            rows,
            coords,
            keys,
            home,
            latest: None,
            series: RecordSeries::new(series_capacity),
            pointing: None,
            records_seen: 0,
        }
    }

    /// Dispatch every record currently queued
    ///
    /// # Returns
    ///
    /// * `usize` - Number of records handled
    pub fn poll(&mut self) -> usize {
        let records = self.records.drain();
        let count = records.len();
        for record in records {
            self.dispatch(record);
        }
        count
    }

    fn dispatch(&mut self, record: Record) {
        self.rows.push(record.to_row());

        let coord =
            GeoCoordinate::from_record(&record, &self.keys.lat, &self.keys.lon, &self.keys.alt);
        self.coords.push(coord);
        if coord.valid() {
            let pointing = GeoPair::new(&self.home, &coord).pointing();
            trace!(
                "Pointing az {:.1} el {:.1} range {:.0} m",
                pointing.azimuth_deg,
                pointing.elevation_deg,
                pointing.line_of_sight_m
            );
            self.pointing = Some(pointing);
        }

        self.series.push(record.clone());
        self.latest = Some(record);
        self.records_seen += 1;
    }

    pub fn latest(&self) -> Option<&Record> {
        self.latest.as_ref()
    }

    pub fn series(&self) -> &RecordSeries {
        &self.series
    }

    /// Geometry of the last valid coordinate
    pub fn pointing(&self) -> Option<PointingGeometry> {
        self.pointing
    }

    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    pub fn home(&self) -> &GeoCoordinate {
        &self.home
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecOptions, RecordCodec, Schema};

    struct Fixture {
        codec: RecordCodec,
        records: Channel<Record>,
        rows: Channel<Vec<String>>,
        coords: Channel<GeoCoordinate>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let codec = RecordCodec::new(
            Schema::new(["id", "lat", "lon", "alt", "mode"]),
            CodecOptions::default(),
        )
        .unwrap();
        let records = Channel::new();
        let rows = Channel::new();
        let coords = Channel::new();
        let dispatcher = Dispatcher::new(
            records.clone(),
            rows.clone(),
            coords.clone(),
            FieldKeys::default(),
            GeoCoordinate::new(13.7563, 100.5018, 10.0),
            3,
        );
        Fixture {
            codec,
            records,
            rows,
            coords,
            dispatcher,
        }
    }

    #[test]
    fn test_poll_splits_record() {
        let mut f = fixture();
        f.records.push(f.codec.decode("1,13.7663,100.5018,1010,GPS"));

        assert_eq!(f.dispatcher.poll(), 1);
        assert_eq!(
            f.rows.pop().unwrap(),
            vec!["1", "13.7663", "100.5018", "1010", "GPS"]
        );
        assert_eq!(
            f.coords.pop().unwrap(),
            GeoCoordinate::new(13.7663, 100.5018, 1010.0)
        );

        let pointing = f.dispatcher.pointing().unwrap();
        assert!((pointing.ground_distance_m - 1111.949).abs() < 0.01);
        assert!((pointing.elevation_deg - 41.9657).abs() < 1e-3);
        assert_eq!(f.dispatcher.records_seen(), 1);
        assert_eq!(f.dispatcher.latest().unwrap().to_row()[4], "GPS");
    }

    #[test]
    fn test_invalid_coordinate_keeps_last_pointing() {
        let mut f = fixture();
        f.records.push(f.codec.decode("1,13.7663,100.5018,1010,GPS"));
        f.records.push(f.codec.decode("2,,,,NOFIX"));
        f.dispatcher.poll();

        assert_eq!(f.coords.len(), 2);
        assert_eq!(f.rows.drain()[1], vec!["2", "", "", "", "NOFIX"]);
        assert!(f.dispatcher.pointing().is_some());
        assert_eq!(
            f.dispatcher.latest().unwrap().get("mode"),
            Some(&crate::codec::FieldValue::Text("NOFIX".to_string()))
        );
    }

    #[test]
    fn test_series_is_bounded() {
        let mut f = fixture();
        for id in 0..5 {
            f.records.push(f.codec.decode(&format!("{},13.8,100.5,{},GPS", id, id * 10)));
        }
        assert_eq!(f.dispatcher.poll(), 5);
        assert_eq!(f.dispatcher.series().len(), 3);
        assert_eq!(
            f.dispatcher.series().column("alt"),
            vec![Some(20.0), Some(30.0), Some(40.0)]
        );
        assert_eq!(f.dispatcher.records_seen(), 5);
        assert_eq!(f.dispatcher.poll(), 0);
    }
}
