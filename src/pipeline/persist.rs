//! Persistence stage: drains row, coordinate and raw channels to disk.

use tracing::debug;

use super::channel::Channel;
use super::lifecycle::PollTask;
use crate::error::Result;
use crate::geo::GeoCoordinate;
use crate::storage::{DelimitedLog, TrackWriter};

/// Appends queued rows to the record log and coordinates to the track
#[derive(Debug)]
pub struct PersistenceWorker {
    rows: Channel<Vec<String>>,
    coords: Channel<GeoCoordinate>,
    log: DelimitedLog,
    track: Option<TrackWriter>,
    raw: Option<(Channel<String>, DelimitedLog)>,
}

impl PersistenceWorker {
    pub fn new(rows: Channel<Vec<String>>, coords: Channel<GeoCoordinate>, log: DelimitedLog) -> Self {
        Self {
            rows,
            coords,
            log,
            track: None,
            raw: None,
        }
    }

    pub fn with_track(mut self, track: TrackWriter) -> Self {
        self.track = Some(track);
        self
    }

    pub fn with_raw(mut self, lines: Channel<String>, log: DelimitedLog) -> Self {
        self.raw = Some((lines, log));
        self
    }

    /// Write everything queued right now
    ///
    /// Coordinates are consumed even without a track writer.
    ///
    /// # Errors
    ///
    /// Returns `Io` on any file write failure
    pub fn flush(&mut self) -> Result<()> {
        let rows = self.rows.drain();
        if !rows.is_empty() {
            let written = self.log.append_rows(&rows)?;
            debug!("Appended {} rows to {:?}", written, self.log.path());
        }

        for coord in self.coords.drain() {
            if let Some(track) = self.track.as_mut() {
                track.append(&coord)?;
            }
        }

        if let Some((lines, log)) = &self.raw {
            log.append_lines(lines.drain())?;
        }
        Ok(())
    }

    pub fn log(&self) -> &DelimitedLog {
        &self.log
    }

    pub fn track(&self) -> Option<&TrackWriter> {
        self.track.as_ref()
    }
}

impl PollTask for PersistenceWorker {
    fn poll(&mut self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::track::parse_points;
    use crate::storage::{ColorAllocator, StorageLayout};
    use std::fs;
    use tempfile::TempDir;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_flush_writes_rows_track_and_raw() {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path(), "test", "csv", 1);
        let track = TrackWriter::create(&layout, &ColorAllocator::new()).unwrap();

        let rows = Channel::new();
        let coords = Channel::new();
        let raw = Channel::new();
        let mut worker = PersistenceWorker::new(
            rows.clone(),
            coords.clone(),
            DelimitedLog::new(layout.csv_path(), ","),
        )
        .with_track(track)
        .with_raw(raw.clone(), DelimitedLog::new(layout.raw_path(), ","));

        rows.push(row(&["1", "13.75", "100.5"]));
        rows.push(Vec::new());
        rows.push(row(&["2", "", "100.6"]));
        coords.push(GeoCoordinate::new(13.75, 100.5, 0.0));
        coords.push(GeoCoordinate::new(0.0, 100.6, 0.0));
        raw.push("1,13.75,100.5".to_string());

        worker.flush().unwrap();
        assert!(!rows.available() && !coords.available() && !raw.available());

        let csv = fs::read_to_string(worker.log().path()).unwrap();
        assert_eq!(csv, "1,13.75,100.5\n2,,100.6\n");

        let track = worker.track().unwrap();
        let doc = fs::read_to_string(track.archive_path()).unwrap();
        assert_eq!(parse_points(&doc), vec![GeoCoordinate::new(13.75, 100.5, 0.0)]);

        let raw_log = fs::read_to_string(dir.path().join("data_test_dev1_0.raw")).unwrap();
        assert_eq!(raw_log, "1,13.75,100.5\n");
    }

    #[test]
    fn test_flush_without_track_discards_coordinates() {
        let dir = TempDir::new().unwrap();
        let coords = Channel::new();
        let mut worker = PersistenceWorker::new(
            Channel::new(),
            coords.clone(),
            DelimitedLog::new(dir.path().join("data.csv"), ","),
        );

        coords.push(GeoCoordinate::new(45.0, 90.0, 10.0));
        worker.flush().unwrap();
        assert!(coords.is_empty());
        assert!(!dir.path().join("data.csv").exists());
    }

    #[test]
    fn test_write_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let rows = Channel::new();
        let mut worker = PersistenceWorker::new(
            rows.clone(),
            Channel::new(),
            DelimitedLog::new(dir.path().join("missing/data.csv"), ","),
        );

        rows.push(row(&["1"]));
        assert!(worker.flush().is_err());
    }
}
