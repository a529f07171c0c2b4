//! # Station Runtime
//!
//! Builds one pipeline per configured device and drives them all until
//! shutdown.
//!
//! # Control Flow
//!
//! 1. **Build** - per device: codec, port, channels, workers and output
//!    files; track colors come from one shared [`ColorAllocator`]
//! 2. **Start** - connect every port, start the ingest and persistence threads
//! 3. **Run** - on every tick dispatch queued records and check worker
//!    health; periodically write the status snapshot
//! 4. **Shutdown** - per device: stop ingest, dispatch the remainder, stop
//!    persistence, close the port; then write the final snapshot

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::codec::RecordCodec;
use crate::config::{Config, DeviceConfig};
use crate::error::{GroundlinkError, Result};
use crate::pipeline::{Channel, Dispatcher, IngestWorker, Lifecycle, PersistenceWorker};
use crate::serial::port_trait::SerialBackend;
use crate::serial::{FrameReader, PortConnection};
use crate::storage::{ColorAllocator, DelimitedLog, TrackWriter};
use crate::telemetry::{write_snapshot, DeviceStatus, StatusSnapshot};

/// Number of dispatched records between status log messages
const LOG_INTERVAL_RECORDS: u64 = 1000;

/// Keeps the first error of a sequence of steps that all have to run
#[derive(Default)]
struct FirstError(Option<GroundlinkError>);

impl FirstError {
    fn keep(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.0.get_or_insert(e);
        }
    }

    fn into_result(self) -> Result<()> {
        self.0.map_or(Ok(()), Err)
    }
}

/// Pipeline of one tracked device
pub struct Station {
    id: u32,
    port: Arc<PortConnection>,
    port_name: String,
    baud_rate: u32,
    auto_reconnect: bool,
    ingest: Lifecycle<IngestWorker>,
    persist: Lifecycle<PersistenceWorker>,
    dispatcher: Dispatcher,
}

impl Station {
    /// Build every component `device` needs
    ///
    /// Output files are named and the track documents prepared here; nothing
    /// is read from the port until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns `Constructor` for an unusable message format or `Io` if the
    /// data directory cannot be prepared
    pub fn build(
        config: &Config,
        device: &DeviceConfig,
        backend: Arc<dyn SerialBackend>,
        colors: &ColorAllocator,
    ) -> Result<Self> {
        let codec = Arc::new(RecordCodec::new(device.schema(), device.codec_options())?);
        let port = Arc::new(PortConnection::with_policy(backend, device.reconnect_policy()));

        let records = Channel::new();
        let rows = Channel::new();
        let coords = Channel::new();

        let layout = config.storage_layout(device);
        layout.ensure_dir()?;
        let delimiter = device.delimiter.as_str();

        let mut ingest = IngestWorker::new(FrameReader::new(port.clone()), codec, records.clone());
        let mut persist = PersistenceWorker::new(
            rows.clone(),
            coords.clone(),
            DelimitedLog::new(layout.csv_path(), delimiter),
        );
        info!("Device {} recording to {:?}", device.id, persist.log().path());

        if config.storage.write_raw {
            let raw = Channel::new();
            ingest = ingest.with_raw(raw.clone());
            persist = persist.with_raw(raw, DelimitedLog::new(layout.raw_path(), delimiter));
        }
        if config.storage.write_track {
            persist = persist.with_track(TrackWriter::create(&layout, colors)?);
        }

        let dispatcher = Dispatcher::new(
            records,
            rows,
            coords,
            device.field_keys(),
            config.home_coordinate(),
            config.workers.series_capacity,
        );

        Ok(Self {
            id: device.id,
            port,
            port_name: device.serial.port.clone(),
            baud_rate: device.serial.baud_rate,
            auto_reconnect: device.serial.auto_reconnect,
            ingest: Lifecycle::new(format!("ingest-{}", device.id), ingest)
                .with_interval(config.poll_interval())
                .with_join_timeout(config.join_timeout()),
            persist: Lifecycle::new(format!("persist-{}", device.id), persist)
                .with_interval(config.poll_interval())
                .with_join_timeout(config.join_timeout()),
            dispatcher,
        })
    }

    /// Connect the port and start both workers
    ///
    /// A port that exists but fails to open is logged and the station runs
    /// disconnected.
    ///
    /// # Errors
    ///
    /// Returns `NoDeviceFound` if the configured port is not present
    pub fn start(&mut self) -> Result<()> {
        if !self.port.connect(&self.port_name, self.baud_rate, self.auto_reconnect)? {
            warn!("Device {} running without a port on \"{}\"", self.id, self.port_name);
        }
        self.ingest.start()?;
        self.persist.start()?;
        Ok(())
    }

    /// Dispatch queued records after checking both workers
    ///
    /// # Errors
    ///
    /// Returns `Worker` if a worker thread has failed
    pub fn tick(&mut self) -> Result<usize> {
        self.ingest.check()?;
        self.persist.check()?;

        let before = self.dispatcher.records_seen();
        let handled = self.dispatcher.poll();
        let seen = self.dispatcher.records_seen();
        if handled > 0 && seen / LOG_INTERVAL_RECORDS > before / LOG_INTERVAL_RECORDS {
            info!("Device {} dispatched {} records", self.id, seen);
        }
        Ok(handled)
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            id: self.id,
            port: self.port.device_path(),
            connected: self.port.is_connected(),
            records_seen: self.dispatcher.records_seen(),
            latest: self.dispatcher.latest().cloned(),
            pointing: self.dispatcher.pointing(),
        }
    }

    /// Ordered shutdown
    ///
    /// Every step runs even if an earlier one failed; the first error is
    /// returned.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut first = FirstError::default();
        first.keep(self.ingest.stop());
        self.dispatcher.poll();
        first.keep(self.persist.stop());
        self.port.disconnect(true);

        info!(
            "Device {} total records dispatched: {}",
            self.id,
            self.dispatcher.records_seen()
        );
        first.into_result()
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Color of this device's ground track, if one is written
    pub fn track_color(&self) -> Option<&'static str> {
        self.persist.task().track().map(TrackWriter::color)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn port(&self) -> &Arc<PortConnection> {
        &self.port
    }
}

/// Every configured device, run together
pub struct Fleet {
    stations: Vec<Station>,
    snapshot_path: Option<PathBuf>,
}

impl Fleet {
    /// Build one [`Station`] per configured device
    ///
    /// All stations open ports through `backend` and draw track colors from
    /// `colors`, in configuration order.
    pub fn build(
        config: &Config,
        backend: Arc<dyn SerialBackend>,
        colors: &ColorAllocator,
    ) -> Result<Self> {
        let stations = config
            .devices
            .iter()
            .map(|device| Station::build(config, device, backend.clone(), colors))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            stations,
            snapshot_path: config.telemetry.snapshot_path.clone(),
        })
    }

    /// Start every station, stopping at the first that cannot start
    pub fn start(&mut self) -> Result<()> {
        for station in &mut self.stations {
            station.start()?;
        }
        Ok(())
    }

    /// Tick every station; returns the number of records dispatched
    pub fn tick(&mut self) -> Result<usize> {
        let mut handled = 0;
        for station in &mut self.stations {
            handled += station.tick()?;
        }
        Ok(handled)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            updated_at: Utc::now(),
            devices: self.stations.iter().map(Station::status).collect(),
        }
    }

    /// Write the status snapshot if a path is configured
    pub fn write_snapshot(&self) -> Result<()> {
        match &self.snapshot_path {
            Some(path) => write_snapshot(path, &self.snapshot()),
            None => Ok(()),
        }
    }

    /// Shut down every station, then write the final snapshot
    ///
    /// Every station is shut down even if an earlier one failed; the first
    /// error is returned.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut first = FirstError::default();
        for station in &mut self.stations {
            first.keep(station.shutdown());
        }
        first.keep(self.write_snapshot());
        first.into_result()
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }
}

/// Drive `fleet` until `shutdown` resolves or a worker fails
///
/// The fleet is shut down before returning in both cases. Shutdown joins
/// worker threads, so it runs through [`tokio::task::block_in_place`].
///
/// # Panics
///
/// Panics if called outside a multi-threaded tokio runtime
pub async fn run<F>(fleet: &mut Fleet, config: &Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut dispatch_tick = interval(config.poll_interval());
    dispatch_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut snapshot_tick = interval(config.snapshot_interval());
    snapshot_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = dispatch_tick.tick() => {
                if let Err(e) = fleet.tick() {
                    error!("Pipeline failed: {}", e);
                    break Err(e);
                }
            }

            _ = snapshot_tick.tick() => {
                if let Err(e) = fleet.write_snapshot() {
                    warn!("Failed to write status snapshot: {}", e);
                }
            }

            _ = &mut shutdown => {
                info!("Shutting down...");
                break Ok(());
            }
        }
    };

    let stopped = tokio::task::block_in_place(|| fleet.shutdown());
    outcome.and(stopped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::port_trait::mocks::{backend_with, backend_with_devices, ScriptedDevice};
    use crate::storage::track::{parse_points, PALETTE};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        let device = &mut config.devices[0];
        device.serial.auto_reconnect = false;
        device.schema = ["packet", "lat", "lon", "alt", "mode"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        config.home.alt = 10.0;
        config.storage.data_dir = dir.path().join("data");
        config.storage.save_name = "test".to_string();
        config.storage.write_raw = true;
        config.workers.poll_interval_ms = 5;
        config.telemetry.snapshot_path = Some(dir.path().join("status.json"));
        config.telemetry.snapshot_interval_ms = 20;
        config
    }

    fn two_device_config(dir: &TempDir) -> Config {
        let mut config = test_config(dir);
        let mut second = config.devices[0].clone();
        second.id = 1;
        second.header = Some("DEV1,".to_string());
        second.serial.port = "/dev/ttyUSB1".to_string();
        config.devices.push(second);
        config
    }

    #[test]
    fn test_build_prepares_output_files() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let backend = Arc::new(backend_with(&["/dev/ttyUSB0"], ScriptedDevice::new()));

        let fleet = Fleet::build(&config, backend, &ColorAllocator::new()).unwrap();
        assert_eq!(fleet.stations().len(), 1);
        assert!(!fleet.stations()[0].port().is_connected());
        assert!(dir.path().join("data/coord_save_test_dev0_0.kml").exists());
        assert!(dir.path().join("data/coord_live_dev0.kml").exists());
    }

    #[test]
    fn test_start_unknown_port_fails() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.devices[0].serial.port = "/dev/ttyACM9".to_string();
        let backend = Arc::new(backend_with(&["/dev/ttyUSB0"], ScriptedDevice::new()));

        let mut fleet = Fleet::build(&config, backend, &ColorAllocator::new()).unwrap();
        assert!(matches!(fleet.start(), Err(GroundlinkError::NoDeviceFound(_))));
        assert_ok!(fleet.shutdown());
    }

    #[test]
    fn test_devices_get_own_files_and_colors() {
        let dir = TempDir::new().unwrap();
        let config = two_device_config(&dir);
        let backend = Arc::new(backend_with_devices(&[
            ("/dev/ttyUSB0", ScriptedDevice::new()),
            ("/dev/ttyUSB1", ScriptedDevice::new()),
        ]));

        let fleet = Fleet::build(&config, backend, &ColorAllocator::new()).unwrap();
        let ids: Vec<_> = fleet.stations().iter().map(Station::id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(fleet.stations()[0].track_color(), Some(PALETTE[0]));
        assert_eq!(fleet.stations()[1].track_color(), Some(PALETTE[1]));

        let data = dir.path().join("data");
        assert!(data.join("coord_save_test_dev0_0.kml").exists());
        assert!(data.join("coord_save_test_dev1_0.kml").exists());
        assert!(data.join("coord_live_dev1.kml").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_end_to_end_with_scripted_device() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let device = ScriptedDevice::new();
        let backend = Arc::new(backend_with(&["/dev/ttyUSB0"], device.clone()));

        let mut fleet = Fleet::build(&config, backend, &ColorAllocator::new()).unwrap();
        assert_ok!(fleet.start());
        assert!(fleet.stations()[0].port().is_connected());

        device.feed(b"DEV0,1,13.7563,100.5018,10,GPS\r\n");
        device.feed(b"DEV0,2,13.7613,100.5018,500,GPS\r\n");
        device.feed(b"JUNK\r\n");
        device.feed(b"DEV0,3,13.7663,100.5018,1010,GPS\r\n");

        let shutdown = tokio::time::sleep(Duration::from_millis(300));
        assert_ok!(run(&mut fleet, &config, shutdown).await);

        let station = &fleet.stations()[0];
        assert!(!station.port().is_connected());
        assert_eq!(station.dispatcher().records_seen(), 4);
        let pointing = station.dispatcher().pointing().unwrap();
        assert!((pointing.elevation_deg - 41.9657).abs() < 1e-3);

        let data = dir.path().join("data");
        let csv = fs::read_to_string(data.join("data_test_dev0_0.csv")).unwrap();
        assert_eq!(
            csv,
            "1,13.7563,100.5018,10,GPS\n2,13.7613,100.5018,500,GPS\n,,,,\n3,13.7663,100.5018,1010,GPS\n"
        );

        let raw = fs::read_to_string(data.join("data_test_dev0_0.raw")).unwrap();
        assert_eq!(raw.lines().nth(2), Some("JUNK"));

        let archive = fs::read_to_string(data.join("coord_save_test_dev0_0.kml")).unwrap();
        let reference = fs::read_to_string(data.join("coord_ref_dev0.kml")).unwrap();
        assert_eq!(archive, reference);
        assert_eq!(parse_points(&archive).len(), 3);

        let status: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("status.json")).unwrap())
                .unwrap();
        assert_eq!(status["devices"][0]["records_seen"], 4);
        assert_eq!(status["devices"][0]["connected"], false);
        assert_eq!(status["devices"][0]["latest"]["mode"], "GPS");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_two_devices_record_separately() {
        let dir = TempDir::new().unwrap();
        let config = two_device_config(&dir);
        let first = ScriptedDevice::new();
        let second = ScriptedDevice::new();
        let backend = Arc::new(backend_with_devices(&[
            ("/dev/ttyUSB0", first.clone()),
            ("/dev/ttyUSB1", second.clone()),
        ]));

        let mut fleet = Fleet::build(&config, backend, &ColorAllocator::new()).unwrap();
        assert_ok!(fleet.start());

        first.feed(b"DEV0,1,13.7563,100.5018,10,GPS\n");
        second.feed(b"DEV1,7,13.8000,100.6000,250,ALT\n");
        second.feed(b"DEV1,8,13.8100,100.6000,260,ALT\n");

        let shutdown = tokio::time::sleep(Duration::from_millis(300));
        assert_ok!(run(&mut fleet, &config, shutdown).await);

        let data = dir.path().join("data");
        assert_eq!(
            fs::read_to_string(data.join("data_test_dev0_0.csv")).unwrap(),
            "1,13.7563,100.5018,10,GPS\n"
        );
        assert_eq!(
            fs::read_to_string(data.join("data_test_dev1_0.csv")).unwrap(),
            "7,13.8,100.6,250,ALT\n8,13.81,100.6,260,ALT\n"
        );

        let second_track = fs::read_to_string(data.join("coord_save_test_dev1_0.kml")).unwrap();
        assert_eq!(parse_points(&second_track).len(), 2);
        assert!(second_track.contains(PALETTE[1]));

        let status: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("status.json")).unwrap())
                .unwrap();
        assert_eq!(status["devices"][0]["records_seen"], 1);
        assert_eq!(status["devices"][1]["id"], 1);
        assert_eq!(status["devices"][1]["records_seen"], 2);
    }
}
