//! # Telemetry Module
//!
//! Publishes the station status as a JSON snapshot file.
//!
//! This module handles:
//! - Collecting each device's dispatcher outputs into a [`StatusSnapshot`]
//! - Serializing it with `serde_json`
//! - Replacing the snapshot file atomically so readers never see a partial write

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::codec::Record;
use crate::error::Result;
use crate::geo::PointingGeometry;

/// Status of every device at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub updated_at: DateTime<Utc>,
    pub devices: Vec<DeviceStatus>,
}

/// Status of one device link
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub id: u32,
    /// Device path of the last connect attempt
    pub port: Option<String>,
    pub connected: bool,
    pub records_seen: u64,
    /// Latest record as a field map, absent values as `null`
    pub latest: Option<Record>,
    pub pointing: Option<PointingGeometry>,
}

impl StatusSnapshot {
    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Write `snapshot` to `path` through a sibling temp file and a rename
///
/// # Errors
///
/// Returns `Json` if serialization fails or `Io` if the file cannot be written
pub fn write_snapshot(path: &Path, snapshot: &StatusSnapshot) -> Result<()> {
    let json = snapshot.to_json()?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FieldValue, Schema};
    use tempfile::TempDir;

    fn device_status() -> DeviceStatus {
        let schema = Schema::new(["packet", "lat", "lon", "alt", "mode"]);
        let record = Record::from_values(
            &schema,
            vec![
                FieldValue::Integer(42),
                FieldValue::Real(13.7663),
                FieldValue::Real(100.5018),
                FieldValue::Integer(1010),
                FieldValue::Absent,
            ],
        )
        .unwrap();

        DeviceStatus {
            id: 0,
            port: Some("/dev/ttyUSB0".to_string()),
            connected: true,
            records_seen: 42,
            latest: Some(record),
            pointing: Some(PointingGeometry {
                ground_distance_m: 1111.9,
                line_of_sight_m: 1495.7,
                azimuth_deg: 0.0,
                elevation_deg: 41.97,
            }),
        }
    }

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            updated_at: Utc::now(),
            devices: vec![device_status()],
        }
    }

    #[test]
    fn test_snapshot_json_shape() {
        let value: serde_json::Value =
            serde_json::from_str(&snapshot().to_json().unwrap()).unwrap();

        let device = &value["devices"][0];
        assert_eq!(device["id"], 0);
        assert_eq!(device["port"], "/dev/ttyUSB0");
        assert_eq!(device["connected"], true);
        assert_eq!(device["records_seen"], 42);
        assert_eq!(device["latest"]["packet"], 42);
        assert_eq!(device["latest"]["lat"], 13.7663);
        assert!(device["latest"]["mode"].is_null());
        assert_eq!(device["pointing"]["elevation_deg"], 41.97);

        let stamp = value["updated_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn test_idle_device_uses_nulls() {
        let snapshot = StatusSnapshot {
            updated_at: Utc::now(),
            devices: vec![
                device_status(),
                DeviceStatus {
                    id: 1,
                    port: None,
                    connected: false,
                    records_seen: 0,
                    latest: None,
                    pointing: None,
                },
            ],
        };
        let value: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(value["devices"].as_array().map(Vec::len), Some(2));
        assert!(value["devices"][1]["port"].is_null());
        assert!(value["devices"][1]["latest"].is_null());
        assert!(value["devices"][1]["pointing"].is_null());
    }

    #[test]
    fn test_write_snapshot_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status/groundlink.json");

        write_snapshot(&path, &snapshot()).unwrap();
        let mut second = snapshot();
        second.devices[0].records_seen = 43;
        write_snapshot(&path, &second).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["devices"][0]["records_seen"], 43);
        assert!(!dir.path().join("status/groundlink.json.tmp").exists());
    }
}
