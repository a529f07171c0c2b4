//! # Storage Module
//!
//! Durable outputs of the pipeline: the delimited record log, the raw message
//! log and the KML ground-track documents.
//!
//! All files of one device live under a single data directory:
//!
//! | File | Name |
//! |---|---|
//! | Record log | `data_<save>_dev<id>_<n>.<ext>` |
//! | Raw log | `data_<save>_dev<id>_<n>.raw` |
//! | Archive track | `coord_save_<save>_dev<id>_<n>.kml` |
//! | Reference track | `coord_ref_dev<id>.kml` |
//! | Live pointer | `coord_live_dev<id>.kml` |

pub mod delimited;
pub mod track;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use delimited::DelimitedLog;
pub use track::{ColorAllocator, TrackWriter};

/// First free `<stem>_<n>.<ext>` path, counting from 0
///
/// # Examples
///
/// ```
/// use groundlink::storage::unique_path;
///
/// let dir = std::env::temp_dir().join("groundlink-doc-unique");
/// let path = unique_path(&dir.join("data.csv"));
/// assert!(path.file_name().unwrap().to_str().unwrap().starts_with("data_"));
/// ```
pub fn unique_path(base: &Path) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = base.extension().map(|e| e.to_string_lossy().into_owned());

    (0u64..)
        .map(|idx| {
            let name = match &ext {
                Some(ext) => format!("{}_{}.{}", stem, idx, ext),
                None => format!("{}_{}", stem, idx),
            };
            base.with_file_name(name)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| base.to_path_buf())
}

/// File naming for one device and save session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub data_dir: PathBuf,
    pub save_name: String,
    pub extension: String,
    pub device_id: String,
}

impl StorageLayout {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        save_name: impl Into<String>,
        extension: &str,
        device_id: impl ToString,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            save_name: save_name.into(),
            extension: extension.trim_matches('.').to_string(),
            device_id: device_id.to_string(),
        }
    }

    fn session_suffix(&self) -> String {
        format!("_{}_dev{}", self.save_name, self.device_id)
    }

    /// Unique record log path
    pub fn csv_path(&self) -> PathBuf {
        unique_path(&self.data_dir.join(format!(
            "data{}.{}",
            self.session_suffix(),
            self.extension
        )))
    }

    /// Unique raw message log path
    pub fn raw_path(&self) -> PathBuf {
        unique_path(&self.data_dir.join(format!("data{}.raw", self.session_suffix())))
    }

    /// Unique archive track path
    pub fn archive_track_path(&self) -> PathBuf {
        unique_path(
            &self
                .data_dir
                .join(format!("coord_save{}.kml", self.session_suffix())),
        )
    }

    /// Per-device reference track, rewritten every run
    pub fn reference_track_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("coord_ref_dev{}.kml", self.device_id))
    }

    /// Per-device live pointer document
    pub fn live_track_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("coord_live_dev{}.kml", self.device_id))
    }

    /// Create the data directory if missing
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}
