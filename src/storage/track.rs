//! # Ground Track Writer
//!
//! Maintains KML documents holding the path of a tracked device as a single
//! `LineString`.
//!
//! Appending a point never rewrites the whole document: the writer remembers
//! the byte offset where the closing boilerplate starts, writes the new point
//! there and puts the closing lines back behind it.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};

use super::StorageLayout;
use crate::error::Result;
use crate::geo::GeoCoordinate;

/// Line colors in KML `aabbggrr` form, handed out in order
pub const PALETTE: [&str; 8] = [
    "ff00ffff", // yellow
    "ff800080", // purple
    "ff0080ff", // orange
    "ffff0000", // blue
    "ff0000ff", // red
    "ff00ff00", // green
    "ff336699", // brown
    "ffffffff", // white
];

const KML_HEAD: &str = "<kml xmlns=\"http://www.opengis.net/kml/2.2\" \
xmlns:gx=\"http://www.google.com/kml/ext/2.2\">\n\
<Folder>\n\
<name>Log</name>\n\
<Placemark>\n\
<name>Device Path Plotting</name>\n\
<Style>\n\
<LineStyle>\n\
<color>";

const KML_STYLE: &str = "</color>\n\
<colorMode>normal</colorMode>\n\
<width>3</width>\n\
</LineStyle>\n\
<PolyStyle>\n\
<color>99000000</color>\n\
<fill>1</fill>\n\
</PolyStyle>\n\
</Style>\n\
<LineString>\n\
<extrude>1</extrude>\n\
<gx:altitudeMode>absolute</gx:altitudeMode>\n\
<coordinates>\n";

/// Closing boilerplate, always the last five lines of a track document
const KML_CLOSE: &str = "</coordinates>\n</LineString>\n</Placemark>\n</Folder>\n</kml>\n";

const LIVE_HEAD: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<kml xmlns=\"http://www.opengis.net/kml/2.2\" \
xmlns:gx=\"http://www.google.com/kml/ext/2.2\">\n\
<NetworkLink>\n\
<Link>\n\
<href>";

const LIVE_TAIL: &str = "</href>\n\
<refreshMode>onInterval</refreshMode>\n\
<refreshInterval>0.1</refreshInterval>\n\
</Link>\n\
</NetworkLink>\n\
</kml>\n";

/// Hands out palette colors round-robin
///
/// Shared between all writers of a process so that concurrent devices get
/// distinct line colors.
#[derive(Debug, Default)]
pub struct ColorAllocator {
    next_color: AtomicUsize,
}

impl ColorAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next color in palette order, wrapping after eight
    pub fn next(&self) -> &'static str {
        PALETTE[self.next_color.fetch_add(1, Ordering::Relaxed) % PALETTE.len()]
    }
}

/// KML point line: `lon,lat,alt` with 6, 6 and 2 decimals
pub fn format_point(coord: &GeoCoordinate) -> String {
    format!("{:.6},{:.6},{:.2}", coord.lon, coord.lat, coord.alt)
}

/// Render a complete track document
pub fn render_document(color: &str, points: &[GeoCoordinate]) -> String {
    let mut doc = String::with_capacity(KML_HEAD.len() + KML_STYLE.len() + KML_CLOSE.len());
    doc.push_str(KML_HEAD);
    doc.push_str(color);
    doc.push_str(KML_STYLE);
    for point in points {
        doc.push_str(&format_point(point));
        doc.push('\n');
    }
    doc.push_str(KML_CLOSE);
    doc
}

/// Coordinates listed in a track document, in file order
pub fn parse_points(doc: &str) -> Vec<GeoCoordinate> {
    let Some(start) = doc.find("<coordinates>") else {
        return Vec::new();
    };
    let body = &doc[start + "<coordinates>".len()..];
    let body = body.split("</coordinates>").next().unwrap_or_default();

    body.lines()
        .filter_map(|line| {
            let mut parts = line.trim().split(',').map(str::parse::<f64>);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(Ok(lon)), Some(Ok(lat)), Some(Ok(alt))) => {
                    Some(GeoCoordinate::new(lat, lon, alt))
                }
                _ => None,
            }
        })
        .collect()
}

/// Insert `line` at byte offset `cursor` and shift everything after it
///
/// # Returns
///
/// * `io::Result<u64>` - Offset just past the inserted line
pub fn insert_before_tail(path: &Path, line: &str, cursor: u64) -> std::io::Result<u64> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;

    file.seek(SeekFrom::Start(cursor))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;

    file.seek(SeekFrom::Start(cursor))?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    let next = file.stream_position()?;
    file.write_all(&tail)?;
    file.flush()?;
    Ok(next)
}

/// One document plus the offset of its closing boilerplate
#[derive(Debug)]
struct TrackFile {
    path: PathBuf,
    cursor: Option<u64>,
}

impl TrackFile {
    fn new(path: PathBuf) -> Self {
        Self { path, cursor: None }
    }

    fn append(&mut self, color: &str, coord: &GeoCoordinate) -> Result<()> {
        let cursor = match self.cursor {
            None => {
                let doc = render_document(color, std::slice::from_ref(coord));
                fs::write(&self.path, &doc)?;
                (doc.len() - KML_CLOSE.len()) as u64
            }
            Some(cursor) => insert_before_tail(&self.path, &format_point(coord), cursor)?,
        };
        self.cursor = Some(cursor);
        Ok(())
    }
}

/// Writes every valid coordinate to the archive and reference tracks
#[derive(Debug)]
pub struct TrackWriter {
    archive: TrackFile,
    reference: TrackFile,
    live_path: PathBuf,
    color: &'static str,
}

impl TrackWriter {
    /// Prepare the track documents of `layout`
    ///
    /// Reserves a unique archive name, removes the reference track left by a
    /// previous run and writes the live pointer if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the data directory or any document cannot be written
    pub fn create(layout: &StorageLayout, colors: &ColorAllocator) -> Result<Self> {
        layout.ensure_dir()?;

        let archive_path = layout.archive_track_path();
        fs::File::create(&archive_path)?;

        let reference_path = layout.reference_track_path();
        if reference_path.is_file() {
            fs::remove_file(&reference_path)?;
        }

        let live_path = layout.live_track_path();
        if !live_path.exists() {
            let href = fs::canonicalize(&layout.data_dir)
                .unwrap_or_else(|_| layout.data_dir.clone())
                .join(reference_path.file_name().unwrap_or_default());
            fs::write(
                &live_path,
                format!("{}{}{}", LIVE_HEAD, href.display(), LIVE_TAIL),
            )?;
            debug!("Live track pointer written to {:?}", live_path);
        }

        let color = colors.next();
        info!("Track archive {:?} (color {})", archive_path, color);

        Ok(Self {
            archive: TrackFile::new(archive_path),
            reference: TrackFile::new(reference_path),
            live_path,
            color,
        })
    }

    /// Append one point to both documents
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - `false` when the coordinate is not valid and was skipped
    pub fn append(&mut self, coord: &GeoCoordinate) -> Result<bool> {
        if !coord.valid() {
            return Ok(false);
        }
        self.reference.append(self.color, coord)?;
        self.archive.append(self.color, coord)?;
        Ok(true)
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive.path
    }

    pub fn reference_path(&self) -> &Path {
        &self.reference.path
    }

    pub fn live_path(&self) -> &Path {
        &self.live_path
    }

    pub fn color(&self) -> &'static str {
        self.color
    }
}
