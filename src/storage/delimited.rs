//! Append-only delimited text log.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Delimited log file opened in append mode per batch
#[derive(Debug, Clone)]
pub struct DelimitedLog {
    path: PathBuf,
    delimiter: String,
}

impl DelimitedLog {
    pub fn new(path: impl Into<PathBuf>, delimiter: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            delimiter: delimiter.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append rows, each joined by the delimiter and newline-terminated
    ///
    /// Empty rows are skipped; a batch of only empty rows does not touch
    /// the file.
    pub fn append_rows<I, R>(&self, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[String]>,
    {
        let mut rows = rows.into_iter().filter(|row| !row.as_ref().is_empty()).peekable();
        if rows.peek().is_none() {
            return Ok(0);
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut out = BufWriter::new(file);
        let mut written = 0;
        for row in rows {
            out.write_all(row.as_ref().join(&self.delimiter).as_bytes())?;
            out.write_all(b"\n")?;
            written += 1;
        }
        out.flush()?;
        Ok(written)
    }

    /// Append text lines verbatim, newline-terminated
    pub fn append_lines<I, S>(&self, lines: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lines = lines.into_iter().peekable();
        if lines.peek().is_none() {
            return Ok(0);
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut out = BufWriter::new(file);
        let mut written = 0;
        for line in lines {
            out.write_all(line.as_ref().as_bytes())?;
            out.write_all(b"\n")?;
            written += 1;
        }
        out.flush()?;
        Ok(written)
    }
}
