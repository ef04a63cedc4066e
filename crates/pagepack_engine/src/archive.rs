use std::collections::HashSet;
use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::Payload;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("container write failed: {0}")]
    Container(String),
    #[error("archive io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("duplicate archive path \"{0}\"")]
    DuplicatePath(String),
    #[error("archive already finished")]
    AlreadyFinished,
}

/// Receives finished archive entries. `put` appends one entry; `finish`
/// seals the container and yields its bytes. Implementations must reject a
/// path that was already written.
pub trait ArchiveSink: Send {
    fn put(&mut self, virtual_path: &str, content: &Payload) -> Result<(), ArchiveError>;
    fn finish(&mut self) -> Result<Vec<u8>, ArchiveError>;
}

/// In-memory deflate-compressed zip container.
pub struct ZipSink {
    writer: Option<ZipWriter<Cursor<Vec<u8>>>>,
    paths: HashSet<String>,
}

impl ZipSink {
    pub fn new() -> Self {
        Self {
            writer: Some(ZipWriter::new(Cursor::new(Vec::new()))),
            paths: HashSet::new(),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.paths.len()
    }
}

impl Default for ZipSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSink for ZipSink {
    fn put(&mut self, virtual_path: &str, content: &Payload) -> Result<(), ArchiveError> {
        let writer = self.writer.as_mut().ok_or(ArchiveError::AlreadyFinished)?;
        if !self.paths.insert(virtual_path.to_string()) {
            return Err(ArchiveError::DuplicatePath(virtual_path.to_string()));
        }
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer
            .start_file(virtual_path, options)
            .map_err(|err| ArchiveError::Container(err.to_string()))?;
        writer.write_all(content.as_bytes())?;
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>, ArchiveError> {
        let writer = self.writer.take().ok_or(ArchiveError::AlreadyFinished)?;
        let cursor = writer
            .finish()
            .map_err(|err| ArchiveError::Container(err.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// Default download name: sanitized host plus a UTC timestamp, e.g.
/// `example_com_20260830143000.zip`.
pub fn suggested_archive_name(base: &Url, now: DateTime<Utc>) -> String {
    let host = base.host_str().unwrap_or("page");
    let sanitized: String = host
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{sanitized}_{}.zip", now.format("%Y%m%d%H%M%S"))
}
