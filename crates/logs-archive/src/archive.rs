// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Archive files: space-delimited text records behind a streaming compressor.
//!
//! # Layout
//!
//! ```text
//!   LogEvent ──> csv::Writer ──> Compressor (gzip | zstd) ──> BufWriter<File>
//! ```
//!
//! Each record is `<timestamp> <message>` with an optional third field holding
//! the injected metadata, e.g.
//!
//! ```text
//! 2024-05-01T10:00:00.123Z "GET /health 200" ,env=prod,svc=web
//! ```
//!
//! Fields containing the delimiter, quotes or line breaks are quoted, so every
//! record occupies exactly one line.
//!
//! # Finalization
//!
//! [`ArchiveWriter::finish`] is the only way to produce a readable archive: it
//! flushes the record encoder, flushes the compressor, writes the compressor's
//! trailer, flushes the file buffer and syncs the file, in that order. Dropping an
//! unfinished writer releases the file handle but leaves an archive that readers
//! must treat as invalid.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use flate2::write::GzEncoder;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::ExportError;
use crate::source::LogEvent;

/// Record field separator expected by the downstream ingestion format.
pub const RECORD_DELIMITER: u8 = b' ';

/// Separator between injected metadata fields.
pub const INJECTED_FIELD_SEPARATOR: char = ',';

/// Compression format of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Gzip,
    Zstd,
}

impl Codec {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Codec::Gzip => "gz",
            Codec::Zstd => "zst",
        }
    }

    /// Inclusive range of levels the codec accepts.
    #[must_use]
    pub fn level_range(self) -> (i32, i32) {
        match self {
            Codec::Gzip => (0, 9),
            Codec::Zstd => (1, 22),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Gzip => f.write_str("gzip"),
            Codec::Zstd => f.write_str("zstd"),
        }
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gzip" | "gz" => Ok(Codec::Gzip),
            "zstd" | "zst" => Ok(Codec::Zstd),
            other => Err(format!("unknown codec '{other}', expected gzip or zstd")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compression {
    pub codec: Codec,
    pub level: i32,
}

impl Default for Compression {
    fn default() -> Self {
        Self {
            codec: Codec::Gzip,
            level: 6,
        }
    }
}

/// Bytes of a stream name kept as-is in its archive file name.
const FILE_NAME_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'_')
    .remove(b'-')
    .remove(b'$')
    .remove(b'[')
    .remove(b']');

/// Deterministic archive location for a stream inside `dir`.
///
/// Stream names routinely contain path separators (`2024/05/01/[$LATEST]ab12`),
/// so every other byte is percent-encoded. Distinct stream names map to distinct
/// paths.
#[must_use]
pub fn archive_path(dir: &Path, stream: &str, codec: Codec) -> PathBuf {
    let file_name = match stream.strip_prefix('.') {
        Some(rest) => format!("%2E{}", utf8_percent_encode(rest, FILE_NAME_SAFE)),
        None => utf8_percent_encode(stream, FILE_NAME_SAFE).to_string(),
    };
    dir.join(format!("{file_name}.{}", codec.extension()))
}

/// Formats epoch milliseconds as an ISO-8601 UTC timestamp with millisecond precision.
#[must_use]
pub fn format_timestamp(timestamp_ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

enum Compressor<W: Write> {
    Gzip(GzEncoder<W>),
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> Compressor<W> {
    fn new(inner: W, compression: Compression) -> io::Result<Self> {
        match compression.codec {
            Codec::Gzip => {
                let level = u32::try_from(compression.level).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "negative gzip level")
                })?;
                Ok(Compressor::Gzip(GzEncoder::new(
                    inner,
                    flate2::Compression::new(level),
                )))
            }
            Codec::Zstd => Ok(Compressor::Zstd(zstd::stream::write::Encoder::new(
                inner,
                compression.level,
            )?)),
        }
    }

    /// Writes the trailer and hands back the inner writer.
    fn finish(self) -> io::Result<W> {
        match self {
            Compressor::Gzip(encoder) => encoder.finish(),
            Compressor::Zstd(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Compressor::Gzip(encoder) => encoder.write(buf),
            Compressor::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Compressor::Gzip(encoder) => encoder.flush(),
            Compressor::Zstd(encoder) => encoder.flush(),
        }
    }
}

/// Streaming writer for one archive file.
pub struct ArchiveWriter {
    records: csv::Writer<Compressor<BufWriter<File>>>,
    injected: Option<String>,
    path: PathBuf,
}

impl fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("path", &self.path)
            .field("injected", &self.injected)
            .finish_non_exhaustive()
    }
}

impl ArchiveWriter {
    /// Creates (or truncates) the archive at `path`.
    pub fn create(
        path: &Path,
        compression: Compression,
        inject_fields: &[String],
    ) -> Result<Self, ExportError> {
        let create_error = |source| ExportError::Create {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(create_error)?;
        let compressor =
            Compressor::new(BufWriter::new(file), compression).map_err(create_error)?;
        let records = csv::WriterBuilder::new()
            .delimiter(RECORD_DELIMITER)
            .quote_style(csv::QuoteStyle::Necessary)
            .terminator(csv::Terminator::Any(b'\n'))
            .has_headers(false)
            .from_writer(compressor);

        let injected = if inject_fields.is_empty() {
            None
        } else {
            Some(inject_fields.iter().fold(String::new(), |mut acc, field| {
                acc.push(INJECTED_FIELD_SEPARATOR);
                acc.push_str(field);
                acc
            }))
        };

        Ok(Self {
            records,
            injected,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_event(&mut self, event: &LogEvent) -> Result<(), ExportError> {
        let timestamp = format_timestamp(event.timestamp)
            .ok_or(ExportError::InvalidTimestamp(event.timestamp))?;
        let result = match &self.injected {
            Some(injected) => self.records.write_record([
                timestamp.as_str(),
                event.message.as_str(),
                injected.as_str(),
            ]),
            None => self
                .records
                .write_record([timestamp.as_str(), event.message.as_str()]),
        };
        result.map_err(ExportError::Encode)
    }

    /// Flushes every layer, writes the compressed trailer and closes the file.
    pub fn finish(self) -> Result<(), ExportError> {
        let mut compressor = self
            .records
            .into_inner()
            .map_err(|e| {
                let error = e.error();
                ExportError::Flush(io::Error::new(error.kind(), error.to_string()))
            })?;
        compressor.flush().map_err(ExportError::Flush)?;
        let buffered = compressor.finish().map_err(ExportError::Close)?;
        let file = buffered
            .into_inner()
            .map_err(|e| ExportError::Close(e.into_error()))?;
        file.sync_all().map_err(ExportError::Close)
    }
}
