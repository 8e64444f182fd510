// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Packages one stream's events from a time window into an archive.
//!
//! # Cursor walk
//!
//! Events are requested oldest first. The service never sends an explicit
//! end-of-data marker: once the end of the stream is reached it hands back the
//! same forward token it was given. Each iteration therefore:
//!
//! 1. stops when the page is empty,
//! 2. writes the page's events to the archive,
//! 3. stops when the returned token equals the token that was sent,
//! 4. otherwise sends the returned token on the next request.
//!
//! The first request carries no token, so there is nothing to compare against:
//! the walk always follows the first returned token once before step 3 can end it.
//!
//! ```text
//!   request(token=None)  -> [e1 e2] f/1     write, follow f/1
//!   request(token=f/1)   -> [e3]    f/2     write, follow f/2
//!   request(token=f/2)   -> [e4]    f/2     write, echo: stop
//! ```
//!
//! Pages are written as they arrive, so memory stays bounded by one page.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::archive::{archive_path, ArchiveWriter, Compression};
use crate::error::{ExportError, PackageError};
use crate::source::{GetEventsRequest, LogSource};

/// Half-open export window `[start_ms, end_ms)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportWindow {
    start_ms: i64,
    end_ms: i64,
}

impl ExportWindow {
    pub fn new(start_ms: i64, end_ms: i64) -> Result<Self, ExportError> {
        if start_ms >= end_ms {
            return Err(ExportError::InvalidRequest(format!(
                "window start {start_ms} must be before window end {end_ms}"
            )));
        }
        Ok(Self { start_ms, end_ms })
    }

    #[must_use]
    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    #[must_use]
    pub fn end_ms(&self) -> i64 {
        self.end_ms
    }
}

/// Outcome of one stream export.
///
/// The archive exists on disk whether or not events were found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResult {
    pub archive_path: PathBuf,
    pub event_count: usize,
    /// Always `event_count > 0`.
    pub has_events: bool,
}

impl PackageResult {
    pub(crate) fn new(archive_path: PathBuf) -> Self {
        Self {
            archive_path,
            event_count: 0,
            has_events: false,
        }
    }

    pub(crate) fn record(&mut self, events: usize) {
        self.event_count += events;
        self.has_events = self.event_count > 0;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExporterOptions {
    pub compression: Compression,
    /// Fixed metadata appended to every record, e.g. `env=prod`.
    pub inject_fields: Vec<String>,
    /// Maximum events per page requested from the service.
    pub page_limit: Option<u32>,
}

/// Exports streams of a [`LogSource`] into archives.
///
/// Holds no per-export state, so one exporter can serve concurrent exports of
/// distinct streams.
#[derive(Debug, Clone)]
pub struct EventExporter<S> {
    source: S,
    options: ExporterOptions,
}

impl<S: LogSource> EventExporter<S> {
    pub fn new(source: S, options: ExporterOptions) -> Self {
        Self { source, options }
    }

    #[must_use]
    pub fn options(&self) -> &ExporterOptions {
        &self.options
    }

    /// Writes every event of `stream` inside `window` to an archive in `output_dir`.
    ///
    /// On failure the returned error carries the partial result; the archive file
    /// is closed in every case.
    pub async fn package(
        &self,
        group: &str,
        stream: &str,
        window: ExportWindow,
        output_dir: &Path,
    ) -> Result<PackageResult, PackageError> {
        let path = archive_path(output_dir, stream, self.options.compression.codec);
        let mut result = PackageResult::new(path);

        if group.is_empty() || stream.is_empty() {
            return Err(PackageError::new(
                result,
                ExportError::InvalidRequest("group and stream names are required".to_string()),
            ));
        }

        let mut writer = match ArchiveWriter::create(
            &result.archive_path,
            self.options.compression,
            &self.options.inject_fields,
        ) {
            Ok(writer) => writer,
            Err(e) => return Err(PackageError::new(result, e)),
        };

        if let Err(e) = self
            .walk(group, stream, window, &mut writer, &mut result)
            .await
        {
            drop(writer);
            return Err(PackageError::new(result, e));
        }

        // Flushing the compressor trailer and syncing the file can block for a while.
        match tokio::task::spawn_blocking(move || writer.finish()).await {
            Ok(Ok(())) => Ok(result),
            Ok(Err(e)) => Err(PackageError::new(result, e)),
            Err(e) => Err(PackageError::new(
                result,
                ExportError::Close(io::Error::new(io::ErrorKind::Other, e)),
            )),
        }
    }

    async fn walk(
        &self,
        group: &str,
        stream: &str,
        window: ExportWindow,
        writer: &mut ArchiveWriter,
        result: &mut PackageResult,
    ) -> Result<(), ExportError> {
        let mut request = GetEventsRequest {
            group: group.to_string(),
            stream: stream.to_string(),
            start_ms: window.start_ms,
            end_ms: window.end_ms,
            limit: self.options.page_limit,
            next_token: None,
        };
        let mut pages = 0usize;

        loop {
            let page = self
                .source
                .get_events(&request)
                .await
                .map_err(ExportError::Fetch)?;
            pages += 1;

            if page.events.is_empty() {
                break;
            }

            for event in &page.events {
                writer.write_event(event)?;
                result.record(1);
            }

            // The service echoes the token it was given once the stream is exhausted.
            match page.next_forward_token {
                Some(next) if request.next_token.as_ref() != Some(&next) => {
                    request.next_token = Some(next);
                }
                _ => break,
            }
        }

        debug!(
            group,
            stream,
            pages,
            events = result.event_count,
            "finished walking log events"
        );
        Ok(())
    }
}
