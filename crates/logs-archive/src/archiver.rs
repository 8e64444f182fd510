// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One archive run: discover, export, upload.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::config::ArchiveConfig;
use crate::discovery::StreamDiscovery;
use crate::error::{DiscoveryError, ExportError, PackageError};
use crate::exporter::{EventExporter, ExportWindow, PackageResult};
use crate::source::LogSource;
use crate::uploader::{object_key, Upload, UploadError, Uploader};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid export window: {0}")]
    Window(#[source] ExportError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("failed to export stream {stream}: {source}")]
    Package {
        stream: String,
        #[source]
        source: PackageError,
    },

    #[error("failed to upload stream {stream}: {source}")]
    Upload {
        stream: String,
        #[source]
        source: UploadError,
    },
}

/// Totals of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Streams selected for export.
    pub streams: usize,
    pub exported: usize,
    pub uploaded: usize,
    /// Archives left on disk because they had no events.
    pub skipped_empty: usize,
    pub events: usize,
}

#[derive(Debug)]
struct StreamOutcome {
    package: PackageResult,
    upload: Option<Upload>,
}

pub struct Archiver {
    source: Arc<dyn LogSource>,
    uploader: Arc<dyn Uploader>,
    config: ArchiveConfig,
}

impl Archiver {
    pub fn new(
        source: Arc<dyn LogSource>,
        uploader: Arc<dyn Uploader>,
        config: ArchiveConfig,
    ) -> Self {
        Self {
            source,
            uploader,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Archives every selected stream of the configured group for a run starting at `now`.
    ///
    /// Stops at the first stream that fails; archives already uploaded stay uploaded.
    ///
    /// Up to `concurrency` exports share the runtime. Pages are encoded on the
    /// calling task as they arrive, while finishing an archive runs on the blocking
    /// pool.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, RunError> {
        let config = &self.config;
        let window = config.window(now).map_err(RunError::Window)?;
        let run_stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);

        let streams = self.select_streams(now).await?;
        info!(
            group = %config.group_name,
            start = window.start_ms(),
            end = window.end_ms(),
            count = streams.len(),
            "archiving log streams"
        );

        let exporter = EventExporter::new(Arc::clone(&self.source), config.exporter_options());
        let outcomes: Vec<StreamOutcome> = stream::iter(&streams)
            .map(|stream| self.archive_stream(&exporter, stream, window, &run_stamp))
            .buffered(config.concurrency.max(1))
            .try_collect()
            .await?;

        let mut summary = RunSummary {
            streams: streams.len(),
            ..RunSummary::default()
        };
        for outcome in &outcomes {
            summary.exported += 1;
            summary.events += outcome.package.event_count;
            match outcome.upload {
                Some(_) => summary.uploaded += 1,
                None => summary.skipped_empty += 1,
            }
        }

        info!(
            group = %config.group_name,
            streams = summary.streams,
            uploaded = summary.uploaded,
            skipped_empty = summary.skipped_empty,
            events = summary.events,
            "archive run complete"
        );
        Ok(summary)
    }

    async fn select_streams(&self, now: DateTime<Utc>) -> Result<Vec<String>, RunError> {
        let config = &self.config;
        if !config.stream_names.is_empty() {
            debug!(count = config.stream_names.len(), "using configured stream names");
            return Ok(config.stream_names.clone());
        }

        let discovery = StreamDiscovery::new(Arc::clone(&self.source), config.discovery_strategy);
        let threshold = config.discovery_threshold(now).map_err(RunError::Window)?;
        let streams = discovery.discover(&config.group_name, threshold).await?;
        Ok(streams.into_iter().map(|stream| stream.name).collect())
    }

    async fn archive_stream(
        &self,
        exporter: &EventExporter<Arc<dyn LogSource>>,
        stream: &str,
        window: ExportWindow,
        run_stamp: &str,
    ) -> Result<StreamOutcome, RunError> {
        let config = &self.config;
        let package = exporter
            .package(
                &config.group_name,
                stream,
                window,
                &config.temporary_directory,
            )
            .await
            .map_err(|source| RunError::Package {
                stream: stream.to_string(),
                source,
            })?;

        info!(
            stream,
            count = package.event_count,
            path = %package.archive_path.display(),
            "packaged log stream"
        );

        if !package.has_events && !config.upload_empty {
            info!(stream, path = %package.archive_path.display(), "skipping upload of empty archive");
            return Ok(StreamOutcome {
                package,
                upload: None,
            });
        }

        let key = object_key(
            &config.bucket_prefix,
            stream,
            run_stamp,
            config.compression.codec,
        );
        let upload = self
            .uploader
            .upload(&package.archive_path, &key)
            .await
            .map_err(|source| RunError::Upload {
                stream: stream.to_string(),
                source,
            })?;

        info!(stream, bucket = %upload.bucket, key = %upload.key, "uploaded archive");
        Ok(StreamOutcome {
            package,
            upload: Some(upload),
        })
    }
}
