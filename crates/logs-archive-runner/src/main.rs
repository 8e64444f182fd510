// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process, sync::Arc};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use logs_archive::{
    archiver::Archiver,
    config::{ArchiveConfig, ENV_LOG_LEVEL},
    logger::{env_filter_directive, Formatter},
    source::{cloudwatch::CloudWatchLogsClient, LogSource},
    uploader::{HttpUploader, LocalUploader, Uploader},
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var(ENV_LOG_LEVEL)
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter_directive(&log_level))
                .expect("could not parse log level in configuration"),
        )
        .event_format(Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ArchiveConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let source: Arc<dyn LogSource> =
        match CloudWatchLogsClient::new(&config.source_endpoint, config.request_timeout) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!("Unable to create log service client: {e}");
                process::exit(1);
            }
        };

    let uploader: Arc<dyn Uploader> = match (&config.upload_endpoint, &config.upload_directory) {
        (Some(endpoint), _) => {
            match HttpUploader::new(endpoint, &config.bucket_name, config.request_timeout) {
                Ok(uploader) => Arc::new(uploader),
                Err(e) => {
                    error!("Unable to create uploader: {e}");
                    process::exit(1);
                }
            }
        }
        (None, Some(directory)) => Arc::new(LocalUploader::new(directory, &config.bucket_name)),
        (None, None) => {
            error!("No upload target configured");
            process::exit(1);
        }
    };

    let archiver = Archiver::new(source, uploader, config);
    match archiver.run(chrono::Utc::now()).await {
        Ok(summary) => info!(
            streams = summary.streams,
            uploaded = summary.uploaded,
            skipped_empty = summary.skipped_empty,
            events = summary.events,
            "Finished archiving log group"
        ),
        Err(e) => {
            error!("Archive run failed: {e}");
            process::exit(1);
        }
    }
}
