// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Run configuration, read from `LOGS_ARCHIVE_*` environment variables.
//!
//! Window offsets are signed durations relative to the moment the run starts,
//! written as an optional `-` followed by a humantime duration (`-1h`, `-90m`, `0s`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::archive::{Codec, Compression};
use crate::discovery::DiscoveryStrategy;
use crate::error::ExportError;
use crate::exporter::{ExportWindow, ExporterOptions};
use crate::source::cloudwatch::regional_endpoint;

pub const ENV_GROUP_NAME: &str = "LOGS_ARCHIVE_GROUP_NAME";
pub const ENV_STREAM_NAMES: &str = "LOGS_ARCHIVE_STREAM_NAMES";
pub const ENV_DISCOVERY_START: &str = "LOGS_ARCHIVE_DISCOVERY_START";
pub const ENV_START: &str = "LOGS_ARCHIVE_START";
pub const ENV_END: &str = "LOGS_ARCHIVE_END";
pub const ENV_BUCKET_NAME: &str = "LOGS_ARCHIVE_BUCKET_NAME";
pub const ENV_BUCKET_PREFIX: &str = "LOGS_ARCHIVE_BUCKET_PREFIX";
pub const ENV_TEMPORARY_DIRECTORY: &str = "LOGS_ARCHIVE_TEMPORARY_DIRECTORY";
pub const ENV_INJECT_FIELDS: &str = "LOGS_ARCHIVE_INJECT_FIELDS";
pub const ENV_CODEC: &str = "LOGS_ARCHIVE_CODEC";
pub const ENV_COMPRESSION_LEVEL: &str = "LOGS_ARCHIVE_COMPRESSION_LEVEL";
pub const ENV_DISCOVERY_STRATEGY: &str = "LOGS_ARCHIVE_DISCOVERY_STRATEGY";
pub const ENV_PAGE_LIMIT: &str = "LOGS_ARCHIVE_PAGE_LIMIT";
pub const ENV_CONCURRENCY: &str = "LOGS_ARCHIVE_CONCURRENCY";
pub const ENV_UPLOAD_EMPTY: &str = "LOGS_ARCHIVE_UPLOAD_EMPTY";
/// Log service base URL. Requests are not signed, so when this is left at the
/// regional AWS default it must be reached through a signing proxy.
pub const ENV_SOURCE_ENDPOINT: &str = "LOGS_ARCHIVE_SOURCE_ENDPOINT";
pub const ENV_UPLOAD_ENDPOINT: &str = "LOGS_ARCHIVE_UPLOAD_ENDPOINT";
pub const ENV_UPLOAD_DIRECTORY: &str = "LOGS_ARCHIVE_UPLOAD_DIRECTORY";
pub const ENV_REQUEST_TIMEOUT: &str = "LOGS_ARCHIVE_REQUEST_TIMEOUT";
pub const ENV_LOG_LEVEL: &str = "LOGS_ARCHIVE_LOG_LEVEL";

const DEFAULT_REGION: &str = "us-east-1";
/// Largest accepted window offset in either direction.
const MAX_OFFSET_DAYS: i64 = 100 * 365;
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Parse { name: &'static str, reason: String },

    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// Parses a signed offset such as `-1h` or `15m`.
pub fn parse_offset(value: &str) -> Result<TimeDelta, String> {
    let value = value.trim();
    let (negative, magnitude) = match value.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, value.strip_prefix('+').unwrap_or(value).trim()),
    };
    let duration = if magnitude == "0" {
        Duration::ZERO
    } else {
        humantime::parse_duration(magnitude).map_err(|e| format!("'{value}': {e}"))?
    };
    let delta = TimeDelta::from_std(duration).map_err(|e| format!("'{value}': {e}"))?;
    Ok(if negative { -delta } else { delta })
}

fn offset_millis(now: DateTime<Utc>, offset: TimeDelta) -> Result<i64, ExportError> {
    now.checked_add_signed(offset)
        .map(|at| at.timestamp_millis())
        .ok_or_else(|| {
            ExportError::InvalidRequest(format!("offset {offset} from {now} is out of range"))
        })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(format!("'{other}' is not a boolean")),
    }
}

/// Configuration for one archive run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveConfig {
    pub group_name: String,
    /// When non-empty these streams are exported and discovery is skipped.
    pub stream_names: Vec<String>,
    /// Offset of the discovery threshold; defaults to `start`.
    pub discovery_start: Option<TimeDelta>,
    pub start: TimeDelta,
    pub end: TimeDelta,
    pub bucket_name: String,
    pub bucket_prefix: String,
    pub temporary_directory: PathBuf,
    pub inject_fields: Vec<String>,
    pub compression: Compression,
    pub discovery_strategy: DiscoveryStrategy,
    pub page_limit: Option<u32>,
    /// Streams exported at the same time.
    pub concurrency: usize,
    /// Upload archives that contain no events.
    pub upload_empty: bool,
    pub source_endpoint: String,
    pub upload_endpoint: Option<String>,
    pub upload_directory: Option<PathBuf>,
    pub request_timeout: Duration,
    pub log_level: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            group_name: String::new(),
            stream_names: Vec::new(),
            discovery_start: None,
            start: TimeDelta::hours(-1),
            end: TimeDelta::zero(),
            bucket_name: String::new(),
            bucket_prefix: String::new(),
            temporary_directory: env::temp_dir(),
            inject_fields: Vec::new(),
            compression: Compression::default(),
            discovery_strategy: DiscoveryStrategy::default(),
            page_limit: None,
            concurrency: 1,
            upload_empty: false,
            source_endpoint: regional_endpoint(DEFAULT_REGION),
            upload_endpoint: None,
            upload_directory: None,
            request_timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
        }
    }
}

impl ArchiveConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable lookup, then validates it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T>(
            name: &'static str,
            raw: Option<String>,
            parse: impl FnOnce(&str) -> Result<T, String>,
        ) -> Result<Option<T>, ConfigError> {
            raw.map(|value| parse(&value).map_err(|reason| ConfigError::Parse { name, reason }))
                .transpose()
        }

        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let region = get("AWS_REGION")
            .or_else(|| get("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let codec = parsed(ENV_CODEC, get(ENV_CODEC), str::parse::<Codec>)?
            .unwrap_or(defaults.compression.codec);
        let level = parsed(ENV_COMPRESSION_LEVEL, get(ENV_COMPRESSION_LEVEL), |v| {
            v.trim().parse::<i32>().map_err(|e| e.to_string())
        })?
        .unwrap_or(defaults.compression.level);

        let config = Self {
            group_name: get(ENV_GROUP_NAME).unwrap_or_default(),
            stream_names: get(ENV_STREAM_NAMES)
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            discovery_start: parsed(
                ENV_DISCOVERY_START,
                get(ENV_DISCOVERY_START),
                parse_offset,
            )?,
            start: parsed(ENV_START, get(ENV_START), parse_offset)?.unwrap_or(defaults.start),
            end: parsed(ENV_END, get(ENV_END), parse_offset)?.unwrap_or(defaults.end),
            bucket_name: get(ENV_BUCKET_NAME).unwrap_or_default(),
            bucket_prefix: get(ENV_BUCKET_PREFIX).unwrap_or_default(),
            temporary_directory: get(ENV_TEMPORARY_DIRECTORY)
                .map(PathBuf::from)
                .unwrap_or_default(),
            inject_fields: get(ENV_INJECT_FIELDS)
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            compression: Compression { codec, level },
            discovery_strategy: parsed(
                ENV_DISCOVERY_STRATEGY,
                get(ENV_DISCOVERY_STRATEGY),
                str::parse::<DiscoveryStrategy>,
            )?
            .unwrap_or(defaults.discovery_strategy),
            page_limit: parsed(ENV_PAGE_LIMIT, get(ENV_PAGE_LIMIT), |v| {
                v.trim().parse::<u32>().map_err(|e| e.to_string())
            })?,
            concurrency: parsed(ENV_CONCURRENCY, get(ENV_CONCURRENCY), |v| {
                v.trim().parse::<usize>().map_err(|e| e.to_string())
            })?
            .unwrap_or(defaults.concurrency),
            upload_empty: parsed(ENV_UPLOAD_EMPTY, get(ENV_UPLOAD_EMPTY), parse_bool)?
                .unwrap_or(defaults.upload_empty),
            source_endpoint: get(ENV_SOURCE_ENDPOINT)
                .unwrap_or_else(|| regional_endpoint(&region)),
            upload_endpoint: get(ENV_UPLOAD_ENDPOINT),
            upload_directory: get(ENV_UPLOAD_DIRECTORY).map(PathBuf::from),
            request_timeout: parsed(ENV_REQUEST_TIMEOUT, get(ENV_REQUEST_TIMEOUT), |v| {
                humantime::parse_duration(v.trim()).map_err(|e| e.to_string())
            })?
            .unwrap_or(defaults.request_timeout),
            log_level: get(ENV_LOG_LEVEL)
                .map(|v| v.trim().to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.group_name.trim().is_empty() {
            errors.push(format!("{ENV_GROUP_NAME} is a required variable"));
        }
        if self.discovery_start.unwrap_or(self.start) > self.start {
            errors.push(format!(
                "{ENV_DISCOVERY_START} should not be after {ENV_START}"
            ));
        }
        let max_offset = TimeDelta::days(MAX_OFFSET_DAYS);
        for (name, offset) in [
            (ENV_DISCOVERY_START, self.discovery_start),
            (ENV_START, Some(self.start)),
            (ENV_END, Some(self.end)),
        ] {
            if offset.is_some_and(|offset| offset.abs() > max_offset) {
                errors.push(format!(
                    "{name} must be within {MAX_OFFSET_DAYS} days of the run time"
                ));
            }
        }
        if self.start >= self.end {
            errors.push(format!("{ENV_START} should be a duration before {ENV_END}"));
        }
        if self.bucket_name.trim().is_empty() {
            errors.push(format!("{ENV_BUCKET_NAME} is a required variable"));
        }
        if self.bucket_prefix.trim().is_empty() {
            errors.push(format!("{ENV_BUCKET_PREFIX} is a required variable"));
        }
        if self.temporary_directory.as_os_str().is_empty() {
            errors.push(format!("{ENV_TEMPORARY_DIRECTORY} is a required variable"));
        }
        for field in &self.inject_fields {
            if field.chars().any(|c| c.is_whitespace() || c == ',' || c == '"') {
                errors.push(format!(
                    "{ENV_INJECT_FIELDS} entry '{field}' cannot contain whitespace, commas or quotes"
                ));
            }
        }
        let (min_level, max_level) = self.compression.codec.level_range();
        if !(min_level..=max_level).contains(&self.compression.level) {
            errors.push(format!(
                "{ENV_COMPRESSION_LEVEL} must be between {min_level} and {max_level} for {}",
                self.compression.codec
            ));
        }
        if self.page_limit == Some(0) {
            errors.push(format!("{ENV_PAGE_LIMIT} must be greater than 0"));
        }
        if self.concurrency == 0 {
            errors.push(format!("{ENV_CONCURRENCY} must be greater than 0"));
        }
        match (&self.upload_endpoint, &self.upload_directory) {
            (Some(_), Some(_)) => errors.push(format!(
                "only one of {ENV_UPLOAD_ENDPOINT} and {ENV_UPLOAD_DIRECTORY} can be set"
            )),
            (None, None) => errors.push(format!(
                "one of {ENV_UPLOAD_ENDPOINT} or {ENV_UPLOAD_DIRECTORY} is required"
            )),
            _ => {}
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Export window for a run starting at `now`.
    pub fn window(&self, now: DateTime<Utc>) -> Result<ExportWindow, ExportError> {
        ExportWindow::new(
            offset_millis(now, self.start)?,
            offset_millis(now, self.end)?,
        )
    }

    /// Epoch milliseconds a stream's last event must reach to be discovered.
    pub fn discovery_threshold(&self, now: DateTime<Utc>) -> Result<i64, ExportError> {
        offset_millis(now, self.discovery_start.unwrap_or(self.start))
    }

    #[must_use]
    pub fn exporter_options(&self) -> ExporterOptions {
        ExporterOptions {
            compression: self.compression,
            inject_fields: self.inject_fields.clone(),
            page_limit: self.page_limit,
        }
    }
}
