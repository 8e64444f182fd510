// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use crate::exporter::PackageResult;
use crate::source::SourceError;

/// Errors that abort discovery for a whole group.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("log group name cannot be empty")]
    EmptyGroup,

    #[error("failed to describe log streams for group {group}: {source}")]
    Source {
        group: String,
        #[source]
        source: SourceError,
    },
}

/// Errors that abort one stream's export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid export request: {0}")]
    InvalidRequest(String),

    #[error("failed to create archive {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to get log events: {0}")]
    Fetch(#[source] SourceError),

    #[error("event timestamp {0} cannot be represented as a UTC date")]
    InvalidTimestamp(i64),

    #[error("failed to write log event to archive: {0}")]
    Encode(#[source] csv::Error),

    #[error("failed to flush archive: {0}")]
    Flush(#[source] std::io::Error),

    #[error("failed to close archive: {0}")]
    Close(#[source] std::io::Error),
}

/// A failed export together with what had been written before it failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to package stream after {} events: {source}", .partial.event_count)]
pub struct PackageError {
    pub partial: PackageResult,
    #[source]
    pub source: ExportError,
}

impl PackageError {
    pub(crate) fn new(partial: PackageResult, source: ExportError) -> Self {
        Self { partial, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DiscoveryError::Source {
            group: "/app/web".to_string(),
            source: SourceError::Service {
                status: 400,
                code: "ThrottlingException".to_string(),
                message: "Rate exceeded".to_string(),
            },
        };
        assert_eq!(
            error.to_string(),
            "failed to describe log streams for group /app/web: log service returned 400 ThrottlingException: Rate exceeded"
        );
    }

    #[test]
    fn test_package_error_keeps_partial_count() {
        let mut partial = PackageResult::new(PathBuf::from("/tmp/web.gz"));
        partial.record(7);
        let error = PackageError::new(
            partial,
            ExportError::Flush(std::io::Error::new(std::io::ErrorKind::Other, "disk full")),
        );
        assert_eq!(error.partial.event_count, 7);
        assert!(error.partial.has_events);
        assert_eq!(
            error.to_string(),
            "failed to package stream after 7 events: failed to flush archive: disk full"
        );
    }
}
