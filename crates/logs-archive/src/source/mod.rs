// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log service seam.
//!
//! Discovery and export only talk to the service through [`LogSource`], which
//! exposes the two paginated listings they need. [`cloudwatch::CloudWatchLogsClient`]
//! implements it over HTTP; tests implement it with scripted pages.

pub mod cloudwatch;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Opaque continuation token for a paginated listing.
///
/// Cursors are only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Cursor(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One ordered sequence of events within a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStream {
    pub name: String,
    /// Epoch milliseconds of the most recent event, absent for streams that never
    /// received one.
    pub last_event_time: Option<i64>,
}

/// One log record as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub message: String,
}

/// Stream listing request, always sorted by last event time, most recent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeStreamsRequest {
    pub group: String,
    pub next_token: Option<Cursor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamPage {
    pub streams: Vec<LogStream>,
    /// Absent once the listing has no more pages.
    pub next_token: Option<Cursor>,
}

/// Event listing request, read forward from the oldest event in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetEventsRequest {
    pub group: String,
    pub stream: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub limit: Option<u32>,
    pub next_token: Option<Cursor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPage {
    pub events: Vec<LogEvent>,
    /// The service echoes the request's token here once the end of the stream
    /// has been reached.
    pub next_forward_token: Option<Cursor>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// The service answered with an error payload.
    #[error("log service returned {status} {code}: {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },
    /// Transport-level issue (DNS, TLS, socket, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Response payload could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid source endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Read-only access to a log service's stream and event listings.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetches one page of the group's streams, sorted by last event time, descending.
    async fn describe_streams(
        &self,
        request: &DescribeStreamsRequest,
    ) -> Result<StreamPage, SourceError>;

    /// Fetches one page of a stream's events, oldest first, inside the request window.
    async fn get_events(&self, request: &GetEventsRequest) -> Result<EventPage, SourceError>;
}

#[async_trait]
impl<T: LogSource + ?Sized> LogSource for std::sync::Arc<T> {
    async fn describe_streams(
        &self,
        request: &DescribeStreamsRequest,
    ) -> Result<StreamPage, SourceError> {
        (**self).describe_streams(request).await
    }

    async fn get_events(&self, request: &GetEventsRequest) -> Result<EventPage, SourceError> {
        (**self).get_events(request).await
    }
}
