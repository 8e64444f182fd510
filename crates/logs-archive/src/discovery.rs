// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Finds the streams of a group that had activity inside the export window.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::DiscoveryError;
use crate::source::{DescribeStreamsRequest, LogSource, LogStream};

/// How discovery decides it has seen every recent stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryStrategy {
    /// Stop at the first stream older than the window start.
    ///
    /// Assumes the listing is sorted by last event time, descending, so nothing
    /// after that stream can qualify. Fetches the fewest pages.
    #[default]
    EarlyExit,
    /// Keep scanning until a whole page yields no qualifying stream.
    ///
    /// Tolerates a listing that is only roughly sorted, at the cost of extra pages.
    FilterAllPages,
}

impl fmt::Display for DiscoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryStrategy::EarlyExit => f.write_str("early_exit"),
            DiscoveryStrategy::FilterAllPages => f.write_str("filter_all_pages"),
        }
    }
}

impl FromStr for DiscoveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "early_exit" => Ok(DiscoveryStrategy::EarlyExit),
            "filter_all_pages" => Ok(DiscoveryStrategy::FilterAllPages),
            other => Err(format!(
                "unknown discovery strategy '{other}', expected early_exit or filter_all_pages"
            )),
        }
    }
}

fn is_active_since(stream: &LogStream, window_start: i64) -> bool {
    stream
        .last_event_time
        .is_some_and(|last_event_time| last_event_time >= window_start)
}

#[derive(Debug, Clone)]
pub struct StreamDiscovery<S> {
    source: S,
    strategy: DiscoveryStrategy,
}

impl<S: LogSource> StreamDiscovery<S> {
    pub fn new(source: S, strategy: DiscoveryStrategy) -> Self {
        Self { source, strategy }
    }

    /// Returns the group's streams whose last event is at or after `window_start`
    /// (epoch milliseconds), most recent first.
    pub async fn discover(
        &self,
        group: &str,
        window_start: i64,
    ) -> Result<Vec<LogStream>, DiscoveryError> {
        if group.is_empty() {
            return Err(DiscoveryError::EmptyGroup);
        }

        let mut request = DescribeStreamsRequest {
            group: group.to_string(),
            next_token: None,
        };
        let mut streams = Vec::new();
        let mut pages = 0usize;

        loop {
            let page = self
                .source
                .describe_streams(&request)
                .await
                .map_err(|source| DiscoveryError::Source {
                    group: group.to_string(),
                    source,
                })?;
            pages += 1;

            let exhausted = match self.strategy {
                DiscoveryStrategy::EarlyExit => {
                    let mut below_window = false;
                    for stream in page.streams {
                        if !is_active_since(&stream, window_start) {
                            below_window = true;
                            break;
                        }
                        streams.push(stream);
                    }
                    below_window
                }
                DiscoveryStrategy::FilterAllPages => {
                    let before = streams.len();
                    streams.extend(
                        page.streams
                            .into_iter()
                            .filter(|stream| is_active_since(stream, window_start)),
                    );
                    streams.len() == before
                }
            };

            match page.next_token {
                Some(token) if !exhausted => request.next_token = Some(token),
                _ => break,
            }
        }

        debug!(
            group,
            window_start,
            pages,
            streams = streams.len(),
            strategy = %self.strategy,
            "discovered log streams"
        );
        Ok(streams)
    }
}
