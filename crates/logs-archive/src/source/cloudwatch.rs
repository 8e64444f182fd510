// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CloudWatch Logs client speaking the service's JSON 1.1 protocol.
//!
//! Every operation is a `POST /` whose target is selected by the `X-Amz-Target`
//! header. Requests are sent unsigned: point the endpoint at an emulator or at a
//! signing proxy when talking to AWS.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{
    Cursor, DescribeStreamsRequest, EventPage, GetEventsRequest, LogEvent, LogSource, LogStream,
    SourceError, StreamPage,
};

const TARGET_HEADER: &str = "X-Amz-Target";
const DESCRIBE_LOG_STREAMS: &str = "Logs_20140328.DescribeLogStreams";
const GET_LOG_EVENTS: &str = "Logs_20140328.GetLogEvents";
const CONTENT_TYPE_JSON_1_1: &str = "application/x-amz-json-1.1";
const ORDER_BY_LAST_EVENT_TIME: &str = "LastEventTime";

/// Default regional endpoint for the given region.
#[must_use]
pub fn regional_endpoint(region: &str) -> String {
    format!("https://logs.{region}.amazonaws.com")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsInput<'a> {
    log_group_name: &'a str,
    order_by: &'static str,
    descending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsOutput {
    #[serde(default)]
    log_streams: Vec<LogStreamOutput>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogStreamOutput {
    log_stream_name: String,
    last_event_timestamp: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetLogEventsInput<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    start_time: i64,
    end_time: i64,
    start_from_head: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetLogEventsOutput {
    #[serde(default)]
    events: Vec<OutputLogEvent>,
    next_forward_token: Option<String>,
}

#[derive(Deserialize)]
struct OutputLogEvent {
    timestamp: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ServiceErrorBody {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// HTTP client for a CloudWatch Logs compatible endpoint.
#[derive(Debug, Clone)]
pub struct CloudWatchLogsClient {
    client: Client,
    endpoint: String,
}

impl CloudWatchLogsClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(SourceError::InvalidEndpoint(endpoint));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON_1_1));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, endpoint })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<I, O>(&self, target: &'static str, input: &I) -> Result<O, SourceError>
    where
        I: Serialize + ?Sized,
        O: for<'de> Deserialize<'de>,
    {
        let body = serde_json::to_vec(input)?;
        let resp = self
            .client
            .post(format!("{}/", self.endpoint))
            .header(TARGET_HEADER, target)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(service_error(status, &bytes));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn service_error(status: StatusCode, body: &[u8]) -> SourceError {
    let (code, message) = match serde_json::from_slice::<ServiceErrorBody>(body) {
        // Error types may be namespaced, e.g. "com.amazonaws.logs#ThrottlingException".
        Ok(err) => (
            err.error_type
                .rsplit('#')
                .next()
                .unwrap_or_default()
                .to_string(),
            err.message,
        ),
        Err(_) => (String::new(), String::from_utf8_lossy(body).into_owned()),
    };
    SourceError::Service {
        status: status.as_u16(),
        code,
        message,
    }
}

#[async_trait]
impl LogSource for CloudWatchLogsClient {
    async fn describe_streams(
        &self,
        request: &DescribeStreamsRequest,
    ) -> Result<StreamPage, SourceError> {
        let input = DescribeLogStreamsInput {
            log_group_name: &request.group,
            order_by: ORDER_BY_LAST_EVENT_TIME,
            descending: true,
            next_token: request.next_token.as_ref().map(Cursor::as_str),
        };
        let output: DescribeLogStreamsOutput = self.call(DESCRIBE_LOG_STREAMS, &input).await?;
        debug!(
            group = %request.group,
            streams = output.log_streams.len(),
            "described log streams"
        );

        Ok(StreamPage {
            streams: output
                .log_streams
                .into_iter()
                .map(|s| LogStream {
                    name: s.log_stream_name,
                    last_event_time: s.last_event_timestamp,
                })
                .collect(),
            next_token: output.next_token.map(Cursor::new),
        })
    }

    async fn get_events(&self, request: &GetEventsRequest) -> Result<EventPage, SourceError> {
        let input = GetLogEventsInput {
            log_group_name: &request.group,
            log_stream_name: &request.stream,
            start_time: request.start_ms,
            end_time: request.end_ms,
            start_from_head: true,
            limit: request.limit,
            next_token: request.next_token.as_ref().map(Cursor::as_str),
        };
        let output: GetLogEventsOutput = self.call(GET_LOG_EVENTS, &input).await?;

        Ok(EventPage {
            events: output
                .events
                .into_iter()
                .map(|e| LogEvent {
                    timestamp: e.timestamp,
                    message: e.message,
                })
                .collect(),
            next_forward_token: output.next_forward_token.map(Cursor::new),
        })
    }
}
