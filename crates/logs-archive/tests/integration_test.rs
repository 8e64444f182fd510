// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use logs_archive::archive::Codec;
use logs_archive::archiver::Archiver;
use logs_archive::config::ArchiveConfig;
use logs_archive::discovery::{DiscoveryStrategy, StreamDiscovery};
use logs_archive::exporter::{EventExporter, ExportWindow, ExporterOptions};
use logs_archive::source::cloudwatch::CloudWatchLogsClient;
use logs_archive::uploader::{HttpUploader, LocalUploader};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};

const GROUP: &str = "/app/web";
const WINDOW_START: i64 = 1_714_557_600_000; // 2024-05-01T10:00:00Z
const WINDOW_END: i64 = WINDOW_START + 3_600_000;

fn client(server: &ServerGuard) -> CloudWatchLogsClient {
    CloudWatchLogsClient::new(server.url(), Duration::from_secs(5)).unwrap()
}

fn events_request(stream: &str, start: i64, end: i64, token: Option<&str>) -> Value {
    let mut body = json!({
        "logGroupName": GROUP,
        "logStreamName": stream,
        "startTime": start,
        "endTime": end,
        "startFromHead": true,
    });
    if let Some(token) = token {
        body["nextToken"] = json!(token);
    }
    body
}

async fn mock_events(
    server: &mut ServerGuard,
    request: Value,
    events: &[(i64, &str)],
    next_forward_token: &str,
) -> Mock {
    let events: Vec<Value> = events
        .iter()
        .map(|(timestamp, message)| json!({"timestamp": timestamp, "message": message}))
        .collect();
    server
        .mock("POST", "/")
        .match_header("X-Amz-Target", "Logs_20140328.GetLogEvents")
        .match_body(Matcher::Json(request))
        .with_status(200)
        .with_header("content-type", "application/x-amz-json-1.1")
        .with_body(
            json!({
                "events": events,
                "nextForwardToken": next_forward_token,
                "nextBackwardToken": "b/0",
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await
}

fn decompress(path: &Path, codec: Codec) -> String {
    let file = File::open(path).unwrap();
    let mut text = String::new();
    match codec {
        Codec::Gzip => {
            flate2::read::GzDecoder::new(file)
                .read_to_string(&mut text)
                .unwrap();
        }
        Codec::Zstd => {
            zstd::stream::read::Decoder::new(file)
                .unwrap()
                .read_to_string(&mut text)
                .unwrap();
        }
    }
    text
}

/// Parses archive records back into their fields.
fn parse_records(text: &str) -> Vec<Vec<String>> {
    csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
        .records()
        .map(|record| record.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn timestamp_ms(field: &str) -> i64 {
    DateTime::parse_from_rfc3339(field)
        .unwrap()
        .with_timezone(&Utc)
        .timestamp_millis()
}

#[tokio::test]
async fn test_export_three_events_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let first = mock_events(
        &mut server,
        events_request("web-1", WINDOW_START, WINDOW_END, None),
        &[
            (WINDOW_START + 1, "GET /health 200"),
            (WINDOW_START + 250, "worker started"),
        ],
        "f/1",
    )
    .await;
    let second = mock_events(
        &mut server,
        events_request("web-1", WINDOW_START, WINDOW_END, Some("f/1")),
        &[(WINDOW_START + 9_999, "line with \"quotes\"")],
        "f/1",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let exporter = EventExporter::new(client(&server), ExporterOptions::default());
    let window = ExportWindow::new(WINDOW_START, WINDOW_END).unwrap();
    let result = exporter
        .package(GROUP, "web-1", window, dir.path())
        .await
        .unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(result.event_count, 3);
    assert!(result.has_events);
    assert_eq!(result.archive_path, dir.path().join("web-1.gz"));

    let text = decompress(&result.archive_path, Codec::Gzip);
    assert_eq!(text.lines().count(), 3);
    let records = parse_records(&text);
    let timestamps: Vec<i64> = records.iter().map(|r| timestamp_ms(&r[0])).collect();
    assert_eq!(
        timestamps,
        vec![WINDOW_START + 1, WINDOW_START + 250, WINDOW_START + 9_999]
    );
    assert_eq!(records[0][0], "2024-05-01T10:00:00.001Z");
    assert_eq!(records[2][1], "line with \"quotes\"");
}

#[tokio::test]
async fn test_export_empty_stream_leaves_empty_archive() {
    let mut server = mockito::Server::new_async().await;
    let only = mock_events(
        &mut server,
        events_request("quiet", WINDOW_START, WINDOW_END, None),
        &[],
        "f/0",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let options = ExporterOptions {
        compression: logs_archive::archive::Compression {
            codec: Codec::Zstd,
            level: 3,
        },
        ..ExporterOptions::default()
    };
    let exporter = EventExporter::new(client(&server), options);
    let window = ExportWindow::new(WINDOW_START, WINDOW_END).unwrap();
    let result = exporter
        .package(GROUP, "quiet", window, dir.path())
        .await
        .unwrap();

    only.assert_async().await;
    assert_eq!(result.event_count, 0);
    assert!(!result.has_events);
    assert!(result.archive_path.exists());
    assert_eq!(decompress(&result.archive_path, Codec::Zstd), "");
}

#[tokio::test]
async fn test_export_with_injected_fields() {
    let mut server = mockito::Server::new_async().await;
    let _first = mock_events(
        &mut server,
        events_request("web-1", WINDOW_START, WINDOW_END, None),
        &[(WINDOW_START, "a"), (WINDOW_START + 1, "b c")],
        "f/1",
    )
    .await;
    let _second = mock_events(
        &mut server,
        events_request("web-1", WINDOW_START, WINDOW_END, Some("f/1")),
        &[],
        "f/1",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let options = ExporterOptions {
        inject_fields: vec!["env=prod".to_string(), "svc=web".to_string()],
        ..ExporterOptions::default()
    };
    let exporter = EventExporter::new(client(&server), options);
    let window = ExportWindow::new(WINDOW_START, WINDOW_END).unwrap();
    let result = exporter
        .package(GROUP, "web-1", window, dir.path())
        .await
        .unwrap();

    assert_eq!(result.event_count, 2);
    let text = decompress(&result.archive_path, Codec::Gzip);
    for line in text.lines() {
        assert!(line.ends_with(",env=prod,svc=web"), "{line}");
    }
    let records = parse_records(&text);
    assert_eq!(records[1][1], "b c");
    assert_eq!(records[1][2], ",env=prod,svc=web");
}

#[tokio::test]
async fn test_discover_two_of_three_streams() {
    let mut server = mockito::Server::new_async().await;
    let listing = server
        .mock("POST", "/")
        .match_header("X-Amz-Target", "Logs_20140328.DescribeLogStreams")
        .match_body(Matcher::Json(json!({
            "logGroupName": GROUP,
            "orderBy": "LastEventTime",
            "descending": true,
        })))
        .with_status(200)
        .with_body(
            json!({
                "logStreams": [
                    {"logStreamName": "web-2", "lastEventTimestamp": WINDOW_START + 60_000},
                    {"logStreamName": "web-1", "lastEventTimestamp": WINDOW_START},
                    {"logStreamName": "web-0", "lastEventTimestamp": WINDOW_START - 1},
                ],
                "nextToken": "page-2",
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let discovery = StreamDiscovery::new(client(&server), DiscoveryStrategy::EarlyExit);
    let streams = discovery.discover(GROUP, WINDOW_START).await.unwrap();

    listing.assert_async().await;
    let names: Vec<&str> = streams.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["web-2", "web-1"]);
}

#[tokio::test]
async fn test_archiver_run_uploads_over_http() {
    let now = DateTime::<Utc>::from_timestamp_millis(WINDOW_END).unwrap();

    let mut logs = mockito::Server::new_async().await;
    let _listing = logs
        .mock("POST", "/")
        .match_header("X-Amz-Target", "Logs_20140328.DescribeLogStreams")
        .with_status(200)
        .with_body(
            json!({
                "logStreams": [
                    {"logStreamName": "web-1", "lastEventTimestamp": WINDOW_END - 5},
                    {"logStreamName": "idle"},
                ],
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _first = mock_events(
        &mut logs,
        events_request("web-1", WINDOW_START, WINDOW_END, None),
        &[(WINDOW_START + 10, "hello")],
        "f/1",
    )
    .await;
    let _second = mock_events(
        &mut logs,
        events_request("web-1", WINDOW_START, WINDOW_END, Some("f/1")),
        &[],
        "f/1",
    )
    .await;

    let mut store = mockito::Server::new_async().await;
    let put = store
        .mock(
            "PUT",
            "/logs-bucket/archive/web-1/2024-05-01T11:00:00.000Z.gz",
        )
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ArchiveConfig {
        group_name: GROUP.to_string(),
        bucket_name: "logs-bucket".to_string(),
        bucket_prefix: "/archive/".to_string(),
        temporary_directory: dir.path().to_path_buf(),
        upload_endpoint: Some(store.url()),
        ..Default::default()
    };
    config.validate().unwrap();

    let uploader = HttpUploader::new(store.url(), "logs-bucket", Duration::from_secs(5)).unwrap();
    let archiver = Archiver::new(Arc::new(client(&logs)), Arc::new(uploader), config);
    let summary = archiver.run(now).await.unwrap();

    put.assert_async().await;
    assert_eq!(summary.streams, 1);
    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.events, 1);
}

#[tokio::test]
async fn test_archiver_run_copies_to_local_store() {
    let now = DateTime::<Utc>::from_timestamp_millis(WINDOW_END).unwrap();

    let mut logs = mockito::Server::new_async().await;
    let _fpm = mock_events(
        &mut logs,
        events_request("fpm", WINDOW_START, WINDOW_END, None),
        &[(WINDOW_START + 1, "php started"), (WINDOW_START + 2, "ready")],
        "f/1",
    )
    .await;
    let _fpm_end = mock_events(
        &mut logs,
        events_request("fpm", WINDOW_START, WINDOW_END, Some("f/1")),
        &[],
        "f/1",
    )
    .await;
    let _nginx = mock_events(
        &mut logs,
        events_request("nginx", WINDOW_START, WINDOW_END, None),
        &[],
        "f/0",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let store: PathBuf = dir.path().join("store");
    let config = ArchiveConfig {
        group_name: GROUP.to_string(),
        stream_names: vec!["fpm".to_string(), "nginx".to_string()],
        bucket_name: "logs-bucket".to_string(),
        bucket_prefix: "archive".to_string(),
        temporary_directory: dir.path().to_path_buf(),
        upload_directory: Some(store.clone()),
        concurrency: 2,
        ..Default::default()
    };

    let archiver = Archiver::new(
        Arc::new(client(&logs)),
        Arc::new(LocalUploader::new(&store, "logs-bucket")),
        config,
    );
    let summary = archiver.run(now).await.unwrap();

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.skipped_empty, 1);
    let uploaded = store.join("logs-bucket/archive/fpm/2024-05-01T11:00:00.000Z.gz");
    let records = parse_records(&decompress(&uploaded, Codec::Gzip));
    assert_eq!(records.len(), 2);
    assert_eq!(records[1][1], "ready");
    assert!(dir.path().join("nginx.gz").exists());
}
