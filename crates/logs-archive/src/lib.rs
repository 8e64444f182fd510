// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Logs Archive
//!
//! Exports the events a log group accumulated inside a time window into one
//! compressed, space-delimited text archive per stream, ready for durable storage.
//!
//! ## Pipeline
//!
//! ```text
//!   ┌──────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//!   │ StreamDiscovery  │ ──> │  EventExporter   │ ──> │     Uploader     │
//!   │ (recent streams) │     │ (cursor walk +   │     │ (object storage) │
//!   └──────────────────┘     │  encode/compress)│     └──────────────────┘
//!                            └──────────────────┘
//! ```
//!
//! - [`discovery`]: lists streams with activity at or after the window start
//! - [`exporter`]: walks one stream's events with the forward cursor protocol
//! - [`archive`]: record encoder and compressing file sink
//! - [`source`]: the log service seam and its CloudWatch Logs client
//! - [`uploader`]: hands finished archives to blob storage
//! - [`archiver`]: one run end to end, driven by [`config::ArchiveConfig`]

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod archive;
pub mod archiver;
pub mod config;
pub mod discovery;
pub mod error;
pub mod exporter;
pub mod logger;
pub mod source;
pub mod uploader;
