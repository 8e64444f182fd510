// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line format for archive runs.
//!
//! ```text
//! LOGS_ARCHIVE | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! The prefix keeps the archiver's own output apart from the log data it handles
//! when both end up in the same place.

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_PREFIX: &str = "LOGS_ARCHIVE";

/// Event formatter that prefixes every line with [`LOG_PREFIX`] and the level.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "{LOG_PREFIX} | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                // Fields are stored by the fmt layer when the span is created.
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter directive for `level`, with the HTTP stack's chatter silenced.
#[must_use]
pub fn env_filter_directive(level: &str) -> String {
    format!("h2=off,hyper=off,reqwest=off,rustls=off,{level}")
}
