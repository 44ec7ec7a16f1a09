// src/core/datasource/report.rs

//! Status reports published by the datasource after every open, tick and
//! manual control operation.

use crate::config::REPORT_TIME_FORMAT;
use crate::core::DatasourceError;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// The outcome category carried by a [`StatusReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// The connection answered its probe.
    Connected,
    /// The probe failed, and a fresh connection was installed.
    Reconnected,
    /// The datasource is disabled by configuration.
    ServiceDisabled,
    /// No connection could be created.
    ConnectionUnavailable,
    /// The store stopped answering and the first reconnect failed.
    Unreachable,
    /// The store is still unreachable on a later tick.
    ReconnectFailed,
    /// The datasource was closed by its owner.
    Closed,
}

impl StatusKind {
    pub fn is_success(self) -> bool {
        matches!(self, StatusKind::Connected | StatusKind::Reconnected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Connected => "connected",
            StatusKind::Reconnected => "reconnected",
            StatusKind::ServiceDisabled => "service_disabled",
            StatusKind::ConnectionUnavailable => "connection_unavailable",
            StatusKind::Unreachable => "unreachable",
            StatusKind::ReconnectFailed => "reconnect_failed",
            StatusKind::Closed => "closed",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable snapshot describing the most recent connection outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    success: bool,
    kind: StatusKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    attempt: u32,
    tick: u64,
    started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    elapsed: Duration,
    debug: IndexMap<String, String>,
}

impl StatusReport {
    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The rendered error that caused a failed outcome.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Consecutive failed reconnects at the time of this report. Zero after any success.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The publication sequence number. The report produced by `open` is 0 and
    /// every later report is exactly one greater than its predecessor.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Ordered diagnostic key/value pairs (probe and reconnect errors, pool stats).
    pub fn debug(&self) -> &IndexMap<String, String> {
        &self.debug
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }

    pub(crate) fn with_tick(mut self, tick: u64) -> Self {
        self.tick = tick;
        self
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} (attempt {}, tick {}, {:?})",
            self.started_at.format(REPORT_TIME_FORMAT),
            self.kind,
            self.message,
            self.attempt,
            self.tick,
            self.elapsed
        )?;
        if let Some(err) = &self.error {
            write!(f, ": {err}")?;
        }
        Ok(())
    }
}

/// Accumulates timing and debug pairs while an operation runs.
pub(crate) struct ReportBuilder {
    started_at: DateTime<Utc>,
    clock: Instant,
    attempt: u32,
    debug: IndexMap<String, String>,
}

impl ReportBuilder {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            clock: Instant::now(),
            attempt: 0,
            debug: IndexMap::new(),
        }
    }

    pub(crate) fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub(crate) fn debug(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.debug.insert(key.into(), value.into());
    }

    pub(crate) fn succeed(self, kind: StatusKind, message: impl Into<String>) -> StatusReport {
        self.finish(kind, message.into(), None)
    }

    pub(crate) fn fail(
        self,
        kind: StatusKind,
        message: impl Into<String>,
        error: &DatasourceError,
    ) -> StatusReport {
        self.finish(kind, message.into(), Some(error.to_string()))
    }

    fn finish(self, kind: StatusKind, message: String, error: Option<String>) -> StatusReport {
        StatusReport {
            success: kind.is_success(),
            kind,
            message,
            error,
            attempt: self.attempt,
            tick: 0,
            started_at: self.started_at,
            elapsed: self.clock.elapsed(),
            debug: self.debug,
        }
    }
}
