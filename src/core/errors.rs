// src/core/errors.rs

//! Defines the primary error type for the datasource and its RESP client.

use crate::core::datasource::report::StatusKind;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, covering supervisor outcomes and client transport failures.
#[derive(Error, Debug)]
pub enum DatasourceError {
    /// The datasource was opened with `enabled = false`. Not a failure, a deliberate no-op.
    #[error("Datasource service is disabled")]
    ServiceDisabled,

    /// No connection handle is installed.
    #[error("No connection is available")]
    ConnectionUnavailable,

    /// A health probe failed against an installed handle.
    #[error("Data store is unreachable: {0}")]
    Unreachable(String),

    /// A replacement handle could not be established or verified.
    #[error("Reconnect failed: {0}")]
    ReconnectFailed(String),

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An error reply sent by the server (e.g. `-WRONGPASS ...`).
    #[error("{0}")]
    Server(String),

    #[error("Timed out while {0}")]
    Timeout(&'static str),

    #[error("Timed out waiting for a pooled connection")]
    PoolTimeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for DatasourceError {
    fn clone(&self) -> Self {
        match self {
            DatasourceError::ServiceDisabled => DatasourceError::ServiceDisabled,
            DatasourceError::ConnectionUnavailable => DatasourceError::ConnectionUnavailable,
            DatasourceError::Unreachable(s) => DatasourceError::Unreachable(s.clone()),
            DatasourceError::ReconnectFailed(s) => DatasourceError::ReconnectFailed(s.clone()),
            DatasourceError::Io(e) => DatasourceError::Io(Arc::clone(e)),
            DatasourceError::IncompleteData => DatasourceError::IncompleteData,
            DatasourceError::Protocol(s) => DatasourceError::Protocol(s.clone()),
            DatasourceError::Server(s) => DatasourceError::Server(s.clone()),
            DatasourceError::Timeout(op) => DatasourceError::Timeout(op),
            DatasourceError::PoolTimeout => DatasourceError::PoolTimeout,
            DatasourceError::ConnectionClosed => DatasourceError::ConnectionClosed,
            DatasourceError::InvalidConfig(s) => DatasourceError::InvalidConfig(s.clone()),
        }
    }
}

impl PartialEq for DatasourceError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DatasourceError::Io(e1), DatasourceError::Io(e2)) => e1.to_string() == e2.to_string(),
            (DatasourceError::Unreachable(s1), DatasourceError::Unreachable(s2)) => s1 == s2,
            (DatasourceError::ReconnectFailed(s1), DatasourceError::ReconnectFailed(s2)) => {
                s1 == s2
            }
            (DatasourceError::Protocol(s1), DatasourceError::Protocol(s2)) => s1 == s2,
            (DatasourceError::Server(s1), DatasourceError::Server(s2)) => s1 == s2,
            (DatasourceError::Timeout(o1), DatasourceError::Timeout(o2)) => o1 == o2,
            (DatasourceError::InvalidConfig(s1), DatasourceError::InvalidConfig(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl DatasourceError {
    /// Returns true for transport failures that a fresh attempt may overcome.
    /// Server replies and configuration problems are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DatasourceError::Io(_)
                | DatasourceError::Timeout(_)
                | DatasourceError::ConnectionClosed
                | DatasourceError::IncompleteData
        )
    }

    /// The status kind a report should carry when this error ends an operation.
    pub fn status_kind(&self) -> StatusKind {
        match self {
            DatasourceError::ServiceDisabled => StatusKind::ServiceDisabled,
            DatasourceError::ConnectionUnavailable | DatasourceError::InvalidConfig(_) => {
                StatusKind::ConnectionUnavailable
            }
            DatasourceError::ReconnectFailed(_) => StatusKind::ReconnectFailed,
            _ => StatusKind::Unreachable,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for DatasourceError {
    fn from(e: std::io::Error) -> Self {
        DatasourceError::Io(Arc::new(e))
    }
}

impl From<std::str::Utf8Error> for DatasourceError {
    fn from(e: std::str::Utf8Error) -> Self {
        DatasourceError::Protocol(format!("invalid UTF-8 in reply: {e}"))
    }
}

impl From<std::num::ParseIntError> for DatasourceError {
    fn from(e: std::num::ParseIntError) -> Self {
        DatasourceError::Protocol(format!("invalid integer in reply: {e}"))
    }
}
