// src/lib.rs

pub mod config;
pub mod core;

// Re-export
pub use crate::config::Settings;
pub use crate::core::client::{Connection, Connector, Handle};
pub use crate::core::datasource::report::{StatusKind, StatusReport};
pub use crate::core::datasource::{Datasource, KeyEntry};
pub use crate::core::errors::DatasourceError;
