// src/core/mod.rs

//! The central module containing the datasource, its RESP client and the shared error type.

pub mod client;
pub mod datasource;
pub mod errors;
pub mod protocol;

pub use datasource::Datasource;
pub use errors::DatasourceError;
pub use protocol::RespFrame;
