// tests/integration/mod.rs

//! Integration tests for the datasource
//!
//! These tests run the RESP client and the supervisor end-to-end against an
//! in-process RESP server.

pub mod test_helpers;
