// tests/property/mod.rs

//! Property-based tests for the datasource
//!
//! These tests use property-based testing to verify invariants that should
//! always hold, regardless of input values.

pub mod codec_test;
pub mod redaction_test;
