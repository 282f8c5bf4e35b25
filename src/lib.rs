//! SHARPLINE: sportsbook odds aggregation and pricing analytics.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod dashboard;
pub mod data;
pub mod engine;
pub mod pricing;
pub mod storage;
pub mod types;
