//! SENTINEL — Continuous Market Anomaly Monitoring Core
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod session;
pub mod scoring;
pub mod screener;
pub mod pool;
pub mod providers;
pub mod engine;
pub mod export;
pub mod display;
pub mod dashboard;
