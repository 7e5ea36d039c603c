//! Market integrity engine.
//!
//! Detects manipulation signals in prediction markets: volume anomalies,
//! wash trading, trader concentration and price moves unexplained by news.
//! Library crate exposing all modules for use by integration tests and
//! the binary entry point.

pub mod config;
pub mod detectors;
pub mod engine;
pub mod providers;
pub mod scoring;
pub mod storage;
pub mod types;
