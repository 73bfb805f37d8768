//! STALK ORACLE: turnip price pattern prediction
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod rates;
pub mod engine;
pub mod sim;
pub mod storage;
