//! gifmix Common Utilities
//!
//! Shared infrastructure for all gifmix crates:
//! - Error types and result aliases
//! - Job clock used to time exports
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
