//! Shared domain types for the birdcmd agent: the configuration value the
//! session core consumes, and the error type used across crates.

pub mod config;
pub mod error;

pub use error::{Error, Result};
