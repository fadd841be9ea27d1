//! Core domain models, configuration, and error taxonomy for Meridian.
//!
//! Platform-agnostic types used across all crates. Nothing in here performs
//! I/O; connectors, storage, and the gateway depend on this crate, never the
//! other way around.

pub mod config;
pub mod error;
pub mod types;

pub use error::{MeridianError, Result};
