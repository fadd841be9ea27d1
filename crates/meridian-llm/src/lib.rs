//! Bounded, circuit-broken LLM fallback client.
//!
//! Three logical operations, each with its own timeout budget and breaker:
//! time extraction when the regex layer fails, geo-intent disambiguation for
//! ambiguous city mentions, and non-Latin city-name normalization. Every
//! failure reduces to "no result" at the caller; nothing here raises out of
//! the pipeline.

pub mod breaker;
pub mod client;
pub mod error;

pub use breaker::CircuitBreaker;
pub use client::{GeoIntent, LlmClient};
pub use error::{LlmError, Result};
