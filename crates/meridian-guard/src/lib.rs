//! Admission control for inbound events: persistent event dedup, per-chat
//! response throttling, and sliding-window rate limits.
//!
//! Dedup is checked before any side-effectful action; marking an event
//! processed is what makes user-visible effects at-most-once under webhook
//! retries.

pub mod dedupe;
pub mod ratelimit;

pub use dedupe::DedupeManager;
pub use ratelimit::{LimitKind, RateLimitManager};
