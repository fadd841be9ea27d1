//! SQLite persistence for Meridian: users, chats, dedupe events, sessions.
//!
//! The document-store semantics of the system (upserts, unique dedup index,
//! TTL expiry, atomic chat projection) map onto SQLite as:
//!   - `INSERT .. ON CONFLICT DO UPDATE` upserts,
//!   - a UNIQUE constraint on (platform, event_id),
//!   - expiry predicates on read plus periodic `DELETE` sweeps,
//!   - a single transaction around the chat-projection recompute.

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, StorageError};
pub use store::Storage;
