//! Platform connectors: wire payload → `NormalizedEvent` (inbound) and
//! `OutboundMessage` → platform send API (outbound).
//!
//! Normalization is deterministic and total: anything that is not a
//! processable user text message yields `None` (or an empty list for
//! multi-message payloads). Send failures are logged and counted, never
//! raised — one bad message must not block the rest of the fan-out.

pub mod dispatch;
pub mod slack;
pub mod telegram;
pub mod whatsapp;

pub use dispatch::OutboundDispatcher;
