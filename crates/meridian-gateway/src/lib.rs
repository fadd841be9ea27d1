//! HTTP gateway: webhook ingress per platform, the timezone verification
//! page, and health probes. The binary in `main.rs` wires config, storage,
//! and the background cleaner around this library.

pub mod app;
pub mod auth;
pub mod cleaner;
pub mod http;
