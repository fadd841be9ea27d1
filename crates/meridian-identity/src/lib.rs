//! Per-user timezone identity: sourced confidence that decays over time,
//! a disambiguation policy for "which timezone applies to this message",
//! and the signed web-verification token flow.

pub mod identity;
pub mod token;

pub use identity::{effective_confidence, EffectiveTz, TimezoneIdentity};
pub use token::{generate_verify_token, parse_verify_token, verify_url, VerifyTokenData};
