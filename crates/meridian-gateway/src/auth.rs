//! Webhook signature verification.
//!
//! All comparisons are constant-time, and an empty configured secret means
//! "verification disabled" for bootstrap compatibility.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Slack rejects requests whose timestamp is further than this from now.
const SLACK_MAX_SKEW_SECS: i64 = 300;

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn hmac_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Telegram: `X-Telegram-Bot-Api-Secret-Token` must equal the configured
/// secret verbatim.
pub fn verify_telegram_signature(header_value: &str, configured_secret: &str) -> bool {
    if configured_secret.is_empty() {
        return true;
    }
    if header_value.is_empty() {
        return false;
    }
    constant_time_eq(header_value.as_bytes(), configured_secret.as_bytes())
}

/// Slack: `X-Slack-Signature` = `v0=` + hex HMAC-SHA256 of
/// `v0:<timestamp>:<raw body>`, and the timestamp must be within ±300 s.
pub fn verify_slack_signature(
    body: &[u8],
    timestamp: &str,
    signature: &str,
    signing_secret: &str,
) -> bool {
    if signing_secret.is_empty() {
        return true;
    }
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if (Utc::now().timestamp() - ts).abs() > SLACK_MAX_SKEW_SECS {
        return false;
    }

    let mut base = format!("v0:{}:", timestamp).into_bytes();
    base.extend_from_slice(body);
    let expected = format!("v0={}", hmac_hex(signing_secret, &base));
    constant_time_eq(signature.as_bytes(), expected.as_bytes())
}

/// WhatsApp: `X-Hub-Signature-256` = `sha256=` + hex HMAC-SHA256 of the raw
/// body with the app secret.
pub fn verify_whatsapp_signature(body: &[u8], signature: &str, app_secret: &str) -> bool {
    if app_secret.is_empty() {
        return true;
    }
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let expected = hmac_hex(app_secret, body);
    constant_time_eq(sig_hex.as_bytes(), expected.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_exact_match() {
        assert!(verify_telegram_signature("my-secret", "my-secret"));
        assert!(!verify_telegram_signature("wrong", "my-secret"));
        assert!(!verify_telegram_signature("", "my-secret"));
    }

    #[test]
    fn telegram_empty_secret_disables_check() {
        assert!(verify_telegram_signature("anything", ""));
        assert!(verify_telegram_signature("", ""));
    }

    fn slack_sign(body: &[u8], ts: &str, secret: &str) -> String {
        let mut base = format!("v0:{}:", ts).into_bytes();
        base.extend_from_slice(body);
        format!("v0={}", hmac_hex(secret, &base))
    }

    #[test]
    fn slack_valid_signature() {
        let body = b"{\"type\":\"event_callback\"}";
        let ts = Utc::now().timestamp().to_string();
        let sig = slack_sign(body, &ts, "secret");
        assert!(verify_slack_signature(body, &ts, &sig, "secret"));
    }

    #[test]
    fn slack_invalid_signature() {
        let body = b"body";
        let ts = Utc::now().timestamp().to_string();
        assert!(!verify_slack_signature(body, &ts, "v0=invalid", "secret"));
    }

    #[test]
    fn slack_stale_timestamp_rejected() {
        let body = b"body";
        let old_ts = (Utc::now().timestamp() - 301).to_string();
        let sig = slack_sign(body, &old_ts, "secret");
        assert!(!verify_slack_signature(body, &old_ts, &sig, "secret"));
    }

    #[test]
    fn slack_future_timestamp_rejected() {
        let body = b"body";
        let future_ts = (Utc::now().timestamp() + 301).to_string();
        let sig = slack_sign(body, &future_ts, "secret");
        assert!(!verify_slack_signature(body, &future_ts, &sig, "secret"));
    }

    #[test]
    fn slack_non_numeric_timestamp_rejected() {
        assert!(!verify_slack_signature(b"body", "not-a-number", "v0=sig", "secret"));
    }

    #[test]
    fn slack_tampered_body_rejected() {
        let ts = Utc::now().timestamp().to_string();
        let sig = slack_sign(b"original", &ts, "secret");
        assert!(!verify_slack_signature(b"tampered", &ts, &sig, "secret"));
    }

    #[test]
    fn slack_empty_secret_disables_check() {
        assert!(verify_slack_signature(b"any", "123", "v0=any", ""));
    }

    #[test]
    fn whatsapp_valid_signature() {
        let body = b"{\"object\":\"whatsapp_business_account\"}";
        let sig = format!("sha256={}", hmac_hex("app-secret", body));
        assert!(verify_whatsapp_signature(body, &sig, "app-secret"));
    }

    #[test]
    fn whatsapp_invalid_or_malformed_rejected() {
        assert!(!verify_whatsapp_signature(b"body", "sha256=deadbeef", "secret"));
        assert!(!verify_whatsapp_signature(b"body", "no-prefix", "secret"));
    }

    #[test]
    fn whatsapp_empty_secret_disables_check() {
        assert!(verify_whatsapp_signature(b"any", "sha256=whatever", ""));
    }
}
