use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;

use meridian_core::types::Platform;

type HmacSha256 = Hmac<Sha256>;

/// Hex characters of the HMAC kept in the token.
const SIGNATURE_LEN: usize = 16;

/// Parsed, validated verification token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyTokenData {
    pub platform: Platform,
    pub user_id: String,
    pub chat_id: String,
    pub expires_at: DateTime<Utc>,
}

fn sign(secret: &str, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())[..SIGNATURE_LEN].to_string()
}

/// Byte-for-byte comparison that does not short-circuit.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Build a signed verification token:
/// `platform|user_id|chat_id|expires_unix|nonce|hmac16`.
pub fn generate_verify_token(
    secret: &str,
    platform: Platform,
    user_id: &str,
    chat_id: &str,
    expires_hours: i64,
) -> String {
    let expires_at = Utc::now() + Duration::hours(expires_hours);
    let nonce: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(11)
        .map(char::from)
        .collect();

    let payload = format!(
        "{}|{}|{}|{}|{}",
        platform,
        user_id,
        chat_id,
        expires_at.timestamp(),
        nonce
    );
    let signature = sign(secret, &payload);
    format!("{}|{}", payload, signature)
}

/// Parse and validate a token. `None` on any signature mismatch, malformed
/// payload, or expiry — a single flipped character invalidates the token.
pub fn parse_verify_token(secret: &str, token: &str) -> Option<VerifyTokenData> {
    let parts: Vec<&str> = token.split('|').collect();
    if parts.len() != 6 {
        return None;
    }
    let [platform_str, user_id, chat_id, expires_str, nonce, signature] =
        [parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]];

    let payload = format!(
        "{}|{}|{}|{}|{}",
        platform_str, user_id, chat_id, expires_str, nonce
    );
    let expected = sign(secret, &payload);
    if !constant_time_eq(signature, &expected) {
        return None;
    }

    let expires_unix: i64 = expires_str.parse().ok()?;
    let expires_at = Utc.timestamp_opt(expires_unix, 0).single()?;
    if Utc::now() > expires_at {
        return None;
    }

    Some(VerifyTokenData {
        platform: Platform::from_str(platform_str).ok()?,
        user_id: user_id.to_string(),
        chat_id: chat_id.to_string(),
        expires_at,
    })
}

/// The full verification URL for a token.
pub fn verify_url(base_url: &str, token: &str) -> String {
    format!("{}/verify?token={}", base_url.trim_end_matches('/'), token)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn roundtrip_before_expiry() {
        let token = generate_verify_token(SECRET, Platform::Telegram, "u42", "c7", 24);
        let parsed = parse_verify_token(SECRET, &token).unwrap();
        assert_eq!(parsed.platform, Platform::Telegram);
        assert_eq!(parsed.user_id, "u42");
        assert_eq!(parsed.chat_id, "c7");
        assert!(parsed.expires_at > Utc::now());
    }

    #[test]
    fn every_single_character_mutation_is_rejected() {
        let token = generate_verify_token(SECRET, Platform::Slack, "u1", "c1", 24);
        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'x' { b'y' } else { b'x' };
            if let Ok(mutated) = String::from_utf8(bytes) {
                if mutated == token {
                    continue;
                }
                assert!(
                    parse_verify_token(SECRET, &mutated).is_none(),
                    "mutation at index {} was accepted",
                    i
                );
            }
        }
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_verify_token(SECRET, Platform::Telegram, "u1", "c1", 24);
        assert!(parse_verify_token("other-secret", &token).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = generate_verify_token(SECRET, Platform::Telegram, "u1", "c1", -1);
        assert!(parse_verify_token(SECRET, &token).is_none());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(parse_verify_token(SECRET, "").is_none());
        assert!(parse_verify_token(SECRET, "a|b|c").is_none());
        assert!(parse_verify_token(SECRET, "a|b|c|d|e|f|g").is_none());
    }

    #[test]
    fn verify_url_shape() {
        assert_eq!(
            verify_url("https://bot.example.com/", "tok"),
            "https://bot.example.com/verify?token=tok"
        );
    }
}
