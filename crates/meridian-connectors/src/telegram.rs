use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use meridian_core::types::{NormalizedEvent, OutboundMessage, ParseMode, Platform};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org/bot";

/// Normalize a Telegram update to a `NormalizedEvent`.
///
/// Only plain `message` updates with text from a human sender qualify.
/// Event id convention for dedup: `{chat_id}_{message_id}`.
pub fn normalize_telegram_update(update: &Value) -> Option<NormalizedEvent> {
    let message = update.get("message")?;

    let text = message.get("text")?.as_str()?;
    if text.is_empty() {
        return None;
    }

    let from = message.get("from")?;
    if from.get("is_bot").and_then(|v| v.as_bool()).unwrap_or(false) {
        debug!("ignoring bot-authored telegram message");
        return None;
    }

    let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();
    let user_id = from.get("id")?.as_i64()?.to_string();
    let username = from
        .get("username")
        .and_then(|v| v.as_str())
        .map(String::from);
    let display_name = build_display_name(from);

    let message_id = message.get("message_id")?.as_i64()?.to_string();
    let event_id = format!("{}_{}", chat_id, message_id);

    let timestamp = message
        .get("date")
        .and_then(|v| v.as_i64())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);

    let reply_to_message_id = message
        .get("reply_to_message")
        .and_then(|r| r.get("message_id"))
        .and_then(|v| v.as_i64())
        .map(|id| id.to_string());

    Some(NormalizedEvent {
        platform: Platform::Telegram,
        event_id,
        message_id: Some(message_id),
        chat_id,
        user_id,
        username,
        display_name,
        text: text.to_string(),
        timestamp,
        reply_to_message_id,
        raw_payload: Some(update.clone()),
    })
}

fn build_display_name(from: &Value) -> Option<String> {
    let first = from.get("first_name").and_then(|v| v.as_str()).unwrap_or("");
    let last = from.get("last_name").and_then(|v| v.as_str()).unwrap_or("");
    match (first.is_empty(), last.is_empty()) {
        (false, false) => Some(format!("{} {}", first, last)),
        (false, true) => Some(first.to_string()),
        (true, false) => Some(last.to_string()),
        (true, true) => from
            .get("username")
            .and_then(|v| v.as_str())
            .map(String::from),
    }
}

/// Sends messages through the Telegram Bot API.
pub struct TelegramSender {
    http: reqwest::Client,
    bot_token: String,
    timeout: Duration,
}

impl TelegramSender {
    pub fn new(bot_token: String, timeout_seconds: f64) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
            timeout: Duration::from_secs_f64(timeout_seconds),
        }
    }

    /// Send one message. Returns false on failure (already logged).
    pub async fn send(&self, message: &OutboundMessage) -> bool {
        if message.platform != Platform::Telegram {
            error!(platform = %message.platform, "TelegramSender received foreign message");
            return false;
        }

        let mut payload = json!({
            "chat_id": message.chat_id,
            "text": message.text,
        });
        match message.parse_mode {
            ParseMode::Markdown => payload["parse_mode"] = json!("MarkdownV2"),
            ParseMode::Html => payload["parse_mode"] = json!("HTML"),
            ParseMode::Plain => {}
        }
        if let Some(reply_to) = &message.reply_to_message_id {
            payload["reply_to_message_id"] = json!(reply_to);
        }

        let url = format!("{}{}/sendMessage", TELEGRAM_API_BASE, self.bot_token);
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                let body: Value = resp.json().await.unwrap_or(Value::Null);
                let ok = status.is_success() && body["ok"].as_bool().unwrap_or(false);
                if !ok {
                    let description = body["description"].as_str().unwrap_or("unknown error");
                    error!(
                        %status,
                        description,
                        chat_id = %message.chat_id,
                        "telegram send failed"
                    );
                }
                ok
            }
            Err(e) => {
                warn!(error = %e, chat_id = %message.chat_id, "telegram send error");
                false
            }
        }
    }
}
