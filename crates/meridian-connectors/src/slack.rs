use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use meridian_core::types::{NormalizedEvent, OutboundMessage, ParseMode, Platform};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Normalize a Slack Events API callback to a `NormalizedEvent`.
///
/// `url_verification` payloads and any subtyped message (bot_message,
/// message_changed, …) yield `None`. Event id: `{channel}_{ts}`.
pub fn normalize_slack_event(payload: &Value) -> Option<NormalizedEvent> {
    if payload.get("type").and_then(|v| v.as_str()) != Some("event_callback") {
        debug!("ignoring non-event_callback slack payload");
        return None;
    }

    let event = payload.get("event")?;
    if event.get("type").and_then(|v| v.as_str()) != Some("message") {
        return None;
    }
    if event.get("subtype").is_some() {
        debug!("ignoring subtyped slack message");
        return None;
    }

    let text = event.get("text")?.as_str()?;
    if text.is_empty() {
        return None;
    }
    let channel_id = event.get("channel")?.as_str()?;
    let user_id = event.get("user")?.as_str()?;
    let ts = event.get("ts")?.as_str()?;

    let timestamp = ts
        .split('.')
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);

    // thread_ts equal to ts means "root of its own thread", not a reply.
    let reply_to_message_id = event
        .get("thread_ts")
        .and_then(|v| v.as_str())
        .filter(|thread_ts| *thread_ts != ts)
        .map(String::from);

    Some(NormalizedEvent {
        platform: Platform::Slack,
        event_id: format!("{}_{}", channel_id, ts),
        message_id: Some(ts.to_string()),
        chat_id: channel_id.to_string(),
        user_id: user_id.to_string(),
        username: None,
        display_name: None,
        text: text.to_string(),
        timestamp,
        reply_to_message_id,
        raw_payload: Some(payload.clone()),
    })
}

/// The `url_verification` challenge Slack sends during endpoint setup.
pub fn url_verification_challenge(payload: &Value) -> Option<String> {
    if payload.get("type").and_then(|v| v.as_str()) == Some("url_verification") {
        return payload
            .get("challenge")
            .and_then(|v| v.as_str())
            .map(String::from);
    }
    None
}

/// Sends messages through the Slack Web API (chat.postMessage).
pub struct SlackSender {
    http: reqwest::Client,
    bot_token: String,
    timeout: Duration,
}

impl SlackSender {
    pub fn new(bot_token: String, timeout_seconds: f64) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
            timeout: Duration::from_secs_f64(timeout_seconds),
        }
    }

    pub async fn send(&self, message: &OutboundMessage) -> bool {
        if message.platform != Platform::Slack {
            error!(platform = %message.platform, "SlackSender received foreign message");
            return false;
        }

        let mut payload = json!({
            "channel": message.chat_id,
            "text": message.text,
        });
        // Slack has no HTML mode; mrkdwn covers both rich flavors.
        if message.parse_mode != ParseMode::Plain {
            payload["mrkdwn"] = json!(true);
        }
        if let Some(thread_ts) = &message.reply_to_message_id {
            payload["thread_ts"] = json!(thread_ts);
        }

        let url = format!("{}/chat.postMessage", SLACK_API_BASE);
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .bearer_auth(&self.bot_token)
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                let body: Value = resp.json().await.unwrap_or(Value::Null);
                let ok = status.is_success() && body["ok"].as_bool().unwrap_or(false);
                if !ok {
                    error!(
                        %status,
                        error = body["error"].as_str().unwrap_or("unknown_error"),
                        channel = %message.chat_id,
                        "slack send failed"
                    );
                }
                ok
            }
            Err(e) => {
                warn!(error = %e, channel = %message.chat_id, "slack send error");
                false
            }
        }
    }
}
