use std::collections::HashMap;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use meridian_core::types::{NormalizedEvent, OutboundMessage, Platform};

const WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// Normalize a WhatsApp Cloud API webhook payload.
///
/// One webhook delivery can carry several messages; non-text messages are
/// skipped. Event id is the raw `wamid.*`, which is already globally unique.
pub fn normalize_whatsapp_payload(payload: &Value) -> Vec<NormalizedEvent> {
    let mut events = Vec::new();

    if payload.get("object").and_then(|v| v.as_str()) != Some("whatsapp_business_account") {
        debug!("ignoring non-whatsapp webhook payload");
        return events;
    }

    let entries = payload.get("entry").and_then(|v| v.as_array());
    for entry in entries.into_iter().flatten() {
        let changes = entry.get("changes").and_then(|v| v.as_array());
        for change in changes.into_iter().flatten() {
            if change.get("field").and_then(|v| v.as_str()) != Some("messages") {
                continue;
            }
            let value = change.get("value").cloned().unwrap_or(Value::Null);

            // wa_id → profile name, for display names.
            let mut contact_names: HashMap<String, String> = HashMap::new();
            for contact in value
                .get("contacts")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
            {
                if let (Some(wa_id), Some(name)) = (
                    contact.get("wa_id").and_then(|v| v.as_str()),
                    contact
                        .get("profile")
                        .and_then(|p| p.get("name"))
                        .and_then(|v| v.as_str()),
                ) {
                    contact_names.insert(wa_id.to_string(), name.to_string());
                }
            }

            for msg in value
                .get("messages")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
            {
                if let Some(event) = normalize_single_message(msg, &contact_names, payload) {
                    events.push(event);
                }
            }
        }
    }

    events
}

fn normalize_single_message(
    msg: &Value,
    contact_names: &HashMap<String, String>,
    raw_payload: &Value,
) -> Option<NormalizedEvent> {
    if msg.get("type").and_then(|v| v.as_str()) != Some("text") {
        debug!(
            message_type = msg.get("type").and_then(|v| v.as_str()).unwrap_or(""),
            "ignoring non-text whatsapp message"
        );
        return None;
    }

    let message_id = msg.get("id")?.as_str()?;
    let from_id = msg.get("from")?.as_str()?;
    let body = msg.get("text")?.get("body")?.as_str()?;
    if message_id.is_empty() || from_id.is_empty() || body.is_empty() {
        return None;
    }

    let timestamp = msg
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);

    let reply_to_message_id = msg
        .get("context")
        .and_then(|c| c.get("id"))
        .and_then(|v| v.as_str())
        .map(String::from);

    Some(NormalizedEvent {
        platform: Platform::Whatsapp,
        event_id: message_id.to_string(),
        message_id: Some(message_id.to_string()),
        // 1:1 chats only: the sender's phone number doubles as the chat id.
        chat_id: from_id.to_string(),
        user_id: from_id.to_string(),
        username: None,
        display_name: contact_names.get(from_id).cloned(),
        text: body.to_string(),
        timestamp,
        reply_to_message_id,
        raw_payload: Some(raw_payload.clone()),
    })
}

/// Sends messages through the WhatsApp Cloud API.
pub struct WhatsAppSender {
    http: reqwest::Client,
    access_token: String,
    phone_number_id: String,
    timeout: Duration,
}

impl WhatsAppSender {
    pub fn new(access_token: String, phone_number_id: String, timeout_seconds: f64) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token,
            phone_number_id,
            timeout: Duration::from_secs_f64(timeout_seconds),
        }
    }

    pub async fn send(&self, message: &OutboundMessage) -> bool {
        if message.platform != Platform::Whatsapp {
            error!(platform = %message.platform, "WhatsAppSender received foreign message");
            return false;
        }

        let mut payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": message.chat_id,
            "type": "text",
            "text": { "body": message.text },
        });
        if let Some(reply_to) = &message.reply_to_message_id {
            payload["context"] = json!({ "message_id": reply_to });
        }

        let url = format!(
            "{}/{}/messages",
            WHATSAPP_API_BASE, self.phone_number_id
        );
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                if !status.is_success() {
                    let body: Value = resp.json().await.unwrap_or(Value::Null);
                    error!(
                        %status,
                        error = body["error"]["message"].as_str().unwrap_or("unknown"),
                        to = %message.chat_id,
                        "whatsapp send failed"
                    );
                    return false;
                }
                true
            }
            Err(e) => {
                warn!(error = %e, to = %message.chat_id, "whatsapp send error");
                false
            }
        }
    }
}
