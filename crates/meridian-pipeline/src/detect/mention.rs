use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use meridian_core::types::{DetectedTrigger, NormalizedEvent, TriggerKind};

use crate::traits::TriggerDetector;

const MENTION_CONFIDENCE: f64 = 0.95;

static MENTION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)@\w*bot\b").unwrap(), "at_bot"),
        (Regex::new(r"(?i)\bбот\b").unwrap(), "bot_ru"),
        (Regex::new(r"(?i)\bbot\b").unwrap(), "bot_en"),
        (Regex::new(r"(?i)\bпомощь\b").unwrap(), "help_ru"),
        (Regex::new(r"(?i)\bhelp\b").unwrap(), "help_en"),
    ]
});

/// Detects bot mentions and help requests.
pub struct MentionDetector;

#[async_trait]
impl TriggerDetector for MentionDetector {
    fn name(&self) -> &'static str {
        "mention"
    }

    async fn detect(&self, event: &NormalizedEvent) -> Result<Vec<DetectedTrigger>, String> {
        for (pattern, pattern_name) in MENTION_PATTERNS.iter() {
            if let Some(m) = pattern.find(&event.text) {
                return Ok(vec![DetectedTrigger {
                    kind: TriggerKind::Mention,
                    confidence: MENTION_CONFIDENCE,
                    original_text: m.as_str().to_string(),
                    data: json!({ "pattern": pattern_name }),
                }]);
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meridian_core::types::Platform;

    fn event(text: &str) -> NormalizedEvent {
        NormalizedEvent {
            platform: Platform::Discord,
            event_id: "e1".to_string(),
            message_id: None,
            chat_id: "c1".to_string(),
            user_id: "u1".to_string(),
            username: None,
            display_name: None,
            text: text.to_string(),
            timestamp: Utc::now(),
            reply_to_message_id: None,
            raw_payload: None,
        }
    }

    #[tokio::test]
    async fn at_bot_mention() {
        let triggers = MentionDetector
            .detect(&event("@meridianbot help me"))
            .await
            .unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::Mention);
        assert_eq!(triggers[0].data["pattern"], "at_bot");
    }

    #[tokio::test]
    async fn bilingual_keywords() {
        for text in ["бот, привет", "hey bot", "помощь", "need help"] {
            let triggers = MentionDetector.detect(&event(text)).await.unwrap();
            assert_eq!(triggers.len(), 1, "text {:?}", text);
        }
    }

    #[tokio::test]
    async fn no_mention_in_plain_text() {
        assert!(MentionDetector
            .detect(&event("deploy finished"))
            .await
            .unwrap()
            .is_empty());
        // Substrings don't count: "robotics" is not "bot".
        assert!(MentionDetector
            .detect(&event("robotics class"))
            .await
            .unwrap()
            .is_empty());
    }
}
