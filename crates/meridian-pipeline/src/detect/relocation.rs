use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use meridian_core::types::{DetectedTrigger, NormalizedEvent, TriggerKind};
use meridian_geo::clean_city;

use crate::traits::TriggerDetector;

/// Relocation phrases, English and Russian, past and future tense. Each
/// pattern captures the city phrase; the capture is greedy up to two words
/// and cleaned of known trailing non-city words afterwards.
static RELOCATION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // English — past tense
        (
            Regex::new(r"(?i)(?:i\s+)?(?:just\s+)?moved?\s+to\s+(\w+(?:\s+\w+)?)").unwrap(),
            "moved_to",
        ),
        (
            Regex::new(r"(?i)(?:i(?:'ve)?\s+)?relocated?\s+to\s+(\w+(?:\s+\w+)?)").unwrap(),
            "relocated_to",
        ),
        (
            Regex::new(r"(?i)(?:i(?:'m)?\s+)?now\s+(?:in|living\s+in)\s+(\w+(?:\s+\w+)?)").unwrap(),
            "now_in",
        ),
        // English — future tense
        (
            Regex::new(r"(?i)(?:i(?:'m)?\s+)?moving\s+to\s+(\w+(?:\s+\w+)?)").unwrap(),
            "moving_to",
        ),
        // Russian — past tense
        (
            Regex::new(r"(?i)переехал[аи]?\s+(?:в\s+)?(\w+(?:\s+\w+)?)").unwrap(),
            "relocated_ru",
        ),
        (
            Regex::new(r"(?i)перебрал(?:ся|ась)\s+в\s+(\w+(?:\s+\w+)?)").unwrap(),
            "relocated_ru_2",
        ),
        (
            Regex::new(r"(?i)теперь\s+(?:в|живу\s+в)\s+(\w+(?:\s+\w+)?)").unwrap(),
            "now_in_ru",
        ),
        (
            Regex::new(r"(?i)приехал[а]?\s+в\s+(\w+(?:\s+\w+)?)").unwrap(),
            "arrived_ru",
        ),
        // Russian — future tense
        (
            Regex::new(r"(?i)перееду\s+(?:в\s+)?(\w+(?:\s+\w+)?)").unwrap(),
            "moving_ru",
        ),
        (
            Regex::new(r"(?i)переезжаю\s+(?:в\s+)?(\w+(?:\s+\w+)?)").unwrap(),
            "moving_ru_2",
        ),
    ]
});

/// Detects "I moved to X" style statements. The captured city is only a
/// string here; geocoding happens post-detection in the relocation flow.
pub struct RelocationDetector {
    confidence: f64,
}

impl RelocationDetector {
    pub fn new(confidence: f64) -> Self {
        Self { confidence }
    }
}

#[async_trait]
impl TriggerDetector for RelocationDetector {
    fn name(&self) -> &'static str {
        "relocation"
    }

    async fn detect(&self, event: &NormalizedEvent) -> Result<Vec<DetectedTrigger>, String> {
        for (pattern, pattern_name) in RELOCATION_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(&event.text) {
                let city = clean_city(caps.get(1).map(|m| m.as_str()).unwrap_or("").trim());
                return Ok(vec![DetectedTrigger {
                    kind: TriggerKind::Relocation,
                    confidence: self.confidence,
                    original_text: caps.get(0).unwrap().as_str().to_string(),
                    data: json!({
                        "city": city,
                        "pattern": pattern_name,
                    }),
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

    fn detector() -> RelocationDetector {
        RelocationDetector::new(0.9)
    }

    fn event(text: &str) -> NormalizedEvent {
        NormalizedEvent {
            platform: Platform::Slack,
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
    async fn english_moved_to() {
        let triggers = detector().detect(&event("I moved to London")).await.unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::Relocation);
        assert_eq!(triggers[0].data["city"], "London");
        assert_eq!(triggers[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn trailing_words_stripped_from_capture() {
        let triggers = detector()
            .detect(&event("moved to London last week"))
            .await
            .unwrap();
        assert_eq!(triggers[0].data["city"], "London");
    }

    #[tokio::test]
    async fn two_word_city_captured() {
        let triggers = detector()
            .detect(&event("just moved to New York"))
            .await
            .unwrap();
        assert_eq!(triggers[0].data["city"], "New York");
    }

    #[tokio::test]
    async fn russian_past_tense() {
        let triggers = detector()
            .detect(&event("переехал в Москву"))
            .await
            .unwrap();
        assert_eq!(triggers[0].data["city"], "Москву");
        assert_eq!(triggers[0].data["pattern"], "relocated_ru");
    }

    #[tokio::test]
    async fn russian_now_in() {
        let triggers = detector()
            .detect(&event("теперь в Берлине"))
            .await
            .unwrap();
        assert_eq!(triggers[0].data["city"], "Берлине");
    }

    #[tokio::test]
    async fn future_tense_moving() {
        let triggers = detector()
            .detect(&event("I'm moving to Tokyo soon"))
            .await
            .unwrap();
        assert_eq!(triggers[0].data["city"], "Tokyo");
    }

    #[tokio::test]
    async fn no_relocation_phrase() {
        assert!(detector()
            .detect(&event("the London office is nice"))
            .await
            .unwrap()
            .is_empty());
    }
}
