use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use meridian_classify::TimeClassifier;
use meridian_core::config::TimeParsingConfidenceConfig;
use meridian_core::types::{DetectedTrigger, NormalizedEvent, TriggerKind};
use meridian_geo::geocode_city;
use meridian_llm::LlmClient;
use meridian_parse::parse_times;

use crate::traits::TriggerDetector;

/// "по <city>" — Russian "by <city>'s time" references, e.g. "в 15 по Москве".
static PO_CITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)по\s+([а-яёА-ЯЁ][а-яёА-ЯЁ\-]+)").unwrap());

/// Detects time references.
///
/// Classifier gate → regex parse → LLM extraction only when the classifier
/// said "time present" but the regex layer produced nothing. Source timezone
/// per time: explicit hint from the parser, else a "по <city>" geocode (no
/// LLM on this hot path), else left for the pipeline to fill from the user's
/// identity.
pub struct TimeDetector {
    classifier: TimeClassifier,
    confidences: TimeParsingConfidenceConfig,
    llm: Arc<LlmClient>,
}

impl TimeDetector {
    pub fn new(
        classifier: TimeClassifier,
        confidences: TimeParsingConfidenceConfig,
        llm: Arc<LlmClient>,
    ) -> Self {
        Self {
            classifier,
            confidences,
            llm,
        }
    }

    fn geocode_po_city(&self, text: &str) -> Option<String> {
        let caps = PO_CITY.captures(text)?;
        let city = caps.get(1)?.as_str();
        if city.chars().count() < 3 {
            return None;
        }
        let (name, tz) = geocode_city(city)?;
        debug!(city, resolved = %name, tz = %tz, "geocoded source tz from text");
        Some(tz)
    }
}

#[async_trait]
impl TriggerDetector for TimeDetector {
    fn name(&self) -> &'static str {
        "time"
    }

    async fn detect(&self, event: &NormalizedEvent) -> Result<Vec<DetectedTrigger>, String> {
        if !self.classifier.contains_time(&event.text) {
            return Ok(Vec::new());
        }

        let mut parsed = parse_times(&event.text, &self.confidences);
        if parsed.is_empty() {
            // Classifier positive, regex empty: bounded LLM extraction.
            parsed = self.llm.extract_times(&event.text, None).await;
        }
        if parsed.is_empty() {
            return Ok(Vec::new());
        }

        let po_city_tz = self.geocode_po_city(&event.text);

        let triggers = parsed
            .into_iter()
            .map(|pt| {
                let source_tz = pt
                    .timezone_hint
                    .clone()
                    .or_else(|| po_city_tz.clone());
                let is_explicit = source_tz.is_some();
                DetectedTrigger {
                    kind: TriggerKind::Time,
                    confidence: pt.confidence,
                    original_text: pt.original_text.clone(),
                    data: json!({
                        "hour": pt.hour,
                        "minute": pt.minute,
                        "timezone_hint": pt.timezone_hint,
                        "source_tz": source_tz,
                        "is_explicit_tz": is_explicit,
                        "is_tomorrow": pt.is_tomorrow,
                    }),
                }
            })
            .collect();

        Ok(triggers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meridian_core::config::ClassifierConfig;
    use meridian_core::types::Platform;

    fn detector() -> TimeDetector {
        TimeDetector::new(
            TimeClassifier::new(ClassifierConfig::default()),
            TimeParsingConfidenceConfig::default(),
            Arc::new(LlmClient::new(Default::default(), String::new())),
        )
    }

    fn event(text: &str) -> NormalizedEvent {
        NormalizedEvent {
            platform: Platform::Telegram,
            event_id: "e1".to_string(),
            message_id: Some("1".to_string()),
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
    async fn explicit_hint_becomes_source_tz() {
        let d = detector();
        let triggers = d.detect(&event("call at 10am PST")).await.unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::Time);
        assert_eq!(triggers[0].data["source_tz"], "America/Los_Angeles");
        assert_eq!(triggers[0].data["is_explicit_tz"], true);
        assert_eq!(triggers[0].data["hour"], 10);
    }

    #[tokio::test]
    async fn po_city_pattern_geocodes_source() {
        let d = detector();
        let triggers = d.detect(&event("созвон в 15:00 по Москве")).await.unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].data["source_tz"], "Europe/Moscow");
        assert_eq!(triggers[0].data["is_explicit_tz"], true);
    }

    #[tokio::test]
    async fn no_hint_leaves_source_to_pipeline() {
        let d = detector();
        let triggers = d.detect(&event("meet at 3pm")).await.unwrap();
        assert_eq!(triggers.len(), 1);
        assert!(triggers[0].data["source_tz"].is_null());
        assert_eq!(triggers[0].data["is_explicit_tz"], false);
    }

    #[tokio::test]
    async fn non_time_text_detects_nothing() {
        let d = detector();
        assert!(d.detect(&event("hello there")).await.unwrap().is_empty());
        assert!(d
            .detect(&event("released version 3.0.1"))
            .await
            .unwrap()
            .is_empty());
    }
}
