use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use meridian_core::config::LlmConfig;
use meridian_core::types::ParsedTime;

use crate::breaker::CircuitBreaker;
use crate::error::{LlmError, Result};

/// Intent classification for ambiguous geo mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoIntent {
    /// User is asking about time/scheduling in that city.
    TimeQuery,
    /// User moved to, is in, or is traveling to that city.
    Relocation,
    /// City mentioned but not about time or location.
    FalsePositive,
    /// Cannot determine; caller should ask the user.
    Uncertain,
}

impl GeoIntent {
    fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "time_query" => GeoIntent::TimeQuery,
            "relocation" => GeoIntent::Relocation,
            "false_positive" => GeoIntent::FalsePositive,
            _ => GeoIntent::Uncertain,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Time record shape of the strict-JSON extraction contract.
#[derive(Deserialize)]
struct ExtractedTime {
    hour: u8,
    #[serde(default)]
    minute: u8,
    #[serde(default)]
    timezone_hint: Option<String>,
    #[serde(default)]
    is_tomorrow: bool,
}

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// One breaker per logical operation so a failing extraction path does not
/// take down intent classification.
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
    api_key: String,
    extraction_breaker: CircuitBreaker,
    intent_breaker: CircuitBreaker,
    normalization_breaker: CircuitBreaker,
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: String) -> Self {
        let breaker_cfg = config.circuit_breaker.clone();
        Self {
            http: reqwest::Client::new(),
            config,
            api_key,
            extraction_breaker: CircuitBreaker::new("extraction", &breaker_cfg),
            intent_breaker: CircuitBreaker::new("geo_intent", &breaker_cfg),
            normalization_breaker: CircuitBreaker::new("city_normalize", &breaker_cfg),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Extract time references when the regex layer found nothing.
    ///
    /// Strict JSON contract: the model must return a list of
    /// `{hour, minute, timezone_hint|null, is_tomorrow}` records. Anything
    /// else (including breaker-open and timeout) reduces to an empty list.
    pub async fn extract_times(&self, text: &str, tz_hint: Option<&str>) -> Vec<ParsedTime> {
        let op = &self.config.extraction;
        let hint_line = tz_hint
            .map(|h| format!("A timezone hint for the message: {}.", h))
            .unwrap_or_default();
        let system = format!(
            "Extract clock-time references from the user's message. {hint}\n\
             Respond with ONLY a JSON array, no prose. Each element:\n\
             {{\"hour\": 0-23, \"minute\": 0-59, \"timezone_hint\": \
             \"IANA timezone or null\", \"is_tomorrow\": true/false}}\n\
             Respond with [] if there are no time references.",
            hint = hint_line
        );

        let raw = match self
            .guarded_chat(
                &self.extraction_breaker,
                &system,
                text,
                op.max_tokens,
                op.temperature,
                op.timeout_seconds,
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "LLM time extraction failed");
                return Vec::new();
            }
        };

        let parsed: Vec<ExtractedTime> = match serde_json::from_str(strip_fences(&raw)) {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, raw = %raw, "LLM extraction returned non-conforming JSON");
                return Vec::new();
            }
        };

        parsed
            .into_iter()
            .filter(|t| t.hour <= 23 && t.minute <= 59)
            .map(|t| ParsedTime {
                original_text: text.to_string(),
                hour: t.hour,
                minute: t.minute,
                timezone_hint: t.timezone_hint.filter(|s| !s.is_empty()),
                is_tomorrow: t.is_tomorrow,
                confidence: op.default_confidence,
            })
            .collect()
    }

    /// Classify intent when a city was detected but no explicit pattern matched.
    pub async fn classify_geo_intent(&self, text: &str, city: &str) -> GeoIntent {
        let op = &self.config.intent;
        let system = format!(
            "The user's message mentions the city \"{city}\". Classify the intent.\n\
             Respond with exactly one word:\n\
             time_query - asking about time or scheduling in that city\n\
             relocation - the user moved to, is in, or is traveling to that city\n\
             false_positive - the city is mentioned but not about time or location\n\
             uncertain - cannot determine"
        );

        match self
            .guarded_chat(
                &self.intent_breaker,
                &system,
                text,
                op.max_tokens,
                op.temperature,
                op.timeout_seconds,
            )
            .await
        {
            Ok(answer) => {
                let intent = GeoIntent::parse(&answer);
                debug!(text, city, ?intent, "geo intent classified");
                intent
            }
            Err(e) => {
                warn!(error = %e, "geo intent classification failed");
                GeoIntent::Uncertain
            }
        }
    }

    /// Normalize a location string to one canonical English city name.
    ///
    /// Returns `None` on failure or when the model answers `UNKNOWN`.
    pub async fn normalize_city(&self, location: &str) -> Option<String> {
        let op = &self.config.normalization;
        let system = "Normalize the given location to the name of one city, in English.\n\
             Non-Latin scripts become their English city name. Islands become their \
             capital; states or regions become their largest city.\n\
             Respond with only the city name, or UNKNOWN if it is not a location.";

        match self
            .guarded_chat(
                &self.normalization_breaker,
                system,
                location,
                op.max_tokens,
                op.temperature,
                op.timeout_seconds,
            )
            .await
        {
            Ok(answer) => {
                let name = answer.trim().to_string();
                if name.is_empty() || name.eq_ignore_ascii_case("unknown") {
                    None
                } else {
                    debug!(location, normalized = %name, "city normalized");
                    Some(name)
                }
            }
            Err(e) => {
                warn!(error = %e, location, "city normalization failed");
                None
            }
        }
    }

    /// One chat completion call gated by a breaker and an outer timeout.
    async fn guarded_chat(
        &self,
        breaker: &CircuitBreaker,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f64,
        timeout_seconds: f64,
    ) -> Result<String> {
        if !self.is_configured() {
            return Err(LlmError::NotConfigured);
        }
        breaker.check()?;

        let result = tokio::time::timeout(
            Duration::from_secs_f64(timeout_seconds),
            self.chat_completion(system, user, max_tokens, temperature, timeout_seconds),
        )
        .await
        .map_err(|_| LlmError::Timeout {
            seconds: timeout_seconds,
        })
        .and_then(|r| r);

        match &result {
            Ok(_) => breaker.record_success(),
            // A fast-fail on an already-open breaker must not double-count.
            Err(LlmError::CircuitOpen { .. }) => {}
            Err(_) => breaker.record_failure(),
        }
        result
    }

    async fn chat_completion(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f64,
        timeout_seconds: f64,
    ) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs_f64(timeout_seconds))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LlmError::BadResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices".to_string()))
    }
}

/// Models often wrap JSON in markdown fences despite instructions.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_intent_parses_known_words() {
        assert_eq!(GeoIntent::parse("time_query"), GeoIntent::TimeQuery);
        assert_eq!(GeoIntent::parse(" Relocation \n"), GeoIntent::Relocation);
        assert_eq!(GeoIntent::parse("false_positive"), GeoIntent::FalsePositive);
        assert_eq!(GeoIntent::parse("banana"), GeoIntent::Uncertain);
    }

    #[test]
    fn strip_fences_handles_plain_and_fenced() {
        assert_eq!(strip_fences("[1]"), "[1]");
        assert_eq!(strip_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_fences("```\n[1]\n```"), "[1]");
    }

    #[test]
    fn extraction_records_validate_ranges() {
        let raw = r#"[{"hour": 25, "minute": 0}, {"hour": 9, "minute": 30}]"#;
        let parsed: Vec<ExtractedTime> = serde_json::from_str(raw).unwrap();
        let valid: Vec<_> = parsed
            .into_iter()
            .filter(|t| t.hour <= 23 && t.minute <= 59)
            .collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].hour, 9);
    }

    #[tokio::test]
    async fn unconfigured_client_returns_empty_results() {
        let client = LlmClient::new(LlmConfig::default(), String::new());
        assert!(!client.is_configured());
        assert!(client.extract_times("at 5", None).await.is_empty());
        assert_eq!(
            client.classify_geo_intent("hello", "Moscow").await,
            GeoIntent::Uncertain
        );
        assert!(client.normalize_city("Москва").await.is_none());
    }
}
