use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use meridian_classify::{LocationClassifier, TzContextClassifier};
use meridian_core::types::{
    DetectedTrigger, NormalizedEvent, PipelineResult, ResolvedContext, TriggerKind,
};
use meridian_geo::find_cities_in_text;
use meridian_identity::TimezoneIdentity;
use meridian_llm::{GeoIntent, LlmClient};
use meridian_storage::Storage;

use crate::traits::{ActionHandler, TriggerDetector};

/// Config team timezones first, then chat-detected ones, no duplicates.
pub fn merge_timezones(config_tzs: &[String], chat_tzs: &[String]) -> Vec<String> {
    let mut result: Vec<String> = config_tzs.to_vec();
    for tz in chat_tzs {
        if !result.contains(tz) {
            result.push(tz.clone());
        }
    }
    result
}

/// The single-event processing pipeline: detect → resolve → dispatch.
///
/// Detectors and the handler map are fixed at construction and never mutated
/// during processing. No error crosses the pipeline boundary; failing
/// components are skipped and reported on the result.
pub struct Pipeline {
    detectors: Vec<Box<dyn TriggerDetector>>,
    handlers: HashMap<TriggerKind, Box<dyn ActionHandler>>,
    identity: Arc<TimezoneIdentity>,
    storage: Arc<Storage>,
    llm: Arc<LlmClient>,
    location_classifier: LocationClassifier,
    tz_context: TzContextClassifier,
    team_timezones: Vec<String>,
    geo_intent_enabled: bool,
    geo_intent_confidence: f64,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        detectors: Vec<Box<dyn TriggerDetector>>,
        handlers: HashMap<TriggerKind, Box<dyn ActionHandler>>,
        identity: Arc<TimezoneIdentity>,
        storage: Arc<Storage>,
        llm: Arc<LlmClient>,
        location_classifier: LocationClassifier,
        tz_context: TzContextClassifier,
        team_timezones: Vec<String>,
        geo_intent_enabled: bool,
        geo_intent_confidence: f64,
    ) -> Self {
        Self {
            detectors,
            handlers,
            identity,
            storage,
            llm,
            location_classifier,
            tz_context,
            team_timezones,
            geo_intent_enabled,
            geo_intent_confidence,
        }
    }

    pub async fn process(&self, event: &NormalizedEvent) -> PipelineResult {
        let mut result = PipelineResult::default();

        // Step 1: run every detector; a failing detector is skipped.
        let mut triggers: Vec<DetectedTrigger> = Vec::new();
        for detector in &self.detectors {
            match detector.detect(event).await {
                Ok(found) => triggers.extend(found),
                Err(e) => {
                    error!(detector = detector.name(), error = %e, "detector failed");
                    result.errors.push(format!("{}: {}", detector.name(), e));
                }
            }
        }

        // Extension point: a city mention with no matching pattern may still
        // be a relocation. Classifiers first; the LLM only for what they
        // could not decide.
        if triggers.is_empty() {
            if let Some(trigger) = self.classify_ambiguous_city(event).await {
                triggers.push(trigger);
            }
        }

        result.triggers_detected = triggers.len();
        if triggers.is_empty() {
            return result;
        }

        let context = self.resolve_context(event, &triggers);

        // A relocation preempts everything else this turn: reset confidence
        // and hand control to the orchestrator for the confirm/re-verify
        // session.
        if let Some(relocation) = triggers
            .iter()
            .find(|t| t.kind == TriggerKind::Relocation)
            .cloned()
        {
            if let Some(handler) = self.handlers.get(&TriggerKind::Relocation) {
                match handler.handle(&relocation, &context).await {
                    Ok(messages) => {
                        result.messages.extend(messages);
                        result.triggers_handled += 1;
                    }
                    Err(e) => {
                        error!(error = %e, "relocation handler failed");
                        result.errors.push(format!("relocation: {}", e));
                    }
                }
            }
            result.needs_state_collection = true;
            result.state_collection_trigger = Some(relocation);
            return result;
        }

        // Step 3: dispatch the remaining triggers.
        for trigger in &triggers {
            let Some(handler) = self.handlers.get(&trigger.kind) else {
                debug!(kind = %trigger.kind, "no handler registered");
                continue;
            };
            match handler.handle(trigger, &context).await {
                Ok(messages) => {
                    result.messages.extend(messages);
                    result.triggers_handled += 1;
                }
                Err(e) => {
                    error!(kind = %trigger.kind, error = %e, "handler failed");
                    result.errors.push(format!("{}: {}", trigger.kind, e));
                }
            }
        }

        // A time reference we could not anchor to any timezone means the
        // user's identity is missing: collect it.
        if context.source_timezone.is_none() {
            if let Some(time_trigger) = triggers
                .iter()
                .find(|t| t.kind == TriggerKind::Time && t.data["source_tz"].is_null())
            {
                result.needs_state_collection = true;
                result.state_collection_trigger = Some(time_trigger.clone());
            }
        }

        result
    }

    fn resolve_context(
        &self,
        event: &NormalizedEvent,
        triggers: &[DetectedTrigger],
    ) -> ResolvedContext {
        let hint = triggers
            .iter()
            .find_map(|t| t.data.get("timezone_hint").and_then(|v| v.as_str()));

        let effective =
            self.identity
                .get_effective_timezone(event.platform, &event.user_id, &event.chat_id, hint);

        let chat_tzs = match self.storage.get_chat_state(event.platform, &event.chat_id) {
            Ok(Some(chat)) => chat.active_timezones,
            _ => Vec::new(),
        };

        ResolvedContext {
            platform: event.platform,
            chat_id: event.chat_id.clone(),
            user_id: event.user_id.clone(),
            source_timezone: effective.tz,
            target_timezones: merge_timezones(&self.team_timezones, &chat_tzs),
            team_timezones: self.team_timezones.clone(),
            reply_to_message_id: event.message_id.clone(),
        }
    }

    /// City detected in text, no explicit pattern matched.
    ///
    /// The location classifier catches phrasings the relocation regexes miss
    /// ("я в берлине"); the tz-context classifier rules out city mentions
    /// that are about someone else's clock, not the speaker's location. What
    /// remains goes to the LLM when that path is enabled.
    async fn classify_ambiguous_city(&self, event: &NormalizedEvent) -> Option<DetectedTrigger> {
        let cities = find_cities_in_text(&event.text);
        let city = cities.first()?;

        let relocation_trigger = |pattern: &str| DetectedTrigger {
            kind: TriggerKind::Relocation,
            confidence: self.geo_intent_confidence,
            original_text: city.original.clone(),
            data: serde_json::json!({
                "city": city.normalized,
                "pattern": pattern,
            }),
        };

        let location = self.location_classifier.predict(&event.text);
        if location.triggered && location.trigger_type != "question" {
            debug!(
                city = %city.normalized,
                trigger_type = %location.trigger_type,
                "location classifier resolved ambiguous city"
            );
            return Some(relocation_trigger("location_classifier"));
        }

        if self.tz_context.predict(&event.text).triggered {
            debug!(city = %city.normalized, "city mention is timezone context, not relocation");
            return None;
        }

        if !self.geo_intent_enabled {
            return None;
        }
        match self.llm.classify_geo_intent(&event.text, &city.normalized).await {
            GeoIntent::Relocation => Some(relocation_trigger("geo_intent")),
            intent => {
                debug!(?intent, city = %city.normalized, "ambiguous city mention not actionable");
                None
            }
        }
    }
}
