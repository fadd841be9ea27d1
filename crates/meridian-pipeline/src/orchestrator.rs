use std::sync::Arc;

use tracing::{debug, error, info, warn};

use meridian_core::types::{
    DetectedTrigger, HandlerResult, NormalizedEvent, OutboundMessage, PipelineResult, TriggerKind,
};
use meridian_geo::geocode_city_with_llm;
use meridian_guard::{DedupeManager, LimitKind, RateLimitManager};
use meridian_identity::{generate_verify_token, verify_url};
use meridian_llm::LlmClient;
use meridian_sessions::{ui, SessionEngine, TTL_GEO_INTENT_MINUTES, TTL_TIMEZONE_MINUTES};
use meridian_storage::StorageError;

use crate::pipeline::Pipeline;

/// Top-level message router: session-first, then the gated pipeline.
///
/// Idempotency discipline: an event is marked processed exactly when a
/// user-visible action has been decided (a response or a new session), which
/// keeps effects at-most-once under at-least-once webhook delivery.
pub struct Orchestrator {
    pipeline: Pipeline,
    sessions: Arc<SessionEngine>,
    dedupe: DedupeManager,
    rate_limits: RateLimitManager,
    llm: Arc<LlmClient>,
    verify_secret: String,
    base_url: String,
    token_hours: i64,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: Pipeline,
        sessions: Arc<SessionEngine>,
        dedupe: DedupeManager,
        rate_limits: RateLimitManager,
        llm: Arc<LlmClient>,
        verify_secret: String,
        base_url: String,
        token_hours: i64,
    ) -> Self {
        Self {
            pipeline,
            sessions,
            dedupe,
            rate_limits,
            llm,
            verify_secret,
            base_url,
            token_hours,
        }
    }

    /// Route one inbound event.
    pub async fn route(&self, event: &NormalizedEvent) -> HandlerResult {
        // 1. An active session owns every message from this user in this chat.
        if let Some(session) =
            self.sessions
                .active_session(event.platform, &event.chat_id, &event.user_id)
        {
            debug!(
                session_id = %session.session_id,
                goal = session.goal.as_str(),
                "routing to session"
            );
            return self.sessions.handle(session, event).await;
        }

        // 2. Dedup — before any side-effectful action.
        if self.dedupe.is_duplicate(event.platform, &event.event_id) {
            debug!(event_id = %event.event_id, "duplicate event");
            return HandlerResult::silent();
        }

        // 3. Per-chat response throttle.
        if self.dedupe.is_throttled(event.platform, &event.chat_id) {
            debug!(chat_id = %event.chat_id, "throttled");
            return HandlerResult::silent();
        }

        // 4. Sliding-window rate limits, with a capped user notice.
        let (allowed, kind) =
            self.rate_limits
                .check_rate_limit(event.platform.as_str(), &event.user_id, &event.chat_id);
        if !allowed {
            return self.rate_limited(event, kind);
        }

        // 5. The pipeline proper.
        let result = self.pipeline.process(event).await;
        for err in &result.errors {
            warn!(error = %err, event_id = %event.event_id, "pipeline component error");
        }

        if result.needs_state_collection && result.state_collection_trigger.is_some() {
            return self.collect_state(event, &result).await;
        }

        // 6. Plain response path.
        if result.messages.is_empty() {
            return HandlerResult::silent();
        }
        if !self.mark_processed(event) {
            return HandlerResult::silent();
        }
        self.dedupe.record_response(event.platform, &event.chat_id);
        HandlerResult::respond(result.messages)
    }

    /// Turn a `needs_state_collection` signal into a session plus its
    /// initial prompt.
    async fn collect_state(
        &self,
        event: &NormalizedEvent,
        result: &PipelineResult,
    ) -> HandlerResult {
        let Some(trigger) = result.state_collection_trigger.as_ref() else {
            return HandlerResult::silent();
        };

        let token = generate_verify_token(
            &self.verify_secret,
            event.platform,
            &event.user_id,
            &event.chat_id,
            self.token_hours,
        );
        let url = verify_url(&self.base_url, &token);

        // A relocation with a resolvable city gets the cheap yes/no flow;
        // everything else goes through the timezone session. Inferred
        // relocations (classifier/LLM, not an explicit pattern) confirm
        // under the shorter clarification TTL.
        let created = if trigger.kind == TriggerKind::Relocation {
            let inferred = matches!(
                trigger.data["pattern"].as_str(),
                Some("location_classifier") | Some("geo_intent")
            );
            let ttl = if inferred {
                TTL_GEO_INTENT_MINUTES
            } else {
                TTL_TIMEZONE_MINUTES
            };
            match self.resolve_relocation_city(trigger).await {
                Some((city, tz)) => self
                    .sessions
                    .create_confirm_relocation_session(event, &city, &tz, url, ttl),
                None => self.sessions.create_timezone_session(event, Some(trigger), url),
            }
        } else {
            self.sessions.create_timezone_session(event, Some(trigger), url)
        };

        let (_, prompt) = match created {
            Ok(pair) => pair,
            Err(StorageError::DuplicateKey(_)) => {
                // Lost the race to a concurrent webhook; the winner's session
                // will pick up the user's next message.
                info!(user_id = %event.user_id, "active session already exists");
                return HandlerResult::silent();
            }
            Err(e) => {
                error!(error = %e, "failed to create session");
                return HandlerResult::silent();
            }
        };

        // Mark processed so webhook retries do not re-create the session.
        if !self.mark_processed(event) {
            return HandlerResult::silent();
        }
        self.dedupe.record_response(event.platform, &event.chat_id);
        HandlerResult::respond(vec![prompt])
    }

    async fn resolve_relocation_city(&self, trigger: &DetectedTrigger) -> Option<(String, String)> {
        let city = trigger.data.get("city")?.as_str()?;
        if city.trim().is_empty() {
            return None;
        }
        geocode_city_with_llm(city, &self.llm).await
    }

    fn rate_limited(&self, event: &NormalizedEvent, kind: Option<LimitKind>) -> HandlerResult {
        let platform = event.platform.as_str();
        let retry_after = match kind {
            Some(LimitKind::User) => self.rate_limits.user_retry_after(platform, &event.user_id),
            Some(LimitKind::Chat) => self.rate_limits.chat_retry_after(platform, &event.chat_id),
            None => 0,
        };
        info!(
            user_id = %event.user_id,
            chat_id = %event.chat_id,
            reason = kind.map(|k| k.as_str()).unwrap_or(""),
            retry_after,
            "rate limited"
        );

        if !self.rate_limits.take_notice_budget(platform, &event.user_id) {
            return HandlerResult::silent();
        }
        if !self.mark_processed(event) {
            return HandlerResult::silent();
        }
        self.dedupe.record_response(event.platform, &event.chat_id);
        HandlerResult::respond(vec![OutboundMessage::plain(
            event.platform,
            &event.chat_id,
            ui::rate_limited(retry_after),
        )])
    }

    /// Record the dedup mark. A failed write means we must stay silent:
    /// replying without the mark risks a double send on retry.
    fn mark_processed(&self, event: &NormalizedEvent) -> bool {
        match self
            .dedupe
            .mark_processed(event.platform, &event.event_id, &event.chat_id)
        {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, event_id = %event.event_id, "mark_processed failed; dropping response");
                false
            }
        }
    }
}
