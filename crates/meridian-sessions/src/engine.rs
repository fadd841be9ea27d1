use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use meridian_core::config::CityConfig;
use meridian_core::types::{
    DetectedTrigger, HandlerResult, NormalizedEvent, OutboundMessage, ParseMode, Platform, Session,
    SessionContext, SessionGoal, SessionStatus, SessionTurn, TimezoneSource,
};
use meridian_geo::geocode_city_with_llm;
use meridian_identity::TimezoneIdentity;
use meridian_llm::LlmClient;
use meridian_parse::lookup_tz_abbreviation;
use meridian_storage::{Storage, StorageError};

use crate::ui;

/// Attempts before a session fails and falls back to the web-verify link.
pub const MAX_ATTEMPTS: u32 = 3;
/// TTL for timezone onboarding / re-verification sessions.
pub const TTL_TIMEZONE_MINUTES: i64 = 30;
/// TTL for geo-intent clarification sessions.
pub const TTL_GEO_INTENT_MINUTES: i64 = 10;

/// Confirmation / rejection word sets (Russian + English).
const CONFIRM_WORDS: &[&str] = &[
    "да", "yes", "ок", "ok", "верно", "правильно", "+", "угу", "ага", "yep",
];
const REJECT_WORDS: &[&str] = &["нет", "no", "неверно", "не", "nope"];

fn is_confirmation(text: &str) -> bool {
    CONFIRM_WORDS.contains(&text) || text.starts_with("да")
}

fn is_rejection(text: &str) -> bool {
    REJECT_WORDS.contains(&text)
}

/// Executes session turns and owns session creation.
///
/// Timezone sessions resolve user input through a deterministic tool chain
/// (configured team cities → tz abbreviations → geocoder, with LLM-assisted
/// name normalization); relocation confirmation is pure rules.
pub struct SessionEngine {
    storage: Arc<Storage>,
    identity: Arc<TimezoneIdentity>,
    llm: Arc<LlmClient>,
    team_cities: Vec<CityConfig>,
}

impl SessionEngine {
    pub fn new(
        storage: Arc<Storage>,
        identity: Arc<TimezoneIdentity>,
        llm: Arc<LlmClient>,
        team_cities: Vec<CityConfig>,
    ) -> Self {
        Self {
            storage,
            identity,
            llm,
            team_cities,
        }
    }

    // ── session creation ──────────────────────────────────────────────────────

    /// Open a timezone-collection session for this user. Picks
    /// REVERIFY_TIMEZONE when the user already has a stored timezone,
    /// AWAITING_TIMEZONE otherwise. Returns the session and initial prompt.
    pub fn create_timezone_session(
        &self,
        event: &NormalizedEvent,
        trigger: Option<&DetectedTrigger>,
        verify_url: String,
    ) -> Result<(Session, OutboundMessage), StorageError> {
        let user_state = self.identity.get_user_timezone(event.platform, &event.user_id);
        let existing_tz = user_state.and_then(|s| s.tz_iana);

        let (goal, text) = match &existing_tz {
            Some(tz) => (SessionGoal::ReverifyTimezone, ui::reverify_prompt(tz)),
            None => (SessionGoal::AwaitingTimezone, ui::onboarding_prompt()),
        };

        let context = SessionContext {
            attempts: 0,
            history: Vec::new(),
            original_text: event.text.clone(),
            trigger_data: trigger
                .map(|t| t.data.clone())
                .unwrap_or(serde_json::Value::Null),
            verify_url: Some(verify_url),
            existing_tz,
            resolved_city: None,
            resolved_tz: None,
        };

        let session = self.insert_session(event, goal, context, TTL_TIMEZONE_MINUTES)?;
        info!(
            session_id = %session.session_id,
            goal = goal.as_str(),
            user_id = %event.user_id,
            "session created"
        );

        let message = OutboundMessage::plain(event.platform, &event.chat_id, text);
        Ok((session, message))
    }

    /// Open a CONFIRM_RELOCATION session with a pre-resolved candidate.
    ///
    /// Explicit relocation statements get the full timezone-session TTL;
    /// classifier/LLM-inferred ones use the shorter clarification TTL.
    pub fn create_confirm_relocation_session(
        &self,
        event: &NormalizedEvent,
        city: &str,
        tz: &str,
        verify_url: String,
        ttl_minutes: i64,
    ) -> Result<(Session, OutboundMessage), StorageError> {
        let context = SessionContext {
            attempts: 0,
            history: Vec::new(),
            original_text: event.text.clone(),
            trigger_data: serde_json::json!({ "city": city }),
            verify_url: Some(verify_url),
            existing_tz: None,
            resolved_city: Some(city.to_string()),
            resolved_tz: Some(tz.to_string()),
        };

        let session =
            self.insert_session(event, SessionGoal::ConfirmRelocation, context, ttl_minutes)?;
        info!(
            session_id = %session.session_id,
            city,
            tz,
            "confirm-relocation session created"
        );

        let message = OutboundMessage {
            platform: event.platform,
            chat_id: event.chat_id.clone(),
            text: ui::confirm_relocation(city, tz),
            reply_to_message_id: None,
            parse_mode: ParseMode::Html,
        };
        Ok((session, message))
    }

    fn insert_session(
        &self,
        event: &NormalizedEvent,
        goal: SessionGoal,
        context: SessionContext,
        ttl_minutes: i64,
    ) -> Result<Session, StorageError> {
        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            platform: event.platform,
            chat_id: event.chat_id.clone(),
            user_id: event.user_id.clone(),
            goal,
            status: SessionStatus::Active,
            context,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
        };
        self.storage.create_session(&session)?;
        Ok(session)
    }

    // ── turn dispatch ─────────────────────────────────────────────────────────

    /// Handle one user turn inside an active session.
    pub async fn handle(&self, session: Session, event: &NormalizedEvent) -> HandlerResult {
        match session.goal {
            SessionGoal::ConfirmRelocation => self.handle_confirm_relocation(session, event).await,
            SessionGoal::AwaitingTimezone | SessionGoal::ReverifyTimezone => {
                self.handle_timezone_session(session, event).await
            }
        }
    }

    // ── CONFIRM_RELOCATION: pure rules, no LLM in the decision path ──────────

    async fn handle_confirm_relocation(
        &self,
        mut session: Session,
        event: &NormalizedEvent,
    ) -> HandlerResult {
        let user_text = event.text.trim().to_lowercase();
        let resolved_tz = session.context.resolved_tz.clone();

        if is_confirmation(&user_text) {
            match resolved_tz {
                Some(tz) => {
                    return self
                        .complete_session(&session, event, &tz, TimezoneSource::RelocationConfirmed)
                }
                None => {
                    warn!(
                        session_id = %session.session_id,
                        "confirm-relocation session without resolved_tz"
                    );
                    self.close(&session.session_id, SessionStatus::Failed);
                    return HandlerResult::silent();
                }
            }
        }

        if is_rejection(&user_text) {
            return self.continue_session(&mut session, event, ui::ask_city(), ParseMode::Plain);
        }

        // Anything else is treated as a city name.
        if let Some((city, tz)) = geocode_city_with_llm(&event.text, &self.llm).await {
            session.context.resolved_city = Some(city.clone());
            session.context.resolved_tz = Some(tz.clone());
            return self.continue_session(
                &mut session,
                event,
                ui::confirm_relocation(&city, &tz),
                ParseMode::Html,
            );
        }

        self.continue_session(
            &mut session,
            event,
            ui::city_not_found(&event.text),
            ParseMode::Plain,
        )
    }

    // ── AWAITING_/REVERIFY_TIMEZONE: tool-chain resolution ───────────────────

    async fn handle_timezone_session(
        &self,
        mut session: Session,
        event: &NormalizedEvent,
    ) -> HandlerResult {
        let user_text = event.text.trim();

        // Re-verify: a bare confirmation keeps the existing timezone.
        if session.goal == SessionGoal::ReverifyTimezone
            && is_confirmation(&user_text.to_lowercase())
        {
            let existing = session.context.existing_tz.clone().or_else(|| {
                self.identity
                    .get_user_timezone(event.platform, &event.user_id)
                    .and_then(|s| s.tz_iana)
            });
            if let Some(tz) = existing {
                return self.complete_session(&session, event, &tz, TimezoneSource::CityPick);
            }
        }

        if let Some(tz) = self.resolve_timezone_input(user_text).await {
            return self.complete_session(&session, event, &tz, TimezoneSource::CityPick);
        }

        // First turn of a relocation-triggered re-verify: the user may answer
        // something unrelated, but the trigger already carried the city.
        if session.context.history.is_empty() {
            if let Some(city) = session
                .context
                .trigger_data
                .get("city")
                .and_then(|v| v.as_str())
            {
                if let Some((_, tz)) = geocode_city_with_llm(city, &self.llm).await {
                    info!(city, tz = %tz, "resolved from relocation trigger context");
                    return self.complete_session(&session, event, &tz, TimezoneSource::CityPick);
                }
            }
        }

        let reply = ui::city_not_found(user_text);
        session.context.history.push(SessionTurn {
            role: "user".to_string(),
            content: event.text.clone(),
        });
        session.context.history.push(SessionTurn {
            role: "assistant".to_string(),
            content: reply.clone(),
        });
        self.continue_session(&mut session, event, reply, ParseMode::Plain)
    }

    /// The tool chain the timezone agent runs, in its prescribed order:
    /// configured team city, then timezone abbreviation, then the geocoder
    /// (LLM-assisted for non-trivial names). Returns the `SAVE:` timezone.
    async fn resolve_timezone_input(&self, input: &str) -> Option<String> {
        let lower = input.trim().to_lowercase();
        if lower.len() < 2 {
            return None;
        }

        if let Some(city) = self
            .team_cities
            .iter()
            .find(|c| c.name.to_lowercase() == lower)
        {
            return Some(city.tz.clone());
        }

        if let Some(tz) = lookup_tz_abbreviation(&lower) {
            return Some(tz.to_string());
        }

        if let Some((_, tz)) = geocode_city_with_llm(input, &self.llm).await {
            return Some(tz);
        }

        None
    }

    // ── shared terminal / non-terminal transitions ───────────────────────────

    fn complete_session(
        &self,
        session: &Session,
        event: &NormalizedEvent,
        tz_iana: &str,
        source: TimezoneSource,
    ) -> HandlerResult {
        if let Err(e) =
            self.identity
                .update_user_timezone(event.platform, &event.user_id, tz_iana, source, None)
        {
            // A lost write here risks a double-prompt loop; fail loud and
            // keep the session open for the retry.
            warn!(error = %e, session_id = %session.session_id, "failed to save timezone");
            return HandlerResult::silent();
        }

        if let Err(e) = self.storage.update_user_timezone_in_chat(
            event.platform,
            &event.chat_id,
            &event.user_id,
            tz_iana,
        ) {
            warn!(error = %e, "chat projection update failed (non-critical)");
        }

        self.close(&session.session_id, SessionStatus::Completed);
        info!(
            session_id = %session.session_id,
            tz = tz_iana,
            source = source.as_str(),
            "session completed"
        );

        HandlerResult::respond(vec![OutboundMessage {
            platform: event.platform,
            chat_id: event.chat_id.clone(),
            text: ui::saved(tz_iana),
            reply_to_message_id: None,
            parse_mode: ParseMode::Html,
        }])
    }

    fn continue_session(
        &self,
        session: &mut Session,
        event: &NormalizedEvent,
        text: String,
        parse_mode: ParseMode,
    ) -> HandlerResult {
        session.context.attempts += 1;
        if session.context.attempts >= MAX_ATTEMPTS {
            return self.fail_session(session, event);
        }

        if let Err(e) = self.storage.update_session(session) {
            warn!(error = %e, session_id = %session.session_id, "session update failed");
        }

        HandlerResult::respond(vec![OutboundMessage {
            platform: event.platform,
            chat_id: event.chat_id.clone(),
            text,
            reply_to_message_id: None,
            parse_mode,
        }])
    }

    fn fail_session(&self, session: &Session, event: &NormalizedEvent) -> HandlerResult {
        self.close(&session.session_id, SessionStatus::Failed);
        info!(session_id = %session.session_id, "session failed after max attempts");

        let text = ui::session_failed(session.context.verify_url.as_deref());
        HandlerResult::respond(vec![OutboundMessage {
            platform: event.platform,
            chat_id: event.chat_id.clone(),
            text,
            reply_to_message_id: None,
            parse_mode: ParseMode::Html,
        }])
    }

    fn close(&self, session_id: &str, status: SessionStatus) {
        if let Err(e) = self.storage.close_session(session_id, status) {
            warn!(error = %e, session_id, "failed to close session");
        }
    }

    /// The active session for this user in this chat, if any.
    pub fn active_session(&self, platform: Platform, chat_id: &str, user_id: &str) -> Option<Session> {
        match self.storage.get_active_session(platform, chat_id, user_id) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "session lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::config::ConfidenceConfig;

    fn engine() -> SessionEngine {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let identity = Arc::new(TimezoneIdentity::new(
            Arc::clone(&storage),
            ConfidenceConfig::default(),
        ));
        let llm = Arc::new(LlmClient::new(Default::default(), String::new()));
        SessionEngine::new(
            storage,
            identity,
            llm,
            vec![CityConfig {
                name: "NY".to_string(),
                tz: "America/New_York".to_string(),
            }],
        )
    }

    fn event(text: &str) -> NormalizedEvent {
        NormalizedEvent {
            platform: Platform::Telegram,
            event_id: format!("e-{}", text.len()),
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
    async fn awaiting_timezone_resolves_city_and_completes() {
        let e = engine();
        let (session, prompt) = e
            .create_timezone_session(&event("meet at 3pm"), None, "https://x/verify".to_string())
            .unwrap();
        assert_eq!(session.goal, SessionGoal::AwaitingTimezone);
        assert!(prompt.text.contains("город"));

        let result = e.handle(session, &event("Moscow")).await;
        assert!(result.should_respond);
        assert!(result.messages[0].text.contains("Saved: "));
        assert!(result.messages[0].text.contains("Europe/Moscow"));

        // User state and chat projection both updated.
        let state = e
            .identity
            .get_user_timezone(Platform::Telegram, "u1")
            .unwrap();
        assert_eq!(state.tz_iana.as_deref(), Some("Europe/Moscow"));
        assert_eq!(state.confidence, 1.0);
        assert_eq!(state.source, TimezoneSource::CityPick);

        let chat = e
            .storage
            .get_chat_state(Platform::Telegram, "c1")
            .unwrap()
            .unwrap();
        assert_eq!(chat.active_timezones, vec!["Europe/Moscow"]);

        // Session is gone.
        assert!(e.active_session(Platform::Telegram, "c1", "u1").is_none());
    }

    #[tokio::test]
    async fn cyrillic_city_resolves() {
        let e = engine();
        let (session, _) = e
            .create_timezone_session(&event("x"), None, String::new())
            .unwrap();
        let result = e.handle(session, &event("Ташкенту")).await;
        assert!(result.messages[0].text.contains("Asia/Tashkent"));
    }

    #[tokio::test]
    async fn configured_team_city_checked_first() {
        let e = engine();
        let (session, _) = e
            .create_timezone_session(&event("x"), None, String::new())
            .unwrap();
        let result = e.handle(session, &event("NY")).await;
        assert!(result.messages[0].text.contains("America/New_York"));
    }

    #[tokio::test]
    async fn tz_abbreviation_resolves() {
        let e = engine();
        let (session, _) = e
            .create_timezone_session(&event("x"), None, String::new())
            .unwrap();
        let result = e.handle(session, &event("PST")).await;
        assert!(result.messages[0].text.contains("America/Los_Angeles"));
    }

    #[tokio::test]
    async fn three_failed_attempts_fail_with_verify_link() {
        let e = engine();
        let (mut session, _) = e
            .create_timezone_session(&event("x"), None, "https://x/verify?token=t".to_string())
            .unwrap();

        for turn in 0..2 {
            let result = e.handle(session.clone(), &event("qwzxyqwzxy")).await;
            assert!(
                result.messages[0].text.contains("Не нашёл"),
                "turn {}",
                turn
            );
            session = e
                .active_session(Platform::Telegram, "c1", "u1")
                .expect("session should stay open");
        }

        let result = e.handle(session, &event("qwzxyqwzxy")).await;
        assert!(result.messages[0].text.contains("https://x/verify?token=t"));
        assert!(e.active_session(Platform::Telegram, "c1", "u1").is_none());
    }

    #[tokio::test]
    async fn reverify_yes_keeps_existing_tz() {
        let e = engine();
        e.identity
            .update_user_timezone(
                Platform::Telegram,
                "u1",
                "Europe/Berlin",
                TimezoneSource::WebVerified,
                None,
            )
            .unwrap();

        let (session, prompt) = e
            .create_timezone_session(&event("x"), None, String::new())
            .unwrap();
        assert_eq!(session.goal, SessionGoal::ReverifyTimezone);
        assert!(prompt.text.contains("Europe/Berlin"));

        let result = e.handle(session, &event("да")).await;
        assert!(result.messages[0].text.contains("Europe/Berlin"));
    }

    #[tokio::test]
    async fn confirm_relocation_yes_saves_resolved_tz() {
        let e = engine();
        let (session, prompt) = e
            .create_confirm_relocation_session(
                &event("moved to London"),
                "London",
                "Europe/London",
                String::new(),
                TTL_TIMEZONE_MINUTES,
            )
            .unwrap();
        assert!(prompt.text.contains("London"));

        let result = e.handle(session, &event("yes")).await;
        assert!(result.messages[0].text.contains("Europe/London"));

        let state = e
            .identity
            .get_user_timezone(Platform::Telegram, "u1")
            .unwrap();
        assert_eq!(state.source, TimezoneSource::RelocationConfirmed);
        assert_eq!(state.confidence, 1.0);
    }

    #[tokio::test]
    async fn confirm_relocation_rejection_asks_for_city() {
        let e = engine();
        let (session, _) = e
            .create_confirm_relocation_session(
                &event("x"),
                "London",
                "Europe/London",
                String::new(),
                TTL_TIMEZONE_MINUTES,
            )
            .unwrap();
        let result = e.handle(session, &event("нет")).await;
        assert!(result.messages[0].text.contains("напиши город"));
    }

    #[tokio::test]
    async fn confirm_relocation_new_city_re_asks_confirmation() {
        let e = engine();
        let (session, _) = e
            .create_confirm_relocation_session(
                &event("x"),
                "London",
                "Europe/London",
                String::new(),
                TTL_TIMEZONE_MINUTES,
            )
            .unwrap();
        let result = e.handle(session, &event("Tokyo")).await;
        assert!(result.messages[0].text.contains("Tokyo"));
        assert!(result.messages[0].text.contains("Asia/Tokyo"));

        // The updated candidate is persisted.
        let stored = e
            .active_session(Platform::Telegram, "c1", "u1")
            .expect("still active");
        assert_eq!(stored.context.resolved_tz.as_deref(), Some("Asia/Tokyo"));

        let result = e.handle(stored, &event("да")).await;
        assert!(result.messages[0].text.contains("Asia/Tokyo"));
    }

    #[tokio::test]
    async fn relocation_context_resolves_on_unhelpful_reply() {
        let e = engine();
        let trigger = DetectedTrigger {
            kind: meridian_core::types::TriggerKind::Relocation,
            confidence: 0.9,
            original_text: "moved to Berlin".to_string(),
            data: serde_json::json!({ "city": "Berlin" }),
        };
        let (session, _) = e
            .create_timezone_session(&event("moved to Berlin"), Some(&trigger), String::new())
            .unwrap();

        // First reply is not a city, but the trigger context carries one.
        let result = e.handle(session, &event("qwzxyqwzxy")).await;
        assert!(result.messages[0].text.contains("Europe/Berlin"));
    }

    #[tokio::test]
    async fn second_session_creation_is_rejected_while_active() {
        let e = engine();
        let (_s, _) = e
            .create_timezone_session(&event("x"), None, String::new())
            .unwrap();
        let err = e
            .create_timezone_session(&event("y"), None, String::new())
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));
    }
}
