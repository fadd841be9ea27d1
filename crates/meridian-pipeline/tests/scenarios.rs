//! End-to-end routing scenarios: webhook-normalized events in, outbound
//! messages and state transitions out. Uses in-memory storage and an
//! unconfigured LLM client (every LLM path degrades to "no result").

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use meridian_classify::{LocationClassifier, TimeClassifier, TzContextClassifier};
use meridian_core::config::{
    ClassifierConfig, ConfidenceConfig, DedupeConfig, RateLimitConfig, RateLimitsConfig,
    TimeParsingConfidenceConfig,
};
use meridian_core::types::{
    NormalizedEvent, Platform, SessionGoal, TimezoneSource, TriggerKind,
};
use meridian_guard::{DedupeManager, RateLimitManager};
use meridian_identity::TimezoneIdentity;
use meridian_llm::LlmClient;
use meridian_pipeline::actions::{MentionHandler, RelocationHandler, TimeConversionHandler};
use meridian_pipeline::detect::{MentionDetector, RelocationDetector, TimeDetector};
use meridian_pipeline::{ActionHandler, Orchestrator, Pipeline, TriggerDetector};
use meridian_sessions::SessionEngine;
use meridian_storage::Storage;

struct Harness {
    orchestrator: Orchestrator,
    storage: Arc<Storage>,
    identity: Arc<TimezoneIdentity>,
}

fn harness(throttle_seconds: u64, user_requests: usize) -> Harness {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let identity = Arc::new(TimezoneIdentity::new(
        Arc::clone(&storage),
        ConfidenceConfig::default(),
    ));
    let llm = Arc::new(LlmClient::new(Default::default(), String::new()));

    let detectors: Vec<Box<dyn TriggerDetector>> = vec![
        Box::new(TimeDetector::new(
            TimeClassifier::new(ClassifierConfig::default()),
            TimeParsingConfidenceConfig::default(),
            Arc::clone(&llm),
        )),
        Box::new(RelocationDetector::new(0.9)),
        Box::new(MentionDetector),
    ];
    let mut handlers: HashMap<TriggerKind, Box<dyn ActionHandler>> = HashMap::new();
    handlers.insert(TriggerKind::Time, Box::new(TimeConversionHandler));
    handlers.insert(
        TriggerKind::Relocation,
        Box::new(RelocationHandler::new(Arc::clone(&identity))),
    );
    handlers.insert(TriggerKind::Mention, Box::new(MentionHandler));

    let team = vec!["Europe/London".to_string(), "Asia/Tokyo".to_string()];
    let pipeline = Pipeline::new(
        detectors,
        handlers,
        Arc::clone(&identity),
        Arc::clone(&storage),
        Arc::clone(&llm),
        LocationClassifier::new(&ClassifierConfig::default()),
        TzContextClassifier::new(&ClassifierConfig::default()),
        team,
        false,
        0.7,
    );

    let sessions = Arc::new(SessionEngine::new(
        Arc::clone(&storage),
        Arc::clone(&identity),
        Arc::clone(&llm),
        Vec::new(),
    ));
    let dedupe = DedupeManager::new(
        Arc::clone(&storage),
        DedupeConfig {
            ttl_seconds: 604_800,
            throttle_seconds,
            cache_cleanup_multiplier: 10,
        },
    );
    let rate_limits = RateLimitManager::new(&RateLimitsConfig {
        enabled: true,
        per_user: RateLimitConfig {
            requests: user_requests,
            window_seconds: 60,
        },
        per_chat: RateLimitConfig {
            requests: 1000,
            window_seconds: 60,
        },
        max_notifications: 3,
    });

    let orchestrator = Orchestrator::new(
        pipeline,
        sessions,
        dedupe,
        rate_limits,
        llm,
        "test-secret".to_string(),
        "https://meridian.test".to_string(),
        24,
    );

    Harness {
        orchestrator,
        storage,
        identity,
    }
}

fn msg(user_id: &str, event_id: &str, text: &str) -> NormalizedEvent {
    NormalizedEvent {
        platform: Platform::Telegram,
        event_id: event_id.to_string(),
        message_id: Some(event_id.to_string()),
        chat_id: "C1".to_string(),
        user_id: user_id.to_string(),
        username: None,
        display_name: None,
        text: text.to_string(),
        timestamp: Utc::now(),
        reply_to_message_id: None,
        raw_payload: None,
    }
}

#[tokio::test]
async fn first_time_user_time_reference_opens_session_then_resolves() {
    let h = harness(0, 1000);

    // Scenario 1: unknown user mentions a time → a single city prompt and an
    // ACTIVE AWAITING_TIMEZONE session.
    let result = h
        .orchestrator
        .route(&msg("U1", "e1", "Let's meet at 3pm"))
        .await;
    assert!(result.should_respond);
    assert_eq!(result.messages.len(), 1);
    assert!(result.messages[0].text.contains("город"));

    let session = h
        .storage
        .get_active_session(Platform::Telegram, "C1", "U1")
        .unwrap()
        .expect("session should be active");
    assert_eq!(session.goal, SessionGoal::AwaitingTimezone);

    // Scenario 2: the reply resolves the city, saves state, updates the chat
    // projection, and completes the session.
    let result = h.orchestrator.route(&msg("U1", "e2", "Moscow")).await;
    assert!(result.messages[0].text.contains("Saved: "));
    assert!(result.messages[0].text.contains("Europe/Moscow"));

    let state = h
        .identity
        .get_user_timezone(Platform::Telegram, "U1")
        .unwrap();
    assert_eq!(state.tz_iana.as_deref(), Some("Europe/Moscow"));
    assert_eq!(state.confidence, 1.0);
    assert_eq!(state.source, TimezoneSource::CityPick);

    let chat = h
        .storage
        .get_chat_state(Platform::Telegram, "C1")
        .unwrap()
        .unwrap();
    assert_eq!(chat.user_timezones.get("U1").unwrap(), "Europe/Moscow");
    assert_eq!(chat.active_timezones, vec!["Europe/Moscow"]);

    assert!(h
        .storage
        .get_active_session(Platform::Telegram, "C1", "U1")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn explicit_hint_converts_without_prompt_or_session() {
    let h = harness(0, 1000);
    h.identity
        .update_user_timezone(
            Platform::Telegram,
            "U2",
            "America/Los_Angeles",
            TimezoneSource::WebVerified,
            None,
        )
        .unwrap();

    // Scenario 3: "10am PST" → 10:00 source, 18:00 UK, Tokyo next day.
    let result = h
        .orchestrator
        .route(&msg("U2", "e3", "call at 10am PST"))
        .await;
    assert!(result.should_respond);
    let text = &result.messages[0].text;
    assert!(text.contains("10:00"), "got: {}", text);
    assert!(text.contains("18:00 UK"), "got: {}", text);
    assert!(text.contains("JST"), "got: {}", text);
    assert!(text.contains("+1 day"), "got: {}", text);

    assert!(h
        .storage
        .get_active_session(Platform::Telegram, "C1", "U2")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn relocation_invalidates_then_confirms() {
    let h = harness(0, 1000);
    h.identity
        .update_user_timezone(
            Platform::Telegram,
            "U3",
            "Europe/Berlin",
            TimezoneSource::WebVerified,
            None,
        )
        .unwrap();

    // Scenario 4: relocation resets confidence and opens a confirm session.
    let result = h
        .orchestrator
        .route(&msg("U3", "e4", "moved to London"))
        .await;
    assert!(result.should_respond);
    assert!(result.messages[0].text.contains("London"));

    let state = h
        .identity
        .get_user_timezone(Platform::Telegram, "U3")
        .unwrap();
    assert_eq!(state.confidence, 0.0);

    let session = h
        .storage
        .get_active_session(Platform::Telegram, "C1", "U3")
        .unwrap()
        .expect("confirm session should be active");
    assert_eq!(session.goal, SessionGoal::ConfirmRelocation);

    // Confirmation saves the pre-resolved timezone.
    let result = h.orchestrator.route(&msg("U3", "e5", "yes")).await;
    assert!(result.messages[0].text.contains("Europe/London"));

    let state = h
        .identity
        .get_user_timezone(Platform::Telegram, "U3")
        .unwrap();
    assert_eq!(state.tz_iana.as_deref(), Some("Europe/London"));
    assert_eq!(state.source, TimezoneSource::RelocationConfirmed);
    assert_eq!(state.confidence, 1.0);

    let chat = h
        .storage
        .get_chat_state(Platform::Telegram, "C1")
        .unwrap()
        .unwrap();
    assert!(chat
        .active_timezones
        .contains(&"Europe/London".to_string()));
}

#[tokio::test]
async fn duplicate_delivery_produces_one_response() {
    let h = harness(0, 1000);
    h.identity
        .update_user_timezone(
            Platform::Telegram,
            "U4",
            "America/Los_Angeles",
            TimezoneSource::WebVerified,
            None,
        )
        .unwrap();

    // Scenario 5: the same event_id delivered twice (platform retry).
    let event = msg("U4", "retry-1", "standup at 14:30");
    let first = h.orchestrator.route(&event).await;
    assert!(first.should_respond);

    let second = h.orchestrator.route(&event).await;
    assert!(!second.should_respond);
    assert!(second.messages.is_empty());
}

#[tokio::test]
async fn throttle_suppresses_rapid_responses_in_chat() {
    let h = harness(2, 1000);
    h.identity
        .update_user_timezone(
            Platform::Telegram,
            "U5",
            "America/Los_Angeles",
            TimezoneSource::WebVerified,
            None,
        )
        .unwrap();

    let first = h
        .orchestrator
        .route(&msg("U5", "t1", "standup at 14:30"))
        .await;
    assert!(first.should_respond);

    // A different event in the same chat immediately after: throttled.
    let second = h
        .orchestrator
        .route(&msg("U5", "t2", "or maybe 15:00"))
        .await;
    assert!(!second.should_respond);
}

#[tokio::test]
async fn rate_limit_notices_are_capped_for_a_user() {
    // One request per window: everything after the first message is limited.
    let h = harness(0, 1);

    let mut notices = 0;
    for i in 0..6 {
        let result = h
            .orchestrator
            .route(&msg("U6", &format!("rl-{}", i), "hello"))
            .await;
        if result.should_respond {
            assert!(result.messages[0].text.contains("Слишком много"));
            notices += 1;
        }
    }
    // Scenario 6: at most max_notifications (3) notices, ever.
    assert_eq!(notices, 3);
}

#[tokio::test]
async fn mention_gets_help_blurb() {
    let h = harness(0, 1000);
    let result = h.orchestrator.route(&msg("U7", "m1", "@meridianbot help")).await;
    assert!(result.should_respond);
    assert!(result.messages[0].text.contains("конвертирую"));
}

#[tokio::test]
async fn plain_chatter_is_silent() {
    let h = harness(0, 1000);
    let result = h
        .orchestrator
        .route(&msg("U8", "p1", "shipped the fix, reviewing now"))
        .await;
    assert!(!result.should_respond);
}
