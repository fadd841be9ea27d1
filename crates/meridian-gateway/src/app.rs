use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use meridian_classify::{LocationClassifier, TimeClassifier, TzContextClassifier};
use meridian_connectors::slack::SlackSender;
use meridian_connectors::telegram::TelegramSender;
use meridian_connectors::whatsapp::WhatsAppSender;
use meridian_connectors::OutboundDispatcher;
use meridian_core::config::{MeridianConfig, Secrets};
use meridian_core::types::TriggerKind;
use meridian_guard::{DedupeManager, RateLimitManager};
use meridian_identity::TimezoneIdentity;
use meridian_llm::LlmClient;
use meridian_pipeline::actions::{MentionHandler, RelocationHandler, TimeConversionHandler};
use meridian_pipeline::detect::{MentionDetector, RelocationDetector, TimeDetector};
use meridian_pipeline::{ActionHandler, Orchestrator, Pipeline, TriggerDetector};
use meridian_sessions::SessionEngine;
use meridian_storage::Storage;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
///
/// Every subsystem is constructed once at startup and injected here; tests
/// build the same graph over in-memory storage.
pub struct AppState {
    pub config: MeridianConfig,
    pub secrets: Secrets,
    pub storage: Arc<Storage>,
    pub identity: Arc<TimezoneIdentity>,
    pub orchestrator: Orchestrator,
    pub dispatcher: OutboundDispatcher,
}

impl AppState {
    /// Wire the full dependency graph over the given storage.
    pub fn build(config: MeridianConfig, secrets: Secrets, storage: Arc<Storage>) -> Self {
        let identity = Arc::new(TimezoneIdentity::new(
            Arc::clone(&storage),
            config.confidence.clone(),
        ));
        let llm = Arc::new(LlmClient::new(config.llm.clone(), secrets.llm_api_key.clone()));

        let detectors: Vec<Box<dyn TriggerDetector>> = vec![
            Box::new(TimeDetector::new(
                TimeClassifier::new(config.classifier.clone()),
                config.time_parsing.confidence.clone(),
                Arc::clone(&llm),
            )),
            Box::new(RelocationDetector::new(config.triggers.relocation_confidence)),
            Box::new(MentionDetector),
        ];

        let mut handlers: HashMap<TriggerKind, Box<dyn ActionHandler>> = HashMap::new();
        handlers.insert(TriggerKind::Time, Box::new(TimeConversionHandler));
        handlers.insert(
            TriggerKind::Relocation,
            Box::new(RelocationHandler::new(Arc::clone(&identity))),
        );
        handlers.insert(TriggerKind::Mention, Box::new(MentionHandler));

        let pipeline = Pipeline::new(
            detectors,
            handlers,
            Arc::clone(&identity),
            Arc::clone(&storage),
            Arc::clone(&llm),
            LocationClassifier::new(&config.classifier),
            TzContextClassifier::new(&config.classifier),
            config.timezone.team_timezones.clone(),
            config.triggers.geo_intent_enabled,
            config.triggers.city_detection_confidence,
        );

        let sessions = Arc::new(SessionEngine::new(
            Arc::clone(&storage),
            Arc::clone(&identity),
            Arc::clone(&llm),
            config.timezone.team_cities.clone(),
        ));
        let dedupe = DedupeManager::new(Arc::clone(&storage), config.dedupe.clone());
        let rate_limits = RateLimitManager::new(&config.rate_limits);

        let orchestrator = Orchestrator::new(
            pipeline,
            sessions,
            dedupe,
            rate_limits,
            Arc::clone(&llm),
            secrets.verify_token_secret.clone(),
            config.app.effective_base_url(),
            config.ui.verification_token_hours,
        );

        let timeouts = &config.http.timeouts;
        let dispatcher = OutboundDispatcher::new(
            (!secrets.telegram_bot_token.is_empty()).then(|| {
                TelegramSender::new(secrets.telegram_bot_token.clone(), timeouts.telegram_api)
            }),
            (!secrets.slack_bot_token.is_empty())
                .then(|| SlackSender::new(secrets.slack_bot_token.clone(), timeouts.slack_api)),
            (!secrets.whatsapp_access_token.is_empty()).then(|| {
                WhatsAppSender::new(
                    secrets.whatsapp_access_token.clone(),
                    secrets.whatsapp_phone_number_id.clone(),
                    timeouts.whatsapp_api,
                )
            }),
        );

        Self {
            config,
            secrets,
            storage,
            identity,
            orchestrator,
            dispatcher,
        }
    }
}

/// Assemble the full Axum router.
///
/// The outer timeout keeps every request inside the tightest platform
/// webhook deadline (Telegram: 30 s).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/hooks/telegram", post(crate::http::webhooks::telegram_webhook))
        .route("/hooks/slack", post(crate::http::webhooks::slack_webhook))
        .route(
            "/hooks/whatsapp",
            get(crate::http::webhooks::whatsapp_verify_challenge)
                .post(crate::http::webhooks::whatsapp_webhook),
        )
        .route("/hooks/discord", post(crate::http::webhooks::discord_webhook))
        .route("/verify", get(crate::http::verify::verify_page))
        .route("/api/verify", post(crate::http::verify::verify_timezone))
        .route("/health", get(crate::http::health::health))
        .route("/ready", get(crate::http::health::ready))
        .route("/live", get(crate::http::health::live))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::timeout::TimeoutLayer::new(
            std::time::Duration::from_secs(meridian_core::config::WEBHOOK_BUDGET_SECS),
        ))
}
