//! Webhook ingress, one route per platform. Each request is authenticated
//! per its platform's scheme, normalized, routed through the orchestrator,
//! and fanned out.
//!
//! Error behavior: signature mismatch → 401 with no body detail; malformed
//! or unprocessable payloads → 200 `{"status":"ignored"}` so platforms do
//! not retry-storm us.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use meridian_core::types::NormalizedEvent;
use meridian_connectors::slack::{normalize_slack_event, url_verification_challenge};
use meridian_connectors::telegram::normalize_telegram_update;
use meridian_connectors::whatsapp::normalize_whatsapp_payload;

use crate::app::AppState;
use crate::auth;

fn ignored() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({"status": "ignored"})))
}

fn processed() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({"status": "processed"})))
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})))
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> &'h str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Route one event and fan its responses out.
async fn process_event(state: &AppState, event: &NormalizedEvent) {
    let result = state.orchestrator.route(event).await;
    if result.should_respond {
        state.dispatcher.send_all(&result.messages).await;
    }
}

/// POST /hooks/telegram
pub async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let token = header(&headers, "x-telegram-bot-api-secret-token");
    if !auth::verify_telegram_signature(token, &state.secrets.telegram_webhook_secret) {
        warn!("telegram webhook signature mismatch");
        return unauthorized();
    }

    let Ok(update) = serde_json::from_slice::<Value>(&body) else {
        info!("telegram webhook with invalid JSON; ignoring");
        return ignored();
    };
    let Some(event) = normalize_telegram_update(&update) else {
        return ignored();
    };

    process_event(&state, &event).await;
    processed()
}

/// POST /hooks/slack
pub async fn slack_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let timestamp = header(&headers, "x-slack-request-timestamp");
    let signature = header(&headers, "x-slack-signature");
    if !auth::verify_slack_signature(&body, timestamp, signature, &state.secrets.slack_signing_secret)
    {
        warn!("slack webhook signature mismatch");
        return unauthorized().into_response();
    }

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        info!("slack webhook with invalid JSON; ignoring");
        return ignored().into_response();
    };

    // Endpoint setup handshake.
    if let Some(challenge) = url_verification_challenge(&payload) {
        return (StatusCode::OK, Json(json!({"challenge": challenge}))).into_response();
    }

    let Some(event) = normalize_slack_event(&payload) else {
        return ignored().into_response();
    };

    process_event(&state, &event).await;
    processed().into_response()
}

/// GET /hooks/whatsapp — subscription verification challenge.
pub async fn whatsapp_verify_challenge(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mode = params.get("hub.mode").map(String::as_str).unwrap_or("");
    let token = params
        .get("hub.verify_token")
        .map(String::as_str)
        .unwrap_or("");
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if mode == "subscribe" && !token.is_empty() && token == state.secrets.whatsapp_verify_token {
        info!("whatsapp webhook verified");
        (StatusCode::OK, challenge).into_response()
    } else {
        warn!("whatsapp webhook verification failed");
        (StatusCode::FORBIDDEN, Json(json!({"error": "forbidden"}))).into_response()
    }
}

/// POST /hooks/whatsapp
pub async fn whatsapp_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = header(&headers, "x-hub-signature-256");
    if !auth::verify_whatsapp_signature(&body, signature, &state.secrets.whatsapp_app_secret) {
        warn!("whatsapp webhook signature mismatch");
        return unauthorized();
    }

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        info!("whatsapp webhook with invalid JSON; ignoring");
        return ignored();
    };

    let events = normalize_whatsapp_payload(&payload);
    if events.is_empty() {
        return ignored();
    }
    for event in &events {
        process_event(&state, event).await;
    }
    processed()
}

/// POST /hooks/discord — not implemented.
pub async fn discord_webhook() -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "status": "not_implemented",
            "message": "Discord events are not supported yet",
        })),
    )
}
