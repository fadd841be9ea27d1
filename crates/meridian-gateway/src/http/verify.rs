//! The web timezone-verification flow: a signed link from chat opens a page
//! that detects the browser timezone and posts it back.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use meridian_core::types::TimezoneSource;
use meridian_identity::parse_verify_token;
use meridian_parse::is_valid_iana_timezone;

use crate::app::AppState;

const VERIFY_PAGE_HTML: &str = include_str!("../verify_page.html");

/// GET /verify?token=… — the verification page.
pub async fn verify_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let token = params.get("token").map(String::as_str).unwrap_or("");
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing verification token").into_response();
    }
    if parse_verify_token(&state.secrets.verify_token_secret, token).is_none() {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid or expired verification token",
        )
            .into_response();
    }

    let cities_js = state
        .config
        .timezone
        .team_cities
        .iter()
        .take(state.config.ui.max_cities_shown)
        .map(|c| format!("{{name: \"{}\", tz: \"{}\"}}", c.name, c.tz))
        .collect::<Vec<_>>()
        .join(", ");

    let html = VERIFY_PAGE_HTML
        .replace("{{TOKEN}}", token)
        .replace("{{CITIES}}", &cities_js);

    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    token: String,
    #[serde(default)]
    tz_iana: String,
}

/// POST /api/verify — persist a browser-verified timezone.
pub async fn verify_timezone(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> (StatusCode, Json<Value>) {
    if request.token.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Missing token"})));
    }
    if request.tz_iana.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing timezone"})),
        );
    }

    let Some(parsed) = parse_verify_token(&state.secrets.verify_token_secret, &request.token)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid or expired token"})),
        );
    };

    if !is_valid_iana_timezone(&request.tz_iana) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid timezone"})),
        );
    }

    if let Err(e) = state.identity.update_user_timezone(
        parsed.platform,
        &parsed.user_id,
        &request.tz_iana,
        TimezoneSource::WebVerified,
        None,
    ) {
        warn!(error = %e, "failed to persist verified timezone");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Storage error"})),
        );
    }
    if let Err(e) = state.storage.update_user_timezone_in_chat(
        parsed.platform,
        &parsed.chat_id,
        &parsed.user_id,
        &request.tz_iana,
    ) {
        warn!(error = %e, "chat projection update failed (non-critical)");
    }

    info!(
        platform = %parsed.platform,
        user_id = %parsed.user_id,
        tz = %request.tz_iana,
        "timezone verified via web"
    );

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Timezone saved! You can close this page.",
            "timezone": request.tz_iana,
        })),
    )
}
