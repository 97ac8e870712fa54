//! API request handlers

use super::models::{ConfigRequest, SessionRequest, SessionSummary};
use super::server::AppState;
use crate::config::{self, CredentialFault, DEFAULT_AUDIO_MODEL, DEFAULT_TEXT_MODEL};
use crate::qwen::QwenClient;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use tracing::{info, warn};

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"detail": message}))).into_response()
}

/// Handle health check requests
pub async fn health(State(state): State<AppState>) -> Response {
    let sessions = state.store.list().await.len();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tubenote",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": sessions,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
    .into_response()
}

/// Report whether an API key is configured, masked for display.
pub async fn get_config(State(state): State<AppState>) -> Response {
    match state.credentials.load().await {
        Some(credentials) => Json(serde_json::json!({
            "has_key": true,
            "api_key_masked": config::masked_key(&credentials.api_key),
        }))
        .into_response(),
        None => Json(serde_json::json!({"has_key": false})).into_response(),
    }
}

/// Validate an API key against both default models, then persist it.
pub async fn save_config(
    State(state): State<AppState>,
    Json(payload): Json<ConfigRequest>,
) -> Response {
    if payload.api_key.len() < 10 {
        return detail(StatusCode::BAD_REQUEST, "invalid api key");
    }

    let client = match QwenClient::new(&payload.api_key, &state.base_url) {
        Ok(client) => client,
        Err(e) => return detail(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    let validation = async {
        client.validate_text_model(DEFAULT_TEXT_MODEL).await?;
        client.validate_audio_model(DEFAULT_AUDIO_MODEL).await
    }
    .await;

    if let Err(e) = validation {
        warn!("Credential validation failed: {}", e);
        return match config::classify_credential_error(&e.to_string()) {
            CredentialFault::QuotaExceeded => detail(StatusCode::BAD_REQUEST, "quota exceeded"),
            CredentialFault::InvalidKey => detail(StatusCode::BAD_REQUEST, "invalid api key"),
        };
    }

    match state.credentials.save(&payload.api_key).await {
        Ok(_) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(e) => detail(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// Create a session and spawn its detached pipeline run.
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionRequest>,
) -> Response {
    if state.credentials.load().await.is_none() {
        return detail(StatusCode::BAD_REQUEST, "missing api key");
    }

    match url::Url::parse(&payload.url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return detail(StatusCode::BAD_REQUEST, "invalid url"),
    }

    let id = match state
        .store
        .create(
            &payload.url,
            payload.style,
            payload.remark,
            payload.include_joke,
        )
        .await
    {
        Ok(id) => id,
        Err(e) => return detail(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    info!("🎬 Accepted session {} for {}", id, payload.url);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        pipeline.run(id).await;
    });

    Json(serde_json::json!({"id": id})).into_response()
}

/// List sessions, most recent first.
pub async fn list_sessions(State(state): State<AppState>) -> Response {
    let items: Vec<SessionSummary> = state
        .store
        .list()
        .await
        .iter()
        .map(SessionSummary::from)
        .collect();
    Json(serde_json::json!({"items": items})).into_response()
}

/// One session with its three steps.
pub async fn get_session(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let Some(session) = state.store.get(id).await else {
        return detail(StatusCode::NOT_FOUND, "not found");
    };
    let steps = state.store.steps(id).await.unwrap_or_default();
    Json(serde_json::json!({"session": session, "steps": steps})).into_response()
}

/// Delete a session, its steps and its audio artifacts.
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.store.delete(id).await {
        Ok(true) => Json(serde_json::json!({"ok": true})).into_response(),
        Ok(false) => detail(StatusCode::NOT_FOUND, "not found"),
        Err(e) => detail(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}
