//! Routes and handlers

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use channel_crypto::{ChannelResponder, CryptoError};
use channel_protocol::{
    BODY_CONTENT_TYPE, CLIENT_PUBLIC_KEY_HEADER, ProtocolError, SERVER_PUBLIC_KEY_HEADER,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Application state
#[derive(Clone)]
pub struct AppState {
    responder: Arc<ChannelResponder>,
    stats: Arc<Stats>,
}

impl AppState {
    pub fn new(responder: ChannelResponder) -> Self {
        Self {
            responder: Arc::new(responder),
            stats: Arc::new(Stats::default()),
        }
    }
}

#[derive(Default)]
struct Stats {
    handshakes: AtomicU64,
    secure_requests: AtomicU64,
    rejected: AtomicU64,
}

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/handshake", get(handshake_handler))
        .route("/echo", post(echo_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Request rejected by a handler
#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Request body is not valid UTF-8")]
    InvalidUtf8,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Protocol(_) | Self::InvalidUtf8 => StatusCode::BAD_REQUEST,
            Self::Crypto(CryptoError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Crypto(
                CryptoError::InvalidPublicKey(_)
                | CryptoError::DecryptionFailed
                | CryptoError::Protocol(_),
            ) => StatusCode::BAD_REQUEST,
            Self::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        warn!("Rejecting request: {}", self);
        (status, self.to_string()).into_response()
    }
}

fn client_key(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(CLIENT_PUBLIC_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or(ProtocolError::MissingHeader(CLIENT_PUBLIC_KEY_HEADER).into())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Stats endpoint
async fn stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "handshakes": state.stats.handshakes.load(Ordering::Relaxed),
        "secure_requests": state.stats.secure_requests.load(Ordering::Relaxed),
        "rejected": state.stats.rejected.load(Ordering::Relaxed),
    }))
}

/// Seal the shared secret to the client's handshake key
async fn handshake_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let result = answer_handshake(&state, &headers);
    record(&state.stats.handshakes, &state.stats.rejected, result.is_ok());
    result
}

fn answer_handshake(state: &AppState, headers: &HeaderMap) -> Result<Response, ApiError> {
    let body = state.responder.answer_handshake(client_key(headers)?)?;
    debug!("Handshake answered");

    Ok((
        [
            (SERVER_PUBLIC_KEY_HEADER, state.responder.server_public_key()),
            (CONTENT_TYPE.as_str(), BODY_CONTENT_TYPE),
        ],
        body,
    )
        .into_response())
}

/// Decrypt a secure request and send its text back sealed to the request key
async fn echo_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    let result = echo(&state, &headers, &body);
    record(&state.stats.secure_requests, &state.stats.rejected, result.is_ok());
    result
}

fn echo(state: &AppState, headers: &HeaderMap, body: &str) -> Result<Response, ApiError> {
    let client_key = client_key(headers)?;
    let plaintext = state.responder.open_request(body)?;
    let text = String::from_utf8(plaintext).map_err(|_| ApiError::InvalidUtf8)?;
    debug!(len = text.len(), "Secure request opened");

    let sealed = state.responder.seal_response(client_key, text.as_bytes())?;
    Ok(([(CONTENT_TYPE, BODY_CONTENT_TYPE)], sealed).into_response())
}

fn record(ok_counter: &AtomicU64, rejected: &AtomicU64, ok: bool) {
    let counter = if ok { ok_counter } else { rejected };
    counter.fetch_add(1, Ordering::Relaxed);
}
