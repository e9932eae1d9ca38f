//! Static API-key gate for the /api routes.
//!
//! A request passes when either `Authorization: Bearer <key>` or
//! `x-api-key: <key>` carries the configured key.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use shared::ErrorResponse;
use tracing::warn;

use crate::rest::AppState;

const API_KEY_HEADER: &str = "x-api-key";

pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if presented_key_matches(request.headers(), &state.config.api_key) {
        return next.run(request).await;
    }

    warn!("Rejected {} {}: invalid or missing API key", request.method(), request.uri().path());
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("Invalid or missing API key")),
    )
        .into_response()
}

fn presented_key_matches(headers: &HeaderMap, api_key: &str) -> bool {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_whitespace().nth(1));
    let header_key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());

    bearer == Some(api_key) || header_key == Some(api_key)
}
