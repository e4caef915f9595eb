//! Bearer API key check and actor extraction.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::host::model::UserId;
use crate::http::error::ApiError;
use crate::http::server::AppState;

pub const X_USER_ID: &str = "x-user-id";

/// Rejects requests without `Authorization: Bearer {api_key}`.
///
/// The key is read from the live config on every request; an empty key disables the check.
pub async fn api_key_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let config = state.config.load();
    let expected = &config.security.api_key;
    if expected.is_empty() {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(expected.as_str()) {
        Ok(next.run(request).await)
    } else {
        tracing::debug!(path = %request.uri().path(), "Rejected request without valid API key");
        Err(ApiError::unauthorized())
    }
}

/// The user issuing the request, from the `x-user-id` header.
///
/// A missing header yields `None`; a malformed one is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub Option<UserId>);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(X_USER_ID) else {
            return Ok(Actor(None));
        };
        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .map(|id| Actor(Some(id)))
            .ok_or_else(|| ApiError::bad_request(format!("{X_USER_ID} must be a numeric user id")))
    }
}
