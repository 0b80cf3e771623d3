//! Session-based authentication.
//!
//! Sessions are minted elsewhere; this layer only resolves the caller. The
//! session id arrives as a bearer token or the `ss_session` cookie.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::state::ApiState;

/// Cookie carrying the session id.
const SESSION_COOKIE: &str = "ss_session";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    /// Authenticated user id.
    pub user_id: String,
    /// Session id the request authenticated with.
    pub session_id: String,
}

fn session_id_from_parts(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    let cookies = parts.headers.get(COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=') {
            if name == SESSION_COOKIE && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

impl FromRequestParts<ApiState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = session_id_from_parts(parts).ok_or(ApiError::Unauthorized)?;
        let record = state
            .sessions
            .get(&session_id)
            .await?
            .ok_or(ApiError::Unauthorized)?;
        Ok(Self {
            user_id: record.user_id,
            session_id,
        })
    }
}
