//! Caller identity forwarded by the upstream gateway.

use crate::state::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

/// Authenticated subject of the request, empty when the gateway sent none.
///
/// Extraction never fails: rejecting an empty identity is up to the services,
/// so every operation reports it the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(&state.identity_header)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        Ok(Caller(id))
    }
}
