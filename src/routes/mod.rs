//! API route handlers - maps HTTP endpoints to the changelog service.
//!
//! Each submodule defines routes for a feature area:
//! - `commits`: Search (GET /commits) and ingestion (POST /commits)
//! - `filters`: Known filter values (GET /filters)
//! - `refresh`: Manual lexeme refresh (POST /refresh)
//!
//! Handlers only decode, validate and authorize; everything else lives in
//! `Changelog`.

pub mod commits;
pub mod filters;
pub mod refresh;

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    routing::get,
    Router,
};

use crate::error::AppError;
use crate::service::Changelog;

pub struct AppState {
    pub changelog: Changelog,
    /// Expected value of the `Authorization` header on writes.
    pub secret: String,
}

pub type SharedState = Arc<AppState>;

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(commits::routes(state.clone()))
        .merge(filters::routes(state.clone()))
        .merge(refresh::routes(state))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Extractor guarding write endpoints.
///
/// Runs before the body is read, so unauthorized callers are rejected
/// without their payload being parsed.
pub struct Authorized;

impl FromRequestParts<SharedState> for Authorized {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        if provided.is_empty() || provided != state.secret {
            return Err(AppError::Unauthorized);
        }

        Ok(Authorized)
    }
}
