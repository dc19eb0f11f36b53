//! POST /refresh (authorized) - rebuilds lexeme and filter indexes now
//! instead of waiting for the daily schedule.

use axum::{extract::State, http::StatusCode, routing::post, Router};

use crate::error::Result;
use crate::routes::{Authorized, SharedState};

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/refresh", post(refresh))
        .with_state(state)
}

async fn refresh(_: Authorized, State(state): State<SharedState>) -> Result<StatusCode> {
    state.changelog.refresh().await?;
    Ok(StatusCode::NO_CONTENT)
}
