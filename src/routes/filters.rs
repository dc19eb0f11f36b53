//! Known filter values.
//!
//! GET /filters          -> {"repository": [..], "type": [..], "component": [..]}
//! GET /filters?name=type -> [..]
//!
//! Values come from the last refresh, not from live data.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::Result;
use crate::models::FilterKey;
use crate::routes::SharedState;

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/filters", get(get_filters))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct FiltersQuery {
    #[serde(default)]
    name: String,
}

async fn get_filters(
    State(state): State<SharedState>,
    Query(query): Query<FiltersQuery>,
) -> Result<Response> {
    let name = query.name.trim();

    if name.is_empty() {
        let values = state.changelog.list_filters().await?;
        return Ok(Json(values).into_response());
    }

    let key: FilterKey = name.parse()?;
    let values = state.changelog.list_filter(key).await?;
    Ok(Json(values).into_response())
}
