//! Commit search and ingestion.
//!
//! GET /commits?q=&repository=&type=&component=&before=&after=&pageSize=&last=
//!
//! Filter parameters may be repeated or comma separated. Unknown parameters
//! are ignored. Responds with `{commits, totalCount, last}` where `last` is
//! the cursor for the next page.
//!
//! POST /commits (authorized) stores one commit and answers 201.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::models::{Commit, CommitsPage, FilterKey, SearchRequest, MAX_PAGE_SIZE};
use crate::routes::{Authorized, SharedState};

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/commits", get(search_commits).post(create_commit))
        .with_state(state)
}

async fn search_commits(
    State(state): State<SharedState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<CommitsPage>> {
    let request = parse_search(&params)?;
    let list = state.changelog.search(&request).await?;
    Ok(Json(list.into()))
}

async fn create_commit(
    _: Authorized,
    State(state): State<SharedState>,
    payload: std::result::Result<Json<Commit>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(commit) = payload?;
    state.changelog.save(commit).await?;
    Ok(StatusCode::CREATED)
}

fn parse_search(params: &[(String, String)]) -> Result<SearchRequest> {
    let mut request = SearchRequest::default();

    for (name, value) in params {
        match name.as_str() {
            "q" => request.query = value.trim().to_string(),
            "before" => request.before = value.trim().to_string(),
            "after" => request.after = value.trim().to_string(),
            "last" => request.last = value.trim().to_string(),
            "pageSize" => request.page_size = parse_page_size(value)?,
            other => {
                if let Ok(key) = other.parse::<FilterKey>() {
                    request.filters.insert(key, value.split(','));
                }
            }
        }
    }

    request.validate()?;
    Ok(request)
}

fn parse_page_size(raw: &str) -> Result<u32> {
    let size: u32 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("pageSize must be a positive integer, got `{}`", raw)))?;

    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "pageSize must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_PAGE_SIZE;
    use crate::routes::tests::{app, get, json_body, post, send, SECRET};
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn payload(hash: &str, date: i64) -> serde_json::Value {
        json!({
            "date": date,
            "hash": hash,
            "type": "feat",
            "component": "api",
            "content": format!("Add endpoint {hash}"),
            "remote": "github.com",
            "repository": "acme/api",
        })
    }

    #[test]
    fn parse_search_collects_repeated_and_comma_separated_filters() {
        let request = parse_search(&params(&[
            ("q", " readme "),
            ("type", "feat,fix"),
            ("type", "chore"),
            ("repository", "Acme/API"),
            ("utm_source", "newsletter"),
        ]))
        .unwrap();

        assert_eq!(request.query, "readme");
        assert_eq!(request.page_size, DEFAULT_PAGE_SIZE);

        let filters: Vec<_> = request
            .filters
            .iter()
            .map(|(key, values)| (key, values.iter().cloned().collect::<Vec<_>>()))
            .collect();
        assert_eq!(
            filters,
            vec![
                (FilterKey::Repository, vec!["acme/api".to_string()]),
                (FilterKey::Type, vec!["chore".into(), "feat".into(), "fix".into()]),
            ]
        );
    }

    #[test]
    fn parse_search_rejects_bad_page_sizes_and_dates() {
        for size in ["0", "101", "-1", "twenty"] {
            let err = parse_search(&params(&[("pageSize", size)])).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{size}");
        }

        assert_eq!(parse_search(&params(&[("pageSize", "100")])).unwrap().page_size, 100);
        assert!(parse_search(&params(&[("before", "31/08/2020")])).is_err());
        assert!(parse_search(&params(&[("last", "yesterday")])).is_err());
    }

    #[tokio::test]
    async fn post_then_search() {
        let app = app();

        for (hash, date) in [("a1", 1_598_000_000), ("b2", 1_598_100_000), ("c3", 1_598_200_000)] {
            let response = send(&app, post("/commits", Some(SECRET), payload(hash, date))).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = send(&app, get("/commits?pageSize=2&type=feat")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["totalCount"], 3);
        assert_eq!(body["commits"].as_array().unwrap().len(), 2);
        assert_eq!(body["commits"][0]["hash"], "c3");
        assert_eq!(body["commits"][0]["type"], "feat");

        let last = body["last"].as_str().unwrap().to_string();
        let next = json_body(send(&app, get(&format!("/commits?pageSize=2&last={last}"))).await).await;
        assert_eq!(next["commits"][0]["hash"], "a1");
        assert_eq!(next["commits"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_result_has_no_cursor() {
        let body = json_body(send(&app(), get("/commits")).await).await;

        assert_eq!(body["totalCount"], 0);
        assert!(body.get("last").is_none());
    }

    #[tokio::test]
    async fn invalid_commit_is_a_bad_request() {
        let response = send(&app(), post("/commits", Some(SECRET), payload("", 1_598_000_000))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("hash is required"));
    }

    #[tokio::test]
    async fn undecodable_commit_is_a_bad_request() {
        let mut commit = payload("a1", 1_598_000_000);
        commit.as_object_mut().unwrap().remove("date");

        let response = send(&app(), post("/commits", Some(SECRET), commit)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("date"));
    }

    #[tokio::test]
    async fn unauthorized_post_is_rejected() {
        let response = send(&app(), post("/commits", None, payload("a1", 1_598_000_000))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_words_are_not_found() {
        let response = send(&app(), get("/commits?q=zzqxv")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
