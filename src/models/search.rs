use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Commit, CommitsList, Filters};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

const ISO_DATE_LAYOUT: &str = "%Y-%m-%d";

/// Everything that identifies one search: the cache fingerprint covers all
/// of these fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Free text, empty for none.
    pub query: String,
    pub filters: Filters,
    /// `YYYY-MM-DD`, exclusive upper bound. Ignored when `last` is set.
    pub before: String,
    /// `YYYY-MM-DD`, exclusive lower bound.
    pub after: String,
    pub page_size: u32,
    /// Opaque cursor returned with the previous page.
    pub last: String,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            filters: Filters::default(),
            before: String::new(),
            after: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            last: String::new(),
        }
    }
}

impl SearchRequest {
    /// Rejects malformed dates or cursor before any storage work happens.
    pub fn validate(&self) -> Result<()> {
        self.upper_bound()?;
        parse_day(&self.before)?;
        self.lower_bound()?;
        Ok(())
    }

    /// Upper date bound; the cursor takes precedence over `before`.
    pub fn upper_bound(&self) -> Result<Option<DateTime<Utc>>> {
        if !self.last.is_empty() {
            return parse_cursor(&self.last).map(Some);
        }

        parse_day(&self.before)
    }

    pub fn lower_bound(&self) -> Result<Option<DateTime<Utc>>> {
        parse_day(&self.after)
    }
}

/// Parses a `YYYY-MM-DD` day as midnight UTC. Empty input means unbounded.
pub fn parse_day(raw: &str) -> Result<Option<DateTime<Utc>>> {
    if raw.is_empty() {
        return Ok(None);
    }

    NaiveDate::parse_from_str(raw, ISO_DATE_LAYOUT)
        .map(|day| Some(day.and_time(chrono::NaiveTime::MIN).and_utc()))
        .map_err(|e| AppError::Validation(format!("unable to parse date `{}`: {}", raw, e)))
}

pub fn format_cursor(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_cursor(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| AppError::Validation(format!("invalid cursor `{}`: {}", raw, e)))
}

/// Response body for a page of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitsPage {
    pub commits: Vec<Commit>,
    pub total_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

impl From<CommitsList> for CommitsPage {
    fn from(list: CommitsList) -> Self {
        let last = list.next_cursor();
        Self {
            commits: list.commits,
            total_count: list.total_count,
            last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_day_accepts_iso_dates() {
        assert_eq!(parse_day("").unwrap(), None);
        assert_eq!(
            parse_day("2020-08-31").unwrap().map(format_cursor).as_deref(),
            Some("2020-08-31T00:00:00Z")
        );
        assert!(matches!(parse_day("2020-31-08"), Err(AppError::Validation(_))));
    }

    #[test]
    fn cursor_takes_precedence_over_before() {
        let request = SearchRequest {
            before: "2020-01-01".into(),
            last: "2020-06-01T10:00:00Z".into(),
            ..Default::default()
        };

        let bound = request.upper_bound().unwrap().unwrap();
        assert_eq!(format_cursor(bound), "2020-06-01T10:00:00Z");
    }

    #[test]
    fn malformed_cursor_is_a_validation_error() {
        let request = SearchRequest {
            last: "yesterday".into(),
            ..Default::default()
        };
        assert!(matches!(request.upper_bound(), Err(AppError::Validation(_))));
    }
}
