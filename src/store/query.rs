//! Search query builder.
//!
//! Turns resolved words, filters and date bounds into a `SearchQuery`: an
//! ordered list of predicates plus a row limit. Engines either evaluate the
//! predicates directly (`MemoryStore`) or render them to SQL
//! (`PgStore`). Rendering only concatenates static clause fragments and
//! `$n` placeholders; every user-supplied value travels as a `QueryParam`.
//!
//! Pagination is keyset-based: the cursor is the date of the last row already
//! shown, so pages stay stable while new commits are ingested.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{FilterKey, Filters, MAX_PAGE_SIZE, SearchRequest};

/// Text search configuration used for both indexing and querying.
pub const TEXT_SEARCH_CONFIG: &str = "english";

const SEARCH_HEAD: &str = "SELECT
  hash,
  type,
  component,
  revert,
  breaking,
  content,
  date,
  remote,
  repository,
  count(1) OVER() AS full_count
FROM
  changelog.commit
WHERE
  TRUE";

/// A value bound to a placeholder of the rendered statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    TextArray(Vec<String>),
    Timestamp(DateTime<Utc>),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Search vector matches any of the words.
    Matches(Vec<String>),
    /// Attribute equals one of the (lower-cased) values.
    AnyOf { key: FilterKey, values: Vec<String> },
    /// Strictly older than the bound.
    Before(DateTime<Utc>),
    /// Strictly newer than the bound.
    After(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    predicates: Vec<Predicate>,
    limit: u32,
}

impl SearchQuery {
    /// Builds the query in a fixed order: words, filters, upper bound, lower
    /// bound. `cursor` wins over `before` when both are given.
    pub fn build(
        page_size: u32,
        cursor: Option<DateTime<Utc>>,
        words: &[String],
        filters: &Filters,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Self {
        let mut predicates = Vec::new();

        if !words.is_empty() {
            predicates.push(Predicate::Matches(words.to_vec()));
        }

        for (key, values) in filters.iter() {
            let values: Vec<String> = values
                .iter()
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty())
                .collect();

            if values.is_empty() {
                continue;
            }

            predicates.push(Predicate::AnyOf { key, values });
        }

        if let Some(bound) = cursor.or(before) {
            predicates.push(Predicate::Before(bound));
        }

        if let Some(bound) = after {
            predicates.push(Predicate::After(bound));
        }

        Self {
            predicates,
            limit: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Builds the query for a request whose free text resolved to `words`.
    pub fn for_request(request: &SearchRequest, words: &[String]) -> Result<Self> {
        let cursor = if request.last.is_empty() {
            None
        } else {
            request.upper_bound()?
        };

        Ok(Self::build(
            request.page_size,
            cursor,
            words,
            &request.filters,
            crate::models::parse_day(&request.before)?,
            request.lower_bound()?,
        ))
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Renders the SQL statement and its parameters, in placeholder order.
    pub fn render(&self) -> (String, Vec<QueryParam>) {
        let mut sql = String::from(SEARCH_HEAD);
        let mut params = Vec::new();

        for predicate in &self.predicates {
            let (fragment, param) = match predicate {
                Predicate::Matches(words) => (
                    format!("search_vector @@ to_tsquery('{}', ", TEXT_SEARCH_CONFIG),
                    QueryParam::Text(to_tsquery_disjunction(words)),
                ),
                Predicate::AnyOf { key, values } => (
                    format!("{} = ANY(", key.column()),
                    QueryParam::TextArray(values.clone()),
                ),
                Predicate::Before(bound) => ("date < (".to_string(), QueryParam::Timestamp(*bound)),
                Predicate::After(bound) => ("date > (".to_string(), QueryParam::Timestamp(*bound)),
            };

            params.push(param);
            let _ = write!(sql, "\n  AND {}${})", fragment, params.len());
        }

        params.push(QueryParam::Int(i64::from(self.limit)));
        let _ = write!(sql, "\nORDER BY\n  date DESC\nLIMIT ${}", params.len());

        (sql, params)
    }
}

/// `'a' | 'b'` with each word quoted so tsquery operators inside a word are
/// taken literally.
fn to_tsquery_disjunction(words: &[String]) -> String {
    words
        .iter()
        .map(|word| format!("'{}'", word.replace('\\', "\\\\").replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(" | ")
}
