//! Commit storage behind the search core.
//!
//! `CommitStore` is the seam between the core and a storage engine:
//! engines provide the primitive operations (insert, lexeme lookup, query
//! execution, auxiliary index refresh) and the trait's provided methods apply
//! the commit invariants and the search orchestration on top of them.
//!
//! - `query`: SearchQuery builder and SQL rendering
//! - `lexeme`: free text → candidate lexemes
//! - `postgres`: PostgreSQL engine (tsvector, pg_trgm, materialized views)
//! - `memory`: in-process engine with the same semantics

pub mod lexeme;
pub mod memory;
pub mod postgres;
pub mod query;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{Commit, CommitsList, FilterKey, FilterValues, SearchRequest};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use query::SearchQuery;

#[async_trait]
pub trait CommitStore: Send + Sync {
    /// Persists a sanitized and checked commit as one atomic unit.
    async fn insert(&self, commit: &Commit) -> Result<()>;

    /// Lexemes whose similarity to `text` clears the threshold.
    async fn similar_words(&self, text: &str) -> Result<Vec<String>>;

    async fn execute(&self, query: &SearchQuery) -> Result<CommitsList>;

    /// Known values per filter, from the auxiliary filter index.
    async fn list_filters(&self) -> Result<FilterValues>;

    /// Rebuilds the lexeme dictionary and the filter index.
    async fn refresh(&self) -> Result<()>;

    async fn save(&self, commit: &Commit) -> Result<()> {
        let commit = commit.clone().sanitize();
        commit.check()?;
        self.insert(&commit).await
    }

    /// Resolves free text, builds the query and executes it.
    ///
    /// Free text that resolves to no known lexeme is a `NotFound` error, not
    /// an unfiltered result set.
    async fn search(&self, request: &SearchRequest) -> Result<CommitsList> {
        request.validate()?;

        let words = lexeme::resolve(self, &request.query).await?;

        if !request.query.trim().is_empty() && words.is_empty() {
            return Err(AppError::NotFound(
                "query doesn't match any known words".to_string(),
            ));
        }

        let query = SearchQuery::for_request(request, &words)?;
        self.execute(&query).await
    }

    async fn list_filter(&self, key: FilterKey) -> Result<Vec<String>> {
        let mut filters = self.list_filters().await?;
        Ok(filters.remove(&key).unwrap_or_default())
    }
}
