//! PostgreSQL commit store.
//!
//! Commits live in `changelog.commit` with a precomputed `search_vector`.
//! Two materialized views back the auxiliary indexes:
//! - `changelog.lexeme`: every lexeme of the search vectors, trigram-indexed
//! - `changelog.filter`: distinct (name, value) pairs for filter pickers
//!
//! Both views are refreshed together in one transaction by `refresh`.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use crate::error::{AppError, Result};
use crate::models::{Commit, CommitsList, FilterKey, FilterValues};
use crate::store::CommitStore;
use crate::store::lexeme::SIMILARITY_THRESHOLD;
use crate::store::query::{QueryParam, SearchQuery};

const INSERT_COMMIT_QUERY: &str = r#"
INSERT INTO
  changelog.commit
(
  hash,
  type,
  component,
  revert,
  breaking,
  content,
  date,
  remote,
  repository,
  search_vector
) VALUES (
  $1,
  $2,
  $3,
  $4,
  $5,
  $6,
  $7,
  $8,
  $9,
  to_tsvector('english', $1) || to_tsvector('english', $2) || to_tsvector('english', $3) || to_tsvector('english', $6)
)
"#;

const FIND_SIMILAR_WORDS_QUERY: &str = r#"
SELECT DISTINCT
  word
FROM
  changelog.lexeme
WHERE
  similarity(word, unaccent($1)) > $2
"#;

const LIST_FILTERS_QUERY: &str = r#"
SELECT
  name,
  value
FROM
  changelog.filter
ORDER BY
  name,
  value
"#;

const REFRESH_LEXEME_QUERY: &str = "REFRESH MATERIALIZED VIEW changelog.lexeme";
const REFRESH_FILTER_QUERY: &str = "REFRESH MATERIALIZED VIEW changelog.filter";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(AppError::storage("connect"))?;

        Ok(Self::new(pool))
    }

    /// Applies pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("migrate: {}", e)))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Text(value) => query.bind(value),
        QueryParam::TextArray(values) => query.bind(values),
        QueryParam::Timestamp(value) => query.bind(value),
        QueryParam::Int(value) => query.bind(value),
    }
}

fn commit_from_row(row: &PgRow) -> std::result::Result<Commit, sqlx::Error> {
    Ok(Commit {
        hash: row.try_get("hash")?,
        kind: row.try_get("type")?,
        component: row.try_get("component")?,
        revert: row.try_get("revert")?,
        breaking: row.try_get("breaking")?,
        content: row.try_get("content")?,
        date: row.try_get("date")?,
        remote: row.try_get("remote")?,
        repository: row.try_get("repository")?,
    })
}

#[async_trait]
impl CommitStore for PgStore {
    async fn insert(&self, commit: &Commit) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::storage("save commit"))?;

        sqlx::query(INSERT_COMMIT_QUERY)
            .bind(&commit.hash)
            .bind(&commit.kind)
            .bind(&commit.component)
            .bind(commit.revert)
            .bind(commit.breaking)
            .bind(&commit.content)
            .bind(commit.date)
            .bind(&commit.remote)
            .bind(&commit.repository)
            .execute(&mut *tx)
            .await
            .map_err(AppError::storage("save commit"))?;

        tx.commit().await.map_err(AppError::storage("save commit"))
    }

    async fn similar_words(&self, text: &str) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(FIND_SIMILAR_WORDS_QUERY)
            .bind(text)
            .bind(SIMILARITY_THRESHOLD)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::storage("find similar words"))
    }

    async fn execute(&self, query: &SearchQuery) -> Result<CommitsList> {
        let (sql, params) = query.render();

        let statement = params
            .iter()
            .fold(sqlx::query(&sql), |statement, param| bind_param(statement, param));

        let rows = statement
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::storage("search commits"))?;

        let mut list = CommitsList::default();
        for row in &rows {
            let full_count: i64 = row
                .try_get("full_count")
                .map_err(AppError::storage("search commits"))?;
            list.total_count = u64::try_from(full_count).unwrap_or_default();
            list.commits
                .push(commit_from_row(row).map_err(AppError::storage("search commits"))?);
        }

        Ok(list)
    }

    async fn list_filters(&self) -> Result<FilterValues> {
        let rows: Vec<(String, String)> = sqlx::query_as(LIST_FILTERS_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::storage("list filters"))?;

        let mut filters: FilterValues = FilterKey::ALL.iter().map(|key| (*key, Vec::new())).collect();
        for (name, value) in rows {
            match name.parse::<FilterKey>() {
                Ok(key) => filters.entry(key).or_default().push(value),
                Err(_) => tracing::warn!(name = %name, "ignoring unknown filter in index"),
            }
        }

        Ok(filters)
    }

    async fn refresh(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::storage("refresh"))?;

        sqlx::query(REFRESH_LEXEME_QUERY)
            .execute(&mut *tx)
            .await
            .map_err(AppError::storage("refresh lexeme"))?;

        sqlx::query(REFRESH_FILTER_QUERY)
            .execute(&mut *tx)
            .await
            .map_err(AppError::storage("refresh filter"))?;

        tx.commit().await.map_err(AppError::storage("refresh"))
    }
}
