//! In-process commit store.
//!
//! Keeps commits in memory and evaluates `SearchQuery` predicates directly.
//! Like the PostgreSQL engine, the lexeme dictionary and the filter index are
//! snapshots that only change on `refresh`; both are swapped under a single
//! write lock so readers never see one rebuilt without the other.

use std::collections::{BTreeSet, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{Commit, CommitsList, FilterKey, FilterValues};
use crate::store::CommitStore;
use crate::store::lexeme::{LexemeIndex, document_words};
use crate::store::query::{Predicate, SearchQuery};

#[derive(Debug, Default)]
struct Snapshot {
    lexemes: LexemeIndex,
    filters: FilterValues,
}

impl Snapshot {
    fn build(commits: &[Commit]) -> Self {
        let mut filters = FilterValues::new();

        for key in FilterKey::ALL {
            let values: BTreeSet<&str> = commits
                .iter()
                .map(|commit| key.value_of(commit))
                .filter(|value| !value.is_empty())
                .collect();
            filters.insert(key, values.into_iter().map(str::to_string).collect());
        }

        Self {
            lexemes: LexemeIndex::build(commits),
            filters,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    commits: RwLock<Vec<Commit>>,
    snapshot: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_commits()?.len())
    }

    fn read_commits(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Commit>>> {
        self.commits
            .read()
            .map_err(|_| AppError::Internal("Lock poisoned".to_string()))
    }
}

fn matches(predicate: &Predicate, commit: &Commit) -> bool {
    match predicate {
        Predicate::Matches(words) => {
            let words: HashSet<&str> = words.iter().map(String::as_str).collect();
            document_words(commit).any(|word| words.contains(word.as_str()))
        }
        Predicate::AnyOf { key, values } => values.iter().any(|v| v == key.value_of(commit)),
        Predicate::Before(bound) => commit.date < *bound,
        Predicate::After(bound) => commit.date > *bound,
    }
}

#[async_trait]
impl CommitStore for MemoryStore {
    async fn insert(&self, commit: &Commit) -> Result<()> {
        self.commits
            .write()
            .map_err(|_| AppError::Internal("Lock poisoned".to_string()))?
            .push(commit.clone());
        Ok(())
    }

    async fn similar_words(&self, text: &str) -> Result<Vec<String>> {
        let snapshot = self
            .snapshot
            .read()
            .map_err(|_| AppError::Internal("Lock poisoned".to_string()))?;
        Ok(snapshot.lexemes.similar(text))
    }

    async fn execute(&self, query: &SearchQuery) -> Result<CommitsList> {
        let commits = self.read_commits()?;

        let mut found: Vec<&Commit> = commits
            .iter()
            .filter(|commit| query.predicates().iter().all(|p| matches(p, commit)))
            .collect();
        found.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(CommitsList {
            total_count: found.len() as u64,
            commits: found
                .into_iter()
                .take(query.limit() as usize)
                .cloned()
                .collect(),
        })
    }

    async fn list_filters(&self) -> Result<FilterValues> {
        let snapshot = self
            .snapshot
            .read()
            .map_err(|_| AppError::Internal("Lock poisoned".to_string()))?;
        Ok(snapshot.filters.clone())
    }

    async fn refresh(&self) -> Result<()> {
        let rebuilt = Snapshot::build(&self.read_commits()?);

        *self
            .snapshot
            .write()
            .map_err(|_| AppError::Internal("Lock poisoned".to_string()))? = rebuilt;

        tracing::debug!("in-memory lexeme and filter indexes rebuilt");
        Ok(())
    }
}
