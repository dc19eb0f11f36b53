use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::Commit;

/// Commit attributes that can be used as categorical filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKey {
    Repository,
    Type,
    Component,
}

impl FilterKey {
    pub const ALL: [FilterKey; 3] = [FilterKey::Repository, FilterKey::Type, FilterKey::Component];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterKey::Repository => "repository",
            FilterKey::Type => "type",
            FilterKey::Component => "component",
        }
    }

    /// Column holding this attribute in the commit table.
    pub fn column(self) -> &'static str {
        self.as_str()
    }

    pub fn value_of(self, commit: &Commit) -> &str {
        match self {
            FilterKey::Repository => &commit.repository,
            FilterKey::Type => &commit.kind,
            FilterKey::Component => &commit.component,
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repository" => Ok(FilterKey::Repository),
            "type" => Ok(FilterKey::Type),
            "component" => Ok(FilterKey::Component),
            other => Err(AppError::NotFound(format!("unknown filter `{}`", other))),
        }
    }
}

/// Accepted values per filter key.
///
/// Keys are ANDed, values within a key are ORed. Values are stored trimmed
/// and lower-cased, matching how commits are sanitized on write. Blank values
/// are dropped and a key without values is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(BTreeMap<FilterKey, BTreeSet<String>>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&mut self, key: FilterKey, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: BTreeSet<String> = values
            .into_iter()
            .map(|value| value.as_ref().trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .collect();

        if values.is_empty() {
            return;
        }

        self.0.entry(key).or_default().extend(values);
    }

    pub fn with<I, S>(mut self, key: FilterKey, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert(key, values);
        self
    }

    /// Constrained keys in a stable order, each with its accepted values.
    pub fn iter(&self) -> impl Iterator<Item = (FilterKey, &BTreeSet<String>)> {
        self.0.iter().map(|(key, values)| (*key, values))
    }
}

/// Known values of every filter, as served to filter pickers.
pub type FilterValues = BTreeMap<FilterKey, Vec<String>>;
