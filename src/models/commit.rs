use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// One change record pushed by a repository's CI.
///
/// Commits are append-only: once stored they are never updated or deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Unix seconds on the wire.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub component: String,
    pub content: String,
    pub remote: String,
    pub repository: String,
    #[serde(default)]
    pub breaking: bool,
    #[serde(default)]
    pub revert: bool,
}

impl Commit {
    /// Normalizes identifying fields. Content keeps its case.
    pub fn sanitize(mut self) -> Self {
        self.hash = clean_string(&self.hash);
        self.kind = clean_string(&self.kind);
        self.component = clean_string(&self.component);
        self.content = self.content.trim().to_string();
        self.remote = clean_string(&self.remote);
        self.repository = clean_string(&self.repository);
        self
    }

    /// Verifies required fields, expecting a sanitized commit.
    pub fn check(&self) -> Result<()> {
        if self.hash.is_empty() {
            return Err(invalid("commit's hash is required (e.g. `1ab2c3f4d`)"));
        }

        if self.kind.is_empty() {
            return Err(invalid("commit's type is required (e.g. `feat`)"));
        }

        if self.content.is_empty() {
            return Err(invalid("commit's content is required (e.g. `Add README.md`)"));
        }

        if self.date.timestamp() == 0 {
            return Err(invalid("commit's date is required (e.g. `1596913344`)"));
        }

        if self.remote.is_empty() {
            return Err(invalid("repository's remote is required (e.g. `github.com`)"));
        }

        if self.repository.is_empty() {
            return Err(invalid("repository's name is required (e.g. `acme/changelog`)"));
        }

        Ok(())
    }
}

fn clean_string(s: &str) -> String {
    s.trim().to_lowercase()
}

fn invalid(msg: &str) -> AppError {
    AppError::Validation(msg.to_string())
}

/// A page of commits, newest first, with the size of the whole result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitsList {
    pub commits: Vec<Commit>,
    pub total_count: u64,
}

impl CommitsList {
    /// Cursor to request the page following this one.
    pub fn next_cursor(&self) -> Option<String> {
        self.commits
            .last()
            .map(|commit| crate::models::format_cursor(commit.date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn valid_commit() -> Commit {
        Commit {
            date: Utc.timestamp_opt(1_596_913_344, 0).unwrap(),
            hash: "1ab2c3f4d".into(),
            kind: "feat".into(),
            component: String::new(),
            content: "Add main.rs".into(),
            remote: "github.com".into(),
            repository: "acme/changelog".into(),
            breaking: false,
            revert: false,
        }
    }

    #[test]
    fn sanitize_lowercases_and_trims_identifiers() {
        let commit = Commit {
            hash: "  Hash   ".into(),
            kind: "  Type   ".into(),
            component: "  Component   ".into(),
            content: "  Content   ".into(),
            remote: "  Remote   ".into(),
            repository: "  Repository   ".into(),
            ..Default::default()
        }
        .sanitize();

        assert_eq!(commit.hash, "hash");
        assert_eq!(commit.kind, "type");
        assert_eq!(commit.component, "component");
        assert_eq!(commit.content, "Content");
        assert_eq!(commit.remote, "remote");
        assert_eq!(commit.repository, "repository");
    }

    #[test]
    fn check_reports_first_missing_field() {
        let cases: Vec<(Commit, Option<&str>)> = vec![
            (Commit::default(), Some("commit's hash is required")),
            (
                Commit { hash: String::new(), ..valid_commit() },
                Some("commit's hash is required"),
            ),
            (
                Commit { kind: String::new(), ..valid_commit() },
                Some("commit's type is required"),
            ),
            (
                Commit { content: String::new(), ..valid_commit() },
                Some("commit's content is required"),
            ),
            (
                Commit { date: DateTime::<Utc>::default(), ..valid_commit() },
                Some("commit's date is required"),
            ),
            (
                Commit { remote: String::new(), ..valid_commit() },
                Some("repository's remote is required"),
            ),
            (
                Commit { repository: String::new(), ..valid_commit() },
                Some("repository's name is required"),
            ),
            (Commit { component: String::new(), ..valid_commit() }, None),
            (valid_commit(), None),
        ];

        for (commit, want) in cases {
            match (commit.check(), want) {
                (Ok(()), None) => {}
                (Err(AppError::Validation(msg)), Some(want)) => {
                    assert!(msg.contains(want), "`{msg}` should contain `{want}`")
                }
                (got, want) => panic!("check() = {got:?}, want {want:?}"),
            }
        }
    }

    #[test]
    fn blank_content_is_rejected_after_sanitize() {
        let commit = Commit { content: "   ".into(), ..valid_commit() }.sanitize();
        assert!(matches!(commit.check(), Err(AppError::Validation(_))));
    }

    #[test]
    fn json_uses_unix_seconds_and_type_key() {
        let json = serde_json::json!({
            "hash": "abc",
            "type": "fix",
            "content": "Fix typo",
            "date": 1_596_913_344,
            "remote": "github.com",
            "repository": "acme/changelog",
        });

        let commit: Commit = serde_json::from_value(json).unwrap();
        assert_eq!(commit.kind, "fix");
        assert_eq!(commit.component, "");
        assert_eq!(commit.date.timestamp(), 1_596_913_344);
        assert!(!commit.breaking);
    }

    #[test]
    fn next_cursor_is_last_commit_date() {
        let list = CommitsList {
            commits: vec![valid_commit()],
            total_count: 10,
        };
        assert_eq!(list.next_cursor().as_deref(), Some("2020-08-08T19:02:24Z"));
        assert_eq!(CommitsList::default().next_cursor(), None);
    }

    fn arb_field() -> impl Strategy<Value = String> {
        prop::string::string_regex("[ \tA-Za-z0-9/._-]{0,12}").unwrap()
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(
            hash in arb_field(),
            kind in arb_field(),
            component in arb_field(),
            content in arb_field(),
            remote in arb_field(),
            repository in arb_field(),
            secs in 0i64..4_000_000_000,
        ) {
            let commit = Commit {
                date: Utc.timestamp_opt(secs, 0).unwrap(),
                hash, kind, component, content, remote, repository,
                breaking: false,
                revert: false,
            };

            let once = commit.sanitize();
            prop_assert_eq!(once.clone().sanitize(), once);
        }

        #[test]
        fn check_accepts_iff_required_fields_present(
            hash in arb_field(),
            kind in arb_field(),
            content in arb_field(),
            remote in arb_field(),
            repository in arb_field(),
            secs in 0i64..4_000_000_000,
        ) {
            let commit = Commit {
                date: Utc.timestamp_opt(secs, 0).unwrap(),
                hash, kind, content, remote, repository,
                ..Default::default()
            }
            .sanitize();

            let complete = !commit.hash.is_empty()
                && !commit.kind.is_empty()
                && !commit.content.is_empty()
                && secs != 0
                && !commit.remote.is_empty()
                && !commit.repository.is_empty();

            prop_assert_eq!(commit.check().is_ok(), complete);
        }
    }
}
