//! Lexeme resolution for fuzzy free-text search.
//!
//! Free text is never matched token by token against commits. It is first
//! resolved against a dictionary of known lexemes (rebuilt by `refresh`),
//! keeping every lexeme whose trigram similarity to the accent-folded input
//! is above `SIMILARITY_THRESHOLD`. The resulting words feed the full-text
//! predicate of the search query.
//!
//! The trigram functions follow `pg_trgm`: each word is lower-cased, padded
//! with two leading blanks and one trailing blank, and similarity is the
//! Jaccard index of the two trigram sets.

use std::collections::{BTreeSet, HashSet};

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::error::Result;
use crate::models::Commit;
use crate::store::CommitStore;

/// Minimum similarity for a lexeme to be considered a match.
pub const SIMILARITY_THRESHOLD: f32 = 0.4;

/// Resolves free text to the distinct lexemes it may refer to.
///
/// Blank text resolves to no words. An empty result for non-blank text is
/// not an error here; the caller decides what an unknown term means.
pub async fn resolve<S>(store: &S, text: &str) -> Result<Vec<String>>
where
    S: CommitStore + ?Sized,
{
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let words: BTreeSet<String> = store.similar_words(text).await?.into_iter().collect();
    Ok(words.into_iter().collect())
}

/// Strips diacritics and lower-cases.
pub fn fold_accents(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Alphanumeric words of `text`, accent-folded.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(fold_accents)
}

pub fn trigrams(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();

    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let padded: Vec<char> = format!("  {} ", word.to_lowercase()).chars().collect();
        for window in padded.windows(3) {
            out.insert(window.iter().collect());
        }
    }

    out
}

pub fn similarity(left: &str, right: &str) -> f32 {
    let left = trigrams(left);
    let right = trigrams(right);

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }

    left.intersection(&right).count() as f32 / union as f32
}

/// In-process lexeme dictionary built from stored commits.
#[derive(Debug, Clone, Default)]
pub struct LexemeIndex {
    words: BTreeSet<String>,
}

impl LexemeIndex {
    pub fn build<'a>(commits: impl IntoIterator<Item = &'a Commit>) -> Self {
        let mut words = BTreeSet::new();
        for commit in commits {
            words.extend(document_words(commit));
        }
        Self { words }
    }

    pub fn similar(&self, text: &str) -> Vec<String> {
        let folded = fold_accents(text);
        self.words
            .iter()
            .filter(|word| similarity(word, &folded) > SIMILARITY_THRESHOLD)
            .cloned()
            .collect()
    }
}

/// Words indexed for a commit: hash, type, component and content.
pub fn document_words(commit: &Commit) -> impl Iterator<Item = String> + '_ {
    [
        commit.hash.as_str(),
        commit.kind.as_str(),
        commit.component.as_str(),
        commit.content.as_str(),
    ]
    .into_iter()
    .flat_map(tokenize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigrams_match_pg_trgm_padding() {
        let got = trigrams("Cat");
        let want: HashSet<String> = ["  c", " ca", "cat", "at "].iter().map(|s| s.to_string()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("readme", "readme"), 1.0);
        assert_eq!(similarity("", "readme"), 0.0);
        assert!(similarity("readme", "reamde") < 1.0);
        assert!(similarity("licence", "license") > SIMILARITY_THRESHOLD);
        assert!(similarity("dependency", "readme") < SIMILARITY_THRESHOLD);
    }

    #[test]
    fn accents_are_folded() {
        assert_eq!(fold_accents("Créé Été"), "cree ete");
        let words: Vec<String> = tokenize("Déploiement: v1.2").collect();
        assert_eq!(words, vec!["deploiement", "v1", "2"]);
    }

    #[test]
    fn index_resolves_typos_and_ignores_noise() {
        let commit = Commit {
            hash: "abc123".into(),
            kind: "feat".into(),
            content: "Add license file".into(),
            ..Default::default()
        };
        let index = LexemeIndex::build([&commit]);

        assert_eq!(index.similar("licence"), vec!["license".to_string()]);
        assert!(index.similar("gibberish_no_match_xyz").is_empty());
    }
}
