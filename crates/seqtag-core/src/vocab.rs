//! # Token Vocabulary
//!
//! Frequency-ordered token → id mapping. Id 0 is the `<unk>` sentinel used
//! both for unknown tokens and for window padding; real tokens get ids from
//! 1 upward, most frequent first, ties broken by first occurrence.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SeqTagError};

/// Sentinel string for unknown tokens and padding.
pub const UNK_TOKEN: &str = "<unk>";

/// Id reserved for [`UNK_TOKEN`].
pub const UNK_ID: u32 = 0;

/// Immutable token vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: Vec<String>,
}

/// On-disk form: tokens listed in id order, sentinel first.
#[derive(Serialize, Deserialize)]
struct VocabularyFile {
    tokens: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary from a token sequence.
    ///
    /// Deterministic for a given input: ids follow descending frequency with
    /// first-occurrence tie-breaking.
    pub fn build<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build_capped(tokens, None)
    }

    /// Like [`Vocabulary::build`], keeping at most `max_size` real tokens.
    /// Dropped tokens resolve to the sentinel.
    pub fn build_capped<I, S>(tokens: I, max_size: Option<usize>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // (token, count, first_seen)
        let mut counts: Vec<(String, usize, usize)> = Vec::new();
        let mut slot: HashMap<String, usize> = HashMap::new();

        for (position, token) in tokens.into_iter().enumerate() {
            let token = token.as_ref();
            if token == UNK_TOKEN {
                continue;
            }
            match slot.get(token) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    slot.insert(token.to_string(), counts.len());
                    counts.push((token.to_string(), 1, position));
                }
            }
        }

        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        if let Some(max) = max_size {
            counts.truncate(max);
        }

        let ordered = std::iter::once(UNK_TOKEN.to_string())
            .chain(counts.into_iter().map(|(token, _, _)| token))
            .collect();
        let vocab = Self::from_ordered(ordered);

        info!(size = vocab.len(), "built vocabulary");
        vocab
    }

    fn from_ordered(id_to_token: Vec<String>) -> Self {
        let token_to_id = id_to_token
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id as u32))
            .collect();
        Self {
            token_to_id,
            id_to_token,
        }
    }

    /// Id for a token; unknown tokens map to [`UNK_ID`].
    pub fn id(&self, token: &str) -> u32 {
        self.token_to_id.get(token).copied().unwrap_or(UNK_ID)
    }

    /// Token for an id, or `None` if out of range.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// Whether the token has its own (non-sentinel) id.
    pub fn contains(&self, token: &str) -> bool {
        self.id(token) != UNK_ID
    }

    /// Number of ids, sentinel included. This is the embedding input size.
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    /// True when no real token is known (only the sentinel).
    pub fn is_empty(&self) -> bool {
        self.id_to_token.len() <= 1
    }

    /// Map a token sequence to ids.
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<u32> {
        tokens.iter().map(|t| self.id(t.as_ref())).collect()
    }

    /// Tokens in id order, sentinel first.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.id_to_token
            .iter()
            .enumerate()
            .map(|(id, token)| (id as u32, token.as_str()))
    }

    pub fn to_json(&self) -> Result<String> {
        let file = VocabularyFile {
            tokens: self.id_to_token.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Rebuild a vocabulary from its JSON form, re-checking the id invariants.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: VocabularyFile = serde_json::from_str(json)?;

        match file.tokens.first() {
            Some(first) if first == UNK_TOKEN => {}
            _ => {
                return Err(SeqTagError::InvalidVocabulary(format!(
                    "id 0 must be {UNK_TOKEN}"
                )));
            }
        }

        let vocab = Self::from_ordered(file.tokens);
        if vocab.token_to_id.len() != vocab.id_to_token.len() {
            return Err(SeqTagError::InvalidVocabulary(
                "duplicate tokens".to_string(),
            ));
        }
        Ok(vocab)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|source| SeqTagError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| SeqTagError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_frequency_first_seen_order() {
        let vocab = Vocabulary::build(["The", "dog", "barks"]);
        assert_eq!(vocab.id(UNK_TOKEN), 0);
        assert_eq!(vocab.id("The"), 1);
        assert_eq!(vocab.id("dog"), 2);
        assert_eq!(vocab.id("barks"), 3);
        assert_eq!(vocab.len(), 4);
    }

    #[test]
    fn test_frequency_order() {
        let vocab = Vocabulary::build(["a", "b", "b", "c", "c", "c", "a", "d"]);
        // c:3, a:2 (first at 0), b:2 (first at 1), d:1
        assert_eq!(vocab.id("c"), 1);
        assert_eq!(vocab.id("a"), 2);
        assert_eq!(vocab.id("b"), 3);
        assert_eq!(vocab.id("d"), 4);
    }

    #[test]
    fn test_unknown_maps_to_sentinel() {
        let vocab = Vocabulary::build(["x", "y"]);
        assert_eq!(vocab.id("never-seen"), UNK_ID);
        assert!(!vocab.contains("never-seen"));
        assert!(vocab.contains("x"));
    }

    #[test]
    fn test_literal_sentinel_never_gets_real_id() {
        let vocab = Vocabulary::build(["<unk>", "<unk>", "a"]);
        assert_eq!(vocab.id("<unk>"), UNK_ID);
        assert_eq!(vocab.id("a"), 1);
        assert_eq!(vocab.len(), 2);
    }

    #[test]
    fn test_deterministic() {
        let tokens = ["to", "be", "or", "not", "to", "be"];
        let a = Vocabulary::build(tokens);
        let b = Vocabulary::build(tokens);
        assert_eq!(a, b);
    }

    #[test]
    fn test_capped() {
        let vocab = Vocabulary::build_capped(["a", "a", "b", "c"], Some(1));
        assert_eq!(vocab.id("a"), 1);
        assert_eq!(vocab.id("b"), UNK_ID);
        assert_eq!(vocab.len(), 2);
    }

    #[test]
    fn test_token_lookup_and_iter() {
        let vocab = Vocabulary::build(["x", "y"]);
        assert_eq!(vocab.token(0), Some(UNK_TOKEN));
        assert_eq!(vocab.token(2), Some("y"));
        assert_eq!(vocab.token(3), None);

        let ids: Vec<u32> = vocab.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_json_roundtrip() {
        let vocab = Vocabulary::build(["the", "cat", "the"]);
        let restored = Vocabulary::from_json(&vocab.to_json().unwrap()).unwrap();
        assert_eq!(vocab, restored);
    }

    #[test]
    fn test_json_rejects_missing_sentinel() {
        let err = Vocabulary::from_json(r#"{"tokens": ["a", "b"]}"#).unwrap_err();
        assert!(matches!(err, SeqTagError::InvalidVocabulary(_)));

        let err =
            Vocabulary::from_json(r#"{"tokens": ["<unk>", "a", "a"]}"#).unwrap_err();
        assert!(matches!(err, SeqTagError::InvalidVocabulary(_)));
    }
}
