//! # Corpus Loader
//!
//! Reads CoNLL-style chunking data: one `token pos_tag chunk_tag` triple per
//! line. Blank lines and lines that do not split into exactly three fields
//! are skipped and counted; everything else is kept in file order.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SeqTagError};

/// One tagged token from the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Surface form of the token.
    pub token: String,
    /// Part-of-speech tag (e.g. `NN`).
    pub pos_tag: String,
    /// Chunk tag in BIO form (e.g. `B-NP`).
    pub chunk_tag: String,
}

impl TokenRecord {
    pub fn new(
        token: impl Into<String>,
        pos_tag: impl Into<String>,
        chunk_tag: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            pos_tag: pos_tag.into(),
            chunk_tag: chunk_tag.into(),
        }
    }

    /// Parse a single corpus line. Returns `None` unless the line has exactly
    /// three whitespace-separated fields.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let token = fields.next()?;
        let pos_tag = fields.next()?;
        let chunk_tag = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self::new(token, pos_tag, chunk_tag))
    }
}

/// Outcome of loading a corpus: the records plus skip diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusLoad {
    pub records: Vec<TokenRecord>,
    /// Blank (whitespace-only) lines, typically sentence separators.
    pub blank_lines: usize,
    /// Non-blank lines without exactly three fields.
    pub malformed_lines: usize,
}

impl CorpusLoad {
    /// Total number of lines that did not produce a record.
    pub fn skipped(&self) -> usize {
        self.blank_lines + self.malformed_lines
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Token column, in corpus order.
    pub fn tokens(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.token.as_str()).collect()
    }

    /// POS tag column, in corpus order.
    pub fn pos_tags(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.pos_tag.as_str()).collect()
    }

    /// Chunk tag column, in corpus order.
    pub fn chunk_tags(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.chunk_tag.as_str()).collect()
    }

    /// Split the records into a leading and a trailing part, keeping order.
    ///
    /// `fraction` is the share that goes to the trailing part and is clamped
    /// to `[0.0, 1.0]`.
    pub fn split_at_fraction(&self, fraction: f32) -> (&[TokenRecord], &[TokenRecord]) {
        let fraction = fraction.clamp(0.0, 1.0);
        let tail = (self.records.len() as f32 * fraction).round() as usize;
        self.records.split_at(self.records.len() - tail.min(self.records.len()))
    }
}

/// Load a corpus from a file.
///
/// # Errors
///
/// Returns `SeqTagError::Io` if the file cannot be opened or read (including
/// invalid UTF-8). Malformed lines are never errors.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<CorpusLoad> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| SeqTagError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let load = read_corpus(BufReader::new(file)).map_err(|err| match err {
        SeqTagError::Read(source) => SeqTagError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;

    debug!(
        path = %path.display(),
        records = load.records.len(),
        blank = load.blank_lines,
        malformed = load.malformed_lines,
        "loaded corpus"
    );
    Ok(load)
}

/// Load a corpus from any buffered reader.
pub fn read_corpus<R: BufRead>(reader: R) -> Result<CorpusLoad> {
    let mut load = CorpusLoad::default();

    for line in reader.lines() {
        let line = line?;

        if line.trim().is_empty() {
            load.blank_lines += 1;
            continue;
        }

        match TokenRecord::parse_line(&line) {
            Some(record) => load.records.push(record),
            None => load.malformed_lines += 1,
        }
    }

    if load.malformed_lines > 0 {
        warn!(
            malformed = load.malformed_lines,
            "skipped corpus lines without exactly three fields"
        );
    }

    Ok(load)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read(text: &str) -> CorpusLoad {
        read_corpus(Cursor::new(text)).unwrap()
    }

    #[test]
    fn test_parse_line() {
        let r = TokenRecord::parse_line("Confidence NN B-NP").unwrap();
        assert_eq!(r, TokenRecord::new("Confidence", "NN", "B-NP"));

        let r = TokenRecord::parse_line("  the\tDT   I-NP ").unwrap();
        assert_eq!(r.token, "the");
        assert_eq!(r.chunk_tag, "I-NP");
    }

    #[test]
    fn test_parse_line_wrong_field_count() {
        assert!(TokenRecord::parse_line("badtoken XX").is_none());
        assert!(TokenRecord::parse_line("a b c d").is_none());
        assert!(TokenRecord::parse_line("").is_none());
    }

    #[test]
    fn test_read_keeps_order() {
        let load = read("The DT B-NP\ndog NN I-NP\nbarks VBZ B-VP\n");
        assert_eq!(load.len(), 3);
        assert_eq!(load.tokens(), vec!["The", "dog", "barks"]);
        assert_eq!(load.pos_tags(), vec!["DT", "NN", "VBZ"]);
        assert_eq!(load.chunk_tags(), vec!["B-NP", "I-NP", "B-VP"]);
        assert_eq!(load.skipped(), 0);
    }

    #[test]
    fn test_read_skips_malformed_and_blank() {
        let load = read("The DT B-NP\n\nbadtoken XX\ndog NN I-NP\n   \nx y z w\n");
        assert_eq!(load.tokens(), vec!["The", "dog"]);
        assert_eq!(load.blank_lines, 2);
        assert_eq!(load.malformed_lines, 2);
        assert_eq!(load.skipped(), 4);
    }

    #[test]
    fn test_read_empty() {
        let load = read("");
        assert!(load.is_empty());
        assert_eq!(load.skipped(), 0);
    }

    #[test]
    fn test_read_invalid_utf8_is_error() {
        let bytes: &[u8] = b"ok NN B-NP\n\xff\xfe NN O\n";
        assert!(read_corpus(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_corpus("definitely/not/here/train.txt").unwrap_err();
        assert!(matches!(err, SeqTagError::Io { .. }));
    }

    #[test]
    fn test_split_at_fraction() {
        let load = read("a A O\nb B O\nc C O\nd D O\ne E O\n");
        let (train, valid) = load.split_at_fraction(0.2);
        assert_eq!(train.len(), 4);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].token, "e");

        let (train, valid) = load.split_at_fraction(0.0);
        assert_eq!(train.len(), 5);
        assert!(valid.is_empty());

        let (train, valid) = load.split_at_fraction(3.0);
        assert!(train.is_empty());
        assert_eq!(valid.len(), 5);
    }
}
