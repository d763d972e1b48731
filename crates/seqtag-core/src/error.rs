use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading and vectorizing a tagged corpus.
#[derive(Debug, Error)]
pub enum SeqTagError {
    /// The corpus (or an artifact file) could not be opened or read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A reader-backed corpus failed mid-stream.
    #[error("corpus read error: {0}")]
    Read(#[from] std::io::Error),

    /// The corpus contained no well-formed lines.
    #[error("corpus contains no well-formed records")]
    EmptyCorpus,

    /// A label was not seen when the encoder was fitted.
    #[error("unknown label: {0:?}")]
    UnknownLabel(String),

    /// A class index outside `0..num_classes` was requested.
    #[error("class index {index} out of range for {num_classes} classes")]
    ClassIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of classes known to the encoder.
        num_classes: usize,
    },

    /// Two channels that must share a row count disagree.
    #[error("shape mismatch in {channel}: expected {expected} rows, got {actual}")]
    ShapeMismatch {
        /// Name of the offending channel.
        channel: &'static str,
        /// Expected row count.
        expected: usize,
        /// Actual row count.
        actual: usize,
    },

    /// A persisted vocabulary violates the id invariants.
    #[error("invalid vocabulary: {0}")]
    InvalidVocabulary(String),

    /// A persisted label set violates the class invariants.
    #[error("invalid label set: {0}")]
    InvalidLabels(String),

    /// A window side exceeds [`MAX_WINDOW_SIDE`](crate::window::MAX_WINDOW_SIDE).
    #[error("window of {left_size} left / {right_size} right tokens is too wide")]
    InvalidWindow {
        /// Requested left context.
        left_size: usize,
        /// Requested right context.
        right_size: usize,
    },

    /// JSON (de)serialization of an artifact failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for seqtag operations.
pub type Result<T> = std::result::Result<T, SeqTagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = SeqTagError::EmptyCorpus;
        assert_eq!(err.to_string(), "corpus contains no well-formed records");

        let err = SeqTagError::UnknownLabel("B-XYZ".into());
        assert!(err.to_string().contains("B-XYZ"));

        let err = SeqTagError::ClassIndexOutOfRange {
            index: 7,
            num_classes: 3,
        };
        assert_eq!(err.to_string(), "class index 7 out of range for 3 classes");
    }

    #[test]
    fn io_error_names_path() {
        let err = SeqTagError::Io {
            path: PathBuf::from("data/train.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("data/train.txt"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SeqTagError>();
    }
}
