//! # Seqtag Core
//!
//! Data preparation for windowed sequence labelling: CoNLL-style corpus
//! loading, frequency-ordered vocabularies, sliding context windows and
//! one-hot label encoding.
//!
//! ## Quick Start
//!
//! ```rust
//! use seqtag_core::{Vocabulary, WindowConfig};
//!
//! let tokens = ["The", "dog", "barks"];
//! let vocab = Vocabulary::build(tokens);
//! let features = WindowConfig::default().windowize(&tokens, &vocab).unwrap();
//!
//! assert_eq!(features.window(0), Some(&[0, 0, 1, 2][..]));
//! assert_eq!(features.focus, vec![1, 2, 3]);
//! ```
pub mod corpus;
pub mod dataset;
pub mod error;
pub mod labels;
pub mod vocab;
pub mod window;

// Re-export primary API
pub use corpus::{CorpusLoad, TokenRecord, load_corpus, read_corpus};
pub use dataset::{Encoders, ModelInputs, ModelTargets, TrainingSet};
pub use error::{Result, SeqTagError};
pub use labels::LabelEncoder;
pub use vocab::{UNK_ID, UNK_TOKEN, Vocabulary};
pub use window::{MAX_WINDOW_SIDE, WindowConfig, WindowedFeatures, focus_ids};
