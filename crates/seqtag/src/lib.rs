//! # Seqtag
//!
//! Windowed LSTM sequence labelling for POS tagging and text chunking.
//!
//! ```rust
//! use seqtag::{Encoders, TokenRecord, WindowConfig};
//!
//! let records = vec![
//!     TokenRecord::new("The", "DT", "B-NP"),
//!     TokenRecord::new("dog", "NN", "I-NP"),
//!     TokenRecord::new("barks", "VBZ", "B-VP"),
//! ];
//! let encoders = Encoders::fit(&records, WindowConfig::default(), None);
//! let set = encoders.assemble(&records).unwrap();
//!
//! assert_eq!(set.len(), 3);
//! assert_eq!(&set.inputs().context[..4], &[0, 0, 1, 2]);
//! ```

pub use seqtag_core::{
    CorpusLoad, Encoders, LabelEncoder, SeqTagError, TokenRecord, TrainingSet, Vocabulary,
    WindowConfig, load_corpus,
};
pub use seqtag_trainer::{FitConfig, ModelConfig, Topology, Trainer};
