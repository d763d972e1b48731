//! # Seqtag Trainer
//!
//! LSTM tagger topologies over windowed token ids and the loop that fits
//! them: single LSTM, bidirectional merges, an extra focus-token input and
//! a multi-task head predicting POS and chunk tags together.

pub mod cli;
pub mod model;
pub mod trainer;

pub use model::{Merge, ModelConfig, OutputSizes, SequenceTagger, TaggerOutput, Topology};
pub use trainer::{FitConfig, Metrics, Prediction, Trainer, categorical_cross_entropy};
