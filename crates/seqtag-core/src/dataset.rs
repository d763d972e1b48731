//! # Training Set Assembly
//!
//! Bundles windowed features and one-hot targets into named channels that a
//! model consumes directly.

use tracing::debug;

use crate::corpus::TokenRecord;
use crate::error::{Result, SeqTagError};
use crate::labels::LabelEncoder;
use crate::vocab::Vocabulary;
use crate::window::{WindowConfig, WindowedFeatures};

/// Input channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
    /// `rows * width` window ids.
    pub context: Vec<u32>,
    /// One focus id per row.
    pub focus: Vec<u32>,
    pub width: usize,
}

/// One-hot target channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTargets {
    /// `rows * pos_classes` values.
    pub pos: Vec<f32>,
    pub pos_classes: usize,
    /// `rows * chunk_classes` values.
    pub chunk: Vec<f32>,
    pub chunk_classes: usize,
}

/// Encoders shared by every split of a corpus.
///
/// Built once from the training records and only read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoders {
    pub vocab: Vocabulary,
    pub pos: LabelEncoder,
    pub chunk: LabelEncoder,
    pub window: WindowConfig,
}

impl Encoders {
    pub fn fit(records: &[TokenRecord], window: WindowConfig, max_vocab: Option<usize>) -> Self {
        let vocab = Vocabulary::build_capped(records.iter().map(|r| r.token.as_str()), max_vocab);
        let pos = LabelEncoder::fit(records.iter().map(|r| r.pos_tag.as_str()));
        let chunk = LabelEncoder::fit(records.iter().map(|r| r.chunk_tag.as_str()));
        debug!(
            vocab = vocab.len(),
            pos_classes = pos.num_classes(),
            chunk_classes = chunk.num_classes(),
            "fitted encoders"
        );
        Self {
            vocab,
            pos,
            chunk,
            window,
        }
    }

    /// Vectorize tokens only (no targets needed).
    pub fn features<S: AsRef<str>>(&self, tokens: &[S]) -> Result<WindowedFeatures> {
        self.window.windowize(tokens, &self.vocab)
    }

    /// Vectorize a split into a [`TrainingSet`].
    ///
    /// # Errors
    ///
    /// `SeqTagError::EmptyCorpus` for an empty split, `SeqTagError::UnknownLabel`
    /// if a record carries a tag the encoders were not fitted on,
    /// `SeqTagError::InvalidWindow` for an oversized window.
    pub fn assemble(&self, records: &[TokenRecord]) -> Result<TrainingSet> {
        if records.is_empty() {
            return Err(SeqTagError::EmptyCorpus);
        }

        let tokens: Vec<&str> = records.iter().map(|r| r.token.as_str()).collect();
        let features = self.features(&tokens)?;

        let pos_idx = records
            .iter()
            .map(|r| self.pos.encode(&r.pos_tag))
            .collect::<Result<Vec<_>>>()?;
        let chunk_idx = records
            .iter()
            .map(|r| self.chunk.encode(&r.chunk_tag))
            .collect::<Result<Vec<_>>>()?;

        TrainingSet::new(
            ModelInputs {
                context: features.context,
                focus: features.focus,
                width: features.width,
            },
            ModelTargets {
                pos: self.pos.one_hot_batch(&pos_idx)?,
                pos_classes: self.pos.num_classes(),
                chunk: self.chunk.one_hot_batch(&chunk_idx)?,
                chunk_classes: self.chunk.num_classes(),
            },
        )
    }
}

/// Inputs and targets with a shared row count.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    inputs: ModelInputs,
    targets: ModelTargets,
    rows: usize,
}

impl TrainingSet {
    /// # Errors
    ///
    /// `SeqTagError::ShapeMismatch` when channels disagree on the row count.
    pub fn new(inputs: ModelInputs, targets: ModelTargets) -> Result<Self> {
        let rows = inputs.focus.len();
        check_rows("context", rows * inputs.width, inputs.context.len())?;
        check_rows("pos", rows * targets.pos_classes, targets.pos.len())?;
        check_rows("chunk", rows * targets.chunk_classes, targets.chunk.len())?;
        Ok(Self {
            inputs,
            targets,
            rows,
        })
    }

    pub fn inputs(&self) -> &ModelInputs {
        &self.inputs
    }

    pub fn targets(&self) -> &ModelTargets {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Copy the given rows into a new, smaller set (used for mini-batches).
    pub fn select(&self, rows: &[usize]) -> TrainingSet {
        let w = self.inputs.width;
        let p = self.targets.pos_classes;
        let c = self.targets.chunk_classes;

        let mut out = TrainingSet {
            inputs: ModelInputs {
                context: Vec::with_capacity(rows.len() * w),
                focus: Vec::with_capacity(rows.len()),
                width: w,
            },
            targets: ModelTargets {
                pos: Vec::with_capacity(rows.len() * p),
                pos_classes: p,
                chunk: Vec::with_capacity(rows.len() * c),
                chunk_classes: c,
            },
            rows: rows.len(),
        };

        for &row in rows {
            out.inputs
                .context
                .extend_from_slice(&self.inputs.context[row * w..(row + 1) * w]);
            out.inputs.focus.push(self.inputs.focus[row]);
            out.targets
                .pos
                .extend_from_slice(&self.targets.pos[row * p..(row + 1) * p]);
            out.targets
                .chunk
                .extend_from_slice(&self.targets.chunk[row * c..(row + 1) * c]);
        }

        out
    }
}

fn check_rows(channel: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(SeqTagError::ShapeMismatch {
            channel,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<TokenRecord> {
        vec![
            TokenRecord::new("The", "DT", "B-NP"),
            TokenRecord::new("dog", "NN", "I-NP"),
            TokenRecord::new("barks", "VBZ", "B-VP"),
        ]
    }

    #[test]
    fn test_assemble_shapes() {
        let recs = records();
        let enc = Encoders::fit(&recs, WindowConfig::default(), None);
        let set = enc.assemble(&recs).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.inputs().width, 4);
        assert_eq!(set.inputs().context.len(), 12);
        assert_eq!(&set.inputs().context[..4], &[0, 0, 1, 2]);
        assert_eq!(set.inputs().focus, vec![1, 2, 3]);
        assert_eq!(set.targets().pos_classes, 3);
        assert_eq!(set.targets().pos.len(), 9);
        assert_eq!(set.targets().chunk_classes, 3);
    }

    #[test]
    fn test_assemble_unseen_label_fails() {
        let enc = Encoders::fit(&records(), WindowConfig::default(), None);
        let err = enc
            .assemble(&[TokenRecord::new("cat", "NNS", "B-NP")])
            .unwrap_err();
        assert!(matches!(err, SeqTagError::UnknownLabel(_)));
    }

    #[test]
    fn test_assemble_unseen_token_uses_sentinel() {
        let enc = Encoders::fit(&records(), WindowConfig::default(), None);
        let set = enc.assemble(&[TokenRecord::new("cat", "NN", "B-NP")]).unwrap();
        assert_eq!(set.inputs().focus, vec![0]);
    }

    #[test]
    fn test_assemble_empty() {
        let enc = Encoders::fit(&records(), WindowConfig::default(), None);
        assert!(matches!(enc.assemble(&[]), Err(SeqTagError::EmptyCorpus)));
    }

    #[test]
    fn test_assemble_oversized_window_fails() {
        let recs = records();
        let enc = Encoders::fit(&recs, WindowConfig::new(2, usize::MAX), None);
        assert!(matches!(
            enc.assemble(&recs),
            Err(SeqTagError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let err = TrainingSet::new(
            ModelInputs {
                context: vec![0; 7],
                focus: vec![0, 0],
                width: 4,
            },
            ModelTargets {
                pos: vec![1.0, 0.0, 0.0, 1.0],
                pos_classes: 2,
                chunk: vec![1.0, 1.0],
                chunk_classes: 1,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SeqTagError::ShapeMismatch {
                channel: "context",
                expected: 8,
                actual: 7
            }
        ));
    }

    #[test]
    fn test_select_rows() {
        let recs = records();
        let enc = Encoders::fit(&recs, WindowConfig::default(), None);
        let set = enc.assemble(&recs).unwrap();

        let batch = set.select(&[2, 0]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.inputs().focus, vec![3, 1]);
        assert_eq!(&batch.inputs().context[4..], &[0, 0, 1, 2]);
        assert_eq!(batch.targets().pos.len(), 6);
    }
}
