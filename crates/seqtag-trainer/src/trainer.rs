//! Training loop for the LSTM tagger.

use std::fs;
use std::path::Path;

use anyhow::Context;
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use seqtag_core::{
    Encoders, LabelEncoder, TrainingSet, Vocabulary, WindowConfig, WindowedFeatures,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{ModelConfig, OutputSizes, SequenceTagger, input_tensors};

const WEIGHTS_FILE: &str = "model.safetensors";
const CONFIG_FILE: &str = "model.json";
const VOCAB_FILE: &str = "vocab.json";
const POS_FILE: &str = "pos_labels.json";
const CHUNK_FILE: &str = "chunk_labels.json";

/// Fit-call options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub batch_size: usize,
    pub epochs: usize,
    pub shuffle: bool,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            epochs: 5,
            shuffle: true,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

impl FitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs.max(1);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Non-positive rates fall back to the default.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = if learning_rate > 0.0 {
            learning_rate
        } else {
            Self::default().learning_rate
        };
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Loss and accuracy over one pass of a data set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Mean per-row loss (sum over heads).
    pub loss: f32,
    pub pos_accuracy: f32,
    pub chunk_accuracy: Option<f32>,
}

/// Tags predicted for one token position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub pos_tag: String,
    pub chunk_tag: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SavedConfig {
    model: ModelConfig,
    window: WindowConfig,
}

pub struct Trainer {
    model: SequenceTagger,
    varmap: VarMap,
    device: Device,
}

impl Trainer {
    pub fn new(config: ModelConfig, encoders: &Encoders) -> anyhow::Result<Self> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let sizes = OutputSizes {
            vocab_size: encoders.vocab.len(),
            pos_classes: encoders.pos.num_classes(),
            chunk_classes: encoders.chunk.num_classes(),
        };
        let model = SequenceTagger::new(config, sizes, vb).context("failed to build model")?;

        Ok(Self {
            model,
            varmap,
            device,
        })
    }

    pub fn model(&self) -> &SequenceTagger {
        &self.model
    }

    /// Train on `data`, returning metrics for every epoch.
    pub fn fit(&mut self, data: &TrainingSet, config: &FitConfig) -> anyhow::Result<Vec<Metrics>> {
        if data.is_empty() {
            anyhow::bail!("cannot fit on an empty training set");
        }

        let params = ParamsAdamW {
            lr: config.learning_rate,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(self.varmap.all_vars(), params)?;
        let mut rng = oorandom::Rand32::new(config.seed);

        info!(
            rows = data.len(),
            topology = %self.model.config().topology,
            epochs = config.epochs,
            batch_size = config.batch_size,
            "starting training"
        );

        let mut history = Vec::with_capacity(config.epochs);
        let mut order: Vec<usize> = (0..data.len()).collect();

        for epoch in 0..config.epochs {
            if config.shuffle {
                shuffle(&mut order, &mut rng);
            }

            let mut tally = Tally::default();
            for (step, rows) in order.chunks(config.batch_size).enumerate() {
                let batch = data.select(rows);
                let (loss, counts) = self.batch_loss(&batch)?;
                optimizer.backward_step(&loss)?;

                let loss = loss.to_scalar::<f32>()?;
                debug!(epoch = epoch + 1, step = step + 1, loss, "batch");
                tally.add(loss, counts);
            }

            let metrics = tally.finish();
            info!(
                epoch = epoch + 1,
                epochs = config.epochs,
                loss = metrics.loss,
                pos_accuracy = metrics.pos_accuracy,
                chunk_accuracy = ?metrics.chunk_accuracy,
                "epoch complete"
            );
            history.push(metrics);
        }

        Ok(history)
    }

    /// Loss and accuracy without updating weights.
    pub fn evaluate(&self, data: &TrainingSet, batch_size: usize) -> anyhow::Result<Metrics> {
        if data.is_empty() {
            anyhow::bail!("cannot evaluate on an empty data set");
        }

        let rows: Vec<usize> = (0..data.len()).collect();
        let mut tally = Tally::default();
        for rows in rows.chunks(batch_size.max(1)) {
            let (loss, counts) = self.batch_loss(&data.select(rows))?;
            tally.add(loss.to_scalar::<f32>()?, counts);
        }
        Ok(tally.finish())
    }

    /// Decode tags for every position of `features`.
    pub fn predict(
        &self,
        features: &WindowedFeatures,
        encoders: &Encoders,
    ) -> anyhow::Result<Vec<Prediction>> {
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let (context, focus) =
            input_tensors(&features.context, &features.focus, features.width, &self.device)?;
        let out = self.model.forward(&context, &focus)?;

        let pos = out.pos.argmax(D::Minus1)?.to_vec1::<u32>()?;
        let chunk = match out.chunk {
            Some(logits) => Some(logits.argmax(D::Minus1)?.to_vec1::<u32>()?),
            None => None,
        };

        pos.iter()
            .enumerate()
            .map(|(row, &p)| {
                let pos_tag = decode(&encoders.pos, p)?;
                let chunk_tag = match &chunk {
                    Some(chunk) => Some(decode(&encoders.chunk, chunk[row])?),
                    None => None,
                };
                Ok(Prediction { pos_tag, chunk_tag })
            })
            .collect()
    }

    /// Write weights, config and encoders into `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P, encoders: &Encoders) -> anyhow::Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        self.varmap
            .save(dir.join(WEIGHTS_FILE))
            .context("failed to save weights")?;

        let saved = SavedConfig {
            model: self.model.config().clone(),
            window: encoders.window,
        };
        fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(&saved)?)?;
        encoders.vocab.save(dir.join(VOCAB_FILE))?;
        encoders.pos.save(dir.join(POS_FILE))?;
        encoders.chunk.save(dir.join(CHUNK_FILE))?;

        info!(dir = %dir.display(), "saved model artifacts");
        Ok(())
    }

    /// Restore a trainer and its encoders from a directory written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(dir: P) -> anyhow::Result<(Self, Encoders)> {
        let dir = dir.as_ref();
        let config_path = dir.join(CONFIG_FILE);
        let saved: SavedConfig = serde_json::from_str(
            &fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?,
        )?;

        let encoders = Encoders {
            vocab: Vocabulary::load(dir.join(VOCAB_FILE))?,
            pos: LabelEncoder::load(dir.join(POS_FILE))?,
            chunk: LabelEncoder::load(dir.join(CHUNK_FILE))?,
            window: saved.window,
        };

        let mut trainer = Self::new(saved.model, &encoders)?;
        trainer
            .varmap
            .load(dir.join(WEIGHTS_FILE))
            .context("failed to load weights")?;
        Ok((trainer, encoders))
    }

    fn batch_loss(&self, batch: &TrainingSet) -> anyhow::Result<(Tensor, Counts)> {
        let inputs = batch.inputs();
        let targets = batch.targets();
        let rows = batch.len();

        let (context, focus) =
            input_tensors(&inputs.context, &inputs.focus, inputs.width, &self.device)?;
        let out = self.model.forward(&context, &focus)?;

        let pos_targets =
            Tensor::from_slice(&targets.pos, (rows, targets.pos_classes), &self.device)?;
        let mut loss = categorical_cross_entropy(&out.pos, &pos_targets)?;
        let mut counts = Counts {
            rows,
            pos_correct: correct(&out.pos, &targets.pos, targets.pos_classes)?,
            chunk_correct: None,
        };

        if let Some(chunk_logits) = &out.chunk {
            let chunk_targets =
                Tensor::from_slice(&targets.chunk, (rows, targets.chunk_classes), &self.device)?;
            loss = loss.add(&categorical_cross_entropy(chunk_logits, &chunk_targets)?)?;
            counts.chunk_correct =
                Some(correct(chunk_logits, &targets.chunk, targets.chunk_classes)?);
        }

        Ok((loss, counts))
    }
}

/// Mean of `-sum(one_hot * log_softmax(logits))` over the batch.
pub fn categorical_cross_entropy(logits: &Tensor, one_hot: &Tensor) -> candle_core::Result<Tensor> {
    let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;
    one_hot.mul(&log_probs)?.sum(1)?.mean_all()?.neg()
}

fn correct(logits: &Tensor, one_hot: &[f32], classes: usize) -> anyhow::Result<usize> {
    let predicted = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
    Ok(predicted
        .iter()
        .zip(one_hot.chunks(classes))
        .filter(|&(&p, row)| LabelEncoder::index_of(row) == Some(p as usize))
        .count())
}

fn decode(encoder: &LabelEncoder, index: u32) -> anyhow::Result<String> {
    encoder
        .decode(index as usize)
        .map(str::to_string)
        .with_context(|| format!("model produced class {index} outside the label set"))
}

fn shuffle(order: &mut [usize], rng: &mut oorandom::Rand32) {
    for i in (1..order.len()).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        order.swap(i, j);
    }
}

#[derive(Debug, Clone, Copy)]
struct Counts {
    rows: usize,
    pos_correct: usize,
    chunk_correct: Option<usize>,
}

#[derive(Debug, Default)]
struct Tally {
    /// Sum of batch means weighted by batch rows.
    loss: f32,
    rows: usize,
    pos_correct: usize,
    chunk_correct: Option<usize>,
}

impl Tally {
    fn add(&mut self, loss: f32, counts: Counts) {
        self.loss += loss * counts.rows as f32;
        self.rows += counts.rows;
        self.pos_correct += counts.pos_correct;
        if let Some(c) = counts.chunk_correct {
            *self.chunk_correct.get_or_insert(0) += c;
        }
    }

    fn finish(&self) -> Metrics {
        let ratio = |n: usize| {
            if self.rows > 0 {
                n as f32 / self.rows as f32
            } else {
                0.0
            }
        };
        Metrics {
            loss: if self.rows > 0 {
                self.loss / self.rows as f32
            } else {
                0.0
            },
            pos_accuracy: ratio(self.pos_correct),
            chunk_accuracy: self.chunk_correct.map(ratio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Topology;
    use seqtag_core::{TokenRecord, read_corpus};
    use std::io::Cursor;

    const TINY: &str = "\
The DT B-NP
dog NN I-NP
barks VBZ B-VP
. . O
A DT B-NP
cat NN I-NP
sleeps VBZ B-VP
. . O
The DT B-NP
cat NN I-NP
barks VBZ B-VP
. . O
";

    fn records() -> Vec<TokenRecord> {
        read_corpus(Cursor::new(TINY)).unwrap().records
    }

    fn small(topology: Topology) -> ModelConfig {
        ModelConfig::new()
            .with_topology(topology)
            .with_embedding_dim(8)
            .with_hidden_dim(8)
    }

    #[test]
    fn test_fit_config_clamps() {
        let cfg = FitConfig::new()
            .with_batch_size(0)
            .with_epochs(0)
            .with_learning_rate(-1.0);
        assert_eq!(cfg.batch_size, 1);
        assert_eq!(cfg.epochs, 1);
        assert_eq!(cfg.learning_rate, FitConfig::default().learning_rate);
    }

    #[test]
    fn test_cross_entropy_of_confident_prediction_is_small() {
        let dev = Device::Cpu;
        let logits = Tensor::new(&[[10f32, 0., 0.], [0., 10., 0.]], &dev).unwrap();
        let one_hot = Tensor::new(&[[1f32, 0., 0.], [0., 1., 0.]], &dev).unwrap();
        let loss = categorical_cross_entropy(&logits, &one_hot)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(loss < 0.01, "loss = {loss}");

        let wrong = Tensor::new(&[[0f32, 1., 0.], [1., 0., 0.]], &dev).unwrap();
        let loss_wrong = categorical_cross_entropy(&logits, &wrong)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(loss_wrong > 5.0);
    }

    #[test]
    fn test_tally_weights_loss_by_rows() {
        let mut tally = Tally::default();
        let full = Counts {
            rows: 3,
            pos_correct: 3,
            chunk_correct: None,
        };
        let short = Counts {
            rows: 1,
            pos_correct: 0,
            chunk_correct: None,
        };
        tally.add(1.0, full);
        tally.add(5.0, short);

        let metrics = tally.finish();
        assert!((metrics.loss - 2.0).abs() < 1e-6, "loss = {}", metrics.loss);
        assert_eq!(metrics.pos_accuracy, 0.75);
        assert_eq!(metrics.chunk_accuracy, None);
    }

    #[test]
    fn test_shuffle_is_permutation_and_seeded() {
        let mut a: Vec<usize> = (0..20).collect();
        let mut b = a.clone();
        shuffle(&mut a, &mut oorandom::Rand32::new(7));
        shuffle(&mut b, &mut oorandom::Rand32::new(7));
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_fit_reduces_loss() {
        let recs = records();
        let encoders = Encoders::fit(&recs, WindowConfig::default(), None);
        let data = encoders.assemble(&recs).unwrap();

        let mut trainer = Trainer::new(small(Topology::MultiTask), &encoders).unwrap();
        let fit = FitConfig::new()
            .with_batch_size(4)
            .with_epochs(30)
            .with_learning_rate(0.05);
        let history = trainer.fit(&data, &fit).unwrap();

        assert_eq!(history.len(), 30);
        let first = history.first().unwrap().loss;
        let last = history.last().unwrap().loss;
        assert!(last < first, "loss went from {first} to {last}");
        assert!(history.iter().all(|m| m.chunk_accuracy.is_some()));
    }

    #[test]
    fn test_single_head_has_no_chunk_metrics() {
        let recs = records();
        let encoders = Encoders::fit(&recs, WindowConfig::default(), None);
        let data = encoders.assemble(&recs).unwrap();

        let trainer = Trainer::new(small(Topology::Lstm), &encoders).unwrap();
        let metrics = trainer.evaluate(&data, 5).unwrap();
        assert!(metrics.chunk_accuracy.is_none());
        assert!((0.0..=1.0).contains(&metrics.pos_accuracy));
    }

    #[test]
    fn test_predict_decodes_labels() {
        let recs = records();
        let encoders = Encoders::fit(&recs, WindowConfig::default(), None);
        let trainer = Trainer::new(small(Topology::MultiTask), &encoders).unwrap();

        let features = encoders.features(&["The", "unicorn", "sleeps"]).unwrap();
        let predictions = trainer.predict(&features, &encoders).unwrap();
        assert_eq!(predictions.len(), 3);
        for p in &predictions {
            assert!(encoders.pos.encode(&p.pos_tag).is_ok());
            let chunk = p.chunk_tag.as_deref().unwrap();
            assert!(encoders.chunk.encode(chunk).is_ok());
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let recs = records();
        let encoders = Encoders::fit(&recs, WindowConfig::new(1, 1), None);
        let trainer = Trainer::new(small(Topology::BidirectionalConcat), &encoders).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let artifacts = dir.path().join("model");
        trainer.save(&artifacts, &encoders).unwrap();
        let (restored, restored_encoders) = Trainer::load(&artifacts).unwrap();

        assert_eq!(restored_encoders, encoders);
        assert_eq!(restored.model().config(), trainer.model().config());

        let features = encoders.features(&["The", "dog", "barks"]).unwrap();
        assert_eq!(
            trainer.predict(&features, &encoders).unwrap(),
            restored.predict(&features, &restored_encoders).unwrap()
        );
    }

    #[test]
    fn test_fit_rejects_empty() {
        let recs = records();
        let encoders = Encoders::fit(&recs, WindowConfig::default(), None);
        let full = encoders.assemble(&recs).unwrap();
        let empty = full.select(&[]);

        let mut trainer = Trainer::new(small(Topology::Lstm), &encoders).unwrap();
        assert!(trainer.fit(&empty, &FitConfig::default()).is_err());
    }
}
