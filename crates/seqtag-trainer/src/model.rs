//! LSTM tagger topologies built from candle layers.
//!
//! Every topology reads a window of token ids, embeds it and encodes it with
//! one or two LSTMs keeping only the final hidden state. The richer variants
//! merge a backward pass, add an independently embedded focus token, and
//! finally attach a second (chunk) head next to the POS head.

use std::fmt;
use std::str::FromStr;

use candle_core::{Device, Error, Result, Tensor};
use candle_nn::{Embedding, LSTM, LSTMConfig, Linear, Module, RNN, VarBuilder};
use serde::{Deserialize, Serialize};

/// How the forward and backward encodings are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Merge {
    Sum,
    Concat,
}

/// Available model graphs, from simplest to richest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// Window → embedding → LSTM → POS head.
    Lstm,
    /// Forward and backward LSTM merged by sum.
    BidirectionalSum,
    /// Forward and backward LSTM merged by concatenation.
    BidirectionalConcat,
    /// Bidirectional (sum) window encoding plus a focus-token embedding.
    MultiInput,
    /// Multi-input features feeding both a POS head and a chunk head.
    MultiTask,
}

impl Topology {
    pub fn all() -> &'static [Topology] {
        &[
            Topology::Lstm,
            Topology::BidirectionalSum,
            Topology::BidirectionalConcat,
            Topology::MultiInput,
            Topology::MultiTask,
        ]
    }

    pub fn merge(&self) -> Option<Merge> {
        match self {
            Topology::Lstm => None,
            Topology::BidirectionalConcat => Some(Merge::Concat),
            Topology::BidirectionalSum | Topology::MultiInput | Topology::MultiTask => {
                Some(Merge::Sum)
            }
        }
    }

    pub fn uses_focus(&self) -> bool {
        matches!(self, Topology::MultiInput | Topology::MultiTask)
    }

    pub fn predicts_chunks(&self) -> bool {
        matches!(self, Topology::MultiTask)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Lstm => write!(f, "lstm"),
            Topology::BidirectionalSum => write!(f, "bidirectional-sum"),
            Topology::BidirectionalConcat => write!(f, "bidirectional-concat"),
            Topology::MultiInput => write!(f, "multi-input"),
            Topology::MultiTask => write!(f, "multi-task"),
        }
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Topology::all()
            .iter()
            .copied()
            .find(|t| t.to_string() == s)
            .ok_or_else(|| format!("unknown topology: {s}"))
    }
}

/// Layer sizes and graph choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub topology: Topology,
    pub embedding_dim: usize,
    pub hidden_dim: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            topology: Topology::MultiTask,
            embedding_dim: 64,
            hidden_dim: 128,
        }
    }
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim.max(1);
        self
    }

    pub fn with_hidden_dim(mut self, dim: usize) -> Self {
        self.hidden_dim = dim.max(1);
        self
    }
}

/// Class counts the heads are sized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSizes {
    pub vocab_size: usize,
    pub pos_classes: usize,
    pub chunk_classes: usize,
}

/// Logits per head, each `(batch, classes)`.
#[derive(Debug)]
pub struct TaggerOutput {
    pub pos: Tensor,
    pub chunk: Option<Tensor>,
}

pub struct SequenceTagger {
    config: ModelConfig,
    context_embedding: Embedding,
    focus_embedding: Option<Embedding>,
    forward_lstm: LSTM,
    backward_lstm: Option<LSTM>,
    pos_head: Linear,
    chunk_head: Option<Linear>,
}

impl SequenceTagger {
    pub fn new(config: ModelConfig, sizes: OutputSizes, vb: VarBuilder) -> Result<Self> {
        let topology = config.topology;
        let e = config.embedding_dim;
        let h = config.hidden_dim;

        let context_embedding =
            candle_nn::embedding(sizes.vocab_size, e, vb.pp("context_embedding"))?;
        let forward_lstm = candle_nn::lstm(e, h, LSTMConfig::default(), vb.pp("lstm_forward"))?;

        let backward_lstm = match topology.merge() {
            Some(_) => Some(candle_nn::lstm(
                e,
                h,
                LSTMConfig::default(),
                vb.pp("lstm_backward"),
            )?),
            None => None,
        };

        let focus_embedding = if topology.uses_focus() {
            Some(candle_nn::embedding(sizes.vocab_size, e, vb.pp("focus_embedding"))?)
        } else {
            None
        };

        let mut features = match topology.merge() {
            Some(Merge::Concat) => 2 * h,
            _ => h,
        };
        if topology.uses_focus() {
            features += e;
        }

        let pos_head = candle_nn::linear(features, sizes.pos_classes, vb.pp("pos_head"))?;
        let chunk_head = if topology.predicts_chunks() {
            Some(candle_nn::linear(features, sizes.chunk_classes, vb.pp("chunk_head"))?)
        } else {
            None
        };

        Ok(Self {
            config,
            context_embedding,
            focus_embedding,
            forward_lstm,
            backward_lstm,
            pos_head,
            chunk_head,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// `context`: `(batch, width)` u32 ids; `focus`: `(batch, 1)` u32 ids.
    pub fn forward(&self, context: &Tensor, focus: &Tensor) -> Result<TaggerOutput> {
        let embedded = self.context_embedding.forward(context)?;
        let forward = final_hidden(&self.forward_lstm, &embedded)?;

        let encoded = match &self.backward_lstm {
            Some(lstm) => {
                let backward = final_hidden(lstm, &reverse_time(&embedded)?)?;
                match self.config.topology.merge() {
                    Some(Merge::Concat) => Tensor::cat(&[&forward, &backward], 1)?,
                    _ => forward.add(&backward)?,
                }
            }
            None => forward,
        };

        let features = match &self.focus_embedding {
            Some(embedding) => {
                let focus = embedding.forward(focus)?.flatten_from(1)?;
                Tensor::cat(&[&encoded, &focus], 1)?
            }
            None => encoded,
        };

        let pos = self.pos_head.forward(&features)?;
        let chunk = match &self.chunk_head {
            Some(head) => Some(head.forward(&features)?),
            None => None,
        };

        Ok(TaggerOutput { pos, chunk })
    }
}

/// Last hidden state of an LSTM run over `(batch, time, features)`.
fn final_hidden(lstm: &LSTM, input: &Tensor) -> Result<Tensor> {
    let states = lstm.seq(input)?;
    states
        .last()
        .map(|state| state.h().clone())
        .ok_or_else(|| Error::Msg("cannot encode an empty window".to_string()))
}

/// Reverse the time axis of a `(batch, time, features)` tensor.
fn reverse_time(input: &Tensor) -> Result<Tensor> {
    let steps = input.dim(1)?;
    let order: Vec<u32> = (0..steps as u32).rev().collect();
    let order = Tensor::from_vec(order, steps, input.device())?;
    input.index_select(&order, 1)
}

/// Build `(rows, width)` and `(rows, 1)` id tensors from flat buffers.
pub fn input_tensors(
    context: &[u32],
    focus: &[u32],
    width: usize,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let rows = focus.len();
    let context = Tensor::from_slice(context, (rows, width), device)?;
    let focus = Tensor::from_slice(focus, (rows, 1), device)?;
    Ok((context, focus))
}
