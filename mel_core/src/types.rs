//! Data passed between the dataset, the model and the exporter.

use std::path::PathBuf;

use ndarray::{Array2, Array3};

use crate::error::ItemError;

/// One training example as enumerated by a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub wav_path: PathBuf,
    pub text: String,
    pub speaker: Option<String>,
}

/// An utterance the dataset could not turn into features.
#[derive(Debug, Clone)]
pub struct RejectedItem {
    pub utterance: Utterance,
    pub error: ItemError,
}

/// A group of utterances padded to common lengths.
///
/// Mel and linear tensors are time-major: `[batch, frames, bins]`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub items: Vec<Utterance>,
    pub text_tokens: Array2<i64>,
    pub text_lengths: Vec<usize>,
    pub mel_targets: Array3<f32>,
    /// True, unpadded frame count of each item.
    pub mel_lengths: Vec<usize>,
    pub stop_targets: Array2<f32>,
    pub linear_targets: Option<Array3<f32>>,
    pub rejected: Vec<RejectedItem>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Padded frame count shared by every item.
    pub fn padded_frames(&self) -> usize {
        self.mel_targets.shape()[1]
    }

    pub fn num_mels(&self) -> usize {
        self.mel_targets.shape()[2]
    }
}

/// What an acoustic model returns for one batch.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Pre-refinement mel frames, `[batch, frames, n_mels]`.
    pub decoder: Array3<f32>,
    /// Post-refinement frames. Linear-domain for linear model families.
    pub postnet: Option<Array3<f32>>,
    /// Attention weights, `[batch, decoder_steps, text_len]`.
    pub alignments: Array3<f32>,
    pub stop_tokens: Array2<f32>,
}

/// Single-utterance synthesis result.
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// Waveform produced by the model itself, if it produces one.
    pub waveform: Option<Vec<f32>>,
    /// Predicted mel spectrogram, `[frames, n_mels]`.
    pub mel: Array2<f32>,
    /// `[decoder_steps, text_len]`
    pub alignment: Array2<f32>,
    pub stop_tokens: Vec<f32>,
}
