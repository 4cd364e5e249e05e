//! Collaborator contracts consumed by the exporter and the synthesizer.
//!
//! Feature extraction, the model forward pass and dataset loading live
//! behind these traits. `mel_core` ships thin adapters over hound, mel_spec
//! and piper-rs, but the pipeline only ever sees the traits.

use std::path::Path;

use ndarray::{Array2, ArrayView2};

use crate::{
    family::ModelFamily,
    types::{Batch, ModelOutput, Synthesis},
};

pub trait AudioService {
    /// Load a mono waveform in `[-1.0, 1.0]`.
    fn load(&self, path: &Path) -> anyhow::Result<Vec<f32>>;

    /// Map samples onto `[0, 2^bits - 1]`.
    fn quantize(&self, waveform: &[f32], bits: u8) -> Vec<u16>;

    /// Project a time-major linear spectrogram `[frames, freq]` to
    /// `[frames, n_mels]`.
    fn linear_to_mel(&self, linear: ArrayView2<'_, f32>) -> anyhow::Result<Array2<f32>>;
}

/// Batch-side model capability.
pub trait AcousticModel {
    fn family(&self) -> ModelFamily;

    /// Frames emitted per decoder step.
    fn reduction_factor(&self) -> usize;

    /// Size of the symbol table the weights were trained with.
    fn num_symbols(&self) -> usize;

    /// Evaluate one batch with targets fed back as decoder inputs. Must not
    /// mutate model state.
    fn infer(&self, batch: &Batch) -> anyhow::Result<ModelOutput>;
}

pub trait DatasetSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn num_symbols(&self) -> usize;

    /// Multiple the padded mel length is rounded up to.
    fn outputs_per_step(&self) -> usize;

    /// Deterministic, unshuffled traversal. The final partial batch is kept.
    fn batches(&self, batch_size: usize) -> Box<dyn Iterator<Item = anyhow::Result<Batch>> + '_>;
}

/// Single-utterance model capability. Tokenization and padding are internal.
pub trait TextToSpeech {
    fn sample_rate(&self) -> u32;

    fn synthesize(&self, text: &str, style: Option<&[f32]>) -> anyhow::Result<Synthesis>;
}

pub trait Vocoder {
    /// Turn a `[frames, n_mels]` spectrogram into samples.
    fn infer(&self, mel: ArrayView2<'_, f32>) -> anyhow::Result<Vec<f32>>;
}
