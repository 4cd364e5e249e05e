//! Mel-spectrogram export for vocoder training, plus single-utterance
//! synthesis for inspection.
//!
//! [`BatchExportPipeline`] drives a [`DatasetSource`] through an
//! [`AcousticModel`], strips batch padding and writes one mel matrix per
//! utterance together with the manifests a vocoder trainer reads.
//! [`InteractiveSynthesizer`] runs one text through a [`TextToSpeech`] model
//! and an optional [`Vocoder`].

pub mod audio;
pub mod config;
pub mod dataset;
pub mod error;
pub mod family;
pub mod loss;
pub mod manifest;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod synth;
pub mod text;
pub mod types;

pub use audio::HoundAudio;
pub use config::{AudioConfig, CharacterConfig, ModelConfig, RunConfiguration};
pub use dataset::MetadataDataset;
pub use error::{ConfigError, ExportError, ItemError, ItemFailure};
pub use family::{LinearToMel, MelPassthrough, ModelFamily, OutputConverter, OutputDomain};
pub use manifest::{ExportRecord, ManifestPaths, OutputLayout};
pub use models::{GroundTruthModel, PiperVoice};
pub use pipeline::{BatchExportPipeline, ExportSummary};
pub use services::{AcousticModel, AudioService, DatasetSource, TextToSpeech, Vocoder};
pub use synth::{InteractiveSynthesizer, SynthesisOptions, SynthesisReport};
pub use text::Vocabulary;
pub use types::{Batch, ModelOutput, RejectedItem, Synthesis, Utterance};
