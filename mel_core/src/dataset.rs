//! LJSpeech-style dataset: `metadata.csv` plus `wavs/<id>.wav`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use ndarray::{s, Array2, Array3};
use tracing::warn;

use crate::{
    audio::HoundAudio,
    config::ModelConfig,
    error::ItemError,
    family::OutputDomain,
    services::{AudioService, DatasetSource},
    text::Vocabulary,
    types::{Batch, RejectedItem, Utterance},
};

pub const METADATA_CSV: &str = "metadata.csv";
pub const WAVS_DIR: &str = "wavs";

/// Features for one utterance before padding.
struct Features {
    tokens: Vec<i64>,
    mel: Array2<f32>,
    linear: Option<Array2<f32>>,
}

#[derive(Debug, Clone)]
pub struct MetadataDataset {
    utterances: Vec<Utterance>,
    vocab: Vocabulary,
    audio: HoundAudio,
    outputs_per_step: usize,
    with_linear: bool,
}

impl MetadataDataset {
    /// Read `<root>/metadata.csv`. Lines are `id|text[|normalized[|speaker]]`;
    /// the normalized column wins when present and non-empty.
    pub fn open<P: AsRef<Path>>(root: P, config: &ModelConfig) -> anyhow::Result<Self> {
        let root = root.as_ref();
        let csv_path = root.join(METADATA_CSV);
        let text = fs::read_to_string(&csv_path)
            .with_context(|| format!("Failed to load {}", csv_path.display()))?;

        let utterances = parse_metadata(&text, &root.join(WAVS_DIR))
            .with_context(|| format!("Malformed {}", csv_path.display()))?;
        tracing::info!("Loaded {} utterances from {}", utterances.len(), csv_path.display());

        Ok(Self::from_utterances(utterances, config))
    }

    pub fn from_utterances(utterances: Vec<Utterance>, config: &ModelConfig) -> Self {
        Self {
            utterances,
            vocab: Vocabulary::new(&config.characters, config.text_lowercase),
            audio: HoundAudio::new(config.audio.clone()),
            outputs_per_step: config.r,
            with_linear: config.family.output_domain() == OutputDomain::Linear,
        }
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    fn features(&self, utterance: &Utterance) -> Result<Features, ItemError> {
        let tokens = self.vocab.text_to_sequence(&utterance.text);
        if tokens.is_empty() {
            return Err(ItemError::UnknownSymbols(utterance.text.clone()));
        }

        let samples = self
            .audio
            .load(&utterance.wav_path)
            .map_err(|e| ItemError::Unreadable(format!("{e:#}")))?;
        let linear = self.audio.linear_spectrogram(&samples);
        if linear.nrows() == 0 {
            return Err(ItemError::Unreadable("audio is shorter than one hop".to_string()));
        }
        let mel = self
            .audio
            .linear_to_mel(linear.view())
            .map_err(|e| ItemError::Features(format!("{e:#}")))?;

        Ok(Features {
            tokens,
            mel,
            linear: self.with_linear.then_some(linear),
        })
    }

    fn build_batch(&self, chunk: &[Utterance]) -> anyhow::Result<Batch> {
        let mut items = Vec::with_capacity(chunk.len());
        let mut features = Vec::with_capacity(chunk.len());
        let mut rejected = Vec::new();

        for utterance in chunk {
            match self.features(utterance) {
                Ok(f) => {
                    items.push(utterance.clone());
                    features.push(f);
                }
                Err(error) => {
                    warn!("Skipping {}: {}", utterance.wav_path.display(), error);
                    rejected.push(RejectedItem {
                        utterance: utterance.clone(),
                        error,
                    });
                }
            }
        }

        let n_mels = self.audio.config().num_mels;
        let r = self.outputs_per_step.max(1);
        let max_text = features.iter().map(|f| f.tokens.len()).max().unwrap_or(0);
        let max_frames = features.iter().map(|f| f.mel.nrows()).max().unwrap_or(0);
        let padded = max_frames.div_ceil(r) * r;

        let mut text_tokens = Array2::<i64>::from_elem((features.len(), max_text), self.vocab.pad_id());
        let mut mel_targets = Array3::<f32>::zeros((features.len(), padded, n_mels));
        let mut stop_targets = Array2::<f32>::zeros((features.len(), padded));
        let mut linear_targets = if self.with_linear {
            let bins = features
                .iter()
                .filter_map(|f| f.linear.as_ref())
                .map(|l| l.ncols())
                .max()
                .unwrap_or(0);
            Some(Array3::<f32>::zeros((features.len(), padded, bins)))
        } else {
            None
        };

        let mut text_lengths = Vec::with_capacity(features.len());
        let mut mel_lengths = Vec::with_capacity(features.len());
        for (i, f) in features.iter().enumerate() {
            let n_tokens = f.tokens.len();
            for (j, &id) in f.tokens.iter().enumerate() {
                text_tokens[[i, j]] = id;
            }

            let frames = f.mel.nrows();
            mel_targets.slice_mut(s![i, ..frames, ..]).assign(&f.mel);
            stop_targets.slice_mut(s![i, frames.saturating_sub(1)..]).fill(1.0);
            if let (Some(targets), Some(linear)) = (linear_targets.as_mut(), f.linear.as_ref()) {
                targets
                    .slice_mut(s![i, ..frames, ..linear.ncols()])
                    .assign(linear);
            }

            text_lengths.push(n_tokens);
            mel_lengths.push(frames);
        }

        Ok(Batch {
            items,
            text_tokens,
            text_lengths,
            mel_targets,
            mel_lengths,
            stop_targets,
            linear_targets,
            rejected,
        })
    }
}

fn parse_metadata(text: &str, wav_dir: &Path) -> anyhow::Result<Vec<Utterance>> {
    let mut out = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < 2 || fields[0].trim().is_empty() {
            anyhow::bail!("line {}: expected 'id|text', got {:?}", n + 1, line);
        }
        let id = fields[0].trim();
        let text = match fields.get(2) {
            Some(normalized) if !normalized.trim().is_empty() => normalized.trim(),
            _ => fields[1].trim(),
        };
        let speaker = fields
            .get(3)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        out.push(Utterance {
            wav_path: wav_dir.join(format!("{id}.wav")),
            text: text.to_string(),
            speaker,
        });
    }
    Ok(out)
}

impl DatasetSource for MetadataDataset {
    fn len(&self) -> usize {
        self.utterances.len()
    }

    fn num_symbols(&self) -> usize {
        self.vocab.len()
    }

    fn outputs_per_step(&self) -> usize {
        self.outputs_per_step
    }

    fn batches(&self, batch_size: usize) -> Box<dyn Iterator<Item = anyhow::Result<Batch>> + '_> {
        Box::new(
            self.utterances
                .chunks(batch_size.max(1))
                .map(move |chunk| self.build_batch(chunk)),
        )
    }
}
