//! Fake collaborators for pipeline tests

#![allow(dead_code)]

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use mel_core::{
    AcousticModel, AudioConfig, AudioService, Batch, DatasetSource, HoundAudio, ModelFamily,
    ModelOutput, Utterance,
};
use ndarray::{Array2, Array3, ArrayView2};

pub const N_MELS: usize = 4;
pub const N_SYMBOLS: usize = 12;

/// Deterministic mel value for utterance `g`, frame `t`, bin `m`.
pub fn mel_value(g: usize, t: usize, m: usize) -> f32 {
    g as f32 + t as f32 * 0.01 + m as f32 * 0.001
}

/// In-memory dataset. Each utterance has a fixed true mel length.
pub struct FakeDataset {
    pub utterances: Vec<(Utterance, usize)>,
    pub r: usize,
    pub with_linear: bool,
}

impl FakeDataset {
    pub fn new(root: &Path, lengths: &[(&str, usize)]) -> Self {
        let utterances = lengths
            .iter()
            .map(|(name, len)| {
                (
                    Utterance {
                        wav_path: root.join("wavs").join(format!("{name}.wav")),
                        text: format!("text for {name}"),
                        speaker: None,
                    },
                    *len,
                )
            })
            .collect();
        Self {
            utterances,
            r: 1,
            with_linear: false,
        }
    }

    pub fn with_r(mut self, r: usize) -> Self {
        self.r = r;
        self
    }

    pub fn with_linear(mut self) -> Self {
        self.with_linear = true;
        self
    }

    fn batch(&self, offset: usize, chunk: &[(Utterance, usize)]) -> Batch {
        let n = chunk.len();
        let max_len = chunk.iter().map(|(_, l)| *l).max().unwrap_or(0);
        let padded = max_len.div_ceil(self.r) * self.r;

        let mut mel = Array3::<f32>::zeros((n, padded, N_MELS));
        // padding is filled with a sentinel so any leak shows up
        mel.fill(-99.0);
        let mut stop = Array2::<f32>::ones((n, padded));
        for (i, (_, len)) in chunk.iter().enumerate() {
            for t in 0..*len {
                for m in 0..N_MELS {
                    mel[[i, t, m]] = mel_value(offset + i, t, m);
                }
                if t + 1 < *len {
                    stop[[i, t]] = 0.0;
                }
            }
        }

        // Each mel bin is the mean of two adjacent linear bins.
        let linear = self.with_linear.then(|| {
            Array3::from_shape_fn((n, padded, N_MELS * 2), |(i, t, f)| mel[[i, t, f / 2]])
        });

        Batch {
            items: chunk.iter().map(|(u, _)| u.clone()).collect(),
            text_tokens: Array2::from_elem((n, 5), 1),
            text_lengths: vec![5; n],
            mel_targets: mel,
            mel_lengths: chunk.iter().map(|(_, l)| *l).collect(),
            stop_targets: stop,
            linear_targets: linear,
            rejected: Vec::new(),
        }
    }
}

impl DatasetSource for FakeDataset {
    fn len(&self) -> usize {
        self.utterances.len()
    }

    fn num_symbols(&self) -> usize {
        N_SYMBOLS
    }

    fn outputs_per_step(&self) -> usize {
        self.r
    }

    fn batches(&self, batch_size: usize) -> Box<dyn Iterator<Item = anyhow::Result<Batch>> + '_> {
        Box::new(
            self.utterances
                .chunks(batch_size)
                .enumerate()
                .map(move |(b, chunk)| Ok(self.batch(b * batch_size, chunk))),
        )
    }
}

/// Echoes targets. The decoder output is offset by `decoder_offset` so the
/// decoder loss is known exactly.
pub struct FakeModel {
    pub family: ModelFamily,
    pub r: usize,
    pub num_symbols: usize,
    pub decoder_offset: f32,
    pub fail_on_batch: Option<usize>,
    pub calls: std::cell::Cell<usize>,
}

impl FakeModel {
    pub fn new(family: ModelFamily) -> Self {
        Self {
            family,
            r: 1,
            num_symbols: N_SYMBOLS,
            decoder_offset: 0.5,
            fail_on_batch: None,
            calls: std::cell::Cell::new(0),
        }
    }
}

impl AcousticModel for FakeModel {
    fn family(&self) -> ModelFamily {
        self.family
    }

    fn reduction_factor(&self) -> usize {
        self.r
    }

    fn num_symbols(&self) -> usize {
        self.num_symbols
    }

    fn infer(&self, batch: &Batch) -> anyhow::Result<ModelOutput> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.fail_on_batch == Some(call) {
            anyhow::bail!("size mismatch for decoder.linear_projection");
        }

        let postnet = match &batch.linear_targets {
            Some(linear) if self.family == ModelFamily::Tacotron => linear.clone(),
            _ => batch.mel_targets.clone(),
        };
        let (n, frames, _) = batch.mel_targets.dim();
        Ok(ModelOutput {
            decoder: batch.mel_targets.mapv(|v| v + self.decoder_offset),
            postnet: Some(postnet),
            alignments: Array3::zeros((n, frames / self.r, batch.text_tokens.ncols())),
            stop_tokens: batch.stop_targets.clone(),
        })
    }
}

/// Loads a fixed waveform unless the path is marked unreadable; converts
/// linear to mel by averaging bin pairs.
pub struct FakeAudio {
    pub unreadable: HashSet<PathBuf>,
    quantizer: HoundAudio,
}

impl FakeAudio {
    pub fn new() -> Self {
        Self {
            unreadable: HashSet::new(),
            quantizer: HoundAudio::new(AudioConfig::default()),
        }
    }

    pub fn with_unreadable(mut self, path: PathBuf) -> Self {
        self.unreadable.insert(path);
        self
    }
}

impl AudioService for FakeAudio {
    fn load(&self, path: &Path) -> anyhow::Result<Vec<f32>> {
        if self.unreadable.contains(path) {
            anyhow::bail!("RIFF header missing in {}", path.display());
        }
        Ok((0..64).map(|i| ((i as f32) * 0.3).sin()).collect())
    }

    fn quantize(&self, waveform: &[f32], bits: u8) -> Vec<u16> {
        self.quantizer.quantize(waveform, bits)
    }

    fn linear_to_mel(&self, linear: ArrayView2<'_, f32>) -> anyhow::Result<Array2<f32>> {
        let (frames, bins) = linear.dim();
        Ok(Array2::from_shape_fn((frames, bins / 2), |(t, m)| {
            (linear[[t, 2 * m]] + linear[[t, 2 * m + 1]]) / 2.0
        }))
    }
}

/// Names of the regular files directly inside `dir`, sorted. Empty if the
/// directory does not exist.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
