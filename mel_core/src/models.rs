//! Concrete model adapters.

use std::{fs, path::Path};

use anyhow::Context;
use ndarray::{Array2, Array3};
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};

use crate::{
    audio::HoundAudio,
    config::{AudioConfig, ModelConfig},
    family::{ModelFamily, OutputDomain},
    services::{AcousticModel, TextToSpeech},
    types::{Batch, ModelOutput, Synthesis},
};

/// Replays the batch targets as predictions.
///
/// Exports ground-truth features in the layout a vocoder trainer expects,
/// and gives the pipeline a deterministic model to run against.
#[derive(Debug, Clone)]
pub struct GroundTruthModel {
    family: ModelFamily,
    r: usize,
    num_symbols: usize,
}

impl GroundTruthModel {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            family: config.family,
            r: config.r.max(1),
            num_symbols: config.num_chars,
        }
    }
}

/// Hard monotonic alignment: decoder step `k` attends to text position
/// `k * text_len / steps`.
fn diagonal_alignments(batch: &Batch, r: usize) -> Array3<f32> {
    let steps = batch.padded_frames() / r;
    let text = batch.text_tokens.ncols();
    let mut out = Array3::<f32>::zeros((batch.len(), steps, text));
    for (i, (&frames, &text_len)) in batch.mel_lengths.iter().zip(&batch.text_lengths).enumerate() {
        let item_steps = frames.div_ceil(r).min(steps);
        if item_steps == 0 || text_len == 0 {
            continue;
        }
        for k in 0..item_steps {
            out[[i, k, k * text_len / item_steps]] = 1.0;
        }
    }
    out
}

impl AcousticModel for GroundTruthModel {
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
        if batch.padded_frames() % self.r != 0 {
            anyhow::bail!(
                "padded length {} is not a multiple of r={}",
                batch.padded_frames(),
                self.r
            );
        }
        let postnet = match self.family.output_domain() {
            OutputDomain::Mel => batch.mel_targets.clone(),
            OutputDomain::Linear => batch
                .linear_targets
                .clone()
                .context("linear family needs linear targets in the batch")?,
        };

        Ok(ModelOutput {
            decoder: batch.mel_targets.clone(),
            postnet: Some(postnet),
            alignments: diagonal_alignments(batch, self.r),
            stop_tokens: batch.stop_targets.clone(),
        })
    }
}

/// A Piper ONNX voice used for interactive synthesis.
pub struct PiperVoice {
    synth: PiperSpeechSynthesizer,
    audio: HoundAudio,
}

// Manual Debug implementation since PiperSpeechSynthesizer doesn't implement Debug
impl std::fmt::Debug for PiperVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiperVoice")
            .field("synth", &"<PiperSpeechSynthesizer>")
            .field("audio", &self.audio)
            .finish()
    }
}

impl PiperVoice {
    /// Load a voice from its `.onnx.json` config. Mel diagnostics use the
    /// voice's sample rate with the remaining `features` parameters.
    pub fn from_config_path<P: AsRef<Path>>(cfg_path: P, features: AudioConfig) -> anyhow::Result<Self> {
        let sample_rate = read_sample_rate(&cfg_path)?;
        let model = piper_rs::from_config_path(cfg_path.as_ref())
            .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
        let synth = PiperSpeechSynthesizer::new(model)?;
        Ok(Self {
            synth,
            audio: HoundAudio::new(AudioConfig {
                sample_rate,
                ..features
            }),
        })
    }
}

/// Read sample rate from a Piper voice config JSON
fn read_sample_rate<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<u32> {
    let text = fs::read_to_string(cfg_path.as_ref())
        .with_context(|| format!("Failed to read config file: {}", cfg_path.as_ref().display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| "Config file is not valid JSON")?;

    let sample_rate = json
        .get("audio")
        .and_then(|a| a.get("sample_rate"))
        .and_then(|sr| sr.as_u64())
        .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;

    Ok(sample_rate as u32)
}

impl TextToSpeech for PiperVoice {
    fn sample_rate(&self) -> u32 {
        self.audio.config().sample_rate
    }

    fn synthesize(&self, text: &str, style: Option<&[f32]>) -> anyhow::Result<Synthesis> {
        if style.is_some() {
            tracing::warn!("Piper voices take no style vector; ignoring it");
        }

        let iter: PiperSpeechStreamParallel = self
            .synth
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))?;

        let mut samples: Vec<f32> = Vec::new();
        for part in iter {
            samples.extend(
                part.map_err(|e| anyhow::anyhow!("chunk error: {e}"))?
                    .into_vec(),
            );
        }

        // Piper decodes straight to audio; the mel is derived for inspection.
        let mel = self.audio.mel_spectrogram(&samples)?;
        Ok(Synthesis {
            waveform: Some(samples),
            mel,
            alignment: Array2::zeros((0, 0)),
            stop_tokens: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Utterance;
    use std::path::PathBuf;

    fn batch(mel_lengths: Vec<usize>, padded: usize, with_linear: bool) -> Batch {
        let n = mel_lengths.len();
        Batch {
            items: (0..n)
                .map(|i| Utterance {
                    wav_path: PathBuf::from(format!("{i}.wav")),
                    text: "ab".into(),
                    speaker: None,
                })
                .collect(),
            text_tokens: Array2::zeros((n, 4)),
            text_lengths: vec![4; n],
            mel_targets: Array3::from_elem((n, padded, 3), 0.5),
            mel_lengths,
            stop_targets: Array2::zeros((n, padded)),
            linear_targets: with_linear.then(|| Array3::from_elem((n, padded, 7), 0.25)),
            rejected: Vec::new(),
        }
    }

    fn model(family: ModelFamily, r: usize) -> GroundTruthModel {
        GroundTruthModel {
            family,
            r,
            num_symbols: 10,
        }
    }

    #[test]
    fn test_mel_family_echoes_mel_targets() {
        let b = batch(vec![4, 2], 4, false);
        let out = model(ModelFamily::Tacotron2, 2).infer(&b).unwrap();
        assert_eq!(out.decoder, b.mel_targets);
        assert_eq!(out.postnet.unwrap(), b.mel_targets);
        assert_eq!(out.alignments.dim(), (2, 2, 4));
    }

    #[test]
    fn test_linear_family_emits_linear_postnet() {
        let b = batch(vec![3], 3, true);
        let out = model(ModelFamily::Tacotron, 1).infer(&b).unwrap();
        assert_eq!(out.postnet.unwrap().dim(), (1, 3, 7));

        let no_linear = batch(vec![3], 3, false);
        assert!(model(ModelFamily::Tacotron, 1).infer(&no_linear).is_err());
    }

    #[test]
    fn test_rejects_padding_not_multiple_of_r() {
        let b = batch(vec![3], 3, false);
        assert!(model(ModelFamily::Tacotron2, 2).infer(&b).is_err());
    }

    #[test]
    fn test_alignment_is_monotonic() {
        let b = batch(vec![8], 8, false);
        let align = diagonal_alignments(&b, 1);
        let positions: Vec<usize> = (0..8)
            .map(|k| (0..4).find(|&j| align[[0, k, j]] == 1.0).unwrap())
            .collect();
        assert_eq!(positions, vec![0, 0, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_read_sample_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.onnx.json");
        fs::write(&path, r#"{"audio": {"sample_rate": 22050}}"#).unwrap();
        assert_eq!(read_sample_rate(&path).unwrap(), 22050);

        fs::write(&path, r#"{"audio": {}}"#).unwrap();
        assert!(read_sample_rate(&path).is_err());
    }
}
