//! Single-utterance synthesis for immediate inspection. Nothing is persisted.

use std::time::{Duration, Instant};

use ndarray::Array2;
use tracing::info;

use crate::{
    error::ConfigError,
    services::{TextToSpeech, Vocoder},
};

#[derive(Debug, Clone, Default)]
pub struct SynthesisOptions {
    /// Route the predicted mel through the vocoder instead of using the
    /// model's own waveform.
    pub use_vocoder: bool,
    pub style: Option<Vec<f32>>,
}

/// Everything a caller needs to play back or plot one synthesis.
#[derive(Debug, Clone)]
pub struct SynthesisReport {
    pub waveform: Vec<f32>,
    pub sample_rate: u32,
    pub mel: Array2<f32>,
    pub alignment: Array2<f32>,
    pub stop_tokens: Vec<f32>,
    pub elapsed: Duration,
    /// Wall-clock time over audio duration. Infinite for empty audio.
    pub real_time_factor: f64,
    /// Wall-clock seconds per output sample.
    pub time_per_sample: f64,
}

impl SynthesisReport {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.waveform.len() as f64 / self.sample_rate as f64
    }
}

pub struct InteractiveSynthesizer<'a> {
    model: &'a dyn TextToSpeech,
    vocoder: Option<&'a dyn Vocoder>,
    options: SynthesisOptions,
}

impl<'a> InteractiveSynthesizer<'a> {
    pub fn new(
        model: &'a dyn TextToSpeech,
        vocoder: Option<&'a dyn Vocoder>,
        options: SynthesisOptions,
    ) -> Result<Self, ConfigError> {
        if options.use_vocoder && vocoder.is_none() {
            return Err(ConfigError::Invalid(
                "use_vocoder is set but no vocoder was provided".to_string(),
            ));
        }
        Ok(Self {
            model,
            vocoder,
            options,
        })
    }

    /// Synthesize `text`. Model and vocoder errors are returned as-is.
    pub fn synthesize(&self, text: &str) -> anyhow::Result<SynthesisReport> {
        let start = Instant::now();
        let synthesis = self.model.synthesize(text, self.options.style.as_deref())?;

        let waveform = match (self.options.use_vocoder, self.vocoder) {
            (true, Some(vocoder)) => vocoder.infer(synthesis.mel.view())?,
            _ => synthesis
                .waveform
                .ok_or_else(|| anyhow::anyhow!("model produced no waveform and no vocoder is in use"))?,
        };
        let elapsed = start.elapsed();

        let sample_rate = self.model.sample_rate();
        let audio_secs = if sample_rate > 0 {
            waveform.len() as f64 / sample_rate as f64
        } else {
            0.0
        };
        let real_time_factor = if audio_secs > 0.0 {
            elapsed.as_secs_f64() / audio_secs
        } else {
            f64::INFINITY
        };
        let time_per_sample = if waveform.is_empty() {
            f64::INFINITY
        } else {
            elapsed.as_secs_f64() / waveform.len() as f64
        };
        info!(
            " > Run-time: {:.3}s, real-time factor: {:.4}, time per sample: {:.3e}s",
            elapsed.as_secs_f64(),
            real_time_factor,
            time_per_sample
        );

        Ok(SynthesisReport {
            waveform,
            sample_rate,
            mel: synthesis.mel,
            alignment: synthesis.alignment,
            stop_tokens: synthesis.stop_tokens,
            elapsed,
            real_time_factor,
            time_per_sample,
        })
    }
}
