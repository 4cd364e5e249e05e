//! hound/mel_spec backed audio service.

use std::{fs, path::Path};

use anyhow::Context;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use image::{ImageBuffer, Luma};
use mel_spec::prelude::*;
use ndarray::{Array1, Array2, ArrayView2};
use num_complex::Complex;

use crate::{config::AudioConfig, services::AudioService};

/// Feature extraction and audio I/O for a fixed set of audio parameters.
#[derive(Debug, Clone)]
pub struct HoundAudio {
    config: AudioConfig,
}

impl HoundAudio {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// STFT magnitudes, `[frames, bins]`, one frame per hop.
    pub fn linear_spectrogram(&self, samples: &[f32]) -> Array2<f32> {
        let fft_size = self.config.fft_size;
        let hop_size = self.config.hop_length;
        let mut stft = Spectrogram::new(fft_size, hop_size);

        // The STFT needs a full window before it emits; earlier hops stay empty.
        let mut frames: Vec<Option<Vec<f32>>> = Vec::new();
        let mut offset = 0usize;
        while offset + hop_size <= samples.len() {
            let slice = &samples[offset..offset + hop_size];
            let frame = stft.add(slice).map(|fft_frame| {
                fft_frame
                    .into_iter()
                    .map(|c: Complex<f64>| c.norm() as f32)
                    .collect::<Vec<f32>>()
            });
            frames.push(frame);
            offset += hop_size;
        }

        let bins = frames
            .iter()
            .flatten()
            .map(|f| f.len())
            .next()
            .unwrap_or(fft_size);

        let mut out = Array2::<f32>::zeros((frames.len(), bins));
        for (t, frame) in frames.into_iter().enumerate() {
            if let Some(frame) = frame {
                for (f, v) in frame.into_iter().take(bins).enumerate() {
                    out[[t, f]] = v;
                }
            }
        }
        out
    }

    /// Mel spectrogram, `[frames, n_mels]`. Goes through the linear
    /// spectrogram so direct and converted mels agree exactly.
    pub fn mel_spectrogram(&self, samples: &[f32]) -> anyhow::Result<Array2<f32>> {
        let linear = self.linear_spectrogram(samples);
        self.linear_to_mel(linear.view())
    }

    pub fn duration_secs(&self, samples: usize) -> f64 {
        samples as f64 / self.config.sample_rate as f64
    }

    /// Write mono f32 samples as 16-bit PCM WAV.
    pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> anyhow::Result<()> {
        let path = path.as_ref();
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

        const I16_MAX_F32: f32 = i16::MAX as f32;
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16;
            writer
                .write_sample(v)
                .map_err(|e| anyhow::anyhow!("wav sample err: {e}"))?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Render a `[x, y]` matrix (frames by bins, or decoder steps by text
    /// positions) as a grayscale PNG with low `y` at the bottom.
    pub fn save_png<P: AsRef<Path>>(path: P, matrix: ArrayView2<'_, f32>) -> anyhow::Result<()> {
        let (width, height) = matrix.dim();
        if width == 0 || height == 0 {
            anyhow::bail!("cannot render an empty {}x{} matrix", width, height);
        }

        // Normalize values per column for visibility
        let mut img = ImageBuffer::<Luma<u8>, Vec<u8>>::new(width as u32, height as u32);
        for (x, column) in matrix.rows().into_iter().enumerate() {
            let min = column.iter().cloned().fold(f32::INFINITY, f32::min);
            let max = column.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let span = if max > min { max - min } else { 1.0 };

            for (y, &v) in column.iter().enumerate() {
                let norm = ((v - min) / span * 255.0).clamp(0.0, 255.0) as u8;
                img.put_pixel(x as u32, (height - 1 - y) as u32, Luma([norm]));
            }
        }

        let mut png_bytes: Vec<u8> = Vec::new();
        {
            use image::ImageEncoder;
            let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
            encoder
                .write_image(img.as_raw(), width as u32, height as u32, image::ColorType::L8)
                .map_err(|e| anyhow::anyhow!("PNG encode failed: {e}"))?;
        }

        let path = path.as_ref();
        fs::write(path, png_bytes).with_context(|| format!("Failed to write {}", path.display()))
    }
}

impl AudioService for HoundAudio {
    fn load(&self, path: &Path) -> anyhow::Result<Vec<f32>> {
        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        if spec.sample_rate != self.config.sample_rate {
            anyhow::bail!(
                "{} is sampled at {} Hz, expected {} Hz",
                path.display(),
                spec.sample_rate,
                self.config.sample_rate
            );
        }
        let channels = spec.channels.max(1) as usize;

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Corrupt WAV data in {}", path.display()))?,
            SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()
                    .with_context(|| format!("Corrupt WAV data in {}", path.display()))?
            }
        };

        if channels > 1 {
            return Ok(samples
                .chunks(channels)
                .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
                .collect());
        }
        Ok(samples)
    }

    fn quantize(&self, waveform: &[f32], bits: u8) -> Vec<u16> {
        let levels = ((1u32 << bits.min(16)) - 1) as f32;
        waveform
            .iter()
            .map(|&x| ((x.clamp(-1.0, 1.0) + 1.0) * levels / 2.0).round().clamp(0.0, levels) as u16)
            .collect()
    }

    fn linear_to_mel(&self, linear: ArrayView2<'_, f32>) -> anyhow::Result<Array2<f32>> {
        let n_mels = self.config.num_mels;
        let mut mel = MelSpectrogram::new(
            self.config.fft_size,
            self.config.sample_rate as f64,
            n_mels,
        );

        let mut out = Array2::<f32>::zeros((linear.nrows(), n_mels));
        for (t, frame) in linear.rows().into_iter().enumerate() {
            let arr_f64: Array1<Complex<f64>> =
                Array1::from_iter(frame.iter().map(|&m| Complex::new(m as f64, 0.0)));
            let (flat, _off) = mel.add(&arr_f64).into_raw_vec_and_offset();
            if flat.len() != n_mels {
                anyhow::bail!("mel frame has {} bins, expected {}", flat.len(), n_mels);
            }
            for (m, v) in flat.into_iter().enumerate() {
                out[[t, m]] = v as f32;
            }
        }
        Ok(out)
    }
}
