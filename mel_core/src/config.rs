// Run and model configuration

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, family::ModelFamily};

/// Largest quantization depth that still fits the `u16` artifact dtype.
pub const MAX_QUANTIZE_BITS: u8 = 16;

/// Knobs fixed before an export pass starts. Never mutated during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    pub output_root: PathBuf,
    pub dataset_root: PathBuf,
    pub batch_size: usize,
    /// `Some(bits)` enables waveform quantization at that depth.
    pub quantize_bits: Option<u8>,
    /// Compute losses only; write nothing to disk.
    pub dry_run: bool,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            dataset_root: PathBuf::from("data"),
            batch_size: 32,
            quantize_bits: None,
            dry_run: false,
        }
    }
}

impl RunConfiguration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch size must be at least 1".to_string()));
        }
        if let Some(bits) = self.quantize_bits {
            if bits == 0 || bits > MAX_QUANTIZE_BITS {
                return Err(ConfigError::Invalid(format!(
                    "quantize bits must be between 1 and {}, got {}",
                    MAX_QUANTIZE_BITS, bits
                )));
            }
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output root cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Symbol set the checkpoint was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterConfig {
    #[serde(default = "default_pad")]
    pub pad: String,
    #[serde(default = "default_eos")]
    pub eos: String,
    #[serde(default = "default_bos")]
    pub bos: String,
    pub characters: String,
    #[serde(default = "default_punctuations")]
    pub punctuations: String,
}

fn default_pad() -> String {
    "_".to_string()
}

fn default_eos() -> String {
    "~".to_string()
}

fn default_bos() -> String {
    "^".to_string()
}

fn default_punctuations() -> String {
    "!'(),-.:;? ".to_string()
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            pad: default_pad(),
            eos: default_eos(),
            bos: default_bos(),
            characters: "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz".to_string(),
            punctuations: default_punctuations(),
        }
    }
}

/// Feature extraction parameters shared by dataset and model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub fft_size: usize,
    pub hop_length: usize,
    pub num_mels: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            fft_size: 1024,
            hop_length: 256,
            num_mels: 80,
        }
    }
}

/// Checkpoint metadata: everything the exporter must agree on with the
/// loaded weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub family: ModelFamily,
    /// Rows of the checkpoint's character embedding.
    pub num_chars: usize,
    /// Frames decoded per step.
    #[serde(default = "default_r")]
    pub r: usize,
    #[serde(default)]
    pub characters: CharacterConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub text_lowercase: bool,
}

fn default_r() -> usize {
    1
}

impl ModelConfig {
    /// Load and validate a model config JSON file.
    pub fn from_path<P: AsRef<Path>>(p: P) -> Result<Self, ConfigError> {
        let path = p.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: ModelConfig = serde_json::from_str(&text).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: format!("not a valid model config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.r == 0 {
            return Err(ConfigError::Invalid("reduction factor r must be at least 1".to_string()));
        }
        let audio = &self.audio;
        if audio.sample_rate == 0 || audio.fft_size == 0 || audio.hop_length == 0 || audio.num_mels == 0 {
            return Err(ConfigError::Invalid(
                "audio parameters must all be non-zero".to_string(),
            ));
        }
        if audio.hop_length > audio.fft_size {
            return Err(ConfigError::Invalid(format!(
                "hop length {} exceeds fft size {}",
                audio.hop_length, audio.fft_size
            )));
        }
        if self.characters.characters.is_empty() {
            return Err(ConfigError::Invalid("character set cannot be empty".to_string()));
        }
        Ok(())
    }
}
