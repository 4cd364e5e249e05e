// Command line and environment configuration

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mel_core::{AudioConfig, RunConfiguration};

#[derive(Debug, Parser)]
#[command(name = "mel_export", version, about = "Export mel spectrograms for vocoder training")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the dataset through the model and write mels plus manifests.
    Export(ExportArgs),
    /// Synthesize one sentence and write the audio.
    Synth(SynthArgs),
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Model config JSON (family, num_chars, r, characters, audio).
    #[arg(long, env = "MODEL_CONFIG")]
    pub model_config: PathBuf,

    /// Directory holding metadata.csv and wavs/.
    #[arg(long, env = "DATASET_ROOT")]
    pub dataset_root: PathBuf,

    #[arg(long, env = "OUTPUT_ROOT")]
    pub output_root: PathBuf,

    #[arg(long, env = "BATCH_SIZE", default_value_t = 32)]
    pub batch_size: usize,

    /// Quantize source waveforms at this bit depth.
    #[arg(long, env = "QUANTIZE_BITS")]
    pub quantize_bits: Option<u8>,

    /// Compute losses only; write nothing.
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,
}

impl ExportArgs {
    pub fn run_configuration(&self) -> RunConfiguration {
        RunConfiguration {
            output_root: self.output_root.clone(),
            dataset_root: self.dataset_root.clone(),
            batch_size: self.batch_size,
            quantize_bits: self.quantize_bits,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Debug, Args)]
pub struct SynthArgs {
    pub text: String,

    /// Piper voice config (`*.onnx.json`).
    #[arg(long, env = "VOICE_CONFIG")]
    pub voice_config: PathBuf,

    #[arg(long, env = "SYNTH_OUT", default_value = "synth.wav")]
    pub out: PathBuf,

    /// Write mel and alignment PNGs here.
    #[arg(long, env = "PLOT_DIR")]
    pub plot_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 1024)]
    pub fft_size: usize,

    #[arg(long, default_value_t = 256)]
    pub hop_length: usize,

    #[arg(long, default_value_t = 80)]
    pub num_mels: usize,
}

impl SynthArgs {
    /// Diagnostic feature parameters; the sample rate comes from the voice.
    pub fn features(&self) -> AudioConfig {
        AudioConfig {
            fft_size: self.fft_size,
            hop_length: self.hop_length,
            num_mels: self.num_mels,
            ..AudioConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_export() {
        let cli = Cli::try_parse_from([
            "mel_export",
            "export",
            "--model-config",
            "config.json",
            "--dataset-root",
            "LJSpeech-1.1",
            "--output-root",
            "out",
            "--batch-size",
            "8",
            "--quantize-bits",
            "9",
            "--dry-run",
        ])
        .unwrap();

        let Command::Export(args) = cli.command else {
            panic!("expected export");
        };
        let run = args.run_configuration();
        assert_eq!(run.batch_size, 8);
        assert_eq!(run.quantize_bits, Some(9));
        assert!(run.dry_run);
        assert_eq!(run.output_root, PathBuf::from("out"));
        assert_eq!(run.dataset_root, PathBuf::from("LJSpeech-1.1"));
        assert!(run.validate().is_ok());
    }

    #[test]
    fn test_parse_export_defaults() {
        let cli = Cli::try_parse_from([
            "mel_export",
            "export",
            "--model-config",
            "c.json",
            "--dataset-root",
            "d",
            "--output-root",
            "o",
        ])
        .unwrap();
        let Command::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.batch_size, 32);
        assert_eq!(args.quantize_bits, None);
    }

    #[test]
    fn test_parse_synth() {
        let cli = Cli::try_parse_from([
            "mel_export",
            "synth",
            "Hallo Welt",
            "--voice-config",
            "models/de_DE.onnx.json",
            "--num-mels",
            "40",
        ])
        .unwrap();
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        assert_eq!(args.text, "Hallo Welt");
        assert_eq!(args.out, PathBuf::from("synth.wav"));
        assert_eq!(args.features().num_mels, 40);
        assert_eq!(args.features().hop_length, 256);
    }

    #[test]
    fn test_bad_quantize_bits_rejected_by_parser() {
        let result = Cli::try_parse_from([
            "mel_export",
            "export",
            "--model-config",
            "c.json",
            "--dataset-root",
            "d",
            "--output-root",
            "o",
            "--quantize-bits",
            "nine",
        ]);
        assert!(result.is_err());
    }
}
