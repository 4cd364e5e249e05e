pub mod config;
pub mod validation;

use std::fs;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use mel_core::{
    BatchExportPipeline, GroundTruthModel, HoundAudio, InteractiveSynthesizer, MetadataDataset,
    ModelConfig, PiperVoice, SynthesisOptions,
};

use crate::config::{Cli, Command, ExportArgs, SynthArgs};
use crate::validation::validate_synth_text;

fn main() -> anyhow::Result<()> {
    // .env first so RUST_LOG from it is honoured
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Export(args) => export(args),
        Command::Synth(args) => synth(args),
    }
}

fn export(args: ExportArgs) -> anyhow::Result<()> {
    let model_config = ModelConfig::from_path(&args.model_config)?;
    info!(
        "Model: {} (r={}, {} symbols, {} mels)",
        model_config.family, model_config.r, model_config.num_chars, model_config.audio.num_mels
    );

    let run = args.run_configuration();
    let dataset = MetadataDataset::open(&run.dataset_root, &model_config)
        .with_context(|| format!("Failed to open dataset at {}", run.dataset_root.display()))?;
    let model = GroundTruthModel::new(&model_config);
    let audio = HoundAudio::new(model_config.audio.clone());

    let pipeline = BatchExportPipeline::new(run, &dataset, &model, &audio)?;
    let summary = pipeline.run()?;

    for failure in &summary.failures {
        warn!("Skipped {}: {}", failure.source.display(), failure.error);
    }
    println!(" | > Batches: {}", summary.batches);
    println!(" | > Exported: {}", summary.exported());
    println!(" | > Failed: {}", summary.failures.len());
    println!(" | > Mean decoder loss: {:.5}", summary.mean_decoder_loss);
    println!(" | > Mean postnet loss: {:.5}", summary.mean_postnet_loss);
    if let Some(manifest) = &summary.manifest {
        println!(" | > Manifest: {}", manifest.metadata.display());
    }
    Ok(())
}

fn synth(args: SynthArgs) -> anyhow::Result<()> {
    validate_synth_text(&args.text)?;

    let voice = PiperVoice::from_config_path(&args.voice_config, args.features())?;
    let synthesizer = InteractiveSynthesizer::new(&voice, None, SynthesisOptions::default())?;
    let report = synthesizer.synthesize(&args.text)?;

    HoundAudio::write_wav(&args.out, &report.waveform, report.sample_rate)?;
    info!("Wrote {} ({:.2}s)", args.out.display(), report.duration_secs());

    if let Some(dir) = &args.plot_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        if !report.mel.is_empty() {
            HoundAudio::save_png(dir.join("mel.png"), report.mel.view())?;
        }
        if !report.alignment.is_empty() {
            HoundAudio::save_png(dir.join("alignment.png"), report.alignment.view())?;
        }
    }

    println!(" > Run-time: {:.3}s", report.elapsed.as_secs_f64());
    println!(" > Real-time factor: {:.4}", report.real_time_factor);
    println!(" > Time per sample: {:.3e}s", report.time_per_sample);
    Ok(())
}
