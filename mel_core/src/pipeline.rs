//! Batch inference and export.
//!
//! One pass over a dataset: every batch goes through the model, gets a
//! masked reconstruction loss for monitoring, and (unless dry-running) each
//! item's mel is cut to its true length, transposed to `[n_mels, frames]`
//! and written out. Manifests are written once, after the last batch.

use ndarray::{s, Array1, Array3, ArrayView2, Axis};
use ndarray_npy::write_npy;
use tracing::{debug, info, info_span, warn};

use crate::{
    config::RunConfiguration,
    error::{ConfigError, ExportError, ItemError, ItemFailure},
    family::OutputConverter,
    loss::{masked_l1, LossTracker},
    manifest::{base_name, ExportRecord, Manifest, ManifestPaths, OutputLayout},
    services::{AcousticModel, AudioService, DatasetSource},
    types::{Batch, Utterance},
};

/// Outcome of a completed pass.
#[derive(Debug)]
pub struct ExportSummary {
    pub run_id: String,
    /// Batches that went through the model. A batch whose items were all
    /// rejected by the dataset is not counted.
    pub batches: usize,
    pub records: Vec<ExportRecord>,
    pub failures: Vec<ItemFailure>,
    pub mean_decoder_loss: f32,
    pub mean_postnet_loss: f32,
    /// `None` for dry runs.
    pub manifest: Option<ManifestPaths>,
}

impl ExportSummary {
    pub fn exported(&self) -> usize {
        self.records.len()
    }
}

/// Losses and export-ready mels for one batch.
struct Evaluation {
    mels: Array3<f32>,
    decoder_loss: f32,
    postnet_loss: f32,
}

pub struct BatchExportPipeline<'a> {
    config: RunConfiguration,
    dataset: &'a dyn DatasetSource,
    model: &'a dyn AcousticModel,
    audio: &'a dyn AudioService,
    converter: Box<dyn OutputConverter + 'a>,
    layout: OutputLayout,
}

impl<'a> BatchExportPipeline<'a> {
    /// Validate the configuration against the dataset and model, and pick
    /// the output converter for the model's family.
    pub fn new(
        config: RunConfiguration,
        dataset: &'a dyn DatasetSource,
        model: &'a dyn AcousticModel,
        audio: &'a dyn AudioService,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if dataset.num_symbols() != model.num_symbols() {
            return Err(ConfigError::VocabularyMismatch {
                dataset: dataset.num_symbols(),
                model: model.num_symbols(),
            });
        }
        if dataset.outputs_per_step() != model.reduction_factor() {
            return Err(ConfigError::ReductionFactorMismatch {
                dataset: dataset.outputs_per_step(),
                model: model.reduction_factor(),
            });
        }

        let family = model.family();
        info!("Model family {} ({:?} output)", family, family.output_domain());
        let layout = OutputLayout::new(&config.output_root);
        Ok(Self {
            config,
            dataset,
            model,
            audio,
            converter: family.converter(),
            layout,
        })
    }

    /// Replace the family converter, for model families this crate does not know.
    pub fn with_converter(mut self, converter: Box<dyn OutputConverter + 'a>) -> Self {
        self.converter = converter;
        self
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn run(&self) -> Result<ExportSummary, ExportError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("export", run_id = %run_id);
        let _enter = span.enter();

        let dry_run = self.config.dry_run;
        info!(
            "Exporting {} utterances to {} (batch size {}, quantize {:?}, dry run {})",
            self.dataset.len(),
            self.layout.root().display(),
            self.config.batch_size,
            self.config.quantize_bits,
            dry_run
        );
        if !dry_run {
            self.layout.create_dirs()?;
            self.layout.remove_stale_manifests()?;
        }

        let mut manifest = Manifest::new();
        let mut failures = Vec::new();
        let mut decoder_losses = LossTracker::new();
        let mut postnet_losses = LossTracker::new();
        let mut batches = 0usize;

        for (index, batch) in self.dataset.batches(self.config.batch_size).enumerate() {
            let batch = batch.map_err(ExportError::Dataset)?;

            for rejected in &batch.rejected {
                failures.push(ItemFailure {
                    source: rejected.utterance.wav_path.clone(),
                    error: rejected.error.clone(),
                });
            }
            if batch.is_empty() {
                warn!("Batch {} has no loadable items", index);
                continue;
            }

            let eval = self.evaluate(index, &batch)?;
            batches += 1;
            decoder_losses.record(eval.decoder_loss);
            postnet_losses.record(eval.postnet_loss);
            debug!(
                "Batch {}: {} items, decoder loss {:.5}, postnet loss {:.5}",
                index,
                batch.len(),
                eval.decoder_loss,
                eval.postnet_loss
            );

            if dry_run {
                continue;
            }
            self.export_batch(&batch, &eval.mels, &mut manifest, &mut failures);
        }

        let manifest_paths = if dry_run {
            None
        } else {
            Some(manifest.write(&self.layout)?)
        };

        let summary = ExportSummary {
            run_id: run_id.clone(),
            batches,
            records: manifest.into_records(),
            failures,
            mean_decoder_loss: decoder_losses.mean(),
            mean_postnet_loss: postnet_losses.mean(),
            manifest: manifest_paths,
        };
        info!(
            "Finished {} batches: {} exported, {} failed, mean decoder loss {:.5}, mean postnet loss {:.5}",
            summary.batches,
            summary.exported(),
            summary.failures.len(),
            summary.mean_decoder_loss,
            summary.mean_postnet_loss
        );
        Ok(summary)
    }

    /// Model call plus loss bookkeeping. Any failure here means the exporter
    /// and the loaded model disagree, so it is fatal.
    fn evaluate(&self, index: usize, batch: &Batch) -> Result<Evaluation, ExportError> {
        let model_err = |source: anyhow::Error| ExportError::Model {
            batch: index,
            source,
        };

        if batch.mel_lengths.len() != batch.len() || batch.mel_targets.len_of(Axis(0)) != batch.len() {
            return Err(model_err(anyhow::anyhow!(
                "batch has {} items but {} lengths and {} target rows",
                batch.len(),
                batch.mel_lengths.len(),
                batch.mel_targets.len_of(Axis(0))
            )));
        }

        let output = self.model.infer(batch).map_err(model_err)?;
        let decoder_loss = masked_l1(
            output.decoder.view(),
            batch.mel_targets.view(),
            &batch.mel_lengths,
        )
        .map_err(model_err)?;

        let mels = self
            .converter
            .postprocess_output(&output, self.audio)
            .map_err(model_err)?;
        let postnet_loss = masked_l1(mels.view(), batch.mel_targets.view(), &batch.mel_lengths)
            .map_err(model_err)?;

        Ok(Evaluation {
            mels,
            decoder_loss,
            postnet_loss,
        })
    }

    fn export_batch(
        &self,
        batch: &Batch,
        mels: &Array3<f32>,
        manifest: &mut Manifest,
        failures: &mut Vec<ItemFailure>,
    ) {
        for (i, item) in batch.items.iter().enumerate() {
            let mel = mels.index_axis(Axis(0), i);
            match self.export_item(manifest, item, mel, batch.mel_lengths[i]) {
                Ok(record) => manifest.push(record),
                Err(error) => {
                    warn!("Skipping {}: {}", item.wav_path.display(), error);
                    failures.push(ItemFailure {
                        source: item.wav_path.clone(),
                        error,
                    });
                }
            }
        }
    }

    fn export_item(
        &self,
        manifest: &Manifest,
        item: &Utterance,
        mel: ArrayView2<'_, f32>,
        length: usize,
    ) -> Result<ExportRecord, ItemError> {
        let id = base_name(&item.wav_path)?;
        manifest.check_unclaimed(&id, &item.wav_path)?;

        // Read the source before writing anything so a bad file leaves no artifacts.
        let quantized = match self.config.quantize_bits {
            Some(bits) => {
                let wav = self
                    .audio
                    .load(&item.wav_path)
                    .map_err(|e| ItemError::Unreadable(format!("{e:#}")))?;
                Some(Array1::from(self.audio.quantize(&wav, bits)))
            }
            None => None,
        };

        let mel = mel.slice(s![..length, ..]).t().as_standard_layout().into_owned();
        let mel_path = self.layout.mel_path(&id);
        write_npy(&mel_path, &mel).map_err(|e| ItemError::Write {
            path: mel_path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(quantized) = quantized {
            let quant_path = self.layout.quant_path(&id);
            write_npy(&quant_path, &quantized).map_err(|e| ItemError::Write {
                path: quant_path.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(ExportRecord {
            id,
            source: item.wav_path.clone(),
            mel_path,
        })
    }
}
