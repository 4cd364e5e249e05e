//! Model families and the output conversion each one needs before export.

use anyhow::Context;
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::{services::AudioService, types::ModelOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Post-refinement output is a linear spectrogram.
    Tacotron,
    Tacotron2,
    /// Tacotron2 trained with double decoder consistency.
    Tacotron2Ddc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDomain {
    Linear,
    Mel,
}

impl ModelFamily {
    pub fn output_domain(self) -> OutputDomain {
        match self {
            ModelFamily::Tacotron => OutputDomain::Linear,
            ModelFamily::Tacotron2 | ModelFamily::Tacotron2Ddc => OutputDomain::Mel,
        }
    }

    /// Converter matching this family's output domain.
    pub fn converter(self) -> Box<dyn OutputConverter> {
        match self.output_domain() {
            OutputDomain::Linear => Box::new(LinearToMel),
            OutputDomain::Mel => Box::new(MelPassthrough),
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelFamily::Tacotron => "tacotron",
            ModelFamily::Tacotron2 => "tacotron2",
            ModelFamily::Tacotron2Ddc => "tacotron2_ddc",
        };
        f.write_str(name)
    }
}

/// Turns a model's batch output into time-major mel matrices
/// `[batch, frames, n_mels]`, ready for length truncation and export.
pub trait OutputConverter {
    fn postprocess_output(
        &self,
        output: &ModelOutput,
        audio: &dyn AudioService,
    ) -> anyhow::Result<Array3<f32>>;
}

/// Mel-domain models: the refined output if present, else the decoder output.
#[derive(Debug, Clone, Copy, Default)]
pub struct MelPassthrough;

impl OutputConverter for MelPassthrough {
    fn postprocess_output(
        &self,
        output: &ModelOutput,
        _audio: &dyn AudioService,
    ) -> anyhow::Result<Array3<f32>> {
        Ok(output.postnet.as_ref().unwrap_or(&output.decoder).clone())
    }
}

/// Linear-domain models: project each item's refined linear output to mel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearToMel;

impl OutputConverter for LinearToMel {
    fn postprocess_output(
        &self,
        output: &ModelOutput,
        audio: &dyn AudioService,
    ) -> anyhow::Result<Array3<f32>> {
        let linear = output
            .postnet
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("linear-output model returned no post-refinement output"))?;

        let mels = linear
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, item)| {
                audio
                    .linear_to_mel(item)
                    .with_context(|| format!("linear-to-mel failed for batch item {i}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let views: Vec<_> = mels.iter().map(|m| m.view()).collect();
        ndarray::stack(Axis(0), &views).context("converted mel frames disagree in shape")
    }
}
