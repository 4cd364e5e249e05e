//! Length-masked reconstruction loss, tracked for end-of-run reporting.

use ndarray::{s, ArrayView3};

/// Mean absolute error over the first `lengths[i]` frames of each item.
///
/// Padding frames never contribute. Returns `0.0` when no frame is valid.
pub fn masked_l1(
    predicted: ArrayView3<'_, f32>,
    target: ArrayView3<'_, f32>,
    lengths: &[usize],
) -> anyhow::Result<f32> {
    if predicted.dim() != target.dim() {
        anyhow::bail!(
            "prediction shape {:?} does not match target shape {:?}",
            predicted.dim(),
            target.dim()
        );
    }
    let (batch, frames, bins) = predicted.dim();
    if lengths.len() != batch {
        anyhow::bail!("{} lengths given for a batch of {}", lengths.len(), batch);
    }

    let mut total = 0.0f64;
    let mut count = 0usize;
    for (i, &len) in lengths.iter().enumerate() {
        if len > frames {
            anyhow::bail!("item {i} length {len} exceeds padded length {frames}");
        }
        let p = predicted.slice(s![i, ..len, ..]);
        let t = target.slice(s![i, ..len, ..]);
        total += p
            .iter()
            .zip(t.iter())
            .map(|(a, b)| (a - b).abs() as f64)
            .sum::<f64>();
        count += len * bins;
    }

    if count == 0 {
        return Ok(0.0);
    }
    Ok((total / count as f64) as f32)
}

/// Per-batch loss scalars for one named output.
#[derive(Debug, Clone, Default)]
pub struct LossTracker {
    values: Vec<f32>,
}

impl LossTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, loss: f32) {
        self.values.push(loss);
    }

    pub fn batches(&self) -> usize {
        self.values.len()
    }

    /// Unweighted mean over batches.
    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }
}
