use crate::{MlErr, Result, error::check_len};

/// Computes the coefficient of determination of a set of predictions.
///
/// # Arguments
/// * `y_true` - The ground truth.
/// * `y_pred` - The predictions, one per target.
///
/// # Returns
/// `1 - SS_res / SS_tot`. Constant targets score `1.0` when predicted exactly and `0.0`
/// otherwise. A single sample scores `NaN`. Empty or mismatched inputs are an error.
pub fn r2_score(y_true: &[f32], y_pred: &[f32]) -> Result<f64> {
    check_len("r2 predictions", y_pred.len(), y_true.len())?;
    if y_true.is_empty() {
        return Err(MlErr::EmptyInput { what: "r2 targets" });
    }

    if y_true.len() < 2 {
        return Ok(f64::NAN);
    }

    let n = y_true.len() as f64;
    let mean = y_true.iter().map(|&y| y as f64).sum::<f64>() / n;

    let (ss_res, ss_tot) = y_true
        .iter()
        .zip(y_pred)
        .fold((0.0, 0.0), |(res, tot), (&y, &p)| {
            let (y, p) = (y as f64, p as f64);
            (res + (y - p).powi(2), tot + (y - mean).powi(2))
        });

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }

    Ok(1.0 - ss_res / ss_tot)
}

/// Accumulates the per batch results of one pass over a dataset.
#[derive(Debug, Clone, Default)]
pub struct EpochStats {
    weighted_loss: f64,
    samples: usize,
    y_true: Vec<f32>,
    y_pred: Vec<f32>,
}

impl EpochStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the mean loss of a batch together with its targets and predictions.
    pub fn push(&mut self, loss: f32, y_true: &[f32], y_pred: &[f32]) {
        self.weighted_loss += loss as f64 * y_true.len() as f64;
        self.samples += y_true.len();
        self.y_true.extend_from_slice(y_true);
        self.y_pred.extend_from_slice(y_pred);
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Returns the sample weighted mean of the batch losses, `NaN` when nothing was recorded.
    pub fn loss(&self) -> f32 {
        if self.samples == 0 {
            return f32::NAN;
        }

        (self.weighted_loss / self.samples as f64) as f32
    }

    pub fn r2(&self) -> Result<f64> {
        r2_score(&self.y_true, &self.y_pred)
    }

    pub fn y_true(&self) -> &[f32] {
        &self.y_true
    }

    pub fn y_pred(&self) -> &[f32] {
        &self.y_pred
    }
}
