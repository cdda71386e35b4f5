//! Static accuracy-based model selection

use super::ensemble::PredictionEnsemble;
use tracing::debug;

/// Root-mean-square error of `predicted` against the last `window` values of `actual`.
///
/// Periods missing from `predicted` are left out of the mean; with no
/// comparable period at all the error is infinite.
pub fn rmse(predicted: &[f64], actual: &[f64], window: usize) -> f64 {
    let start = actual.len().saturating_sub(window);
    let mut sum = 0.0;
    let mut count = 0usize;
    for (i, observed) in actual.iter().enumerate().skip(start) {
        if let Some(p) = predicted.get(i) {
            sum += (p - observed).powi(2);
            count += 1;
        }
    }
    if count == 0 {
        return f64::INFINITY;
    }
    (sum / count as f64).sqrt()
}

/// Scores every model over a trailing window and picks the most accurate one
#[derive(Debug, Clone, Copy)]
pub struct AccuracyEstimator {
    window: usize,
}

impl AccuracyEstimator {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Overwrite each model's error estimate with its current RMSE
    pub fn estimate(&self, ensemble: &mut PredictionEnsemble, actual: &[f64]) {
        for model in ensemble.models_mut() {
            let error = rmse(model.buffer(), actual, self.window);
            debug!(model = %model.name(), rmse = error, "Accuracy estimate");
            model.set_error_estimate(error);
        }
    }

    /// Index of the model with the lowest stored error; the first one wins ties
    pub fn best(&self, ensemble: &PredictionEnsemble) -> usize {
        let mut best = 0;
        let mut min_error = f64::INFINITY;
        for (i, model) in ensemble.models().enumerate() {
            let error = model.error_estimate().unwrap_or(f64::INFINITY);
            if i == 0 || error < min_error {
                best = i;
                min_error = error;
            }
        }
        best
    }

    /// Estimate and select; a single-model catalog is chosen without scoring
    pub fn select(&self, ensemble: &mut PredictionEnsemble, actual: &[f64]) -> usize {
        if ensemble.is_single() {
            return 0;
        }
        self.estimate(ensemble, actual);
        self.best(ensemble)
    }
}
