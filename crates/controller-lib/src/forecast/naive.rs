//! In-process persistence forecast

use super::Forecaster;
use anyhow::Result;
use async_trait::async_trait;

/// Name of the model served locally instead of by the forecasting service
pub const BASIC_MODEL: &str = "basic";

/// Repeats the most recent observation over the whole horizon
#[derive(Debug, Default, Clone, Copy)]
pub struct NaiveForecaster;

impl NaiveForecaster {
    pub fn predict(samples: &[f64], horizon: usize) -> Vec<f64> {
        match samples.last() {
            Some(&last) => vec![last; horizon],
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl Forecaster for NaiveForecaster {
    async fn forecast(&self, samples: &[f64], horizon: usize, _model: &str) -> Result<Vec<f64>> {
        Ok(Self::predict(samples, horizon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeats_last_sample() {
        assert_eq!(NaiveForecaster::predict(&[1.0, 4.0, 9.0], 3), vec![9.0, 9.0, 9.0]);
    }

    #[test]
    fn test_empty_history_yields_nothing() {
        assert!(NaiveForecaster::predict(&[], 5).is_empty());
        assert!(NaiveForecaster::predict(&[3.0], 0).is_empty());
    }
}
