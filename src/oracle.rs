//! Forecast oracle boundary.
//!
//! The oracle is an opaque forecasting component: given an encoder window of
//! recent history it returns a fixed-length batch of future values. Training
//! and numerical architecture live behind this trait; the buffer only
//! consumes the median trajectory of the returned quantile grid.

use crate::error::OracleError;
use crate::window::EncoderWindow;

/// Multi-step, multi-quantile forecast returned by one oracle call.
///
/// `steps[i]` holds the predicted quantiles for step `i`, ordered from the
/// lowest quantile to the highest.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastBatch {
    steps: Vec<Vec<f64>>,
}

impl ForecastBatch {
    /// Wraps per-step quantile rows.
    #[must_use]
    pub fn new(steps: Vec<Vec<f64>>) -> Self {
        Self { steps }
    }

    /// Builds a batch from a single point forecast per step.
    #[must_use]
    pub fn from_point(values: Vec<f64>) -> Self {
        Self {
            steps: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    /// Number of forecast steps.
    #[must_use]
    pub fn horizon(&self) -> usize {
        self.steps.len()
    }

    /// Median trajectory: the middle quantile of each step.
    ///
    /// # Errors
    /// Returns [`OracleError::EmptyQuantiles`] if any step carries no
    /// quantiles.
    pub fn median(&self) -> Result<Vec<f64>, OracleError> {
        let mut out = Vec::with_capacity(self.steps.len());
        for (step, row) in self.steps.iter().enumerate() {
            if row.is_empty() {
                return Err(OracleError::EmptyQuantiles { step });
            }
            out.push(row[row.len() / 2]);
        }
        Ok(out)
    }
}

/// Opaque forecasting component mapping an encoder window to future values.
///
/// One call per refill. A failed call aborts only the generation attempt
/// that issued it.
pub trait ForecastOracle: Send + Sync {
    /// Predicts the next steps for the channel behind `window`.
    fn predict(&self, window: &EncoderWindow) -> Result<ForecastBatch, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_picks_middle_quantile() {
        let batch = ForecastBatch::new(vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![10.0, 20.0, 30.0],
        ]);
        assert_eq!(batch.median().unwrap(), vec![3.0, 20.0]);
    }

    #[test]
    fn point_forecast_is_its_own_median() {
        let batch = ForecastBatch::from_point(vec![7.0, 8.0, 9.0]);
        assert_eq!(batch.horizon(), 3);
        assert_eq!(batch.median().unwrap(), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn empty_quantile_row_is_an_error() {
        let batch = ForecastBatch::new(vec![vec![1.0], vec![]]);
        assert!(matches!(
            batch.median(),
            Err(OracleError::EmptyQuantiles { step: 1 })
        ));
    }
}
