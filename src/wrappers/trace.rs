//! Append-only record of recursive predictions

use crate::error::{LsmError, Result};
use crate::timeseries::CompensatedSum;
use ndarray::{Array2, ArrayView1};

/// Predictions made so far for one site, with compensated prefix sums so that
/// the mean of the last `k` steps of any output is constant-time.
#[derive(Debug, Clone)]
pub struct PredictionTrace {
    n_outputs: usize,
    steps: usize,
    values: Vec<f64>,
    // Prefix sums of finite values and counts of non-finite ones, (steps + 1) * n_outputs
    sums: Vec<CompensatedSum>,
    missing: Vec<usize>,
}

impl PredictionTrace {
    pub fn new(n_outputs: usize) -> Self {
        Self {
            n_outputs,
            steps: 0,
            values: Vec::new(),
            sums: vec![CompensatedSum::default(); n_outputs],
            missing: vec![0; n_outputs],
        }
    }

    /// Number of recorded steps
    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// Record one step of predictions
    pub fn push(&mut self, step: ArrayView1<'_, f64>) -> Result<()> {
        if step.len() != self.n_outputs {
            return Err(LsmError::ShapeError {
                expected: format!("{} outputs per step", self.n_outputs),
                actual: format!("{} outputs", step.len()),
            });
        }
        let base = self.steps * self.n_outputs;
        for (k, &v) in step.iter().enumerate() {
            self.values.push(v);
            let mut sum = self.sums[base + k];
            let mut missing = self.missing[base + k];
            if v.is_finite() {
                sum.add(v);
            } else {
                missing += 1;
            }
            self.sums.push(sum);
            self.missing.push(missing);
        }
        self.steps += 1;
        Ok(())
    }

    /// Predictions of step `k`
    pub fn row(&self, k: usize) -> Option<ArrayView1<'_, f64>> {
        if k >= self.steps {
            return None;
        }
        let start = k * self.n_outputs;
        Some(ArrayView1::from(&self.values[start..start + self.n_outputs]))
    }

    /// Most recent predictions
    pub fn last(&self) -> Option<ArrayView1<'_, f64>> {
        self.steps.checked_sub(1).and_then(|k| self.row(k))
    }

    /// Mean of `output` over the last `steps` predictions (clamped to the trace length).
    /// `None` when there is nothing to average; `NaN` if any averaged value is not finite.
    pub fn mean_of_last(&self, output: usize, steps: usize) -> Option<f64> {
        if output >= self.n_outputs {
            return None;
        }
        let k = steps.min(self.steps);
        if k == 0 {
            return None;
        }
        let end = self.steps * self.n_outputs + output;
        let start = (self.steps - k) * self.n_outputs + output;
        if self.missing[end] > self.missing[start] {
            return Some(f64::NAN);
        }
        Some(self.sums[end].since(&self.sums[start]) / k as f64)
    }

    /// All predictions as a `(steps, n_outputs)` matrix
    pub(crate) fn into_array(self) -> Result<Array2<f64>> {
        Ok(Array2::from_shape_vec((self.steps, self.n_outputs), self.values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_trailing_and_full_means() {
        let mut trace = PredictionTrace::new(2);
        for v in [1.0, 2.0, 3.0, 4.0] {
            trace.push(array![v, 10.0 * v].view()).unwrap();
        }
        assert_eq!(trace.len(), 4);
        assert!((trace.mean_of_last(0, 2).unwrap() - 3.5).abs() < 1e-12);
        assert!((trace.mean_of_last(1, 100).unwrap() - 25.0).abs() < 1e-12);
        assert_eq!(trace.last().unwrap()[1], 40.0);
    }

    #[test]
    fn test_nan_leaves_window() {
        let mut trace = PredictionTrace::new(1);
        for v in [f64::NAN, 2.0, 4.0] {
            trace.push(array![v].view()).unwrap();
        }
        assert!(trace.mean_of_last(0, 3).unwrap().is_nan());
        assert!((trace.mean_of_last(0, 2).unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_infinite_prediction_leaves_window() {
        let mut trace = PredictionTrace::new(1);
        for v in [1.0, f64::INFINITY, 2.0, 4.0] {
            trace.push(array![v].view()).unwrap();
        }
        assert!(trace.mean_of_last(0, 3).unwrap().is_nan());
        assert_eq!(trace.mean_of_last(0, 2).unwrap(), 3.0);
    }

    #[test]
    fn test_mean_after_large_prediction() {
        let mut trace = PredictionTrace::new(1);
        for v in [1e17, 1.0, 1.0, 1.0] {
            trace.push(array![v].view()).unwrap();
        }
        assert_eq!(trace.mean_of_last(0, 3).unwrap(), 1.0);
        assert_eq!(trace.mean_of_last(0, 1).unwrap(), 1.0);
    }

    #[test]
    fn test_empty_trace() {
        let trace = PredictionTrace::new(1);
        assert!(trace.last().is_none());
        assert!(trace.mean_of_last(0, 5).is_none());
        assert_eq!(trace.into_array().unwrap().dim(), (0, 1));
    }

    #[test]
    fn test_push_wrong_width() {
        let mut trace = PredictionTrace::new(2);
        assert!(trace.push(array![1.0].view()).is_err());
    }
}
