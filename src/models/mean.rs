//! Mean baseline

use super::Estimator;
use crate::error::{LsmError, Result};
use crate::frame::nan_mean_axis0;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Predicts the per-target training mean for every row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeanEstimator {
    mean: Option<Array1<f64>>,
}

impl MeanEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fitted target means
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }
}

impl Estimator for MeanEstimator {
    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        if x.nrows() != y.nrows() {
            return Err(LsmError::ShapeError {
                expected: format!("{} target rows", x.nrows()),
                actual: format!("{} target rows", y.nrows()),
            });
        }
        self.mean = Some(nan_mean_axis0(y.view()));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mean = self.mean.as_ref().ok_or(LsmError::ModelNotFitted)?;
        Ok(Array2::from_shape_fn((x.nrows(), mean.len()), |(_, c)| mean[c]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mean_tiles_training_mean() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![[10.0, 1.0], [20.0, f64::NAN], [30.0, 3.0]];

        let mut model = MeanEstimator::new();
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&array![[0.0], [0.0]]).unwrap();
        assert_eq!(pred.dim(), (2, 2));
        assert!((pred[[1, 0]] - 20.0).abs() < 1e-12);
        assert!((pred[[0, 1]] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_not_fitted() {
        let model = MeanEstimator::new();
        assert!(matches!(model.predict(&array![[1.0]]), Err(LsmError::ModelNotFitted)));
    }
}
