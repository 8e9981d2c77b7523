//! Missing-data filter

use crate::error::{LsmError, Result};
use crate::frame::finite_row_mask;
use crate::models::Estimator;
use ndarray::{Array2, Axis};
use tracing::info;

/// Fits the inner model only on rows where every feature and target is
/// finite. Prediction passes through unchanged.
#[derive(Debug, Clone)]
pub struct MissingDataWrapper<M> {
    model: M,
}

impl<M: Estimator> MissingDataWrapper<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_inner(self) -> M {
        self.model
    }
}

impl<M: Estimator> Estimator for MissingDataWrapper<M> {
    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        if x.nrows() != y.nrows() {
            return Err(LsmError::ShapeError {
                expected: format!("{} target rows", x.nrows()),
                actual: format!("{} target rows", y.nrows()),
            });
        }

        let x_ok = finite_row_mask(x.view());
        let y_ok = finite_row_mask(y.view());
        let rows: Vec<usize> = x_ok
            .iter()
            .zip(y_ok.iter())
            .enumerate()
            .filter_map(|(i, (&a, &b))| (a && b).then_some(i))
            .collect();

        info!(
            "Dropping rows with missing data, using {} samples of {}",
            rows.len(),
            x.nrows()
        );
        self.model
            .fit(&x.select(Axis(0), &rows), &y.select(Axis(0), &rows))
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.model.predict(x)
    }
}
