//! Regression estimators
//!
//! Every wrapper in this crate composes over the [`Estimator`] capability and
//! never over a concrete regression backend. Two estimators ship with the crate:
//! - [`MeanEstimator`] - predicts the training mean of every target
//! - [`LinearRegression`] - multi-output least squares with optional L2 penalty

mod linear;
mod mean;

pub use linear::LinearRegression;
pub use mean::MeanEstimator;

use crate::error::Result;
use ndarray::Array2;

/// A regression model over numeric feature and target matrices.
///
/// `x` has one row per sample and one column per feature; `y` and the
/// predictions have one column per target variable.
pub trait Estimator {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()>;

    /// Predict one row of targets per row of `x`
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

impl<E: Estimator + ?Sized> Estimator for Box<E> {
    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        (**self).fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        (**self).predict(x)
    }
}
