//! Model wrappers
//!
//! Each wrapper adds lagged or window-averaged features to time-indexed
//! input before delegating to an inner [`Estimator`]:
//! - [`LagWrapper`] - one time-based lag of every driver
//! - [`MarkovWrapper`] - lagged drivers plus lagged targets, predicted recursively
//! - [`LagAverageWrapper`] - trailing window means per variable
//! - [`MarkovLagAverageWrapper`] - window means with target windows fed back recursively
//! - [`MissingDataWrapper`] - drops incomplete training rows (matrix level)

mod config;
mod lag;
mod lag_average;
mod markov;
mod markov_average;
mod missing;
mod trace;

pub use config::{
    is_flux_variable, FeedbackWindow, LagAverageConfig, LagConfig, MarkovConfig, VarLag, VarLags,
    FLUX_VARIABLES,
};
pub use lag::LagWrapper;
pub use lag_average::LagAverageWrapper;
pub use markov::MarkovWrapper;
pub use markov_average::MarkovLagAverageWrapper;
pub use missing::MissingDataWrapper;
pub use trace::PredictionTrace;

use crate::error::{LsmError, Result};
use crate::frame::{TimeSeriesFrame, SITE_KEY};
use crate::models::Estimator;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What to do with rows made incomplete by lagging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    /// Remove rows with any missing value
    Drop,
    /// Replace missing lagged values with the training mean of their source column
    FillWithTrainingMean,
    /// Leave missing values in place
    PassThrough,
}

/// Fit/predict over time-indexed frames.
///
/// Implemented by every frame-level wrapper so that pipelines can hold
/// heterogeneous wrappers behind one type.
pub trait FluxEstimator {
    /// Fit on drivers `x` and targets `y` sharing one index
    fn fit(&mut self, x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<()>;

    /// Predict targets for every row of `x`
    fn predict(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame>;
}

impl<F: FluxEstimator + ?Sized> FluxEstimator for Box<F> {
    fn fit(&mut self, x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<()> {
        (**self).fit(x, y)
    }

    fn predict(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        (**self).predict(x)
    }
}

/// Site identity belongs in the index, not in the data
pub(crate) fn reject_site_column(x: &TimeSeriesFrame) -> Result<()> {
    if x.has_column(SITE_KEY) {
        return Err(LsmError::UsageError(format!(
            "'{}' found as a data column; site identity must be carried in the index",
            SITE_KEY
        )));
    }
    Ok(())
}

/// Training drivers and targets must describe the same rows
pub(crate) fn check_aligned(x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<()> {
    if x.height() != y.height() {
        return Err(LsmError::ShapeError {
            expected: format!("{} target rows", x.height()),
            actual: format!("{} target rows", y.height()),
        });
    }
    if x.index() != y.index() {
        return Err(LsmError::ValidationError(
            "drivers and targets have different indexes".to_string(),
        ));
    }
    Ok(())
}

/// Check the driver count seen at prediction time
pub(crate) fn check_width(x: &TimeSeriesFrame, n_features: usize) -> Result<()> {
    if x.width() != n_features {
        return Err(LsmError::ShapeError {
            expected: format!("{} driver columns", n_features),
            actual: format!("{} driver columns", x.width()),
        });
    }
    Ok(())
}

/// Apply a [`NanPolicy`]. `fills` maps column names to replacement values;
/// columns not in `fills` are never filled. Returns the surviving row positions.
pub(crate) fn apply_nan_policy(
    frame: TimeSeriesFrame,
    policy: NanPolicy,
    fills: &HashMap<String, f64>,
) -> Result<(TimeSeriesFrame, Vec<usize>)> {
    match policy {
        NanPolicy::Drop => {
            let rows = frame.complete_rows();
            Ok((frame.take_rows(&rows), rows))
        }
        NanPolicy::FillWithTrainingMean => {
            let rows = (0..frame.height()).collect();
            let (index, columns, mut values) = frame.into_parts();
            for (c, name) in columns.iter().enumerate() {
                if let Some(&fill) = fills.get(name) {
                    values
                        .column_mut(c)
                        .mapv_inplace(|v| if v.is_nan() { fill } else { v });
                }
            }
            Ok((TimeSeriesFrame::new(index, columns, values)?, rows))
        }
        NanPolicy::PassThrough => {
            let rows = (0..frame.height()).collect();
            Ok((frame, rows))
        }
    }
}

/// Run the inner model and label its output with the target names over `x`'s index
pub(crate) fn predict_frame<M: Estimator>(
    model: &M,
    features: &Array2<f64>,
    x: &TimeSeriesFrame,
    y_cols: &[String],
) -> Result<TimeSeriesFrame> {
    let predictions = model.predict(features)?;
    labelled_predictions(predictions, x, y_cols)
}

pub(crate) fn labelled_predictions(
    predictions: Array2<f64>,
    x: &TimeSeriesFrame,
    y_cols: &[String],
) -> Result<TimeSeriesFrame> {
    if predictions.dim() != (x.height(), y_cols.len()) {
        return Err(LsmError::PredictionError(format!(
            "model returned {:?} predictions, expected ({}, {})",
            predictions.dim(),
            x.height(),
            y_cols.len()
        )));
    }
    x.with_values(y_cols.to_vec(), predictions)
}
