//! Recursive single-step wrapper

use super::{
    apply_nan_policy, check_aligned, check_width, labelled_predictions, reject_site_column,
    FluxEstimator, MarkovConfig, NanPolicy, PredictionTrace,
};
use crate::error::{LsmError, Result};
use crate::frame::TimeSeriesFrame;
use crate::models::Estimator;
use crate::timeseries::lagged_name;
use ndarray::{concatenate, Array1, Array2, Axis};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct MarkovState {
    n_features: usize,
    n_outputs: usize,
    x_means: Array1<f64>,
    x_cols: Vec<String>,
    y_means: Array1<f64>,
    y_cols: Vec<String>,
}

/// Fits on drivers plus the previous step's targets, then predicts one step
/// at a time, feeding each prediction back as the next step's lagged target.
#[derive(Debug, Clone)]
pub struct MarkovWrapper<M> {
    model: M,
    config: MarkovConfig,
    state: Option<MarkovState>,
}

impl<M: Estimator> MarkovWrapper<M> {
    pub fn new(model: M) -> Self {
        Self::with_config(model, MarkovConfig::default())
    }

    pub fn with_config(model: M, config: MarkovConfig) -> Self {
        Self {
            model,
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &MarkovConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_inner(self) -> M {
        self.model
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Driver and target columns seen at fit time
    pub fn column_names(&self) -> Option<(&[String], &[String])> {
        self.state
            .as_ref()
            .map(|s| (s.x_cols.as_slice(), s.y_cols.as_slice()))
    }

    pub fn fit(&mut self, x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<&mut Self> {
        reject_site_column(x)?;
        check_aligned(x, y)?;

        let state = MarkovState {
            n_features: x.width(),
            n_outputs: y.width(),
            x_means: x.nan_means(),
            x_cols: x.columns().to_vec(),
            y_means: y.nan_means(),
            y_cols: y.columns().to_vec(),
        };

        let (features, rows) = self.lag(&state, x, Some(y), NanPolicy::Drop)?;
        info!(
            "Data lagged, fitting with {} samples out of {}",
            features.height(),
            x.height()
        );

        let y_fit = y.values().select(Axis(0), &rows);
        self.model.fit(features.values(), &y_fit)?;
        self.state = Some(state);
        Ok(self)
    }

    /// Drivers (and their lags, if configured) joined with lagged targets when `y` is given
    pub fn transform(
        &self,
        x: &TimeSeriesFrame,
        y: Option<&TimeSeriesFrame>,
        nans: NanPolicy,
    ) -> Result<TimeSeriesFrame> {
        let state = self.state.as_ref().ok_or(LsmError::ModelNotFitted)?;
        self.lag(state, x, y, nans).map(|(frame, _)| frame)
    }

    /// Predict step by step within each site. The first step of a site sees the
    /// training target means in place of a previous prediction.
    pub fn predict(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        let state = self.state.as_ref().ok_or(LsmError::ModelNotFitted)?;
        let (features, _) = self.lag(state, x, None, NanPolicy::FillWithTrainingMean)?;
        info!("Data lagged, now predicting, step by step");

        let mut output = Array2::from_elem((x.height(), state.n_outputs), f64::NAN);
        let mut step = 0usize;
        for group in x.index().site_groups() {
            let mut trace = PredictionTrace::new(state.n_outputs);
            for &row in &group.rows {
                let previous = match trace.last() {
                    Some(last) => last.to_owned(),
                    None => state.y_means.clone(),
                };
                let input = concatenate(Axis(0), &[features.values().row(row), previous.view()])?
                    .insert_axis(Axis(0));
                let prediction = self.model.predict(&input)?;
                if prediction.dim() != (1, state.n_outputs) {
                    return Err(LsmError::PredictionError(format!(
                        "model returned {:?} predictions for one step",
                        prediction.dim()
                    )));
                }
                trace.push(prediction.row(0))?;

                step += 1;
                if step % 100 == 0 {
                    debug!("Predicting step {} of {}", step, x.height());
                }
            }
            let predicted = trace.into_array()?;
            for (k, &row) in group.rows.iter().enumerate() {
                output.row_mut(row).assign(&predicted.row(k));
            }
        }

        labelled_predictions(output, x, &state.y_cols)
    }

    fn lag(
        &self,
        state: &MarkovState,
        x: &TimeSeriesFrame,
        y: Option<&TimeSeriesFrame>,
        nans: NanPolicy,
    ) -> Result<(TimeSeriesFrame, Vec<usize>)> {
        check_width(x, state.n_features)?;

        let lagger = self.config.lag.lagger().with_site_grouping(x.index().has_sites());

        let mut fills: HashMap<String, f64> = HashMap::new();
        let mut features = if self.config.lag_x {
            fills.extend(
                x.columns()
                    .iter()
                    .zip(state.x_means.iter())
                    .map(|(c, &m)| (lagged_name(c), m)),
            );
            lagger.transform(x)?
        } else {
            x.clone()
        };

        if let Some(y) = y {
            check_aligned(x, y)?;
            fills.extend(
                y.columns()
                    .iter()
                    .zip(state.y_means.iter())
                    .map(|(c, &m)| (lagged_name(c), m)),
            );
            let y_lag = lagger.clone().with_lagged_only(true).transform(y)?;
            features = features.hstack(&y_lag)?;
        }

        apply_nan_policy(features, nans, &fills)
    }
}

impl<M: Estimator> FluxEstimator for MarkovWrapper<M> {
    fn fit(&mut self, x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<()> {
        MarkovWrapper::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        MarkovWrapper::predict(self, x)
    }
}
