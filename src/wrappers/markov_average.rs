//! Recursive rolling-window wrapper

use super::lag_average::{fill_with_means, lag_windows};
use super::{
    check_aligned, labelled_predictions, FeedbackWindow, FluxEstimator, LagAverageConfig,
    LagAverageWrapper, PredictionTrace, VarLags,
};
use crate::error::{LsmError, Result};
use crate::frame::TimeSeriesFrame;
use crate::models::Estimator;
use crate::timeseries::WindowSpec;
use ndarray::{s, Array1, Array2, Axis};
use tracing::{debug, info};

/// Rolling-window wrapper whose lag spec mixes drivers and flux targets.
///
/// Training uses observed target history. At prediction time the target
/// windows are rebuilt from the wrapper's own earlier predictions, one step
/// at a time within each site.
#[derive(Debug, Clone)]
pub struct MarkovLagAverageWrapper<M> {
    inner: LagAverageWrapper<M>,
    x_lags: VarLags,
    y_lags: VarLags,
    feedback: FeedbackWindow,
}

impl<M: Estimator> MarkovLagAverageWrapper<M> {
    /// Wrap a model with data at 30 minute resolution
    pub fn new(var_lags: VarLags, model: M) -> Result<Self> {
        Self::with_config(model, LagAverageConfig::new(var_lags))
    }

    /// Split the lag spec into drivers and targets. Target variables may
    /// only use plain trailing-mean windows.
    pub fn with_config(model: M, config: LagAverageConfig) -> Result<Self> {
        let (x_lags, y_lags) = config.var_lags.split_flux();
        for entry in y_lags.iter() {
            if let Some(spec) = entry
                .windows
                .iter()
                .find(|w| !matches!(w, WindowSpec::Mean(_)))
            {
                return Err(LsmError::ConfigError(format!(
                    "target '{}' cannot use window '{}'; only trailing means can be rebuilt from predictions",
                    entry.variable, spec
                )));
            }
        }

        // Drivers first, then targets, so fit and predict share one feature order
        let combined = x_lags.chain(&y_lags)?;
        let inner_config = LagAverageConfig {
            var_lags: combined,
            datafreq: config.datafreq,
            feedback: config.feedback,
        };
        Ok(Self {
            inner: LagAverageWrapper::with_config(model, inner_config)?,
            x_lags,
            y_lags,
            feedback: config.feedback,
        })
    }

    pub fn model(&self) -> &M {
        self.inner.model()
    }

    pub fn is_fitted(&self) -> bool {
        self.inner.is_fitted()
    }

    /// Driver variables, in feature order
    pub fn driver_variables(&self) -> Vec<String> {
        self.x_lags.variables()
    }

    /// Target variables fed back during prediction
    pub fn target_variables(&self) -> Vec<String> {
        self.y_lags.variables()
    }

    pub fn fit(&mut self, x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<&mut Self> {
        let datafreq = self.inner.config().datafreq;
        self.fit_with_datafreq(x, y, datafreq)
    }

    /// Fit with observed target history as the target-window features.
    /// `x` must hold exactly the driver variables, in `var_lags` order.
    pub fn fit_with_datafreq(
        &mut self,
        x: &TimeSeriesFrame,
        y: &TimeSeriesFrame,
        datafreq: f64,
    ) -> Result<&mut Self> {
        let drivers = self.x_lags.variables();
        if x.columns() != drivers.as_slice() {
            return Err(LsmError::UsageError(format!(
                "driver columns {:?} differ from the configured drivers {:?}",
                x.columns(),
                drivers
            )));
        }
        check_aligned(x, y)?;

        let history = y.select(&self.y_lags.variables())?;
        let combined = x.hstack(&history)?;
        self.inner.fit_with_datafreq(&combined, y, datafreq)?;
        Ok(self)
    }

    pub fn predict(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        self.predict_with_datafreq(x, self.inner.config().datafreq)
    }

    /// Predict each site step by step. Driver windows come from `x`; target
    /// windows average the site's earlier predictions per [`FeedbackWindow`].
    /// Anything still missing takes the training mean.
    pub fn predict_with_datafreq(&self, x: &TimeSeriesFrame, datafreq: f64) -> Result<TimeSeriesFrame> {
        let state = self.inner.state().ok_or(LsmError::ModelNotFitted)?;
        let x_lag = lag_windows(x, &self.x_lags, datafreq)?;
        let n_x = x_lag.width();
        let n_outputs = state.y_cols.len();

        // (output column, window rows) for each target feature
        let mut plan: Vec<(usize, usize)> = Vec::with_capacity(self.y_lags.n_features());
        for entry in self.y_lags.iter() {
            let output = state
                .y_cols
                .iter()
                .position(|c| *c == entry.variable)
                .ok_or_else(|| LsmError::FeatureNotFound(entry.variable.clone()))?;
            for spec in &entry.windows {
                let rows = match spec.window() {
                    Some(window) => window.rows(datafreq)?,
                    None => 1,
                };
                plan.push((output, rows));
            }
        }

        let n_features = n_x + plan.len();
        if n_features != state.means.len() {
            return Err(LsmError::ShapeError {
                expected: format!("{} features", state.means.len()),
                actual: format!("{} features", n_features),
            });
        }

        info!("Data lagged, now predicting, step by step");
        let mut output = Array2::from_elem((x.height(), n_outputs), f64::NAN);
        let mut step = 0usize;
        for group in x.index().site_groups() {
            let mut trace = PredictionTrace::new(n_outputs);
            for &row in &group.rows {
                let mut input = Array1::from_elem(n_features, f64::NAN);
                input.slice_mut(s![..n_x]).assign(&x_lag.values().row(row));
                for (k, &(out, rows)) in plan.iter().enumerate() {
                    let steps = self.feedback.steps(rows, trace.len());
                    if let Some(mean) = trace.mean_of_last(out, steps) {
                        input[n_x + k] = mean;
                    }
                }

                let mut input = input.insert_axis(Axis(0));
                fill_with_means(&mut input, &state.means);
                let prediction = self.inner.model().predict(&input)?;
                if prediction.dim() != (1, n_outputs) {
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
}

impl<M: Estimator> FluxEstimator for MarkovLagAverageWrapper<M> {
    fn fit(&mut self, x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<()> {
        MarkovLagAverageWrapper::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        MarkovLagAverageWrapper::predict(self, x)
    }
}
