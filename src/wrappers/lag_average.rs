//! Rolling-window average wrapper

use super::{check_aligned, predict_frame, FluxEstimator, LagAverageConfig, VarLags};
use crate::error::{LsmError, Result};
use crate::frame::{finite_row_mask, TimeSeriesFrame};
use crate::models::Estimator;
use crate::timeseries::{rolling_mean_rows, WindowSpec};
use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub(crate) struct LagAverageState {
    pub(crate) means: Array1<f64>,
    pub(crate) y_cols: Vec<String>,
}

/// Features for one contiguous block of rows. Columns of `values` follow
/// the variable order of `var_lags`.
fn lag_block(values: ArrayView2<'_, f64>, var_lags: &VarLags, datafreq: f64) -> Result<Array2<f64>> {
    let mut features: Vec<Array2<f64>> = Vec::with_capacity(var_lags.n_features());
    for (i, entry) in var_lags.iter().enumerate() {
        let column = values.slice(s![.., i..i + 1]);
        for spec in &entry.windows {
            let feature = match spec {
                WindowSpec::Current => column.to_owned(),
                WindowSpec::Mean(window) => rolling_mean_rows(column, window.rows(datafreq)?, 1)?,
                WindowSpec::MeanMinusCurrent(window) => {
                    rolling_mean_rows(column, window.rows(datafreq)?, 1)? - &column
                }
            };
            features.push(feature);
        }
    }
    let views: Vec<ArrayView2<'_, f64>> = features.iter().map(|f| f.view()).collect();
    Ok(concatenate(Axis(1), &views)?)
}

/// Window features for every variable in `var_lags`, computed within each
/// site and written back to the original row positions.
pub(crate) fn lag_windows(
    x: &TimeSeriesFrame,
    var_lags: &VarLags,
    datafreq: f64,
) -> Result<TimeSeriesFrame> {
    // A recursive spec may have no driver windows at all
    if var_lags.is_empty() {
        return x.with_values(Vec::new(), Array2::zeros((x.height(), 0)));
    }
    var_lags.validate(datafreq)?;
    let raw = x.select(&var_lags.variables())?;

    let mut output = Array2::from_elem((x.height(), var_lags.n_features()), f64::NAN);
    for group in x.index().site_groups() {
        let block = raw.values().select(Axis(0), &group.rows);
        let lagged = lag_block(block.view(), var_lags, datafreq)?;
        for (k, &row) in group.rows.iter().enumerate() {
            output.row_mut(row).assign(&lagged.row(k));
        }
    }

    x.with_values(var_lags.feature_names(), output)
}

/// Replace non-finite entries with the matching column mean
pub(crate) fn fill_with_means(values: &mut Array2<f64>, means: &Array1<f64>) {
    for (mut column, &mean) in values.axis_iter_mut(Axis(1)).zip(means.iter()) {
        column.mapv_inplace(|v| if v.is_finite() { v } else { mean });
    }
}

/// Replaces each variable with trailing window means (and optionally the
/// current value) before fitting or predicting.
///
/// Windows exclude the current row, so a feature never sees the value it
/// is used alongside.
#[derive(Debug, Clone)]
pub struct LagAverageWrapper<M> {
    model: M,
    config: LagAverageConfig,
    state: Option<LagAverageState>,
}

impl<M: Estimator> LagAverageWrapper<M> {
    /// Wrap a model with data at 30 minute resolution
    pub fn new(var_lags: VarLags, model: M) -> Result<Self> {
        Self::with_config(model, LagAverageConfig::new(var_lags))
    }

    pub fn with_config(model: M, config: LagAverageConfig) -> Result<Self> {
        config.var_lags.validate(config.datafreq)?;
        Ok(Self {
            model,
            config,
            state: None,
        })
    }

    pub fn config(&self) -> &LagAverageConfig {
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

    /// Training means of the lagged features, in feature order
    pub fn feature_means(&self) -> Option<&Array1<f64>> {
        self.state.as_ref().map(|s| &s.means)
    }

    pub(crate) fn state(&self) -> Option<&LagAverageState> {
        self.state.as_ref()
    }

    /// Window features of `x` at the configured data frequency
    pub fn lag_data(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        lag_windows(x, &self.config.var_lags, self.config.datafreq)
    }

    pub fn fit(&mut self, x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<&mut Self> {
        let datafreq = self.config.datafreq;
        self.fit_with_datafreq(x, y, datafreq)
    }

    /// Fit on rows where every lagged feature is available
    pub fn fit_with_datafreq(
        &mut self,
        x: &TimeSeriesFrame,
        y: &TimeSeriesFrame,
        datafreq: f64,
    ) -> Result<&mut Self> {
        check_aligned(x, y)?;
        let lagged = lag_windows(x, &self.config.var_lags, datafreq)?;

        let means = lagged.nan_means();
        for (name, mean) in lagged.columns().iter().zip(means.iter()) {
            if mean.is_nan() {
                warn!("Feature {} has no values at any time step", name);
            }
        }

        let rows: Vec<usize> = finite_row_mask(lagged.values().view())
            .into_iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        info!(
            "Data lagged, fitting with {} samples out of {}",
            rows.len(),
            x.height()
        );

        let x_fit = lagged.values().select(Axis(0), &rows);
        let y_fit = y.values().select(Axis(0), &rows);
        self.model.fit(&x_fit, &y_fit)?;

        self.state = Some(LagAverageState {
            means,
            y_cols: y.columns().to_vec(),
        });
        Ok(self)
    }

    pub fn predict(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        self.predict_with_datafreq(x, self.config.datafreq)
    }

    /// Predict every row. Raw inputs must be complete; windows without
    /// enough history fall back to the training means.
    pub fn predict_with_datafreq(&self, x: &TimeSeriesFrame, datafreq: f64) -> Result<TimeSeriesFrame> {
        let state = self.state.as_ref().ok_or(LsmError::ModelNotFitted)?;
        let raw = x.select(&self.config.var_lags.variables())?;
        if raw.has_missing() {
            return Err(LsmError::MissingInput(
                "prediction drivers contain missing values".to_string(),
            ));
        }

        let lagged = lag_windows(x, &self.config.var_lags, datafreq)?;
        let mut features = lagged.values().clone();
        fill_with_means(&mut features, &state.means);
        debug!("Data lagged, now predicting");

        predict_frame(&self.model, &features, x, &state.y_cols)
    }
}

impl<M: Estimator> FluxEstimator for LagAverageWrapper<M> {
    fn fit(&mut self, x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<()> {
        LagAverageWrapper::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        LagAverageWrapper::predict(self, x)
    }
}
