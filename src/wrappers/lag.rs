//! Single-lag wrapper

use super::{
    apply_nan_policy, check_aligned, check_width, predict_frame, reject_site_column, FluxEstimator,
    LagConfig, NanPolicy,
};
use crate::error::{LsmError, Result};
use crate::frame::TimeSeriesFrame;
use crate::models::Estimator;
use crate::timeseries::lagged_name;
use ndarray::{Array1, Axis};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct LagState {
    n_features: usize,
    x_means: Array1<f64>,
    x_cols: Vec<String>,
    y_cols: Vec<String>,
}

/// Adds a time-lagged copy of every driver before fitting or predicting.
///
/// Multi-site input is lagged within each site.
#[derive(Debug, Clone)]
pub struct LagWrapper<M> {
    model: M,
    config: LagConfig,
    state: Option<LagState>,
}

impl<M: Estimator> LagWrapper<M> {
    /// Wrap a model with the default lag of one 30 minute step
    pub fn new(model: M) -> Self {
        Self::with_config(model, LagConfig::default())
    }

    pub fn with_config(model: M, config: LagConfig) -> Self {
        Self {
            model,
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &LagConfig {
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

    /// Driver columns seen at fit time
    pub fn feature_names(&self) -> Option<&[String]> {
        self.state.as_ref().map(|s| s.x_cols.as_slice())
    }

    /// Fit on lagged drivers. Rows left incomplete by the lag are dropped.
    pub fn fit(&mut self, x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<&mut Self> {
        reject_site_column(x)?;
        check_aligned(x, y)?;

        let state = LagState {
            n_features: x.width(),
            x_means: x.nan_means(),
            x_cols: x.columns().to_vec(),
            y_cols: y.columns().to_vec(),
        };

        let (x_lag, rows) = self.lag(&state, x, NanPolicy::Drop)?;
        info!(
            "Data lagged, fitting with {} samples out of {}",
            x_lag.height(),
            x.height()
        );

        let y_fit = y.values().select(Axis(0), &rows);
        self.model.fit(x_lag.values(), &y_fit)?;
        self.state = Some(state);
        Ok(self)
    }

    /// Original drivers joined with their lagged copies
    pub fn transform(&self, x: &TimeSeriesFrame, nans: NanPolicy) -> Result<TimeSeriesFrame> {
        let state = self.state.as_ref().ok_or(LsmError::ModelNotFitted)?;
        self.lag(state, x, nans).map(|(frame, _)| frame)
    }

    /// Predict from lagged drivers, filling missing lags with training means
    pub fn predict(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        let state = self.state.as_ref().ok_or(LsmError::ModelNotFitted)?;
        let (x_lag, _) = self.lag(state, x, NanPolicy::FillWithTrainingMean)?;
        debug!("Data lagged, now predicting");
        predict_frame(&self.model, x_lag.values(), x, &state.y_cols)
    }

    fn lag(
        &self,
        state: &LagState,
        x: &TimeSeriesFrame,
        nans: NanPolicy,
    ) -> Result<(TimeSeriesFrame, Vec<usize>)> {
        check_width(x, state.n_features)?;

        let lagger = self.config.lagger().with_site_grouping(x.index().has_sites());
        let lagged = lagger.transform(x)?;

        // Lagged columns map to training means by position
        let fills: HashMap<String, f64> = x
            .columns()
            .iter()
            .zip(state.x_means.iter())
            .map(|(c, &m)| (lagged_name(c), m))
            .collect();
        apply_nan_policy(lagged, nans, &fills)
    }
}

impl<M: Estimator> FluxEstimator for LagWrapper<M> {
    fn fit(&mut self, x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<()> {
        LagWrapper::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        LagWrapper::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TimeIndex;
    use crate::models::{LinearRegression, MeanEstimator};
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2008, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn drivers(values: Vec<f64>) -> TimeSeriesFrame {
        let index = TimeIndex::regular(start(), Duration::minutes(30), values.len()).unwrap();
        TimeSeriesFrame::from_columns(index, vec![("SWdown", values)]).unwrap()
    }

    #[test]
    fn test_transform_adds_lag_column() {
        let x = drivers(vec![1.0, 2.0, 3.0, 4.0]);
        let y = x.with_values(vec!["Qle".into()], x.values().clone()).unwrap();

        let mut wrapper = LagWrapper::new(MeanEstimator::new());
        wrapper.fit(&x, &y).unwrap();

        let dropped = wrapper.transform(&x, NanPolicy::Drop).unwrap();
        assert_eq!(dropped.columns(), &["SWdown", "SWdown_lag"]);
        assert_eq!(dropped.height(), 3);

        let filled = wrapper.transform(&x, NanPolicy::FillWithTrainingMean).unwrap();
        assert_eq!(filled.height(), 4);
        assert!((filled.column("SWdown_lag").unwrap()[0] - 2.5).abs() < 1e-12);

        let raw = wrapper.transform(&x, NanPolicy::PassThrough).unwrap();
        assert!(raw.column("SWdown_lag").unwrap()[0].is_nan());
    }

    #[test]
    fn test_recovers_previous_value() {
        let values: Vec<f64> = (0..20).map(|i| ((i * 7) % 11) as f64).collect();
        let x = drivers(values.clone());
        let mut target = vec![f64::NAN];
        target.extend_from_slice(&values[..19]);
        let y = x.with_values(vec!["Qh".into()], ndarray::Array2::from_shape_vec((20, 1), target).unwrap()).unwrap();

        let mut wrapper = LagWrapper::new(LinearRegression::new());
        wrapper.fit(&x, &y).unwrap();
        let pred = wrapper.predict(&x).unwrap();
        assert_eq!(pred.columns(), &["Qh"]);
        for t in 1..20 {
            assert!((pred.values()[[t, 0]] - values[t - 1]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_predict_before_fit() {
        let wrapper = LagWrapper::new(MeanEstimator::new());
        assert!(matches!(
            wrapper.predict(&drivers(vec![1.0])),
            Err(LsmError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_predict_wrong_width() {
        let x = drivers(vec![1.0, 2.0, 3.0]);
        let y = x.clone();
        let mut wrapper = LagWrapper::new(MeanEstimator::new());
        wrapper.fit(&x, &y).unwrap();

        let wide = x.hstack(&x.with_values(vec!["Tair".into()], x.values().clone()).unwrap()).unwrap();
        assert!(matches!(wrapper.predict(&wide), Err(LsmError::ShapeError { .. })));
    }

    #[test]
    fn test_failed_fit_keeps_state() {
        let x = drivers(vec![1.0, 2.0, 3.0]);
        let mut wrapper = LagWrapper::new(MeanEstimator::new());
        let short = drivers(vec![1.0, 2.0]);
        assert!(wrapper.fit(&x, &short).is_err());
        assert!(!wrapper.is_fitted());
    }
}
