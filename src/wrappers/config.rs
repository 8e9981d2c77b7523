//! Wrapper configuration

use crate::error::{LsmError, Result};
use crate::timeseries::{Lagger, Window, WindowSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Flux variables. In a lag spec these are targets, everything else is a driver.
pub const FLUX_VARIABLES: [&str; 5] = ["Qle", "Qh", "NEE", "Rnet", "Qg"];

/// Whether a variable name is one of [`FLUX_VARIABLES`]
pub fn is_flux_variable(name: &str) -> bool {
    FLUX_VARIABLES.contains(&name)
}

/// Configuration for single-lag wrappers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagConfig {
    /// Number of time-steps to lag by
    pub periods: usize,
    /// Length of one time-step
    pub freq: Window,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            periods: 1,
            freq: Window::minutes(30),
        }
    }
}

impl LagConfig {
    pub fn new(periods: usize, freq: Window) -> Self {
        Self { periods, freq }
    }

    /// Set the number of periods
    pub fn with_periods(mut self, periods: usize) -> Result<Self> {
        self.periods = periods;
        self.validate()?;
        Ok(self)
    }

    /// Set the step length from a token such as "30min"
    pub fn with_freq(mut self, freq: &str) -> Result<Self> {
        self.freq = Window::parse(freq)?;
        self.validate()?;
        Ok(self)
    }

    /// The lagger this config describes
    pub fn lagger(&self) -> Lagger {
        Lagger::new(self.periods, self.freq.duration())
    }

    /// Check that `periods * freq` is a representable time span
    pub fn validate(&self) -> Result<()> {
        self.lagger().offset().map(|_| ())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Configuration for the single-step Markov wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkovConfig {
    /// Lag applied to drivers and targets
    pub lag: LagConfig,
    /// Whether driver columns are lagged too, or only the targets
    pub lag_x: bool,
}

impl Default for MarkovConfig {
    fn default() -> Self {
        Self {
            lag: LagConfig::default(),
            lag_x: true,
        }
    }
}

impl MarkovConfig {
    pub fn with_lag(mut self, lag: LagConfig) -> Self {
        self.lag = lag;
        self
    }

    pub fn with_lag_x(mut self, lag_x: bool) -> Self {
        self.lag_x = lag_x;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.lag.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Windows of one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarLag {
    pub variable: String,
    pub windows: Vec<WindowSpec>,
}

/// Ordered mapping from variable name to its window list,
/// e.g. `Tair: [cur, 2h, 7d]`. Feature order is variable order times window order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarLags {
    entries: Vec<VarLag>,
}

impl VarLags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a variable with window tokens such as `["cur", "2h", "7dM"]`
    pub fn with_var(mut self, variable: &str, windows: &[&str]) -> Result<Self> {
        let windows = windows
            .iter()
            .map(|w| WindowSpec::parse(w))
            .collect::<Result<Vec<_>>>()?;
        self.push(variable, windows)?;
        Ok(self)
    }

    /// Append a variable. Each variable may appear only once.
    pub fn push(&mut self, variable: impl Into<String>, windows: Vec<WindowSpec>) -> Result<()> {
        let variable = variable.into();
        if self.get(&variable).is_some() {
            return Err(LsmError::ConfigError(format!(
                "variable '{}' appears twice in the lag spec",
                variable
            )));
        }
        self.entries.push(VarLag { variable, windows });
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &VarLag> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Windows of a variable
    pub fn get(&self, variable: &str) -> Option<&[WindowSpec]> {
        self.entries
            .iter()
            .find(|e| e.variable == variable)
            .map(|e| e.windows.as_slice())
    }

    /// Variable names in order
    pub fn variables(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.variable.clone()).collect()
    }

    /// Total number of lagged features
    pub fn n_features(&self) -> usize {
        self.entries.iter().map(|e| e.windows.len()).sum()
    }

    /// Feature column names, `<variable>_<window>`
    pub fn feature_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|e| e.windows.iter().map(move |w| format!("{}_{}", e.variable, w)))
            .collect()
    }

    /// Concatenation of two specs; variables must be disjoint
    pub fn chain(&self, other: &VarLags) -> Result<VarLags> {
        let mut out = self.clone();
        for entry in other.iter() {
            out.push(entry.variable.clone(), entry.windows.clone())?;
        }
        Ok(out)
    }

    /// Check that every variable has windows that are whole rows at `datafreq` hours per row
    pub fn validate(&self, datafreq: f64) -> Result<()> {
        if self.is_empty() {
            return Err(LsmError::ConfigError("lag spec has no variables".to_string()));
        }
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.variable.as_str()) {
                return Err(LsmError::ConfigError(format!(
                    "variable '{}' appears twice in the lag spec",
                    entry.variable
                )));
            }
            if entry.windows.is_empty() {
                return Err(LsmError::ConfigError(format!(
                    "variable '{}' has no windows",
                    entry.variable
                )));
            }
            for window in entry.windows.iter().filter_map(|w| w.window()) {
                window.rows(datafreq)?;
            }
        }
        Ok(())
    }

    /// Split into (drivers, targets) by [`FLUX_VARIABLES`], keeping order
    pub fn split_flux(&self) -> (VarLags, VarLags) {
        let (targets, drivers): (Vec<VarLag>, Vec<VarLag>) = self
            .entries
            .iter()
            .cloned()
            .partition(|e| is_flux_variable(&e.variable));
        (VarLags { entries: drivers }, VarLags { entries: targets })
    }
}

/// How far back the recursive feedback mean of a target window reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackWindow {
    /// Last `max(window_rows, steps_so_far)` predictions, i.e. the whole trace
    #[default]
    Expanding,
    /// Last `min(window_rows, steps_so_far)` predictions
    Trailing,
}

impl FeedbackWindow {
    /// Number of past predictions to average
    pub fn steps(&self, window_rows: usize, steps_so_far: usize) -> usize {
        match self {
            FeedbackWindow::Expanding => window_rows.max(steps_so_far).min(steps_so_far),
            FeedbackWindow::Trailing => window_rows.min(steps_so_far),
        }
    }
}

/// Configuration for the rolling-window wrappers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagAverageConfig {
    /// Variables and their windows
    pub var_lags: VarLags,
    /// Data frequency in hours
    pub datafreq: f64,
    /// Feedback averaging for recursive prediction
    #[serde(default)]
    pub feedback: FeedbackWindow,
}

impl LagAverageConfig {
    pub fn new(var_lags: VarLags) -> Self {
        Self {
            var_lags,
            datafreq: 0.5,
            feedback: FeedbackWindow::default(),
        }
    }

    /// Set data frequency in hours
    pub fn with_datafreq(mut self, datafreq: f64) -> Self {
        self.datafreq = datafreq;
        self
    }

    pub fn with_feedback(mut self, feedback: FeedbackWindow) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.var_lags.validate(config.datafreq)?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lags() -> VarLags {
        VarLags::new()
            .with_var("Tair", &["cur", "2h", "7d"])
            .unwrap()
            .with_var("Qle", &["30min", "1d"])
            .unwrap()
            .with_var("Rainf", &["cur", "30dM"])
            .unwrap()
    }

    #[test]
    fn test_feature_names_follow_spec_order() {
        let names = sample_lags().feature_names();
        assert_eq!(
            names,
            vec![
                "Tair_cur", "Tair_2h", "Tair_7d", "Qle_30min", "Qle_1d", "Rainf_cur", "Rainf_30dM"
            ]
        );
    }

    #[test]
    fn test_split_flux_keeps_order() {
        let (drivers, targets) = sample_lags().split_flux();
        assert_eq!(drivers.variables(), vec!["Tair", "Rainf"]);
        assert_eq!(targets.variables(), vec!["Qle"]);
        assert_eq!(targets.n_features(), 2);
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let result = VarLags::new()
            .with_var("Tair", &["cur"])
            .unwrap()
            .with_var("Tair", &["2h"]);
        assert!(matches!(result, Err(LsmError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_fractional_window() {
        let lags = VarLags::new().with_var("Tair", &["45min"]).unwrap();
        assert!(lags.validate(0.5).is_err());
        assert!(lags.validate(0.25).is_ok());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = LagAverageConfig::new(sample_lags()).with_feedback(FeedbackWindow::Trailing);
        let json = config.to_json().unwrap();
        assert!(json.contains("\"30dM\""));

        let parsed = LagAverageConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_json_bad_token() {
        let json = r#"{"var_lags": [{"variable": "Tair", "windows": ["2w"]}], "datafreq": 0.5}"#;
        assert!(LagAverageConfig::from_json(json).is_err());
    }

    #[test]
    fn test_feedback_steps() {
        assert_eq!(FeedbackWindow::Expanding.steps(4, 10), 10);
        assert_eq!(FeedbackWindow::Expanding.steps(4, 2), 2);
        assert_eq!(FeedbackWindow::Trailing.steps(4, 10), 4);
        assert_eq!(FeedbackWindow::Trailing.steps(4, 2), 2);
    }

    #[test]
    fn test_lag_config_json() {
        let config = LagConfig::default()
            .with_freq("1h")
            .unwrap()
            .with_periods(2)
            .unwrap();
        let parsed = LagConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed.freq, Window::hours(1));
        assert_eq!(parsed.periods, 2);
    }

    #[test]
    fn test_lag_config_rejects_oversized_lag() {
        assert!(matches!(
            LagConfig::default().with_periods(i32::MAX as usize + 1),
            Err(LsmError::ConfigError(_))
        ));
        assert!(matches!(
            LagConfig::new(i32::MAX as usize, Window::days(365)).validate(),
            Err(LsmError::ConfigError(_))
        ));

        let json = r#"{"periods": 4294967296, "freq": "30min"}"#;
        assert!(matches!(LagConfig::from_json(json), Err(LsmError::ConfigError(_))));
        let json = r#"{"lag": {"periods": 4294967296, "freq": "1d"}, "lag_x": false}"#;
        assert!(matches!(MarkovConfig::from_json(json), Err(LsmError::ConfigError(_))));
    }
}
