//! Window tokens and rolling means
//!
//! Windows are written as `<integer><unit>` with unit `min`, `h` or `d`
//! ("30min", "2h", "7d"). A window converts to a row count given the data
//! frequency in hours, and the conversion must be exact.

use crate::error::{LsmError, Result};
use chrono::Duration;
use ndarray::{s, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Token for the current (unaveraged) value of a variable
pub const CURRENT_TOKEN: &str = "cur";

/// Suffix marking a "rolling mean minus current value" window
pub const MINUS_CURRENT_SUFFIX: char = 'M';

/// Unit of a window token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowUnit {
    Minutes,
    Hours,
    Days,
}

impl WindowUnit {
    fn suffix(&self) -> &'static str {
        match self {
            WindowUnit::Minutes => "min",
            WindowUnit::Hours => "h",
            WindowUnit::Days => "d",
        }
    }
}

/// A time span such as "30min" or "7d"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Window {
    amount: u32,
    unit: WindowUnit,
}

impl Window {
    pub fn new(amount: u32, unit: WindowUnit) -> Self {
        Self { amount, unit }
    }

    pub fn minutes(amount: u32) -> Self {
        Self::new(amount, WindowUnit::Minutes)
    }

    pub fn hours(amount: u32) -> Self {
        Self::new(amount, WindowUnit::Hours)
    }

    pub fn days(amount: u32) -> Self {
        Self::new(amount, WindowUnit::Days)
    }

    /// Parse a token like "30min", "2h" or "7d"
    pub fn parse(token: &str) -> Result<Self> {
        let split = token
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(token.len());
        let (digits, unit) = token.split_at(split);

        let amount: u32 = digits.parse().map_err(|_| {
            LsmError::ConfigError(format!("window \"{}\" has no leading integer amount", token))
        })?;
        let unit = match unit {
            "min" => WindowUnit::Minutes,
            "h" => WindowUnit::Hours,
            "d" => WindowUnit::Days,
            other => {
                return Err(LsmError::ConfigError(format!(
                    "unknown frequency \"{}\" in window \"{}\"",
                    other, token
                )))
            }
        };
        Ok(Self { amount, unit })
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn unit(&self) -> WindowUnit {
        self.unit
    }

    /// Number of rows spanned by this window at `datafreq` hours per row.
    ///
    /// Fails when the result is not a positive integer.
    pub fn rows(&self, datafreq: f64) -> Result<usize> {
        if !datafreq.is_finite() || datafreq <= 0.0 {
            return Err(LsmError::ConfigError(format!(
                "data frequency must be a positive number of hours, got {}",
                datafreq
            )));
        }

        let n = self.amount as f64;
        let rows = match self.unit {
            WindowUnit::Minutes => n / (60.0 * datafreq),
            WindowUnit::Hours => n / datafreq,
            WindowUnit::Days => n * 24.0 / datafreq,
        };

        let rounded = rows.round();
        if (rows - rounded).abs() > 1e-9 * rounded.max(1.0) {
            return Err(LsmError::ConfigError(format!(
                "window \"{}\" doesn't match data frequency {}h - not integral result ({} rows)",
                self, datafreq, rows
            )));
        }
        if rounded < 1.0 {
            return Err(LsmError::ConfigError(format!(
                "window \"{}\" spans no rows at data frequency {}h",
                self, datafreq
            )));
        }
        Ok(rounded as usize)
    }

    /// Window length as a time span
    pub fn duration(&self) -> Duration {
        let n = self.amount as i64;
        match self.unit {
            WindowUnit::Minutes => Duration::minutes(n),
            WindowUnit::Hours => Duration::hours(n),
            WindowUnit::Days => Duration::days(n),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for Window {
    type Err = LsmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Window {
    type Error = LsmError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Window> for String {
    fn from(w: Window) -> Self {
        w.to_string()
    }
}

/// One lagged feature of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WindowSpec {
    /// The current value ("cur")
    Current,
    /// Exclusive trailing mean over the window ("2h")
    Mean(Window),
    /// Exclusive trailing mean minus the current value ("2hM")
    MeanMinusCurrent(Window),
}

impl WindowSpec {
    /// Parse a token: "cur", a window, or a window with a trailing `M`
    pub fn parse(token: &str) -> Result<Self> {
        if token == CURRENT_TOKEN {
            return Ok(WindowSpec::Current);
        }
        match token.strip_suffix(MINUS_CURRENT_SUFFIX) {
            Some(window) => Ok(WindowSpec::MeanMinusCurrent(Window::parse(window)?)),
            None => Ok(WindowSpec::Mean(Window::parse(token)?)),
        }
    }

    /// The averaging window, if any
    pub fn window(&self) -> Option<Window> {
        match self {
            WindowSpec::Current => None,
            WindowSpec::Mean(w) | WindowSpec::MeanMinusCurrent(w) => Some(*w),
        }
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowSpec::Current => write!(f, "{}", CURRENT_TOKEN),
            WindowSpec::Mean(w) => write!(f, "{}", w),
            WindowSpec::MeanMinusCurrent(w) => write!(f, "{}{}", w, MINUS_CURRENT_SUFFIX),
        }
    }
}

impl FromStr for WindowSpec {
    type Err = LsmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WindowSpec {
    type Error = LsmError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<WindowSpec> for String {
    fn from(w: WindowSpec) -> Self {
        w.to_string()
    }
}

/// Number of rows for a window token at `datafreq` hours per row
pub fn window_to_rows(window: &str, datafreq: f64) -> Result<usize> {
    Window::parse(window)?.rows(datafreq)
}

/// Neumaier-compensated running sum. Keeps small terms that a plain `f64`
/// sum drops next to a large one, including after the large one is removed.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    pub(crate) fn add(&mut self, v: f64) {
        let t = self.sum + v;
        if self.sum.abs() >= v.abs() {
            self.compensation += (self.sum - t) + v;
        } else {
            self.compensation += (v - t) + self.sum;
        }
        self.sum = t;
    }

    pub(crate) fn value(&self) -> f64 {
        self.sum + self.compensation
    }

    /// `self - earlier`, where both accumulate the same sequence
    pub(crate) fn since(&self, earlier: &CompensatedSum) -> f64 {
        (self.sum - earlier.sum) + (self.compensation - earlier.compensation)
    }
}

impl FromIterator<f64> for CompensatedSum {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut sum = Self::default();
        for v in iter {
            sum.add(v);
        }
        sum
    }
}

/// Trailing rolling mean of every column of `data`.
///
/// `shift = 0` gives an inclusive mean ending at the current row, `shift = 1`
/// an exclusive mean over the preceding rows only. Rows without enough
/// history are `NaN`.
pub fn rolling_mean(
    data: ArrayView2<'_, f64>,
    window: &str,
    datafreq: f64,
    shift: isize,
) -> Result<Array2<f64>> {
    let rows = window_to_rows(window, datafreq)?;
    rolling_mean_rows(data, rows, shift)
}

/// Rolling mean over an explicit row count. See [`rolling_mean`].
pub fn rolling_mean_rows(data: ArrayView2<'_, f64>, rows: usize, shift: isize) -> Result<Array2<f64>> {
    let shift = match shift {
        0 | 1 => shift as usize,
        s if s < 0 => {
            return Err(LsmError::ConfigError(
                "negative rolling-mean shifts are not implemented".to_string(),
            ))
        }
        s => {
            return Err(LsmError::ConfigError(format!(
                "unsupported rolling-mean shift {}; use 0 (inclusive) or 1 (exclusive)",
                s
            )))
        }
    };
    if rows == 0 {
        return Err(LsmError::ConfigError(
            "rolling window must span at least one row".to_string(),
        ));
    }

    let (n, m) = data.dim();
    let mut result = Array2::from_elem((n, m), f64::NAN);

    for (c, col) in data.axis_iter(Axis(1)).enumerate() {
        // Compensated sum of the finite values in source rows [j + 1 - rows, j].
        // Any non-finite value in the window makes the mean NaN.
        let mut sum = CompensatedSum::default();
        let mut n_missing = 0usize;

        for j in 0..n {
            let v = col[j];
            if v.is_finite() {
                sum.add(v);
            } else {
                n_missing += 1;
            }

            if j >= rows {
                let old = col[j - rows];
                if old.is_finite() {
                    sum.add(-old);
                } else {
                    n_missing -= 1;
                }
            }

            // Resum from the window's own values once per window length
            if (j + 1) % rows == 0 {
                sum = col
                    .slice(s![j + 1 - rows..=j])
                    .iter()
                    .filter(|v| v.is_finite())
                    .copied()
                    .collect();
            }

            let target = j + shift;
            if j + 1 >= rows && target < n {
                result[[target, c]] = if n_missing > 0 {
                    f64::NAN
                } else {
                    sum.value() / rows as f64
                };
            }
        }
    }

    Ok(result)
}

/// Standard averaging windows, from half an hour up to a year
pub fn standard_windows() -> Vec<Window> {
    vec![
        Window::minutes(30),
        Window::hours(1),
        Window::hours(2),
        Window::hours(3),
        Window::hours(4),
        Window::hours(5),
        Window::hours(6),
        Window::hours(12),
        Window::days(1),
        Window::days(2),
        Window::days(3),
        Window::days(5),
        Window::days(7),
        Window::days(14),
        Window::days(30),
        Window::days(60),
        Window::days(90),
        Window::days(180),
        Window::days(365),
    ]
}

/// Rows of `data` where every value is finite
pub fn drop_missing_rows(data: ArrayView2<'_, f64>) -> Array2<f64> {
    let keep: Vec<usize> = data
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
        .map(|(i, _)| i)
        .collect();
    data.select(Axis(0), &keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_window_to_rows_half_hourly() {
        assert_eq!(window_to_rows("30min", 0.5).unwrap(), 1);
        assert_eq!(window_to_rows("1h", 0.5).unwrap(), 2);
        assert_eq!(window_to_rows("7d", 0.5).unwrap(), 336);
    }

    #[test]
    fn test_window_to_rows_not_integral() {
        let result = window_to_rows("45min", 1.0);
        assert!(matches!(result, Err(LsmError::ConfigError(_))));
    }

    #[test]
    fn test_window_unknown_unit() {
        assert!(matches!(window_to_rows("3w", 0.5), Err(LsmError::ConfigError(_))));
        assert!(matches!(window_to_rows("h", 0.5), Err(LsmError::ConfigError(_))));
        assert!(matches!(window_to_rows("0h", 0.5), Err(LsmError::ConfigError(_))));
    }

    #[test]
    fn test_window_spec_tokens() {
        assert_eq!(WindowSpec::parse("cur").unwrap(), WindowSpec::Current);
        assert_eq!(WindowSpec::parse("2h").unwrap(), WindowSpec::Mean(Window::hours(2)));
        assert_eq!(
            WindowSpec::parse("7dM").unwrap(),
            WindowSpec::MeanMinusCurrent(Window::days(7))
        );
        assert_eq!(WindowSpec::parse("30min").unwrap().to_string(), "30min");
        assert_eq!(WindowSpec::MeanMinusCurrent(Window::days(7)).to_string(), "7dM");
    }

    #[test]
    fn test_rolling_mean_inclusive() {
        let data = array![[1.0], [2.0], [3.0], [4.0]];
        let result = rolling_mean(data.view(), "1h", 0.5, 0).unwrap();

        assert!(result[[0, 0]].is_nan());
        assert!((result[[1, 0]] - 1.5).abs() < 1e-12);
        assert!((result[[2, 0]] - 2.5).abs() < 1e-12);
        assert!((result[[3, 0]] - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_mean_exclusive() {
        let data = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let result = rolling_mean(data.view(), "1h", 0.5, 1).unwrap();

        assert!(result[[0, 0]].is_nan());
        assert!(result[[1, 0]].is_nan());
        assert!((result[[2, 0]] - 1.5).abs() < 1e-12);
        assert!((result[[3, 1]] - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_mean_nan_propagates_only_within_window() {
        let data = array![[1.0], [f64::NAN], [3.0], [5.0], [7.0]];
        let result = rolling_mean_rows(data.view(), 2, 0).unwrap();

        assert!(result[[1, 0]].is_nan());
        assert!(result[[2, 0]].is_nan());
        assert!((result[[3, 0]] - 4.0).abs() < 1e-12);
        assert!((result[[4, 0]] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_mean_infinite_value_only_spoils_its_windows() {
        let data = array![[1.0], [f64::INFINITY], [2.0], [4.0], [6.0], [8.0]];
        let result = rolling_mean(data.view(), "1h", 0.5, 0).unwrap();

        assert!(result[[1, 0]].is_nan());
        assert!(result[[2, 0]].is_nan());
        assert_eq!(result[[3, 0]], 3.0);
        assert_eq!(result[[4, 0]], 5.0);
        assert_eq!(result[[5, 0]], 7.0);
    }

    #[test]
    fn test_rolling_mean_after_large_value_leaves_window() {
        let data = array![[1e17], [1.0], [1.0], [1.0]];
        let result = rolling_mean(data.view(), "1h", 0.5, 0).unwrap();
        assert_eq!(result[[2, 0]], 1.0);
        assert_eq!(result[[3, 0]], 1.0);

        // Three-row window, so the large value leaves between resums
        let data = array![[1e17], [1.0], [2.0], [3.0], [4.0]];
        let result = rolling_mean_rows(data.view(), 3, 1).unwrap();
        assert_eq!(result[[4, 0]], 2.0);
    }

    #[test]
    fn test_compensated_sum_keeps_small_terms() {
        let mut sum = CompensatedSum::default();
        let start = sum;
        for v in [1e17, 1.0, 1.0, -1e17] {
            sum.add(v);
        }
        assert_eq!(sum.value(), 2.0);
        assert_eq!(sum.since(&start), 2.0);
    }

    #[test]
    fn test_rolling_mean_rejects_shifts() {
        let data = array![[1.0], [2.0]];
        assert!(matches!(
            rolling_mean(data.view(), "1h", 0.5, -1),
            Err(LsmError::ConfigError(_))
        ));
        assert!(matches!(
            rolling_mean(data.view(), "1h", 0.5, 2),
            Err(LsmError::ConfigError(_))
        ));
    }

    #[test]
    fn test_rolling_mean_short_series_all_nan() {
        let data = array![[1.0], [2.0], [3.0]];
        let result = rolling_mean(data.view(), "1d", 0.5, 1).unwrap();
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_standard_windows_are_half_hour_compatible() {
        for w in standard_windows() {
            assert!(w.rows(0.5).is_ok(), "{} should convert at 30min", w);
        }
    }

    #[test]
    fn test_drop_missing_rows() {
        let data = array![[1.0, 2.0], [f64::NAN, 1.0], [3.0, f64::INFINITY], [4.0, 5.0]];
        let kept = drop_missing_rows(data.view());
        assert_eq!(kept, array![[1.0, 2.0], [4.0, 5.0]]);
    }
}
