//! Time-indexed numeric tables
//!
//! A [`TimeSeriesFrame`] holds named `f64` columns over a [`TimeIndex`]. The
//! index carries the timestamp of every row and, for multi-site data, the site
//! label. Sites live in the index, never in the columns, and every lag or
//! window operation is scoped to a single site's rows.

mod polars_io;

use crate::error::{LsmError, Result};
use chrono::{Duration, NaiveDateTime};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::collections::{HashMap, HashSet};

/// Name of the site key, both as an index level and as a forbidden column name
pub const SITE_KEY: &str = "site";

/// Row index of a time series table
#[derive(Debug, Clone, PartialEq)]
pub struct TimeIndex {
    times: Vec<NaiveDateTime>,
    sites: Option<Vec<String>>,
}

/// Rows belonging to one site, in their original order
#[derive(Debug, Clone, PartialEq)]
pub struct SiteGroup {
    /// Site label (`None` for single-site data)
    pub site: Option<String>,
    /// Row positions of this site within the frame
    pub rows: Vec<usize>,
}

impl TimeIndex {
    /// Create a single-site index
    pub fn new(times: Vec<NaiveDateTime>) -> Self {
        Self { times, sites: None }
    }

    /// Create a multi-site index
    pub fn with_sites(times: Vec<NaiveDateTime>, sites: Vec<String>) -> Result<Self> {
        if times.len() != sites.len() {
            return Err(LsmError::ValidationError(format!(
                "index has {} timestamps but {} site labels",
                times.len(),
                sites.len()
            )));
        }
        Ok(Self {
            times,
            sites: Some(sites),
        })
    }

    /// Regularly spaced single-site index. Fails when the last timestamp is
    /// past the supported date range.
    pub fn regular(start: NaiveDateTime, step: Duration, n: usize) -> Result<Self> {
        let times = (0..n)
            .map(|i| {
                i32::try_from(i)
                    .ok()
                    .and_then(|i| step.checked_mul(i))
                    .and_then(|offset| start.checked_add_signed(offset))
                    .ok_or_else(|| {
                        LsmError::ConfigError(format!(
                            "step {} of {} from {} is out of range",
                            i, step, start
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(times))
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn sites(&self) -> Option<&[String]> {
        self.sites.as_deref()
    }

    pub fn has_sites(&self) -> bool {
        self.sites.is_some()
    }

    /// Site label of a row, if the index has sites
    pub fn site(&self, row: usize) -> Option<&str> {
        self.sites.as_ref().map(|s| s[row].as_str())
    }

    /// Index restricted to the given rows, in the given order
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            times: rows.iter().map(|&r| self.times[r]).collect(),
            sites: self
                .sites
                .as_ref()
                .map(|s| rows.iter().map(|&r| s[r].clone()).collect()),
        }
    }

    /// Split rows by site, sites ordered by first appearance
    pub fn site_groups(&self) -> Vec<SiteGroup> {
        let sites = match &self.sites {
            Some(sites) => sites,
            None => {
                return vec![SiteGroup {
                    site: None,
                    rows: (0..self.len()).collect(),
                }]
            }
        };

        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<SiteGroup> = Vec::new();
        for (row, site) in sites.iter().enumerate() {
            let pos = *positions.entry(site.as_str()).or_insert_with(|| {
                groups.push(SiteGroup {
                    site: Some(site.clone()),
                    rows: Vec::new(),
                });
                groups.len() - 1
            });
            groups[pos].rows.push(row);
        }
        groups
    }
}

/// Named `f64` columns over a time index. Missing values are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesFrame {
    index: TimeIndex,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl TimeSeriesFrame {
    /// Create a frame, checking that shapes and column names agree
    pub fn new(index: TimeIndex, columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != index.len() {
            return Err(LsmError::ShapeError {
                expected: format!("{} rows", index.len()),
                actual: format!("{} rows", values.nrows()),
            });
        }
        if values.ncols() != columns.len() {
            return Err(LsmError::ShapeError {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", values.ncols()),
            });
        }
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(LsmError::ValidationError(format!(
                    "duplicate column name '{}'",
                    name
                )));
            }
        }
        Ok(Self {
            index,
            columns,
            values,
        })
    }

    /// Build a frame from `(name, values)` pairs
    pub fn from_columns<S: Into<String>>(index: TimeIndex, columns: Vec<(S, Vec<f64>)>) -> Result<Self> {
        let n_rows = index.len();
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            let name = name.into();
            if values.len() != n_rows {
                return Err(LsmError::ShapeError {
                    expected: format!("{} values in column '{}'", n_rows, name),
                    actual: format!("{} values", values.len()),
                });
            }
            names.push(name);
            data.push(values);
        }
        let values = Array2::from_shape_fn((n_rows, names.len()), |(r, c)| data[c][r]);
        Self::new(index, names, values)
    }

    pub fn index(&self) -> &TimeIndex {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_position(name).is_some()
    }

    /// View of a single named column
    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let pos = self
            .column_position(name)
            .ok_or_else(|| LsmError::FeatureNotFound(name.to_string()))?;
        Ok(self.values.column(pos))
    }

    /// Frame with only the named columns, in the given order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let positions = names
            .iter()
            .map(|n| {
                self.column_position(n.as_ref())
                    .ok_or_else(|| LsmError::FeatureNotFound(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<usize>>>()?;
        Self::new(
            self.index.clone(),
            names.iter().map(|n| n.as_ref().to_string()).collect(),
            self.values.select(Axis(1), &positions),
        )
    }

    /// Join another frame's columns onto this one. Both frames must share the index.
    pub fn hstack(&self, other: &TimeSeriesFrame) -> Result<Self> {
        if self.index != other.index {
            return Err(LsmError::ValidationError(
                "cannot join frames with different indexes".to_string(),
            ));
        }
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        let values = ndarray::concatenate(Axis(1), &[self.values.view(), other.values.view()])?;
        Self::new(self.index.clone(), columns, values)
    }

    /// Frame restricted to the given rows
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            index: self.index.take(rows),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }

    /// New frame over the same index with different data
    pub fn with_values(&self, columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        Self::new(self.index.clone(), columns, values)
    }

    /// Per-column mean, ignoring missing values
    pub fn nan_means(&self) -> Array1<f64> {
        nan_mean_axis0(self.values.view())
    }

    /// Whether any value is non-finite
    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }

    /// Positions of rows without any `NaN`
    pub fn complete_rows(&self) -> Vec<usize> {
        self.values
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| !v.is_nan()))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn into_parts(self) -> (TimeIndex, Vec<String>, Array2<f64>) {
        (self.index, self.columns, self.values)
    }
}

/// Column means over finite values; all-missing columns give `NaN`
pub(crate) fn nan_mean_axis0(values: ArrayView2<'_, f64>) -> Array1<f64> {
    values
        .columns()
        .into_iter()
        .map(|col| {
            let (sum, count) = col
                .iter()
                .filter(|v| v.is_finite())
                .fold((0.0_f64, 0usize), |(s, n), v| (s + v, n + 1));
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect()
}

/// Row mask: `true` where every value in the row is finite
pub(crate) fn finite_row_mask(values: ArrayView2<'_, f64>) -> Vec<bool> {
    values
        .rows()
        .into_iter()
        .map(|row| row.iter().all(|v| v.is_finite()))
        .collect()
}
