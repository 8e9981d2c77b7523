//! Conversion between polars DataFrames and time series frames

use super::{TimeIndex, TimeSeriesFrame};
use crate::error::{LsmError, Result};
use chrono::{DateTime, NaiveDateTime};
use ndarray::Array2;
use polars::prelude::*;

impl TimeSeriesFrame {
    /// Build a frame from a DataFrame.
    ///
    /// `time_column` must be a `Datetime` column and becomes the index. The
    /// optional `site_column` must hold strings and becomes the site key of the
    /// index. Every other column must be floating-point; nulls become `NaN`.
    pub fn from_dataframe(
        df: &DataFrame,
        time_column: &str,
        site_column: Option<&str>,
    ) -> Result<Self> {
        let times = datetime_values(
            df.column(time_column)
                .map_err(|_| LsmError::FeatureNotFound(time_column.to_string()))?
                .as_materialized_series(),
        )?;

        let index = match site_column {
            Some(name) => {
                let sites = string_values(
                    df.column(name)
                        .map_err(|_| LsmError::FeatureNotFound(name.to_string()))?
                        .as_materialized_series(),
                )?;
                TimeIndex::with_sites(times, sites)?
            }
            None => TimeIndex::new(times),
        };

        // All feature columns are validated before any data is copied
        let mut names: Vec<String> = Vec::new();
        for col in df.get_columns() {
            let name = col.name().as_str();
            if name == time_column || Some(name) == site_column {
                continue;
            }
            match col.dtype() {
                DataType::Float64 | DataType::Float32 => names.push(name.to_string()),
                other => {
                    return Err(LsmError::ValidationError(format!(
                        "column '{}' has non-numeric type {:?}; feature columns must be floating-point",
                        name, other
                    )))
                }
            }
        }

        let col_data: Vec<Vec<f64>> = names
            .iter()
            .map(|name| {
                let series = df.column(name)?.as_materialized_series().cast(&DataType::Float64)?;
                let values: Vec<f64> = series
                    .f64()?
                    .into_iter()
                    .map(|v| v.unwrap_or(f64::NAN))
                    .collect();
                Ok(values)
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;

        let n_rows = df.height();
        let values = Array2::from_shape_fn((n_rows, names.len()), |(r, c)| col_data[c][r]);
        Self::new(index, names, values)
    }

    /// Convert back into a DataFrame with a millisecond `Datetime` time column
    pub fn to_dataframe(&self, time_column: &str, site_column: Option<&str>) -> Result<DataFrame> {
        let millis: Vec<i64> = self
            .index
            .times()
            .iter()
            .map(|t| t.and_utc().timestamp_millis())
            .collect();
        let time = Series::new(time_column.into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;

        let mut columns: Vec<Column> = vec![time.into()];
        if let (Some(name), Some(sites)) = (site_column, self.index.sites()) {
            columns.push(Series::new(name.into(), sites.to_vec()).into());
        }
        for (c, name) in self.columns.iter().enumerate() {
            let values: Vec<f64> = self.values.column(c).to_vec();
            columns.push(Series::new(name.as_str().into(), values).into());
        }

        Ok(DataFrame::new(columns)?)
    }
}

fn datetime_values(series: &Series) -> Result<Vec<NaiveDateTime>> {
    let unit = match series.dtype() {
        DataType::Datetime(unit, _) => *unit,
        other => {
            return Err(LsmError::ValidationError(format!(
                "time column '{}' must be a datetime column, got {:?}",
                series.name(),
                other
            )))
        }
    };

    let (per_second, nanos_per_tick) = match unit {
        TimeUnit::Nanoseconds => (1_000_000_000, 1),
        TimeUnit::Microseconds => (1_000_000, 1_000),
        TimeUnit::Milliseconds => (1_000, 1_000_000),
    };

    let raw = series.cast(&DataType::Int64)?;
    raw.i64()?
        .into_iter()
        .map(|v| {
            let v = v.ok_or_else(|| {
                LsmError::ValidationError("time column contains null timestamps".to_string())
            })?;
            let secs = v.div_euclid(per_second);
            let nanos = (v.rem_euclid(per_second) * nanos_per_tick) as u32;
            DateTime::from_timestamp(secs, nanos)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| LsmError::ValidationError(format!("timestamp {} out of range", v)))
        })
        .collect()
}

fn string_values(series: &Series) -> Result<Vec<String>> {
    let ca = series.str().map_err(|_| {
        LsmError::ValidationError(format!(
            "site column '{}' must be a string column",
            series.name()
        ))
    })?;
    ca.into_iter()
        .map(|v| {
            v.map(str::to_string).ok_or_else(|| {
                LsmError::ValidationError("site column contains null labels".to_string())
            })
        })
        .collect()
}
