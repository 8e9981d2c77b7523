//! Time-based lagging of frame columns

use crate::error::{LsmError, Result};
use crate::frame::TimeSeriesFrame;
use chrono::{Duration, NaiveDateTime};
use ndarray::Array2;
use std::collections::HashMap;

/// Suffix appended to lagged column names
pub const LAG_SUFFIX: &str = "_lag";

/// Name of the lagged copy of a column
pub fn lagged_name(column: &str) -> String {
    format!("{}{}", column, LAG_SUFFIX)
}

/// Lags frame columns by `periods` steps of `freq`.
///
/// The lagged value of a row at time `t` is the value of the row stamped
/// `t - periods * freq`, looked up within the same site when grouping by site.
/// Rows with no such predecessor get `NaN`.
#[derive(Debug, Clone)]
pub struct Lagger {
    periods: usize,
    freq: Duration,
    group_by_site: bool,
    columns: Option<Vec<String>>,
    lagged_only: bool,
}

impl Lagger {
    /// Create a lagger for `periods` steps of `freq`
    pub fn new(periods: usize, freq: Duration) -> Self {
        Self {
            periods,
            freq,
            group_by_site: false,
            columns: None,
            lagged_only: false,
        }
    }

    /// Lag each site's timeline independently
    pub fn with_site_grouping(mut self, group_by_site: bool) -> Self {
        self.group_by_site = group_by_site;
        self
    }

    /// Only lag these columns (default: all)
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Return only the lagged columns instead of joining them to the input
    pub fn with_lagged_only(mut self, lagged_only: bool) -> Self {
        self.lagged_only = lagged_only;
        self
    }

    /// Total time offset of the lag. Fails when `periods * freq` overflows.
    pub fn offset(&self) -> Result<Duration> {
        i32::try_from(self.periods)
            .ok()
            .and_then(|periods| self.freq.checked_mul(periods))
            .ok_or_else(|| {
                LsmError::ConfigError(format!(
                    "lag of {} periods of {} is out of range",
                    self.periods, self.freq
                ))
            })
    }

    /// Apply the lag to a frame
    pub fn transform(&self, frame: &TimeSeriesFrame) -> Result<TimeSeriesFrame> {
        if self.group_by_site && !frame.index().has_sites() {
            return Err(LsmError::ValidationError(
                "site grouping requested but the frame has no site index".to_string(),
            ));
        }

        let selected = match &self.columns {
            Some(columns) => frame.select(columns)?,
            None => frame.clone(),
        };

        let index = frame.index();
        let times = index.times();
        let site_of = |row: usize| {
            if self.group_by_site {
                index.site(row)
            } else {
                None
            }
        };

        let mut lookup: HashMap<(Option<&str>, NaiveDateTime), usize> =
            HashMap::with_capacity(times.len());
        for (row, &t) in times.iter().enumerate() {
            if lookup.insert((site_of(row), t), row).is_some() {
                return Err(LsmError::ValidationError(format!(
                    "duplicate timestamp {} in lag input{}",
                    t,
                    if self.group_by_site {
                        ""
                    } else {
                        " (multi-site data must be lagged per site)"
                    }
                )));
            }
        }

        let offset = self.offset()?;
        let mut lagged = Array2::from_elem((selected.height(), selected.width()), f64::NAN);
        for (row, &t) in times.iter().enumerate() {
            let from = t.checked_sub_signed(offset).ok_or_else(|| {
                LsmError::ConfigError(format!(
                    "lag of {} from {} falls outside the supported date range",
                    offset, t
                ))
            })?;
            if let Some(&source) = lookup.get(&(site_of(row), from)) {
                lagged.row_mut(row).assign(&selected.values().row(source));
            }
        }

        let names = selected.columns().iter().map(|c| lagged_name(c)).collect();
        let lagged = frame.with_values(names, lagged)?;

        if self.lagged_only {
            Ok(lagged)
        } else {
            frame.hstack(&lagged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TimeIndex;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2010, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_lag_single_series() {
        let index = TimeIndex::regular(start(), Duration::minutes(30), 4).unwrap();
        let frame =
            TimeSeriesFrame::from_columns(index, vec![("Tair", vec![1.0, 2.0, 3.0, 4.0])]).unwrap();

        let lagged = Lagger::new(1, Duration::minutes(30)).transform(&frame).unwrap();
        assert_eq!(lagged.columns(), &["Tair".to_string(), "Tair_lag".to_string()]);

        let col = lagged.column("Tair_lag").unwrap();
        assert!(col[0].is_nan());
        assert_eq!(col[1], 1.0);
        assert_eq!(col[3], 3.0);
    }

    #[test]
    fn test_lag_respects_time_gaps() {
        // Missing 00:30 row: the 01:00 row has no predecessor
        let times = vec![
            start(),
            start() + Duration::hours(1),
            start() + Duration::minutes(90),
        ];
        let frame = TimeSeriesFrame::from_columns(
            TimeIndex::new(times),
            vec![("Qle", vec![10.0, 20.0, 30.0])],
        )
        .unwrap();

        let lagged = Lagger::new(1, Duration::minutes(30))
            .with_lagged_only(true)
            .transform(&frame)
            .unwrap();
        assert_eq!(lagged.width(), 1);
        let col = lagged.column("Qle_lag").unwrap();
        assert!(col[0].is_nan());
        assert!(col[1].is_nan());
        assert_eq!(col[2], 20.0);
    }

    #[test]
    fn test_lag_grouping_requires_sites() {
        let index = TimeIndex::regular(start(), Duration::minutes(30), 2).unwrap();
        let frame = TimeSeriesFrame::from_columns(index, vec![("Tair", vec![1.0, 2.0])]).unwrap();

        let result = Lagger::new(1, Duration::minutes(30))
            .with_site_grouping(true)
            .transform(&frame);
        assert!(matches!(result, Err(LsmError::ValidationError(_))));
    }

    #[test]
    fn test_lag_selected_columns() {
        let index = TimeIndex::regular(start(), Duration::hours(1), 3).unwrap();
        let frame = TimeSeriesFrame::from_columns(
            index,
            vec![("Tair", vec![1.0, 2.0, 3.0]), ("Wind", vec![4.0, 5.0, 6.0])],
        )
        .unwrap();

        let lagged = Lagger::new(2, Duration::hours(1))
            .with_columns(vec!["Wind".to_string()])
            .transform(&frame)
            .unwrap();
        assert_eq!(lagged.width(), 3);
        assert_eq!(lagged.column("Wind_lag").unwrap()[2], 4.0);

        let missing = Lagger::new(1, Duration::hours(1))
            .with_columns(vec!["Rainf".to_string()])
            .transform(&frame);
        assert!(matches!(missing, Err(LsmError::FeatureNotFound(_))));
    }

    #[test]
    fn test_offset_out_of_range() {
        let too_many = Lagger::new(i32::MAX as usize + 1, Duration::minutes(30));
        assert!(matches!(too_many.offset(), Err(LsmError::ConfigError(_))));

        let too_long = Lagger::new(i32::MAX as usize, Duration::days(365));
        assert!(matches!(too_long.offset(), Err(LsmError::ConfigError(_))));

        assert_eq!(Lagger::new(3, Duration::hours(2)).offset().unwrap(), Duration::hours(6));
    }

    #[test]
    fn test_lag_past_calendar_range_is_an_error() {
        let index = TimeIndex::regular(start(), Duration::minutes(30), 2).unwrap();
        let frame = TimeSeriesFrame::from_columns(index, vec![("Tair", vec![1.0, 2.0])]).unwrap();

        let result = Lagger::new(300_000, Duration::days(365)).transform(&frame);
        assert!(matches!(result, Err(LsmError::ConfigError(_))));
    }
}
