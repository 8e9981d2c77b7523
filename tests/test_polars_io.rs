//! Integration tests for loading flux tower data from polars DataFrames

use empirical_lsm::prelude::*;
use polars::prelude::*;

fn half_hourly(n: usize) -> Series {
    // 2012-01-01T00:00 in milliseconds
    let start = 1_325_376_000_000_i64;
    let millis: Vec<i64> = (0..n as i64).map(|i| start + i * 1_800_000).collect();
    Series::new("time".into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .unwrap()
}

fn tower_data(n: usize) -> DataFrame {
    let mut df = df!(
        "SWdown" => (0..n).map(|i| ((i * 37) % 800) as f64).collect::<Vec<_>>(),
        "Tair" => (0..n).map(|i| 280.0 + ((i * 11) % 20) as f64).collect::<Vec<_>>(),
        "Qle" => (0..n).map(|i| ((i * 37) % 800) as f64 * 0.4).collect::<Vec<_>>()
    )
    .unwrap();
    df.with_column(half_hourly(n)).unwrap();
    df
}

#[test]
fn test_lag_average_pipeline_from_dataframe() {
    let df = tower_data(200);
    let frame = TimeSeriesFrame::from_dataframe(&df, "time", None).unwrap();
    assert_eq!(frame.columns(), &["SWdown", "Tair", "Qle"]);

    let x = frame.select(&["SWdown", "Tair"]).unwrap();
    let y = frame.select(&["Qle"]).unwrap();

    let lags = VarLags::new()
        .with_var("SWdown", &["cur", "2h"])
        .unwrap()
        .with_var("Tair", &["cur", "1d"])
        .unwrap();
    let mut model = LagAverageWrapper::new(lags, LinearRegression::new()).unwrap();
    model.fit(&x, &y).unwrap();

    let pred = model.predict(&x).unwrap();
    let out = pred.to_dataframe("time", None).unwrap();
    assert_eq!(out.height(), 200);
    assert_eq!(out.width(), 2);

    // Qle is an exact multiple of current SWdown
    let qle = out
        .column("Qle")
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .get(150)
        .unwrap();
    assert!((qle - ((150 * 37) % 800) as f64 * 0.4).abs() < 1e-6);
}

#[test]
fn test_multi_site_dataframe() {
    let mut df = tower_data(6);
    let sites = Series::new("site".into(), vec!["AU-Tum", "AU-Tum", "AU-Tum", "US-Ha1", "US-Ha1", "US-Ha1"]);
    df.with_column(sites).unwrap();

    let frame = TimeSeriesFrame::from_dataframe(&df, "time", Some("site")).unwrap();
    assert!(!frame.has_column("site"));
    assert_eq!(frame.index().site_groups().len(), 2);

    let back = frame.to_dataframe("time", Some("site")).unwrap();
    assert_eq!(back.width(), 5);
}

#[test]
fn test_missing_time_column() {
    let df = df!("Tair" => &[1.0, 2.0]).unwrap();
    let result = TimeSeriesFrame::from_dataframe(&df, "time", None);
    assert!(matches!(result, Err(LsmError::FeatureNotFound(_))));
}
