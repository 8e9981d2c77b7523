//! Fit a recursive window-average model on synthetic tower data and
//! predict latent heat for a second synthetic series.
//!
//! Run with `RUST_LOG=empirical_lsm=debug` for per-step progress.

use chrono::{Duration, NaiveDate};
use empirical_lsm::prelude::*;
use rand::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn synthetic_site(rng: &mut StdRng, n: usize) -> Result<(TimeSeriesFrame, TimeSeriesFrame)> {
    let start = NaiveDate::from_ymd_opt(2010, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| LsmError::ConfigError("invalid start date".to_string()))?;
    let index = TimeIndex::regular(start, Duration::minutes(30), n)?;

    let swdown: Vec<f64> = (0..n)
        .map(|i| {
            let hour = (i % 48) as f64 / 2.0;
            let sun = (std::f64::consts::PI * (hour - 6.0) / 12.0).sin().max(0.0);
            800.0 * sun + rng.gen::<f64>() * 20.0
        })
        .collect();
    let tair: Vec<f64> = swdown.iter().map(|s| 285.0 + s / 100.0).collect();

    let mut qle = vec![0.0; n];
    for t in 1..n {
        qle[t] = 0.6 * qle[t - 1] + 0.12 * swdown[t] + rng.gen::<f64>();
    }

    let x = TimeSeriesFrame::from_columns(index.clone(), vec![("SWdown", swdown), ("Tair", tair)])?;
    let y = TimeSeriesFrame::from_columns(index, vec![("Qle", qle)])?;
    Ok((x, y))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("empirical_lsm=info")),
        )
        .init();

    let mut rng = StdRng::seed_from_u64(42);
    let (x_train, y_train) = synthetic_site(&mut rng, 48 * 30)?;
    let (x_test, y_test) = synthetic_site(&mut rng, 48 * 7)?;

    let lags = VarLags::new()
        .with_var("SWdown", &["cur", "2h"])?
        .with_var("Tair", &["cur", "1d"])?
        .with_var("Qle", &["30min", "6h"])?;
    let config = LagAverageConfig::new(lags).with_feedback(FeedbackWindow::Trailing);
    info!("Config:\n{}", config.to_json()?);

    let mut model = MarkovLagAverageWrapper::with_config(LinearRegression::new(), config)?;
    model.fit(&x_train, &y_train)?;
    let pred = model.predict(&x_test)?;

    let observed = y_test.column("Qle")?;
    let predicted = pred.column("Qle")?;
    let rmse = (observed
        .iter()
        .zip(predicted.iter())
        .map(|(o, p)| (o - p).powi(2))
        .sum::<f64>()
        / observed.len() as f64)
        .sqrt();
    info!("Predicted {} steps, RMSE {:.2} W/m2", pred.height(), rmse);

    Ok(())
}
