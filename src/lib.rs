//! Empirical LSM - lagged regression wrappers for land-surface flux estimation
//!
//! This crate turns any regression [`models::Estimator`] into a time-aware flux
//! model by engineering lagged and window-averaged features from
//! meteorological drivers:
//! - Window tokens ("30min", "2h", "7d") and exclusive trailing means
//! - Time-based lags scoped per site
//! - Recursive (Markov) prediction that feeds a model's own output back as input
//!
//! # Modules
//!
//! - [`frame`] - time-indexed numeric frames, with polars interop
//! - [`timeseries`] - windowing utilities and the lag transform
//! - [`models`] - the estimator capability and baseline estimators
//! - [`wrappers`] - lag, Markov, lag-average and missing-data wrappers
//!
//! # Example
//!
//! ```no_run
//! use empirical_lsm::prelude::*;
//!
//! # fn run(x: &TimeSeriesFrame, y: &TimeSeriesFrame) -> Result<()> {
//! let lags = VarLags::new()
//!     .with_var("SWdown", &["cur", "2h"])?
//!     .with_var("Tair", &["cur", "1d", "7dM"])?;
//! let mut model = LagAverageWrapper::new(lags, LinearRegression::new())?;
//! model.fit(x, y)?;
//! let fluxes = model.predict(x)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod frame;
pub mod models;
pub mod timeseries;
pub mod wrappers;

pub use error::{LsmError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{LsmError, Result};

    // Frames
    pub use crate::frame::{SiteGroup, TimeIndex, TimeSeriesFrame, SITE_KEY};

    // Models
    pub use crate::models::{Estimator, LinearRegression, MeanEstimator};

    // Time series
    pub use crate::timeseries::{
        drop_missing_rows, rolling_mean, standard_windows, window_to_rows, Lagger, Window,
        WindowSpec,
    };

    // Wrappers
    pub use crate::wrappers::{
        FeedbackWindow, FluxEstimator, LagAverageConfig, LagAverageWrapper, LagConfig, LagWrapper,
        MarkovConfig, MarkovLagAverageWrapper, MarkovWrapper, MissingDataWrapper, NanPolicy,
        VarLags, FLUX_VARIABLES,
    };
}
