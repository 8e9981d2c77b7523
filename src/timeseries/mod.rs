//! Time series module
//!
//! Provides the feature engineering used by the model wrappers:
//! - Window tokens ("30min", "2h", "7d") and their row counts
//! - Trailing rolling means with inclusive or exclusive windows
//! - Time-based lags, optionally scoped per site

mod lag;
mod window;

pub use lag::{lagged_name, Lagger, LAG_SUFFIX};
pub(crate) use window::CompensatedSum;
pub use window::{
    drop_missing_rows, rolling_mean, rolling_mean_rows, standard_windows, window_to_rows, Window,
    WindowSpec, WindowUnit, CURRENT_TOKEN, MINUS_CURRENT_SUFFIX,
};
