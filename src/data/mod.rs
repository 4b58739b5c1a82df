//! Price data handling
//!
//! Validated daily OHLCV rows, the CSV universe loader, lagged rolling
//! statistics, and the train-split standardizer for the clustering models.

mod loader;
mod normalize;
mod price;
pub mod rolling;

pub use loader::{load_universe, REQUIRED_COLS};
pub use normalize::Standardizer;
pub use price::{partition_by_ticker, sort_and_validate, PriceRow};
