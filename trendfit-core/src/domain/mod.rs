//! Domain types for TrendFit

pub mod bar;
pub mod ids;
pub mod series;
pub mod weight_vector;

pub use bar::MinuteBar;
pub use ids::{DatasetHash, InstrumentId};
pub use series::{PriceSeries, MINUTES_PER_DAY};
pub use weight_vector::WeightVector;
