//! Data layer: collaborator traits, minute tapes, CSV, Parquet cache, universe.

pub mod cache;
pub mod provider;
pub mod synthetic;
pub mod tape;
pub mod tape_csv;
pub mod universe;

pub use cache::ParquetCache;
pub use provider::{DataError, PriceHistory, UniverseSource};
pub use synthetic::{synthetic_tape, SyntheticSpec};
pub use tape::MinuteTape;
pub use universe::Universe;
