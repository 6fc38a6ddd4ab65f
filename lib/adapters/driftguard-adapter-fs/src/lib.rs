//! Filesystem-backed ports: the model weight store and the CSV series source.

mod clean;
mod csv_source;
mod weight_store;

pub use clean::{clean_frame, summarize, to_observations};
pub use csv_source::CsvSeriesSource;
pub use weight_store::FsWeightStore;
