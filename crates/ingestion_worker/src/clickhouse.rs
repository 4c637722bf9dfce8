mod commit_handle;
mod sink_initializer;
mod time_series_repository;

pub use commit_handle::*;
pub use sink_initializer::*;
pub use time_series_repository::*;
