//! Runs a benchmark script inside a materialized environment and decodes its result.

pub mod decode;
pub mod executor;

pub use decode::*;
pub use executor::*;
