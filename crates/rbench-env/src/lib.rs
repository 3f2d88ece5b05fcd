//! Materializes an isolated dependency environment for one benchmark run.

pub mod builder;
pub mod manifest;
pub mod settings;

pub use builder::*;
pub use manifest::*;
pub use settings::*;
