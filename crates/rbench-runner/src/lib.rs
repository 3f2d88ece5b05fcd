pub mod config;
pub mod doctor;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod persist;
pub mod pipeline;
pub mod probe;
pub mod runner;
pub mod util;

pub use config::*;
pub use doctor::*;
pub use persist::*;
pub use pipeline::*;
pub use probe::*;
pub use runner::*;
pub use util::*;
