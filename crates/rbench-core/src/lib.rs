pub mod backoff;
pub mod error;
pub mod ids;
pub mod model;
pub mod target;
pub mod time;

pub use backoff::*;
pub use error::*;
pub use ids::*;
pub use model::*;
pub use target::*;
pub use time::*;
