pub mod arch;
pub mod checkpoint;
pub mod error;
pub mod initialization;
pub mod metrics;
pub mod optimization;
pub mod schedule;
mod test;

pub use error::{MlErr, Result};
