//! Survey records, satellite tile transforms and batched loading.

pub mod error;
mod loader;
mod records;
mod survey;
mod transform;

pub use error::{DataErr, Result};
pub use loader::{Batch, Batches, DataLoader};
pub use records::{Record, read_records};
pub use survey::{Country, SatType, SurveySource};
pub use transform::{IMAGENET_MEAN, IMAGENET_STD, Transform};
