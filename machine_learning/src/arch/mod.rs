pub mod layers;
pub mod loss;
mod regressor;
mod sequential;

pub use regressor::{Regressor, RegressorConfig, TrainScope};
pub use sequential::Sequential;
