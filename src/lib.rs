pub mod args;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod trainer;

pub use args::Args;
pub use config::RunConfig;
pub use error::{Result, TrainErr};
pub use trainer::{TrainOptions, TrainReport, Trainer};

use imagery::{DataLoader, Transform, read_records};
use log::info;
use machine_learning::{
    arch::{Regressor, TrainScope, loss::Mse},
    optimization::Adam,
};

/// Trains a regressor on the fold described by `config`.
///
/// Loads both splits and builds the model (optionally starting from the backbone of a stored
/// run) before creating the run directory, then trains it, persisting the best epoch.
///
/// # Returns
/// The report of the run, or `TrainErr::RunExists` if a run with the same name was stored.
pub fn run(config: &RunConfig) -> Result<TrainReport> {
    config.log_banner();

    let size = config.image_size;
    let sat_type = config.source.sat_type;

    let train = DataLoader::new(
        read_records(&config.train_csv, &config.source)?,
        Transform::train(sat_type, size),
        config.batch_size,
        true,
    );
    let val = DataLoader::new(
        read_records(&config.val_csv, &config.source)?,
        Transform::eval(sat_type, size),
        config.batch_size,
        false,
    );
    info!("Dataset sizes train: {} val: {}", train.len(), val.len());

    let mut rng = trainer::generate_rng(config.seed);
    let model = Regressor::new(config.regressor())?;
    let mut params = model.init_params(&mut rng)?;

    if let Some(name) = &config.preload_model {
        trainer::preload_backbone(config.model_dir(name), &model, &mut params)?;
    }

    let run_dir = config.create_run_dir()?;

    let scope = if config.fine_tune {
        TrainScope::Full
    } else {
        TrainScope::HeadOnly
    };
    let trained = match scope {
        TrainScope::Full => model.size(),
        TrainScope::HeadOnly => model.head_range().len(),
    };
    info!("Training {trained} of {} parameters", model.size());

    let optimizer = Adam::with_weight_decay(trained, config.lr, config.weight_decay);
    let options = TrainOptions {
        epochs: config.epochs,
        verbose: config.verbose,
        log_epoch_interval: config.log_epoch_interval,
        run_dir,
    };

    let mut trainer = Trainer::new(model, params, optimizer, Mse::new(), scope, options, rng);
    trainer.train(&train, &val)
}
