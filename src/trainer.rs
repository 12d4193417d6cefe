use std::{
    num::NonZeroUsize,
    ops::Range,
    path::{Path, PathBuf},
    time::Instant,
};

use chrono::Local;
use imagery::{Batch, DataLoader};
use log::{debug, info};
use machine_learning::{
    arch::{Regressor, TrainScope, layers::TensorEntry, loss::LossFn},
    checkpoint,
    metrics::EpochStats,
    optimization::Optimizer,
    schedule::ReduceLrOnPlateau,
};
use ndarray::Array1;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    artifacts::{Artifacts, History, MODEL_FILE, Phase},
    error::Result,
};

/// Seeds the run's random source, from the OS when no seed is given.
pub fn generate_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Copies the backbone of a stored run into `params`, the head is left as it was.
///
/// # Returns
/// The amount of tensors loaded.
pub fn preload_backbone<P: AsRef<Path>>(
    run_dir: P,
    model: &Regressor,
    params: &mut [f32],
) -> Result<usize> {
    let path = run_dir.as_ref().join(MODEL_FILE);
    let loaded = checkpoint::load(&path, &model.tensor_entries(), params, |name| {
        name.starts_with("backbone.")
    })?;

    info!("Preloaded {loaded} backbone tensors from {}", path.display());
    Ok(loaded)
}

/// The outcome of a finished run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub best_r2: f64,
    pub history: History,
    pub run_dir: PathBuf,
}

/// How often and where a run is persisted.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub verbose: bool,
    pub log_epoch_interval: NonZeroUsize,
    pub run_dir: PathBuf,
}

/// The best validation epoch seen so far.
struct Best {
    r2: f64,
    params: Vec<f32>,
    y_true: Vec<f32>,
    y_pred: Vec<f32>,
}

/// A regressor `Trainer`. Contains the relevant components needed for training a model over
/// a train and a validation split, including the model itself.
pub struct Trainer<O, L, R>
where
    O: Optimizer,
    L: LossFn,
    R: Rng,
{
    model: Regressor,
    entries: Vec<TensorEntry>,
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: O,
    scheduler: ReduceLrOnPlateau,
    loss_fn: L,
    scope: TrainScope,

    options: TrainOptions,
    rng: R,
}

impl<O, L, R> Trainer<O, L, R>
where
    O: Optimizer,
    L: LossFn,
    R: Rng,
{
    /// Returns a new `Trainer`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `params` - Its starting parameters.
    /// * `optimizer` - Sized for the parameters `scope` trains.
    /// * `loss_fn` - The loss function used to measure the difference between a model's output and the expected one.
    /// * `scope` - Whether the backbone is trained or frozen.
    /// * `options` - The amount of epochs and where to persist the run.
    /// * `rng` - A random number generator.
    pub fn new(
        model: Regressor,
        params: Vec<f32>,
        optimizer: O,
        loss_fn: L,
        scope: TrainScope,
        options: TrainOptions,
        rng: R,
    ) -> Self {
        Self {
            entries: model.tensor_entries(),
            grad: vec![0.0; params.len()],
            scheduler: ReduceLrOnPlateau::default(),
            model,
            params,
            optimizer,
            loss_fn,
            scope,
            options,
            rng,
        }
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    /// Returns the section of the parameters the optimizer updates.
    fn trained_range(&self) -> Range<usize> {
        match self.scope {
            TrainScope::Full => 0..self.params.len(),
            TrainScope::HeadOnly => self.model.head_range(),
        }
    }

    /// Makes a forward pass and, when training, a backward pass and an optimizer step.
    ///
    /// # Returns
    /// The batch loss and the predictions made before the step.
    fn step(&mut self, batch: Batch, phase: Phase) -> Result<(f32, Array1<f32>)> {
        let Batch { x, y } = batch;
        let y_pred = self.model.forward(&self.params, x)?;
        let loss = self.loss_fn.loss(y_pred.view(), y.view());

        if phase == Phase::Train {
            let d = self.loss_fn.loss_prime(y_pred.view(), y.view());

            self.grad.fill(0.0);
            self.model
                .backward(&self.params, &mut self.grad, d, self.scope)?;

            let range = self.trained_range();
            self.optimizer
                .update_params(&self.grad[range.clone()], &mut self.params[range])?;
        }

        Ok((loss, y_pred))
    }

    /// Runs one pass over a split, only the train phase updates the parameters.
    fn run_phase(&mut self, loader: &DataLoader, phase: Phase) -> Result<EpochStats> {
        let mut stats = EpochStats::new();
        for (i, batch) in loader.batches(&mut self.rng).enumerate() {
            let batch = batch?;
            let y = batch.y.to_vec();
            let (loss, y_pred) = self.step(batch, phase)?;

            if self.options.verbose {
                info!("Batch {i} Loss: {loss}");
            }

            stats.push(loss, &y, &y_pred.to_vec());
        }

        Ok(stats)
    }

    fn artifacts<'a>(
        &'a self,
        history: &'a History,
        best: &'a Best,
        params: &'a [f32],
    ) -> Artifacts<'a> {
        Artifacts {
            history,
            y_true: &best.y_true,
            y_pred: &best.y_pred,
            entries: &self.entries,
            params,
        }
    }

    /// Trains for the configured amount of epochs, keeping the parameters of the epoch with the
    /// best validation R².
    ///
    /// # Arguments
    /// * `train` - The loader of the training split, shuffled and augmented.
    /// * `val` - The loader of the validation split.
    ///
    /// The run directory receives the best parameters, their validation predictions and the
    /// history. In verbose mode every `log_epoch_interval` epochs a snapshot with the current
    /// parameters is written into `{run_dir}/{epoch}`.
    pub fn train(&mut self, train: &DataLoader, val: &DataLoader) -> Result<TrainReport> {
        let since = Instant::now();
        let epochs = self.options.epochs;

        let mut history = History::default();
        let mut best = Best {
            r2: f64::NEG_INFINITY,
            params: self.params.clone(),
            y_true: Vec::new(),
            y_pred: Vec::new(),
        };

        for epoch in 1..=epochs {
            info!("Epoch {epoch}/{epochs}");
            info!("{}", Local::now().format("%a %b %e %H:%M:%S %Y"));
            info!("{}", "=".repeat(10));

            for (phase, loader) in [(Phase::Train, train), (Phase::Val, val)] {
                let stats = self.run_phase(loader, phase)?;
                let loss = stats.loss();
                let r2 = stats.r2()?;

                history.push(phase, loss, r2);
                info!("{phase} Loss: {loss:.4} R2: {r2:.4}");

                if phase == Phase::Val {
                    let lr = self.optimizer.learning_rate();
                    if let Some(new_lr) = self.scheduler.step(loss, lr) {
                        info!("Epoch {epoch}: reducing learning rate to {new_lr:.4e}");
                        self.optimizer.set_learning_rate(new_lr);
                    }

                    if r2 > best.r2 {
                        debug!("new best validation R2 {r2:.4} at epoch {epoch}");
                        best = Best {
                            r2,
                            params: self.params.clone(),
                            y_true: stats.y_true().to_vec(),
                            y_pred: stats.y_pred().to_vec(),
                        };
                    }
                }
            }

            if self.options.verbose && epoch % self.options.log_epoch_interval.get() == 0 {
                let dir = self.options.run_dir.join(epoch.to_string());
                self.artifacts(&history, &best, &self.params).save(&dir)?;
            }
        }

        let elapsed = since.elapsed().as_secs();
        info!("Training complete in {}m {}s", elapsed / 60, elapsed % 60);
        info!("Best R2: {:.4}", best.r2);

        self.artifacts(&history, &best, &best.params)
            .save(&self.options.run_dir)?;

        Ok(TrainReport {
            best_r2: best.r2,
            history,
            run_dir: self.options.run_dir.clone(),
        })
    }
}
