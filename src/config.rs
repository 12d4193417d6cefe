use std::{
    fs::{self, File},
    io::{self, BufWriter},
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use imagery::{Country, SatType, SurveySource};
use log::info;
use machine_learning::arch::RegressorConfig;
use serde::{Deserialize, Serialize};

use crate::{
    Args,
    error::{IoContext, Result, TrainErr},
};

pub const CONFIG_FILE: &str = "config.json";

/// Everything a training run needs, resolved from the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub models_dir: PathBuf,
    pub train_csv: PathBuf,
    pub val_csv: PathBuf,
    pub source: SurveySource,
    pub epochs: usize,
    pub lr: f32,
    pub weight_decay: f32,
    pub batch_size: NonZeroUsize,
    pub log_epoch_interval: NonZeroUsize,
    pub preload_model: Option<String>,
    pub fine_tune: bool,
    pub verbose: bool,
    pub image_size: u32,
    pub base_channels: usize,
    pub stages: usize,
    pub seed: Option<u64>,
}

impl RunConfig {
    /// Resolves the run name, the fold CSVs and the default directories.
    pub fn from_args(args: &Args) -> Result<Self> {
        let home = || dirs::home_dir().ok_or(TrainErr::NoHomeDir);

        let models_dir = match &args.models_dir {
            Some(dir) => dir.clone(),
            None => home()?.join("predicting-poverty").join("models"),
        };
        let imagery_dir = match &args.imagery_dir {
            Some(dir) => dir.clone(),
            None => home()?.join("imagery"),
        };

        let name = match &args.name {
            Some(name) => name.clone(),
            None => default_name(
                args.country,
                args.sat_type,
                args.year,
                Local::now().naive_local(),
            ),
        };
        validate_name(&name)?;

        let fold_dir = match &args.data_subdir {
            Some(subdir) => args.data_dir.join(subdir),
            None => args.data_dir.clone(),
        };

        Ok(Self {
            name,
            models_dir,
            train_csv: fold_dir.join("train.csv"),
            val_csv: fold_dir.join("valid.csv"),
            source: SurveySource {
                imagery_dir,
                country: args.country,
                sat_type: args.sat_type,
                year: args.year,
                image_column: args.image_column.clone(),
                label_column: args.label.clone(),
                frac: args.train_frac,
            },
            epochs: args.epochs,
            lr: args.lr,
            weight_decay: args.weight_decay,
            batch_size: args.batch_size,
            log_epoch_interval: args.log_epoch_interval,
            preload_model: args.preload_model.clone(),
            fine_tune: args.fine_tune(),
            verbose: args.verbose,
            image_size: args.image_size,
            base_channels: args.base_channels,
            stages: args.stages,
            seed: args.seed,
        })
    }

    /// Returns the directory of this run.
    pub fn run_dir(&self) -> PathBuf {
        self.models_dir.join(&self.name)
    }

    /// Returns the directory of another run stored next to this one.
    pub fn model_dir(&self, name: &str) -> PathBuf {
        self.models_dir.join(name)
    }

    pub fn regressor(&self) -> RegressorConfig {
        RegressorConfig {
            in_channels: 3,
            base_channels: self.base_channels,
            stages: self.stages,
            image_size: self.image_size as usize,
        }
    }

    /// Creates the run directory and writes this configuration into it.
    ///
    /// # Returns
    /// `TrainErr::RunExists` if a run with the same name was already stored.
    pub fn create_run_dir(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.models_dir).at(&self.models_dir)?;

        let run_dir = self.run_dir();
        match fs::create_dir(&run_dir) {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(TrainErr::RunExists(run_dir));
            }
            res => res.at(&run_dir)?,
        }

        let path = run_dir.join(CONFIG_FILE);
        let file = File::create(&path).at(&path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;

        Ok(run_dir)
    }

    pub fn log_banner(&self) {
        info!("Begin training for {}", self.source.country);
        info!("Train for {} epochs", self.epochs);
        info!("Batch size {}", self.batch_size);
        info!("Fine tune full network: {}", self.fine_tune);
        info!("Save best model in: {}", self.run_dir().display());
        info!(
            "Using satellite (type, year): {},{}",
            self.source.sat_type, self.source.year
        );
        info!("{}", "=".repeat(36));
    }

    /// Reads a configuration written by `create_run_dir`.
    pub fn load<P: AsRef<Path>>(run_dir: P) -> Result<Self> {
        let path = run_dir.as_ref().join(CONFIG_FILE);
        let file = File::open(&path).at(&path)?;
        Ok(serde_json::from_reader(io::BufReader::new(file))?)
    }
}

/// Names a run after its survey and the time it started, `ctime` style with `_` for spaces.
pub fn default_name(country: Country, sat_type: SatType, year: u32, now: NaiveDateTime) -> String {
    let ctime = now.format("%a %b %e %H:%M:%S %Y").to_string();
    format!("{country}_{sat_type}_{year}_{}", ctime.replace(' ', "_"))
}

fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => Err(TrainErr::InvalidName(name.to_string())),
    }
}
