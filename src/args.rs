use std::{num::NonZeroUsize, path::PathBuf};

use clap::Parser;
use imagery::{Country, SatType};

/// Trains a satellite imagery regressor of per capita consumption on one cross validation fold.
#[derive(Parser, Debug, Clone)]
#[command(name = "train", version)]
pub struct Args {
    /// Name of the run, defaults to `{country}_{sat_type}_{year}_{time}`.
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// india or bangladesh.
    #[arg(long, default_value_t = Country::India, value_parser = str::parse::<Country>)]
    pub country: Country,

    /// s1 (Sentinel-1) or l8 (Landsat-8).
    #[arg(long, default_value_t = SatType::S1, value_parser = str::parse::<SatType>)]
    pub sat_type: SatType,

    #[arg(long, default_value_t = 2015)]
    pub year: u32,

    /// Column of the fold CSVs to regress.
    #[arg(long, default_value = "secc_cons_per_cap_scaled")]
    pub label: String,

    /// Leading fraction of every fold CSV to use.
    #[arg(long, default_value_t = 1.0)]
    pub train_frac: f32,

    #[arg(long, default_value_t = 1e-5)]
    pub lr: f32,

    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f32,

    #[arg(long, default_value = "128")]
    pub batch_size: NonZeroUsize,

    /// In verbose mode, snapshot the run every this many epochs.
    #[arg(long, default_value = "20")]
    pub log_epoch_interval: NonZeroUsize,

    /// Run whose backbone weights to start from.
    #[arg(long)]
    pub preload_model: Option<String>,

    /// Fold directory under the data directory, e.g. `fold_1`.
    #[arg(long)]
    pub data_subdir: Option<String>,

    /// Train the whole network (default).
    #[arg(long, overrides_with = "no_fine_tune")]
    fine_tune: bool,

    /// Freeze the backbone and only train the regression head.
    #[arg(long, overrides_with = "fine_tune")]
    no_fine_tune: bool,

    #[arg(long)]
    pub verbose: bool,

    /// Where runs are stored, defaults to `~/predicting-poverty/models`.
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Root of the satellite tiles, defaults to `~/imagery`.
    #[arg(long)]
    pub imagery_dir: Option<PathBuf>,

    #[arg(long, default_value = "../data")]
    pub data_dir: PathBuf,

    #[arg(long, default_value = "image")]
    pub image_column: String,

    /// Side of the square images fed to the network.
    #[arg(long, default_value_t = 224, value_parser = clap::value_parser!(u32).range(1..))]
    pub image_size: u32,

    #[arg(long, default_value_t = 16)]
    pub base_channels: usize,

    #[arg(long, default_value_t = 3)]
    pub stages: usize,

    /// Threads used to decode images and run the network.
    #[arg(long, default_value = "8")]
    pub num_workers: NonZeroUsize,

    #[arg(long)]
    pub seed: Option<u64>,
}

impl Args {
    /// Whether the whole network is trained, the last of `--fine-tune` and `--no-fine-tune`
    /// wins.
    pub fn fine_tune(&self) -> bool {
        self.fine_tune || !self.no_fine_tune
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["train"]).unwrap();

        assert_eq!(args.name, None);
        assert_eq!(args.epochs, 10);
        assert_eq!(args.country, Country::India);
        assert_eq!(args.sat_type, SatType::S1);
        assert_eq!(args.year, 2015);
        assert_eq!(args.label, "secc_cons_per_cap_scaled");
        assert_eq!(args.train_frac, 1.0);
        assert_eq!(args.lr, 1e-5);
        assert_eq!(args.weight_decay, 0.0);
        assert_eq!(args.batch_size.get(), 128);
        assert_eq!(args.log_epoch_interval.get(), 20);
        assert!(args.fine_tune());
        assert!(!args.verbose);
        assert_eq!(args.data_dir, PathBuf::from("../data"));
        assert_eq!(args.num_workers.get(), 8);
    }

    #[test]
    fn sweep_invocation() {
        let args = Args::try_parse_from([
            "train",
            "--verbose",
            "--epochs=15",
            "--sat-type=l8",
            "--country=india",
            "--log-epoch-interval=5",
            "--name=l8_fold_3",
            "--data-subdir=fold_3",
            "--label=secc_cons_per_cap_scaled",
            "--fine-tune",
            "--lr=1e-5",
            "--weight-decay=1e-3",
        ])
        .unwrap();

        assert!(args.verbose);
        assert_eq!(args.epochs, 15);
        assert_eq!(args.sat_type, SatType::L8);
        assert_eq!(args.log_epoch_interval.get(), 5);
        assert_eq!(args.name.as_deref(), Some("l8_fold_3"));
        assert_eq!(args.data_subdir.as_deref(), Some("fold_3"));
        assert!(args.fine_tune());
        assert_eq!(args.weight_decay, 1e-3);
    }

    #[test]
    fn last_fine_tune_flag_wins() {
        let frozen = Args::try_parse_from(["train", "--fine-tune", "--no-fine-tune"]).unwrap();
        assert!(!frozen.fine_tune());

        let full = Args::try_parse_from(["train", "--no-fine-tune", "--fine-tune"]).unwrap();
        assert!(full.fine_tune());
    }

    #[test]
    fn unsupported_country_names_the_supported_ones() {
        let err = Args::try_parse_from(["train", "--country=peru"]).unwrap_err();
        assert!(
            err.to_string()
                .contains("only bangladesh and india are supported")
        );

        let args = Args::try_parse_from(["train", "--country=bangladesh"]).unwrap();
        assert_eq!(args.country, Country::Bangladesh);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Args::try_parse_from(["train", "--country=peru"]).is_err());
        assert!(Args::try_parse_from(["train", "--sat-type=s2"]).is_err());
        assert!(Args::try_parse_from(["train", "--batch-size=0"]).is_err());
        assert!(Args::try_parse_from(["train", "--image-size=0"]).is_err());
    }
}
