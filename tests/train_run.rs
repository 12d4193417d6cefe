use std::{fs, path::Path};

use clap::Parser;
use image::{Rgb, RgbImage};
use imagery::{DataLoader, Transform, read_records};
use machine_learning::{arch::Regressor, checkpoint, metrics::r2_score};
use rand::{SeedableRng, rngs::StdRng};
use predicting_poverty::{
    Args, RunConfig, TrainErr,
    artifacts::{self, HISTORY_FILE, MODEL_FILE, PREDICTIONS_FILE},
    config::CONFIG_FILE,
};

const LABEL: &str = "secc_cons_per_cap_scaled";

/// Writes a fold with `n_train` and `n_val` tiles whose brightness follows their label.
fn write_fold(root: &Path, n_train: usize, n_val: usize) {
    let tiles = root.join("imagery").join("india").join("s1").join("2015");
    let fold = root.join("data").join("fold_1");
    fs::create_dir_all(&tiles).unwrap();
    fs::create_dir_all(&fold).unwrap();

    let mut next = 0;
    for (file, n) in [("train.csv", n_train), ("valid.csv", n_val)] {
        let mut csv = format!("village,image,{LABEL}\n");
        for _ in 0..n {
            let level = (next * 37 % 11) as u8;
            let name = format!("tile_{next}.png");

            RgbImage::from_fn(20, 20, |x, y| Rgb([level * 20, (x * 5) as u8, (y * 5) as u8]))
                .save(tiles.join(&name))
                .unwrap();
            csv.push_str(&format!("v{next},{name},{}\n", level as f32 / 10.0 - 0.5));
            next += 1;
        }
        fs::write(fold.join(file), csv).unwrap();
    }
}

fn args(root: &Path, extra: &[&str]) -> Args {
    let dirs = [
        format!("--models-dir={}", root.join("models").display()),
        format!("--imagery-dir={}", root.join("imagery").display()),
        format!("--data-dir={}", root.join("data").display()),
    ];
    let base = [
        "--data-subdir=fold_1",
        "--image-size=16",
        "--base-channels=2",
        "--stages=1",
        "--batch-size=3",
        "--lr=1e-3",
        "--seed=7",
    ];

    let argv = std::iter::once("train".to_string())
        .chain(dirs)
        .chain(base.iter().map(|s| s.to_string()))
        .chain(extra.iter().map(|s| s.to_string()));
    Args::try_parse_from(argv).unwrap()
}

#[test]
fn full_run_writes_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    write_fold(dir.path(), 7, 4);

    let args = args(
        dir.path(),
        &["--name=run_a", "--epochs=2", "--verbose", "--log-epoch-interval=1"],
    );
    let config = RunConfig::from_args(&args).unwrap();
    let report = predicting_poverty::run(&config).unwrap();

    let run_dir = dir.path().join("models").join("run_a");
    assert_eq!(report.run_dir, run_dir);
    assert_eq!(report.history.losses.train.len(), 2);
    assert_eq!(report.history.rsq.val.len(), 2);
    assert!(report.best_r2.is_finite());

    for file in [CONFIG_FILE, PREDICTIONS_FILE, HISTORY_FILE, MODEL_FILE] {
        assert!(run_dir.join(file).is_file(), "missing {file}");
    }
    for epoch in ["1", "2"] {
        assert!(run_dir.join(epoch).join(MODEL_FILE).is_file());
    }

    let predictions = artifacts::read_predictions(run_dir.join(PREDICTIONS_FILE)).unwrap();
    assert_eq!(predictions.len(), 4);

    let history = artifacts::read_history(run_dir.join(HISTORY_FILE)).unwrap();
    assert_eq!(history, report.history);
    assert_eq!(RunConfig::load(&run_dir).unwrap(), config);
}

#[test]
fn quiet_run_skips_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    write_fold(dir.path(), 4, 3);

    let config = RunConfig::from_args(&args(dir.path(), &["--name=quiet", "--epochs=1"])).unwrap();
    predicting_poverty::run(&config).unwrap();

    let run_dir = dir.path().join("models").join("quiet");
    assert!(run_dir.join(MODEL_FILE).is_file());
    assert!(!run_dir.join("1").exists());
}

#[test]
fn existing_run_is_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    write_fold(dir.path(), 4, 3);

    let config = RunConfig::from_args(&args(dir.path(), &["--name=twice", "--epochs=1"])).unwrap();
    predicting_poverty::run(&config).unwrap();

    assert!(matches!(
        predicting_poverty::run(&config),
        Err(TrainErr::RunExists(_))
    ));
}

#[test]
fn frozen_run_keeps_the_preloaded_backbone() {
    let dir = tempfile::tempdir().unwrap();
    write_fold(dir.path(), 5, 3);

    let base = RunConfig::from_args(&args(dir.path(), &["--name=base", "--epochs=1"])).unwrap();
    predicting_poverty::run(&base).unwrap();

    let frozen = RunConfig::from_args(&args(
        dir.path(),
        &[
            "--name=frozen",
            "--epochs=2",
            "--preload-model=base",
            "--no-fine-tune",
        ],
    ))
    .unwrap();
    predicting_poverty::run(&frozen).unwrap();

    let model = Regressor::new(frozen.regressor()).unwrap();
    let entries = model.tensor_entries();
    let backbone = model.head_range().start;

    let load = |name: &str| {
        let mut params = vec![0.0; model.size()];
        let path = dir.path().join("models").join(name).join(MODEL_FILE);
        checkpoint::load(path, &entries, &mut params, |_| true).unwrap();
        params
    };

    assert_eq!(load("base")[..backbone], load("frozen")[..backbone]);
}

#[test]
fn preloading_a_missing_run_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_fold(dir.path(), 3, 2);

    let config = RunConfig::from_args(&args(
        dir.path(),
        &["--name=orphan", "--epochs=1", "--preload-model=nope"],
    ))
    .unwrap();

    assert!(matches!(
        predicting_poverty::run(&config),
        Err(TrainErr::Ml(_))
    ));
    assert!(!config.run_dir().exists());
}

#[test]
fn missing_train_csv_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_fold(dir.path(), 3, 2);
    fs::remove_file(dir.path().join("data").join("fold_1").join("train.csv")).unwrap();

    let config = RunConfig::from_args(&args(dir.path(), &["--name=nofold"])).unwrap();

    assert!(matches!(
        predicting_poverty::run(&config),
        Err(TrainErr::Data(_))
    ));
    assert!(!config.run_dir().exists());

    // the same name can be used once the fold is fixed
    write_fold(dir.path(), 3, 2);
    predicting_poverty::run(&config).unwrap();
}

#[test]
fn saved_weights_reproduce_the_best_predictions() {
    let dir = tempfile::tempdir().unwrap();
    write_fold(dir.path(), 6, 5);

    let config = RunConfig::from_args(&args(
        dir.path(),
        &["--name=best", "--epochs=4", "--lr=1e-2"],
    ))
    .unwrap();
    let report = predicting_poverty::run(&config).unwrap();

    let max_val_r2 = report
        .history
        .rsq
        .val
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(report.best_r2, max_val_r2);

    let run_dir = config.run_dir();
    let (y_true, y_pred): (Vec<f32>, Vec<f32>) =
        artifacts::read_predictions(run_dir.join(PREDICTIONS_FILE))
            .unwrap()
            .into_iter()
            .unzip();
    assert!((r2_score(&y_true, &y_pred).unwrap() - report.best_r2).abs() < 1e-9);

    let mut model = Regressor::new(config.regressor()).unwrap();
    let mut params = vec![0.0; model.size()];
    checkpoint::load(
        run_dir.join(MODEL_FILE),
        &model.tensor_entries(),
        &mut params,
        |_| true,
    )
    .unwrap();

    let val = DataLoader::new(
        read_records(&config.val_csv, &config.source).unwrap(),
        Transform::eval(config.source.sat_type, config.image_size),
        config.batch_size,
        false,
    );
    let mut replayed = Vec::new();
    for batch in val.batches(&mut StdRng::seed_from_u64(0)) {
        let batch = batch.unwrap();
        replayed.extend(model.forward(&params, batch.x).unwrap());
    }

    assert_eq!(replayed.len(), y_pred.len());
    for (r, p) in replayed.iter().zip(&y_pred) {
        assert!((r - p).abs() < 1e-4, "{r} != {p}");
    }
}

