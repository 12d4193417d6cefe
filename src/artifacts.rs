use std::{
    fmt::{self, Display},
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

use machine_learning::{arch::layers::TensorEntry, checkpoint};
use serde::{Deserialize, Serialize};

use crate::error::{IoContext, Result};

pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const HISTORY_FILE: &str = "history.json";
pub const MODEL_FILE: &str = "saved_model.safetensors";

/// A pass over one of the two splits of a fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Val,
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Train => "train",
            Phase::Val => "val",
        })
    }
}

/// One value per epoch for each phase. Undefined values (`NaN`) are stored as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseSeries {
    #[serde(with = "nan_as_null")]
    pub train: Vec<f64>,
    #[serde(with = "nan_as_null")]
    pub val: Vec<f64>,
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&v| (!v.is_nan()).then_some(v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect())
    }
}

impl PhaseSeries {
    pub fn get(&self, phase: Phase) -> &[f64] {
        match phase {
            Phase::Train => &self.train,
            Phase::Val => &self.val,
        }
    }

    fn push(&mut self, phase: Phase, value: f64) {
        match phase {
            Phase::Train => self.train.push(value),
            Phase::Val => self.val.push(value),
        }
    }
}

/// The loss and R² of every epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub losses: PhaseSeries,
    pub rsq: PhaseSeries,
}

impl History {
    pub fn push(&mut self, phase: Phase, loss: f32, r2: f64) {
        self.losses.push(phase, loss as f64);
        self.rsq.push(phase, r2);
    }
}

/// What gets persisted for a run, or for one of its snapshots.
#[derive(Debug, Clone, Copy)]
pub struct Artifacts<'a> {
    pub history: &'a History,
    pub y_true: &'a [f32],
    pub y_pred: &'a [f32],
    pub entries: &'a [TensorEntry],
    pub params: &'a [f32],
}

impl Artifacts<'_> {
    /// Writes the predictions, the history and the weights into `dir`, creating it if needed.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).at(dir)?;

        write_predictions(dir.join(PREDICTIONS_FILE), self.y_true, self.y_pred)?;

        let path = dir.join(HISTORY_FILE);
        let file = File::create(&path).at(&path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self.history)?;

        checkpoint::save(dir.join(MODEL_FILE), self.entries, self.params)?;

        log::debug!("saved artifacts into {}", dir.display());
        Ok(())
    }
}

fn write_predictions<P: AsRef<Path>>(path: P, y_true: &[f32], y_pred: &[f32]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["y_true", "y_pred"])?;

    for (y, p) in y_true.iter().zip(y_pred) {
        writer.write_record([y.to_string(), p.to_string()])?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Reads back the `(y_true, y_pred)` pairs of a `predictions.csv`.
pub fn read_predictions<P: AsRef<Path>>(path: P) -> Result<Vec<(f32, f32)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<(f32, f32)>, csv::Error>>()?;
    Ok(rows)
}

/// Reads back a `history.json`.
pub fn read_history<P: AsRef<Path>>(path: P) -> Result<History> {
    let path = path.as_ref();
    let file = File::open(path).at(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}
