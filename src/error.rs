use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use imagery::DataErr;
use machine_learning::MlErr;

/// The result type of a training run.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Training run failures.
#[derive(Debug)]
pub enum TrainErr {
    Ml(MlErr),
    Data(DataErr),
    Io { path: PathBuf, source: io::Error },
    Json(serde_json::Error),
    Csv(csv::Error),
    RunExists(PathBuf),
    NoHomeDir,
    InvalidName(String),
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Ml(e) => write!(f, "model error: {e}"),
            TrainErr::Data(e) => write!(f, "data error: {e}"),
            TrainErr::Io { path, source } => write!(f, "{}: {source}", path.display()),
            TrainErr::Json(e) => write!(f, "json error: {e}"),
            TrainErr::Csv(e) => write!(f, "csv error: {e}"),
            TrainErr::RunExists(path) => {
                write!(f, "run directory {} already exists", path.display())
            }
            TrainErr::NoHomeDir => f.write_str("could not find the home directory"),
            TrainErr::InvalidName(name) => write!(f, "`{name}` is not a valid model name"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Ml(e) => Some(e),
            TrainErr::Data(e) => Some(e),
            TrainErr::Io { source, .. } => Some(source),
            TrainErr::Json(e) => Some(e),
            TrainErr::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for TrainErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<DataErr> for TrainErr {
    fn from(value: DataErr) -> Self {
        Self::Data(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<csv::Error> for TrainErr {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

/// Attaches the path an io operation failed on.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, io::Error> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| TrainErr::Io {
            path: path.into(),
            source,
        })
    }
}
