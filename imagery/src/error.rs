use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use image::ImageError;
use ndarray::ShapeError;

/// The result type of the imagery module.
pub type Result<T> = std::result::Result<T, DataErr>;

#[derive(Debug)]
pub enum DataErr {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    Image {
        path: PathBuf,
        source: ImageError,
    },
    EmptyImage {
        path: PathBuf,
    },
    MissingColumn {
        path: PathBuf,
        column: String,
    },
    InvalidLabel {
        path: PathBuf,
        line: u64,
        value: String,
    },
    NoRecords {
        path: PathBuf,
    },
    InvalidFraction(f32),
    Unsupported(String),
    Shape(ShapeError),
}

impl Display for DataErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataErr::Io { path, source } => write!(f, "{}: {source}", path.display()),
            DataErr::Csv { path, source } => write!(f, "{}: {source}", path.display()),
            DataErr::Image { path, source } => {
                write!(f, "failed to decode {}: {source}", path.display())
            }
            DataErr::EmptyImage { path } => write!(f, "{} has no pixels", path.display()),
            DataErr::MissingColumn { path, column } => {
                write!(f, "{} has no `{column}` column", path.display())
            }
            DataErr::InvalidLabel { path, line, value } => write!(
                f,
                "{} line {line}: `{value}` is not a valid label",
                path.display()
            ),
            DataErr::NoRecords { path } => write!(f, "{} has no records", path.display()),
            DataErr::InvalidFraction(frac) => {
                write!(f, "the fraction of records to keep must be in (0, 1], got {frac}")
            }
            DataErr::Unsupported(msg) => f.write_str(msg),
            DataErr::Shape(e) => write!(f, "invalid batch shape: {e}"),
        }
    }
}

impl Error for DataErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DataErr::Io { source, .. } => Some(source),
            DataErr::Csv { source, .. } => Some(source),
            DataErr::Image { source, .. } => Some(source),
            DataErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for DataErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}
