use std::path::{Path, PathBuf};

use crate::{DataErr, Result, SurveySource};

/// One labeled tile.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub image: PathBuf,
    pub label: f32,
}

/// Reads the labeled tiles listed in a headered CSV.
///
/// # Arguments
/// * `path` - The CSV to read.
/// * `source` - Where the images live and which columns hold the image name and the label.
///
/// # Returns
/// The leading `ceil(source.frac * rows)` records, in file order.
pub fn read_records<P: AsRef<Path>>(path: P, source: &SurveySource) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let frac = source.frac;
    if !(frac > 0.0 && frac <= 1.0) {
        return Err(DataErr::InvalidFraction(frac));
    }

    let csv_err = |source: csv::Error| DataErr::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DataErr::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    };
    let image_idx = column(&source.image_column)?;
    let label_idx = column(&source.label_column)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(csv_err)?;
        let line = row.position().map_or(0, |p| p.line());

        let image = row.get(image_idx).unwrap_or_default().trim();
        let value = row.get(label_idx).unwrap_or_default().trim();
        let label = value.parse::<f32>().map_err(|_| DataErr::InvalidLabel {
            path: path.to_path_buf(),
            line,
            value: value.to_string(),
        })?;

        records.push(Record {
            image: source.image_path(image),
            label,
        });
    }

    if records.is_empty() {
        return Err(DataErr::NoRecords {
            path: path.to_path_buf(),
        });
    }

    let keep = ((frac as f64 * records.len() as f64).ceil() as usize).min(records.len());
    records.truncate(keep);

    log::debug!("read {} records from {}", records.len(), path.display());
    Ok(records)
}
