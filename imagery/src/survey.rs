use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::DataErr;

/// The satellite the imagery comes from.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SatType {
    /// Sentinel-1.
    #[default]
    S1,
    /// Landsat-8.
    L8,
}

impl SatType {
    /// Returns the side of the centered square kept from every tile, in pixels.
    pub fn crop(self) -> u32 {
        match self {
            SatType::S1 => 300,
            SatType::L8 => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SatType::S1 => "s1",
            SatType::L8 => "l8",
        }
    }
}

impl Display for SatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SatType {
    type Err = DataErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s1" => Ok(SatType::S1),
            "l8" => Ok(SatType::L8),
            other => Err(DataErr::Unsupported(format!(
                "unknown satellite type `{other}`, expected s1 or l8"
            ))),
        }
    }
}

/// The surveyed country.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Country {
    #[default]
    India,
    Bangladesh,
}

impl Country {
    pub fn as_str(self) -> &'static str {
        match self {
            Country::India => "india",
            Country::Bangladesh => "bangladesh",
        }
    }
}

impl Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Country {
    type Err = DataErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "india" => Ok(Country::India),
            "bangladesh" => Ok(Country::Bangladesh),
            other => Err(DataErr::Unsupported(format!(
                "`{other}`: only bangladesh and india are supported"
            ))),
        }
    }
}

/// Where the tiles of a survey live and which columns of its CSVs to read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveySource {
    pub imagery_dir: PathBuf,
    pub country: Country,
    pub sat_type: SatType,
    pub year: u32,
    pub image_column: String,
    pub label_column: String,
    /// The leading fraction of every CSV to keep, in (0, 1].
    pub frac: f32,
}

impl SurveySource {
    /// Resolves an image name as `{imagery_dir}/{country}/{sat_type}/{year}/{name}`.
    pub fn image_path<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.imagery_dir
            .join(self.country.as_str())
            .join(self.sat_type.as_str())
            .join(self.year.to_string())
            .join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        for sat in [SatType::S1, SatType::L8] {
            assert_eq!(sat.to_string().parse::<SatType>().unwrap(), sat);
        }
        for country in [Country::India, Country::Bangladesh] {
            assert_eq!(country.to_string().parse::<Country>().unwrap(), country);
        }
    }

    #[test]
    fn unknown_country_is_rejected() {
        let err = "peru".parse::<Country>().unwrap_err();
        assert!(err.to_string().contains("only bangladesh and india are supported"));
        assert!("s2".parse::<SatType>().is_err());
    }

    #[test]
    fn crop_depends_on_the_satellite() {
        assert_eq!(SatType::S1.crop(), 300);
        assert_eq!(SatType::L8.crop(), 100);
    }

    #[test]
    fn image_paths_are_nested_by_survey() {
        let source = SurveySource {
            imagery_dir: PathBuf::from("/data/imagery"),
            country: Country::Bangladesh,
            sat_type: SatType::L8,
            year: 2015,
            image_column: "image".to_string(),
            label_column: "label".to_string(),
            frac: 1.0,
        };

        assert_eq!(
            source.image_path("tile_1.png"),
            PathBuf::from("/data/imagery/bangladesh/l8/2015/tile_1.png")
        );
    }
}
