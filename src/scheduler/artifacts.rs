//! Dated parameter artifacts written by the evening job

use crate::domain::OptimizationParameterSet;
use crate::error::{Result, VigilError};
use crate::persistence::{read_json, write_json_atomic};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PREFIX: &str = "params-";
const SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", PREFIX, day.format("%Y-%m-%d"), SUFFIX))
    }

    /// Write `params-YYYY-MM-DD.json` atomically; empty sets are refused
    pub fn save(&self, set: &OptimizationParameterSet) -> Result<PathBuf> {
        if set.is_empty() {
            return Err(VigilError::Optimization(
                "refusing to write an empty parameter set".to_string(),
            ));
        }
        let path = self.path_for(set.trading_day);
        write_json_atomic(&path, set)?;
        Ok(path)
    }

    /// Newest artifact that parses and has at least one cell
    pub fn load_latest(&self) -> Result<OptimizationParameterSet> {
        let mut dated = self.list()?;
        dated.sort_by(|a, b| b.0.cmp(&a.0));

        for (day, path) in dated {
            match read_json::<OptimizationParameterSet>(&path) {
                Ok(Some(set)) if !set.is_empty() => {
                    debug!("Using parameter artifact for {}", day);
                    return Ok(set);
                }
                Ok(_) => warn!("Skipping empty artifact {}", path.display()),
                Err(e) => warn!("Skipping unreadable artifact {}: {}", path.display(), e),
            }
        }

        Err(VigilError::ArtifactUnavailable(format!(
            "no valid artifact in {}",
            self.dir.display()
        )))
    }

    fn list(&self) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VigilError::Io(e)),
        };

        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let day = name
                    .to_str()?
                    .strip_prefix(PREFIX)?
                    .strip_suffix(SUFFIX)
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())?;
                Some((day, entry.path()))
            })
            .collect())
    }
}
