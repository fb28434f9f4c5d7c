use crate::{Result, TallyError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SAVE_NAME: &str = "scint_layers.csv";
pub const DEFAULT_GEOMETRY: &str = "ScintillatorGeometry.csv";

/// Settings for one or more runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Base name of the final artifact, also embedded in intermediate names
    pub save_name: String,
    pub output_dir: PathBuf,
    pub geometry: PathBuf,
    pub workers: u32,
    pub layer_gap_mm: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            save_name: DEFAULT_SAVE_NAME.to_string(),
            output_dir: PathBuf::from("."),
            geometry: PathBuf::from(DEFAULT_GEOMETRY),
            workers: 1,
            layer_gap_mm: 0.0,
        }
    }
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| TallyError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: RunConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_save_name(&self.save_name)?;
        if !self.layer_gap_mm.is_finite() || self.layer_gap_mm < 0.0 {
            return Err(TallyError::Config(format!("invalid layer gap {}", self.layer_gap_mm)));
        }
        Ok(())
    }

    /// Set the output base name. Must be a bare file name.
    pub fn set_save_name(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        validate_save_name(name)?;
        tracing::info!(save_name = name, "Output file name set");
        self.save_name = name.to_string();
        Ok(())
    }
}

/// Values given explicitly on the command line. Each one that is set wins over
/// the config file and over any command macro.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub geometry: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub save_name: Option<String>,
    pub workers: Option<u32>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut RunConfig) -> Result<()> {
        if let Some(geometry) = &self.geometry {
            config.geometry = geometry.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(name) = &self.save_name {
            config.set_save_name(name)?;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        Ok(())
    }
}

fn validate_save_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TallyError::Config("save name is empty".to_string()));
    }
    if name.contains(['/', '\\', ',']) || name == "." || name == ".." {
        return Err(TallyError::Config(format!(
            "save name '{}' must be a plain file name",
            name
        )));
    }
    Ok(())
}
