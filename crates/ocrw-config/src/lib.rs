use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Prefix for every environment variable the worker reads, e.g. `OCRW_STAGING_DIR`.
pub const ENV_PREFIX: &str = "OCRW";

/// Worker configuration.
///
/// The worker takes no flags and reads no config file; everything here comes
/// from `OCRW_*` environment variables set by the host that spawns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Path or name of the tesseract executable
    pub tesseract_binary: String,

    /// Optional override for the traineddata directory (`--tessdata-dir`)
    pub tessdata_dir: Option<PathBuf>,

    /// Directory for staged images; falls back to the system temp dir
    pub staging_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tesseract_binary: "tesseract".to_string(),
            tessdata_dir: None,
            staging_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::load(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Load from an explicit variable map instead of the process environment.
    ///
    /// Keys use the same `OCRW_*` names as the real environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::load(config::Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn load(source: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read worker configuration")?;

        let config: WorkerConfig = settings
            .try_deserialize()
            .context("Invalid worker configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tesseract_binary.trim().is_empty() {
            anyhow::bail!("{}_TESSERACT_BINARY must not be empty", ENV_PREFIX);
        }
        Ok(())
    }
}
