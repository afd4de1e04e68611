//! Serializable pipeline configuration.
//!
//! One `PipelineConfig` value carries everything a run needs: which
//! indicators to process, the resampling method, the date filter, and where
//! files live. It is loaded once and passed into the pipeline entry point.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use macrolab_core::{Indicator, ResampleError, ResampleMethod};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no indicators configured")]
    NoIndicators,

    #[error("duplicate indicator name '{0}'")]
    DuplicateName(String),

    #[error("duplicate indicator id '{0}'")]
    DuplicateId(String),

    #[error("start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    Method(#[from] ResampleError),
}

/// Directory layout for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw CSV archive, one `{File_Stem}.csv` per indicator.
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    /// Cleaned-series Parquet store.
    #[serde(default = "default_cleaned_dir")]
    pub cleaned_dir: PathBuf,
    /// Merged table, validation report, and manifest.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_cleaned_dir() -> PathBuf {
    PathBuf::from("cleaned_data")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            cleaned_dir: default_cleaned_dir(),
            output_dir: default_output_dir(),
        }
    }
}

/// One configured indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub name: String,
    pub id: String,
    /// Overrides the global method for this indicator only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl IndicatorSpec {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            method: None,
        }
    }

    pub fn indicator(&self) -> Indicator {
        Indicator::new(self.name.clone(), self.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// `forward-fill` or `linear`.
    #[serde(default = "default_method")]
    pub method: String,

    /// Inclusive date filter applied before resampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,

    /// Process indicators on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub indicators: Vec<IndicatorSpec>,
}

fn default_method() -> String {
    ResampleMethod::default().to_string()
}

fn default_parallel() -> bool {
    true
}

impl PipelineConfig {
    /// Config over the given indicators with every other field defaulted.
    pub fn new(indicators: Vec<IndicatorSpec>) -> Self {
        Self {
            method: default_method(),
            start: None,
            end: None,
            parallel: default_parallel(),
            paths: PathsConfig::default(),
            indicators,
        }
    }

    /// The four FMP indicators: GDP, inflation, unemployment, fed funds.
    pub fn default_fmp() -> Self {
        Self::new(vec![
            IndicatorSpec::new("Real GDP", "realGDP"),
            IndicatorSpec::new("Inflation Rate", "inflationRate"),
            IndicatorSpec::new("Unemployment Rate", "unemploymentRate"),
            IndicatorSpec::new("Federal Funds Rate", "federalFunds"),
        ])
    }

    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indicators.is_empty() {
            return Err(ConfigError::NoIndicators);
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for spec in &self.indicators {
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateName(spec.name.clone()));
            }
            if !ids.insert(spec.id.as_str()) {
                return Err(ConfigError::DuplicateId(spec.id.clone()));
            }
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(ConfigError::InvalidRange { start, end });
            }
        }

        self.resample_method()?;
        Ok(())
    }

    /// The global resampling method.
    pub fn resample_method(&self) -> Result<ResampleMethod, ResampleError> {
        self.method.parse()
    }

    /// Method for one indicator: its override if set, else the global one.
    pub fn method_for(&self, spec: &IndicatorSpec) -> Result<ResampleMethod, ResampleError> {
        spec.method.as_deref().unwrap_or(&self.method).parse()
    }

    pub fn indicator_list(&self) -> Vec<Indicator> {
        self.indicators.iter().map(IndicatorSpec::indicator).collect()
    }

    /// Restrict the run to the named indicators (matched by name or id).
    pub fn select(&mut self, wanted: &[String]) {
        if wanted.is_empty() {
            return;
        }
        self.indicators
            .retain(|spec| wanted.iter().any(|w| *w == spec.name || *w == spec.id));
    }
}
