//! Filter run configuration.

use crate::error::{PhspError, Result};
use crate::filter::GeometryWindow;
use crate::pipeline::engine::{FilterEngine, DEFAULT_PROGRESS_INTERVAL};
use crate::stream::SizeMismatch;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default number of unreadable records tolerated before a run aborts.
pub const DEFAULT_ERROR_THRESHOLD: i64 = 100;

/// How a size or byte-order mismatch on the input is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCheckPolicy {
    /// Every mismatch stops the run before any record is read.
    #[default]
    Strict,
    /// A record file whose length disagrees with the header checksum is
    /// only warned about; other mismatches stay fatal.
    WarnOnSizeMismatch,
}

impl SizeCheckPolicy {
    /// Whether the run may continue despite `mismatch`.
    pub fn tolerates(&self, mismatch: &SizeMismatch) -> bool {
        match self {
            Self::Strict => false,
            Self::WarnOnSizeMismatch => matches!(mismatch, SizeMismatch::FileSize { .. }),
        }
    }
}

/// Complete configuration of a phase-space cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub window: GeometryWindow,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: i64,
    #[serde(default)]
    pub size_check: SizeCheckPolicy,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: i64,
}

fn default_error_threshold() -> i64 {
    DEFAULT_ERROR_THRESHOLD
}

fn default_progress_interval() -> i64 {
    DEFAULT_PROGRESS_INTERVAL
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: None,
            window: GeometryWindow::default(),
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            size_check: SizeCheckPolicy::Strict,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl FilterConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(PhspError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        if self.error_threshold < 0 {
            return Err(PhspError::InvalidParameter(
                "error_threshold cannot be negative".to_string(),
            ));
        }
        if self.progress_interval < 0 {
            return Err(PhspError::InvalidParameter(
                "progress_interval cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine configured from this run configuration.
    pub fn engine(&self) -> FilterEngine {
        FilterEngine::new(self.window, self.error_threshold)
            .with_progress_interval(self.progress_interval)
    }
}
