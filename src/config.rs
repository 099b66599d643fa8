use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, TilerError};
use crate::pyramid::{Profile, MAX_ZOOM};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Where and how tiles are written.
    pub output: OutputConfig,
    /// Zoom range and tiling scheme.
    #[serde(default)]
    pub pyramid: PyramidConfig,
    /// Worker pool settings.
    #[serde(default)]
    pub workers: WorkerConfig,
    /// Synthetic terrain parameters.
    #[serde(default)]
    pub terrain: TerrainConfig,
    /// Extra MBTiles metadata entries (name → value).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Output container kind.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Single SQLite file.
    Mbtiles,
    /// `<path>/<z>/<x>/<y>.<extension>` tree.
    Directory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// MBTiles file or root directory.
    pub path: PathBuf,
    #[serde(default = "default_format")]
    pub format: OutputFormat,
    /// Skip tiles already present in the output.
    #[serde(default)]
    pub resume: bool,
    /// File extension for directory output.
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PyramidConfig {
    #[serde(default)]
    pub profile: Profile,
    /// Deepest zoom, processed first.
    #[serde(default = "default_start_zoom")]
    pub start_zoom: u8,
    /// Shallowest zoom, processed last.
    #[serde(default)]
    pub end_zoom: u8,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self { profile: Profile::default(), start_zoom: default_start_zoom(), end_zoom: 0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Worker threads (0 = number of CPUs).
    #[serde(default)]
    pub threads: usize,
    /// Stop every worker on the first failed tile.
    #[serde(default = "default_abort_on_error")]
    pub abort_on_error: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { threads: 0, abort_on_error: default_abort_on_error() }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TerrainConfig {
    /// Constant elevation in metres.
    #[serde(default)]
    pub height: f64,
    /// Append a water mask byte to every tile.
    #[serde(default)]
    pub water_mask: bool,
}

fn default_format() -> OutputFormat { OutputFormat::Mbtiles }
fn default_extension() -> String { "terrain".into() }
fn default_start_zoom() -> u8 { 5 }
fn default_abort_on_error() -> bool { true }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TilerError::Config(format!("Cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| TilerError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.output.path.as_os_str().is_empty() {
            return Err(TilerError::Config("output.path must not be empty".into()));
        }
        if self.pyramid.start_zoom > MAX_ZOOM {
            return Err(TilerError::Config(format!("start_zoom must be <= {MAX_ZOOM}")));
        }
        if self.pyramid.end_zoom > self.pyramid.start_zoom {
            return Err(TilerError::Config("end_zoom must be <= start_zoom".into()));
        }
        if self.output.extension.is_empty() || self.output.extension.contains('/') {
            return Err(TilerError::Config("extension must be a plain file suffix".into()));
        }
        if !self.terrain.height.is_finite() {
            return Err(TilerError::Config("terrain.height must be finite".into()));
        }
        Ok(())
    }
}
