//! Configuration file support.

use crate::document::OutputFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default CLI options.
    pub defaults: Defaults,
}

/// Default CLI options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Enable verbose output by default.
    pub verbose: bool,
    /// Enable quiet output by default.
    pub quiet: bool,
    /// Schema file used when `--schema` is not given.
    pub schema: Option<PathBuf>,
    /// Rule profile used when `--profile` is not given.
    pub profile: Option<PathBuf>,
    /// Output format for mapped documents.
    pub format: Option<OutputFormat>,
}

impl Config {
    /// Load config from the default location (~/.config/transmap/config.toml).
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Load config from a specific path.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents, &path) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), "failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), "failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Parse a config file. Relative paths are resolved against the file's
    /// directory.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(contents)?;
        let base = path.parent().unwrap_or(Path::new("."));
        for file in [&mut config.defaults.schema, &mut config.defaults.profile]
            .into_iter()
            .flatten()
        {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
        Ok(config)
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("transmap").join("config.toml"))
    }
}
