//! Application configuration for cityprep.
//!
//! User config lives at `~/.cityprep/cityprep.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CityPrepError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "cityprep.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".cityprep";

// ---------------------------------------------------------------------------
// Config structs (matching cityprep.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Use-type remapping settings.
    #[serde(default)]
    pub usetype: UsetypeConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Whether inserted elements get their own indented lines.
    #[serde(default = "default_true")]
    pub pretty_print: bool,

    /// Indent width (spaces per nesting level) for inserted elements.
    #[serde(default = "default_indent")]
    pub indent: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            pretty_print: default_true(),
            indent: default_indent(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_indent() -> usize {
    2
}

/// `[usetype]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsetypeConfig {
    /// Replacement for codes missing from the translation table.
    /// When unset, unknown codes are reported and left unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_code: Option<String>,

    /// Extra source → target pairs merged over the built-in table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.cityprep/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CityPrepError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.cityprep/cityprep.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CityPrepError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CityPrepError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CityPrepError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CityPrepError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CityPrepError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
