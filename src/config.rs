use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `api_key` from the config file.
pub const API_KEY_ENV: &str = "SERPAPI_KEY";

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "imgsearch")
}

/// Directory for the log file; falls back to the system temp dir.
pub fn data_dir() -> PathBuf {
  project_dirs().map(|d| d.data_dir().to_path_buf()).unwrap_or_else(std::env::temp_dir)
}

/// User settings from `config.toml`. Never written by the program.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub api_key: Option<String>,
  pub base_url: Option<String>,
  pub log_level: Option<String>,
  /// Per-request timeout. Unset means the transport default.
  pub timeout_secs: Option<u64>,
}

impl Config {
  pub fn load() -> Self {
    let mut config = project_dirs()
      .map(|d| d.config_dir().join("config.toml"))
      .and_then(|path| Self::load_from(&path).ok())
      .unwrap_or_default();
    if let Ok(key) = std::env::var(API_KEY_ENV)
      && !key.trim().is_empty()
    {
      config.api_key = Some(key);
    }
    config
  }

  pub fn load_from(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
  }
}

/// Durable key-value state. Holds the last search query.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Prefs {
  pub search_query: Option<String>,
}

/// Where [`Prefs`] live on disk.
#[derive(Debug, Clone)]
pub struct PrefsStore {
  path: PathBuf,
}

impl PrefsStore {
  /// The platform config dir's `prefs.toml`, or a temp-dir file if there is no home.
  pub fn default_location() -> Self {
    let dir = project_dirs().map(|d| d.config_dir().to_path_buf()).unwrap_or_else(|| std::env::temp_dir().join("imgsearch"));
    Self::at(dir.join("prefs.toml"))
  }

  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Missing or unreadable prefs load as defaults.
  pub fn load(&self) -> Prefs {
    if let Ok(content) = std::fs::read_to_string(&self.path)
      && let Ok(prefs) = toml::from_str(&content)
    {
      return prefs;
    }
    Prefs::default()
  }

  pub fn save(&self, prefs: &Prefs) -> Result<()> {
    if let Some(dir) = self.path.parent() {
      std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let content = toml::to_string(prefs).context("Failed to serialize prefs")?;
    std::fs::write(&self.path, content).with_context(|| format!("Failed to write {}", self.path.display()))
  }
}
