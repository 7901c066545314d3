use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vixen_editor::SessionOptions;

pub const DEFAULT_CONFIG_NAME: &str = "vixen.config.json";

/// Vixen configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Tag of the root element for new documents
    #[serde(default = "default_root_tag")]
    pub root_tag: String,

    /// Maximum number of undo levels (0 = unlimited)
    #[serde(default = "default_max_undo_levels")]
    pub max_undo_levels: usize,
}

fn default_root_tag() -> String {
    "window".to_string()
}

fn default_max_undo_levels() -> usize {
    100
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Return default config if none exists
            Ok(Config::default())
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            root_tag: self.root_tag.clone(),
            max_undo_levels: self.max_undo_levels,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_tag: default_root_tag(),
            max_undo_levels: default_max_undo_levels(),
        }
    }
}
