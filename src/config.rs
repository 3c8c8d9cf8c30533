use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use snapvote_core::{AccountId, Amount};

pub const DEFAULT_STATE_PATH: &str = "snapvote-state.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Where the ledger state document lives.
    pub state_path: PathBuf,
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub max_supply: Option<Amount>,
    /// Accounts granted admin and minter at `init`.
    pub admins: Vec<AccountId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            log_level: "info".to_string(),
            max_supply: None,
            admins: Vec::new(),
        }
    }
}

impl Config {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
