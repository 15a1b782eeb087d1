//! Configuration management for sealvault

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Sealvault configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding the encrypted secrets and the key files
    #[serde(default = "default_secrets_dir")]
    pub secrets_dir: PathBuf,

    /// Plaintext dotenv file used for local overrides
    #[serde(default = "default_dotenv_file")]
    pub dotenv_file: PathBuf,

    /// Environment variable that may carry the private key
    #[serde(default = "default_decryption_key_env")]
    pub decryption_key_env: String,
}

fn default_secrets_dir() -> PathBuf {
    PathBuf::from("config/secrets")
}

fn default_dotenv_file() -> PathBuf {
    PathBuf::from(".env.local")
}

fn default_decryption_key_env() -> String {
    "SEALVAULT_DECRYPTION_KEY".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secrets_dir: default_secrets_dir(),
            dotenv_file: default_dotenv_file(),
            decryption_key_env: default_decryption_key_env(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }
}
