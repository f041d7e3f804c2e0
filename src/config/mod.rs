pub mod bluetooth_config;
pub mod session_config;

use std::path::Path;

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::bluetooth_config::BluetoothConfig;
use crate::config::session_config::SessionConfig;
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "wand_config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WandConfig {
    pub session: SessionConfig,
    pub bluetooth: BluetoothConfig,
}

impl WandConfig {
    /// Loads the config from `path`, falling back to defaults when the file does not exist.
    pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_path = path.as_ref();

        if !file_path.exists() {
            warn!("Wand config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path)
            .await
            .with_context(|| format!("reading {}", file_path.display()))?;
        let config: Self = serde_json::from_str(&config_json)
            .with_context(|| format!("parsing {}", file_path.display()))?;

        info!("Wand config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the current config to `path`, creating parent directories as needed.
    pub async fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file_path = path.as_ref();
        if let Some(config_dir) = file_path.parent() {
            ensure_directory_exists(config_dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize wand config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;
        info!("Wand config saved to {:?}", file_path);
        Ok(())
    }
}
