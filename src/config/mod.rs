use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// File extensions the scanner treats as audio.
    #[serde(default = "default_extensions")]
    pub audio_extensions: Vec<String>,
    /// Bit rate used for lossy conversions when the caller gives none.
    #[serde(default = "default_bitrate")]
    pub default_bitrate_kbps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio_extensions: default_extensions(),
            default_bitrate_kbps: default_bitrate(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["mp3", "wav", "flac", "ogg", "m4a", "wma", "aac"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_bitrate() -> u32 {
    192
}

fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not find config directory")?
        .join("cadenza");

    Ok(config_dir.join("config.yml"))
}

pub fn load_or_create_config() -> Result<Config> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let default_config = Config::default();
        let yaml =
            serde_yaml::to_string(&default_config).context("Failed to serialize default config")?;

        fs::write(&config_path, yaml).context("Failed to write default config file")?;

        return Ok(default_config);
    }

    let config_content = fs::read_to_string(&config_path).context("Failed to read config file")?;

    let config: Config =
        serde_yaml::from_str(&config_content).context("Failed to parse config file")?;

    Ok(config)
}
