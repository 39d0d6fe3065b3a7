//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides the catalog API key.
pub const CATALOG_API_KEY_ENV: &str = "GIPHY_API_KEY";

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Rendering engine settings.
    pub engine: EngineConfig,

    /// Overlay catalog settings.
    pub catalog: CatalogConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// How the external rendering engine is located and driven.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path or name of the ffmpeg binary.
    pub ffmpeg_path: PathBuf,

    /// Path or name of the ffprobe binary.
    pub ffprobe_path: PathBuf,

    /// Encoder preset passed with `-preset`.
    pub preset: String,

    /// Interval of the elapsed-time refresher while an export runs.
    pub progress_tick_ms: u64,
}

/// Remote overlay catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// API key. `GIPHY_API_KEY` takes precedence when set.
    pub api_key: Option<String>,

    /// Results per page.
    pub page_size: u32,

    /// API root, without trailing slash.
    pub base_url: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "gifmix_render_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            preset: "fast".to_string(),
            progress_tick_ms: 500,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            page_size: 10,
            base_url: "https://api.giphy.com/v1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl CatalogConfig {
    /// The effective API key, preferring the environment over the file.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(CATALOG_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.api_key.clone())
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("gifmix").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.preset, "fast");
        assert_eq!(config.engine.progress_tick_ms, 500);
        assert_eq!(config.catalog.page_size, 10);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "engine": { "preset": "veryfast" } }"#).unwrap();
        assert_eq!(parsed.engine.preset, "veryfast");
        assert_eq!(parsed.engine.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(parsed.logging.level, "info");
    }
}
