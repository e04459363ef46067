//! Settings loader for Parlance.
//!
//! Reads `config.toml` from the data directory (`~/.parlance/` in
//! production, overridable with `PARLANCE_DATA_DIR`) and deserializes it
//! into [`Settings`]. Falls back to defaults when the file is missing or
//! malformed so a fresh install runs without any configuration.

use std::path::{Path, PathBuf};

use parlance_types::Settings;

/// Resolve the data directory.
///
/// `PARLANCE_DATA_DIR` wins when set; otherwise `~/.parlance`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PARLANCE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parlance")
}

/// Default database URL inside `data_dir`.
pub fn default_database_url(data_dir: &Path) -> String {
    format!("sqlite://{}/parlance.db?mode=rwc", data_dir.display())
}

/// Load settings from `{data_dir}/config.toml`.
///
/// - Missing file: returns [`Settings::default()`].
/// - Unreadable or unparseable file: logs a warning and returns the default.
pub async fn load_settings(data_dir: &Path) -> Settings {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return Settings::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return Settings::default();
        }
    };

    match toml::from_str::<Settings>(&content) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            Settings::default()
        }
    }
}
