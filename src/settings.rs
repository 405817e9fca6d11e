use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILE_NAME: &str = "settings.json";
const APP_DIR_NAME: &str = "voice-callout";

/// Overrides `base_url` from the settings file.
pub const BASE_URL_ENV: &str = "VOICE_CALLOUT_BASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Origin of the voice profile / synthesis service.
    pub base_url: String,

    /// Per-request timeout for upload, generation, and audio downloads.
    pub request_timeout_secs: u64,

    /// Delay between a success message and revealing the next step.
    pub reveal_delay_ms: u64,

    /// Refresh interval of the elapsed-time readout while recording.
    pub tick_interval_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 60,
            reveal_delay_ms: 1000,
            tick_interval_ms: 100,
        }
    }
}

impl AppSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        // tokio::time::interval panics on a zero period
        Duration::from_millis(self.tick_interval_ms.max(10))
    }

    /// Apply environment overrides (`.env` is loaded by the binary).
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
    }
}

/// `<config_dir>/voice-callout/settings.json`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Load settings from `path`, falling back to defaults when the file is
/// missing or unreadable.
pub fn load_settings_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

/// Load from an explicit path or the default location, then apply env overrides.
pub fn load_settings(path: Option<&Path>) -> AppSettings {
    let mut settings = match path.map(Path::to_path_buf).or_else(default_settings_path) {
        Some(p) => load_settings_from(&p),
        None => {
            log::warn!("Settings: could not determine config directory");
            AppSettings::default()
        }
    };
    settings.apply_env();
    settings
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write to a sibling temp file, then rename over the target.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // Windows rename fails when the destination exists.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}
