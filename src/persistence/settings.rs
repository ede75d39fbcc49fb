use std::fs;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LEFT_PANEL_WIDTH: f32 = 380.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

/// The two persisted UI preferences. Everything else the app shows lives in
/// memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub left_panel_width: f32,
    pub theme: Theme,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            left_panel_width: DEFAULT_LEFT_PANEL_WIDTH,
            theme: Theme::default(),
        }
    }
}

// Tests point this at a temp dir so settings IO never touches the real
// user config directory.
static CONFIG_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

pub fn set_config_dir_override(dir: PathBuf) {
    let _ = CONFIG_DIR_OVERRIDE.set(dir);
}

impl AppSettings {
    fn config_dir() -> PathBuf {
        if let Some(dir) = CONFIG_DIR_OVERRIDE.get() {
            return dir.clone();
        }
        // Cross-platform user config dir
        #[cfg(target_os = "macos")]
        {
            // ~/Library/Application Support/ChatBoard
            let home = std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("~"));
            return home
                .join("Library")
                .join("Application Support")
                .join("ChatBoard");
        }
        #[cfg(target_os = "windows")]
        {
            // %APPDATA%\ChatBoard
            if let Ok(appdata) = std::env::var("APPDATA") {
                return PathBuf::from(appdata).join("ChatBoard");
            }
            return PathBuf::from("ChatBoard");
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_CONFIG_HOME/ChatBoard or ~/.config/ChatBoard
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                return PathBuf::from(xdg).join("ChatBoard");
            }
            let home = std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("~"));
            return home.join(".config").join("ChatBoard");
        }
    }

    pub fn settings_path() -> PathBuf {
        Self::config_dir().join("settings.json")
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = Self::settings_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = fs::read_to_string(path)?;
        let v: Self = serde_json::from_str(&s)?;
        Ok(v)
    }

    /// Load, falling back to defaults on any read/parse failure. Failures are
    /// soft: a warning in the log, never an error surface.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(v) => v,
            Err(err) => {
                log::warn!("failed to load settings, using defaults: {err}");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;
        let s = serde_json::to_string_pretty(self)?;
        fs::write(dir.join("settings.json"), s)?;
        Ok(())
    }

    /// Save, logging instead of propagating. Preference writes are never worth
    /// interrupting the UI for.
    pub fn save_or_warn(&self) {
        if let Err(err) = self.save() {
            log::warn!("failed to save settings: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One combined test: the config-dir override is process-global and
    // set-once, so the round trip and the malformed-file fallback share it.
    #[test]
    fn settings_round_trip_and_malformed_fallback() {
        let dir = std::env::temp_dir().join(format!(
            "chatboard_settings_test_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        set_config_dir_override(dir.clone());

        // Nothing on disk yet: defaults
        let fresh = AppSettings::load().expect("missing file should load defaults");
        assert_eq!(fresh.left_panel_width, DEFAULT_LEFT_PANEL_WIDTH);
        assert_eq!(fresh.theme, Theme::Dark);

        let custom = AppSettings {
            left_panel_width: 412.5,
            theme: Theme::Light,
        };
        custom.save().expect("save should succeed");
        let loaded = AppSettings::load().expect("load should succeed");
        assert_eq!(loaded.left_panel_width, 412.5);
        assert_eq!(loaded.theme, Theme::Light);

        // Corrupt the file: load() errors, load_or_default() degrades
        fs::write(AppSettings::settings_path(), "{not json").expect("corrupt write");
        assert!(AppSettings::load().is_err());
        let fallback = AppSettings::load_or_default();
        assert_eq!(fallback.left_panel_width, DEFAULT_LEFT_PANEL_WIDTH);

        let _ = fs::remove_dir_all(dir);
    }
}
