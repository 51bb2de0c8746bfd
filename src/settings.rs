use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::session::SessionConfig;

pub const ENGINE_URL_ENV: &str = "MAGICQC_ENGINE_URL";
pub const CATALOG_URL_ENV: &str = "MAGICQC_CATALOG_URL";
pub const DEBUG_ENV: &str = "MAGICQC_DEBUG";

const DEBUG_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PanelSettings {
    pub engine_base_url: String,
    pub catalog_base_url: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub autosave_debounce_ms: u64,
    /// Pause between the engine stop and the first status probe of a restart.
    pub restart_settle_ms: u64,
    pub side: String,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            engine_base_url: "http://127.0.0.1:5000/api".into(),
            catalog_base_url: "http://127.0.0.1:8000/api".into(),
            request_timeout_secs: 10,
            poll_interval_ms: 1000,
            autosave_debounce_ms: 2000,
            restart_settle_ms: 500,
            side: "front".into(),
        }
    }
}

impl PanelSettings {
    /// Applies `MAGICQC_*` environment overrides through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENGINE_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.engine_base_url = url.trim().to_string();
        }
        if let Some(url) = lookup(CATALOG_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.catalog_base_url = url.trim().to_string();
        }
        let debug = lookup(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug {
            self.poll_interval_ms = self.poll_interval_ms.min(DEBUG_POLL_INTERVAL_MS);
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(50)),
            autosave_debounce: Duration::from_millis(self.autosave_debounce_ms),
            side: self.side.clone(),
        }
    }
}

/// `settings.json` in the app data directory.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PanelSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            PanelSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, PanelSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PanelSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stored settings with environment overrides applied.
    pub fn effective(&self) -> PanelSettings {
        self.read()
            .clone()
            .with_overrides(|key| std::env::var(key).ok())
    }

    pub fn stored(&self) -> PanelSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: PanelSettings) -> Result<()> {
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &PanelSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: PanelSettings =
            serde_json::from_str(r#"{"engineBaseUrl": "http://engine:5000/api"}"#).unwrap();

        assert_eq!(settings.engine_base_url, "http://engine:5000/api");
        assert_eq!(settings.poll_interval_ms, 1000);
        assert_eq!(settings.session_config().autosave_debounce, Duration::from_secs(2));
    }

    #[test]
    fn environment_overrides_apply() {
        let settings = PanelSettings::default().with_overrides(|key| match key {
            ENGINE_URL_ENV => Some("http://10.0.0.5:5000/api".into()),
            DEBUG_ENV => Some("true".into()),
            _ => None,
        });

        assert_eq!(settings.engine_base_url, "http://10.0.0.5:5000/api");
        assert_eq!(settings.catalog_base_url, PanelSettings::default().catalog_base_url);
        assert_eq!(settings.poll_interval_ms, DEBUG_POLL_INTERVAL_MS);
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.stored();
        settings.side = "back".into();
        store.update(settings).unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.stored().side, "back");
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let store = SettingsStore::new(path).unwrap();

        assert_eq!(store.stored(), PanelSettings::default());
    }
}
