use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::infrastructure::http_client::DEFAULT_ENDPOINT;

/// Default filename used to persist configuration within the data directory.
const CONFIG_FILENAME: &str = "config.json";

/// Remote function classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClassifierSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Complete persisted configuration payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub classifier: ClassifierSettings,
    /// Write the demo facilities into an empty store on startup.
    #[serde(default = "default_true")]
    pub seed_sample_data: bool,
    #[serde(default = "default_radius_miles")]
    pub default_radius_miles: f64,
    /// Both key names are kept so rewriting the file never drops a key stored
    /// here by hand. Credential lookup prefers `gorilla_api_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gorilla_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierSettings::default(),
            seed_sample_data: true,
            default_radius_miles: default_radius_miles(),
            gorilla_api_key: None,
            api_key: None,
        }
    }
}

/// Thread-safe manager responsible for loading and persisting `AppConfig`.
pub struct ConfigManager {
    path: PathBuf,
    state: RwLock<AppConfig>,
}

impl ConfigManager {
    /// Create a manager rooted at `data_dir`. The JSON file will be located at
    /// `<data_dir>/config.json` and is written with defaults when missing.
    pub fn load(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = data_dir.as_ref().join(CONFIG_FILENAME);
        let manager = if path.exists() {
            let config = fs::read(&path)
                .ok()
                .and_then(|bytes| match serde_json::from_slice::<AppConfig>(&bytes) {
                    Ok(config) => Some(config),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "unreadable config, using defaults");
                        None
                    }
                })
                .unwrap_or_default();
            Self {
                path,
                state: RwLock::new(config),
            }
        } else {
            let manager = Self {
                path,
                state: RwLock::new(AppConfig::default()),
            };
            manager.persist_locked(&manager.state.read())?;
            manager
        };

        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> AppConfig {
        self.state.read().clone()
    }

    /// Apply `change` and persist the result to disk.
    pub fn update(&self, change: impl FnOnce(&mut AppConfig)) -> std::io::Result<AppConfig> {
        let mut guard = self.state.write();
        change(&mut *guard);
        self.persist_locked(&guard)?;
        Ok(guard.clone())
    }

    /// Ensure the backing directory exists and write the JSON payload.
    fn persist_locked(&self, config: &AppConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(config)?;
        fs::write(&self.path, payload)
    }
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_radius_miles() -> f64 {
    10.0
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}
