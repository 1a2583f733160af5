//! API key discovery for the remote function classifier.
//!
//! Keys come from, in order: the process environment, a `.env` file in the
//! data directory, `config.json` in the data directory, and finally a remote
//! key service named by `API_KEY_SERVICE_URL`. There is no built-in key.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::domain::DomainError;

const ENV_KEYS: [&str; 2] = ["GORILLA_API_KEY", "API_KEY"];
const CONFIG_KEYS: [&str; 2] = ["gorilla_api_key", "api_key"];
const KEY_SERVICE_ENV: &str = "API_KEY_SERVICE_URL";
const DOTENV_FILE: &str = ".env";
const CONFIG_FILE: &str = "config.json";

pub type EnvLookup = fn(&str) -> Option<String>;

/// Where an API key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Env,
    File,
    Remote,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeySource::Env => "env",
            KeySource::File => "file",
            KeySource::Remote => "api",
        })
    }
}

impl FromStr for KeySource {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "env" => Ok(KeySource::Env),
            "file" => Ok(KeySource::File),
            "api" | "remote" => Ok(KeySource::Remote),
            other => Err(DomainError::validation(format!(
                "unknown API key source {other:?} (expected env, file or api)"
            ))),
        }
    }
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// The places an API key may be read from.
#[derive(Debug, Clone)]
pub struct CredentialSources {
    data_dir: PathBuf,
    env: EnvLookup,
    remote_timeout: Duration,
}

impl CredentialSources {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            env: process_env,
            remote_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Finds a key, either from one named source or from all of them in order.
    pub fn resolve(&self, only: Option<KeySource>) -> Option<(String, KeySource)> {
        let order = match only {
            Some(source) => vec![source],
            None => vec![KeySource::Env, KeySource::File, KeySource::Remote],
        };

        order.into_iter().find_map(|source| {
            let key = match source {
                KeySource::Env => self.from_env(),
                KeySource::File => self.from_dotenv().or_else(|| self.from_config_file()),
                KeySource::Remote => self.from_remote(),
            }?;
            info!(target: "carenav::classifier", source = %source, "API key loaded");
            Some((key, source))
        })
    }

    fn from_env(&self) -> Option<String> {
        ENV_KEYS
            .iter()
            .find_map(|name| (self.env)(name).and_then(non_empty))
    }

    fn from_dotenv(&self) -> Option<String> {
        let entries = read_dotenv(&self.data_dir.join(DOTENV_FILE))?;
        ENV_KEYS
            .iter()
            .find_map(|name| entries.get(*name).cloned().and_then(non_empty))
    }

    fn from_config_file(&self) -> Option<String> {
        let path = self.data_dir.join(CONFIG_FILE);
        let text = std::fs::read_to_string(&path).ok()?;
        let config: Value = serde_json::from_str(&text)
            .map_err(|err| debug!(target: "carenav::classifier", error = %err, "config.json is not valid JSON"))
            .ok()?;
        CONFIG_KEYS.iter().find_map(|name| {
            config
                .get(*name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .and_then(non_empty)
        })
    }

    fn from_remote(&self) -> Option<String> {
        let url = (self.env)(KEY_SERVICE_ENV).and_then(non_empty)?;
        let response = ureq::get(&url)
            .timeout(self.remote_timeout)
            .set("Content-Type", "application/json")
            .call()
            .map_err(|err| debug!(target: "carenav::classifier", error = %err, "key service unreachable"))
            .ok()?;
        let body: Value = response
            .into_json()
            .map_err(|err| debug!(target: "carenav::classifier", error = %err, "key service answered non-JSON"))
            .ok()?;
        ["api_key", "key"].iter().find_map(|name| {
            body.get(*name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .and_then(non_empty)
        })
    }

    /// Writes `key` as `GORILLA_API_KEY` into the data directory's `.env`,
    /// keeping any other entries already there.
    pub fn save_to_dotenv(&self, key: &str) -> Result<PathBuf, DomainError> {
        let path = self.data_dir.join(DOTENV_FILE);
        let mut entries = read_dotenv(&path).unwrap_or_default();
        entries.insert(ENV_KEYS[0].to_string(), key.to_string());

        let body: String = entries
            .iter()
            .map(|(name, value)| dotenv_line(name, value))
            .collect();
        std::fs::create_dir_all(&self.data_dir)
            .and_then(|_| std::fs::write(&path, body))
            .map_err(|err| DomainError::storage(format!("failed to write {}: {err}", path.display())))?;

        info!(target: "carenav::classifier", path = %path.display(), "API key saved");
        Ok(path)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Entries of a `.env` file, or `None` when it cannot be opened. Lines that
/// do not parse are skipped.
fn read_dotenv(path: &Path) -> Option<BTreeMap<String, String>> {
    let entries = dotenvy::from_path_iter(path)
        .map_err(|err| debug!(target: "carenav::classifier", path = %path.display(), error = %err, "no .env file"))
        .ok()?;
    Some(
        entries
            .filter_map(|entry| {
                entry
                    .map_err(|err| debug!(target: "carenav::classifier", error = %err, "skipping .env line"))
                    .ok()
            })
            .collect(),
    )
}

/// Renders one entry, double-quoting values the parser would otherwise split.
fn dotenv_line(name: &str, value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| !c.is_whitespace() && !matches!(c, '#' | '"' | '\'' | '\\' | '$'));
    if plain {
        format!("{name}={value}\n")
    } else {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$");
        format!("{name}=\"{escaped}\"\n")
    }
}

/// Everything the classifier needs to issue one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub api_key: Option<String>,
}

impl ClassifierConfig {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// A copy carrying a freshly resolved key, or `None` when no source has one.
    pub fn refreshed(&self, sources: &CredentialSources, only: Option<KeySource>) -> Option<Self> {
        let (key, _) = sources.resolve(only)?;
        Some(Self {
            api_key: Some(key),
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn both_env_keys(name: &str) -> Option<String> {
        match name {
            "GORILLA_API_KEY" => Some("gorilla-env".into()),
            "API_KEY" => Some("plain-env".into()),
            _ => None,
        }
    }

    fn blank_gorilla_key(name: &str) -> Option<String> {
        match name {
            "GORILLA_API_KEY" => Some("   ".into()),
            "API_KEY" => Some("plain-env".into()),
            _ => None,
        }
    }

    #[test]
    fn environment_wins_and_prefers_the_gorilla_name() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "GORILLA_API_KEY=from-file\n").unwrap();
        let sources = CredentialSources::new(dir.path()).with_env(both_env_keys);
        assert_eq!(
            sources.resolve(None),
            Some(("gorilla-env".to_string(), KeySource::Env))
        );

        let sources = CredentialSources::new(dir.path()).with_env(blank_gorilla_key);
        assert_eq!(sources.resolve(None).unwrap().0, "plain-env");
    }

    #[test]
    fn dotenv_comes_before_config_json() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "# comment\nOTHER=1\nAPI_KEY=\"quoted-key\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("config.json"), r#"{"api_key": "json-key"}"#).unwrap();

        let sources = CredentialSources::new(dir.path()).with_env(no_env);
        assert_eq!(
            sources.resolve(None),
            Some(("quoted-key".to_string(), KeySource::File))
        );

        std::fs::remove_file(dir.path().join(".env")).unwrap();
        assert_eq!(sources.resolve(None).unwrap().0, "json-key");
    }

    #[test]
    fn no_source_means_no_key() {
        let dir = tempdir().unwrap();
        let sources = CredentialSources::new(dir.path()).with_env(no_env);
        assert_eq!(sources.resolve(None), None);
        assert_eq!(sources.resolve(Some(KeySource::Remote)), None);
    }

    #[test]
    fn a_named_source_skips_the_others() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), r#"{"gorilla_api_key": "json-key"}"#).unwrap();
        let sources = CredentialSources::new(dir.path()).with_env(both_env_keys);
        assert_eq!(
            sources.resolve(Some(KeySource::File)),
            Some(("json-key".to_string(), KeySource::File))
        );
    }

    #[test]
    fn refreshed_returns_a_new_config_without_touching_the_old_one() {
        let dir = tempdir().unwrap();
        let sources = CredentialSources::new(dir.path()).with_env(both_env_keys);
        let stale = ClassifierConfig::new("http://localhost/v2", Duration::from_secs(30))
            .with_api_key("stale");

        let fresh = stale.refreshed(&sources, None).unwrap();
        assert_eq!(fresh.api_key.as_deref(), Some("gorilla-env"));
        assert_eq!(fresh.endpoint, stale.endpoint);
        assert_eq!(stale.api_key.as_deref(), Some("stale"));

        let empty = CredentialSources::new(dir.path()).with_env(no_env);
        assert!(stale.refreshed(&empty, None).is_none());
    }

    #[test]
    fn saving_keeps_other_dotenv_entries() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "OTHER=1\nNOTE='two words'\nGORILLA_API_KEY=old\n",
        )
        .unwrap();
        let sources = CredentialSources::new(dir.path()).with_env(no_env);

        sources.save_to_dotenv("new-key").unwrap();

        let saved = read_dotenv(&dir.path().join(".env")).unwrap();
        assert_eq!(saved.get("OTHER").map(String::as_str), Some("1"));
        assert_eq!(saved.get("NOTE").map(String::as_str), Some("two words"));
        assert_eq!(saved.get("GORILLA_API_KEY").map(String::as_str), Some("new-key"));
        assert_eq!(sources.resolve(None).unwrap().0, "new-key");
    }

    #[test]
    fn key_source_names_parse() {
        assert_eq!("env".parse::<KeySource>().unwrap(), KeySource::Env);
        assert_eq!("API".parse::<KeySource>().unwrap(), KeySource::Remote);
        assert!("default".parse::<KeySource>().is_err());
    }

    #[test]
    fn dotenv_files_accept_export_and_inline_comments() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "export GORILLA_API_KEY=exported-key # rotated monthly\nOTHER='single quoted'\n",
        )
        .unwrap();

        let sources = CredentialSources::new(dir.path()).with_env(no_env);
        assert_eq!(
            sources.resolve(Some(KeySource::File)),
            Some(("exported-key".to_string(), KeySource::File))
        );
        let entries = read_dotenv(&dir.path().join(".env")).unwrap();
        assert_eq!(entries.get("OTHER").map(String::as_str), Some("single quoted"));
    }
}
