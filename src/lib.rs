use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(feature = "mcp-server")]
pub mod interfaces;
pub mod settings;

use application::services::{
    sample_data, DisabledClassifier, DispatchConfig, FacilityStore, FunctionClassifier,
    FunctionDispatcher, NavigatorService,
};
use infrastructure::{ClassifierConfig, CredentialSources, GorillaClassifier, SledFacilityStore};
use settings::{AppConfig, ConfigManager};

const DATA_DIR_ENV: &str = "CARENAV_DATA_DIR";
const LOG_ENV: &str = "CARENAV_LOG";

/// Everything a front end needs, wired once at startup.
pub struct AppHandles {
    pub store: Arc<dyn FacilityStore>,
    pub dispatcher: Arc<FunctionDispatcher>,
    pub navigator: Arc<NavigatorService>,
    pub config: Arc<ConfigManager>,
    pub data_dir: PathBuf,
}

/// Builds the environment in `CARENAV_DATA_DIR` or the OS data directory.
pub fn build_environment() -> Result<AppHandles> {
    let data_dir = resolve_data_dir()?;
    build_environment_at(data_dir)
}

pub fn build_environment_at(data_dir: impl Into<PathBuf>) -> Result<AppHandles> {
    let data_dir = data_dir.into();
    std::fs::create_dir_all(&data_dir).context("failed to create data directory")?;

    let config = Arc::new(ConfigManager::load(&data_dir).context("failed to load config file")?);
    let active_config = config.current();

    let store_impl =
        SledFacilityStore::open(data_dir.join("store")).context("failed to open embedded store")?;
    let store: Arc<dyn FacilityStore> = Arc::new(store_impl);

    if active_config.seed_sample_data {
        sample_data::seed_if_empty(store.as_ref()).context("failed to seed sample facilities")?;
    }

    let dispatcher = Arc::new(FunctionDispatcher::new(
        Arc::clone(&store),
        DispatchConfig {
            default_radius_miles: active_config.default_radius_miles,
        },
    ));
    let classifier = init_classifier(&active_config, &data_dir);
    let navigator = Arc::new(NavigatorService::new(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        classifier,
    ));

    info!(data_dir = %data_dir.display(), "environment ready");

    Ok(AppHandles {
        store,
        dispatcher,
        navigator,
        config,
        data_dir,
    })
}

fn init_classifier(config: &AppConfig, data_dir: &std::path::Path) -> Arc<dyn FunctionClassifier> {
    if !config.classifier.enabled {
        info!(target: "carenav::classifier", "function classifier disabled in config");
        return Arc::new(DisabledClassifier);
    }

    let sources = CredentialSources::new(data_dir);
    let mut classifier_config =
        ClassifierConfig::new(config.classifier.endpoint.clone(), config.classifier.timeout());
    match sources.resolve(None) {
        Some((key, _)) => classifier_config = classifier_config.with_api_key(key),
        None => warn!(
            target: "carenav::classifier",
            "no API key found; classifier requests will be unauthenticated"
        ),
    }

    Arc::new(GorillaClassifier::new(classifier_config, sources))
}

/// Run MCP server using stdio transport (stdin/stdout).
/// This is designed for IDEs and agents that spawn MCP processes.
#[cfg(feature = "mcp-server")]
pub async fn run_mcp_stdio() -> Result<()> {
    init_tracing();

    let handles = build_environment().context("failed to bootstrap CareNav environment")?;

    info!(
        target: "carenav::mcp",
        "Starting MCP stdio server (stdin/stdout transport)..."
    );

    interfaces::mcp::run_mcp_stdio_server(handles.dispatcher)
        .await
        .context("MCP stdio server failed")?;

    Ok(())
}

/// Installs the global subscriber once. Logs go to stderr so stdout stays
/// free for JSON output.
pub fn init_tracing() {
    init_tracing_with_writer(std::io::stderr);
}

fn init_tracing_with_writer<W>(make_writer: fn() -> W)
where
    W: std::io::Write + Send + Sync + 'static,
{
    static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();

    let _ = INIT.get_or_init(|| {
        let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(make_writer)
            .compact()
            .try_init();
    });
}

fn resolve_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let dirs = directories::ProjectDirs::from("dev", "carenav", "CareNav")
        .ok_or_else(|| anyhow!("unable to determine OS data dir"))?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn disable_classifier(dir: &std::path::Path) {
        ConfigManager::load(dir)
            .unwrap()
            .update(|config| config.classifier.enabled = false)
            .unwrap();
    }

    #[test]
    fn fresh_environment_is_seeded_and_dispatchable() {
        let dir = tempdir().unwrap();
        disable_classifier(dir.path());
        let handles = build_environment_at(dir.path()).unwrap();

        assert_eq!(handles.store.list_ids().unwrap().len(), 4);
        let result = handles
            .dispatcher
            .dispatch("get_facility_details", json!({"facility_id": "clinic_001"}));
        assert_eq!(result["name"], "Downtown Health Clinic");
        assert!(handles.navigator.health().ok);
        assert!(dir.path().join("config.json").exists());
    }

    #[test]
    fn seeding_can_be_switched_off() {
        let dir = tempdir().unwrap();
        ConfigManager::load(dir.path())
            .unwrap()
            .update(|config| {
                config.classifier.enabled = false;
                config.seed_sample_data = false;
            })
            .unwrap();

        let handles = build_environment_at(dir.path()).unwrap();
        assert!(handles.store.list_ids().unwrap().is_empty());
    }

    #[test]
    fn disabled_classifier_yields_unsuccessful_queries() {
        let dir = tempdir().unwrap();
        disable_classifier(dir.path());
        let handles = build_environment_at(dir.path()).unwrap();

        let outcome = handles.navigator.process_query("find a pharmacy");
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("disabled"));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn seeding_is_logged_once() {
        let dir = tempdir().unwrap();
        disable_classifier(dir.path());

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            build_environment_at(dir.path()).unwrap();
        });

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert_eq!(output.matches("sample facilities written").count(), 1);
    }
}
