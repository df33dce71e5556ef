use crate::models::AppConfig;
use std::collections::HashSet;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{error, info, warn};

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "read failed: {err}"),
            Self::Parse(err) => write!(f, "parse failed: {err}"),
            Self::Invalid(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

/// Loads the configuration document and detects external edits, always
/// keeping a last-known-good snapshot. Watching is mtime polling; the
/// engine's watcher task calls `reload_if_changed` on its own cadence.
pub struct ConfigStore {
    path: PathBuf,
    current: AppConfig,
    last_modified: Option<SystemTime>,
}

impl ConfigStore {
    /// Opens the store with whatever the file currently holds. A missing or
    /// invalid file starts the engine with an empty service list rather
    /// than failing.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_modified = modified_at(&path);
        let current = match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                error!("Failed to load {}: {err}", path.display());
                AppConfig::default()
            }
        };
        Self {
            path,
            current,
            last_modified,
        }
    }

    pub fn current(&self) -> &AppConfig {
        &self.current
    }

    /// Re-reads the file when its modification time has moved. Malformed or
    /// invalid content keeps the previous configuration live and returns
    /// `None`.
    pub fn reload_if_changed(&mut self) -> Option<AppConfig> {
        let modified = modified_at(&self.path);
        if modified == self.last_modified {
            return None;
        }
        self.last_modified = modified;

        match read_config(&self.path) {
            Ok(config) => {
                info!("Configuration reloaded from {}", self.path.display());
                self.current = config.clone();
                Some(config)
            }
            Err(err) => {
                warn!(
                    "Ignoring configuration update, keeping last-known-good: {err}"
                );
                None
            }
        }
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: AppConfig = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for service in &config.services {
        if service.name.trim().is_empty() {
            return Err(ConfigError::Invalid("service with empty name".to_string()));
        }
        if service.address.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "service `{}` has an empty address",
                service.name
            )));
        }
        if service.ping_interval == 0 {
            return Err(ConfigError::Invalid(format!(
                "service `{}` has a zero ping interval",
                service.name
            )));
        }
        if !names.insert(service.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate service name `{}`",
                service.name
            )));
        }
    }
    Ok(())
}

pub fn config_path() -> PathBuf {
    std::env::var("STATUSWATCH_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "configs": { "title": "Internal Status", "incidentReportDelay": 120 },
        "services": [
            { "name": "api", "address": "https://api.example.com", "pingInterval": 60 },
            { "name": "db", "address": "10.0.0.5:5432", "pingInterval": 30, "showIp": true }
        ]
    }"#;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("statuswatch-test-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn open_parses_a_valid_document() {
        let path = temp_path("valid");
        fs::write(&path, VALID).unwrap();

        let store = ConfigStore::open(&path);
        assert_eq!(store.current().settings.title, "Internal Status");
        assert_eq!(store.current().settings.incident_report_delay, 120);
        assert_eq!(store.current().services.len(), 2);
        assert!(store.current().services[1].show_ip);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn duplicate_service_names_reject_the_document() {
        let path = temp_path("duplicate");
        fs::write(
            &path,
            r#"{ "services": [
                { "name": "api", "address": "https://a.example.com", "pingInterval": 60 },
                { "name": "api", "address": "https://b.example.com", "pingInterval": 60 }
            ] }"#,
        )
        .unwrap();

        let store = ConfigStore::open(&path);
        assert!(store.current().services.is_empty());

        fs::remove_file(&path).ok();
    }

    #[test]
    fn zero_interval_rejects_the_document() {
        let path = temp_path("zero-interval");
        fs::write(
            &path,
            r#"{ "services": [
                { "name": "api", "address": "https://a.example.com", "pingInterval": 0 }
            ] }"#,
        )
        .unwrap();

        let store = ConfigStore::open(&path);
        assert!(store.current().services.is_empty());

        fs::remove_file(&path).ok();
    }

    #[test]
    fn malformed_update_keeps_last_known_good() {
        let path = temp_path("malformed-update");
        fs::write(&path, VALID).unwrap();
        let mut store = ConfigStore::open(&path);

        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&path, "{ not json").unwrap();

        assert!(store.reload_if_changed().is_none());
        assert_eq!(store.current().services.len(), 2);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn changed_file_yields_a_new_snapshot() {
        let path = temp_path("changed");
        fs::write(&path, VALID).unwrap();
        let mut store = ConfigStore::open(&path);
        assert!(store.reload_if_changed().is_none());

        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(
            &path,
            r#"{ "services": [
                { "name": "cache", "address": "10.0.0.9:6379", "pingInterval": 15 }
            ] }"#,
        )
        .unwrap();

        let reloaded = store.reload_if_changed().expect("change not picked up");
        assert_eq!(reloaded.services.len(), 1);
        assert_eq!(reloaded.services[0].name, "cache");

        fs::remove_file(&path).ok();
    }
}
