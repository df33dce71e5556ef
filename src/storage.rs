use crate::models::ServiceState;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::warn;

/// Flat-file snapshot store. Every save rewrites the whole service vector
/// through a temp file and a rename, so a crash mid-write never leaves a
/// torn snapshot behind.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)?,
            _ => {}
        }
        Ok(Self { path })
    }

    /// Loads the persisted snapshot. Missing and malformed files both map
    /// to `None`; the engine then initializes fresh from configuration.
    pub fn load(&self) -> Option<Vec<ServiceState>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!("Failed to read snapshot {}: {err}", self.path.display());
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(services) => Some(services),
            Err(err) => {
                warn!(
                    "Discarding malformed snapshot {}: {err}",
                    self.path.display()
                );
                None
            }
        }
    }

    /// Persists the full snapshot with atomic-replace semantics. Day
    /// counters are transient and stay out of the file.
    pub fn save(&self, services: &[ServiceState]) -> io::Result<()> {
        let payload = serde_json::to_string_pretty(services)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

pub fn snapshot_path() -> PathBuf {
    std::env::var("STATUSWATCH_SNAPSHOT_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/snapshot.json"))
}
