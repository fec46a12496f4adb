//! Persistence of [`ApiConfig`] as a single JSON blob.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{ApiConfig, ApiConfigBuilder};
use crate::errors::{CouncilError, CouncilResult};

/// Directory name below the platform configuration directory.
const SETTINGS_DIR: &str = "product-council";
/// File name of the persisted settings blob.
const SETTINGS_FILE: &str = "settings.json";

/// Key-value storage for the API configuration.
///
/// Implementations hold exactly one entry. `load` returns `None` on first run.
pub trait ConfigStore: Send + Sync {
    /// Loads the stored configuration, if any.
    fn load(&self) -> CouncilResult<Option<ApiConfig>>;

    /// Stores the configuration, replacing the previous entry.
    fn save(&self, config: &ApiConfig) -> CouncilResult<()>;
}

/// Wire shape of the persisted entry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredConfig {
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    model: String,
}

impl StoredConfig {
    fn from_config(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key().to_string(),
            model: config.model.clone(),
        }
    }

    fn into_config(self) -> CouncilResult<ApiConfig> {
        ApiConfigBuilder::new()
            .base_url(self.base_url)
            .api_key(self.api_key)
            .model(self.model)
            .build()
    }
}

fn encode(config: &ApiConfig) -> CouncilResult<String> {
    Ok(serde_json::to_string_pretty(&StoredConfig::from_config(config))?)
}

fn decode(blob: &str) -> CouncilResult<ApiConfig> {
    let stored: StoredConfig = serde_json::from_str(blob).map_err(|e| CouncilError::Configuration {
        message: format!("Stored settings are corrupt: {}", e),
    })?;
    stored.into_config()
}

/// Loads the stored configuration, falling back to defaults on first run.
pub fn load_or_default(store: &dyn ConfigStore) -> CouncilResult<ApiConfig> {
    Ok(store.load()?.unwrap_or_default())
}

/// Returns the platform default location of the settings file.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(SETTINGS_DIR).join(SETTINGS_FILE))
}

/// Settings stored as a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Creates a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store at the platform default location.
    pub fn at_default_location() -> CouncilResult<Self> {
        default_settings_path()
            .map(Self::new)
            .ok_or_else(|| CouncilError::Configuration {
                message: "No configuration directory available on this platform".to_string(),
            })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> CouncilResult<Option<ApiConfig>> {
        let blob = match std::fs::read_to_string(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CouncilError::Configuration {
                    message: format!("Failed to read {}: {}", self.path.display(), e),
                })
            }
        };

        decode(&blob).map(Some)
    }

    fn save(&self, config: &ApiConfig) -> CouncilResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CouncilError::Configuration {
                message: format!("Failed to create {}: {}", parent.display(), e),
            })?;
        }

        std::fs::write(&self.path, encode(config)?).map_err(|e| CouncilError::Configuration {
            message: format!("Failed to write {}: {}", self.path.display(), e),
        })?;

        tracing::debug!(path = %self.path.display(), "Saved API settings");
        Ok(())
    }
}

/// Settings kept in memory, for hosts without a filesystem and for tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    blob: Mutex<Option<String>>,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding a raw JSON blob.
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
        }
    }

    /// Returns the raw JSON blob currently stored.
    pub fn blob(&self) -> Option<String> {
        self.blob.lock().ok().and_then(|guard| guard.clone())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> CouncilResult<Option<ApiConfig>> {
        match self.blob() {
            Some(blob) => decode(&blob).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, config: &ApiConfig) -> CouncilResult<()> {
        let encoded = encode(config)?;
        let mut guard = self.blob.lock().map_err(|_| CouncilError::Configuration {
            message: "Settings store lock poisoned".to_string(),
        })?;
        *guard = Some(encoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_BASE_URL, DEFAULT_MODEL};

    fn sample_config() -> ApiConfig {
        ApiConfig::builder()
            .base_url("http://localhost:3000/v1")
            .api_key("sk-local-12345")
            .model("gpt-4-turbo")
            .build()
            .unwrap()
    }

    #[test]
    fn test_first_run_uses_defaults() {
        let store = MemoryConfigStore::new();
        let config = load_or_default(&store).unwrap();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.api_key().is_empty());
    }

    #[test]
    fn test_memory_store_blob_uses_camel_case_keys() {
        let store = MemoryConfigStore::new();
        store.save(&sample_config()).unwrap();

        let blob: serde_json::Value = serde_json::from_str(&store.blob().unwrap()).unwrap();
        assert_eq!(blob["baseUrl"], "http://localhost:3000/v1");
        assert_eq!(blob["apiKey"], "sk-local-12345");
        assert_eq!(blob["model"], "gpt-4-turbo");
    }

    #[test]
    fn test_memory_store_reads_partial_blob() {
        let store = MemoryConfigStore::with_blob(r#"{"apiKey":"sk-only"}"#);
        let config = store.load().unwrap().unwrap();

        assert_eq!(config.api_key(), "sk-only");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(!config.is_complete());
    }

    #[test]
    fn test_corrupt_blob_is_a_configuration_error() {
        let store = MemoryConfigStore::with_blob("{not json");
        assert!(matches!(store.load(), Err(CouncilError::Configuration { .. })));
    }

    #[test]
    fn test_file_store_missing_file_is_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("settings.json"));

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        FileConfigStore::new(&path).save(&sample_config()).unwrap();
        let loaded = FileConfigStore::new(&path).load().unwrap().unwrap();

        assert_eq!(loaded.base_url, "http://localhost:3000/v1");
        assert_eq!(loaded.api_key(), "sk-local-12345");
        assert_eq!(loaded.model, "gpt-4-turbo");
    }
}
