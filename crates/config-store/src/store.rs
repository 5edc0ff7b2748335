//! Mutex-guarded configuration map

use crate::{seed_defaults, ConfigError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Environment prefix for overrides (`DROWSY_CONF_THRESHOLD=0.4`)
const ENV_PREFIX: &str = "DROWSY";

/// Live configuration shared between the pipeline thread and API handlers.
///
/// Every read and write goes through one mutex, so a reader always sees a
/// value that was completely written.
pub struct ConfigStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl ConfigStore {
    /// Create a store holding only the defaults
    pub fn with_defaults(path: impl Into<PathBuf>) -> Self {
        let mut values = Map::new();
        seed_defaults(&mut values);
        Self {
            path: path.into(),
            values: Mutex::new(values),
        }
    }

    /// Load the file at `path` (if present), layer `DROWSY_*` environment
    /// overrides on top, and seed any missing defaults.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let mut values: Map<String, Value> = settings.try_deserialize()?;
        let loaded = values.len();
        seed_defaults(&mut values);

        info!(
            "Loaded configuration from {} ({} keys, {} defaults added)",
            path.display(),
            loaded,
            values.len() - loaded
        );

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Load, falling back to defaults when the file is unreadable
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(path.clone()) {
            Ok(store) => store,
            Err(e) => {
                warn!("{}; continuing with defaults", e);
                Self::with_defaults(path)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        // A panic while holding the lock cannot leave a half-written value:
        // every mutation is a single map insert.
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read `key` as `T`, returning `default` when missing or not convertible
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let value = match self.lock().get(key) {
            Some(v) => v.clone(),
            None => return default,
        };

        match coerce(value) {
            Some(v) => v,
            None => {
                debug!("Config key {} has an unexpected type; using default", key);
                default
            }
        }
    }

    /// Raw JSON value for `key`
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Replace the value of `key`
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        debug!("Config set {} = {}", key, value);
        self.lock().insert(key.to_string(), value);
    }

    /// Apply several updates under a single lock acquisition
    pub fn set_many(&self, updates: Map<String, Value>) -> usize {
        let mut values = self.lock();
        let count = updates.len();
        for (key, value) in updates {
            values.insert(key, value);
        }
        count
    }

    /// Consistent copy of every key
    pub fn snapshot(&self) -> Map<String, Value> {
        self.lock().clone()
    }

    /// Location written by [`ConfigStore::persist`]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the current values to disk.
    ///
    /// The file is written next to the target and renamed into place so a
    /// crash mid-write never leaves a truncated configuration.
    pub fn persist(&self) -> Result<(), ConfigError> {
        let body = serde_json::to_string_pretty(&Value::Object(self.snapshot()))
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;

        let persist_err = |reason: std::io::Error| ConfigError::Persist {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(persist_err)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(persist_err)?;
        fs::rename(&tmp, &self.path).map_err(persist_err)?;

        info!("Configuration persisted to {}", self.path.display());
        Ok(())
    }
}

/// Convert a stored value into `T`, tolerating the loose typing of values
/// that arrive from the environment or from a UI slider.
fn coerce<T: DeserializeOwned>(value: Value) -> Option<T> {
    if let Ok(v) = serde_json::from_value::<T>(value.clone()) {
        return Some(v);
    }

    match value {
        Value::String(s) => serde_json::from_str::<T>(s.trim()).ok(),
        Value::Number(n) => {
            let f = n.as_f64()?;
            if f.fract() == 0.0 {
                if let Ok(v) = serde_json::from_value::<T>(Value::from(f as i64)) {
                    return Some(v);
                }
            }
            serde_json::from_value::<T>(Value::Bool(f != 0.0)).ok()
        }
        _ => None,
    }
}
