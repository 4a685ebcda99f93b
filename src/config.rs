//! Process-wide key/value configuration.
//!
//! A [`Config`] works like a plain string map with a few ways to fill it:
//! programmatically via [`set`](Config::set), from a JSON file, from an
//! environment variable pointing at a JSON file, or from prefixed
//! environment variables. Only uppercase keys are imported from files and
//! the environment, so lowercase entries can serve as scratch values in a
//! config file without leaking into the store.
//!
//! The tracer reads `APP_NAME` once at construction; the statsd emitter
//! reads `STATSD_HOST` and `STATSD_PORT`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

/// Configuration key naming the traced application. Required by the tracer.
pub const KEY_APP_NAME: &str = "APP_NAME";

/// Configuration key for the statsd host. Required by the emitter.
pub const KEY_STATSD_HOST: &str = "STATSD_HOST";

/// Configuration key for the statsd port. Required by the emitter.
pub const KEY_STATSD_PORT: &str = "STATSD_PORT";

/// Error from configuration loading or lookup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is absent.
    #[error("missing required config key {key:?}")]
    MissingKey {
        /// The key that was looked up.
        key: String,
    },
    /// A key is present but its value does not parse as the expected type.
    #[error("invalid value {value:?} for config key {key:?}")]
    InvalidValue {
        /// The offending key.
        key: String,
        /// The raw value found.
        value: String,
    },
    /// The environment variable naming a config file is not set.
    #[error(
        "environment variable {var:?} is not set; set it to the path of a \
         configuration file"
    )]
    EnvVarUnset {
        /// The unset variable name.
        var: String,
    },
    /// A config file could not be read.
    #[error("unable to read configuration file {path:?}")]
    Io {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A config file is not valid JSON.
    #[error("configuration file {path:?} is not valid JSON")]
    Parse {
        /// Path of the malformed file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// A process-wide key/value configuration store.
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key to a value, overwriting any previous entry.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the value for `key`, or `ConfigError::MissingKey`.
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Updates the store from a JSON file.
    ///
    /// The file must contain a JSON object. Only uppercase keys are
    /// imported; string values are taken as-is and other scalars are
    /// stringified, so `{"STATSD_PORT": 8125}` and
    /// `{"STATSD_PORT": "8125"}` are equivalent.
    pub fn from_json_file(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Value::Object(object) = value {
            for (key, value) in object {
                if !is_config_key(&key) {
                    continue;
                }
                let rendered = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                self.values.insert(key, rendered);
            }
        }
        Ok(())
    }

    /// Updates the store from a JSON file named by an environment variable.
    ///
    /// With `silent` set, an unset variable or a missing file is tolerated
    /// and reported as `Ok(false)`; malformed files still fail. Returns
    /// `Ok(true)` when the file was loaded.
    pub fn from_envvar(&mut self, var: &str, silent: bool) -> Result<bool, ConfigError> {
        let Ok(path) = std::env::var(var) else {
            if silent {
                return Ok(false);
            }
            return Err(ConfigError::EnvVarUnset {
                var: var.to_string(),
            });
        };
        match self.from_json_file(&path) {
            Ok(()) => Ok(true),
            Err(ConfigError::Io { ref source, .. })
                if silent && source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Imports environment variables starting with `prefix`, stripping it.
    ///
    /// `CARPY_APP_NAME=shop` imported with prefix `"CARPY_"` becomes
    /// `APP_NAME=shop`. Only uppercase remainders are kept. Returns the
    /// number of imported entries.
    pub fn from_env(&mut self, prefix: &str) -> usize {
        let mut imported = 0;
        for (key, value) in std::env::vars() {
            let Some(stripped) = key.strip_prefix(prefix) else {
                continue;
            };
            if !is_config_key(stripped) {
                continue;
            }
            self.values.insert(stripped.to_string(), value);
            imported += 1;
        }
        imported
    }
}

/// A key is importable when it is non-empty and has no lowercase characters.
fn is_config_key(key: &str) -> bool {
    !key.is_empty() && !key.chars().any(char::is_lowercase)
}
