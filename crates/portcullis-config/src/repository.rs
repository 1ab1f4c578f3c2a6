//! The loaded configuration tree.

use portcullis_core::config::{keys, lookup};
use portcullis_core::ConfigProvider;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::settings::{KernelSettings, LoggingSettings};
use crate::ConfigError;

/// A JSON-shaped configuration tree addressed by dotted keys.
///
/// # Example
///
/// ```
/// use portcullis_config::ConfigRepository;
/// use serde_json::json;
///
/// let mut config = ConfigRepository::new();
/// config.set("app.maintenanceMode.enabled", json!(true)).unwrap();
///
/// assert_eq!(config.get_as::<bool>("app.maintenanceMode.enabled").unwrap(), Some(true));
/// assert_eq!(config.get_as::<bool>("app.debug").unwrap(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRepository {
    root: Value,
}

impl ConfigRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Wraps an existing tree. A non-object root is replaced by an empty one.
    #[must_use]
    pub fn from_value(root: Value) -> Self {
        if root.is_object() {
            Self { root }
        } else {
            Self::new()
        }
    }

    /// Returns the whole tree.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Consumes the repository, returning the tree.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.root
    }

    /// Returns `true` if `key` holds a non-null value.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        lookup(&self.root, key).is_some()
    }

    /// Deserializes the value at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the value has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        lookup(&self.root, key)
            .map(|value| {
                T::deserialize(value).map_err(|e| ConfigError::invalid_value(key, e.to_string()))
            })
            .transpose()
    }

    /// Deserializes the section at `key`, using its default when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the section has the wrong shape.
    pub fn section<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, ConfigError> {
        Ok(self.get_as(key)?.unwrap_or_default())
    }

    /// Returns the `kernel` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the section is malformed.
    pub fn kernel_settings(&self) -> Result<KernelSettings, ConfigError> {
        self.section(keys::KERNEL)
    }

    /// Returns the `logging` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the section is malformed.
    pub fn logging_settings(&self) -> Result<LoggingSettings, ConfigError> {
        self.section(keys::LOGGING)
    }

    /// Stores `value` at `key`, creating intermediate objects.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the key is empty or a prefix
    /// of it holds a non-object value.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        if key.is_empty() {
            return Err(ConfigError::invalid_value(key, "empty key"));
        }

        let mut node = &mut self.root;
        let mut segments = key.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Value::Object(map) = node else {
                return Err(ConfigError::invalid_value(
                    key,
                    format!("parent of `{segment}` is not an object"),
                ));
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value);
                return Ok(());
            }
            node = map
                .entry(segment)
                .or_insert_with(|| Value::Object(Map::new()));
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
        }
        Ok(())
    }

    /// Deep-merges `overlay` into the tree. Objects merge key by key; any
    /// other value replaces what was there.
    pub fn merge(&mut self, overlay: Value) {
        merge_values(&mut self.root, overlay);
    }
}

impl Default for ConfigRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigProvider for ConfigRepository {
    fn get(&self, key: &str) -> Option<Value> {
        lookup(&self.root, key).cloned()
    }
}

pub(crate) fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
