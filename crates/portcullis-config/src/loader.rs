//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, strings, `.env` files and environment
//! variables.

use std::env;
use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::repository::{merge_values, ConfigRepository};
use crate::ConfigError;

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration files and strings (TOML or JSON), deep-merged in order
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use portcullis_config::ConfigLoader;
///
/// # fn main() -> Result<(), portcullis_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("portcullis.toml")?
///     .with_dotenv()?
///     .with_env_prefix("PORTCULLIS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    root: Value,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader seeded with the default values.
    ///
    /// # Example
    ///
    /// ```
    /// use portcullis_config::ConfigLoader;
    /// use portcullis_core::ConfigProvider;
    ///
    /// let config = ConfigLoader::new().load().unwrap();
    /// let config: &dyn ConfigProvider = &config;
    /// assert!(!config.get_or("app.maintenanceMode.enabled", true));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: defaults(),
            env_prefix: None,
        }
    }

    /// Reset to the default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.root = defaults();
        self
    }

    /// Merge an in-memory tree on top of the current layers.
    ///
    /// # Example
    ///
    /// ```
    /// use portcullis_config::ConfigLoader;
    /// use portcullis_core::ConfigProvider;
    /// use serde_json::json;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_value(json!({ "app": { "maintenanceMode": { "enabled": true } } }))
    ///     .load()
    ///     .unwrap();
    /// let config: &dyn ConfigProvider = &config;
    /// assert!(config.get_or("app.maintenanceMode.enabled", false));
    /// ```
    #[must_use]
    pub fn with_value(mut self, overlay: Value) -> Self {
        merge_values(&mut self.root, overlay);
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats.
    /// The file format is determined by the file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::unsupported_format(path.display().to_string()))?;

        debug!(path = %path.display(), "loading configuration file");
        self.with_string(&content, format)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string.
    ///
    /// # Arguments
    ///
    /// * `content` - Configuration content as a string
    /// * `format` - File format ("toml" or "json")
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use portcullis_config::ConfigLoader;
    /// use portcullis_core::ConfigProvider;
    ///
    /// let toml = r#"
    ///     [app.maintenanceMode]
    ///     enabled = true
    ///     except = ["/health"]
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// let config: &dyn ConfigProvider = &config;
    ///
    /// assert!(config.get_or("app.maintenanceMode.enabled", false));
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => return Err(ConfigError::unsupported_format(format)),
        };

        merge_values(&mut self.root, layer);
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`. Segments
    /// match existing keys ignoring case and underscores, so with prefix
    /// `PORTCULLIS`:
    /// - `PORTCULLIS__APP__MAINTENANCE_MODE__ENABLED=true`
    /// - `PORTCULLIS__KERNEL__TERMINATION=exit_process`
    /// - `PORTCULLIS__LOGGING__LEVEL=debug`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file from the current directory or its parents.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Ok(self)
    }

    /// Load a specific `.env` file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Ok(self)
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment variable overrides (if a prefix was set) and
    /// validates the typed sections.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Environment variable application fails
    /// - The `kernel` or `logging` section is malformed
    pub fn load(mut self) -> Result<ConfigRepository, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix, env::vars())?;
        }

        let repository = ConfigRepository::from_value(self.root);
        repository.kernel_settings()?;
        repository.logging_settings()?;

        Ok(repository)
    }

    /// Finalize without applying environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> ConfigRepository {
        ConfigRepository::from_value(self.root)
    }

    // Apply every variable carrying the prefix
    fn apply_env_overrides<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}__");
        let mut matching: Vec<(String, String)> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with(&marker))
            .collect();
        // deterministic order when two variables address the same key
        matching.sort();

        for (key, value) in matching {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    // Apply a single environment variable
    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let segments: Vec<&str> = key_without_prefix.split("__").collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::env_parse_error(key, "empty key segment"));
        }

        let mut node = &mut self.root;
        for (index, segment) in segments.iter().enumerate() {
            let Value::Object(map) = node else {
                return Err(ConfigError::env_parse_error(
                    key,
                    format!("cannot override below non-object at segment {index}"),
                ));
            };
            let name = resolve_segment(map, segment);
            if index + 1 == segments.len() {
                debug!(var = key, key = %name, "applying environment override");
                // An existing string stays a string, whatever the value looks like.
                let parsed = match map.get(&name) {
                    Some(Value::String(_)) => Value::String(value.to_string()),
                    _ => parse_env_value(value),
                };
                map.insert(name, parsed);
                return Ok(());
            }
            node = map
                .entry(name)
                .or_insert_with(|| Value::Object(Map::new()));
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
        }

        Ok(())
    }
}

/// Built-in defaults for every recognized key.
fn defaults() -> Value {
    json!({
        "app": {
            "maintenanceMode": { "enabled": false }
        },
        "kernel": { "termination": "end_request" },
        "logging": { "enabled": true, "level": "info", "format": "json" }
    })
}

/// Finds the existing key `segment` refers to, or derives a new one.
///
/// `MAINTENANCE_MODE` matches `maintenanceMode`, `maintenance_mode` and
/// `MaintenanceMode`.
fn resolve_segment(map: &Map<String, Value>, segment: &str) -> String {
    let wanted = normalize(segment);
    map.keys()
        .find(|existing| normalize(existing) == wanted)
        .cloned()
        .unwrap_or_else(|| segment.to_lowercase())
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Interprets an environment value.
///
/// Booleans accept `true/false/yes/no/on/off`; numbers, `null`, arrays and
/// objects are read as JSON; anything else stays a string.
fn parse_env_value(raw: &str) -> Value {
    if let Some(b) = parse_bool(raw) {
        return Value::Bool(b);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Null | Value::Array(_) | Value::Object(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{LogFormat, TerminationPolicy};
    use portcullis_core::ConfigProvider;
    use std::io::Write;

    #[test]
    fn test_loader_new_has_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.get("app.maintenanceMode.enabled"), Some(json!(false)));
        assert_eq!(config.kernel_settings().unwrap().termination, TerminationPolicy::EndRequest);
        assert_eq!(config.logging_settings().unwrap().format, LogFormat::Json);
    }

    #[test]
    fn test_loader_with_string_toml_merges_deeply() {
        let toml = r#"
            [app.maintenanceMode]
            enabled = true
            status = 500
            except = ["/health", "/ready"]

            [logging]
            format = "pretty"
        "#;

        let config = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.get("app.maintenanceMode.status"), Some(json!(500)));
        assert_eq!(config.get("app.maintenanceMode.except"), Some(json!(["/health", "/ready"])));
        let logging = config.logging_settings().unwrap();
        assert_eq!(logging.format, LogFormat::Pretty);
        assert_eq!(logging.level, "info");
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"kernel": {"termination": "exit_process"}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.kernel_settings().unwrap().termination, TerminationPolicy::ExitProcess);
    }

    #[test]
    fn test_loader_rejects_unknown_format() {
        let err = ConfigLoader::new().with_string("a: 1", "yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[app]\nname = \"shop\"").unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.get("app.name"), Some(json!("shop")));
        assert_eq!(config.get("app.maintenanceMode.enabled"), Some(json!(false)));
    }

    #[test]
    fn test_loader_later_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.json");
        let local = dir.path().join("local.toml");
        fs::write(&base, r#"{"logging": {"level": "warn", "format": "pretty"}}"#).unwrap();
        fs::write(&local, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = ConfigLoader::new()
            .with_file(&base)
            .unwrap()
            .with_file(&local)
            .unwrap()
            .load()
            .unwrap();

        let logging = config.logging_settings().unwrap();
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/portcullis.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/portcullis.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.get("kernel.termination"), Some(json!("end_request")));
    }

    #[test]
    fn test_loader_invalid_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[app\nname = ").unwrap();
        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_load_validates_sections() {
        let err = ConfigLoader::new()
            .with_value(json!({ "kernel": { "termination": "sometimes" } }))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_unvalidated_skips_validation() {
        let config = ConfigLoader::new()
            .with_value(json!({ "kernel": { "termination": "sometimes" } }))
            .load_unvalidated();
        assert_eq!(config.get("kernel.termination"), Some(json!("sometimes")));
    }

    #[test]
    fn test_loader_with_dotenv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "PORTCULLIS_TEST_DOTENV_MARKER=loaded").unwrap();

        ConfigLoader::new().with_dotenv_file(file.path()).unwrap();
        assert_eq!(env::var("PORTCULLIS_TEST_DOTENV_MARKER").as_deref(), Ok("loaded"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));

        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));

        assert_eq!(parse_bool("1"), None);
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_parse_env_value() {
        assert_eq!(parse_env_value("on"), json!(true));
        assert_eq!(parse_env_value("503"), json!(503));
        assert_eq!(parse_env_value(r#"["/health"]"#), json!(["/health"]));
        assert_eq!(parse_env_value("/maintenance.html"), json!("/maintenance.html"));
        assert_eq!(parse_env_value(r#""quoted""#), json!(r#""quoted""#));
    }

    // Environment variable tests go through apply_env_overrides with an
    // explicit iterator: set_var requires unsafe in Rust 2024, and this
    // workspace forbids unsafe code.

    #[test]
    fn test_env_override_matches_camel_case_key() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__APP__MAINTENANCE_MODE__ENABLED", "true", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__APP__MAINTENANCE_MODE__REDIRECT", "/maintenance.html", "TEST")
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.get("app.maintenanceMode.enabled"), Some(json!(true)));
        assert_eq!(
            config.get("app.maintenanceMode.redirect"),
            Some(json!("/maintenance.html"))
        );
    }

    #[test]
    fn test_env_override_creates_missing_keys() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__APP__MAINTENANCE_MODE__RETRY", "120", "TEST")
            .unwrap();
        loader.apply_env_var("TEST__FEATURES__BETA", "on", "TEST").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.get("app.maintenanceMode.retry"), Some(json!(120)));
        assert_eq!(config.get("features.beta"), Some(json!(true)));
    }

    #[test]
    fn test_env_override_keeps_string_type() {
        let mut loader = ConfigLoader::new().with_value(json!({
            "app": {
                "maintenanceMode": {
                    "enabled": true,
                    "except": ["/health"],
                    "template": "down",
                    "status": 500
                }
            }
        }));
        loader
            .apply_env_var("P__APP__MAINTENANCE_MODE__TEMPLATE", "503", "P")
            .unwrap();
        loader
            .apply_env_var("P__APP__MAINTENANCE_MODE__STATUS", "503", "P")
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.get("app.maintenanceMode.template"), Some(json!("503")));
        assert_eq!(config.get("app.maintenanceMode.status"), Some(json!(503)));
        assert_eq!(config.get("app.maintenanceMode.except"), Some(json!(["/health"])));
    }

    #[test]
    fn test_env_override_below_scalar_fails() {
        let mut loader = ConfigLoader::new();
        let err = loader
            .apply_env_var("TEST__KERNEL__TERMINATION__MODE", "x", "TEST")
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));
    }

    #[test]
    fn test_env_override_rejects_bad_keys() {
        let mut loader = ConfigLoader::new();
        assert!(loader.apply_env_var("TEST__", "x", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__APP____NAME", "x", "TEST").is_err());
    }

    #[test]
    fn test_apply_env_overrides_filters_prefix() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_overrides(
                "TEST",
                vec![
                    ("TEST__LOGGING__LEVEL".to_string(), "debug".to_string()),
                    ("OTHER__LOGGING__LEVEL".to_string(), "trace".to_string()),
                    ("TESTING__LOGGING__LEVEL".to_string(), "error".to_string()),
                ],
            )
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.logging_settings().unwrap().level, "debug");
    }
}
