//! File-based config discovery.
//!
//! Finds the armonia configuration in a project root and layers it with
//! figment: serialized defaults, then the discovered file. `ARMONIA_TARGET`
//! fills in the target only when neither of those sets one.

use std::fs;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format as _, Serialized, Toml};
use serde_json::Value;

use crate::error::{ConfigError, Result};
use crate::settings::ArmoniaConfig;

/// Environment variable consulted when no target is configured.
pub const TARGET_ENV: &str = "ARMONIA_TARGET";
const ENV_PREFIX: &str = "ARMONIA_";

const TOML_FILE: &str = "armonia.toml";
const PACKAGE_JSON: &str = "package.json";
const PACKAGE_FIELD: &str = "armonia";

/// File-based configuration discovery
///
/// # Example
///
/// ```no_run
/// use armonia_config::ConfigDiscovery;
///
/// let config = ConfigDiscovery::new(".").load_or_default().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find a config file in the root directory
    ///
    /// Searches in this order:
    /// 1. `armonia.toml`
    /// 2. `package.json` with an `armonia` field
    pub fn find(&self) -> Option<PathBuf> {
        let toml_path = self.root.join(TOML_FILE);
        if toml_path.exists() {
            return Some(toml_path);
        }

        let pkg_path = self.root.join(PACKAGE_JSON);
        let content = fs::read_to_string(&pkg_path).ok()?;
        let parsed: Value = serde_json::from_str(&content).ok()?;
        match parsed.get(PACKAGE_FIELD) {
            Some(field) if !field.is_null() => Some(pkg_path),
            _ => None,
        }
    }

    /// Load config from the discovered file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no config file is found.
    pub fn load(&self) -> Result<ArmoniaConfig> {
        let path = self.find().ok_or(ConfigError::NotFound)?;
        self.load_from(&path)
    }

    /// Load config, falling back to defaults (plus environment) when no file
    /// exists.
    pub fn load_or_default(&self) -> Result<ArmoniaConfig> {
        match self.find() {
            Some(path) => self.load_from(&path),
            None => extract(base_figment()),
        }
    }

    /// Load config from a specific file path.
    pub fn load_from(&self, path: &Path) -> Result<ArmoniaConfig> {
        tracing::debug!(path = %path.display(), "loading armonia config");

        let figment = match path.file_name().and_then(|name| name.to_str()) {
            Some(PACKAGE_JSON) => {
                let field = read_package_field(path)?;
                base_figment().merge(Serialized::defaults(field))
            }
            Some(name) if name.ends_with(".toml") => base_figment().merge(Toml::file(path)),
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        extract(figment)
    }
}

/// Discover and load config from the current directory.
pub fn discover() -> Result<ArmoniaConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load_or_default()
}

fn base_figment() -> Figment {
    Figment::new().merge(Serialized::defaults(ArmoniaConfig::default()))
}

fn extract(figment: Figment) -> Result<ArmoniaConfig> {
    let figment = if figment.find_value("target").is_ok() {
        figment
    } else {
        figment.merge(Env::prefixed(ENV_PREFIX).only(&["target"]))
    };

    figment.extract().map_err(|e| ConfigError::InvalidValue {
        field: "configuration".to_string(),
        hint: Some(e.to_string()),
    })
}

fn read_package_field(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;

    let parsed: Value = serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
        field: PACKAGE_JSON.to_string(),
        hint: Some(format!("Invalid JSON: {e}")),
    })?;

    match parsed.get(PACKAGE_FIELD) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Err(ConfigError::InvalidValue {
            field: PACKAGE_FIELD.to_string(),
            hint: Some("Add an 'armonia' field to your package.json".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn find_returns_none_when_no_config() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    fn package_json_without_field_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{ "name": "app" }"#).unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    fn load_returns_not_found_when_no_config() {
        let dir = TempDir::new().unwrap();
        let err = ConfigDiscovery::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::NotFound));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("armonia.yaml");
        fs::write(&path, "target: ssr").unwrap();
        let err = ConfigDiscovery::new(dir.path()).load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }
}
