//! Configuration for `bondflow serve` and the store-backed commands.
//!
//! Sources, lowest precedence first: an optional TOML file, `BONDFLOW_*`
//! environment variables, then explicit command-line flags.

use std::path::{Path, PathBuf};

use bondflow_workflow::EngineConfig;
use serde::Deserialize;

pub(crate) const DEFAULT_PORT: u16 = 8080;

/// Default rate limit: 60 requests per minute per IP.
pub(crate) const DEFAULT_RATE_LIMIT: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("error reading config '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("error parsing config '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct ServeConfig {
    pub(crate) port: u16,
    /// JSON snapshot the in-memory store is loaded from and saved to.
    pub(crate) store_path: Option<PathBuf>,
    /// Empty means no authentication.
    pub(crate) api_key: Option<String>,
    pub(crate) rate_limit_per_minute: u64,
    pub(crate) engine: EngineConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            store_path: None,
            api_key: None,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT,
            engine: EngineConfig::default(),
        }
    }
}

impl ServeConfig {
    /// Load from `path` (if given) and then apply the process environment.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub(crate) fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `BONDFLOW_*` variables resolved through `lookup`.
    pub(crate) fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BONDFLOW_PORT") {
            self.port = value.trim().parse().map_err(|_| ConfigError::Env {
                var: "BONDFLOW_PORT",
                value,
            })?;
        }
        if let Some(value) = lookup("BONDFLOW_RATE_LIMIT") {
            self.rate_limit_per_minute = value.trim().parse().map_err(|_| ConfigError::Env {
                var: "BONDFLOW_RATE_LIMIT",
                value,
            })?;
        }
        if let Some(value) = lookup("BONDFLOW_API_KEY") {
            self.api_key = Some(value);
        }
        if let Some(value) = lookup("BONDFLOW_STORE") {
            if !value.trim().is_empty() {
                self.store_path = Some(PathBuf::from(value));
            }
        }
        Ok(())
    }

    /// The API key, if one is actually configured.
    pub(crate) fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ServeConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit_per_minute, 60);
        assert_eq!(config.engine.dedup_window_ms, 5_000);
        assert!(config.effective_api_key().is_none());
    }

    #[test]
    fn toml_file_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bondflow.toml");
        std::fs::write(
            &path,
            "port = 9090\napi_key = \"s3cret\"\n\n[engine]\ndedup_window_ms = 2000\n",
        )
        .unwrap();

        let config = ServeConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.effective_api_key(), Some("s3cret"));
        assert_eq!(config.rate_limit_per_minute, 60);
        assert_eq!(config.engine.dedup_window_ms, 2_000);
        assert_eq!(config.engine.feed_limit, 200);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = ServeConfig {
            port: 9090,
            ..Default::default()
        };
        config
            .apply_env(env(&[
                ("BONDFLOW_PORT", "7000"),
                ("BONDFLOW_RATE_LIMIT", "5"),
                ("BONDFLOW_STORE", "/tmp/deals.json"),
            ]))
            .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.rate_limit_per_minute, 5);
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/deals.json")));
    }

    #[test]
    fn empty_api_key_disables_auth() {
        let mut config = ServeConfig::default();
        config.apply_env(env(&[("BONDFLOW_API_KEY", "  ")])).unwrap();
        assert!(config.effective_api_key().is_none());
    }

    #[test]
    fn bad_env_value_is_an_error() {
        let mut config = ServeConfig::default();
        let err = config
            .apply_env(env(&[("BONDFLOW_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("BONDFLOW_PORT"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            ServeConfig::from_file(Path::new("/nonexistent/bondflow.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
