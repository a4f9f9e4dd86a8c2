//! Configuration loading and persistence.

use super::{Config, LogLevel};
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Resolve the effective configuration for a run.
    ///
    /// Order: defaults, then the config file, then `STRONGBOX_*` variables.
    /// An explicitly named file must exist. The default file is optional.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match env::get_var(env::vars::STRONGBOX_CONFIG) {
                Some(path) => (paths::expand_tilde(&path), true),
                None => (paths::config_file()?, false),
            },
        };

        let mut config = match Self::load(&path) {
            Ok(config) => {
                debug!(path = %path.display(), "Loaded config file");
                config
            }
            Err(ConfigError::NotFound(_)) if !required => Self::default(),
            Err(e) => return Err(e),
        };

        config.apply_overrides(env::get_var)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup, normally the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(env::vars::STRONGBOX_SERVER_URL) {
            self.server_url = url;
        }
        if let Some(level) = lookup(env::vars::STRONGBOX_LOG) {
            self.log_level = level
                .parse::<LogLevel>()
                .map_err(ConfigError::Validation)?;
        }
        if let Some(timeout) = lookup(env::vars::STRONGBOX_CALL_TIMEOUT) {
            self.call_timeout_secs = timeout.trim().parse().map_err(|_| {
                ConfigError::Validation(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    env::vars::STRONGBOX_CALL_TIMEOUT,
                    timeout
                ))
            })?;
        }
        if let Some(cert) = lookup(env::vars::STRONGBOX_TLS_CERT_PATH) {
            self.tls_cert_path = Some(paths::expand_tilde(&cert));
        }
        Ok(())
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to a JSON5-compatible string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        match Url::parse(&self.server_url) {
            Ok(url) => {
                if url.scheme() != "ws" && url.scheme() != "wss" {
                    errors.push(format!(
                        "server_url must use ws:// or wss://, got '{}'",
                        url.scheme()
                    ));
                }
                if url.host_str().is_none() {
                    errors.push("server_url has no host".to_string());
                }
                if self.tls_cert_path.is_some() && url.scheme() != "wss" {
                    errors.push("tls_cert_path is set but server_url is not wss://".to_string());
                }
            }
            Err(e) => errors.push(format!("Invalid server_url '{}': {}", self.server_url, e)),
        }

        if self.call_timeout_secs == 0 {
            errors.push("call_timeout_secs must be greater than 0".to_string());
        }

        if let Some(cert) = &self.tls_cert_path {
            if cert.as_os_str().is_empty() {
                errors.push("tls_cert_path must not be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// The certificate path, if TLS with a custom root is configured.
    pub fn tls_cert(&self) -> Option<&PathBuf> {
        self.tls_cert_path.as_ref()
    }
}
