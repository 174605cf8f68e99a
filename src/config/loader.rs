//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::WebSocketConfig;
use std::path::Path;

/// Loads and validates [`WebSocketConfig`] from TOML.
#[derive(Debug, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<WebSocketConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.load_str(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn load_str(&self, content: &str) -> ConfigResult<WebSocketConfig> {
        let config: WebSocketConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Load configuration or return default if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<WebSocketConfig> {
        let path = path.as_ref();
        if path.exists() {
            self.load(path)
        } else {
            Ok(WebSocketConfig::default())
        }
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] listing every problem found.
    pub fn validate(&self, config: &WebSocketConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if config.server.socket_addr().is_none() {
            errors.push(format!(
                "server: '{}:{}' is not a valid listen address",
                config.server.address, config.server.port
            ));
        }
        if config.server.max_connections == 0 {
            errors.push("server.max_connections must be greater than 0".to_string());
        }
        if let Some(prefix) = &config.server.path_prefix {
            if !prefix.starts_with('/') {
                errors.push("server.path_prefix must start with '/'".to_string());
            }
        }
        if !config.client.path.starts_with('/') {
            errors.push("client.path must start with '/'".to_string());
        }
        if config.handshake.guid.trim().is_empty() {
            errors.push("handshake.guid must not be empty".to_string());
        }
        if config.handshake.max_handshake_size == 0 {
            errors.push("handshake.max_handshake_size must be greater than 0".to_string());
        }
        if config.limits.max_frame_size == 0 || config.limits.max_message_size == 0 {
            errors.push("limits: frame and message sizes must be greater than 0".to_string());
        }
        if config.limits.max_frame_size > config.limits.max_message_size {
            errors.push("limits.max_frame_size exceeds limits.max_message_size".to_string());
        }
        if config.limits.read_buffer_size == 0 || config.limits.event_buffer == 0 {
            errors.push("limits: buffer sizes must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(errors.join("; ")))
        }
    }
}
