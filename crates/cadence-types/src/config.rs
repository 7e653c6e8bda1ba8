//! Server configuration types for Cadence.
//!
//! `ServerConfig` represents the optional `cadence.toml` that controls the
//! listen port and the connect grace period. All fields have defaults, so an
//! absent or empty file is valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Cadence server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port the listener binds on 0.0.0.0.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long to wait for endpoints to connect before campaign chains are
    /// built and started, in seconds.
    #[serde(default = "default_connect_grace_secs")]
    pub connect_grace_secs: u64,
}

fn default_port() -> u16 {
    1212
}

fn default_connect_grace_secs() -> u64 {
    20
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            connect_grace_secs: default_connect_grace_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default_values() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 1212);
        assert_eq!(config.connect_grace_secs, 20);
    }

    #[test]
    fn test_server_config_deserialize_with_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.port, 1212);
        assert_eq!(config.connect_grace_secs, 20);
    }

    #[test]
    fn test_server_config_deserialize_with_values() {
        let toml_str = r#"
port = 9099
connect_grace_secs = 5
"#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port, 9099);
        assert_eq!(config.connect_grace_secs, 5);
    }
}
