//! Service configuration.
//!
//! Values come from defaults, then environment variables, then CLI flags
//! applied through the `with_*` builders.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur while building the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// SQLite connection URL.
    pub database_url: String,
    pub db_max_connections: u32,
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Base URL certificate links are issued under.
    pub certificate_base_url: String,
    /// The group every user implicitly belongs to, created by bootstrap.
    pub public_group_id: String,
    pub public_group_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://lms_progress.db".to_string(),
            db_max_connections: 8,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            certificate_base_url: "http://localhost:8080".to_string(),
            public_group_id: "public".to_string(),
            public_group_name: "Public".to_string(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: SQLite URL (default: sqlite://lms_progress.db)
    /// - `LMS_DB_MAX_CONNECTIONS`: pool size (default: 8)
    /// - `LMS_BIND_ADDR`: listen address (default: 127.0.0.1:8080)
    /// - `LMS_CERTIFICATE_BASE_URL`: certificate link base (default: http://localhost:8080)
    /// - `LMS_PUBLIC_GROUP_ID`: public group ID (default: public)
    /// - `LMS_PUBLIC_GROUP_NAME`: public group display name (default: Public)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DATABASE_URL") {
            config.database_url = val;
        }

        if let Ok(val) = std::env::var("LMS_DB_MAX_CONNECTIONS") {
            config.db_max_connections = parse_env_value(&val, "LMS_DB_MAX_CONNECTIONS")?;
        }

        if let Ok(val) = std::env::var("LMS_BIND_ADDR") {
            config.bind_addr = parse_env_value(&val, "LMS_BIND_ADDR")?;
        }

        if let Ok(val) = std::env::var("LMS_CERTIFICATE_BASE_URL") {
            config.certificate_base_url = val;
        }

        if let Ok(val) = std::env::var("LMS_PUBLIC_GROUP_ID") {
            config.public_group_id = val;
        }

        if let Ok(val) = std::env::var("LMS_PUBLIC_GROUP_NAME") {
            config.public_group_name = val;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.database_url.starts_with("sqlite:") {
            return Err(ConfigError::ValidationFailed(format!(
                "database_url must be a sqlite: URL, got '{}'",
                self.database_url
            )));
        }

        if self.db_max_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "db_max_connections must be greater than 0".to_string(),
            ));
        }

        if !(self.certificate_base_url.starts_with("http://")
            || self.certificate_base_url.starts_with("https://"))
        {
            return Err(ConfigError::ValidationFailed(
                "certificate_base_url must be an http(s) URL".to_string(),
            ));
        }

        if self.public_group_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "public_group_id cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_db_max_connections(mut self, max: u32) -> Self {
        self.db_max_connections = max;
        self
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_certificate_base_url(mut self, url: impl Into<String>) -> Self {
        self.certificate_base_url = url.into();
        self
    }

    pub fn with_public_group(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.public_group_id = id.into();
        self.public_group_name = name.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.db_max_connections, 8);
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = AppConfig::new()
            .with_database_url("sqlite::memory:")
            .with_db_max_connections(2)
            .with_bind_addr("0.0.0.0:9000".parse().unwrap())
            .with_certificate_base_url("https://certs.example.org")
            .with_public_group("everyone", "Everyone");

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.db_max_connections, 2);
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.public_group_id, "everyone");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let err = AppConfig::default().with_db_max_connections(0).validate().unwrap_err();
        assert!(err.to_string().contains("db_max_connections"));

        let err = AppConfig::default()
            .with_database_url("postgres://localhost/lms")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("database_url"));

        let err = AppConfig::default()
            .with_certificate_base_url("ftp://x")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("certificate_base_url"));

        let err = AppConfig::default().with_public_group(" ", "x").validate().unwrap_err();
        assert!(err.to_string().contains("public_group_id"));
    }

    #[test]
    fn test_parse_env_value() {
        let port: u32 = parse_env_value(" 12 ", "X").unwrap();
        assert_eq!(port, 12);
        assert!(parse_env_value::<u32>("twelve", "X").is_err());
    }
}
