//! Database configuration module.

use std::env;
use thiserror::Error;

/// An environment variable held a value that does not parse
#[derive(Debug, Error)]
#[error("{name} must be a valid number, got '{value}'")]
pub struct InvalidPoolSetting {
    pub name: &'static str,
    pub value: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    /// Pool defaults for `database_url`
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 20,
            min_connections: 5,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }

    /// Apply pool settings from the environment on top of the defaults
    ///
    /// Recognized variables:
    /// - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 20)
    /// - `DB_MIN_CONNECTIONS`: Minimum pool size (default: 5)
    /// - `DB_CONNECTION_TIMEOUT`: Connection timeout in seconds (default: 10)
    /// - `DB_IDLE_TIMEOUT`: Idle timeout in seconds (default: 600)
    /// - `DB_MAX_LIFETIME`: Max lifetime in seconds (default: 1800)
    pub fn with_env_overrides(mut self) -> Result<Self, InvalidPoolSetting> {
        override_from_env("DB_MAX_CONNECTIONS", &mut self.max_connections)?;
        override_from_env("DB_MIN_CONNECTIONS", &mut self.min_connections)?;
        override_from_env("DB_CONNECTION_TIMEOUT", &mut self.connection_timeout_secs)?;
        override_from_env("DB_IDLE_TIMEOUT", &mut self.idle_timeout_secs)?;
        override_from_env("DB_MAX_LIFETIME", &mut self.max_lifetime_secs)?;
        Ok(self)
    }

    /// Create a default configuration for development
    ///
    /// Uses `postgres://postgres@localhost/passgate` as the database URL
    pub fn development() -> Self {
        Self::new("postgres://postgres@localhost/passgate")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

fn override_from_env<T: std::str::FromStr>(
    name: &'static str,
    target: &mut T,
) -> Result<(), InvalidPoolSetting> {
    if let Ok(value) = env::var(name) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| InvalidPoolSetting { name, value })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_pool_defaults() {
        let config = DatabaseConfig::new("postgres://localhost/x");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.database_url, "postgres://localhost/x");
    }
}
