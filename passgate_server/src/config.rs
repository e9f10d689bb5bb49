//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use passgate::credentials::DEFAULT_REFRESH_TOKEN_TTL_DAYS;
use passgate::db::DatabaseConfig;
use std::net::{IpAddr, SocketAddr};

/// Accepted range for `REFRESH_TOKEN_TTL_DAYS`
const REFRESH_TTL_DAYS_RANGE: std::ops::RangeInclusive<i64> = 5..=7;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Where users and tokens live
    pub storage: StorageConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Prefix for links in outgoing mail
    pub public_base_url: String,
    /// Upper bound on one mail dispatch, in seconds
    pub mail_timeout_secs: u64,
    /// Mark the refresh cookie `Secure`
    pub cookie_secure: bool,
    /// Requests per client IP per minute on the guarded endpoints
    pub rate_limit_per_minute: usize,
    /// Reverse proxies whose `X-Forwarded-For` is believed
    pub trusted_proxies: Vec<IpAddr>,
    /// How outgoing mail leaves the process
    pub mail: MailTransportConfig,
    /// Prometheus exporter address; metrics are off when unset
    pub metrics_bind: Option<SocketAddr>,
}

/// Storage backend selection
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Postgres(DatabaseConfig),
    /// Process-local stores; everything is lost on restart
    Memory,
}

/// Mail transport selection
#[derive(Debug, Clone)]
pub enum MailTransportConfig {
    /// Log recipient and subject only; nothing is delivered
    Log,
    Smtp(SmtpConfig),
}

/// SMTP relay settings
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender mailbox, e.g. `Passgate <no-reply@example.com>`
    pub from: String,
    pub tls: SmtpTls,
}

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS (port 587)
    StartTls,
    /// TLS from the first byte (port 465)
    Implicit,
    /// No encryption; local relays only
    None,
}

impl std::str::FromStr for SmtpTls {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starttls" => Ok(SmtpTls::StartTls),
            "tls" | "implicit" => Ok(SmtpTls::Implicit),
            "none" | "plain" => Ok(SmtpTls::None),
            other => Err(format!("unknown SMTP TLS mode '{other}'")),
        }
    }
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Access credential signing secret (required)
    pub access_token_secret: String,
    /// Refresh credential signing secret (required)
    pub refresh_token_secret: String,
    /// Password hashing pepper (required)
    pub password_pepper: String,
    /// Refresh credential lifetime in days
    pub refresh_token_ttl_days: i64,
}

/// Values given on the command line, which win over the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<SocketAddr>,
    pub database_url: Option<String>,
    pub memory: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = Self::from_vars(|key| std::env::var(key).ok(), overrides)?;

        if let StorageConfig::Postgres(database) = config.storage {
            let database = database
                .with_env_overrides()
                .map_err(|err| ConfigError::Invalid {
                    var: err.name.to_string(),
                    reason: format!("'{}' is not a valid number", err.value),
                })?;
            config.storage = StorageConfig::Postgres(database);
        }

        Ok(config)
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Pool sizing variables are left to [`ServerConfig::from_env`].
    pub fn from_vars<F>(lookup: F, overrides: CliOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = match overrides.bind {
            Some(bind) => bind,
            None => parse_or(&lookup, "SERVER_BIND", SocketAddr::from(([127, 0, 0, 1], 8080)))?,
        };

        let storage = if overrides.memory {
            StorageConfig::Memory
        } else {
            let database_url = overrides
                .database_url
                .or_else(|| lookup("DATABASE_URL"))
                .ok_or_else(|| ConfigError::MissingRequired {
                    var: "DATABASE_URL".to_string(),
                    hint: "Pass --db-url, or --memory for a throwaway server".to_string(),
                })?;
            StorageConfig::Postgres(DatabaseConfig::new(database_url))
        };

        // Security configuration (REQUIRED)
        let security = SecurityConfig {
            access_token_secret: required(
                &lookup,
                "ACCESS_TOKEN_SECRET",
                "Generate with: openssl rand -hex 32",
            )?,
            refresh_token_secret: required(
                &lookup,
                "REFRESH_TOKEN_SECRET",
                "Generate with: openssl rand -hex 32",
            )?,
            password_pepper: required(
                &lookup,
                "PASSWORD_PEPPER",
                "Generate with: openssl rand -hex 16",
            )?,
            refresh_token_ttl_days: parse_or(
                &lookup,
                "REFRESH_TOKEN_TTL_DAYS",
                DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            )?,
        };

        let trusted_proxies = match lookup("TRUSTED_PROXIES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(|entry| {
                    entry.parse::<IpAddr>().map_err(|_| ConfigError::Invalid {
                        var: "TRUSTED_PROXIES".to_string(),
                        reason: format!("'{entry}' is not an IP address"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let mail = match lookup("SMTP_HOST") {
            Some(host) => MailTransportConfig::Smtp(SmtpConfig {
                host,
                port: parse_or(&lookup, "SMTP_PORT", 587)?,
                username: lookup("SMTP_USERNAME"),
                password: lookup("SMTP_PASSWORD"),
                from: required(
                    &lookup,
                    "SMTP_FROM",
                    "Sender address, e.g. no-reply@example.com",
                )?,
                tls: parse_or(&lookup, "SMTP_TLS", SmtpTls::StartTls)?,
            }),
            None => MailTransportConfig::Log,
        };

        let metrics_bind = match lookup("METRICS_BIND") {
            Some(value) => Some(value.parse().map_err(|_| ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("'{value}' is not a socket address"),
            })?),
            None => None,
        };

        Ok(ServerConfig {
            bind,
            storage,
            security,
            public_base_url: lookup("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://{bind}")),
            mail_timeout_secs: parse_or(&lookup, "MAIL_TIMEOUT_SECS", 10)?,
            cookie_secure: parse_or(&lookup, "COOKIE_SECURE", true)?,
            rate_limit_per_minute: parse_or(&lookup, "RATE_LIMIT_PER_MINUTE", 10)?,
            trusted_proxies,
            mail,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let security = &self.security;

        if security.access_token_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if security.refresh_token_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "REFRESH_TOKEN_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if security.access_token_secret == security.refresh_token_secret {
            return Err(ConfigError::Invalid {
                var: "REFRESH_TOKEN_SECRET".to_string(),
                reason: "Must differ from ACCESS_TOKEN_SECRET".to_string(),
            });
        }

        if security.password_pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        if !REFRESH_TTL_DAYS_RANGE.contains(&security.refresh_token_ttl_days) {
            return Err(ConfigError::Invalid {
                var: "REFRESH_TOKEN_TTL_DAYS".to_string(),
                reason: format!(
                    "Must be between {} and {} days",
                    REFRESH_TTL_DAYS_RANGE.start(),
                    REFRESH_TTL_DAYS_RANGE.end()
                ),
            });
        }

        if !(self.public_base_url.starts_with("http://")
            || self.public_base_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                var: "PUBLIC_BASE_URL".to_string(),
                reason: "Must be an http:// or https:// URL".to_string(),
            });
        }

        if self.mail_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "MAIL_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if let MailTransportConfig::Smtp(smtp) = &self.mail {
            if smtp.username.is_some() != smtp.password.is_some() {
                return Err(ConfigError::Invalid {
                    var: "SMTP_USERNAME".to_string(),
                    reason: "SMTP_USERNAME and SMTP_PASSWORD must be set together".to_string(),
                });
            }
        }

        if self.rate_limit_per_minute == 0 {
            return Err(ConfigError::Invalid {
                var: "RATE_LIMIT_PER_MINUTE".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn required<F>(lookup: &F, key: &str, hint: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| ConfigError::MissingRequired {
        var: key.to_string(),
        hint: hint.to_string(),
    })
}

/// Parse a variable, falling back to `default` when it is unset
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var: key.to_string(),
            reason: format!("'{value}' could not be parsed"),
        }),
        None => Ok(default),
    }
}
