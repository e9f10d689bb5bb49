//! Authentication server: magic-link login, email verification and
//! password reset over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use passgate::{
    AuthManager, SystemClock,
    auth::{AuthBackends, AuthSettings, PasswordHasher},
    credentials::{CredentialConfig, CredentialIssuer},
    db::Database,
    mail::{LogMailer, Mailer},
    store::{InMemoryTokenStore, PgTokenStore, TokenStore},
    users::{InMemoryUserStore, PgUserStore, UserStore},
};
use passgate_server::{
    api::{self, context::TrustedProxies, rate_limiter::KeyedRateLimiter},
    config::{CliOverrides, MailTransportConfig, ServerConfig, StorageConfig},
    logging,
    mailer::SmtpMailer,
    metrics,
};
use pico_args::Arguments;
use tracing::info;

const HELP: &str = "\
Run the passgate authentication server

USAGE:
  passgate_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --memory                 Keep users and tokens in process memory (development only)
  --init-schema            Apply the bundled database migrations before serving
  --purge-expired          Delete expired tokens (used ones after 30 days) and exit
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  ACCESS_TOKEN_SECRET      Access credential signing secret (>= 32 chars)
  REFRESH_TOKEN_SECRET     Refresh credential signing secret (>= 32 chars, distinct)
  PASSWORD_PEPPER          Password hashing pepper (>= 16 chars)
  REFRESH_TOKEN_TTL_DAYS   Refresh credential lifetime, 5-7 days [default: 7]
  PUBLIC_BASE_URL          Prefix for links in outgoing mail
  MAIL_TIMEOUT_SECS        Bound on one mail dispatch [default: 10]
  COOKIE_SECURE            Mark the refresh cookie Secure [default: true]
  RATE_LIMIT_PER_MINUTE    Per-client budget on guarded endpoints [default: 10]
  TRUSTED_PROXIES          Comma-separated proxy IPs whose X-Forwarded-For is believed
  SMTP_HOST                SMTP relay; mail is only logged when unset
  SMTP_PORT                SMTP port [default: 587]
  SMTP_TLS                 starttls, tls or none [default: starttls]
  SMTP_USERNAME            SMTP login (set together with SMTP_PASSWORD)
  SMTP_PASSWORD            SMTP password
  SMTP_FROM                Sender mailbox (required with SMTP_HOST)
  METRICS_BIND             Prometheus exporter address (disabled when unset)
  (See .env file for all configuration options)
";

struct Args {
    overrides: CliOverrides,
    init_schema: bool,
    purge_expired: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        overrides: CliOverrides {
            bind: pargs.opt_value_from_str::<_, SocketAddr>("--bind")?,
            database_url: pargs.opt_value_from_str("--db-url")?,
            memory: pargs.contains("--memory"),
        },
        init_schema: pargs.contains("--init-schema"),
        purge_expired: pargs.contains("--purge-expired"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.overrides)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus exporter listening on {}", addr);
    }

    let (tokens, users, database): (Arc<dyn TokenStore>, Arc<dyn UserStore>, Option<Database>) =
        match &config.storage {
            StorageConfig::Postgres(db_config) => {
                let db = Database::new(db_config)
                    .await
                    .context("Failed to connect to database")?;
                db.health_check()
                    .await
                    .context("Database did not answer a health check")?;
                info!("Database connected successfully");

                if args.init_schema {
                    db.migrate().await.context("Failed to apply migrations")?;
                    info!("Database schema is up to date");
                }

                let tokens: Arc<dyn TokenStore> = Arc::new(PgTokenStore::new(db.pool().clone()));
                let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(db.pool().clone()));
                (tokens, users, Some(db))
            }
            StorageConfig::Memory => {
                tracing::warn!("Using in-memory storage; all accounts vanish on restart");
                let tokens: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
                let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
                (tokens, users, None)
            }
        };

    let clock = Arc::new(SystemClock);
    let security = &config.security;
    let issuer = CredentialIssuer::new(
        CredentialConfig::new(
            security.access_token_secret.clone(),
            security.refresh_token_secret.clone(),
        )
        .with_refresh_ttl(chrono::Duration::days(security.refresh_token_ttl_days)),
        clock.clone(),
    );
    let hasher = PasswordHasher::new(security.password_pepper.clone())?;
    let mail_timeout = Duration::from_secs(config.mail_timeout_secs);

    let mailer: Arc<dyn Mailer> = match &config.mail {
        MailTransportConfig::Smtp(smtp) => {
            info!("Delivering mail through {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpMailer::new(smtp, mail_timeout).context("Invalid SMTP configuration")?)
        }
        MailTransportConfig::Log => {
            tracing::warn!("SMTP_HOST is not set; mail is logged, not delivered");
            Arc::new(LogMailer)
        }
    };

    let auth = AuthManager::new(
        AuthBackends {
            tokens,
            users,
            mailer,
            clock,
        },
        issuer,
        hasher,
        AuthSettings {
            public_base_url: config.public_base_url.clone(),
            mail_timeout,
        },
    );

    if args.purge_expired {
        let purged = auth.purge_expired().await?;
        info!("Purged {} expired token(s)", purged);
        if let Some(db) = database {
            db.close().await;
        }
        return Ok(());
    }

    let state = api::AppState {
        auth: Arc::new(auth),
        limiter: Arc::new(KeyedRateLimiter::per_minute(config.rate_limit_per_minute)),
        trusted_proxies: TrustedProxies::new(config.trusted_proxies.iter().copied()),
        cookie_secure: config.cookie_secure,
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shutting down server...");
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
}
