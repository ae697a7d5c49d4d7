use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Entitlement engine configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "entitlr")]
#[command(about = "Tenant entitlement and business-rule resolution engine")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "ENTITLR_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Postgres connection URL (in-memory storage if not set)
    #[arg(long, env = "ENTITLR_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Minimum pooled database connections
    #[arg(long, default_value = "1", env = "ENTITLR_DB_MIN_CONNECTIONS")]
    pub db_min_connections: u32,

    /// Maximum pooled database connections
    #[arg(long, default_value = "10", env = "ENTITLR_DB_MAX_CONNECTIONS")]
    pub db_max_connections: u32,

    /// Run embedded migrations on startup
    #[arg(long, default_value = "true", env = "ENTITLR_RUN_MIGRATIONS")]
    pub run_migrations: bool,

    /// Catalog seed YAML applied on startup (optional)
    #[arg(long, env = "ENTITLR_SEED_PATH")]
    pub seed_path: Option<PathBuf>,

    /// Reject assignment of an already-assigned rule instead of ignoring it
    #[arg(long, default_value = "false", env = "ENTITLR_STRICT_ASSIGN")]
    pub strict_assign: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "ENTITLR_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "ENTITLR_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value = "30", env = "ENTITLR_SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Get shutdown timeout as Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn uses_database(&self) -> bool {
        self.database_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            db_min_connections: 1,
            db_max_connections: 10,
            run_migrations: true,
            seed_path: None,
            strict_assign: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            graceful_shutdown: true,
            shutdown_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert!(!config.uses_database());
        assert!(!config.strict_assign);
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config {
            shutdown_timeout_secs: 15,
            ..Default::default()
        };

        assert_eq!(config.shutdown_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_parse_args() {
        let config = Config::try_parse_from([
            "entitlr",
            "--database-url",
            "postgres://localhost/entitlr",
            "--seed-path",
            "seed/catalog.yaml",
            "--db-max-connections",
            "4",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert!(config.uses_database());
        assert_eq!(config.db_max_connections, 4);
        assert_eq!(config.seed_path, Some(PathBuf::from("seed/catalog.yaml")));
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
