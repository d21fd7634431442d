use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    #[default]
    Development,
    Production,
    Test,
}

impl AppEnv {
    pub fn is_production(self) -> bool {
        self == AppEnv::Production
    }
}

impl FromStr for AppEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(AppEnv::Development),
            "production" => Ok(AppEnv::Production),
            "test" => Ok(AppEnv::Test),
            other => anyhow::bail!("unknown APP_ENV: {other}"),
        }
    }
}

/// Where user records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("unknown APP_STORAGE: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_env: AppEnv,
    pub host: String,
    pub port: u16,
    pub log_debug: bool,
    pub storage: StorageBackend,
    pub database: Option<DatabaseConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let app_env: AppEnv = var("APP_ENV")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();
        let storage: StorageBackend = var("APP_STORAGE")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();
        let port = var("APP_PORT")
            .map(|v| v.parse::<u16>().context("parse APP_PORT"))
            .transpose()?
            .unwrap_or(8080);
        let log_debug = var("APP_LOG_DEBUG")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(false);

        let database = match storage {
            StorageBackend::Postgres => Some(DatabaseConfig {
                url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: var("DATABASE_MAX_CONNECTIONS")
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(10),
            }),
            StorageBackend::Memory => None,
        };

        Ok(Self {
            app_env,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            log_debug,
            storage,
            database,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("parse listen address")
    }
}
