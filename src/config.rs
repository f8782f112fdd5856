use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use crate::accounts::AdminCredentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Sqlite,
    Memory,
}

impl DatabaseBackend {
    fn from_env(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" | "file" => Ok(Self::Sqlite),
            "memory" | "inmemory" | "in-memory" => Ok(Self::Memory),
            _ => Err(anyhow::anyhow!(
                "DATABASE_BACKEND must be one of: sqlite, memory"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_backend: DatabaseBackend,
    pub database_path: PathBuf,
    pub db_max_connections: u32,
    /// Explicit `UPLOAD_PATH`, if any.
    pub upload_path: Option<PathBuf>,
    pub admin_email: String,
    pub admin_password: String,
    pub cron_secret: Option<String>,
    pub default_store_id: i64,
    pub session_ttl_secs: i64,
    pub upload_limit_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_backend: DatabaseBackend::Sqlite,
            database_path: PathBuf::from("dev.db"),
            db_max_connections: 5,
            upload_path: None,
            admin_email: "admin@esim.local".to_string(),
            admin_password: "admin123".to_string(),
            cron_secret: None,
            default_store_id: 1,
            session_ttl_secs: 7 * 24 * 60 * 60,
            upload_limit_bytes: 20 * 1024 * 1024,
        }
    }
}

fn parsed<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} has an invalid value '{raw}'")),
        _ => Ok(default),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// `DATABASE_URL` may carry a `file:` or `sqlite:` prefix; the path is what follows.
fn database_path_from(url: &str) -> PathBuf {
    let stripped = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .or_else(|| url.strip_prefix("file:"))
        .unwrap_or(url);
    PathBuf::from(stripped)
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let host = env::var("APP_HOST").unwrap_or(defaults.host);
        let port = parsed("APP_PORT", defaults.port).context("APP_PORT must be a valid u16")?;

        let database_backend = match non_empty_var("DATABASE_BACKEND") {
            Some(raw) => DatabaseBackend::from_env(&raw)?,
            None => defaults.database_backend,
        };

        let database_path = non_empty_var("DATABASE_PATH")
            .map(PathBuf::from)
            .or_else(|| non_empty_var("DATABASE_URL").map(|url| database_path_from(&url)))
            .unwrap_or(defaults.database_path);

        Ok(Self {
            host,
            port,
            database_backend,
            database_path,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            upload_path: non_empty_var("UPLOAD_PATH").map(PathBuf::from),
            admin_email: non_empty_var("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            cron_secret: non_empty_var("CRON_SECRET"),
            default_store_id: parsed("DEFAULT_STORE_ID", defaults.default_store_id)?,
            session_ttl_secs: parsed("SESSION_TTL_SECS", defaults.session_ttl_secs)?,
            upload_limit_bytes: parsed("UPLOAD_LIMIT_BYTES", defaults.upload_limit_bytes)?,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base directory for uploads: `UPLOAD_PATH`, else the directory of an
    /// absolute database file, else `./public`.
    pub fn upload_root(&self) -> PathBuf {
        if let Some(path) = &self.upload_path {
            return path.clone();
        }
        if self.database_path.is_absolute() {
            if let Some(parent) = self.database_path.parent() {
                return parent.to_path_buf();
            }
        }
        Path::new("public").to_path_buf()
    }

    /// Uploads outside the static `public/` tree must be served through `/api/qr`.
    pub fn qr_uses_api_route(&self) -> bool {
        self.upload_path.is_some() || self.database_path.is_absolute()
    }

    pub fn admin_credentials(&self) -> AdminCredentials {
        AdminCredentials {
            email: self.admin_email.clone(),
            password: self.admin_password.clone(),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs.max(1))
    }
}
