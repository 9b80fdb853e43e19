//! Connection management.
//!
//! Owns a pooled, health-checked MySQL connection set for the whole process.
//! The pool is created by the composition root and passed into every
//! [`crate::Document`] by value (the pool handle is cheaply cloneable), so
//! there is no hidden global connection state and shutdown is explicit via
//! [`DocumentStore::close`].

use std::time::Duration;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::Executor;
use tracing::{info, warn};

use crate::error::DocumentError;

/// Database configuration, read from the environment.
///
/// The variable names (`db_host`, `db_name`, `db_user`, `db_pwd`, `db_port`)
/// are preserved from the legacy deployment.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub pool_size: u32,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            database: "eatery".to_string(),
            user: "root".to_string(),
            password: String::new(),
            port: 3306,
            pool_size: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("db_host").unwrap_or(defaults.host),
            database: std::env::var("db_name").unwrap_or(defaults.database),
            user: std::env::var("db_user").unwrap_or(defaults.user),
            password: std::env::var("db_pwd").unwrap_or(defaults.password),
            port: std::env::var("db_port")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            pool_size: std::env::var("db_pool_size")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
            acquire_timeout: defaults.acquire_timeout,
        }
    }

    fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }

    /// Connection target with the password elided, for logging.
    fn masked(&self) -> String {
        format!(
            "mysql://{}:******@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

/// Handle over the process-wide connection pool. Cloning is cheap; all
/// clones share the same pool.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: MySqlPool,
}

impl DocumentStore {
    /// Open the pool and verify connectivity with a `SELECT 1` probe.
    ///
    /// Every later acquire re-probes the connection (`test_before_acquire`),
    /// which replaces the legacy reconnect-on-dead-connection dance. All
    /// sessions run in UTC.
    pub async fn connect(config: DbConfig) -> Result<Self, DocumentError> {
        info!("Connecting to database: {}", config.masked());
        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.acquire_timeout)
            .test_before_acquire(true)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET time_zone = '+00:00'").await?;
                    Ok(())
                })
            })
            .connect(&config.url())
            .await
            .map_err(|e| DocumentError::Connection(format!("Unable to connect database: {e}")))?;

        let store = Self { pool };
        store.ping().await?;
        info!("Connection to database is successful");
        Ok(store)
    }

    /// Convenience: connect using [`DbConfig::from_env`].
    pub async fn from_env() -> Result<Self, DocumentError> {
        Self::connect(DbConfig::from_env()).await
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Trivial liveness probe.
    pub async fn ping(&self) -> Result<(), DocumentError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!("Connection to database is not longer alive: {e}");
                DocumentError::Connection(format!("Liveness probe failed: {e}"))
            })?;
        Ok(())
    }

    /// Explicit shutdown; call at process exit.
    pub async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_includes_all_parts() {
        let config = DbConfig {
            host: "db".into(),
            database: "eatery".into(),
            user: "svc".into(),
            password: "secret".into(),
            port: 3307,
            ..DbConfig::default()
        };
        assert_eq!(config.url(), "mysql://svc:secret@db:3307/eatery");
    }

    #[test]
    fn masked_url_hides_password() {
        let config = DbConfig {
            password: "secret".into(),
            ..DbConfig::default()
        };
        let masked = config.masked();
        assert!(!masked.contains("secret"));
        assert!(masked.contains("******"));
    }

    #[test]
    fn defaults_are_sane() {
        let config = DbConfig::default();
        assert_eq!(config.port, 3306);
        assert_eq!(config.pool_size, 10);
    }
}
