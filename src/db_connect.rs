//! Postgres settings and connection pool.

use anyhow::{anyhow, Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::info;
use std::time::Duration;
use tokio_postgres::{Config, NoTls};

/// Type alias for the PostgreSQL connection pool.
pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Connection settings for the shared database. The password is never
/// logged.
#[derive(Clone)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    password: String,
}

impl std::fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"[hidden]")
            .finish()
    }
}

impl DbSettings {
    /// Reads settings through `lookup` (normally `std::env::var`).
    /// `POSTGRES_HOST`, `POSTGRES_DB` and `POSTGRES_USER` are required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("Missing required environment variable {}", key))
        };
        let port = match lookup("POSTGRES_PORT") {
            Some(p) => p
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid POSTGRES_PORT '{}'", p))?,
            None => 5432,
        };
        Ok(DbSettings {
            host: required("POSTGRES_HOST")?,
            port,
            dbname: required("POSTGRES_DB")?,
            user: required("POSTGRES_USER")?,
            password: lookup("POSTGRES_PASSWORD").unwrap_or_default(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn pg_config(&self) -> Config {
        info!(
            "DB Config: Host={}, Port={}, DB={}, User={}",
            self.host, self.port, self.dbname, self.user
        );
        let mut config = Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password);
        config.application_name("rights_ledger");
        config.connect_timeout(Duration::from_secs(10));
        config
    }
}

/// Builds the pool and checks it with `SELECT 1`.
pub async fn connect(settings: &DbSettings) -> Result<PgPool> {
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(settings.pg_config(), NoTls);

    let pool_max_size = 4;
    let pool_idle_timeout = Some(Duration::from_secs(180));

    let pool = Pool::builder()
        .max_size(pool_max_size)
        .min_idle(Some(1))
        .idle_timeout(pool_idle_timeout)
        .connection_timeout(Duration::from_secs(40))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    let conn = pool
        .get()
        .await
        .context("Failed to get test connection from pool")?;
    conn.query_one("SELECT 1", &[])
        .await
        .context("Test query 'SELECT 1' failed")?;
    drop(conn);
    info!(
        "Database connection pool initialized with max_size: {}, idle_timeout: {:?}.",
        pool_max_size, pool_idle_timeout,
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_settings_require_host_db_user() {
        let err = DbSettings::from_lookup(lookup(&[("POSTGRES_HOST", "db")])).unwrap_err();
        assert!(err.to_string().contains("POSTGRES_DB"));
    }

    #[test]
    fn test_settings_default_port_and_hide_password() {
        let settings = DbSettings::from_lookup(lookup(&[
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_DB", "ledger"),
            ("POSTGRES_USER", "app"),
            ("POSTGRES_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert_eq!(settings.port, 5432);
        assert!(!format!("{:?}", settings).contains("secret"));
    }

    #[test]
    fn test_settings_reject_bad_port() {
        let result = DbSettings::from_lookup(lookup(&[
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_DB", "ledger"),
            ("POSTGRES_USER", "app"),
            ("POSTGRES_PORT", "abc"),
        ]));
        assert!(result.is_err());
    }
}
