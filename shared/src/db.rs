//! Database connection management.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::secrets::DatabaseCredentials;
use crate::{Config, Error, Result};

/// Create a database connection pool.
pub async fn create_pool(config: &Config, creds: &DatabaseCredentials) -> Result<PgPool> {
    let host = creds
        .host
        .clone()
        .or_else(|| config.db_host.clone())
        .ok_or_else(|| Error::Config("Database host not configured".to_string()))?;

    let database_url = format!(
        "postgres://{}:{}@{}:{}/{}",
        creds.username,
        creds.password,
        host,
        creds.port.unwrap_or(5432),
        creds.dbname.as_deref().unwrap_or(&config.db_name),
    );

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&database_url)
        .await
        .map_err(Error::Database)?;

    Ok(pool)
}
