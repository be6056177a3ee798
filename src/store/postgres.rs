//! PostgreSQL store over an sqlx pool.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::Executor;

use crate::config::DatabaseConfig;
use crate::migration::MigrationUnit;
use crate::store::{ApplyError, MigrationStore, StoreError};

/// Pool-backed store. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open the pool and make sure the server answers.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .database(&config.name)
            .ssl_mode(config.ssl_mode.parse::<PgSslMode>()?);
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.conn_timeout))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ping().await?;

        match sqlx::query_scalar::<_, String>("SELECT current_database()")
            .fetch_one(&store.pool)
            .await
        {
            Ok(name) => tracing::info!(database = %name, host = %config.host, "Connected to database"),
            Err(e) => tracing::error!(error = %e, "Failed to get current database"),
        }

        Ok(store)
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }
}

#[async_trait]
impl MigrationStore for PgStore {
    async fn prepare_ledger(&self, ledger: &str) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id text NOT NULL PRIMARY KEY, applied_at timestamp with time zone)",
            quote_ident(ledger)
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn applied_units(&self, ledger: &str) -> Result<BTreeSet<String>, StoreError> {
        let sql = format!("SELECT id FROM {}", quote_ident(ledger));
        let ids = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn apply_unit(&self, ledger: &str, unit: &MigrationUnit) -> Result<(), ApplyError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ApplyError::Script(e.into()))?;

        if !unit.up_sql.trim().is_empty() {
            (&mut *tx)
                .execute(sqlx::raw_sql(&unit.up_sql))
                .await
                .map_err(|e| ApplyError::Script(e.into()))?;
        }

        let record = format!(
            "INSERT INTO {} (id, applied_at) VALUES ($1, now())",
            quote_ident(ledger)
        );
        sqlx::query(&record)
            .bind(&unit.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| ApplyError::Record(e.into()))?;

        tx.commit().await.map_err(|e| ApplyError::Record(e.into()))
    }
}

/// Double-quote an identifier, escaping embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
