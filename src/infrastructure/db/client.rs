//! `domain::ports::Connection` over `sqlx::AnyPool` — the concrete driver the
//! core otherwise stays ignorant of. Adapted from the teacher's `connect()`,
//! which set up the same pool the same way for the same three engines.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use tracing::debug;

use crate::domain::ports::{Connection, RowMap};
use crate::domain::schema::Table;
use crate::domain::value_objects::EngineKind;
use crate::infrastructure::config::DbConfig;
use crate::infrastructure::db::row_mapper::row_to_map;

pub struct SqlxConnection {
    pool: AnyPool,
    engine_kind: EngineKind,
    server_version: Option<String>,
}

/// Connect to the database described in `cfg`.
pub async fn connect(cfg: &DbConfig) -> Result<SqlxConnection> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.url())
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {} (driver: {})",
                cfg.dbname, cfg.driver
            )
        })?;

    debug!(
        "Connected to {}/{} via {} driver",
        cfg.host, cfg.dbname, cfg.driver
    );

    let engine_kind = EngineKind::from_driver(&cfg.driver);
    let server_version = fetch_server_version(&pool, engine_kind).await;

    Ok(SqlxConnection {
        pool,
        engine_kind,
        server_version,
    })
}

async fn fetch_server_version(pool: &AnyPool, kind: EngineKind) -> Option<String> {
    let sql = match kind {
        EngineKind::Postgres => "SHOW server_version",
        EngineKind::Mysql => "SELECT VERSION()",
        EngineKind::Sqlite => "SELECT sqlite_version()",
    };
    let row = sqlx::query(sql).fetch_one(pool).await.ok()?;
    row.try_get::<String, _>(0).ok()
}

/// Like the query path used while streaming table data — used by the rest
/// of `client` and exposed for the data-phase iterator in `application::backup`.
pub async fn fetch_rows_for_table(pool: &AnyPool, sql: &str, table: &Table) -> Result<Vec<RowMap>> {
    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to query {}", table.name))?;
    rows.iter().map(|row| row_to_map(row, table)).collect()
}

#[async_trait]
impl Connection for SqlxConnection {
    async fn query(&self, sql: &str) -> Result<Vec<RowMap>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("query failed: {sql}"))?;
        rows.iter()
            .map(|row| row_to_map(row, &Table::new("__adhoc__")))
            .collect()
    }

    async fn exec(&self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .with_context(|| format!("exec failed: {sql}"))?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> Result<()> {
        let stmt = match self.engine_kind {
            EngineKind::Mysql => "START TRANSACTION",
            _ => "BEGIN",
        };
        sqlx::query(stmt).execute(&self.pool).await?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        sqlx::query("COMMIT").execute(&self.pool).await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        sqlx::query("ROLLBACK").execute(&self.pool).await?;
        Ok(())
    }

    fn engine_kind(&self) -> EngineKind {
        self.engine_kind
    }

    fn server_version(&self) -> Option<String> {
        self.server_version.clone()
    }
}

impl SqlxConnection {
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}
