//! PostgreSQL backend
//!
//! Adapts a sqlx connection pool to the [`Engine`]/[`Connection`] seam.
//! Each migration context checks out one pooled connection and drives its
//! transaction with explicit BEGIN/COMMIT/ROLLBACK so that multi-database
//! runs can interleave transaction entry across engines.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row};

use super::{Connection, Engine};
use crate::error::{StratumError, StratumResult};
use crate::schema::{Column, Schema, Table};

/// A PostgreSQL [`Engine`] backed by a sqlx connection pool
pub struct PgEngine {
    pool: PgPool,
}

impl PgEngine {
    /// Connect to a database URL
    pub async fn connect(database_url: &str) -> StratumResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StratumError::database(format!("failed to connect: {}", e)))?;

        Ok(Self { pool })
    }

    /// Create a pool without connecting; the first checkout connects.
    /// Useful for tooling that may never touch the database.
    pub fn connect_lazy(database_url: &str) -> StratumResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| StratumError::database(format!("invalid database url: {}", e)))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Engine for PgEngine {
    async fn connect(&self) -> StratumResult<Box<dyn Connection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StratumError::database(format!("failed to acquire connection: {}", e)))?;

        Ok(Box::new(PgConnection {
            conn: Some(conn),
            in_tx: false,
        }))
    }
}

struct PgConnection {
    /// Taken on close; the pooled connection is released by drop
    conn: Option<PoolConnection<Postgres>>,
    in_tx: bool,
}

impl PgConnection {
    fn conn(&mut self) -> StratumResult<&mut PoolConnection<Postgres>> {
        self.conn
            .as_mut()
            .ok_or_else(|| StratumError::database("connection is closed"))
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn begin(&mut self) -> StratumResult<()> {
        if self.in_tx {
            return Err(StratumError::database("transaction already open"));
        }

        sqlx::query("BEGIN").execute(&mut **self.conn()?).await?;
        self.in_tx = true;
        Ok(())
    }

    async fn commit(&mut self) -> StratumResult<()> {
        if !self.in_tx {
            return Err(StratumError::database("no open transaction to commit"));
        }

        sqlx::query("COMMIT").execute(&mut **self.conn()?).await?;
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> StratumResult<()> {
        if !self.in_tx {
            return Ok(());
        }

        sqlx::query("ROLLBACK").execute(&mut **self.conn()?).await?;
        self.in_tx = false;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> StratumResult<()> {
        sqlx::query(sql)
            .execute(&mut **self.conn()?)
            .await
            .map_err(|e| StratumError::database(format!("failed to execute statement: {}", e)))?;
        Ok(())
    }

    async fn ensure_version_table(&mut self, table: &str) -> StratumResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (version_num VARCHAR(64) NOT NULL PRIMARY KEY)",
            table
        );
        sqlx::query(&sql).execute(&mut **self.conn()?).await?;
        Ok(())
    }

    async fn version_heads(&mut self, table: &str) -> StratumResult<Vec<String>> {
        let sql = format!("SELECT version_num FROM {} ORDER BY version_num", table);
        let rows = sqlx::query(&sql).fetch_all(&mut **self.conn()?).await?;

        let mut heads = Vec::with_capacity(rows.len());

        for row in rows {
            let version: String = row
                .try_get("version_num")
                .map_err(|e| StratumError::database(format!("failed to read version row: {}", e)))?;
            heads.push(version);
        }

        Ok(heads)
    }

    async fn insert_version(&mut self, table: &str, revision: &str) -> StratumResult<()> {
        let sql = format!("INSERT INTO {} (version_num) VALUES ($1)", table);
        sqlx::query(&sql)
            .bind(revision)
            .execute(&mut **self.conn()?)
            .await?;
        Ok(())
    }

    async fn delete_version(&mut self, table: &str, revision: &str) -> StratumResult<()> {
        let sql = format!("DELETE FROM {} WHERE version_num = $1", table);
        sqlx::query(&sql)
            .bind(revision)
            .execute(&mut **self.conn()?)
            .await?;
        Ok(())
    }

    async fn update_version(&mut self, table: &str, from: &str, to: &str) -> StratumResult<()> {
        let sql = format!("UPDATE {} SET version_num = $1 WHERE version_num = $2", table);
        sqlx::query(&sql)
            .bind(to)
            .bind(from)
            .execute(&mut **self.conn()?)
            .await?;
        Ok(())
    }

    async fn inspect(&mut self) -> StratumResult<Schema> {
        let rows = sqlx::query(
            "SELECT table_name, column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = 'public' \
             ORDER BY table_name, ordinal_position",
        )
        .fetch_all(&mut **self.conn()?)
        .await?;

        let mut schema = Schema::new();

        for row in rows {
            let table_name: String = row.try_get("table_name")?;
            let column_name: String = row.try_get("column_name")?;
            let data_type: String = row.try_get("data_type")?;
            let is_nullable: String = row.try_get("is_nullable")?;
            let column_default: Option<String> = row.try_get("column_default")?;

            let table = schema
                .tables
                .entry(table_name.clone())
                .or_insert_with(|| Table::new(table_name));

            let mut column = Column::new(column_name, data_type);
            column.nullable = is_nullable == "YES";
            column.default = column_default;
            table.columns.insert(column.name.clone(), column);
        }

        Ok(schema)
    }

    async fn close(&mut self) -> StratumResult<()> {
        if self.conn.is_none() {
            return Ok(());
        }

        if self.in_tx {
            self.rollback().await?;
        }

        // Dropping the pooled connection returns it to the pool.
        self.conn = None;
        Ok(())
    }
}
