//! Database backends
//!
//! The migration runtime talks to databases through the [`Engine`] and
//! [`Connection`] traits: an engine hands out connections, a connection
//! executes statements, manages its transaction, owns the version-table
//! bookkeeping, and can inspect the live schema for autogeneration. The
//! crate ships a PostgreSQL adapter over sqlx and a transactional in-memory
//! backend for dry runs and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StratumResult;
use crate::schema::Schema;

/// A source of database connections for one logical database
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Open a new connection
    async fn connect(&self) -> StratumResult<Box<dyn Connection>>;
}

/// One open database connection
///
/// A connection is exclusively owned by the migration context that wraps it;
/// nothing outside the owning scope's cache may close it directly. Dropping
/// an unclosed connection releases it without a graceful close.
#[async_trait]
pub trait Connection: Send {
    async fn begin(&mut self) -> StratumResult<()>;
    async fn commit(&mut self) -> StratumResult<()>;
    async fn rollback(&mut self) -> StratumResult<()>;

    /// Execute one SQL statement
    async fn execute(&mut self, sql: &str) -> StratumResult<()>;

    /// Create the version table if it does not exist
    async fn ensure_version_table(&mut self, table: &str) -> StratumResult<()>;

    /// The revision ids currently recorded as applied
    async fn version_heads(&mut self, table: &str) -> StratumResult<Vec<String>>;

    async fn insert_version(&mut self, table: &str, revision: &str) -> StratumResult<()>;

    async fn delete_version(&mut self, table: &str, revision: &str) -> StratumResult<()>;

    async fn update_version(&mut self, table: &str, from: &str, to: &str) -> StratumResult<()>;

    /// Snapshot the live schema for autogeneration
    async fn inspect(&mut self) -> StratumResult<Schema>;

    /// Gracefully close the connection. Idempotent; an open transaction is
    /// rolled back first.
    async fn close(&mut self) -> StratumResult<()>;
}
