//! Operations handle
//!
//! A thin, clonable view over one migration context exposing the
//! schema-mutation primitives revision scripts and ad-hoc callers rely on.
//! The handle shares the context's connection; it never owns or closes it.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::autogen::DiffOp;
use crate::error::StratumResult;
use crate::runtime::MigrationContext;
use crate::schema::{Column, Table};

/// Schema-mutation primitives over one logical database
#[derive(Clone)]
pub struct Operations {
    context: Arc<Mutex<MigrationContext>>,
}

impl Operations {
    pub fn new(context: Arc<Mutex<MigrationContext>>) -> Self {
        Self { context }
    }

    /// The wrapped migration context
    pub fn context(&self) -> Arc<Mutex<MigrationContext>> {
        self.context.clone()
    }

    /// Execute raw SQL through the context's connection
    pub async fn execute(&self, sql: &str) -> StratumResult<()> {
        self.context.lock().await.execute(sql).await
    }

    pub async fn create_table(&self, table: &Table) -> StratumResult<()> {
        let sql = DiffOp::CreateTable {
            table: table.clone(),
        }
        .to_up_sql();
        self.execute(&sql).await
    }

    pub async fn drop_table(&self, name: &str) -> StratumResult<()> {
        self.execute(&format!("DROP TABLE {};", name)).await
    }

    pub async fn add_column(&self, table: &str, column: &Column) -> StratumResult<()> {
        let sql = DiffOp::AddColumn {
            table: table.to_string(),
            column: column.clone(),
        }
        .to_up_sql();
        self.execute(&sql).await
    }

    pub async fn drop_column(&self, table: &str, column: &str) -> StratumResult<()> {
        self.execute(&format!("ALTER TABLE {} DROP COLUMN {};", table, column))
            .await
    }
}
