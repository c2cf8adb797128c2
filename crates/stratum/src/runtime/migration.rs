//! Migration context and step execution
//!
//! A [`MigrationContext`] owns one open connection for one logical database.
//! It snapshots the applied heads, asks a [`MigrationPlan`] for the ordered
//! steps, and executes them: section SQL first, then the version-table
//! bookkeeping the planner precomputed. The context's owning scope cache is
//! the only place allowed to close its connection.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::backend::Connection;
use crate::error::{StratumError, StratumResult};
use crate::schema::Schema;
use crate::script::Revision;

use super::environment::ConfigureOpts;

/// One planned migration step, with its version-table bookkeeping
/// precomputed by the planner
#[derive(Debug, Clone)]
pub enum MigrationStep {
    /// Run a revision's upgrade section, then replace its applied parents
    /// with it in the version table
    Upgrade {
        revision: Arc<Revision>,
        /// Applied parent ids this revision supersedes
        replaces: Vec<String>,
    },
    /// Run a revision's downgrade section, then remove it from the version
    /// table, restoring the parents that become heads again
    Downgrade {
        revision: Arc<Revision>,
        /// Parent ids to record as applied once this revision is removed
        restores: Vec<String>,
    },
    /// Move the version table without executing any SQL
    Stamp { remove: Vec<String>, add: Vec<String> },
}

/// Produces the ordered migration steps for one context given the applied
/// heads. Implemented by the built-in upgrade/downgrade/stamp/revision plans
/// and open to callers.
pub trait MigrationPlan: Send + Sync {
    fn plan<'a>(
        &'a self,
        applied: &'a [String],
        ctx: &'a mut MigrationContext,
    ) -> Pin<Box<dyn Future<Output = StratumResult<Vec<MigrationStep>>> + Send + 'a>>;
}

struct ContextOpts {
    name: String,
    target_metadata: Schema,
    upgrade_token: String,
    downgrade_token: String,
    version_table: String,
    compare_server_default: bool,
    extra: BTreeMap<String, serde_json::Value>,
}

/// Live migration runtime for one logical database
pub struct MigrationContext {
    opts: ContextOpts,
    /// Taken on close
    connection: Option<Box<dyn Connection>>,
}

impl MigrationContext {
    pub(crate) fn new(opts: ConfigureOpts) -> Self {
        Self {
            opts: ContextOpts {
                name: opts.name,
                target_metadata: opts.target_metadata,
                upgrade_token: opts.upgrade_token,
                downgrade_token: opts.downgrade_token,
                version_table: opts.version_table,
                compare_server_default: opts.compare_server_default,
                extra: opts.extra,
            },
            connection: Some(opts.connection),
        }
    }

    /// Logical database name this context serves
    pub fn name(&self) -> &str {
        &self.opts.name
    }

    pub fn target_metadata(&self) -> &Schema {
        &self.opts.target_metadata
    }

    pub fn upgrade_token(&self) -> &str {
        &self.opts.upgrade_token
    }

    pub fn downgrade_token(&self) -> &str {
        &self.opts.downgrade_token
    }

    pub fn version_table(&self) -> &str {
        &self.opts.version_table
    }

    pub fn compare_server_default(&self) -> bool {
        self.opts.compare_server_default
    }

    /// Free-form options carried from the configure call
    pub fn options(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.opts.extra
    }

    fn conn(&mut self) -> StratumResult<&mut Box<dyn Connection>> {
        self.connection
            .as_mut()
            .ok_or_else(|| StratumError::database("migration context connection is closed"))
    }

    pub async fn ensure_version_table(&mut self) -> StratumResult<()> {
        let table = self.opts.version_table.clone();
        self.conn()?.ensure_version_table(&table).await
    }

    /// The revision ids currently recorded as applied. There may be more
    /// than one in a branched history.
    pub async fn get_current_heads(&mut self) -> StratumResult<Vec<String>> {
        let table = self.opts.version_table.clone();
        self.conn()?.version_heads(&table).await
    }

    pub async fn begin_transaction(&mut self) -> StratumResult<()> {
        self.conn()?.begin().await
    }

    pub async fn commit_transaction(&mut self) -> StratumResult<()> {
        self.conn()?.commit().await
    }

    pub async fn rollback_transaction(&mut self) -> StratumResult<()> {
        self.conn()?.rollback().await
    }

    /// Execute raw SQL, splitting multi-statement strings
    pub async fn execute(&mut self, sql: &str) -> StratumResult<()> {
        let statements = split_sql(sql);
        let conn = self.conn()?;

        for statement in &statements {
            conn.execute(statement).await?;
        }

        Ok(())
    }

    /// Snapshot the live schema, excluding the version table itself
    pub async fn inspect(&mut self) -> StratumResult<Schema> {
        let table = self.opts.version_table.clone();
        let mut schema = self.conn()?.inspect().await?;
        schema.tables.remove(&table);
        Ok(schema)
    }

    /// Snapshot the applied heads, ask the plan for steps, and execute them
    /// in order
    pub async fn run_migrations(&mut self, plan: &dyn MigrationPlan) -> StratumResult<()> {
        self.ensure_version_table().await?;
        let applied = self.get_current_heads().await?;
        let steps = plan.plan(&applied, self).await?;

        for step in &steps {
            self.run_step(step).await?;
        }

        Ok(())
    }

    async fn run_step(&mut self, step: &MigrationStep) -> StratumResult<()> {
        let table = self.opts.version_table.clone();

        match step {
            MigrationStep::Upgrade { revision, replaces } => {
                tracing::info!(
                    database = %self.opts.name,
                    revision = %revision.revision,
                    "running upgrade"
                );

                let token = self.opts.upgrade_token.clone();

                if let Some(sql) = revision.section(&token) {
                    let statements = split_sql(sql);
                    let conn = self.conn()?;

                    for statement in &statements {
                        conn.execute(statement).await?;
                    }
                }

                let conn = self.conn()?;

                match replaces.split_first() {
                    None => conn.insert_version(&table, &revision.revision).await?,
                    Some((first, rest)) => {
                        conn.update_version(&table, first, &revision.revision).await?;

                        for parent in rest {
                            conn.delete_version(&table, parent).await?;
                        }
                    }
                }
            }
            MigrationStep::Downgrade { revision, restores } => {
                tracing::info!(
                    database = %self.opts.name,
                    revision = %revision.revision,
                    "running downgrade"
                );

                let token = self.opts.downgrade_token.clone();

                if let Some(sql) = revision.section(&token) {
                    let statements = split_sql(sql);
                    let conn = self.conn()?;

                    for statement in &statements {
                        conn.execute(statement).await?;
                    }
                }

                let conn = self.conn()?;
                conn.delete_version(&table, &revision.revision).await?;

                for parent in restores {
                    conn.insert_version(&table, parent).await?;
                }
            }
            MigrationStep::Stamp { remove, add } => {
                tracing::info!(
                    database = %self.opts.name,
                    remove = remove.len(),
                    add = add.len(),
                    "stamping version table"
                );

                let conn = self.conn()?;

                for revision in remove {
                    conn.delete_version(&table, revision).await?;
                }

                for revision in add {
                    conn.insert_version(&table, revision).await?;
                }
            }
        }

        Ok(())
    }

    /// Gracefully close the underlying connection. Idempotent. Only the
    /// owning scope cache should call this.
    pub async fn close(&mut self) -> StratumResult<()> {
        if let Some(conn) = self.connection.as_mut() {
            conn.close().await?;
        }

        self.connection = None;
        Ok(())
    }

    /// Whether the underlying connection is still open
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }
}

/// Split SQL into statements using proper parsing, falling back to naive
/// semicolon splitting for dialect-specific syntax the parser rejects
pub fn split_sql(sql: &str) -> Vec<String> {
    let dialect = GenericDialect {};

    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => statements.into_iter().map(|s| format!("{};", s)).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| format!("{};", s))
                .collect()
        }
    }
}
