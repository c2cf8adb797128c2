//! In-memory backend
//!
//! A fully transactional stand-in for a real database: writes stage on the
//! connection and only reach the shared engine state on commit, so rollback
//! semantics behave like the real thing. Useful for dry runs and for
//! exercising multi-database orchestration in tests without a server.
//! Executed SQL is recorded verbatim rather than interpreted; the live
//! schema reported by [`Connection::inspect`] is whatever the engine was
//! seeded with.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Connection, Engine};
use crate::error::{StratumError, StratumResult};
use crate::schema::Schema;

#[derive(Default)]
struct MemoryState {
    schema: Schema,
    /// Version table name -> applied revision ids
    versions: HashMap<String, BTreeSet<String>>,
    /// Every statement committed through this engine, in order
    statements: Vec<String>,
}

/// An in-memory [`Engine`]
#[derive(Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<MemoryState>>,
    poisoned: Arc<AtomicBool>,
    write_poisoned: Arc<AtomicBool>,
    open: Arc<AtomicUsize>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the live schema reported by inspection
    pub fn with_schema(self, schema: Schema) -> Self {
        self.set_schema(schema);
        self
    }

    /// Replace the live schema reported by inspection
    pub fn set_schema(&self, schema: Schema) {
        self.state.lock().unwrap().schema = schema;
    }

    /// The revision ids committed to a version table
    pub fn applied(&self, table: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .versions
            .get(table)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every statement committed through this engine, in order
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Make every subsequent operation on every connection fail
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent write (statement execution and version-table
    /// mutation) fail, while connections, transactions, and reads keep
    /// working. Models a database that breaks mid-migration.
    pub fn poison_writes(&self) {
        self.write_poisoned.store(true, Ordering::SeqCst);
    }

    /// Undo [`MemoryEngine::poison`] and [`MemoryEngine::poison_writes`]
    pub fn heal(&self) {
        self.poisoned.store(false, Ordering::SeqCst);
        self.write_poisoned.store(false, Ordering::SeqCst);
    }

    /// Number of connections handed out and not yet closed or dropped
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn connect(&self) -> StratumResult<Box<dyn Connection>> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(StratumError::database("memory engine poisoned"));
        }

        self.open.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryConnection {
            state: self.state.clone(),
            poisoned: self.poisoned.clone(),
            write_poisoned: self.write_poisoned.clone(),
            open: self.open.clone(),
            staged: None,
            closed: false,
        }))
    }
}

enum StagedOp {
    Statement(String),
    EnsureTable(String),
    Insert { table: String, revision: String },
    Delete { table: String, revision: String },
    Update { table: String, from: String, to: String },
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    poisoned: Arc<AtomicBool>,
    write_poisoned: Arc<AtomicBool>,
    open: Arc<AtomicUsize>,
    /// Present while a transaction is open
    staged: Option<Vec<StagedOp>>,
    closed: bool,
}

impl MemoryConnection {
    fn check(&self) -> StratumResult<()> {
        if self.closed {
            return Err(StratumError::database("connection is closed"));
        }

        if self.poisoned.load(Ordering::SeqCst) {
            return Err(StratumError::database("memory engine poisoned"));
        }

        Ok(())
    }

    fn check_write(&self) -> StratumResult<()> {
        self.check()?;

        if self.write_poisoned.load(Ordering::SeqCst) {
            return Err(StratumError::database("memory engine rejected a write"));
        }

        Ok(())
    }

    fn push(&mut self, op: StagedOp) {
        match &mut self.staged {
            Some(ops) => ops.push(op),
            None => apply(&mut self.state.lock().unwrap(), &op),
        }
    }
}

fn apply(state: &mut MemoryState, op: &StagedOp) {
    match op {
        StagedOp::Statement(sql) => state.statements.push(sql.clone()),
        StagedOp::EnsureTable(table) => {
            state.versions.entry(table.clone()).or_default();
        }
        StagedOp::Insert { table, revision } => {
            state
                .versions
                .entry(table.clone())
                .or_default()
                .insert(revision.clone());
        }
        StagedOp::Delete { table, revision } => {
            if let Some(set) = state.versions.get_mut(table) {
                set.remove(revision);
            }
        }
        StagedOp::Update { table, from, to } => {
            let set = state.versions.entry(table.clone()).or_default();
            set.remove(from);
            set.insert(to.clone());
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn begin(&mut self) -> StratumResult<()> {
        self.check()?;

        if self.staged.is_some() {
            return Err(StratumError::database("transaction already open"));
        }

        self.staged = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> StratumResult<()> {
        self.check()?;

        let ops = self
            .staged
            .take()
            .ok_or_else(|| StratumError::database("no open transaction to commit"))?;

        let mut state = self.state.lock().unwrap();

        for op in &ops {
            apply(&mut state, op);
        }

        Ok(())
    }

    async fn rollback(&mut self) -> StratumResult<()> {
        if self.closed {
            return Err(StratumError::database("connection is closed"));
        }

        // Rollback still works on a poisoned engine; staged work is simply
        // discarded.
        self.staged = None;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> StratumResult<()> {
        self.check_write()?;
        self.push(StagedOp::Statement(sql.to_string()));
        Ok(())
    }

    async fn ensure_version_table(&mut self, table: &str) -> StratumResult<()> {
        self.check()?;
        self.push(StagedOp::EnsureTable(table.to_string()));
        Ok(())
    }

    async fn version_heads(&mut self, table: &str) -> StratumResult<Vec<String>> {
        self.check()?;

        let mut set: BTreeSet<String> = self
            .state
            .lock()
            .unwrap()
            .versions
            .get(table)
            .cloned()
            .unwrap_or_default();

        // Read-your-writes: replay staged version ops over the committed
        // state.
        if let Some(ops) = &self.staged {
            for op in ops {
                match op {
                    StagedOp::Insert { table: t, revision } if t == table => {
                        set.insert(revision.clone());
                    }
                    StagedOp::Delete { table: t, revision } if t == table => {
                        set.remove(revision);
                    }
                    StagedOp::Update { table: t, from, to } if t == table => {
                        set.remove(from);
                        set.insert(to.clone());
                    }
                    _ => {}
                }
            }
        }

        Ok(set.into_iter().collect())
    }

    async fn insert_version(&mut self, table: &str, revision: &str) -> StratumResult<()> {
        self.check_write()?;
        self.push(StagedOp::Insert {
            table: table.to_string(),
            revision: revision.to_string(),
        });
        Ok(())
    }

    async fn delete_version(&mut self, table: &str, revision: &str) -> StratumResult<()> {
        self.check_write()?;
        self.push(StagedOp::Delete {
            table: table.to_string(),
            revision: revision.to_string(),
        });
        Ok(())
    }

    async fn update_version(&mut self, table: &str, from: &str, to: &str) -> StratumResult<()> {
        self.check_write()?;
        self.push(StagedOp::Update {
            table: table.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    async fn inspect(&mut self) -> StratumResult<Schema> {
        self.check()?;
        Ok(self.state.lock().unwrap().schema.clone())
    }

    async fn close(&mut self) -> StratumResult<()> {
        if self.closed {
            return Ok(());
        }

        self.staged = None;
        self.closed = true;
        self.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if !self.closed {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
