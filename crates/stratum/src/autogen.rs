//! Autogeneration
//!
//! Diffs a live, inspected schema against the target metadata and renders
//! the result as migration operations. [`produce_migrations`] works one
//! database at a time; the extension combines the per-database results into
//! a [`MigrationScript`]. [`RevisionContext`] collects those operations
//! while a revision plan runs and materializes the revision script files
//! afterwards.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StratumResult;
use crate::runtime::MigrationContext;
use crate::schema::{Column, Schema, Table};
use crate::script::{GenerateRequest, Revision, ScriptDirectory, SectionContent};

/// One schema change detected by comparison
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOp {
    CreateTable {
        table: Table,
    },
    DropTable {
        table: Table,
    },
    AddColumn {
        table: String,
        column: Column,
    },
    DropColumn {
        table: String,
        column: Column,
    },
    AlterNullable {
        table: String,
        column: String,
        nullable: bool,
    },
    AlterDefault {
        table: String,
        column: String,
        from: Option<String>,
        to: Option<String>,
    },
}

impl DiffOp {
    /// SQL applying this change
    pub fn to_up_sql(&self) -> String {
        match self {
            DiffOp::CreateTable { table } => {
                let columns: Vec<String> =
                    table.columns.values().map(|c| c.to_ddl()).collect();
                format!("CREATE TABLE {} ({});", table.name, columns.join(", "))
            }
            DiffOp::DropTable { table } => format!("DROP TABLE {};", table.name),
            DiffOp::AddColumn { table, column } => {
                format!("ALTER TABLE {} ADD COLUMN {};", table, column.to_ddl())
            }
            DiffOp::DropColumn { table, column } => {
                format!("ALTER TABLE {} DROP COLUMN {};", table, column.name)
            }
            DiffOp::AlterNullable {
                table,
                column,
                nullable,
            } => {
                let action = if *nullable { "DROP" } else { "SET" };
                format!("ALTER TABLE {} ALTER COLUMN {} {} NOT NULL;", table, column, action)
            }
            DiffOp::AlterDefault {
                table, column, to, ..
            } => match to {
                Some(expr) => format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                    table, column, expr
                ),
                None => format!("ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;", table, column),
            },
        }
    }

    /// SQL reverting this change
    pub fn to_down_sql(&self) -> String {
        match self {
            DiffOp::CreateTable { table } => DiffOp::DropTable {
                table: table.clone(),
            }
            .to_up_sql(),
            DiffOp::DropTable { table } => DiffOp::CreateTable {
                table: table.clone(),
            }
            .to_up_sql(),
            DiffOp::AddColumn { table, column } => DiffOp::DropColumn {
                table: table.clone(),
                column: column.clone(),
            }
            .to_up_sql(),
            DiffOp::DropColumn { table, column } => DiffOp::AddColumn {
                table: table.clone(),
                column: column.clone(),
            }
            .to_up_sql(),
            DiffOp::AlterNullable {
                table,
                column,
                nullable,
            } => DiffOp::AlterNullable {
                table: table.clone(),
                column: column.clone(),
                nullable: !nullable,
            }
            .to_up_sql(),
            DiffOp::AlterDefault {
                table,
                column,
                from,
                to,
            } => DiffOp::AlterDefault {
                table: table.clone(),
                column: column.clone(),
                from: to.clone(),
                to: from.clone(),
            }
            .to_up_sql(),
        }
    }

    /// Short human-readable description for drift reports
    pub fn describe(&self) -> String {
        match self {
            DiffOp::CreateTable { table } => format!("add table '{}'", table.name),
            DiffOp::DropTable { table } => format!("remove table '{}'", table.name),
            DiffOp::AddColumn { table, column } => {
                format!("add column '{}.{}'", table, column.name)
            }
            DiffOp::DropColumn { table, column } => {
                format!("remove column '{}.{}'", table, column.name)
            }
            DiffOp::AlterNullable { table, column, nullable } => {
                let state = if *nullable { "nullable" } else { "not null" };
                format!("make column '{}.{}' {}", table, column, state)
            }
            DiffOp::AlterDefault { table, column, .. } => {
                format!("change default of column '{}.{}'", table, column)
            }
        }
    }
}

/// Compare the live schema with the target metadata.
///
/// `compare_server_default` gates default-expression comparison, since some
/// backends report normalized expressions that never match the model text.
pub fn compare_schemas(live: &Schema, target: &Schema, compare_server_default: bool) -> Vec<DiffOp> {
    let mut ops = Vec::new();

    for (name, table) in &target.tables {
        match live.table(name) {
            None => ops.push(DiffOp::CreateTable {
                table: table.clone(),
            }),
            Some(live_table) => {
                for (column_name, column) in &table.columns {
                    match live_table.column(column_name) {
                        None => ops.push(DiffOp::AddColumn {
                            table: name.clone(),
                            column: column.clone(),
                        }),
                        Some(live_column) => {
                            if live_column.nullable != column.nullable {
                                ops.push(DiffOp::AlterNullable {
                                    table: name.clone(),
                                    column: column_name.clone(),
                                    nullable: column.nullable,
                                });
                            }

                            if compare_server_default && live_column.default != column.default {
                                ops.push(DiffOp::AlterDefault {
                                    table: name.clone(),
                                    column: column_name.clone(),
                                    from: live_column.default.clone(),
                                    to: column.default.clone(),
                                });
                            }
                        }
                    }
                }

                for (column_name, live_column) in &live_table.columns {
                    if !table.columns.contains_key(column_name) {
                        ops.push(DiffOp::DropColumn {
                            table: name.clone(),
                            column: live_column.clone(),
                        });
                    }
                }
            }
        }
    }

    for (name, live_table) in &live.tables {
        if !target.tables.contains_key(name) {
            ops.push(DiffOp::DropTable {
                table: live_table.clone(),
            });
        }
    }

    ops
}

/// Inspect one context's live schema and diff it against its target metadata
pub async fn produce_migrations(ctx: &mut MigrationContext) -> StratumResult<DatabaseOps> {
    let live = ctx.inspect().await?;
    let ops = compare_schemas(&live, ctx.target_metadata(), ctx.compare_server_default());

    Ok(DatabaseOps {
        name: ctx.name().to_string(),
        upgrade_token: ctx.upgrade_token().to_string(),
        downgrade_token: ctx.downgrade_token().to_string(),
        ops,
    })
}

/// The operations detected for one logical database
#[derive(Debug, Clone)]
pub struct DatabaseOps {
    pub name: String,
    pub upgrade_token: String,
    pub downgrade_token: String,
    pub ops: Vec<DiffOp>,
}

impl DatabaseOps {
    fn empty(name: &str, upgrade_token: &str, downgrade_token: &str) -> Self {
        Self {
            name: name.to_string(),
            upgrade_token: upgrade_token.to_string(),
            downgrade_token: downgrade_token.to_string(),
            ops: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Upgrade SQL for every op, in order
    pub fn up_sql(&self) -> String {
        self.ops
            .iter()
            .map(|op| op.to_up_sql())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Downgrade SQL for every op, in reverse order
    pub fn down_sql(&self) -> String {
        self.ops
            .iter()
            .rev()
            .map(|op| op.to_down_sql())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The combined result of diffing every configured database
#[derive(Debug, Clone)]
pub struct MigrationScript {
    databases: Vec<DatabaseOps>,
}

impl MigrationScript {
    pub fn new(databases: Vec<DatabaseOps>) -> Self {
        Self { databases }
    }

    /// Per-database accessor
    pub fn for_database(&self, name: &str) -> Option<&DatabaseOps> {
        self.databases.iter().find(|db| db.name == name)
    }

    pub fn databases(&self) -> &[DatabaseOps] {
        &self.databases
    }

    pub fn into_databases(self) -> Vec<DatabaseOps> {
        self.databases
    }

    /// Combined convenience accessor over every database's upgrade ops
    pub fn upgrade_ops(&self) -> Vec<&DiffOp> {
        self.databases.iter().flat_map(|db| db.ops.iter()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.iter().all(|db| db.is_empty())
    }
}

/// Options assembled by the revision workflow for one generation run
#[derive(Debug, Clone)]
pub struct RevisionContextOpts {
    pub message: String,
    /// Parent references, already branch-qualified
    pub head: Vec<String>,
    pub splice: bool,
    pub branch_labels: Vec<String>,
    pub version_path: Option<PathBuf>,
    pub rev_id: String,
    pub depends_on: Vec<String>,
}

/// Collects per-database generation results and writes the revision
/// script(s)
pub struct RevisionContext {
    script: Arc<ScriptDirectory>,
    opts: RevisionContextOpts,
    databases: BTreeMap<String, DatabaseOps>,
}

impl RevisionContext {
    /// `databases` seeds one (name, upgrade token, downgrade token) entry
    /// per configured logical database, so empty revisions still emit every
    /// section.
    pub fn new(
        script: Arc<ScriptDirectory>,
        opts: RevisionContextOpts,
        databases: &[(String, String, String)],
    ) -> Self {
        let databases = databases
            .iter()
            .map(|(name, up, down)| (name.clone(), DatabaseOps::empty(name, up, down)))
            .collect();

        Self {
            script,
            opts,
            databases,
        }
    }

    /// Record a structure-only (no operations) pass for one context
    pub fn run_no_autogenerate(&mut self, ctx: &MigrationContext) {
        self.databases.insert(
            ctx.name().to_string(),
            DatabaseOps::empty(ctx.name(), ctx.upgrade_token(), ctx.downgrade_token()),
        );
    }

    /// Diff the live schema against one context's target metadata and record
    /// the result
    pub fn run_autogenerate(&mut self, live: &Schema, ctx: &MigrationContext) {
        let ops = compare_schemas(live, ctx.target_metadata(), ctx.compare_server_default());
        self.databases.insert(
            ctx.name().to_string(),
            DatabaseOps {
                name: ctx.name().to_string(),
                upgrade_token: ctx.upgrade_token().to_string(),
                downgrade_token: ctx.downgrade_token().to_string(),
                ops,
            },
        );
    }

    /// Materialize the revision script and return one handle per configured
    /// database. All handles reference the same generated file; multi-db
    /// configurations receive one handle per database section.
    pub fn generate_scripts(&self) -> StratumResult<Vec<Arc<Revision>>> {
        let sections: Vec<SectionContent> = self
            .databases
            .values()
            .map(|db| SectionContent {
                name: db.name.clone(),
                upgrade_token: db.upgrade_token.clone(),
                downgrade_token: db.downgrade_token.clone(),
                up_sql: db.up_sql(),
                down_sql: db.down_sql(),
            })
            .collect();

        let revision = self.script.generate_revision(GenerateRequest {
            rev_id: self.opts.rev_id.clone(),
            message: self.opts.message.clone(),
            head: self.opts.head.clone(),
            splice: self.opts.splice,
            branch_labels: self.opts.branch_labels.clone(),
            version_path: self.opts.version_path.clone(),
            depends_on: self.opts.depends_on.clone(),
            sections,
        })?;

        Ok(self.databases.iter().map(|_| revision.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_table() -> Table {
        Table::new("users")
            .with_column(Column::new("id", "serial").primary_key())
            .with_column(Column::new("email", "varchar(255)").not_null())
    }

    #[test]
    fn test_create_table_detected() {
        let target = Schema::new().with_table(users_table());
        let ops = compare_schemas(&Schema::new(), &target, true);

        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0].to_up_sql(),
            "CREATE TABLE users (email varchar(255) NOT NULL, id serial PRIMARY KEY);"
        );
        assert_eq!(ops[0].to_down_sql(), "DROP TABLE users;");
    }

    #[test]
    fn test_column_level_diffs() {
        let live = Schema::new().with_table(
            Table::new("users")
                .with_column(Column::new("id", "serial").primary_key())
                .with_column(Column::new("legacy", "text")),
        );
        let target = Schema::new().with_table(users_table());

        let ops = compare_schemas(&live, &target, true);
        let described: Vec<_> = ops.iter().map(|op| op.describe()).collect();

        assert!(described.contains(&"add column 'users.email'".to_string()));
        assert!(described.contains(&"remove column 'users.legacy'".to_string()));
    }

    #[test]
    fn test_compare_server_default_gate() {
        let live = Schema::new().with_table(
            Table::new("users").with_column(Column::new("active", "boolean")),
        );
        let target = Schema::new().with_table(
            Table::new("users").with_column(Column::new("active", "boolean").default_expr("true")),
        );

        assert_eq!(compare_schemas(&live, &target, false).len(), 0);

        let ops = compare_schemas(&live, &target, true);
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0].to_up_sql(),
            "ALTER TABLE users ALTER COLUMN active SET DEFAULT true;"
        );
        assert_eq!(
            ops[0].to_down_sql(),
            "ALTER TABLE users ALTER COLUMN active DROP DEFAULT;"
        );
    }

    #[test]
    fn test_identical_schemas_are_clean() {
        let schema = Schema::new().with_table(users_table());
        assert!(compare_schemas(&schema, &schema, true).is_empty());
    }
}
