//! Schema metadata model
//!
//! Describes the target shape of a database: the tables and columns the
//! application's models expect. A [`Schema`] is attached to each logical
//! database and compared against the live, inspected schema during
//! autogeneration. The same shape is used for both sides of the comparison.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A set of tables describing one database's expected or observed shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Tables keyed by name
    pub tables: BTreeMap<String, Table>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, replacing any previous definition with the same name
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Look up a table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A single table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Columns keyed by name
    pub columns: BTreeMap<String, Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: BTreeMap::new(),
        }
    }

    /// Add a column, replacing any previous definition with the same name
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }
}

/// A single column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// SQL type as written in DDL, e.g. `"integer"` or `"varchar(255)"`
    pub sql_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Server-side default expression, if any
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Render this column as a DDL fragment
    pub fn to_ddl(&self) -> String {
        let mut ddl = format!("{} {}", self.name, self.sql_type);

        if self.primary_key {
            ddl.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            ddl.push_str(" NOT NULL");
        }

        if let Some(default) = &self.default {
            ddl.push_str(&format!(" DEFAULT {}", default));
        }

        ddl
    }
}
