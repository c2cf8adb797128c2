//! Environment context
//!
//! Bridges a scope's configuration and script directory to live migration
//! contexts. Each [`EnvironmentContext::configure`] call consumes one owned
//! [`ConfigureOpts`] value, so per-database configurations can never bleed
//! into each other through shared mutable state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::Connection;
use crate::schema::Schema;
use crate::script::{Config, ScriptDirectory};

use super::migration::MigrationContext;

/// Per-scope factory for migration contexts
#[derive(Debug)]
pub struct EnvironmentContext {
    config: Arc<Config>,
    script: Arc<ScriptDirectory>,
}

impl EnvironmentContext {
    pub fn new(config: Arc<Config>, script: Arc<ScriptDirectory>) -> Self {
        Self { config, script }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn script(&self) -> &Arc<ScriptDirectory> {
        &self.script
    }

    /// Wrap one open connection into a migration context
    pub fn configure(&self, opts: ConfigureOpts) -> MigrationContext {
        MigrationContext::new(opts)
    }
}

/// Options for configuring one migration context. Owned and consumed per
/// call.
pub struct ConfigureOpts {
    /// Logical database name this context serves
    pub name: String,
    pub connection: Box<dyn Connection>,
    /// Target metadata compared against the live schema during
    /// autogeneration
    pub target_metadata: Schema,
    /// Section token executed on upgrade steps
    pub upgrade_token: String,
    /// Section token executed on downgrade steps
    pub downgrade_token: String,
    /// Table recording applied revision ids
    pub version_table: String,
    pub compare_server_default: bool,
    /// Free-form options carried on the context
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ConfigureOpts {
    /// Defaults for a single-database configuration
    pub fn new(name: impl Into<String>, connection: Box<dyn Connection>, metadata: Schema) -> Self {
        Self {
            name: name.into(),
            connection,
            target_metadata: metadata,
            upgrade_token: "upgrades".to_string(),
            downgrade_token: "downgrades".to_string(),
            version_table: "stratum_version".to_string(),
            compare_server_default: true,
            extra: BTreeMap::new(),
        }
    }

    /// Distinguishing tokens for a multi-database configuration, so the
    /// halves of a combined script cannot collide
    pub fn with_database_tokens(mut self) -> Self {
        self.upgrade_token = format!("{}_upgrades", self.name);
        self.downgrade_token = format!("{}_downgrades", self.name);
        self
    }
}
