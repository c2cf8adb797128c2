//! CLI configuration file
//!
//! `stratum.toml` describes the app (root path, script location, version
//! locations, extra options), the database URL per logical name, and
//! optionally the target metadata used for autogeneration and drift checks.
//! Databases without a metadata entry get an empty target schema.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::Deserialize;
use stratum::backend::postgres::PgEngine;
use stratum::{App, Column, ContextSettings, Schema, Settings, Stratum, Table, VersionLocation};

#[derive(Debug, Deserialize, Default)]
pub struct CliConfig {
    #[serde(default)]
    app: AppSection,
    #[serde(default)]
    context: ContextSection,
    /// Logical database name -> connection URL
    #[serde(default)]
    databases: BTreeMap<String, String>,
    /// Logical database name -> target metadata
    #[serde(default)]
    metadata: BTreeMap<String, MetadataSection>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AppSection {
    name: String,
    root_path: PathBuf,
    script_location: PathBuf,
    version_locations: Vec<VersionLocationSection>,
    options: BTreeMap<String, String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "stratum".to_string(),
            root_path: PathBuf::from("."),
            script_location: PathBuf::from("migrations"),
            version_locations: Vec::new(),
            options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VersionLocationSection {
    path: PathBuf,
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ContextSection {
    compare_server_default: bool,
    version_table: String,
}

impl Default for ContextSection {
    fn default() -> Self {
        let defaults = ContextSettings::default();
        Self {
            compare_server_default: defaults.compare_server_default,
            version_table: defaults.version_table,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct MetadataSection {
    #[serde(default)]
    tables: BTreeMap<String, TableSection>,
}

#[derive(Debug, Deserialize, Default)]
struct TableSection {
    #[serde(default)]
    columns: BTreeMap<String, ColumnSection>,
}

#[derive(Debug, Deserialize)]
struct ColumnSection {
    #[serde(rename = "type")]
    sql_type: String,
    #[serde(default = "default_true")]
    nullable: bool,
    default: Option<String>,
    #[serde(default)]
    primary_key: bool,
}

fn default_true() -> bool {
    true
}

impl CliConfig {
    pub fn load(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Build the extension and app this configuration describes
    pub fn build(self) -> anyhow::Result<(Stratum, App)> {
        if self.databases.is_empty() {
            bail!("no databases configured; add a [databases] section to stratum.toml");
        }

        let mut builder = Stratum::builder().run_mkdir(false);

        for (name, url) in &self.databases {
            let engine = PgEngine::connect_lazy(url)
                .with_context(|| format!("invalid connection url for database '{name}'"))?;
            builder = builder.named_engine(name.clone(), engine);

            let metadata = self
                .metadata
                .get(name)
                .map(to_schema)
                .unwrap_or_default();
            builder = builder.named_metadata(name.clone(), metadata);
        }

        for name in self.metadata.keys() {
            if !self.databases.contains_key(name) {
                bail!("metadata configured for unknown database '{name}'");
            }
        }

        let mut settings = Settings::new().script_location(self.app.script_location.clone());

        for location in &self.app.version_locations {
            let entry = match &location.branch {
                Some(branch) => VersionLocation::Branch {
                    name: branch.clone(),
                    path: location.path.clone(),
                },
                None => VersionLocation::Path(location.path.clone()),
            };
            settings = settings.version_location(entry);
        }

        for (key, value) in &self.app.options {
            settings = settings.option(key.clone(), value.clone());
        }

        settings.context.compare_server_default = self.context.compare_server_default;
        settings.context.version_table = self.context.version_table.clone();

        let app = App::builder(self.app.name.clone())
            .root_path(self.app.root_path.clone())
            .settings(settings)
            .build();

        Ok((builder.build(), app))
    }
}

fn to_schema(section: &MetadataSection) -> Schema {
    let mut schema = Schema::new();

    for (table_name, table) in &section.tables {
        let mut out = Table::new(table_name.clone());

        for (column_name, column) in &table.columns {
            let mut col = Column::new(column_name.clone(), column.sql_type.clone());
            col.nullable = column.nullable && !column.primary_key;
            col.default = column.default.clone();
            col.primary_key = column.primary_key;
            out = out.with_column(col);
        }

        schema = schema.with_table(out);
    }

    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_full_config() {
        let config: CliConfig = toml::from_str(
            r#"
            [app]
            name = "shop"
            script_location = "db/migrations"

            [[app.version_locations]]
            path = "db/migrations/billing"
            branch = "billing"

            [app.options]
            revision_environment = "true"

            [context]
            version_table = "shop_version"

            [databases]
            default = "postgres://localhost/shop"

            [metadata.default.tables.users.columns.id]
            type = "serial"
            primary_key = true

            [metadata.default.tables.users.columns.email]
            type = "varchar(255)"
            nullable = false
            "#,
        )
        .unwrap();

        let (stratum, app) = config.build().unwrap();
        let _ = stratum;

        assert_eq!(app.name(), "shop");
        assert_eq!(
            app.settings().script_location,
            PathBuf::from("db/migrations")
        );
        assert_eq!(
            app.settings().branch_path("billing"),
            Some(&PathBuf::from("db/migrations/billing"))
        );
        assert_eq!(app.settings().context.version_table, "shop_version");
        assert_eq!(
            app.settings().options.get("revision_environment"),
            Some(&"true".to_string())
        );
    }

    #[test]
    fn test_metadata_converts_to_schema() {
        let section: MetadataSection = toml::from_str(
            r#"
            [tables.users.columns.id]
            type = "serial"
            primary_key = true

            [tables.users.columns.name]
            type = "text"
            "#,
        )
        .unwrap();

        let schema = to_schema(&section);
        let users = schema.table("users").unwrap();

        let id = users.column("id").unwrap();
        assert!(id.primary_key);
        assert!(!id.nullable);

        let name = users.column("name").unwrap();
        assert!(name.nullable);
    }

    #[test]
    fn test_databases_required() {
        let config = CliConfig::default();
        assert!(config.build().is_err());
    }
}
