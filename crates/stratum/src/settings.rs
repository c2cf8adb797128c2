//! Per-app migration settings
//!
//! Settings are supplied once when the [`crate::app::App`] is built and are
//! read-only afterwards; the per-scope [`crate::script::Config`] is derived
//! from them on first access.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Settings recognized by the migration environment
#[derive(Debug, Clone)]
pub struct Settings {
    /// Where revision scripts and the template live, relative to the app
    /// root unless absolute
    pub script_location: PathBuf,
    /// Additional directories searched for revision scripts, optionally
    /// bound to an independent branch name
    pub version_locations: Vec<VersionLocation>,
    /// Options applied to every migration context
    pub context: ContextSettings,
    /// Extra main options copied into the derived config verbatim
    /// (e.g. `revision_environment`)
    pub options: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            script_location: PathBuf::from("migrations"),
            version_locations: Vec::new(),
            context: ContextSettings::default(),
            options: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_location = path.into();
        self
    }

    pub fn version_location(mut self, location: VersionLocation) -> Self {
        self.version_locations.push(location);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn context(mut self, context: ContextSettings) -> Self {
        self.context = context;
        self
    }

    /// The version path registered for a branch name, if any
    pub fn branch_path(&self, branch: &str) -> Option<&PathBuf> {
        self.version_locations.iter().find_map(|loc| match loc {
            VersionLocation::Branch { name, path } if name == branch => Some(path),
            _ => None,
        })
    }
}

/// One extra revision storage location
#[derive(Debug, Clone)]
pub enum VersionLocation {
    /// A plain directory searched for revision scripts
    Path(PathBuf),
    /// A directory bound to an independent branch: new revisions on that
    /// branch are stored here by default
    Branch { name: String, path: PathBuf },
}

impl VersionLocation {
    pub fn path(&self) -> &PathBuf {
        match self {
            VersionLocation::Path(path) => path,
            VersionLocation::Branch { path, .. } => path,
        }
    }
}

/// Options merged into every migration context configuration
#[derive(Debug, Clone)]
pub struct ContextSettings {
    /// Compare server-side column defaults during autogeneration
    pub compare_server_default: bool,
    /// Name of the table recording applied revisions
    pub version_table: String,
    /// Free-form options passed through to each configure call
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            compare_server_default: true,
            version_table: "stratum_version".to_string(),
            options: BTreeMap::new(),
        }
    }
}
