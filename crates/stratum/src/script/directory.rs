//! Script directory
//!
//! The on-disk home of revision scripts: the script root (which also holds
//! the template file) plus any extra configured version locations. The
//! directory is stateless over the filesystem; every operation loads a fresh
//! [`RevisionMap`], so scripts generated moments ago are always visible.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{StratumError, StratumResult};
use crate::runtime::MigrationStep;

use super::config::Config;
use super::map::RevisionMap;
use super::revision::Revision;
use super::templates::TEMPLATE_FILENAME;

/// Handle over the on-disk revision scripts
#[derive(Debug)]
pub struct ScriptDirectory {
    dir: PathBuf,
    version_locations: Vec<PathBuf>,
}

/// Everything needed to materialize one new revision script
#[derive(Debug)]
pub struct GenerateRequest {
    pub rev_id: String,
    pub message: String,
    /// Parent references; may be symbolic (`"head"`, `"{branch}@head"`,
    /// `"base"`)
    pub head: Vec<String>,
    /// Allow a non-head parent
    pub splice: bool,
    pub branch_labels: Vec<String>,
    /// Directory for the new script; defaults to the script root
    pub version_path: Option<PathBuf>,
    pub depends_on: Vec<String>,
    /// Rendered SQL per logical database
    pub sections: Vec<SectionContent>,
}

/// One logical database's contribution to a generated script
#[derive(Debug, Clone, Serialize)]
pub struct SectionContent {
    pub name: String,
    pub upgrade_token: String,
    pub downgrade_token: String,
    pub up_sql: String,
    pub down_sql: String,
}

impl SectionContent {
    /// An empty contribution for one database
    pub fn empty(name: &str, upgrade_token: &str, downgrade_token: &str) -> Self {
        Self {
            name: name.to_string(),
            upgrade_token: upgrade_token.to_string(),
            downgrade_token: downgrade_token.to_string(),
            up_sql: String::new(),
            down_sql: String::new(),
        }
    }
}

impl ScriptDirectory {
    /// Build from a scope's config. `script_location` is required;
    /// `version_locations` is a comma-joined list that already contains the
    /// script root.
    pub fn from_config(config: &Config) -> StratumResult<Self> {
        let dir = config
            .get_main_option("script_location")
            .ok_or_else(|| StratumError::directory("no script_location configured"))?;

        let version_locations = match config.get_main_option("version_locations") {
            Some(joined) => joined
                .split(',')
                .map(|s| PathBuf::from(s.trim()))
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
            None => vec![PathBuf::from(dir)],
        };

        Ok(Self {
            dir: PathBuf::from(dir),
            version_locations,
        })
    }

    /// The script root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every directory searched for revision scripts
    pub fn version_locations(&self) -> &[PathBuf] {
        &self.version_locations
    }

    /// Where the script template lives
    pub fn template_path(&self) -> PathBuf {
        self.dir.join(TEMPLATE_FILENAME)
    }

    /// Load every revision script into a linked graph
    pub fn load_map(&self) -> StratumResult<RevisionMap> {
        let mut revisions = Vec::new();
        let mut seen_dirs = BTreeSet::new();

        for location in &self.version_locations {
            if !seen_dirs.insert(location.clone()) {
                continue;
            }

            if !location.is_dir() {
                tracing::debug!(path = %location.display(), "version location does not exist yet");
                continue;
            }

            let mut entries: Vec<PathBuf> = std::fs::read_dir(location)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "sql"))
                .collect();
            entries.sort();

            for path in entries {
                revisions.push(Revision::load(&path)?);
            }
        }

        RevisionMap::build(revisions)
    }

    /// Resolve one reference to a single revision
    pub fn get_revision(&self, reference: &str) -> StratumResult<Arc<Revision>> {
        let revisions = self.get_revisions(&[reference.to_string()])?;

        match revisions.len() {
            1 => Ok(revisions.into_iter().next().unwrap()),
            0 => Err(StratumError::resolution(reference, "no revision matched")),
            _ => Err(StratumError::resolution(
                reference,
                "reference matched more than one revision",
            )),
        }
    }

    /// Resolve references to revisions, preserving order and dropping
    /// duplicates
    pub fn get_revisions(&self, references: &[String]) -> StratumResult<Vec<Arc<Revision>>> {
        let map = self.load_map()?;
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();

        for reference in references {
            for rev in map.get_revisions(reference)? {
                if seen.insert(rev.revision.clone()) {
                    out.push(rev);
                }
            }
        }

        Ok(out)
    }

    /// Strict graph heads (dependencies not considered)
    pub fn get_heads(&self) -> StratumResult<Vec<Arc<Revision>>> {
        Ok(self.load_map()?.heads())
    }

    /// Ordered walk between two sets of bounds, newest first
    pub fn walk_revisions(
        &self,
        lower: &[String],
        upper: &[String],
    ) -> StratumResult<Vec<Arc<Revision>>> {
        self.load_map()?.walk(lower, upper)
    }

    /// Plan upgrade steps from `applied` to `targets`
    pub fn upgrade_revs(
        &self,
        targets: &[String],
        applied: &[String],
    ) -> StratumResult<Vec<MigrationStep>> {
        self.load_map()?.upgrade_steps(targets, applied)
    }

    /// Plan downgrade steps from `applied` to `target`
    pub fn downgrade_revs(
        &self,
        target: &str,
        applied: &[String],
    ) -> StratumResult<Vec<MigrationStep>> {
        self.load_map()?.downgrade_steps(target, applied)
    }

    /// Plan a version-table move from `applied` to `targets`
    pub fn stamp_revs(
        &self,
        targets: &[String],
        applied: &[String],
    ) -> StratumResult<Vec<MigrationStep>> {
        self.load_map()?.stamp_steps(targets, applied)
    }

    /// Render and write one new revision script, returning the parsed result
    pub fn generate_revision(&self, request: GenerateRequest) -> StratumResult<Arc<Revision>> {
        let map = self.load_map()?;

        if map.resolve_id(&request.rev_id)?.is_some() {
            return Err(StratumError::directory(format!(
                "revision id '{}' already exists",
                request.rev_id
            )));
        }

        let mut parents = Vec::new();

        for reference in &request.head {
            if reference == "base" {
                continue;
            }

            for rev in map.get_revisions(reference)? {
                if !rev.is_head() && !request.splice {
                    return Err(StratumError::resolution(
                        rev.revision.clone(),
                        "not a head revision; use splice to branch from it",
                    ));
                }

                if !parents.contains(&rev.revision) {
                    parents.push(rev.revision.clone());
                }
            }
        }

        let mut depends_on = Vec::new();

        for reference in &request.depends_on {
            for rev in map.get_revisions(reference)? {
                if !depends_on.contains(&rev.revision) {
                    depends_on.push(rev.revision.clone());
                }
            }
        }

        let template_path = self.template_path();
        let template = std::fs::read_to_string(&template_path).map_err(|_| {
            StratumError::directory(format!(
                "script template {} does not exist; run mkdir first",
                template_path.display()
            ))
        })?;

        let (up_sql, down_sql) = request
            .sections
            .first()
            .map(|s| (s.up_sql.clone(), s.down_sql.clone()))
            .unwrap_or_default();

        let mut context = tera::Context::new();
        context.insert("rev_id", &request.rev_id);
        context.insert("message", &request.message);
        context.insert("parents", &parents);
        context.insert("branch_labels", &request.branch_labels);
        context.insert("depends_on", &depends_on);
        context.insert(
            "create_date",
            &chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
        context.insert("up_sql", &up_sql);
        context.insert("down_sql", &down_sql);
        context.insert("databases", &request.sections);

        let rendered = tera::Tera::one_off(&template, &context, false)?;

        let target_dir = request.version_path.clone().unwrap_or_else(|| self.dir.clone());
        std::fs::create_dir_all(&target_dir)?;

        let filename = format!("{}_{}.sql", request.rev_id, slugify(&request.message));
        let path = target_dir.join(filename);
        std::fs::write(&path, rendered)?;

        tracing::info!(path = %path.display(), "generated revision script");

        Ok(Arc::new(Revision::load(&path)?))
    }
}

/// Teacher-style file name slug: lowercase, word characters only
fn slugify(message: &str) -> String {
    let slug: String = message
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    slug.trim_matches('_').chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::templates::GENERIC;

    fn config_for(dir: &Path) -> Config {
        let mut config = Config::new();
        config.set_main_option("script_location", dir.to_string_lossy());
        config.set_main_option("version_locations", dir.to_string_lossy());
        config
    }

    fn write_template(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(TEMPLATE_FILENAME), GENERIC).unwrap();
    }

    fn request(rev_id: &str, message: &str, head: Vec<String>) -> GenerateRequest {
        GenerateRequest {
            rev_id: rev_id.to_string(),
            message: message.to_string(),
            head,
            splice: false,
            branch_labels: Vec::new(),
            version_path: None,
            depends_on: Vec::new(),
            sections: vec![SectionContent::empty("default", "upgrades", "downgrades")],
        }
    }

    #[test]
    fn test_generate_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let script = ScriptDirectory::from_config(&config_for(tmp.path())).unwrap();
        write_template(tmp.path());

        let rev = script
            .generate_revision(request("100", "create users", vec!["head".to_string()]))
            .unwrap();
        assert_eq!(rev.revision, "100");
        assert!(rev.is_base());
        assert_eq!(rev.message, "create users");
        assert!(rev.path.file_name().unwrap().to_string_lossy().starts_with("100_create_users"));

        let second = script
            .generate_revision(request("200", "add email", vec!["head".to_string()]))
            .unwrap();
        assert_eq!(second.down_revisions, vec!["100"]);

        let map = script.load_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.heads()[0].revision, "200");
    }

    #[test]
    fn test_generate_requires_template() {
        let tmp = tempfile::tempdir().unwrap();
        let script = ScriptDirectory::from_config(&config_for(tmp.path())).unwrap();
        std::fs::create_dir_all(tmp.path()).unwrap();

        let err = script
            .generate_revision(request("100", "x", vec!["head".to_string()]))
            .unwrap_err();
        assert!(matches!(err, StratumError::Directory { .. }));
    }

    #[test]
    fn test_generate_rejects_duplicate_id() {
        let tmp = tempfile::tempdir().unwrap();
        let script = ScriptDirectory::from_config(&config_for(tmp.path())).unwrap();
        write_template(tmp.path());

        script
            .generate_revision(request("100", "first", vec!["head".to_string()]))
            .unwrap();
        let err = script
            .generate_revision(request("100", "again", vec!["head".to_string()]))
            .unwrap_err();
        assert!(matches!(err, StratumError::Directory { .. }));
    }

    #[test]
    fn test_generate_splice_check() {
        let tmp = tempfile::tempdir().unwrap();
        let script = ScriptDirectory::from_config(&config_for(tmp.path())).unwrap();
        write_template(tmp.path());

        script
            .generate_revision(request("100", "first", vec!["head".to_string()]))
            .unwrap();
        script
            .generate_revision(request("200", "second", vec!["head".to_string()]))
            .unwrap();

        // "100" now has a child; without splice it cannot be a parent.
        let err = script
            .generate_revision(request("300", "branch", vec!["100".to_string()]))
            .unwrap_err();
        assert!(err.is_resolution());

        let mut req = request("300", "branch", vec!["100".to_string()]);
        req.splice = true;
        script.generate_revision(req).unwrap();
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add users table!"), "add_users_table");
        assert_eq!(slugify("  spaced  "), "spaced");
    }
}
