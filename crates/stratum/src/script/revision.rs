//! Revision script files
//!
//! A revision is one `.sql` file named `{rev_id}_{slug}.sql` carrying a
//! structured comment header (revision id, parents, branch labels,
//! dependencies, message) followed by token-named SQL sections. A
//! single-database script has `-- upgrades` / `-- downgrades` sections; a
//! multi-database script has one pair per logical database, named by the
//! context's tokens (`-- default_upgrades`, ...) so the halves cannot
//! collide.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{StratumError, StratumResult};

/// One revision script
#[derive(Debug, Clone)]
pub struct Revision {
    /// Unique identifier
    pub revision: String,
    /// Parent revision ids; empty for a base revision
    pub down_revisions: Vec<String>,
    /// Branch labels declared on this revision
    pub branch_labels: BTreeSet<String>,
    /// Revisions this one depends on without being downgraded through them
    pub depends_on: Vec<String>,
    /// Human-readable description
    pub message: String,
    /// File this revision was loaded from
    pub path: PathBuf,
    /// SQL bodies keyed by section token
    sections: BTreeMap<String, String>,
    /// Ids of revisions whose parents include this one; linked by the map
    pub(crate) nextrev: BTreeSet<String>,
}

impl Revision {
    /// Load a revision from a script file
    pub fn load(path: &Path) -> StratumResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Parse a revision script
    pub fn parse(content: &str, path: &Path) -> StratumResult<Self> {
        let mut revision = None;
        let mut down_revisions = Vec::new();
        let mut branch_labels = BTreeSet::new();
        let mut depends_on = Vec::new();
        let mut message = String::new();
        let mut sections: BTreeMap<String, String> = BTreeMap::new();
        let mut current: Option<String> = None;

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(rest) = trimmed.strip_prefix("--") {
                let rest = rest.trim();

                if let Some((key, value)) = rest.split_once(':') {
                    let value = value.trim();

                    match key.trim() {
                        "revision" => revision = Some(value.to_string()),
                        "parents" => down_revisions = split_ids(value),
                        "branch-labels" => branch_labels = split_ids(value).into_iter().collect(),
                        "depends-on" => depends_on = split_ids(value),
                        "message" => message = value.to_string(),
                        // Unknown headers (e.g. "created") are informational.
                        _ => {}
                    }

                    continue;
                }

                if is_section_token(rest) {
                    sections.entry(rest.to_string()).or_default();
                    current = Some(rest.to_string());
                    continue;
                }

                // Plain comment line; ignored.
                continue;
            }

            if let Some(token) = &current {
                if let Some(body) = sections.get_mut(token) {
                    body.push_str(line);
                    body.push('\n');
                }
            }
        }

        let revision = revision.ok_or_else(|| {
            StratumError::directory(format!(
                "revision script {} has no '-- revision:' header",
                path.display()
            ))
        })?;

        for body in sections.values_mut() {
            let trimmed = body.trim();
            *body = trimmed.to_string();
        }

        Ok(Self {
            revision,
            down_revisions,
            branch_labels,
            depends_on,
            message,
            path: path.to_path_buf(),
            sections,
            nextrev: BTreeSet::new(),
        })
    }

    /// The SQL body of a section, if the section exists and is non-empty
    pub fn section(&self, token: &str) -> Option<&str> {
        self.sections
            .get(token)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    /// A base revision has no parents
    pub fn is_base(&self) -> bool {
        self.down_revisions.is_empty()
    }

    /// A head has no child revision. Only meaningful on revisions linked
    /// through a revision map.
    pub fn is_head(&self) -> bool {
        self.nextrev.is_empty()
    }

    /// A branch point has more than one child revision
    pub fn is_branch_point(&self) -> bool {
        self.nextrev.len() > 1
    }

    /// A merge point has more than one parent revision
    pub fn is_merge_point(&self) -> bool {
        self.down_revisions.len() > 1
    }

    /// Ids of this revision's children
    pub fn nextrev(&self) -> &BTreeSet<String> {
        &self.nextrev
    }

    /// Format for command line listings
    pub fn cmd_format(&self, verbose: bool) -> String {
        let parents = if self.is_base() {
            "<base>".to_string()
        } else {
            self.down_revisions.join(", ")
        };

        let mut line = format!("{} -> {}", parents, self.revision);

        if !self.branch_labels.is_empty() {
            let labels: Vec<_> = self.branch_labels.iter().cloned().collect();
            line.push_str(&format!(" ({})", labels.join(", ")));
        }

        if self.is_head() {
            line.push_str(" (head)");
        }

        if self.is_branch_point() {
            line.push_str(" (branchpoint)");
        }

        if self.is_merge_point() {
            line.push_str(" (mergepoint)");
        }

        line.push_str(&format!(", {}", self.message));

        if verbose {
            line.push_str(&format!("\n    Path: {}", self.path.display()));

            if !self.depends_on.is_empty() {
                line.push_str(&format!("\n    Depends on: {}", self.depends_on.join(", ")));
            }
        }

        line
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cmd_format(false))
    }
}

fn split_ids(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Section tokens are lowercase identifiers; header lines always carry a
/// colon, so the two cannot be confused.
fn is_section_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
