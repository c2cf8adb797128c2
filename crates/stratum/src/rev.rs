//! Revision references
//!
//! Callers name revisions in several shapes: a symbolic string (`"head"`,
//! `"heads"`, `"base"`, an id, a `branch@head` qualifier), the `"current"`
//! sentinel, a signed offset relative to the current position, or a list of
//! ids for merge and multi-parent operations. [`RevisionRef`] closes that set
//! into one tagged variant, and [`RevisionRef::simplify`] normalizes any of
//! them into the plain list of identifier strings the script directory
//! expects.

use std::sync::Arc;

use crate::error::{StratumError, StratumResult};
use crate::script::Revision;

/// The "current" sentinel string accepted in the [`RevisionRef::Single`] form
pub const CURRENT: &str = "current";

/// A reference to one or more revisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionRef {
    /// A symbolic name or revision id
    Single(String),
    /// Several ids, for merge and multi-parent operations
    Many(Vec<String>),
    /// The revisions currently recorded as applied
    Current,
    /// A signed offset from the current position, meaningful only for
    /// upgrade and downgrade targets
    Relative(i64),
}

impl RevisionRef {
    /// Whether simplifying this reference requires querying the live
    /// "current" state. Lists never expand the sentinel.
    pub fn wants_current(&self) -> bool {
        match self {
            RevisionRef::Current => true,
            RevisionRef::Single(s) => s == CURRENT,
            _ => false,
        }
    }

    /// Normalize into a list of identifier strings.
    ///
    /// `current` carries the live applied-head ids when the caller opted into
    /// expanding the `"current"` sentinel; `None` means the sentinel is not
    /// valid in this position. `handle_relative` permits bare integer strings
    /// to be read as signed offsets; the explicit [`RevisionRef::Relative`]
    /// variant is unambiguous and converts regardless.
    pub fn simplify(
        &self,
        current: Option<&[String]>,
        handle_relative: bool,
    ) -> StratumResult<Vec<String>> {
        match self {
            RevisionRef::Single(s) => {
                if s == CURRENT {
                    match current {
                        Some(ids) => Ok(ids.to_vec()),
                        None => Err(StratumError::resolution(
                            CURRENT,
                            "the 'current' sentinel is not valid for this operation",
                        )),
                    }
                } else if handle_relative {
                    // Positive relative ids must carry a + prefix.
                    match s.parse::<i64>() {
                        Ok(n) => Ok(vec![format!("{n:+}")]),
                        Err(_) => Ok(vec![s.clone()]),
                    }
                } else {
                    Ok(vec![s.clone()])
                }
            }
            RevisionRef::Many(ids) => Ok(ids.clone()),
            RevisionRef::Current => match current {
                Some(ids) => Ok(ids.to_vec()),
                None => Err(StratumError::resolution(
                    CURRENT,
                    "the 'current' sentinel is not valid for this operation",
                )),
            },
            RevisionRef::Relative(n) => Ok(vec![format!("{n:+}")]),
        }
    }
}

impl From<&str> for RevisionRef {
    fn from(s: &str) -> Self {
        if s == CURRENT {
            RevisionRef::Current
        } else {
            RevisionRef::Single(s.to_string())
        }
    }
}

impl From<String> for RevisionRef {
    fn from(s: String) -> Self {
        RevisionRef::from(s.as_str())
    }
}

impl From<i64> for RevisionRef {
    fn from(n: i64) -> Self {
        RevisionRef::Relative(n)
    }
}

impl From<Vec<String>> for RevisionRef {
    fn from(ids: Vec<String>) -> Self {
        RevisionRef::Many(ids)
    }
}

impl From<&[&str]> for RevisionRef {
    fn from(ids: &[&str]) -> Self {
        RevisionRef::Many(ids.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&Revision> for RevisionRef {
    fn from(rev: &Revision) -> Self {
        RevisionRef::Single(rev.revision.clone())
    }
}

impl From<&Arc<Revision>> for RevisionRef {
    fn from(rev: &Arc<Revision>) -> Self {
        RevisionRef::Single(rev.revision.clone())
    }
}
