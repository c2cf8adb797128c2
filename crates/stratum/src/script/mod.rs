//! Migration toolkit: configuration, revision scripts, and the revision
//! graph
//!
//! This module owns everything about revisions at rest: the flat option
//! [`Config`] derived from app settings, the on-disk [`ScriptDirectory`],
//! parsed [`Revision`] scripts, the linked [`RevisionMap`] graph with its
//! planning routines, and the built-in script templates.

pub mod config;
pub mod directory;
pub mod map;
pub mod revision;
pub mod templates;

pub use config::Config;
pub use directory::{GenerateRequest, ScriptDirectory, SectionContent};
pub use map::RevisionMap;
pub use revision::Revision;
