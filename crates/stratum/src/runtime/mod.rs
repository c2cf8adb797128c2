//! Migration runtime
//!
//! The live half of the toolkit: an [`EnvironmentContext`] built once per
//! scope turns per-database configure options into [`MigrationContext`]s,
//! each owning one open connection and executing planned
//! [`MigrationStep`]s against it.

pub mod environment;
pub mod migration;

pub use environment::{ConfigureOpts, EnvironmentContext};
pub use migration::{MigrationContext, MigrationPlan, MigrationStep};
