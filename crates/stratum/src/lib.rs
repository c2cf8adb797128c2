//! # stratum: application-scoped schema migrations
//!
//! Binds a revision-script migration toolkit to a host application's
//! lifecycle: the extension lazily builds and caches the chain of migration
//! objects (config, script directory, environment, per-database migration
//! contexts and operations handles) per application scope, tears live
//! connections down when the application context ends, and exposes the
//! migration workflow — current/heads/branches/log queries, stamp, upgrade,
//! downgrade, revision creation with independent branches, merges, and
//! model-vs-database diffing — as plain async calls.
//!
//! ```no_run
//! use stratum::{App, RevisionOptions, Schema, Stratum};
//! use stratum::backend::memory::MemoryEngine;
//!
//! # async fn example() -> stratum::StratumResult<()> {
//! let stratum = Stratum::builder()
//!     .metadata(Schema::new())
//!     .engine(MemoryEngine::new())
//!     .build();
//!
//! let app = App::new("example");
//! stratum.init_app(&app).await?;
//!
//! let ctx = app.context();
//! stratum.revision(&app, RevisionOptions::new("init").empty(true)).await?;
//! stratum.upgrade(&app, "heads").await?;
//! ctx.close(None).await;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod autogen;
pub mod backend;
pub mod error;
pub mod extension;
pub mod ops;
pub mod rev;
pub mod runtime;
pub mod schema;
pub mod script;
pub mod settings;

pub use app::{App, AppBuilder, AppContext, DatabaseProvider, TeardownHook};
pub use autogen::{compare_schemas, DatabaseOps, DiffOp, MigrationScript};
pub use backend::{Connection, Engine};
pub use error::{StratumError, StratumResult};
pub use extension::{RevisionOptions, Stratum, StratumBuilder, DEFAULT_DATABASE};
pub use ops::Operations;
pub use rev::RevisionRef;
pub use runtime::{MigrationContext, MigrationPlan, MigrationStep};
pub use schema::{Column, Schema, Table};
pub use script::{Revision, ScriptDirectory};
pub use settings::{ContextSettings, Settings, VersionLocation};

/// Install a basic tracing subscriber honoring `RUST_LOG`. An explicit,
/// optional host step; building the extension never configures logging.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
