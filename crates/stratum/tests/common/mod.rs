//! Shared fixtures for integration tests: apps rooted in temp directories
//! backed by in-memory engines.

// Each test binary compiles its own copy; not every binary uses every
// fixture.
#![allow(dead_code)]

use std::sync::Arc;

use stratum::backend::memory::MemoryEngine;
use stratum::{App, Schema, Settings, Stratum};

/// Default version table name used by the fixtures
pub const VERSION_TABLE: &str = "stratum_version";

pub struct TestEnv {
    pub stratum: Stratum,
    pub app: App,
    pub engine: Arc<MemoryEngine>,
    /// Holds the script directory alive for the test's duration
    pub tmp: tempfile::TempDir,
}

/// One default database backed by a fresh in-memory engine
pub async fn single_db(metadata: Schema) -> TestEnv {
    let tmp = tempfile::tempdir().unwrap();
    let engine = Arc::new(MemoryEngine::new());

    let stratum = Stratum::builder()
        .metadata(metadata)
        .shared_engine("default", engine.clone())
        .build();

    let app = App::builder("test-app")
        .root_path(tmp.path())
        .settings(Settings::new().script_location("migrations"))
        .build();

    stratum.init_app(&app).await.unwrap();

    TestEnv {
        stratum,
        app,
        engine,
        tmp,
    }
}

pub struct MultiDbEnv {
    pub stratum: Stratum,
    pub app: App,
    pub default_engine: Arc<MemoryEngine>,
    pub other_engine: Arc<MemoryEngine>,
    pub tmp: tempfile::TempDir,
}

/// Two logical databases ("default" and "other") with disjoint metadata
pub async fn multi_db(default_metadata: Schema, other_metadata: Schema) -> MultiDbEnv {
    let tmp = tempfile::tempdir().unwrap();
    let default_engine = Arc::new(MemoryEngine::new());
    let other_engine = Arc::new(MemoryEngine::new());

    let stratum = Stratum::builder()
        .named_metadata("default", default_metadata)
        .named_metadata("other", other_metadata)
        .shared_engine("default", default_engine.clone())
        .shared_engine("other", other_engine.clone())
        .build();

    let app = App::builder("multi-app")
        .root_path(tmp.path())
        .settings(Settings::new().script_location("migrations"))
        .build();

    stratum.init_app(&app).await.unwrap();

    MultiDbEnv {
        stratum,
        app,
        default_engine,
        other_engine,
        tmp,
    }
}
