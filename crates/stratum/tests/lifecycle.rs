//! Scope cache lifecycle: isolation, memoization, teardown invalidation,
//! and scope reclamation.

mod common;

use std::sync::Arc;

use common::{multi_db, single_db, VERSION_TABLE};
use stratum::backend::memory::MemoryEngine;
use stratum::{App, RevisionOptions, Schema, Settings, Stratum, StratumError};

#[tokio::test]
async fn test_operations_require_active_context() {
    let env = single_db(Schema::new()).await;

    let err = env.stratum.config(&env.app).await.unwrap_err();
    assert!(matches!(err, StratumError::NoActiveContext { .. }));

    let ctx = env.app.context();
    env.stratum.config(&env.app).await.unwrap();
    ctx.close(None).await;

    let err = env.stratum.config(&env.app).await.unwrap_err();
    assert!(matches!(err, StratumError::NoActiveContext { .. }));
}

#[tokio::test]
async fn test_cached_objects_are_built_once_per_scope() {
    let env = single_db(Schema::new()).await;
    let ctx = env.app.context();

    let config_a = env.stratum.config(&env.app).await.unwrap();
    let config_b = env.stratum.config(&env.app).await.unwrap();
    assert!(Arc::ptr_eq(&config_a, &config_b));

    let script_a = env.stratum.script_directory(&env.app).await.unwrap();
    let script_b = env.stratum.script_directory(&env.app).await.unwrap();
    assert!(Arc::ptr_eq(&script_a, &script_b));

    let env_a = env.stratum.environment(&env.app).await.unwrap();
    let env_b = env.stratum.environment(&env.app).await.unwrap();
    assert!(Arc::ptr_eq(&env_a, &env_b));

    let contexts_a = env.stratum.migration_contexts(&env.app).await.unwrap();
    let contexts_b = env.stratum.migration_contexts(&env.app).await.unwrap();
    assert!(Arc::ptr_eq(&contexts_a["default"], &contexts_b["default"]));

    // One connection for the one cached context.
    assert_eq!(env.engine.open_connections(), 1);

    ctx.close(None).await;
}

#[tokio::test]
async fn test_scope_isolation() {
    let stratum = Stratum::builder().run_mkdir(false).build();

    let tmp1 = tempfile::tempdir().unwrap();
    let tmp2 = tempfile::tempdir().unwrap();

    let app1 = App::builder("one")
        .root_path(tmp1.path())
        .settings(Settings::new().script_location("migrations"))
        .build();
    let app2 = App::builder("two")
        .root_path(tmp2.path())
        .settings(Settings::new().script_location("migrations"))
        .build();

    stratum.init_app(&app1).await.unwrap();
    stratum.init_app(&app2).await.unwrap();

    let ctx1 = app1.context();
    let ctx2 = app2.context();

    let config1 = stratum.config(&app1).await.unwrap();
    let config2 = stratum.config(&app2).await.unwrap();

    assert!(!Arc::ptr_eq(&config1, &config2));
    assert_ne!(
        config1.get_main_option("script_location"),
        config2.get_main_option("script_location"),
    );

    ctx1.close(None).await;
    ctx2.close(None).await;
}

#[tokio::test]
async fn test_teardown_clears_transient_state_and_keeps_durable_state() {
    let env = single_db(Schema::new()).await;

    let ctx = env.app.context();
    let config_before = env.stratum.config(&env.app).await.unwrap();
    let script_before = env.stratum.script_directory(&env.app).await.unwrap();
    let (engines_before, metadatas_before) = env.stratum.targets(&env.app).await.unwrap();

    env.stratum
        .revision(&env.app, RevisionOptions::new("init").empty(true))
        .await
        .unwrap();
    env.stratum.upgrade(&env.app, "heads").await.unwrap();

    assert_eq!(env.engine.open_connections(), 1);
    ctx.close(None).await;

    // Teardown closed the context's connection.
    assert_eq!(env.engine.open_connections(), 0);

    // Durable fields survive into the next context cycle untouched.
    let ctx = env.app.context();
    let config_after = env.stratum.config(&env.app).await.unwrap();
    let script_after = env.stratum.script_directory(&env.app).await.unwrap();
    let (engines_after, metadatas_after) = env.stratum.targets(&env.app).await.unwrap();

    assert!(Arc::ptr_eq(&config_before, &config_after));
    assert!(Arc::ptr_eq(&script_before, &script_after));
    assert!(Arc::ptr_eq(&engines_before["default"], &engines_after["default"]));
    assert_eq!(metadatas_before, metadatas_after);

    // Transient state rebuilds on demand and still sees the applied
    // revision.
    let current = env.stratum.current(&env.app).await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(env.engine.open_connections(), 1);

    ctx.close(None).await;
    assert_eq!(env.engine.open_connections(), 0);
}

#[tokio::test]
async fn test_finished_scopes_are_reclaimed() {
    let stratum = Stratum::builder()
        .metadata(Schema::new())
        .shared_engine("default", Arc::new(MemoryEngine::new()))
        .run_mkdir(false)
        .build();

    let tmp = tempfile::tempdir().unwrap();

    {
        let app = App::builder("short-lived")
            .root_path(tmp.path())
            .settings(Settings::new().script_location("migrations"))
            .build();
        stratum.init_app(&app).await.unwrap();

        let ctx = app.context();
        stratum.config(&app).await.unwrap();
        ctx.close(None).await;

        assert_eq!(stratum.tracked_scopes(), 1);
    }

    // The app is gone; its cache entry must not keep it alive.
    assert_eq!(stratum.tracked_scopes(), 0);
}

#[tokio::test]
async fn test_multi_db_teardown_closes_every_connection() {
    let env = multi_db(Schema::new(), Schema::new()).await;

    let ctx = env.app.context();
    env.stratum.migration_contexts(&env.app).await.unwrap();

    assert_eq!(env.default_engine.open_connections(), 1);
    assert_eq!(env.other_engine.open_connections(), 1);

    ctx.close(None).await;

    assert_eq!(env.default_engine.open_connections(), 0);
    assert_eq!(env.other_engine.open_connections(), 0);

    // Version tables stay untouched by a teardown cycle.
    assert!(env.default_engine.applied(VERSION_TABLE).is_empty());
}
