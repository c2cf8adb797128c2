//! Single-database workflow scenarios: directory bootstrap, revision
//! creation, branches, queries, and the up/down cycle.

mod common;

use common::{single_db, VERSION_TABLE};
use stratum::{Column, RevisionOptions, RevisionRef, Schema, Table};

fn users_metadata() -> Schema {
    Schema::new().with_table(
        Table::new("users")
            .with_column(Column::new("id", "serial").primary_key())
            .with_column(Column::new("email", "varchar(255)").not_null()),
    )
}

#[tokio::test]
async fn test_mkdir_is_idempotent_and_preserves_edited_template() {
    let env = single_db(Schema::new()).await;
    let ctx = env.app.context();

    let script = env.stratum.script_directory(&env.app).await.unwrap();
    let template_path = script.template_path();

    // init_app already ran mkdir once.
    assert!(template_path.exists());

    env.stratum.mkdir(&env.app).await.unwrap();

    let edited = "-- revision: {{ rev_id }}\n-- message: {{ message }}\n\n-- upgrades\n\n{{ up_sql }}\n\n-- downgrades\n\n{{ down_sql }}\n";
    std::fs::write(&template_path, edited).unwrap();

    env.stratum.mkdir(&env.app).await.unwrap();
    assert_eq!(std::fs::read_to_string(&template_path).unwrap(), edited);

    ctx.close(None).await;
}

#[tokio::test]
async fn test_empty_revision_upgrade_downgrade_cycle() {
    let env = single_db(Schema::new()).await;
    let ctx = env.app.context();

    // Empty revisions never touch the database.
    let scripts = env
        .stratum
        .revision(&env.app, RevisionOptions::new("init").empty(true))
        .await
        .unwrap();
    assert_eq!(scripts.len(), 1);
    assert_eq!(env.engine.open_connections(), 0);

    let rev_id = scripts[0].revision.clone();

    env.stratum.upgrade(&env.app, "heads").await.unwrap();
    let current = env.stratum.current(&env.app).await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].revision, rev_id);

    env.stratum.downgrade(&env.app, -1).await.unwrap();
    assert!(env.stratum.current(&env.app).await.unwrap().is_empty());

    env.stratum.upgrade(&env.app, "heads").await.unwrap();
    let current = env.stratum.current(&env.app).await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].revision, rev_id);

    ctx.close(None).await;
}

#[tokio::test]
async fn test_autogenerated_revision_applies_schema_sql() {
    let env = single_db(users_metadata()).await;
    let ctx = env.app.context();

    let scripts = env
        .stratum
        .revision(&env.app, RevisionOptions::new("create users"))
        .await
        .unwrap();
    assert_eq!(scripts.len(), 1);

    let up = scripts[0].section("upgrades").unwrap();
    assert!(up.contains("CREATE TABLE users"));
    let down = scripts[0].section("downgrades").unwrap();
    assert!(down.contains("DROP TABLE users"));

    env.stratum.upgrade(&env.app, "heads").await.unwrap();

    let statements = env.engine.statements();
    assert!(statements.iter().any(|s| s.contains("CREATE TABLE users")));
    assert_eq!(env.engine.applied(VERSION_TABLE).len(), 1);

    // Once the live schema matches the metadata, the diff is clean.
    env.engine.set_schema(users_metadata());
    let diff = env.stratum.compare_metadata(&env.app).await.unwrap();
    assert!(diff.is_empty());

    ctx.close(None).await;
}

#[tokio::test]
async fn test_new_branch_bootstraps_from_base_regardless_of_parent() {
    let env = single_db(Schema::new()).await;
    let ctx = env.app.context();

    let first = env
        .stratum
        .revision(&env.app, RevisionOptions::new("init").empty(true))
        .await
        .unwrap();
    let first_id = first[0].revision.clone();

    // Even with an explicit parent, a never-before-seen branch is labeled
    // and rooted at base.
    let scripts = env
        .stratum
        .revision(
            &env.app,
            RevisionOptions::new("start billing")
                .empty(true)
                .branch("billing")
                .parent(first_id.as_str()),
        )
        .await
        .unwrap();

    let billing = &scripts[0];
    assert!(billing.is_base());
    assert!(billing.branch_labels.contains("billing"));

    // A second revision on the branch extends it instead of re-rooting.
    let scripts = env
        .stratum
        .revision(
            &env.app,
            RevisionOptions::new("billing tables")
                .empty(true)
                .branch("billing"),
        )
        .await
        .unwrap();
    assert_eq!(scripts[0].down_revisions, vec![billing.revision.clone()]);

    ctx.close(None).await;
}

#[tokio::test]
async fn test_branch_version_location_is_used() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = std::sync::Arc::new(stratum::backend::memory::MemoryEngine::new());

    let stratum = stratum::Stratum::builder()
        .metadata(Schema::new())
        .shared_engine("default", engine.clone())
        .build();

    let app = stratum::App::builder("branch-app")
        .root_path(tmp.path())
        .settings(
            stratum::Settings::new()
                .script_location("migrations")
                .version_location(stratum::VersionLocation::Branch {
                    name: "billing".to_string(),
                    path: std::path::PathBuf::from("migrations/billing"),
                }),
        )
        .build();

    stratum.init_app(&app).await.unwrap();
    let ctx = app.context();

    let scripts = stratum
        .revision(
            &app,
            RevisionOptions::new("start billing")
                .empty(true)
                .branch("billing"),
        )
        .await
        .unwrap();

    assert!(scripts[0]
        .path
        .starts_with(tmp.path().join("migrations/billing")));

    // The branch revision is visible through the extra version location.
    let heads = stratum.heads(&app, false).await.unwrap();
    assert_eq!(heads.len(), 1);

    ctx.close(None).await;
}

#[tokio::test]
async fn test_heads_with_and_without_dependency_resolution() {
    let env = single_db(Schema::new()).await;
    let ctx = env.app.context();

    env.stratum
        .revision(&env.app, RevisionOptions::new("init").empty(true))
        .await
        .unwrap();

    let aux = env
        .stratum
        .revision(
            &env.app,
            RevisionOptions::new("start aux").empty(true).branch("aux"),
        )
        .await
        .unwrap();

    env.stratum
        .revision(
            &env.app,
            RevisionOptions::new("use aux").empty(true).depend("aux"),
        )
        .await
        .unwrap();

    let strict = env.stratum.heads(&env.app, false).await.unwrap();
    assert_eq!(strict.len(), 2);

    // Treating dependencies as down revisions hides the depended-on head.
    let effective = env.stratum.heads(&env.app, true).await.unwrap();
    assert_eq!(effective.len(), 1);
    assert!(!effective
        .iter()
        .any(|rev| rev.revision == aux[0].revision));

    ctx.close(None).await;
}

#[tokio::test]
async fn test_log_order_and_current_bound() {
    let env = single_db(Schema::new()).await;
    let ctx = env.app.context();

    let r1 = env
        .stratum
        .revision(&env.app, RevisionOptions::new("one").empty(true))
        .await
        .unwrap()[0]
        .revision
        .clone();
    let r2 = env
        .stratum
        .revision(&env.app, RevisionOptions::new("two").empty(true))
        .await
        .unwrap()[0]
        .revision
        .clone();

    let log = env.stratum.log(&env.app, "base", "heads").await.unwrap();
    let ids: Vec<_> = log.iter().map(|r| r.revision.clone()).collect();
    assert_eq!(ids, vec![r2.clone(), r1.clone()]);

    // Nothing applied: "current" resolves to the empty set, so the walk
    // still covers everything.
    let log = env.stratum.log(&env.app, "current", "heads").await.unwrap();
    assert_eq!(log.len(), 2);

    env.stratum.upgrade(&env.app, 1).await.unwrap();
    let log = env.stratum.log(&env.app, "current", "heads").await.unwrap();
    let ids: Vec<_> = log.iter().map(|r| r.revision.clone()).collect();
    assert_eq!(ids, vec![r2, r1]);

    ctx.close(None).await;
}

#[tokio::test]
async fn test_stamp_moves_version_without_sql() {
    let env = single_db(Schema::new()).await;
    let ctx = env.app.context();

    let rev = env
        .stratum
        .revision(&env.app, RevisionOptions::new("init").empty(true))
        .await
        .unwrap()[0]
        .revision
        .clone();

    env.stratum.stamp(&env.app, "heads").await.unwrap();

    assert_eq!(env.engine.applied(VERSION_TABLE), vec![rev]);
    assert!(env.engine.statements().is_empty());

    // Stamping back to base clears the record.
    env.stratum.stamp(&env.app, "base").await.unwrap();
    assert!(env.engine.applied(VERSION_TABLE).is_empty());

    ctx.close(None).await;
}

#[tokio::test]
async fn test_merge_joins_heads() {
    let env = single_db(Schema::new()).await;
    let ctx = env.app.context();

    let r1 = env
        .stratum
        .revision(&env.app, RevisionOptions::new("init").empty(true))
        .await
        .unwrap()[0]
        .revision
        .clone();
    let r2 = env
        .stratum
        .revision(
            &env.app,
            RevisionOptions::new("start billing")
                .empty(true)
                .branch("billing"),
        )
        .await
        .unwrap()[0]
        .revision
        .clone();

    assert_eq!(env.stratum.heads(&env.app, false).await.unwrap().len(), 2);

    let merged = env
        .stratum
        .merge(&env.app, "heads", None, Vec::new())
        .await
        .unwrap();

    let mut parents = merged.down_revisions.clone();
    parents.sort();
    let mut expected = vec![r1, r2];
    expected.sort();
    assert_eq!(parents, expected);
    assert!(merged.message.starts_with("merge "));

    // The merge collapses the graph to one head; upgrading lands on it.
    assert_eq!(env.stratum.heads(&env.app, false).await.unwrap().len(), 1);
    env.stratum.upgrade(&env.app, "heads").await.unwrap();
    let current = env.stratum.current(&env.app).await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].revision, merged.revision);

    ctx.close(None).await;
}

#[tokio::test]
async fn test_resolve_current_reflects_applied_state() {
    let env = single_db(Schema::new()).await;
    let ctx = env.app.context();

    env.stratum
        .revision(&env.app, RevisionOptions::new("init").empty(true))
        .await
        .unwrap();

    // Nothing applied yet.
    let resolved = env
        .stratum
        .resolve(&env.app, &RevisionRef::Current, true, false)
        .await
        .unwrap();
    assert!(resolved.is_empty());

    env.stratum.upgrade(&env.app, "heads").await.unwrap();

    let resolved = env
        .stratum
        .resolve(&env.app, &RevisionRef::Current, true, false)
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);

    ctx.close(None).await;
}

#[tokio::test]
async fn test_downgrade_accepts_both_signs() {
    let env = single_db(Schema::new()).await;
    let ctx = env.app.context();

    let r1 = env
        .stratum
        .revision(&env.app, RevisionOptions::new("one").empty(true))
        .await
        .unwrap()[0]
        .revision
        .clone();
    env.stratum
        .revision(&env.app, RevisionOptions::new("two").empty(true))
        .await
        .unwrap();

    env.stratum.upgrade(&env.app, "heads").await.unwrap();

    // A positive downgrade target is made negative by policy.
    env.stratum.downgrade(&env.app, 1).await.unwrap();
    let current = env.stratum.current(&env.app).await.unwrap();
    assert_eq!(current[0].revision, r1);

    env.stratum.upgrade(&env.app, "heads").await.unwrap();
    env.stratum.downgrade(&env.app, -1).await.unwrap();
    let current = env.stratum.current(&env.app).await.unwrap();
    assert_eq!(current[0].revision, r1);

    ctx.close(None).await;
}

#[tokio::test]
async fn test_revision_environment_option_runs_empty_revisions_online() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = std::sync::Arc::new(stratum::backend::memory::MemoryEngine::new());

    let stratum = stratum::Stratum::builder()
        .metadata(Schema::new())
        .shared_engine("default", engine.clone())
        .build();

    let app = stratum::App::builder("env-app")
        .root_path(tmp.path())
        .settings(
            stratum::Settings::new()
                .script_location("migrations")
                .option("revision_environment", "true"),
        )
        .build();

    stratum.init_app(&app).await.unwrap();
    let ctx = app.context();

    stratum
        .revision(&app, RevisionOptions::new("init").empty(true))
        .await
        .unwrap();

    // The generation environment ran, so a context (and its connection) was
    // built even though the revision is empty.
    assert_eq!(engine.open_connections(), 1);

    ctx.close(None).await;
    assert_eq!(engine.open_connections(), 0);
}
