//! The migration extension
//!
//! [`Stratum`] binds the migration toolkit to host application lifecycles:
//! it keeps one lazily-built object cache per app scope (config, script
//! directory, environment, engines/metadata, migration contexts, operations
//! handles), registers the teardown hook that closes live connections when
//! an application context ends, and exposes the migration workflow
//! (queries, stamp, upgrade, downgrade, revision creation, merge, diff) as
//! plain calls over that cache.
//!
//! Scopes are tracked in a registry keyed by app identity holding only weak
//! references, so a finished app is never kept alive by its cache entry.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::app::{App, AppInner, TeardownHook};
use crate::autogen::{
    DatabaseOps, DiffOp, MigrationScript, RevisionContext, RevisionContextOpts,
};
use crate::backend::Engine;
use crate::error::{StratumError, StratumResult};
use crate::ops::Operations;
use crate::rev::RevisionRef;
use crate::runtime::{
    ConfigureOpts, EnvironmentContext, MigrationContext, MigrationPlan, MigrationStep,
};
use crate::schema::Schema;
use crate::script::{templates, Config, GenerateRequest, Revision, ScriptDirectory, SectionContent};

/// The default logical database name
pub const DEFAULT_DATABASE: &str = "default";

type RevIdFn = Box<dyn Fn() -> String + Send + Sync>;

/// Per-scope cached objects.
///
/// `config`, `script`, `env`, `engines`, and `metadatas` are durable for the
/// scope's whole life; `contexts` and `ops` hold live connections and are
/// cleared on every context teardown.
#[derive(Default)]
struct ScopeCache {
    config: Option<Arc<Config>>,
    script: Option<Arc<ScriptDirectory>>,
    env: Option<Arc<EnvironmentContext>>,
    engines: Option<BTreeMap<String, Arc<dyn Engine>>>,
    metadatas: Option<BTreeMap<String, Schema>>,
    contexts: Option<BTreeMap<String, Arc<Mutex<MigrationContext>>>>,
    ops: Option<BTreeMap<String, Operations>>,
}

struct ScopeEntry {
    app: Weak<AppInner>,
    cache: Mutex<ScopeCache>,
}

/// Closes live connections and clears the transient cache fields whenever
/// the owning app's context ends
struct ScopeTeardown {
    entry: Weak<ScopeEntry>,
}

impl TeardownHook for ScopeTeardown {
    fn on_teardown<'a>(
        &'a self,
        error: Option<&'a StratumError>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        let entry = self.entry.upgrade();

        Box::pin(async move {
            let Some(entry) = entry else { return };

            let contexts = {
                let mut cache = entry.cache.lock().await;
                cache.ops = None;
                cache.contexts.take()
            };

            if let Some(contexts) = contexts {
                for (name, ctx) in contexts {
                    let mut guard = ctx.lock().await;

                    // A close failure must not mask the in-flight error.
                    if let Err(close_err) = guard.close().await {
                        tracing::warn!(
                            database = %name,
                            error = %close_err,
                            "failed to close migration context connection during teardown"
                        );
                    }
                }
            }

            if let Some(error) = error {
                tracing::debug!(error = %error, "scope teardown ran with an in-flight error");
            }
        })
    }

    fn on_abandon(&self) {
        let Some(entry) = self.entry.upgrade() else {
            return;
        };

        // Best effort: connections are released by drop.
        let locked = entry.cache.try_lock();
        if let Ok(mut cache) = locked {
            cache.contexts = None;
            cache.ops = None;
        }
    }
}

/// Options for creating a new revision
#[derive(Debug, Clone)]
pub struct RevisionOptions {
    pub message: String,
    /// Skip autogeneration; create a structure-only revision
    pub empty: bool,
    /// Independent branch name; the empty string disables branch handling
    pub branch: String,
    /// Parent revision(s)
    pub parent: RevisionRef,
    /// Allow a non-head parent
    pub splice: bool,
    /// Revision(s) this revision depends on
    pub depend: Option<RevisionRef>,
    /// Labels to apply
    pub labels: Vec<String>,
    /// Where to store the revision script
    pub path: Option<PathBuf>,
}

impl RevisionOptions {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            empty: false,
            branch: DEFAULT_DATABASE.to_string(),
            parent: RevisionRef::Single("head".to_string()),
            splice: false,
            depend: None,
            labels: Vec::new(),
            path: None,
        }
    }

    pub fn empty(mut self, empty: bool) -> Self {
        self.empty = empty;
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn parent(mut self, parent: impl Into<RevisionRef>) -> Self {
        self.parent = parent.into();
        self
    }

    pub fn splice(mut self, splice: bool) -> Self {
        self.splice = splice;
        self
    }

    pub fn depend(mut self, depend: impl Into<RevisionRef>) -> Self {
        self.depend = Some(depend.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Migration environment and workflow API scoped to host applications
pub struct Stratum {
    run_mkdir: bool,
    metadatas: BTreeMap<String, Schema>,
    engines: BTreeMap<String, Arc<dyn Engine>>,
    rev_id_fn: Option<RevIdFn>,
    scopes: StdMutex<HashMap<Uuid, Arc<ScopeEntry>>>,
    last_rev_id: AtomicI64,
}

impl Stratum {
    /// An extension with no explicit engines or metadata; both must then
    /// come from the app's database provider.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> StratumBuilder {
        StratumBuilder {
            run_mkdir: true,
            metadatas: BTreeMap::new(),
            engines: BTreeMap::new(),
            rev_id_fn: None,
        }
    }

    /// Register this extension on an app: installs the context teardown hook
    /// and, unless disabled, bootstraps the script directory.
    pub async fn init_app(&self, app: &App) -> StratumResult<()> {
        let entry = self.entry_for(app);
        app.on_teardown(Arc::new(ScopeTeardown {
            entry: Arc::downgrade(&entry),
        }));

        if self.run_mkdir {
            let ctx = app.context();
            let result = self.mkdir(app).await;
            ctx.close(None).await;
            result?;
        }

        Ok(())
    }

    /// Generate a unique revision id. Uses the current UTC timestamp, made
    /// strictly monotonic per process so rapid successive calls cannot
    /// collide. Override with [`StratumBuilder::rev_id_generator`].
    pub fn rev_id(&self) -> String {
        if let Some(f) = &self.rev_id_fn {
            return f();
        }

        let now = chrono::Utc::now().timestamp();
        let prev = self
            .last_rev_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);

        now.max(prev + 1).to_string()
    }

    // Scope registry

    fn entry_for(&self, app: &App) -> Arc<ScopeEntry> {
        let mut scopes = self.scopes.lock().unwrap();

        // Reclaim entries whose app is gone.
        scopes.retain(|_, entry| entry.app.strong_count() > 0);

        scopes
            .entry(app.id())
            .or_insert_with(|| {
                Arc::new(ScopeEntry {
                    app: app.weak(),
                    cache: Mutex::new(ScopeCache::default()),
                })
            })
            .clone()
    }

    fn entry(&self, app: &App) -> StratumResult<Arc<ScopeEntry>> {
        if !app.has_active_context() {
            return Err(StratumError::NoActiveContext {
                app: app.name().to_string(),
            });
        }

        Ok(self.entry_for(app))
    }

    /// Number of live scope entries; for diagnostics
    pub fn tracked_scopes(&self) -> usize {
        let mut scopes = self.scopes.lock().unwrap();
        scopes.retain(|_, entry| entry.app.strong_count() > 0);
        scopes.len()
    }

    // Durable cached objects

    /// The toolkit config for this scope, built once from the app's settings
    pub async fn config(&self, app: &App) -> StratumResult<Arc<Config>> {
        let entry = self.entry(app)?;
        let mut cache = entry.cache.lock().await;

        if let Some(config) = &cache.config {
            return Ok(config.clone());
        }

        let config = Arc::new(self.build_config(app));
        cache.config = Some(config.clone());
        Ok(config)
    }

    fn build_config(&self, app: &App) -> Config {
        let settings = app.settings();

        let mut script_location = settings.script_location.clone();

        if script_location.is_relative() {
            script_location = app.root_path().join(script_location);
        }

        let mut version_locations = vec![script_location.clone()];

        for location in &settings.version_locations {
            let mut path = location.path().clone();

            if path.is_relative() {
                path = app.root_path().join(path);
            }

            version_locations.push(path);
        }

        let mut config = Config::new();
        config.set_main_option("script_location", script_location.to_string_lossy());
        config.set_main_option(
            "version_locations",
            version_locations
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(","),
        );

        for (key, value) in &settings.options {
            if key == "script_location" || key == "version_locations" {
                continue;
            }

            config.set_main_option(key.clone(), value.clone());
        }

        let names = self.database_names(app);

        if names.len() > 1 {
            config.set_main_option("databases", names.join(", "));
        }

        config
    }

    /// The script directory for this scope
    pub async fn script_directory(&self, app: &App) -> StratumResult<Arc<ScriptDirectory>> {
        let config = self.config(app).await?;
        let entry = self.entry(app)?;
        let mut cache = entry.cache.lock().await;

        if let Some(script) = &cache.script {
            return Ok(script.clone());
        }

        let script = Arc::new(ScriptDirectory::from_config(&config)?);
        cache.script = Some(script.clone());
        Ok(script)
    }

    /// The environment context for this scope
    pub async fn environment(&self, app: &App) -> StratumResult<Arc<EnvironmentContext>> {
        let config = self.config(app).await?;
        let script = self.script_directory(app).await?;
        let entry = self.entry(app)?;
        let mut cache = entry.cache.lock().await;

        if let Some(env) = &cache.env {
            return Ok(env.clone());
        }

        let env = Arc::new(EnvironmentContext::new(config, script));
        cache.env = Some(env.clone());
        Ok(env)
    }

    fn configured_metadatas(&self, app: &App) -> BTreeMap<String, Schema> {
        if !self.metadatas.is_empty() {
            return self.metadatas.clone();
        }

        app.database_provider()
            .map(|provider| provider.metadatas())
            .unwrap_or_default()
    }

    fn database_names(&self, app: &App) -> Vec<String> {
        let names: Vec<String> = self.configured_metadatas(app).keys().cloned().collect();

        if names.is_empty() {
            vec![DEFAULT_DATABASE.to_string()]
        } else {
            names
        }
    }

    fn database_tokens(&self, app: &App) -> Vec<(String, String, String)> {
        let names = self.database_names(app);
        let multi = names.len() > 1;

        names
            .into_iter()
            .map(|name| {
                if multi {
                    let up = format!("{name}_upgrades");
                    let down = format!("{name}_downgrades");
                    (name, up, down)
                } else {
                    (name, "upgrades".to_string(), "downgrades".to_string())
                }
            })
            .collect()
    }

    /// Resolve and cache the engine and metadata maps for this scope
    pub async fn targets(
        &self,
        app: &App,
    ) -> StratumResult<(BTreeMap<String, Arc<dyn Engine>>, BTreeMap<String, Schema>)> {
        let entry = self.entry(app)?;
        let mut cache = entry.cache.lock().await;

        if let (Some(engines), Some(metadatas)) = (&cache.engines, &cache.metadatas) {
            return Ok((engines.clone(), metadatas.clone()));
        }

        let provider = app.database_provider();
        let metadatas = self.configured_metadatas(app);

        if metadatas.is_empty() {
            return Err(StratumError::configuration(
                "no target metadata configured; pass metadatas when building the extension \
                 or attach a database provider to the app",
            ));
        }

        let mut engines = self.engines.clone();

        if engines.is_empty() {
            if let Some(provider) = &provider {
                engines = provider.engines();
            }
        }

        if engines.is_empty() {
            return Err(StratumError::configuration(
                "no engines configured; pass engines when building the extension \
                 or attach a database provider to the app",
            ));
        }

        let missing: Vec<&str> = metadatas
            .keys()
            .filter(|name| !engines.contains_key(*name))
            .map(|name| name.as_str())
            .collect();

        if !missing.is_empty() {
            let plural = if missing.len() == 1 { "config" } else { "configs" };
            return Err(StratumError::configuration(format!(
                "missing engine {} for {}",
                plural,
                missing
                    .iter()
                    .map(|name| format!("'{name}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        cache.engines = Some(engines.clone());
        cache.metadatas = Some(metadatas.clone());
        Ok((engines, metadatas))
    }

    // Transient cached objects

    /// The migration context per logical database for this scope. Each
    /// wraps one open connection, closed when the application context ends.
    pub async fn migration_contexts(
        &self,
        app: &App,
    ) -> StratumResult<BTreeMap<String, Arc<Mutex<MigrationContext>>>> {
        {
            let entry = self.entry(app)?;
            let cache = entry.cache.lock().await;

            if let Some(contexts) = &cache.contexts {
                return Ok(contexts.clone());
            }
        }

        let (engines, metadatas) = self.targets(app).await?;
        let env = self.environment(app).await?;
        let context_settings = app.settings().context.clone();
        let multi = metadatas.len() > 1;
        let mut contexts = BTreeMap::new();

        for (name, metadata) in &metadatas {
            let connection = engines[name].connect().await?;

            // One owned options value per configure call; nothing is shared
            // between databases.
            let mut opts = ConfigureOpts::new(name.clone(), connection, metadata.clone());
            opts.version_table = context_settings.version_table.clone();
            opts.compare_server_default = context_settings.compare_server_default;
            opts.extra = context_settings.options.clone();

            if multi {
                opts = opts.with_database_tokens();
            }

            contexts.insert(name.clone(), Arc::new(Mutex::new(env.configure(opts))));
        }

        let entry = self.entry(app)?;
        let mut cache = entry.cache.lock().await;

        if let Some(existing) = &cache.contexts {
            return Ok(existing.clone());
        }

        cache.contexts = Some(contexts.clone());
        Ok(contexts)
    }

    /// The migration context for the default database
    pub async fn migration_context(
        &self,
        app: &App,
    ) -> StratumResult<Arc<Mutex<MigrationContext>>> {
        self.migration_contexts(app)
            .await?
            .get(DEFAULT_DATABASE)
            .cloned()
            .ok_or_else(|| {
                StratumError::configuration("no 'default' database is configured")
            })
    }

    /// An operations handle per logical database for this scope
    pub async fn operations(&self, app: &App) -> StratumResult<BTreeMap<String, Operations>> {
        let contexts = self.migration_contexts(app).await?;
        let entry = self.entry(app)?;
        let mut cache = entry.cache.lock().await;

        if let Some(ops) = &cache.ops {
            return Ok(ops.clone());
        }

        let ops: BTreeMap<String, Operations> = contexts
            .iter()
            .map(|(name, ctx)| (name.clone(), Operations::new(ctx.clone())))
            .collect();

        cache.ops = Some(ops.clone());
        Ok(ops)
    }

    /// The operations handle for the default database
    pub async fn op(&self, app: &App) -> StratumResult<Operations> {
        self.operations(app)
            .await?
            .get(DEFAULT_DATABASE)
            .cloned()
            .ok_or_else(|| {
                StratumError::configuration("no 'default' database is configured")
            })
    }

    // Revision reference resolution

    /// Normalize a revision reference to plain identifier strings.
    /// `handle_current` expands the `"current"` sentinel from live state;
    /// `handle_relative` reads bare integer strings as signed offsets.
    pub async fn resolve(
        &self,
        app: &App,
        reference: &RevisionRef,
        handle_current: bool,
        handle_relative: bool,
    ) -> StratumResult<Vec<String>> {
        let current = if handle_current && reference.wants_current() {
            let revisions = self.current(app).await?;
            Some(
                revisions
                    .iter()
                    .map(|rev| rev.revision.clone())
                    .collect::<Vec<_>>(),
            )
        } else {
            None
        };

        reference.simplify(current.as_deref(), handle_relative)
    }

    // Execution orchestration

    /// Run a migration plan across every configured database.
    ///
    /// Every context's transaction is entered before any step runs; on full
    /// success each commits in turn, and any failure rolls back every
    /// participant. Contexts execute in name order, which is deterministic
    /// but carries no cross-database meaning. True atomicity across separate
    /// storage engines is not achievable; this is entered-together,
    /// commit-or-roll-back-together coordination.
    pub async fn run_migrations(&self, app: &App, plan: &dyn MigrationPlan) -> StratumResult<()> {
        let contexts = self.migration_contexts(app).await?;

        let mut guards = Vec::with_capacity(contexts.len());

        for (name, ctx) in &contexts {
            guards.push((name.clone(), ctx.lock().await));
        }

        // Enter every transaction before running any step.
        let mut entered = 0;
        let mut failure: Option<StratumError> = None;

        for (name, guard) in guards.iter_mut() {
            match guard.begin_transaction().await {
                Ok(()) => entered += 1,
                Err(e) => {
                    failure = Some(StratumError::transaction(
                        format!("failed to begin transaction for '{name}'"),
                        e,
                    ));
                    break;
                }
            }
        }

        if failure.is_none() {
            for (name, guard) in guards.iter_mut() {
                if let Err(e) = guard.run_migrations(plan).await {
                    failure = Some(StratumError::transaction(
                        format!("migration run failed for '{name}'"),
                        e,
                    ));
                    break;
                }
            }
        }

        match failure {
            None => {
                let mut commit_failure: Option<StratumError> = None;

                for (name, guard) in guards.iter_mut() {
                    if commit_failure.is_none() {
                        if let Err(e) = guard.commit_transaction().await {
                            commit_failure = Some(StratumError::transaction(
                                format!("failed to commit transaction for '{name}'"),
                                e,
                            ));
                        }
                    } else if let Err(e) = guard.rollback_transaction().await {
                        tracing::warn!(
                            database = %name,
                            error = %e,
                            "rollback failed after another database's commit failure"
                        );
                    }
                }

                match commit_failure {
                    None => Ok(()),
                    Some(e) => Err(e),
                }
            }
            Some(error) => {
                for (name, guard) in guards.iter_mut().take(entered) {
                    if let Err(e) = guard.rollback_transaction().await {
                        tracing::warn!(
                            database = %name,
                            error = %e,
                            "rollback failed while unwinding a migration failure"
                        );
                    }
                }

                Err(error)
            }
        }
    }

    // Read-only queries

    /// The script entries recorded as currently applied, across every
    /// configured database
    pub async fn current(&self, app: &App) -> StratumResult<Vec<Arc<Revision>>> {
        let contexts = self.migration_contexts(app).await?;
        let script = self.script_directory(app).await?;

        let mut ids = Vec::new();

        for ctx in contexts.values() {
            let mut guard = ctx.lock().await;
            guard.ensure_version_table().await?;

            for id in guard.get_current_heads().await? {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }

        script.get_revisions(&ids)
    }

    /// Revisions with no child revision.
    ///
    /// With `resolve_dependencies`, dependency edges count as down-revision
    /// edges: a head some other revision depends on is excluded.
    pub async fn heads(
        &self,
        app: &App,
        resolve_dependencies: bool,
    ) -> StratumResult<Vec<Arc<Revision>>> {
        let script = self.script_directory(app).await?;

        if resolve_dependencies {
            script.get_revisions(&["heads".to_string()])
        } else {
            script.get_heads()
        }
    }

    /// Revisions with more than one next revision
    pub async fn branches(&self, app: &App) -> StratumResult<Vec<Arc<Revision>>> {
        let script = self.script_directory(app).await?;
        Ok(script.load_map()?.branch_points())
    }

    /// Revisions between two bounds in the order they will run, newest
    /// first. `"current"` as either bound is expanded from live state.
    pub async fn log(
        &self,
        app: &App,
        start: impl Into<RevisionRef>,
        end: impl Into<RevisionRef>,
    ) -> StratumResult<Vec<Arc<Revision>>> {
        let start = self.resolve(app, &start.into(), true, false).await?;
        let end = self.resolve(app, &end.into(), true, false).await?;
        let script = self.script_directory(app).await?;
        script.walk_revisions(&start, &end)
    }

    // Workflow operations

    /// Set the recorded revision(s) without running migrations
    pub async fn stamp(&self, app: &App, target: impl Into<RevisionRef>) -> StratumResult<()> {
        let targets = self.resolve(app, &target.into(), false, false).await?;
        let script = self.script_directory(app).await?;

        let plan = StampPlan { script, targets };
        self.run_migrations(app, &plan).await
    }

    /// Run migrations up to `target` (default `"heads"`)
    pub async fn upgrade(&self, app: &App, target: impl Into<RevisionRef>) -> StratumResult<()> {
        let targets = self.resolve(app, &target.into(), false, true).await?;
        let script = self.script_directory(app).await?;

        let plan = UpgradePlan { script, targets };
        self.run_migrations(app, &plan).await
    }

    /// Run migrations down to `target` (default `-1`).
    ///
    /// A positive relative target is made negative: `downgrade(1)` is
    /// `downgrade(-1)`. Both signs mean the same thing here; only downward
    /// movement is possible.
    pub async fn downgrade(&self, app: &App, target: impl Into<RevisionRef>) -> StratumResult<()> {
        let mut targets = self.resolve(app, &target.into(), false, true).await?;

        if targets.len() != 1 {
            return Err(StratumError::resolution(
                targets.join(", "),
                "downgrade requires a single target",
            ));
        }

        let mut target = targets.remove(0);

        if let Ok(n) = target.parse::<i64>() {
            target = format!("{:+}", -n.abs());
        }

        let script = self.script_directory(app).await?;

        let plan = DowngradePlan { script, target };
        self.run_migrations(app, &plan).await
    }

    /// Create a new revision. By default, operations are autogenerated by
    /// comparing the target metadata against the live database.
    ///
    /// Returns one script handle per configured database; they reference the
    /// same generated file.
    pub async fn revision(
        &self,
        app: &App,
        options: RevisionOptions,
    ) -> StratumResult<Vec<Arc<Revision>>> {
        let script = self.script_directory(app).await?;
        let config = self.config(app).await?;

        let mut parents = self.resolve(app, &options.parent, false, false).await?;

        let depends_on = match &options.depend {
            Some(depend) => self.resolve(app, depend, false, false).await?,
            None => Vec::new(),
        };

        let mut labels = options.labels.clone();
        let mut path = options.path.clone();

        if !options.branch.is_empty() {
            for item in parents.iter_mut() {
                if item == "base" || item == "head" {
                    *item = format!("{}@{}", options.branch, item);
                }
            }

            if path.is_none() {
                path = app.settings().branch_path(&options.branch).cloned();
            }

            // A resolution failure here means the branch has no revisions
            // yet; anywhere else it propagates.
            let branch_exists = match script.get_revisions(&[options.branch.clone()]) {
                Ok(revisions) => !revisions.is_empty(),
                Err(e) if e.is_resolution() => false,
                Err(e) => return Err(e),
            };

            if !branch_exists {
                // Label the first revision of a separate branch and root it
                // at base.
                labels.insert(0, options.branch.clone());
                parents = vec!["base".to_string()];
            }
        }

        let mut path = path.unwrap_or_else(|| script.dir().to_path_buf());

        if path.is_relative() {
            path = app.root_path().join(path);
        }

        let revision_context = Arc::new(StdMutex::new(RevisionContext::new(
            script.clone(),
            RevisionContextOpts {
                message: options.message.clone(),
                head: parents,
                splice: options.splice,
                branch_labels: labels,
                version_path: Some(path),
                rev_id: self.rev_id(),
                depends_on,
            },
            &self.database_tokens(app),
        )));

        // Autogeneration needs a live connection and model diff; empty
        // revisions skip the environment unless configuration asks for it.
        if !options.empty || config.main_option_bool("revision_environment") {
            let plan = RevisionPlan {
                revision_context: revision_context.clone(),
                empty: options.empty,
            };
            self.run_migrations(app, &plan).await?;
        }

        let scripts = revision_context.lock().unwrap().generate_scripts()?;
        Ok(scripts)
    }

    /// Create a merge revision whose parents are all of `revisions`. Merges
    /// never touch the database.
    pub async fn merge(
        &self,
        app: &App,
        revisions: impl Into<RevisionRef>,
        message: Option<String>,
        labels: Vec<String>,
    ) -> StratumResult<Arc<Revision>> {
        let revisions = self.resolve(app, &revisions.into(), false, false).await?;
        let message = message.unwrap_or_else(|| format!("merge {}", revisions.join(", ")));
        let script = self.script_directory(app).await?;

        let sections: Vec<SectionContent> = self
            .database_tokens(app)
            .iter()
            .map(|(name, up, down)| SectionContent::empty(name, up, down))
            .collect();

        script.generate_revision(GenerateRequest {
            rev_id: self.rev_id(),
            message,
            head: revisions,
            splice: true,
            branch_labels: labels,
            version_path: None,
            depends_on: Vec::new(),
            sections,
        })
    }

    /// Diff every configured database's live schema against its target
    /// metadata
    pub async fn produce_migrations(&self, app: &App) -> StratumResult<MigrationScript> {
        let contexts = self.migration_contexts(app).await?;
        let mut databases = Vec::new();

        for ctx in contexts.values() {
            let mut guard = ctx.lock().await;
            databases.push(crate::autogen::produce_migrations(&mut guard).await?);
        }

        Ok(MigrationScript::new(databases))
    }

    /// The operations a new revision would contain, for a single-database
    /// configuration. With multiple databases, use
    /// [`Stratum::produce_migrations`] and its per-database accessors.
    pub async fn compare_metadata(&self, app: &App) -> StratumResult<Vec<DiffOp>> {
        let script = self.produce_migrations(app).await?;
        let mut databases: Vec<DatabaseOps> = script.into_databases();

        if databases.len() > 1 {
            return Err(StratumError::configuration(
                "multiple databases are configured; use produce_migrations for per-database results",
            ));
        }

        Ok(databases
            .pop()
            .map(|db| db.ops)
            .unwrap_or_default())
    }

    /// Create the script directory and template. Idempotent: existing
    /// directories and a hand-edited template are left untouched.
    pub async fn mkdir(&self, app: &App) -> StratumResult<()> {
        let script = self.script_directory(app).await?;

        let variant = if self.database_names(app).len() > 1 {
            "multidb"
        } else {
            "generic"
        };

        let template = templates::builtin_template(variant).ok_or_else(|| {
            StratumError::directory(format!("template '{variant}' does not exist"))
        })?;

        if !script.dir().exists() {
            std::fs::create_dir_all(script.dir())?;
            tracing::info!(path = %script.dir().display(), "created script directory");
        }

        let template_dest = script.template_path();

        if !template_dest.exists() {
            std::fs::write(&template_dest, template)?;
            tracing::info!(path = %template_dest.display(), "installed script template");
        }

        for location in script.version_locations() {
            if !location.exists() {
                std::fs::create_dir_all(location)?;
            }
        }

        Ok(())
    }
}

impl Default for Stratum {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StratumBuilder {
    run_mkdir: bool,
    metadatas: BTreeMap<String, Schema>,
    engines: BTreeMap<String, Arc<dyn Engine>>,
    rev_id_fn: Option<RevIdFn>,
}

impl StratumBuilder {
    /// Skip or run the directory bootstrap during [`Stratum::init_app`]
    pub fn run_mkdir(mut self, run_mkdir: bool) -> Self {
        self.run_mkdir = run_mkdir;
        self
    }

    /// Register target metadata under the default database name
    pub fn metadata(self, metadata: Schema) -> Self {
        self.named_metadata(DEFAULT_DATABASE, metadata)
    }

    /// Register target metadata for one logical database
    pub fn named_metadata(mut self, name: impl Into<String>, metadata: Schema) -> Self {
        self.metadatas.insert(name.into(), metadata);
        self
    }

    /// Register an engine under the default database name
    pub fn engine(self, engine: impl Engine) -> Self {
        self.named_engine(DEFAULT_DATABASE, engine)
    }

    /// Register an engine for one logical database
    pub fn named_engine(mut self, name: impl Into<String>, engine: impl Engine) -> Self {
        self.engines.insert(name.into(), Arc::new(engine));
        self
    }

    /// Register an already-shared engine for one logical database
    pub fn shared_engine(mut self, name: impl Into<String>, engine: Arc<dyn Engine>) -> Self {
        self.engines.insert(name.into(), engine);
        self
    }

    /// Override revision id generation
    pub fn rev_id_generator(
        mut self,
        f: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.rev_id_fn = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Stratum {
        Stratum {
            run_mkdir: self.run_mkdir,
            metadatas: self.metadatas,
            engines: self.engines,
            rev_id_fn: self.rev_id_fn,
            scopes: StdMutex::new(HashMap::new()),
            last_rev_id: AtomicI64::new(0),
        }
    }
}

// Built-in migration plans

struct StampPlan {
    script: Arc<ScriptDirectory>,
    targets: Vec<String>,
}

impl MigrationPlan for StampPlan {
    fn plan<'a>(
        &'a self,
        applied: &'a [String],
        _ctx: &'a mut MigrationContext,
    ) -> Pin<Box<dyn Future<Output = StratumResult<Vec<MigrationStep>>> + Send + 'a>> {
        Box::pin(async move { self.script.stamp_revs(&self.targets, applied) })
    }
}

struct UpgradePlan {
    script: Arc<ScriptDirectory>,
    targets: Vec<String>,
}

impl MigrationPlan for UpgradePlan {
    fn plan<'a>(
        &'a self,
        applied: &'a [String],
        _ctx: &'a mut MigrationContext,
    ) -> Pin<Box<dyn Future<Output = StratumResult<Vec<MigrationStep>>> + Send + 'a>> {
        Box::pin(async move { self.script.upgrade_revs(&self.targets, applied) })
    }
}

struct DowngradePlan {
    script: Arc<ScriptDirectory>,
    target: String,
}

impl MigrationPlan for DowngradePlan {
    fn plan<'a>(
        &'a self,
        applied: &'a [String],
        _ctx: &'a mut MigrationContext,
    ) -> Pin<Box<dyn Future<Output = StratumResult<Vec<MigrationStep>>> + Send + 'a>> {
        Box::pin(async move { self.script.downgrade_revs(&self.target, applied) })
    }
}

struct RevisionPlan {
    revision_context: Arc<StdMutex<RevisionContext>>,
    empty: bool,
}

impl MigrationPlan for RevisionPlan {
    fn plan<'a>(
        &'a self,
        _applied: &'a [String],
        ctx: &'a mut MigrationContext,
    ) -> Pin<Box<dyn Future<Output = StratumResult<Vec<MigrationStep>>> + Send + 'a>> {
        Box::pin(async move {
            if self.empty {
                self.revision_context
                    .lock()
                    .unwrap()
                    .run_no_autogenerate(ctx);
            } else {
                let live = ctx.inspect().await?;
                self.revision_context
                    .lock()
                    .unwrap()
                    .run_autogenerate(&live, ctx);
            }

            Ok(Vec::new())
        })
    }
}
