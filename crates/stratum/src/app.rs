//! Host application shim
//!
//! The migration extension scopes its object cache to an application
//! instance with a bounded lifetime. [`App`] is that scope: a cheaply
//! clonable handle carrying the settings, root path, an optional
//! ORM-integration database provider, and a registry of teardown hooks run
//! whenever an application context ends. Workflow operations require an
//! active [`AppContext`]; the guard's close runs every registered hook with
//! the optional in-flight error.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use uuid::Uuid;

use crate::backend::Engine;
use crate::error::StratumError;
use crate::schema::Schema;
use crate::settings::Settings;

/// The ORM-integration extension interface: supplies engines and target
/// metadata per logical database name when they were not given to the
/// migration extension directly.
pub trait DatabaseProvider: Send + Sync + 'static {
    fn engines(&self) -> BTreeMap<String, Arc<dyn Engine>>;
    fn metadatas(&self) -> BTreeMap<String, Schema>;
}

/// A callback invoked when an application context ends
pub trait TeardownHook: Send + Sync + 'static {
    /// Called on a graceful context close, with the in-flight error if the
    /// context ended because of one.
    fn on_teardown<'a>(
        &'a self,
        error: Option<&'a StratumError>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// Called when a context guard is dropped without being closed. Must not
    /// block; best-effort cleanup only.
    fn on_abandon(&self) {}
}

pub(crate) struct AppInner {
    name: String,
    root_path: PathBuf,
    settings: Settings,
    database: Option<Arc<dyn DatabaseProvider>>,
    teardown: Mutex<Vec<Arc<dyn TeardownHook>>>,
    context_depth: AtomicUsize,
    id: Uuid,
}

/// A host application instance; the scope that keys the migration object
/// cache
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    /// Create an app with default settings rooted at the current directory
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> AppBuilder {
        AppBuilder {
            name: name.into(),
            root_path: PathBuf::from("."),
            settings: Settings::default(),
            database: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Stable identity for this app instance
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Relative script and version paths are anchored here
    pub fn root_path(&self) -> &Path {
        &self.inner.root_path
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn database_provider(&self) -> Option<Arc<dyn DatabaseProvider>> {
        self.inner.database.clone()
    }

    /// Register a hook invoked whenever an application context ends
    pub fn on_teardown(&self, hook: Arc<dyn TeardownHook>) {
        self.inner.teardown.lock().unwrap().push(hook);
    }

    /// Enter an application context. Contexts nest; hooks run on every
    /// context close.
    pub fn context(&self) -> AppContext {
        self.inner.context_depth.fetch_add(1, Ordering::SeqCst);
        AppContext {
            app: self.clone(),
            closed: false,
        }
    }

    pub fn has_active_context(&self) -> bool {
        self.inner.context_depth.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn weak(&self) -> Weak<AppInner> {
        Arc::downgrade(&self.inner)
    }

    async fn run_teardown(&self, error: Option<&StratumError>) {
        let hooks: Vec<_> = self.inner.teardown.lock().unwrap().clone();

        for hook in hooks {
            hook.on_teardown(error).await;
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .finish()
    }
}

pub struct AppBuilder {
    name: String,
    root_path: PathBuf,
    settings: Settings,
    database: Option<Arc<dyn DatabaseProvider>>,
}

impl AppBuilder {
    pub fn root_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_path = path.into();
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Attach an ORM-integration database provider
    pub fn database(mut self, provider: impl DatabaseProvider) -> Self {
        self.database = Some(Arc::new(provider));
        self
    }

    pub fn build(self) -> App {
        App {
            inner: Arc::new(AppInner {
                name: self.name,
                root_path: self.root_path,
                settings: self.settings,
                database: self.database,
                teardown: Mutex::new(Vec::new()),
                context_depth: AtomicUsize::new(0),
                id: Uuid::new_v4(),
            }),
        }
    }
}

/// Guard for one application context cycle
///
/// Close it explicitly to run teardown hooks gracefully. Dropping the guard
/// without closing releases resources by drop and logs a warning.
pub struct AppContext {
    app: App,
    closed: bool,
}

impl AppContext {
    pub fn app(&self) -> &App {
        &self.app
    }

    /// End the context, running every registered teardown hook with the
    /// optional in-flight error.
    pub async fn close(mut self, error: Option<&StratumError>) {
        self.closed = true;
        self.app.inner.context_depth.fetch_sub(1, Ordering::SeqCst);
        self.app.run_teardown(error).await;
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        self.app.inner.context_depth.fetch_sub(1, Ordering::SeqCst);
        tracing::warn!(
            app = %self.app.name(),
            "application context dropped without close; releasing resources without graceful close"
        );

        let hooks: Vec<_> = self.app.inner.teardown.lock().unwrap().clone();

        for hook in hooks {
            hook.on_abandon();
        }
    }
}
