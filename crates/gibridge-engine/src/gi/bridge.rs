//! Bridge configuration shared by the definer family

use std::fmt;
use std::sync::Arc;

use gibridge_sdk::{BridgeResult, ContextId, ObjectRef, Repository, ScriptEngine};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::definers::{BasicDefiners, TypeDefiners};
use super::repo;
use crate::options::BridgeOptions;

/// Per-namespace hook, run with the namespace object once it is published
pub type OverrideFn = Arc<dyn Fn(&dyn ScriptEngine, ObjectRef) -> BridgeResult<()> + Send + Sync>;

/// The metadata oracle, the definers and the options that every repo and
/// namespace object of an engine share.
pub struct Bridge {
    repository: Arc<dyn Repository>,
    definers: Arc<dyn TypeDefiners>,
    options: BridgeOptions,
    overrides: RwLock<FxHashMap<String, OverrideFn>>,
}

impl Bridge {
    /// Bridge over `repository` with [`BasicDefiners`] and default options
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            definers: Arc::new(BasicDefiners),
            options: BridgeOptions::default(),
            overrides: RwLock::new(FxHashMap::default()),
        }
    }

    /// Replace the definers
    pub fn with_definers(mut self, definers: Arc<dyn TypeDefiners>) -> Self {
        self.definers = definers;
        self
    }

    /// Replace the options
    pub fn with_options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Metadata oracle
    pub fn repository(&self) -> &dyn Repository {
        &*self.repository
    }

    /// Definers for delegated kinds
    pub fn definers(&self) -> &dyn TypeDefiners {
        &*self.definers
    }

    /// Options
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Run `hook` whenever namespace `namespace` is first resolved.
    /// Replaces an earlier hook for the same namespace.
    pub fn register_override(&self, namespace: impl Into<String>, hook: OverrideFn) {
        self.overrides.write().insert(namespace.into(), hook);
    }

    pub(crate) fn override_for(&self, namespace: &str) -> Option<OverrideFn> {
        self.overrides.read().get(namespace).cloned()
    }

    /// Repo object of `cx`, created on first use and kept in the global
    /// object's [`RootSlot::Repository`](gibridge_sdk::RootSlot::Repository)
    /// slot.
    pub fn define_repo(self: &Arc<Self>, engine: &dyn ScriptEngine, cx: ContextId) -> BridgeResult<ObjectRef> {
        repo::define_repo(engine, self, cx)
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("options", &self.options)
            .field("overrides", &self.overrides.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
