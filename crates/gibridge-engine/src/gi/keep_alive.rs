//! Keep-alive registry
//!
//! A registry anchors script objects to a native lifetime. It holds a set of
//! `(notify, child, data)` triples; every child is reported to the collector
//! while the registry lives, and every notify function runs exactly once when
//! the registry itself is finalized.
//!
//! There is one registry per root object (a context's global or its import
//! global). It lives in the root's [`RootSlot::KeepAlive`] slot, so it is
//! traced for as long as the root is and dies together with it.
//!
//! Mutating a registry while it is being traced or finalized, adding a triple
//! twice and re-entering the trace hook are caller bugs and abort.

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gibridge_sdk::{
    private_as, BridgeError, BridgeResult, ContextId, ObjectPrivate, ObjectRef, RootSlot,
    ScriptEngine, ScriptValue, Tracer,
};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::counters;

/// Class name of registry objects
pub const KEEP_ALIVE_CLASS: &str = "__private_KeepAlive";

/// Opaque per-child data handed back to the notify function
pub type ChildData = Option<Arc<dyn Any + Send + Sync>>;

/// Called once per child when its registry is finalized.
///
/// The child object may already have been collected; only its identity is
/// meaningful at this point.
pub type NotifyFn = fn(&dyn ScriptEngine, ObjectRef, &ChildData);

#[derive(Clone)]
struct Child {
    notify: NotifyFn,
    child: ObjectRef,
    data: ChildData,
}

impl Child {
    fn key(&self) -> (usize, ObjectRef, usize) {
        (self.notify as usize, self.child, data_address(&self.data))
    }
}

fn data_address(data: &ChildData) -> usize {
    data.as_ref()
        .map_or(0, |d| Arc::as_ptr(d) as *const () as usize)
}

impl PartialEq for Child {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Child {}

impl Hash for Child {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Keep-alive registry, the private data of a registry object
pub struct KeepAlive {
    children: Mutex<FxHashSet<Child>>,
    inside_trace: AtomicBool,
    inside_finalize: AtomicBool,
}

impl KeepAlive {
    fn new() -> Self {
        counters::KEEP_ALIVE.inc();
        Self {
            children: Mutex::new(FxHashSet::default()),
            inside_trace: AtomicBool::new(false),
            inside_finalize: AtomicBool::new(false),
        }
    }

    fn assert_mutable(&self) {
        assert!(
            !self.inside_trace.load(Ordering::Acquire),
            "keep-alive registry modified while being traced"
        );
        assert!(
            !self.inside_finalize.load(Ordering::Acquire),
            "keep-alive registry modified while being finalized"
        );
    }

    /// Register a triple.
    ///
    /// # Panics
    ///
    /// If the identical triple is already registered, or the registry is
    /// being traced or finalized.
    pub fn add_child(&self, notify: NotifyFn, child: ObjectRef, data: ChildData) {
        self.assert_mutable();
        let inserted = self.children.lock().insert(Child {
            notify,
            child,
            data,
        });
        assert!(inserted, "keep-alive child {:?} registered twice", child);
        tracing::trace!(target: "gibridge::keep_alive", ?child, "child added");
    }

    /// Unregister a triple. Returns whether it was present.
    ///
    /// # Panics
    ///
    /// If the registry is being traced or finalized.
    pub fn remove_child(&self, notify: NotifyFn, child: ObjectRef, data: &ChildData) -> bool {
        self.assert_mutable();
        let key = Child {
            notify,
            child,
            data: data.clone(),
        };
        let removed = self.children.lock().remove(&key);
        tracing::trace!(target: "gibridge::keep_alive", ?child, removed, "child removed");
        removed
    }

    /// Number of registered triples
    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    /// Whether no triples are registered
    pub fn is_empty(&self) -> bool {
        self.children.lock().is_empty()
    }

    /// Children and data of every triple registered with `notify`
    pub fn children_with_notify(&self, notify: NotifyFn) -> Vec<(ObjectRef, ChildData)> {
        self.children
            .lock()
            .iter()
            .filter(|c| c.notify as usize == notify as usize)
            .map(|c| (c.child, c.data.clone()))
            .collect()
    }

    // ========================================================================
    // Root association
    // ========================================================================

    /// Registry of `root`, created on first use.
    ///
    /// # Panics
    ///
    /// If the registry object cannot be allocated. Continuing without it would
    /// leave every anchored object unprotected.
    pub fn get_or_create_for_root(engine: &dyn ScriptEngine, root: ObjectRef) -> Arc<KeepAlive> {
        if let Some(existing) = Self::get_if_exists_for_root(engine, root) {
            return existing;
        }
        match Self::create_for_root(engine, root) {
            Ok(registry) => registry,
            Err(err) => {
                tracing::error!(target: "gibridge::keep_alive", ?root, "{}", err);
                panic!("could not create keep-alive registry on root object {:?}: {}", root, err);
            }
        }
    }

    fn create_for_root(engine: &dyn ScriptEngine, root: ObjectRef) -> BridgeResult<Arc<KeepAlive>> {
        let registry = Arc::new(KeepAlive::new());
        let obj = engine.new_object(KEEP_ALIVE_CLASS, None, Some(registry.clone()))?;
        engine.set_root_slot(root, RootSlot::KeepAlive, ScriptValue::Object(obj))?;
        tracing::debug!(target: "gibridge::keep_alive", ?root, registry = ?obj, "created keep-alive registry");
        Ok(registry)
    }

    /// Registry of `root`, if one was created
    pub fn get_if_exists_for_root(engine: &dyn ScriptEngine, root: ObjectRef) -> Option<Arc<KeepAlive>> {
        let obj = engine.root_slot(root, RootSlot::KeepAlive)?.as_object()?;
        private_as::<KeepAlive>(engine, obj)
    }

    /// Register a triple on the registry of `cx`'s global object
    pub fn add_global_child(
        engine: &dyn ScriptEngine,
        cx: ContextId,
        notify: NotifyFn,
        child: ObjectRef,
        data: ChildData,
    ) -> BridgeResult<()> {
        let global = live_global(engine, cx)?;
        Self::get_or_create_for_root(engine, global).add_child(notify, child, data);
        Ok(())
    }

    /// Unregister a triple from the registry of `cx`'s global object
    pub fn remove_global_child(
        engine: &dyn ScriptEngine,
        cx: ContextId,
        notify: NotifyFn,
        child: ObjectRef,
        data: &ChildData,
    ) -> BridgeResult<bool> {
        let global = live_global(engine, cx)?;
        Ok(Self::get_if_exists_for_root(engine, global)
            .is_some_and(|registry| registry.remove_child(notify, child, data)))
    }
}

fn live_global(engine: &dyn ScriptEngine, cx: ContextId) -> BridgeResult<ObjectRef> {
    engine
        .global_object(cx)
        .ok_or_else(|| BridgeError::Failed(format!("context {} is not live", cx.0)))
}

impl ObjectPrivate for KeepAlive {
    fn trace(&self, tracer: &mut dyn Tracer) {
        assert!(
            !self.inside_trace.swap(true, Ordering::AcqRel),
            "keep-alive registry traced re-entrantly"
        );
        assert!(
            !self.inside_finalize.load(Ordering::Acquire),
            "keep-alive registry traced while being finalized"
        );
        for child in self.children.lock().iter() {
            tracer.trace_object(child.child, "keep-alive");
        }
        self.inside_trace.store(false, Ordering::Release);
    }

    fn finalize(&self, engine: &dyn ScriptEngine, obj: ObjectRef) {
        tracing::debug!(target: "gibridge::keep_alive", registry = ?obj, children = self.len(), "finalizing keep-alive registry");
        self.inside_finalize.store(true, Ordering::Release);
        loop {
            let next = {
                let mut children = self.children.lock();
                let next = children.iter().next().cloned();
                if let Some(child) = &next {
                    children.remove(child);
                }
                next
            };
            match next {
                Some(child) => (child.notify)(engine, child.child, &child.data),
                None => break,
            }
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        counters::KEEP_ALIVE.dec();
    }
}
