//! Namespace objects
//!
//! A namespace object stands for one loaded namespace. Its members are
//! defined lazily: the first read of an unknown property asks the metadata
//! oracle for a symbol of that name and defines it through
//! [`define_info`](super::repo::define_info). Defined members are permanent,
//! so each symbol is resolved at most once per namespace object.

use std::sync::Arc;

use gibridge_sdk::{
    native_fn, private_as, BridgeResult, ObjectPrivate, ObjectRef, PropertyFlags, ScriptEngine,
    ScriptValue,
};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::bridge::Bridge;
use super::repo::define_info;
use crate::counters;

/// Class name of namespace objects
pub const NAMESPACE_CLASS: &str = "GIRepositoryNamespace";

/// Private data of a namespace object
pub struct Namespace {
    name: String,
    bridge: Arc<Bridge>,
    resolving: Mutex<FxHashSet<String>>,
}

impl Namespace {
    fn new(bridge: Arc<Bridge>, name: &str) -> Self {
        counters::NAMESPACE.inc();
        Self {
            name: name.to_string(),
            bridge,
            resolving: Mutex::new(FxHashSet::default()),
        }
    }

    /// Namespace name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ObjectPrivate for Namespace {
    fn resolve(&self, engine: &dyn ScriptEngine, obj: ObjectRef, name: &str) -> BridgeResult<bool> {
        // Left to the default object behaviour, never looked up.
        if name == "valueOf" || name == "toString" {
            return Ok(false);
        }
        // A lookup of the same symbol from inside its own definition.
        if !self.resolving.lock().insert(name.to_string()) {
            return Ok(false);
        }

        let result = match self.bridge.repository().find_by_name(&self.name, name) {
            Some(info) => {
                tracing::debug!(
                    target: "gibridge::namespace",
                    "Found info type {} for '{}' in namespace '{}'",
                    info.info_type().name(),
                    name,
                    self.name
                );
                define_info(engine, &self.bridge, obj, &info)
            }
            None => Ok(false),
        };

        self.resolving.lock().remove(name);
        result
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        counters::NAMESPACE.dec();
    }
}

/// Prototype shared by the namespace objects of one repo object.
///
/// Carries the `__name__` accessor.
pub fn new_namespace_prototype(engine: &dyn ScriptEngine) -> BridgeResult<ObjectRef> {
    let proto = engine.new_plain_object()?;
    engine.define_accessor(
        proto,
        "__name__",
        native_fn(|engine, call| {
            let this = call.this_object()?;
            Ok(private_as::<Namespace>(engine, this)
                .map(|ns| ScriptValue::string(ns.name()))
                .unwrap_or_default())
        }),
        PropertyFlags::MODULE,
    )?;
    Ok(proto)
}

/// Create the namespace object for `name`
pub fn create_ns(
    engine: &dyn ScriptEngine,
    bridge: &Arc<Bridge>,
    proto: ObjectRef,
    name: &str,
) -> BridgeResult<ObjectRef> {
    let private = Arc::new(Namespace::new(bridge.clone(), name));
    let obj = engine.new_object(NAMESPACE_CLASS, Some(proto), Some(private))?;
    tracing::debug!(target: "gibridge::namespace", namespace = name, ?obj, "created namespace object");
    Ok(obj)
}
