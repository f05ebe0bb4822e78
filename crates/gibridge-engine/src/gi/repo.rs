//! Repo object and the per-kind definition dispatch
//!
//! The repo object is the script-visible entry point to the metadata oracle.
//! Reading an unknown property `Name` on it loads namespace `Name` (at the
//! version pinned in `repo.versions`, if any), publishes a namespace object
//! under that name and then runs the namespace's override hook. Publishing
//! first means a hook that looks the namespace up again finds it instead of
//! recursing.
//!
//! [`define_info`] is the single dispatch point from an info's kind to the
//! component that defines it.

use std::sync::Arc;

use gibridge_sdk::{
    value_from_argument, BaseInfo, BridgeError, BridgeResult, ContextId, GType, InfoType,
    ObjectPrivate, ObjectRef, PropertyFlags, Repository, RootSlot, ScriptEngine, ScriptValue,
    Tracer,
};
use parking_lot::Mutex;

use super::bridge::Bridge;
use super::{enumeration, gerror, ns, param};
use crate::counters;

/// Class name of repo objects
pub const REPO_CLASS: &str = "GIRepository";

/// Property of the repo object holding pinned namespace versions
pub const VERSIONS_PROPERTY: &str = "versions";

/// Property of the repo object holding the private namespace
pub const PRIVATE_NS_PROPERTY: &str = "__privateNS";

// ============================================================================
// Repo object
// ============================================================================

struct RepoPrivate {
    bridge: Arc<Bridge>,
    namespace_prototype: Mutex<Option<ObjectRef>>,
}

impl RepoPrivate {
    fn new(bridge: Arc<Bridge>) -> Self {
        counters::REPO.inc();
        Self {
            bridge,
            namespace_prototype: Mutex::new(None),
        }
    }

    fn namespace_prototype(&self, engine: &dyn ScriptEngine) -> BridgeResult<ObjectRef> {
        if let Some(proto) = *self.namespace_prototype.lock() {
            return Ok(proto);
        }
        let proto = ns::new_namespace_prototype(engine)?;
        *self.namespace_prototype.lock() = Some(proto);
        Ok(proto)
    }

    fn requested_version(
        &self,
        engine: &dyn ScriptEngine,
        repo: ObjectRef,
        namespace: &str,
    ) -> BridgeResult<Option<String>> {
        let Some(versions) = engine.get_property(repo, VERSIONS_PROPERTY)?.as_object() else {
            return Ok(None);
        };
        match engine.get_property(versions, namespace)? {
            ScriptValue::Undefined | ScriptValue::Null => Ok(None),
            version => engine.to_string_utf8(&version).map(Some),
        }
    }

    fn resolve_namespace(&self, engine: &dyn ScriptEngine, repo: ObjectRef, name: &str) -> BridgeResult<bool> {
        let repository = self.bridge.repository();
        let version = self.requested_version(engine, repo, name)?;

        if version.is_none() && self.bridge.options().warn_on_multiple_versions {
            let available = repository.enumerate_versions(name);
            if available.len() > 1 {
                tracing::warn!(
                    target: "gibridge::repo",
                    "Requiring {} but it has {} versions available ({}); pin one in {}.{} to silence this warning",
                    name,
                    available.len(),
                    available.join(", "),
                    REPO_CLASS,
                    VERSIONS_PROPERTY
                );
            }
        }

        repository.require(name, version.as_deref()).map_err(|err| {
            BridgeError::Failed(format!(
                "Requiring {}, version {}: {}",
                name,
                version.as_deref().unwrap_or("none"),
                err
            ))
        })?;

        let proto = self.namespace_prototype(engine)?;
        let namespace = ns::create_ns(engine, &self.bridge, proto, name)?;
        engine.define_property(repo, name, ScriptValue::Object(namespace), PropertyFlags::MODULE)?;
        tracing::debug!(target: "gibridge::repo", namespace = name, version = ?version, "defined namespace");

        if let Some(hook) = self.bridge.override_for(name) {
            hook(engine, namespace)?;
        }
        Ok(true)
    }
}

impl ObjectPrivate for RepoPrivate {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Some(proto) = *self.namespace_prototype.lock() {
            tracer.trace_object(proto, "repo::namespace_prototype");
        }
    }

    fn resolve(&self, engine: &dyn ScriptEngine, obj: ObjectRef, name: &str) -> BridgeResult<bool> {
        if name == "valueOf" || name == "toString" {
            return Ok(false);
        }
        self.resolve_namespace(engine, obj, name)
    }
}

impl Drop for RepoPrivate {
    fn drop(&mut self) {
        counters::REPO.dec();
    }
}

pub(crate) fn define_repo(engine: &dyn ScriptEngine, bridge: &Arc<Bridge>, cx: ContextId) -> BridgeResult<ObjectRef> {
    let global = engine
        .global_object(cx)
        .ok_or_else(|| BridgeError::Failed(format!("context {} is not live", cx.0)))?;
    if let Some(existing) = engine.root_slot(global, RootSlot::Repository).and_then(|v| v.as_object()) {
        return Ok(existing);
    }

    let repo = engine.new_object(REPO_CLASS, None, Some(Arc::new(RepoPrivate::new(bridge.clone()))))?;
    // Root the repo before allocating anything else for it.
    engine.set_root_slot(global, RootSlot::Repository, ScriptValue::Object(repo))?;

    let versions = engine.new_plain_object()?;
    engine.define_property(repo, VERSIONS_PROPERTY, ScriptValue::Object(versions), PropertyFlags::PERMANENT)?;
    for (namespace, version) in &bridge.options().pinned_versions {
        engine.set_property(versions, namespace, ScriptValue::string(version))?;
    }

    let private_ns = engine.new_plain_object()?;
    engine.define_property(repo, PRIVATE_NS_PROPERTY, ScriptValue::Object(private_ns), PropertyFlags::PERMANENT)?;

    tracing::debug!(target: "gibridge::repo", context = cx.0, ?repo, "defined repo object");
    Ok(repo)
}

// ============================================================================
// Dispatch
// ============================================================================

/// What an info becomes on a namespace object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Definable {
    /// Function, through the definers
    Function,
    /// Class deriving from the base object type
    ObjectClass,
    /// The parameter-spec class
    Param,
    /// Instantiatable type with its own fundamental
    Fundamental,
    /// Class or interface struct of another type; not defined
    GTypeStruct,
    /// Struct or boxed type
    Boxed,
    /// Union
    Union,
    /// Enumeration or flag set
    Enumeration,
    /// Error-code enumeration, defined as an error class
    ErrorDomain,
    /// Constant value
    Constant,
    /// Interface
    Interface,
}

/// Decide what `info` becomes.
///
/// Kinds that cannot be namespace members fail with
/// [`BridgeError::Unsupported`]; object types that derive from no known root
/// fail with a TypeError.
pub fn classify(repository: &dyn Repository, info: &BaseInfo) -> BridgeResult<Definable> {
    let definable = match info.info_type() {
        InfoType::Function => Definable::Function,
        InfoType::Object => {
            let gtype = info.gtype();
            if repository.type_is_a(gtype, GType::PARAM) {
                Definable::Param
            } else if repository.type_is_a(gtype, GType::OBJECT) {
                Definable::ObjectClass
            } else if repository.type_is_instantiatable(gtype) {
                Definable::Fundamental
            } else {
                let fundamental = repository.type_fundamental(gtype);
                return Err(BridgeError::TypeError(format!(
                    "Unsupported type {}, deriving from fundamental {}",
                    type_name(repository, gtype),
                    type_name(repository, fundamental)
                )));
            }
        }
        InfoType::Struct if info.is_gtype_struct() => Definable::GTypeStruct,
        InfoType::Struct | InfoType::Boxed => Definable::Boxed,
        InfoType::Union => Definable::Union,
        InfoType::Enum if info.enum_info().is_some_and(|e| e.error_domain.is_some()) => {
            Definable::ErrorDomain
        }
        InfoType::Enum | InfoType::Flags => Definable::Enumeration,
        InfoType::Constant => Definable::Constant,
        InfoType::Interface => Definable::Interface,
        other => {
            return Err(BridgeError::Unsupported {
                kind: other.name(),
                namespace: info.namespace().unwrap_or_default().to_string(),
                name: info.name().to_string(),
            })
        }
    };
    Ok(definable)
}

/// Define `info` as a property of `in_object`.
///
/// Returns `false` for infos that are deliberately not defined.
pub fn define_info(
    engine: &dyn ScriptEngine,
    bridge: &Arc<Bridge>,
    in_object: ObjectRef,
    info: &BaseInfo,
) -> BridgeResult<bool> {
    let definers = bridge.definers();
    match classify(bridge.repository(), info)? {
        Definable::Function => {
            let function = info
                .function_info()
                .ok_or_else(|| BridgeError::Failed(format!("{} has no function details", info.qualified_name())))?;
            definers.define_function(engine, bridge, in_object, function)?;
        }
        Definable::ObjectClass => definers.define_object_class(engine, bridge, in_object, info)?,
        Definable::Param => param::define_param_class(engine, bridge, in_object)?,
        Definable::Fundamental => definers.define_fundamental_class(engine, bridge, in_object, info)?,
        Definable::GTypeStruct => return Ok(false),
        Definable::Boxed => definers.define_boxed_class(engine, bridge, in_object, info)?,
        Definable::Union => definers.define_union_class(engine, bridge, in_object, info)?,
        Definable::Enumeration => enumeration::define_enumeration(engine, bridge, in_object, info)?,
        Definable::ErrorDomain => gerror::define_error_class(engine, bridge, in_object, info)?,
        Definable::Constant => define_constant(engine, in_object, info)?,
        Definable::Interface => definers.define_interface(engine, bridge, in_object, info)?,
    }
    Ok(true)
}

/// Define a constant info as a property of `in_object`
pub fn define_constant(engine: &dyn ScriptEngine, in_object: ObjectRef, info: &BaseInfo) -> BridgeResult<()> {
    let constant = info
        .constant_info()
        .ok_or_else(|| BridgeError::Failed(format!("{} has no constant details", info.qualified_name())))?;
    let loaded = constant.load();
    // SAFETY: `loaded` owns any string the slot points at and outlives the read.
    let value = unsafe { value_from_argument(constant.type_tag, loaded.argument()) }?;
    engine.define_property(in_object, info.name(), value, PropertyFlags::MODULE)
}

fn type_name(repository: &dyn Repository, gtype: GType) -> String {
    repository
        .type_name(gtype)
        .unwrap_or_else(|| format!("{:?}", gtype))
}

// ============================================================================
// Lookups
// ============================================================================

fn repo_object(engine: &dyn ScriptEngine) -> BridgeResult<ObjectRef> {
    let cx = engine
        .current_context()
        .ok_or_else(|| BridgeError::Failed("No current context".into()))?;
    engine
        .global_object(cx)
        .and_then(|global| engine.root_slot(global, RootSlot::Repository))
        .and_then(|repo| repo.as_object())
        .ok_or_else(|| BridgeError::Failed("No repository defined in the current context".into()))
}

/// `foo-bar` style spelling of a camel-case name: `fooBar` gives `foo-bar`
pub fn hyphen_from_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Namespace object called `namespace` in the current context, resolving it
/// if needed
pub fn lookup_namespace_object_by_name(engine: &dyn ScriptEngine, namespace: &str) -> BridgeResult<ObjectRef> {
    let repo = repo_object(engine)?;
    engine
        .get_property(repo, namespace)?
        .as_object()
        .ok_or_else(|| BridgeError::Failed(format!("Namespace '{}' not found", namespace)))
}

/// Namespace object containing `info`
pub fn lookup_namespace_object(engine: &dyn ScriptEngine, info: &BaseInfo) -> BridgeResult<ObjectRef> {
    let namespace = info.namespace().ok_or_else(|| {
        BridgeError::Failed(format!(
            "{} '{}' does not have a namespace",
            info.info_type().name(),
            info.name()
        ))
    })?;
    lookup_namespace_object_by_name(engine, namespace)
}

/// Object for bridge-internal helpers of the current context
pub fn lookup_private_namespace(engine: &dyn ScriptEngine) -> BridgeResult<ObjectRef> {
    let repo = repo_object(engine)?;
    engine
        .get_property(repo, PRIVATE_NS_PROPERTY)?
        .as_object()
        .ok_or_else(|| BridgeError::Failed("Private namespace is missing".into()))
}

/// Constructor defined for `info` on its namespace object
pub fn lookup_generic_constructor(engine: &dyn ScriptEngine, info: &BaseInfo) -> BridgeResult<ObjectRef> {
    let in_object = lookup_namespace_object(engine, info)?;
    engine.get_property(in_object, info.name())?.as_object().ok_or_else(|| {
        BridgeError::TypeError(format!(
            "Constructor of {} was the wrong type, expected an object",
            info.qualified_name()
        ))
    })
}

/// Prototype of the constructor defined for `info`
pub fn lookup_generic_prototype(engine: &dyn ScriptEngine, info: &BaseInfo) -> BridgeResult<ObjectRef> {
    let constructor = lookup_generic_constructor(engine, info)?;
    engine.get_property(constructor, "prototype")?.as_object().ok_or_else(|| {
        BridgeError::TypeError(format!(
            "Prototype of {} was the wrong type, expected an object",
            info.qualified_name()
        ))
    })
}

/// New object of `class` inheriting from the prototype defined for `info`
pub fn new_object_with_generic_prototype(
    engine: &dyn ScriptEngine,
    info: &BaseInfo,
    class: &'static str,
) -> BridgeResult<ObjectRef> {
    let proto = lookup_generic_prototype(engine, info)?;
    engine.new_object(class, Some(proto), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyphen_from_camel() {
        assert_eq!(hyphen_from_camel("fooBarBaz"), "foo-bar-baz");
        assert_eq!(hyphen_from_camel("plain"), "plain");
        assert_eq!(hyphen_from_camel("Leading"), "-leading");
    }
}
