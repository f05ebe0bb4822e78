//! Parameter-spec wrappers
//!
//! Every type deriving from the parameter-spec root is exposed through the
//! single `GObject.ParamSpec` class. Its prototype resolves instance methods
//! from the root's metadata on first use; instances wrap a shared
//! [`ParamSpec`].

use std::sync::Arc;

use gibridge_sdk::{
    native_fn, private_as, BridgeError, BridgeResult, GType, ObjectPrivate, ObjectRef, PropertyFlags,
    Repository, ScriptEngine, ScriptValue,
};

use super::bridge::Bridge;
use super::enumeration::define_enum_static_methods;
use super::gtype::gtype_wrapper;
use super::repo::lookup_namespace_object_by_name;
use crate::counters;

/// Class name of parameter-spec prototypes and instances
pub const PARAM_CLASS: &str = "GObject_ParamSpec";

/// Name of the constructor on the `GObject` namespace
pub const PARAM_CONSTRUCTOR: &str = "ParamSpec";

/// Native parameter spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Property name
    pub name: String,
    /// Type of the values the property holds
    pub value_type: GType,
    /// Type that owns the property
    pub owner_type: GType,
    /// Concrete parameter-spec type, deriving from [`GType::PARAM`]
    pub param_type: GType,
}

impl ParamSpec {
    /// Create a spec
    pub fn new(name: impl Into<String>, param_type: GType, value_type: GType, owner_type: GType) -> Self {
        Self {
            name: name.into(),
            value_type,
            owner_type,
            param_type,
        }
    }
}

struct ParamPrototype {
    bridge: Arc<Bridge>,
}

impl ParamPrototype {
    fn new(bridge: Arc<Bridge>) -> Self {
        counters::PARAM.inc();
        Self { bridge }
    }
}

impl ObjectPrivate for ParamPrototype {
    fn resolve(&self, engine: &dyn ScriptEngine, obj: ObjectRef, name: &str) -> BridgeResult<bool> {
        let Some(info) = self.bridge.repository().find_by_gtype(GType::PARAM) else {
            return Ok(false);
        };
        let Some(method) = info.find_method(name) else {
            return Ok(false);
        };
        if !method.is_method() {
            return Ok(false);
        }

        tracing::debug!(
            target: "gibridge::param",
            "Defining method {} in prototype for GObject.ParamSpec",
            method.name
        );
        self.bridge
            .definers()
            .define_function(engine, &self.bridge, obj, method)?;
        Ok(true)
    }
}

impl Drop for ParamPrototype {
    fn drop(&mut self) {
        counters::PARAM.dec();
    }
}

/// Private data of a parameter-spec instance
pub struct ParamInstance {
    spec: Arc<ParamSpec>,
}

impl ParamInstance {
    fn new(spec: Arc<ParamSpec>) -> Self {
        counters::PARAM.inc();
        Self { spec }
    }

    /// Wrapped spec
    pub fn spec(&self) -> &Arc<ParamSpec> {
        &self.spec
    }
}

impl ObjectPrivate for ParamInstance {}

impl Drop for ParamInstance {
    fn drop(&mut self) {
        counters::PARAM.dec();
    }
}

/// Define the `ParamSpec` class on `in_object`.
///
/// Every parameter-spec type maps onto the same class, so a second call for
/// the same object does nothing.
pub fn define_param_class(engine: &dyn ScriptEngine, bridge: &Arc<Bridge>, in_object: ObjectRef) -> BridgeResult<()> {
    if engine.has_own_property(in_object, PARAM_CONSTRUCTOR) {
        return Ok(());
    }

    let proto = engine.new_object(PARAM_CLASS, None, Some(Arc::new(ParamPrototype::new(bridge.clone()))))?;
    let ctor = engine.new_constructor(
        PARAM_CONSTRUCTOR,
        0,
        proto,
        PARAM_CLASS,
        native_fn(|_, _| {
            Err(BridgeError::TypeError(
                "GObject.ParamSpec cannot be constructed directly; use one of the GObject.ParamSpec factory functions"
                    .into(),
            ))
        }),
    )?;

    let wrapper = gtype_wrapper(engine, bridge.repository(), GType::PARAM)?;
    engine.define_property(ctor, "$gtype", ScriptValue::Object(wrapper), PropertyFlags::PERMANENT)?;
    if let Some(info) = bridge.repository().find_by_gtype(GType::PARAM) {
        define_enum_static_methods(engine, bridge, ctor, &info)?;
    }

    engine.define_property(in_object, PARAM_CONSTRUCTOR, ScriptValue::Object(ctor), PropertyFlags::MODULE)?;
    tracing::debug!(
        target: "gibridge::param",
        "Defined class {} prototype is {:?} in object {:?}",
        PARAM_CONSTRUCTOR,
        proto,
        in_object
    );
    Ok(())
}

fn param_prototype(engine: &dyn ScriptEngine) -> BridgeResult<ObjectRef> {
    let gobject = lookup_namespace_object_by_name(engine, "GObject")?;
    let ctor = engine
        .get_property(gobject, PARAM_CONSTRUCTOR)?
        .as_object()
        .ok_or_else(|| BridgeError::Failed("GObject.ParamSpec is not defined".into()))?;
    engine
        .get_property(ctor, "prototype")?
        .as_object()
        .ok_or_else(|| BridgeError::TypeError("Prototype of GObject.ParamSpec was the wrong type, expected an object".into()))
}

/// Wrap `spec` in a new `GObject.ParamSpec` instance
pub fn param_from_gparam(engine: &dyn ScriptEngine, spec: Arc<ParamSpec>) -> BridgeResult<ObjectRef> {
    tracing::debug!(
        target: "gibridge::param",
        "Wrapping {:?} '{}' on {:?} with script object",
        spec.param_type,
        spec.name,
        spec.owner_type
    );
    let proto = param_prototype(engine)?;
    engine.new_object(PARAM_CLASS, Some(proto), Some(Arc::new(ParamInstance::new(spec))))
}

/// Spec wrapped by `obj`, `None` for the prototype and foreign objects
pub fn gparam_from_param(engine: &dyn ScriptEngine, obj: ObjectRef) -> Option<Arc<ParamSpec>> {
    private_as::<ParamInstance>(engine, obj).map(|instance| instance.spec.clone())
}

/// Check that `obj` wraps a spec of type `expected`.
///
/// `GType::NONE` accepts any spec.
pub fn typecheck_param(
    engine: &dyn ScriptEngine,
    repository: &dyn Repository,
    obj: ObjectRef,
    expected: GType,
) -> BridgeResult<()> {
    if private_as::<ParamPrototype>(engine, obj).is_some() {
        return Err(BridgeError::TypeError(
            "Object is GObject.ParamSpec.prototype, not an object instance - cannot convert to a GObject.ParamSpec instance"
                .into(),
        ));
    }
    let Some(instance) = private_as::<ParamInstance>(engine, obj) else {
        return Err(BridgeError::TypeError(format!(
            "Object is not a GObject.ParamSpec, it's a {}",
            engine.class_name(obj).unwrap_or("collected object")
        )));
    };

    if expected == GType::NONE || repository.type_is_a(instance.spec.param_type, expected) {
        return Ok(());
    }
    let name = |gtype: GType| repository.type_name(gtype).unwrap_or_else(|| format!("{:?}", gtype));
    Err(BridgeError::TypeError(format!(
        "Object is of type {} - cannot convert to {}",
        name(instance.spec.param_type),
        name(expected)
    )))
}
