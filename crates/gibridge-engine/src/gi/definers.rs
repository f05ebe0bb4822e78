//! Delegation seam for callable and class definers
//!
//! Functions, object classes, fundamentals, boxed types, unions and
//! interfaces are handed to a [`TypeDefiners`] implementation. Embedders with
//! a real invoker and class machinery plug their own in; [`BasicDefiners`]
//! gives every such symbol a constructor with `$gtype` and its static and
//! prototype methods, and native functions that fail with a clear message
//! when called.

use std::any::Any;
use std::sync::Arc;

use gibridge_sdk::{
    native_fn, BaseInfo, BridgeError, BridgeResult, FunctionInfo, GType, ObjectPrivate, ObjectRef,
    PropertyFlags, ScriptEngine, ScriptValue,
};

use super::bridge::Bridge;
use super::gtype::gtype_wrapper;

/// Definers for the symbol kinds the namespace dispatch delegates.
///
/// Each method defines the symbol as a property of `in_object` (normally a
/// namespace object) with [`PropertyFlags::MODULE`].
pub trait TypeDefiners: Send + Sync {
    /// Define a function. Also used for static and prototype methods.
    fn define_function(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        function: &FunctionInfo,
    ) -> BridgeResult<ObjectRef>;

    /// Define a class deriving from the base object type
    fn define_object_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()>;

    /// Define an instantiatable type with its own fundamental root
    fn define_fundamental_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()>;

    /// Define a struct or boxed type
    fn define_boxed_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()>;

    /// Define a union
    fn define_union_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()>;

    /// Define an interface
    fn define_interface(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()>;
}

/// Private data of instances created by [`BasicDefiners`] constructors, and
/// of plain wrappers around native records
pub struct NativeInstance {
    gtype: GType,
    payload: Arc<dyn Any + Send + Sync>,
}

impl NativeInstance {
    /// Wrap `payload` as an instance of `gtype`
    pub fn new(gtype: GType, payload: Arc<dyn Any + Send + Sync>) -> Self {
        Self { gtype, payload }
    }

    /// Instance type
    pub fn gtype(&self) -> GType {
        self.gtype
    }

    /// Native payload, if it has type `T`
    pub fn payload_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.payload.clone().downcast::<T>().ok()
    }
}

impl ObjectPrivate for NativeInstance {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassKind {
    Object,
    Fundamental,
    Boxed,
    Union,
    Interface,
}

impl ClassKind {
    fn instance_class(self) -> &'static str {
        match self {
            ClassKind::Object => "GObject_Object",
            ClassKind::Fundamental => "GObject_Fundamental",
            ClassKind::Boxed => "GObject_Boxed",
            ClassKind::Union => "GObject_Union",
            ClassKind::Interface => "GObject_Interface",
        }
    }
}

/// Definers without an invoker
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicDefiners;

impl BasicDefiners {
    fn define_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
        kind: ClassKind,
    ) -> BridgeResult<()> {
        let proto = engine.new_object(kind.instance_class(), None, None)?;
        let qualified = info.qualified_name();
        let gtype = info.gtype();
        let ctor = engine.new_constructor(
            info.name(),
            0,
            proto,
            kind.instance_class(),
            native_fn(move |engine, call| {
                if !call.is_construct {
                    return Err(BridgeError::TypeError(format!(
                        "Constructor called as normal method. Use 'new {0}()' not '{0}()'",
                        qualified
                    )));
                }
                if kind == ClassKind::Interface {
                    return Err(BridgeError::TypeError(format!(
                        "{} is an interface and cannot be instantiated",
                        qualified
                    )));
                }
                let this = call.this_object()?;
                engine.set_private_data(this, Arc::new(NativeInstance::new(gtype, Arc::new(()))))?;
                Ok(ScriptValue::Undefined)
            }),
        )?;
        let wrapper = gtype_wrapper(engine, bridge.repository(), gtype)?;
        engine.define_property(ctor, "$gtype", ScriptValue::Object(wrapper), PropertyFlags::PERMANENT)?;
        for method in info.methods() {
            let target = if method.is_method() { proto } else { ctor };
            bridge.definers().define_function(engine, bridge, target, method)?;
        }
        engine.define_property(in_object, info.name(), ScriptValue::Object(ctor), PropertyFlags::MODULE)?;
        tracing::debug!(target: "gibridge::repo", class = %info.qualified_name(), ?kind, "defined class");
        Ok(())
    }
}

impl TypeDefiners for BasicDefiners {
    fn define_function(
        &self,
        engine: &dyn ScriptEngine,
        _bridge: &Bridge,
        in_object: ObjectRef,
        function: &FunctionInfo,
    ) -> BridgeResult<ObjectRef> {
        let name = function.name.clone();
        engine.define_function(
            in_object,
            &function.name,
            function.n_args,
            native_fn(move |_, _| {
                Err(BridgeError::Failed(format!("Function {} has no native invoker", name)))
            }),
            PropertyFlags::MODULE,
        )
    }

    fn define_object_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        self.define_class(engine, bridge, in_object, info, ClassKind::Object)
    }

    fn define_fundamental_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        self.define_class(engine, bridge, in_object, info, ClassKind::Fundamental)
    }

    fn define_boxed_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        self.define_class(engine, bridge, in_object, info, ClassKind::Boxed)
    }

    fn define_union_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        self.define_class(engine, bridge, in_object, info, ClassKind::Union)
    }

    fn define_interface(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        self.define_class(engine, bridge, in_object, info, ClassKind::Interface)
    }
}
