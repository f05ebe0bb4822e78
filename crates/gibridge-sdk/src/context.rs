//! ScriptEngine trait: abstract script engine operations
//!
//! Defines the interface that a script engine implements for the binding
//! layer. The closure bridge, the keep-alive registry and the definer family
//! program against this trait without depending on engine internals.
//!
//! Implementations must not hold internal locks while they call back into
//! native code (native functions, accessors, resolve hooks, finalizers):
//! those callbacks re-enter the engine.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::value::{ObjectRef, ScriptValue};

// ============================================================================
// Identifiers
// ============================================================================

/// Identity of an execution context (realm)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

/// Identity of a script engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeId(pub u32);

/// Handle to a persistent root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(pub u64);

/// Reserved per-root storage slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootSlot {
    /// The keep-alive registry object
    KeepAlive,
    /// The repository object
    Repository,
}

bitflags::bitflags! {
    /// Property attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyFlags: u8 {
        /// Assignment fails
        const READONLY = 1 << 0;
        /// Cannot be deleted or redefined
        const PERMANENT = 1 << 1;
        /// Shows up in key enumeration
        const ENUMERATE = 1 << 2;
        /// Attributes of properties exposed on namespace-like objects
        const MODULE = Self::PERMANENT.bits() | Self::ENUMERATE.bits();
    }
}

// ============================================================================
// Native functions
// ============================================================================

/// Arguments of a native function call
#[derive(Debug, Clone)]
pub struct CallArgs<'a> {
    /// `this` value
    pub this: ScriptValue,
    /// Positional arguments
    pub args: &'a [ScriptValue],
    /// The function object being called
    pub callee: ObjectRef,
    /// Whether invoked with `new`
    pub is_construct: bool,
}

impl CallArgs<'_> {
    /// Argument `index`, `undefined` when missing
    pub fn get(&self, index: usize) -> ScriptValue {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Number of arguments passed
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether no arguments were passed
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// `this` as an object
    pub fn this_object(&self) -> BridgeResult<ObjectRef> {
        self.this
            .as_object()
            .ok_or_else(|| BridgeError::TypeError(format!("Expected an object as this, got {}", self.this.type_name())))
    }
}

/// Native function callable from script
pub type NativeFunction =
    Arc<dyn Fn(&dyn ScriptEngine, &CallArgs<'_>) -> BridgeResult<ScriptValue> + Send + Sync>;

/// Wrap a closure as a [`NativeFunction`]
pub fn native_fn<F>(f: F) -> NativeFunction
where
    F: Fn(&dyn ScriptEngine, &CallArgs<'_>) -> BridgeResult<ScriptValue> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ============================================================================
// Object private data
// ============================================================================

/// Visitor handed to [`ObjectPrivate::trace`] during marking
pub trait Tracer {
    /// Report a strong edge to `obj`
    fn trace_object(&mut self, obj: ObjectRef, name: &'static str);

    /// Report a strong edge to a value, if it is an object
    fn trace_value(&mut self, value: &ScriptValue, name: &'static str) {
        if let ScriptValue::Object(obj) = value {
            self.trace_object(*obj, name);
        }
    }
}

/// Downcasting support for [`ObjectPrivate`]
pub trait AsAny: Any + Send + Sync {
    /// Borrow as `Any`
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared handle to `Any`
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Native state attached to a script object.
///
/// The engine calls these hooks without holding any of its own locks.
pub trait ObjectPrivate: AsAny {
    /// Report objects this state keeps alive
    fn trace(&self, _tracer: &mut dyn Tracer) {}

    /// The owning object was collected. `obj` is no longer valid.
    fn finalize(&self, _engine: &dyn ScriptEngine, _obj: ObjectRef) {}

    /// Lazily define property `name` on `obj`.
    ///
    /// Returns whether a property was defined.
    fn resolve(&self, _engine: &dyn ScriptEngine, _obj: ObjectRef, _name: &str) -> BridgeResult<bool> {
        Ok(false)
    }
}

/// Downcast private data to a concrete type
pub fn downcast_private<T: ObjectPrivate>(private: Arc<dyn ObjectPrivate>) -> Option<Arc<T>> {
    private.into_any().downcast::<T>().ok()
}

/// Private data of `obj`, if it has the concrete type `T`
pub fn private_as<T: ObjectPrivate>(engine: &dyn ScriptEngine, obj: ObjectRef) -> Option<Arc<T>> {
    engine.private_data(obj).and_then(downcast_private::<T>)
}

impl fmt::Debug for dyn ObjectPrivate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ObjectPrivate")
    }
}

// ============================================================================
// Coercion
// ============================================================================

/// Value coercions. Defaults cover primitives; objects are not convertible.
pub trait Coercion {
    /// ToNumber
    fn to_number(&self, value: &ScriptValue) -> BridgeResult<f64> {
        value
            .to_number()
            .ok_or_else(|| BridgeError::not_convertible("number", value))
    }

    /// ToInt32
    fn to_int32(&self, value: &ScriptValue) -> BridgeResult<i32> {
        value
            .to_int32()
            .ok_or_else(|| BridgeError::not_convertible("number", value))
    }

    /// ToUint32
    fn to_uint32(&self, value: &ScriptValue) -> BridgeResult<u32> {
        value
            .to_uint32()
            .ok_or_else(|| BridgeError::not_convertible("number", value))
    }

    /// ToString, as UTF-8
    fn to_string_utf8(&self, value: &ScriptValue) -> BridgeResult<String> {
        match value {
            ScriptValue::String(s) => Ok(s.to_string()),
            ScriptValue::Object(_) => Err(BridgeError::not_convertible("string", value)),
            other => Ok(other.to_string()),
        }
    }
}

// ============================================================================
// ScriptEngine
// ============================================================================

/// Abstract script engine.
///
/// This trait is the single entry point the binding layer uses. The engine
/// crate provides the concrete implementation (`Runtime`).
pub trait ScriptEngine: Coercion {
    /// Identity of this engine instance
    fn runtime_id(&self) -> RuntimeId;

    // ========================================================================
    // Contexts
    // ========================================================================

    /// Innermost entered context
    fn current_context(&self) -> Option<ContextId>;

    /// All live contexts
    fn live_contexts(&self) -> Vec<ContextId>;

    /// Whether `cx` is still alive. Linear in the number of live contexts.
    fn is_context_live(&self, cx: ContextId) -> bool {
        self.live_contexts().contains(&cx)
    }

    /// Make `cx` current. Returns `false` for dead contexts.
    fn enter_context(&self, cx: ContextId) -> bool;

    /// Undo the innermost [`enter_context`](Self::enter_context)
    fn leave_context(&self);

    /// Global object of `cx`
    fn global_object(&self, cx: ContextId) -> Option<ObjectRef>;

    /// Global used for module imports in `cx`
    fn import_global(&self, cx: ContextId) -> Option<ObjectRef>;

    /// Read a reserved slot of a root object
    fn root_slot(&self, root: ObjectRef, slot: RootSlot) -> Option<ScriptValue>;

    /// Write a reserved slot of a root object. Slot values are traced.
    fn set_root_slot(&self, root: ObjectRef, slot: RootSlot, value: ScriptValue) -> BridgeResult<()>;

    // ========================================================================
    // Objects
    // ========================================================================

    /// Allocate an ordinary object
    fn new_plain_object(&self) -> BridgeResult<ObjectRef>;

    /// Allocate an object of `class` with a prototype and private data
    fn new_object(
        &self,
        class: &'static str,
        proto: Option<ObjectRef>,
        private: Option<Arc<dyn ObjectPrivate>>,
    ) -> BridgeResult<ObjectRef>;

    /// Allocate a native function object
    fn new_function(&self, name: &str, nargs: u32, f: NativeFunction) -> BridgeResult<ObjectRef>;

    /// Allocate a constructor whose instances are of `instance_class` and
    /// inherit from `proto`. Links `prototype` and `constructor`.
    fn new_constructor(
        &self,
        name: &str,
        nargs: u32,
        proto: ObjectRef,
        instance_class: &'static str,
        f: NativeFunction,
    ) -> BridgeResult<ObjectRef>;

    /// Whether `obj` still refers to a live object
    fn is_alive(&self, obj: ObjectRef) -> bool;

    /// Class name of `obj`
    fn class_name(&self, obj: ObjectRef) -> Option<&'static str>;

    /// Private data of `obj`
    fn private_data(&self, obj: ObjectRef) -> Option<Arc<dyn ObjectPrivate>>;

    /// Attach private data to `obj`, replacing any previous value
    fn set_private_data(&self, obj: ObjectRef, private: Arc<dyn ObjectPrivate>) -> BridgeResult<()>;

    /// Prototype of `obj`
    fn prototype_of(&self, obj: ObjectRef) -> Option<ObjectRef>;

    /// Define a data property
    fn define_property(
        &self,
        obj: ObjectRef,
        name: &str,
        value: ScriptValue,
        flags: PropertyFlags,
    ) -> BridgeResult<()>;

    /// Define a getter-only accessor property
    fn define_accessor(
        &self,
        obj: ObjectRef,
        name: &str,
        getter: NativeFunction,
        flags: PropertyFlags,
    ) -> BridgeResult<()>;

    /// Define a native function as a property of `obj`
    fn define_function(
        &self,
        obj: ObjectRef,
        name: &str,
        nargs: u32,
        f: NativeFunction,
        flags: PropertyFlags,
    ) -> BridgeResult<ObjectRef> {
        let function = self.new_function(name, nargs, f)?;
        self.define_property(obj, name, ScriptValue::Object(function), flags)?;
        Ok(function)
    }

    /// Property lookup along the prototype chain, running resolve hooks
    fn get_property(&self, obj: ObjectRef, name: &str) -> BridgeResult<ScriptValue>;

    /// Assignment
    fn set_property(&self, obj: ObjectRef, name: &str, value: ScriptValue) -> BridgeResult<()>;

    /// Own property check without running resolve hooks
    fn has_own_property(&self, obj: ObjectRef, name: &str) -> bool;

    /// Delete an own property. Returns `false` for permanent properties.
    fn delete_property(&self, obj: ObjectRef, name: &str) -> BridgeResult<bool>;

    /// Enumerable own property names in definition order
    fn own_property_names(&self, obj: ObjectRef) -> Vec<String>;

    // ========================================================================
    // Calls
    // ========================================================================

    /// Whether `value` can be called
    fn is_callable(&self, value: &ScriptValue) -> bool;

    /// Call `callee`. Every failure comes back as [`BridgeError::Exception`].
    fn call_function(
        &self,
        this: ScriptValue,
        callee: &ScriptValue,
        args: &[ScriptValue],
    ) -> BridgeResult<ScriptValue>;

    /// `new ctor(...args)`
    fn construct(&self, ctor: &ScriptValue, args: &[ScriptValue]) -> BridgeResult<ObjectRef>;

    // ========================================================================
    // Rooting and collection
    // ========================================================================

    /// Keep `obj` alive until [`remove_root`](Self::remove_root)
    fn add_root(&self, obj: ObjectRef, name: &'static str) -> RootId;

    /// Drop a persistent root
    fn remove_root(&self, id: RootId);

    /// Run a collection if allocation pressure warrants one
    fn schedule_gc_if_needed(&self);

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Whether an exception is pending
    fn is_exception_pending(&self) -> bool;

    /// Make `value` the pending exception
    fn set_pending_exception(&self, value: ScriptValue);

    /// Take the pending exception
    fn take_pending_exception(&self) -> Option<ScriptValue>;

    /// Log an exception through the engine's reporter
    fn report_exception(&self, value: &ScriptValue);

    /// Report and clear the pending exception. Returns whether there was one.
    fn log_pending_exception(&self) -> bool {
        match self.take_pending_exception() {
            Some(value) => {
                self.report_exception(&value);
                true
            }
            None => false,
        }
    }

    /// Script value representing `err` (an error object for native errors)
    fn error_value(&self, err: &BridgeError) -> ScriptValue;
}

/// Scoped context entry: leaves the context when dropped.
pub struct AutoContext<'a> {
    engine: &'a dyn ScriptEngine,
}

impl<'a> AutoContext<'a> {
    /// Enter `cx`, or return `None` if it is dead
    pub fn enter(engine: &'a dyn ScriptEngine, cx: ContextId) -> Option<Self> {
        engine.enter_context(cx).then_some(AutoContext { engine })
    }
}

impl Drop for AutoContext<'_> {
    fn drop(&mut self) {
        self.engine.leave_context();
    }
}
