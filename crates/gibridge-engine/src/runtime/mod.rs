//! Reference script runtime
//!
//! A small in-process object model implementing [`ScriptEngine`]: objects with
//! ordered properties and prototypes, native functions and constructors,
//! execution contexts with their globals, persistent roots and a mark-sweep
//! collector that drives the trace and finalize hooks of private data.
//!
//! Collection only happens at explicit safepoints: [`Runtime::gc`] and
//! [`ScriptEngine::schedule_gc_if_needed`]. Objects held only by native locals
//! must be rooted across those calls.

mod collector;
mod context;
mod heap;
mod roots;

pub use collector::GcStats;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use gibridge_sdk::{
    BridgeError, BridgeResult, CallArgs, Coercion, ContextId, NativeFunction, ObjectPrivate,
    ObjectRef, PropertyFlags, RootId, RootSlot, RuntimeId, ScriptEngine, ScriptValue,
};
use parking_lot::{Mutex, RwLock};

use crate::options::{OptionsError, RuntimeOptions};
use context::{ContextRegistry, ExecutionContext};
use heap::{Callable, Heap, HeapObject, Property, PropertyValue};
use roots::RootSet;

static NEXT_RUNTIME_ID: AtomicU32 = AtomicU32::new(1);

/// Script runtime
pub struct Runtime {
    id: RuntimeId,
    options: RuntimeOptions,
    heap: Mutex<Heap>,
    contexts: RwLock<ContextRegistry>,
    context_stack: Mutex<Vec<ContextId>>,
    roots: Mutex<RootSet>,
    pending_exception: Mutex<Option<ScriptValue>>,
    reported: Mutex<Vec<ScriptValue>>,
    stats: Mutex<GcStats>,
    collecting: AtomicBool,
}

impl Runtime {
    /// Create a runtime with default options
    pub fn new() -> Self {
        Self::build(RuntimeOptions::default())
    }

    /// Create a runtime with custom options
    pub fn with_options(options: RuntimeOptions) -> Result<Self, OptionsError> {
        options.validate()?;
        Ok(Self::build(options))
    }

    fn build(options: RuntimeOptions) -> Self {
        Self {
            id: RuntimeId(NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed)),
            heap: Mutex::new(Heap::new(options.max_objects)),
            options,
            contexts: RwLock::new(ContextRegistry::new()),
            context_stack: Mutex::new(Vec::new()),
            roots: Mutex::new(RootSet::new()),
            pending_exception: Mutex::new(None),
            reported: Mutex::new(Vec::new()),
            stats: Mutex::new(GcStats::default()),
            collecting: AtomicBool::new(false),
        }
    }

    /// Runtime options
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    /// Create a context. The first context created becomes current.
    pub fn create_context(&self) -> BridgeResult<ContextId> {
        let global = self.allocate(HeapObject::new("GlobalObject", None))?;
        let import_global = self.allocate(HeapObject::new("ImportGlobal", None))?;
        let id = {
            let mut contexts = self.contexts.write();
            let id = contexts.next_id();
            contexts.insert(ExecutionContext {
                id,
                global,
                import_global,
            });
            id
        };
        {
            let mut stack = self.context_stack.lock();
            if stack.is_empty() {
                stack.push(id);
            }
        }
        tracing::debug!(target: "gibridge::gc", context = id.0, "context created");
        Ok(id)
    }

    /// Destroy a context. Its globals stop being roots.
    pub fn destroy_context(&self, cx: ContextId) -> bool {
        let removed = self.contexts.write().remove(cx).is_some();
        if removed {
            self.context_stack.lock().retain(|c| *c != cx);
            tracing::debug!(target: "gibridge::gc", context = cx.0, "context destroyed");
        }
        removed
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Run a full collection. Returns the number of objects freed.
    ///
    /// A collection requested from inside a finalizer is skipped.
    pub fn gc(&self) -> usize {
        if self.collecting.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let freed = collector::collect(self);
        self.collecting.store(false, Ordering::Release);
        freed
    }

    /// Collection statistics
    pub fn gc_stats(&self) -> GcStats {
        self.stats.lock().clone()
    }

    /// Number of live heap objects
    pub fn object_count(&self) -> usize {
        self.heap.lock().live_count()
    }

    pub(crate) fn root_objects(&self) -> Vec<ObjectRef> {
        let mut out: Vec<ObjectRef> = Vec::new();
        for context in self.contexts.read().iter() {
            out.push(context.global);
            out.push(context.import_global);
        }
        out.extend(self.roots.lock().iter());
        if let Some(ScriptValue::Object(obj)) = &*self.pending_exception.lock() {
            out.push(*obj);
        }
        out
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Exceptions passed to [`ScriptEngine::report_exception`] so far
    pub fn reported_exceptions(&self) -> Vec<ScriptValue> {
        self.reported.lock().clone()
    }

    /// Drain the reported exceptions
    pub fn take_reported_exceptions(&self) -> Vec<ScriptValue> {
        std::mem::take(&mut *self.reported.lock())
    }

    /// `message` of an error object, without running any script hooks
    pub fn error_message(&self, value: &ScriptValue) -> Option<String> {
        self.own_data_string(value.as_object()?, "message")
    }

    fn own_data_string(&self, obj: ObjectRef, name: &str) -> Option<String> {
        let heap = self.heap.lock();
        match &heap.get(obj)?.properties.get(name)?.value {
            PropertyValue::Data(ScriptValue::String(s)) => Some(s.to_string()),
            _ => None,
        }
    }

    fn describe(&self, value: &ScriptValue) -> String {
        match value.as_object() {
            Some(obj) => {
                let name = self.own_data_string(obj, "name").unwrap_or_else(|| "Error".into());
                match self.own_data_string(obj, "message") {
                    Some(message) => format!("{}: {}", name, message),
                    None => format!("{} {:?}", name, obj),
                }
            }
            None => value.to_string(),
        }
    }

    fn make_error_object(&self, name: &str, message: &str) -> BridgeResult<ObjectRef> {
        let mut object = HeapObject::new("Error", None);
        for (key, value) in [("name", name), ("message", message)] {
            object.properties.insert(
                key,
                Property {
                    value: PropertyValue::Data(ScriptValue::string(value)),
                    flags: PropertyFlags::empty(),
                },
            );
        }
        self.allocate(object)
    }

    /// Turn any error escaping a native call into a thrown value
    fn into_exception(&self, err: BridgeError) -> BridgeError {
        match err {
            BridgeError::Exception(value) => BridgeError::Exception(value),
            other => BridgeError::Exception(self.error_value(&other)),
        }
    }

    // ========================================================================
    // Heap helpers
    // ========================================================================

    fn allocate(&self, object: HeapObject) -> BridgeResult<ObjectRef> {
        self.heap.lock().allocate(object)
    }

    fn lookup_own(&self, obj: ObjectRef, name: &str) -> BridgeResult<Option<PropertyValue>> {
        let heap = self.heap.lock();
        Ok(heap.expect(obj)?.properties.get(name).map(|p| p.value.clone()))
    }

    /// Own lookup, giving the object's resolve hook a chance to define `name`
    fn lookup_own_resolving(&self, obj: ObjectRef, name: &str) -> BridgeResult<Option<PropertyValue>> {
        if let Some(value) = self.lookup_own(obj, name)? {
            return Ok(Some(value));
        }
        let private = self.heap.lock().expect(obj)?.private.clone();
        if let Some(private) = private {
            if private.resolve(self, obj, name)? {
                return self.lookup_own(obj, name);
            }
        }
        Ok(None)
    }

    fn callable_of(&self, value: &ScriptValue) -> Option<(ObjectRef, Callable)> {
        let obj = value.as_object()?;
        let heap = self.heap.lock();
        let callable = heap.get(obj)?.callable.clone()?;
        Some((obj, callable))
    }

    fn define(&self, obj: ObjectRef, name: &str, property: Property) -> BridgeResult<()> {
        let mut heap = self.heap.lock();
        let object = heap.expect_mut(obj)?;
        if let Some(existing) = object.properties.get(name) {
            if existing.flags.contains(PropertyFlags::PERMANENT) {
                return Err(BridgeError::TypeError(format!(
                    "can't redefine non-configurable property \"{}\"",
                    name
                )));
            }
        }
        object.properties.insert(name, property);
        Ok(())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Tear down so that every finalizer runs.
        self.contexts.write().drain();
        self.context_stack.lock().clear();
        self.roots.lock().clear();
        self.pending_exception.lock().take();
        self.gc();
    }
}

impl Coercion for Runtime {}

impl ScriptEngine for Runtime {
    fn runtime_id(&self) -> RuntimeId {
        self.id
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    fn current_context(&self) -> Option<ContextId> {
        self.context_stack.lock().last().copied()
    }

    fn live_contexts(&self) -> Vec<ContextId> {
        self.contexts.read().ids()
    }

    fn enter_context(&self, cx: ContextId) -> bool {
        if !self.is_context_live(cx) {
            return false;
        }
        self.context_stack.lock().push(cx);
        true
    }

    fn leave_context(&self) {
        self.context_stack.lock().pop();
    }

    fn global_object(&self, cx: ContextId) -> Option<ObjectRef> {
        self.contexts.read().get(cx).map(|c| c.global)
    }

    fn import_global(&self, cx: ContextId) -> Option<ObjectRef> {
        self.contexts.read().get(cx).map(|c| c.import_global)
    }

    fn root_slot(&self, root: ObjectRef, slot: RootSlot) -> Option<ScriptValue> {
        self.heap.lock().get(root)?.slots.get(&slot).cloned()
    }

    fn set_root_slot(&self, root: ObjectRef, slot: RootSlot, value: ScriptValue) -> BridgeResult<()> {
        self.heap.lock().expect_mut(root)?.slots.insert(slot, value);
        Ok(())
    }

    // ========================================================================
    // Objects
    // ========================================================================

    fn new_plain_object(&self) -> BridgeResult<ObjectRef> {
        self.allocate(HeapObject::new("Object", None))
    }

    fn new_object(
        &self,
        class: &'static str,
        proto: Option<ObjectRef>,
        private: Option<Arc<dyn ObjectPrivate>>,
    ) -> BridgeResult<ObjectRef> {
        let mut object = HeapObject::new(class, proto);
        object.private = private;
        self.allocate(object)
    }

    fn new_function(&self, name: &str, nargs: u32, f: NativeFunction) -> BridgeResult<ObjectRef> {
        let mut object = HeapObject::new("Function", None);
        object.properties.insert(
            "name",
            Property {
                value: PropertyValue::Data(ScriptValue::string(name)),
                flags: PropertyFlags::READONLY,
            },
        );
        object.callable = Some(Callable {
            name: name.to_string(),
            nargs,
            function: f,
            instance_class: None,
        });
        self.allocate(object)
    }

    fn new_constructor(
        &self,
        name: &str,
        nargs: u32,
        proto: ObjectRef,
        instance_class: &'static str,
        f: NativeFunction,
    ) -> BridgeResult<ObjectRef> {
        let ctor = self.new_function(name, nargs, f)?;
        {
            let mut heap = self.heap.lock();
            if let Some(callable) = heap.expect_mut(ctor)?.callable.as_mut() {
                callable.instance_class = Some(instance_class);
            }
        }
        self.define_property(
            ctor,
            "prototype",
            ScriptValue::Object(proto),
            PropertyFlags::READONLY | PropertyFlags::PERMANENT,
        )?;
        self.define_property(proto, "constructor", ScriptValue::Object(ctor), PropertyFlags::empty())?;
        Ok(ctor)
    }

    fn is_alive(&self, obj: ObjectRef) -> bool {
        self.heap.lock().contains(obj)
    }

    fn class_name(&self, obj: ObjectRef) -> Option<&'static str> {
        self.heap.lock().get(obj).map(|o| o.class)
    }

    fn private_data(&self, obj: ObjectRef) -> Option<Arc<dyn ObjectPrivate>> {
        self.heap.lock().get(obj)?.private.clone()
    }

    fn set_private_data(&self, obj: ObjectRef, private: Arc<dyn ObjectPrivate>) -> BridgeResult<()> {
        self.heap.lock().expect_mut(obj)?.private = Some(private);
        Ok(())
    }

    fn prototype_of(&self, obj: ObjectRef) -> Option<ObjectRef> {
        self.heap.lock().get(obj)?.proto
    }

    fn define_property(
        &self,
        obj: ObjectRef,
        name: &str,
        value: ScriptValue,
        flags: PropertyFlags,
    ) -> BridgeResult<()> {
        self.define(
            obj,
            name,
            Property {
                value: PropertyValue::Data(value),
                flags,
            },
        )
    }

    fn define_accessor(
        &self,
        obj: ObjectRef,
        name: &str,
        getter: NativeFunction,
        flags: PropertyFlags,
    ) -> BridgeResult<()> {
        self.define(
            obj,
            name,
            Property {
                value: PropertyValue::Accessor(getter),
                flags,
            },
        )
    }

    fn get_property(&self, obj: ObjectRef, name: &str) -> BridgeResult<ScriptValue> {
        let mut current = Some(obj);
        while let Some(holder) = current {
            match self.lookup_own_resolving(holder, name)? {
                Some(PropertyValue::Data(value)) => return Ok(value),
                Some(PropertyValue::Accessor(getter)) => {
                    let call = CallArgs {
                        this: ScriptValue::Object(obj),
                        args: &[],
                        callee: holder,
                        is_construct: false,
                    };
                    return getter(self, &call);
                }
                None => current = self.prototype_of(holder),
            }
        }
        Ok(ScriptValue::Undefined)
    }

    fn set_property(&self, obj: ObjectRef, name: &str, value: ScriptValue) -> BridgeResult<()> {
        let mut heap = self.heap.lock();
        let object = heap.expect_mut(obj)?;
        match object.properties.get_mut(name) {
            Some(property) => match &property.value {
                PropertyValue::Accessor(_) => Err(BridgeError::TypeError(format!(
                    "setting getter-only property \"{}\"",
                    name
                ))),
                PropertyValue::Data(_) if property.flags.contains(PropertyFlags::READONLY) => {
                    Err(BridgeError::TypeError(format!("\"{}\" is read-only", name)))
                }
                PropertyValue::Data(_) => {
                    property.value = PropertyValue::Data(value);
                    Ok(())
                }
            },
            None => {
                object.properties.insert(
                    name,
                    Property {
                        value: PropertyValue::Data(value),
                        flags: PropertyFlags::ENUMERATE,
                    },
                );
                Ok(())
            }
        }
    }

    fn has_own_property(&self, obj: ObjectRef, name: &str) -> bool {
        self.heap
            .lock()
            .get(obj)
            .is_some_and(|o| o.properties.get(name).is_some())
    }

    fn delete_property(&self, obj: ObjectRef, name: &str) -> BridgeResult<bool> {
        let mut heap = self.heap.lock();
        let object = heap.expect_mut(obj)?;
        match object.properties.get(name) {
            Some(p) if p.flags.contains(PropertyFlags::PERMANENT) => Ok(false),
            Some(_) => {
                object.properties.remove(name);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    fn own_property_names(&self, obj: ObjectRef) -> Vec<String> {
        let heap = self.heap.lock();
        match heap.get(obj) {
            Some(object) => object
                .properties
                .iter()
                .filter(|(_, p)| p.flags.contains(PropertyFlags::ENUMERATE))
                .map(|(n, _)| n.to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn is_callable(&self, value: &ScriptValue) -> bool {
        self.callable_of(value).is_some()
    }

    fn call_function(
        &self,
        this: ScriptValue,
        callee: &ScriptValue,
        args: &[ScriptValue],
    ) -> BridgeResult<ScriptValue> {
        let (obj, callable) = self.callable_of(callee).ok_or_else(|| {
            self.into_exception(BridgeError::TypeError(format!(
                "{} is not a function",
                callee.type_name()
            )))
        })?;
        tracing::trace!(target: "gibridge::marshal", function = %callable.name, nargs = callable.nargs, "call");
        let call = CallArgs {
            this,
            args,
            callee: obj,
            is_construct: false,
        };
        (callable.function)(self, &call).map_err(|e| self.into_exception(e))
    }

    fn construct(&self, ctor: &ScriptValue, args: &[ScriptValue]) -> BridgeResult<ObjectRef> {
        let (obj, callable) = match self.callable_of(ctor) {
            Some((obj, callable)) if callable.instance_class.is_some() => (obj, callable),
            _ => {
                return Err(self.into_exception(BridgeError::TypeError(format!(
                    "{} is not a constructor",
                    ctor.type_name()
                ))))
            }
        };
        let class = callable.instance_class.unwrap_or("Object");
        let proto = self
            .get_property(obj, "prototype")
            .map_err(|e| self.into_exception(e))?
            .as_object();
        let instance = self
            .new_object(class, proto, None)
            .map_err(|e| self.into_exception(e))?;
        let call = CallArgs {
            this: ScriptValue::Object(instance),
            args,
            callee: obj,
            is_construct: true,
        };
        let result = (callable.function)(self, &call).map_err(|e| self.into_exception(e))?;
        Ok(result.as_object().unwrap_or(instance))
    }

    // ========================================================================
    // Rooting and collection
    // ========================================================================

    fn add_root(&self, obj: ObjectRef, name: &'static str) -> RootId {
        self.roots.lock().add(obj, name)
    }

    fn remove_root(&self, id: RootId) {
        self.roots.lock().remove(id);
    }

    fn schedule_gc_if_needed(&self) {
        let Some(threshold) = self.options.gc_allocation_threshold else {
            return;
        };
        if self.heap.lock().allocations_since_gc() >= threshold {
            self.gc();
        }
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    fn is_exception_pending(&self) -> bool {
        self.pending_exception.lock().is_some()
    }

    fn set_pending_exception(&self, value: ScriptValue) {
        *self.pending_exception.lock() = Some(value);
    }

    fn take_pending_exception(&self) -> Option<ScriptValue> {
        self.pending_exception.lock().take()
    }

    fn report_exception(&self, value: &ScriptValue) {
        tracing::error!(target: "gibridge::runtime", "uncaught exception: {}", self.describe(value));
        self.reported.lock().push(value.clone());
    }

    fn error_value(&self, err: &BridgeError) -> ScriptValue {
        if let BridgeError::Exception(value) = err {
            return value.clone();
        }
        let message = err.to_string();
        match self.make_error_object(err.error_name(), &message) {
            Ok(obj) => ScriptValue::Object(obj),
            Err(_) => ScriptValue::string(message),
        }
    }
}
