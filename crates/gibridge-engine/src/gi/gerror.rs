//! Error-domain classes
//!
//! An enumeration that lists the codes of an error domain is defined as a
//! constructor and prototype pair instead of a plain enum object. The
//! prototype inherits from `GLib.Error` when that namespace is available and
//! shadows its `domain`, `code` and `message` fields with accessors reading
//! this module's own instance data.
//!
//! Native error records without domain metadata are wrapped as plain
//! `GLib.Error` instances ([`NativeInstance`] carrying an [`ErrorRecord`]);
//! every function here accepts both shapes.

use std::fmt;
use std::sync::Arc;

use gibridge_sdk::{
    from_native, native_fn, private_as, BaseInfo, BridgeError, BridgeResult, CallArgs, GType,
    InfoRef, ObjectPrivate, ObjectRef, PropertyFlags, Quark, ScriptEngine, ScriptValue,
};

use super::bridge::Bridge;
use super::definers::NativeInstance;
use super::enumeration::define_enum_value;
use super::gtype::gtype_wrapper;
use super::repo::{lookup_generic_prototype, new_object_with_generic_prototype};
use crate::counters;

/// Class name of error-domain prototypes and instances
pub const ERROR_CLASS: &str = "GLib_Error";

/// Error domain of records made from script exceptions
pub const SCRIPT_ERROR_DOMAIN: &str = "gibridge-script-error-quark";

/// Quark of [`SCRIPT_ERROR_DOMAIN`]
pub fn script_error_quark() -> Quark {
    Quark::from_str(SCRIPT_ERROR_DOMAIN)
}

/// Codes of the script error domain, one per script error constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ScriptErrorCode {
    /// `Error`
    Error = 0,
    /// `EvalError`
    EvalError = 1,
    /// `InternalError`
    InternalError = 2,
    /// `RangeError`
    RangeError = 3,
    /// `ReferenceError`
    ReferenceError = 4,
    /// `StopIteration`
    StopIteration = 5,
    /// `SyntaxError`
    SyntaxError = 6,
    /// `TypeError`
    TypeError = 7,
    /// `URIError`
    UriError = 8,
}

impl ScriptErrorCode {
    const ALL: [ScriptErrorCode; 9] = [
        ScriptErrorCode::Error,
        ScriptErrorCode::EvalError,
        ScriptErrorCode::InternalError,
        ScriptErrorCode::RangeError,
        ScriptErrorCode::ReferenceError,
        ScriptErrorCode::StopIteration,
        ScriptErrorCode::SyntaxError,
        ScriptErrorCode::TypeError,
        ScriptErrorCode::UriError,
    ];

    /// Constructor name
    pub fn name(self) -> &'static str {
        match self {
            ScriptErrorCode::Error => "Error",
            ScriptErrorCode::EvalError => "EvalError",
            ScriptErrorCode::InternalError => "InternalError",
            ScriptErrorCode::RangeError => "RangeError",
            ScriptErrorCode::ReferenceError => "ReferenceError",
            ScriptErrorCode::StopIteration => "StopIteration",
            ScriptErrorCode::SyntaxError => "SyntaxError",
            ScriptErrorCode::TypeError => "TypeError",
            ScriptErrorCode::UriError => "URIError",
        }
    }

    /// Code for a constructor name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Code for a raw value; unknown values map to [`ScriptErrorCode::Error`]
    pub fn from_code(code: i32) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| *c as i32 == code)
            .unwrap_or(ScriptErrorCode::Error)
    }
}

// ============================================================================
// Records
// ============================================================================

/// A native error record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Error domain
    pub domain: Quark,
    /// Code within the domain
    pub code: i32,
    /// Human-readable message
    pub message: String,
}

impl ErrorRecord {
    /// Create a record
    pub fn new(domain: Quark, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let domain = self.domain.as_str();
        write!(
            f,
            "{}: {}",
            domain.as_deref().unwrap_or("(unknown domain)"),
            self.message
        )
    }
}

// ============================================================================
// Private data
// ============================================================================

/// Private data of an error-domain prototype
pub struct ErrorPrototype {
    info: InfoRef,
    domain: Quark,
}

impl ErrorPrototype {
    fn new(info: InfoRef, domain: Quark) -> Self {
        counters::ERROR_PROTOTYPE.inc();
        Self { info, domain }
    }

    /// Error domain of the class
    pub fn domain(&self) -> Quark {
        self.domain
    }

    /// `Namespace.Name` of the class
    pub fn qualified_name(&self) -> String {
        self.info.qualified_name()
    }
}

impl ObjectPrivate for ErrorPrototype {}

impl Drop for ErrorPrototype {
    fn drop(&mut self) {
        counters::ERROR_PROTOTYPE.dec();
    }
}

/// Private data of an error-domain instance
pub struct ErrorInstance {
    prototype: Arc<ErrorPrototype>,
    record: ErrorRecord,
}

impl ErrorInstance {
    fn new(prototype: Arc<ErrorPrototype>, record: ErrorRecord) -> Self {
        counters::ERROR_INSTANCE.inc();
        Self { prototype, record }
    }

    /// Wrapped record
    pub fn record(&self) -> &ErrorRecord {
        &self.record
    }
}

impl ObjectPrivate for ErrorInstance {}

impl Drop for ErrorInstance {
    fn drop(&mut self) {
        counters::ERROR_INSTANCE.dec();
    }
}

enum ErrorBase {
    Prototype(Arc<ErrorPrototype>),
    Instance(Arc<ErrorInstance>),
}

impl ErrorBase {
    fn of(engine: &dyn ScriptEngine, obj: ObjectRef) -> Option<ErrorBase> {
        if let Some(instance) = private_as::<ErrorInstance>(engine, obj) {
            return Some(ErrorBase::Instance(instance));
        }
        private_as::<ErrorPrototype>(engine, obj).map(ErrorBase::Prototype)
    }

    fn of_this(engine: &dyn ScriptEngine, call: &CallArgs<'_>) -> BridgeResult<ErrorBase> {
        let this = call.this_object()?;
        Self::of(engine, this).ok_or_else(|| {
            BridgeError::TypeError(format!(
                "Object {:?} is not an error-domain object, it's a {}",
                this,
                engine.class_name(this).unwrap_or("collected object")
            ))
        })
    }

    fn prototype(&self) -> &ErrorPrototype {
        match self {
            ErrorBase::Prototype(prototype) => &**prototype,
            ErrorBase::Instance(instance) => &*instance.prototype,
        }
    }

    fn instance(&self, for_what: &str) -> BridgeResult<&ErrorInstance> {
        match self {
            ErrorBase::Instance(instance) => Ok(&**instance),
            ErrorBase::Prototype(prototype) => Err(BridgeError::TypeError(format!(
                "Can't {} on {}.prototype; only on instances",
                for_what,
                prototype.qualified_name()
            ))),
        }
    }
}

/// Record of a plain `GLib.Error` wrapper
fn plain_record(engine: &dyn ScriptEngine, bridge: &Bridge, obj: ObjectRef) -> Option<Arc<ErrorRecord>> {
    let instance = private_as::<NativeInstance>(engine, obj)?;
    if !bridge.repository().type_is_a(instance.gtype(), GType::ERROR) {
        return None;
    }
    instance.payload_as::<ErrorRecord>()
}

// ============================================================================
// Class definition
// ============================================================================

fn quark_value(quark: Quark) -> ScriptValue {
    from_native(quark.raw())
}

fn parent_prototype(engine: &dyn ScriptEngine, bridge: &Bridge) -> BridgeResult<Option<ObjectRef>> {
    let repository = bridge.repository();
    if repository.require("GLib", Some("2.0")).is_err() {
        return Ok(None);
    }
    match repository.find_by_name("GLib", "Error") {
        Some(glib_error) => lookup_generic_prototype(engine, &glib_error).map(Some),
        None => Ok(None),
    }
}

fn require_property(
    engine: &dyn ScriptEngine,
    obj: ObjectRef,
    description: &str,
    name: &str,
) -> BridgeResult<ScriptValue> {
    match engine.get_property(obj, name)? {
        ScriptValue::Undefined => Err(BridgeError::Failed(format!(
            "No property '{}' in {} (or value was undefined)",
            name, description
        ))),
        value => Ok(value),
    }
}

/// Define the error-domain enumeration `info` as a class on `in_object`
pub fn define_error_class(
    engine: &dyn ScriptEngine,
    bridge: &Arc<Bridge>,
    in_object: ObjectRef,
    info: &BaseInfo,
) -> BridgeResult<()> {
    let enum_info = info
        .enum_info()
        .ok_or_else(|| BridgeError::Failed(format!("{} is not an enumeration", info.qualified_name())))?;
    let domain_name = enum_info
        .error_domain
        .as_deref()
        .ok_or_else(|| BridgeError::Failed(format!("{} has no error domain", info.qualified_name())))?;
    let domain = Quark::from_str(domain_name);
    let private = Arc::new(ErrorPrototype::new(Arc::new(info.clone()), domain));

    let parent = parent_prototype(engine, bridge)?;
    let proto = engine.new_object(ERROR_CLASS, parent, Some(private.clone()))?;

    let ctor_private = private.clone();
    let ctor = engine.new_constructor(
        info.name(),
        1,
        proto,
        ERROR_CLASS,
        native_fn(move |engine, call| {
            if !call.is_construct {
                return Err(BridgeError::TypeError(format!(
                    "Constructor called as normal method. Use 'new {0}()' not '{0}()'",
                    ctor_private.qualified_name()
                )));
            }
            let params = match call.args {
                [ScriptValue::Object(params)] => *params,
                _ => {
                    return Err(BridgeError::Failed(
                        "Invalid parameters passed to GError constructor, expected one object".into(),
                    ))
                }
            };
            let message = require_property(engine, params, "GError constructor", "message")?;
            let message = engine.to_string_utf8(&message)?;
            let code = require_property(engine, params, "GError constructor", "code")?;
            let code = engine.to_int32(&code)?;

            let record = ErrorRecord::new(ctor_private.domain, code, message);
            let this = call.this_object()?;
            engine.set_private_data(this, Arc::new(ErrorInstance::new(ctor_private.clone(), record)))?;
            Ok(ScriptValue::Undefined)
        }),
    )?;

    // Shadow the fields of the parent wrapper.
    engine.define_accessor(
        proto,
        "domain",
        native_fn(|engine, call| {
            let base = ErrorBase::of_this(engine, call)?;
            Ok(quark_value(base.prototype().domain))
        }),
        PropertyFlags::MODULE,
    )?;
    engine.define_accessor(
        proto,
        "code",
        native_fn(|engine, call| {
            let base = ErrorBase::of_this(engine, call)?;
            Ok(ScriptValue::Int(base.instance("get a field")?.record.code))
        }),
        PropertyFlags::MODULE,
    )?;
    engine.define_accessor(
        proto,
        "message",
        native_fn(|engine, call| {
            let base = ErrorBase::of_this(engine, call)?;
            Ok(ScriptValue::string(&base.instance("get a field")?.record.message))
        }),
        PropertyFlags::MODULE,
    )?;

    let to_string_bridge = bridge.clone();
    engine.define_function(
        proto,
        "toString",
        0,
        native_fn(move |engine, call| {
            let this = call.this_object()?;
            if let Some(record) = plain_record(engine, &to_string_bridge, this) {
                return Ok(ScriptValue::string(format!("GLib.Error {}", record)));
            }
            let description = match ErrorBase::of_this(engine, call)? {
                ErrorBase::Prototype(prototype) => prototype.qualified_name(),
                ErrorBase::Instance(instance) => format!(
                    "{}: {}",
                    instance.prototype.qualified_name(),
                    instance.record.message
                ),
            };
            Ok(ScriptValue::string(description))
        }),
        PropertyFlags::MODULE,
    )?;

    engine.define_function(
        ctor,
        "valueOf",
        0,
        native_fn(|engine, call| {
            let not_a_constructor = || {
                BridgeError::Failed("GLib.Error.valueOf() called on something that is not a constructor".into())
            };
            let this = call.this_object().map_err(|_| not_a_constructor())?;
            let prototype = engine
                .get_property(this, "prototype")
                .ok()
                .and_then(|p| p.as_object())
                .ok_or_else(not_a_constructor)?;
            match private_as::<ErrorPrototype>(engine, prototype) {
                Some(prototype) => Ok(quark_value(prototype.domain)),
                None => Err(not_a_constructor()),
            }
        }),
        PropertyFlags::MODULE,
    )?;

    let wrapper = gtype_wrapper(engine, bridge.repository(), GType::ERROR)?;
    engine.define_property(ctor, "$gtype", ScriptValue::Object(wrapper), PropertyFlags::PERMANENT)?;
    for value in &enum_info.values {
        define_enum_value(engine, ctor, info.name(), value)?;
    }

    engine.define_property(in_object, info.name(), ScriptValue::Object(ctor), PropertyFlags::MODULE)?;
    tracing::debug!(
        target: "gibridge::gerror",
        class = %info.qualified_name(),
        domain = domain_name,
        ?proto,
        "defined error class"
    );
    Ok(())
}

// ============================================================================
// Conversion
// ============================================================================

fn find_error_domain_info(bridge: &Bridge, domain: Quark) -> Option<InfoRef> {
    let repository = bridge.repository();
    if let Some(info) = repository.find_by_error_domain(domain) {
        return Some(info);
    }
    // Load the standard namespaces and try again.
    for namespace in ["GLib", "GObject", "Gio"] {
        if let Err(err) = repository.require(namespace, Some("2.0")) {
            tracing::trace!(
                target: "gibridge::gerror",
                namespace,
                %domain,
                "could not load namespace while looking up error domain: {}",
                err
            );
        }
    }
    repository.find_by_error_domain(domain)
}

fn script_error_value(engine: &dyn ScriptEngine, record: &ErrorRecord) -> ScriptValue {
    let err = match ScriptErrorCode::from_code(record.code) {
        ScriptErrorCode::TypeError => BridgeError::TypeError(record.message.clone()),
        ScriptErrorCode::RangeError => BridgeError::RangeError(record.message.clone()),
        _ => BridgeError::Failed(record.message.clone()),
    };
    engine.error_value(&err)
}

/// Script value for a native error record.
///
/// Records of the script error domain turn back into script errors. Records
/// with domain metadata become instances of their error class; anything else
/// becomes a plain `GLib.Error`.
pub fn error_from_record(
    engine: &dyn ScriptEngine,
    bridge: &Bridge,
    record: &ErrorRecord,
) -> BridgeResult<ScriptValue> {
    if record.domain == script_error_quark() {
        return Ok(script_error_value(engine, record));
    }

    let Some(info) = find_error_domain_info(bridge, record.domain) else {
        let glib_error = bridge
            .repository()
            .find_by_name("GLib", "Error")
            .ok_or_else(|| BridgeError::Failed("GLib.Error metadata is not available".into()))?;
        let obj = new_object_with_generic_prototype(engine, &glib_error, "GObject_Boxed")?;
        engine.set_private_data(
            obj,
            Arc::new(NativeInstance::new(GType::ERROR, Arc::new(record.clone()))),
        )?;
        return Ok(ScriptValue::Object(obj));
    };

    tracing::trace!(target: "gibridge::gerror", "Wrapping struct {} with script object", info.name());
    let obj = new_object_with_generic_prototype(engine, &info, ERROR_CLASS)?;
    let prototype = engine
        .prototype_of(obj)
        .and_then(|proto| private_as::<ErrorPrototype>(engine, proto))
        .ok_or_else(|| {
            BridgeError::TypeError(format!("{} is not an error-domain class", info.qualified_name()))
        })?;
    engine.set_private_data(obj, Arc::new(ErrorInstance::new(prototype, record.clone())))?;
    Ok(ScriptValue::Object(obj))
}

/// Native error record of `obj`.
///
/// Accepts error-domain instances and plain `GLib.Error` wrappers; a
/// prototype carries no record and is rejected.
pub fn error_to_record(engine: &dyn ScriptEngine, bridge: &Bridge, obj: ObjectRef) -> BridgeResult<ErrorRecord> {
    if let Some(record) = plain_record(engine, bridge, obj) {
        return Ok((*record).clone());
    }
    match ErrorBase::of(engine, obj) {
        Some(ErrorBase::Instance(instance)) => Ok(instance.record.clone()),
        Some(ErrorBase::Prototype(prototype)) => Err(BridgeError::TypeError(format!(
            "Object is {}.prototype, not an object instance - cannot convert to GLib.Error",
            prototype.qualified_name()
        ))),
        None => Err(BridgeError::TypeError(format!(
            "Object is of type {} - cannot convert to GLib.Error",
            engine.class_name(obj).unwrap_or("collected object")
        ))),
    }
}

/// Native error record for any thrown object.
///
/// Error-domain objects are copied. Other objects become a record in the
/// script error domain, with the code taken from their `name` and the message
/// from their `message`.
pub fn make_error_from_script(
    engine: &dyn ScriptEngine,
    bridge: &Bridge,
    obj: ObjectRef,
) -> BridgeResult<ErrorRecord> {
    if let Ok(record) = error_to_record(engine, bridge, obj) {
        return Ok(record);
    }
    let name = engine.get_property(obj, "name")?;
    let name = engine.to_string_utf8(&name)?;
    let message = engine.get_property(obj, "message")?;
    let message = engine.to_string_utf8(&message)?;
    let code = ScriptErrorCode::from_name(&name).unwrap_or(ScriptErrorCode::Error);
    Ok(ErrorRecord::new(script_error_quark(), code as i32, message))
}

/// Error to return from a native function that failed with `record`
pub fn throw_error_record(engine: &dyn ScriptEngine, bridge: &Bridge, record: &ErrorRecord) -> BridgeError {
    match error_from_record(engine, bridge, record) {
        Ok(value) => BridgeError::Exception(value),
        Err(err) => err,
    }
}
