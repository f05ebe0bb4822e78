//! Integration tests for error-domain classes
//!
//! Tests cover:
//! - Defining an error-code enumeration as a class inheriting `GLib.Error`
//! - Construction from a parameter object and the field accessors
//! - Conversion between native error records and script objects

mod common;

use common::{Fixture, IO_ERROR_DOMAIN};
use gibridge_engine::gi::gerror::ERROR_CLASS;
use gibridge_engine::gi::{
    error_from_record, error_to_record, make_error_from_script, script_error_quark, throw_error_record,
    ErrorRecord, ScriptErrorCode,
};
use gibridge_sdk::{from_native, BridgeError, ObjectRef, Quark, ScriptEngine, ScriptValue};

fn io_error_quark() -> Quark {
    Quark::from_str(IO_ERROR_DOMAIN)
}

fn io_error_class(f: &Fixture) -> ObjectRef {
    f.get("Gio", "IOErrorEnum").unwrap().as_object().unwrap()
}

fn params(f: &Fixture, message: Option<&str>, code: Option<i32>) -> ScriptValue {
    let obj = f.runtime.new_plain_object().unwrap();
    if let Some(message) = message {
        f.runtime.set_property(obj, "message", ScriptValue::string(message)).unwrap();
    }
    if let Some(code) = code {
        f.runtime.set_property(obj, "code", ScriptValue::Int(code)).unwrap();
    }
    ScriptValue::Object(obj)
}

fn thrown_message(f: &Fixture, err: &BridgeError) -> String {
    let thrown = err.exception().cloned().unwrap();
    f.runtime.error_message(&thrown).unwrap()
}

// ============================================================================
// Class definition
// ============================================================================

#[test]
fn test_error_class_shape() {
    let f = Fixture::new();
    let class = io_error_class(&f);
    assert_eq!(f.runtime.get_property(class, "NOT_FOUND").unwrap(), ScriptValue::Int(1));
    assert_eq!(f.runtime.get_property(class, "EXISTS").unwrap(), ScriptValue::Int(2));

    let gtype = f.object(class, "$gtype");
    assert_eq!(f.runtime.get_property(gtype, "name").unwrap(), ScriptValue::string("GError"));

    let proto = f.object(class, "prototype");
    assert_eq!(f.runtime.class_name(proto), Some(ERROR_CLASS));
    let glib_error = f.get("GLib", "Error").unwrap().as_object().unwrap();
    let glib_proto = f.object(glib_error, "prototype");
    assert_eq!(f.runtime.prototype_of(proto), Some(glib_proto));
}

#[test]
fn test_construct_instance() {
    let f = Fixture::new();
    let class = ScriptValue::Object(io_error_class(&f));
    let error = f
        .runtime
        .construct(&class, &[params(&f, Some("file is missing"), Some(1))])
        .unwrap();

    assert_eq!(f.runtime.class_name(error), Some(ERROR_CLASS));
    assert_eq!(f.runtime.get_property(error, "code").unwrap(), ScriptValue::Int(1));
    assert_eq!(
        f.runtime.get_property(error, "message").unwrap(),
        ScriptValue::string("file is missing")
    );
    assert_eq!(
        f.runtime.get_property(error, "domain").unwrap(),
        from_native(io_error_quark().raw())
    );
    assert_eq!(
        f.call_method(error, "toString", &[]).unwrap(),
        ScriptValue::string("Gio.IOErrorEnum: file is missing")
    );
}

#[test]
fn test_constructor_argument_errors() {
    let f = Fixture::new();
    let class = ScriptValue::Object(io_error_class(&f));

    let err = f.runtime.call_function(ScriptValue::Undefined, &class, &[]).unwrap_err();
    assert_eq!(
        thrown_message(&f, &err),
        "Constructor called as normal method. Use 'new Gio.IOErrorEnum()' not 'Gio.IOErrorEnum()'"
    );

    let err = f.runtime.construct(&class, &[]).unwrap_err();
    assert_eq!(
        thrown_message(&f, &err),
        "Invalid parameters passed to GError constructor, expected one object"
    );

    let err = f.runtime.construct(&class, &[ScriptValue::Int(1)]).unwrap_err();
    assert_eq!(
        thrown_message(&f, &err),
        "Invalid parameters passed to GError constructor, expected one object"
    );

    let err = f
        .runtime
        .construct(&class, &[params(&f, Some("no code"), None)])
        .unwrap_err();
    assert_eq!(
        thrown_message(&f, &err),
        "No property 'code' in GError constructor (or value was undefined)"
    );

    let err = f.runtime.construct(&class, &[params(&f, None, Some(2))]).unwrap_err();
    assert_eq!(
        thrown_message(&f, &err),
        "No property 'message' in GError constructor (or value was undefined)"
    );
}

#[test]
fn test_prototype_fields() {
    let f = Fixture::new();
    let class = io_error_class(&f);
    let proto = f.object(class, "prototype");

    assert_eq!(
        f.runtime.get_property(proto, "domain").unwrap(),
        from_native(io_error_quark().raw())
    );
    let err = f.runtime.get_property(proto, "code").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Can't get a field on Gio.IOErrorEnum.prototype; only on instances"
    );
    assert!(f.runtime.get_property(proto, "message").is_err());
    assert_eq!(
        f.call_method(proto, "toString", &[]).unwrap(),
        ScriptValue::string("Gio.IOErrorEnum")
    );
}

#[test]
fn test_value_of_gives_domain() {
    let f = Fixture::new();
    let class = io_error_class(&f);
    assert_eq!(
        f.call_method(class, "valueOf", &[]).unwrap(),
        from_native(io_error_quark().raw())
    );

    let value_of = f.runtime.get_property(class, "valueOf").unwrap();
    let plain = f.runtime.new_plain_object().unwrap();
    let err = f
        .runtime
        .call_function(ScriptValue::Object(plain), &value_of, &[])
        .unwrap_err();
    assert_eq!(
        thrown_message(&f, &err),
        "GLib.Error.valueOf() called on something that is not a constructor"
    );
}

// ============================================================================
// Records
// ============================================================================

#[test]
fn test_record_with_domain_class() {
    let f = Fixture::new();
    let record = ErrorRecord::new(io_error_quark(), 2, "already there");

    // Gio is loaded on demand to find the domain.
    let value = error_from_record(&f.runtime, &f.bridge, &record).unwrap();
    let obj = value.as_object().unwrap();
    assert_eq!(f.runtime.class_name(obj), Some(ERROR_CLASS));
    let proto = f.object(io_error_class(&f), "prototype");
    assert_eq!(f.runtime.prototype_of(obj), Some(proto));
    assert_eq!(f.runtime.get_property(obj, "code").unwrap(), ScriptValue::Int(2));

    assert_eq!(error_to_record(&f.runtime, &f.bridge, obj).unwrap(), record);
}

#[test]
fn test_record_without_domain_class() {
    let f = Fixture::new();
    let record = ErrorRecord::new(Quark::from_str("gerror-tests-unknown-quark"), 5, "odd failure");

    let obj = error_from_record(&f.runtime, &f.bridge, &record)
        .unwrap()
        .as_object()
        .unwrap();
    assert_eq!(f.runtime.class_name(obj), Some("GObject_Boxed"));
    let glib_error = f.get("GLib", "Error").unwrap().as_object().unwrap();
    assert_eq!(f.runtime.prototype_of(obj), Some(f.object(glib_error, "prototype")));
    assert_eq!(error_to_record(&f.runtime, &f.bridge, obj).unwrap(), record);

    let proto = f.object(io_error_class(&f), "prototype");
    let to_string = f.runtime.get_property(proto, "toString").unwrap();
    assert_eq!(
        f.runtime
            .call_function(ScriptValue::Object(obj), &to_string, &[])
            .unwrap(),
        ScriptValue::string("GLib.Error gerror-tests-unknown-quark: odd failure")
    );
}

#[test]
fn test_script_domain_record_becomes_script_error() {
    let f = Fixture::new();
    let record = ErrorRecord::new(script_error_quark(), ScriptErrorCode::TypeError as i32, "wrong kind");
    let value = error_from_record(&f.runtime, &f.bridge, &record).unwrap();
    let obj = value.as_object().unwrap();
    assert_eq!(f.runtime.get_property(obj, "name").unwrap(), ScriptValue::string("TypeError"));
    assert_eq!(f.runtime.error_message(&value).as_deref(), Some("wrong kind"));
}

#[test]
fn test_error_to_record_rejects_non_instances() {
    let f = Fixture::new();
    let proto = f.object(io_error_class(&f), "prototype");
    let err = error_to_record(&f.runtime, &f.bridge, proto).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Object is Gio.IOErrorEnum.prototype, not an object instance - cannot convert to GLib.Error"
    );

    let plain = f.runtime.new_plain_object().unwrap();
    let err = error_to_record(&f.runtime, &f.bridge, plain).unwrap_err();
    assert_eq!(err.to_string(), "Object is of type Object - cannot convert to GLib.Error");
}

#[test]
fn test_make_error_from_script() {
    let f = Fixture::new();
    let thrown = f.runtime.error_value(&BridgeError::RangeError("too big".into()));
    let record = make_error_from_script(&f.runtime, &f.bridge, thrown.as_object().unwrap()).unwrap();
    assert_eq!(record.domain, script_error_quark());
    assert_eq!(record.code, ScriptErrorCode::RangeError as i32);
    assert_eq!(record.message, "too big");

    let class = ScriptValue::Object(io_error_class(&f));
    let error = f
        .runtime
        .construct(&class, &[params(&f, Some("gone"), Some(1))])
        .unwrap();
    let record = make_error_from_script(&f.runtime, &f.bridge, error).unwrap();
    assert_eq!(record, ErrorRecord::new(io_error_quark(), 1, "gone"));
}

#[test]
fn test_throw_error_record() {
    let f = Fixture::new();
    let record = ErrorRecord::new(io_error_quark(), 0, "generic");
    let err = throw_error_record(&f.runtime, &f.bridge, &record);
    let thrown = err.exception().and_then(|v| v.as_object()).unwrap();
    assert_eq!(f.runtime.get_property(thrown, "message").unwrap(), ScriptValue::string("generic"));
}
