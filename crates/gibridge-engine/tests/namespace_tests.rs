//! Integration tests for the repo and namespace objects
//!
//! Tests cover:
//! - Loading namespaces through the repo object, with and without pins
//! - Lazy definition of enumerations, flags, constants and classes
//! - Dispatch to the definers and per-namespace override hooks
//! - Lookup helpers used by the other definers

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{Fixture, RecordingDefiners};
use gibridge_engine::gi::ns::NAMESPACE_CLASS;
use gibridge_engine::gi::repo::{PRIVATE_NS_PROPERTY, REPO_CLASS, VERSIONS_PROPERTY};
use gibridge_engine::gi::{
    classify, gtype_from_object, lookup_generic_constructor, lookup_generic_prototype, lookup_namespace_object,
    lookup_namespace_object_by_name, lookup_private_namespace, new_object_with_generic_prototype, Definable,
};
use gibridge_engine::{BasicDefiners, Bridge, BridgeOptions, NativeInstance, StaticRepository, TypeDefiners};
use gibridge_sdk::{
    private_as, BaseInfo, BridgeError, BridgeResult, FunctionInfo, GType, InfoType, ObjectRef, PropertyFlags,
    Repository, ScriptEngine, ScriptValue,
};
use parking_lot::Mutex;

fn thrown_message(fixture: &Fixture, err: &BridgeError) -> String {
    let thrown = err.exception().cloned().unwrap();
    fixture.runtime.error_message(&thrown).unwrap()
}

// ============================================================================
// Repo object
// ============================================================================

#[test]
fn test_repo_object_is_cached() {
    let f = Fixture::new();
    assert_eq!(f.runtime.class_name(f.repo), Some(REPO_CLASS));
    let again = f.bridge.define_repo(&f.runtime, f.cx).unwrap();
    assert_eq!(again, f.repo);

    let versions = f.object(f.repo, VERSIONS_PROPERTY);
    assert_eq!(f.runtime.get_property(versions, "GLib").unwrap(), ScriptValue::string("2.0"));
    assert_eq!(f.runtime.get_property(versions, "Gdk").unwrap(), ScriptValue::Undefined);

    let private_ns = f.object(f.repo, PRIVATE_NS_PROPERTY);
    assert_eq!(lookup_private_namespace(&f.runtime).unwrap(), private_ns);
}

#[test]
fn test_namespace_resolution() {
    let f = Fixture::new();
    let gdk = f.namespace("Gdk");
    assert_eq!(f.runtime.class_name(gdk), Some(NAMESPACE_CLASS));
    assert_eq!(f.runtime.get_property(gdk, "__name__").unwrap(), ScriptValue::string("Gdk"));
    assert_eq!(f.namespace("Gdk"), gdk);

    // Nothing pinned: the newest version is loaded.
    assert!(f.repository.is_registered("Gdk", Some("4.0")));
    assert!(!f.runtime.delete_property(f.repo, "Gdk").unwrap());
}

#[test]
fn test_object_methods_are_not_namespaces() {
    let f = Fixture::new();
    assert_eq!(f.runtime.get_property(f.repo, "toString").unwrap(), ScriptValue::Undefined);
    assert_eq!(f.runtime.get_property(f.repo, "valueOf").unwrap(), ScriptValue::Undefined);
    assert!(f.repository.loaded_namespaces().is_empty());
}

#[test]
fn test_pinned_version_from_options() {
    let f = Fixture::with_options(BridgeOptions::new().with_version("Gdk", "3.0"));
    f.namespace("Gdk");
    assert!(f.repository.is_registered("Gdk", Some("3.0")));
}

#[test]
fn test_pinned_version_set_from_script() {
    let f = Fixture::with_options(BridgeOptions::new().with_multiple_version_warning(false));
    let versions = f.object(f.repo, VERSIONS_PROPERTY);
    f.runtime
        .set_property(versions, "Gdk", ScriptValue::string("3.0"))
        .unwrap();
    f.namespace("Gdk");
    assert_eq!(
        f.repository.loaded_namespaces(),
        vec![("Gdk".to_string(), "3.0".to_string())]
    );
}

#[test]
fn test_unknown_namespace_fails() {
    let f = Fixture::new();
    let err = f.runtime.get_property(f.repo, "Nope").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Requiring Nope, version none: Typelib file for namespace 'Nope' not found"
    );
    assert!(!f.runtime.has_own_property(f.repo, "Nope"));
}

#[test]
fn test_unknown_version_fails() {
    let f = Fixture::with_options(BridgeOptions::new().with_version("Gtk", "4.0"));
    let err = f.runtime.get_property(f.repo, "Gtk").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Requiring Gtk, version 4.0: Typelib file for namespace 'Gtk', version '4.0' not found"
    );
}

#[test]
fn test_version_conflict_fails() {
    let f = Fixture::with_options(BridgeOptions::new().with_version("Gdk", "4.0"));
    f.repository.require("Gdk", Some("3.0")).unwrap();
    let err = f.runtime.get_property(f.repo, "Gdk").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Requiring Gdk, version 4.0: Requiring namespace 'Gdk' version '4.0', but '3.0' is already loaded"
    );
}

#[test]
fn test_repo_survives_collection() {
    let f = Fixture::new();
    let gdk = f.namespace("Gdk");
    let gravity = f.get("Gdk", "Gravity").unwrap().as_object().unwrap();
    f.runtime.gc();
    assert!(f.runtime.is_alive(f.repo));
    assert!(f.runtime.is_alive(gdk));
    assert!(f.runtime.is_alive(gravity));
}

// ============================================================================
// Namespace members
// ============================================================================

#[test]
fn test_enum_values() {
    let f = Fixture::new();
    let gravity = f.get("Gdk", "Gravity").unwrap().as_object().unwrap();
    assert_eq!(f.runtime.get_property(gravity, "NORTH_WEST").unwrap(), ScriptValue::Int(1));
    assert_eq!(f.runtime.get_property(gravity, "SOUTH_WEST").unwrap(), ScriptValue::Int(7));
    assert!(!f.runtime.delete_property(gravity, "NORTH").unwrap());

    let mut names = f.runtime.own_property_names(gravity);
    names.sort();
    assert_eq!(names, vec!["NORTH", "NORTH_WEST", "SOUTH_WEST", "from_string"]);

    let gtype = f.object(gravity, "$gtype");
    assert_eq!(f.runtime.get_property(gtype, "name").unwrap(), ScriptValue::string("GdkGravity"));
    assert_eq!(
        f.call_method(gtype, "toString", &[]).unwrap(),
        ScriptValue::string("[object GType for 'GdkGravity']")
    );
    assert_eq!(gtype_from_object(&f.runtime, gravity).unwrap(), Some(f.types.gravity));
    assert_eq!(gtype_from_object(&f.runtime, gtype).unwrap(), Some(f.types.gravity));
}

#[test]
fn test_enum_static_methods_without_invoker() {
    let f = Fixture::new();
    let gravity = f.get("Gdk", "Gravity").unwrap().as_object().unwrap();
    let err = f
        .call_method(gravity, "from_string", &[ScriptValue::string("north")])
        .unwrap_err();
    assert_eq!(thrown_message(&f, &err), "Function from_string has no native invoker");
}

#[test]
fn test_flags() {
    let f = Fixture::new();
    let modifiers = f.get("Gdk", "ModifierType").unwrap().as_object().unwrap();
    assert_eq!(f.runtime.get_property(modifiers, "SHIFT_MASK").unwrap(), ScriptValue::Int(1));
    assert_eq!(f.runtime.get_property(modifiers, "CONTROL_MASK").unwrap(), ScriptValue::Int(4));
    let gtype = f.object(modifiers, "$gtype");
    assert_eq!(
        f.runtime.get_property(gtype, "name").unwrap(),
        ScriptValue::string("GdkModifierType")
    );
}

#[test]
fn test_constants() {
    let f = Fixture::new();
    assert_eq!(f.get("GLib", "MAXUINT8").unwrap(), ScriptValue::Int(255));
    assert_eq!(f.get("GLib", "SYSDEF_AF_INET6").unwrap(), ScriptValue::Int(10));
    assert_eq!(f.get("GLib", "STR_DELIMITERS").unwrap(), ScriptValue::string("_-|> <."));
}

#[test]
fn test_members_resolved_once() {
    let f = Fixture::new();
    let first = f.get("Gdk", "Gravity").unwrap();
    let lookups = f.repository.lookup_count();
    let second = f.get("Gdk", "Gravity").unwrap();
    assert_eq!(first, second);
    assert_eq!(f.repository.lookup_count(), lookups);

    assert_eq!(f.get("Gdk", "nope").unwrap(), ScriptValue::Undefined);
    assert_eq!(f.repository.lookup_count(), lookups + 1);
}

#[test]
fn test_callback_is_unsupported() {
    let f = Fixture::new();
    let err = f.get("Gdk", "EventFunc").unwrap_err();
    assert!(matches!(err, BridgeError::Unsupported { kind: "CALLBACK", .. }));
    assert_eq!(err.to_string(), "API of type CALLBACK not implemented, cannot define Gdk.EventFunc");

    // Failures are not cached: the same lookup fails the same way again.
    let lookups = f.repository.lookup_count();
    let again = f.get("Gdk", "EventFunc").unwrap_err();
    assert_eq!(again.to_string(), err.to_string());
    assert_eq!(f.repository.lookup_count(), lookups + 1);
    let gdk = f.namespace("Gdk");
    assert!(!f.runtime.has_own_property(gdk, "EventFunc"));

    // The namespace object stays usable.
    assert!(f.runtime.is_callable(&f.get("Gdk", "beep").unwrap()));
    let gravity = f.get("Gdk", "Gravity").unwrap().as_object().unwrap();
    assert_eq!(f.runtime.get_property(gravity, "NORTH_WEST").unwrap(), ScriptValue::Int(1));
}

/// Definers whose function definition reads the symbol being defined back
/// from the namespace
#[derive(Default)]
struct ReentrantDefiners {
    nested: Mutex<Vec<ScriptValue>>,
    defined: AtomicUsize,
}

impl TypeDefiners for ReentrantDefiners {
    fn define_function(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        function: &FunctionInfo,
    ) -> BridgeResult<ObjectRef> {
        if function.name == "beep" {
            let nested = engine.get_property(in_object, "beep")?;
            self.nested.lock().push(nested);
            self.defined.fetch_add(1, Ordering::SeqCst);
        }
        BasicDefiners.define_function(engine, bridge, in_object, function)
    }

    fn define_object_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        BasicDefiners.define_object_class(engine, bridge, in_object, info)
    }

    fn define_fundamental_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        BasicDefiners.define_fundamental_class(engine, bridge, in_object, info)
    }

    fn define_boxed_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        BasicDefiners.define_boxed_class(engine, bridge, in_object, info)
    }

    fn define_union_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        BasicDefiners.define_union_class(engine, bridge, in_object, info)
    }

    fn define_interface(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        BasicDefiners.define_interface(engine, bridge, in_object, info)
    }
}

#[test]
fn test_lookup_during_own_definition() {
    let definers = Arc::new(ReentrantDefiners::default());
    let installed = definers.clone();
    let f = Fixture::with_bridge(move |bridge| bridge.with_definers(installed));

    let beep = f.get("Gdk", "beep").unwrap();
    assert!(f.runtime.is_callable(&beep));
    assert_eq!(*definers.nested.lock(), vec![ScriptValue::Undefined]);

    // Defined once and cached afterwards.
    let lookups = f.repository.lookup_count();
    assert_eq!(f.get("Gdk", "beep").unwrap(), beep);
    assert_eq!(f.repository.lookup_count(), lookups);
    assert_eq!(definers.defined.load(Ordering::SeqCst), 1);
}

#[test]
fn test_gtype_struct_is_not_defined() {
    let f = Fixture::new();
    assert_eq!(f.get("GObject", "ObjectClass").unwrap(), ScriptValue::Undefined);
    let gobject = f.namespace("GObject");
    assert!(!f.runtime.has_own_property(gobject, "ObjectClass"));
}

#[test]
fn test_function_defined_without_invoker() {
    let f = Fixture::new();
    let gdk = f.namespace("Gdk");
    let beep = f.get("Gdk", "beep").unwrap();
    assert!(f.runtime.is_callable(&beep));
    let err = f.call_method(gdk, "beep", &[]).unwrap_err();
    assert_eq!(thrown_message(&f, &err), "Function beep has no native invoker");
}

// ============================================================================
// Classes from the basic definers
// ============================================================================

#[test]
fn test_object_class_construct() {
    let f = Fixture::new();
    let widget = f.get("Gtk", "Widget").unwrap();
    let ctor = widget.as_object().unwrap();
    let gtype = f.object(ctor, "$gtype");
    assert_eq!(f.runtime.get_property(gtype, "name").unwrap(), ScriptValue::string("GtkWidget"));

    let instance = f.runtime.construct(&widget, &[]).unwrap();
    assert_eq!(f.runtime.class_name(instance), Some("GObject_Object"));
    let private = private_as::<NativeInstance>(&f.runtime, instance).unwrap();
    assert_eq!(private.gtype(), f.types.widget);

    let err = f.runtime.call_function(ScriptValue::Undefined, &widget, &[]).unwrap_err();
    assert_eq!(
        thrown_message(&f, &err),
        "Constructor called as normal method. Use 'new Gtk.Widget()' not 'Gtk.Widget()'"
    );
}

#[test]
fn test_interface_cannot_be_instantiated() {
    let f = Fixture::new();
    let buildable = f.get("Gtk", "Buildable").unwrap();
    let err = f.runtime.construct(&buildable, &[]).unwrap_err();
    assert_eq!(
        thrown_message(&f, &err),
        "Gtk.Buildable is an interface and cannot be instantiated"
    );
}

#[test]
fn test_boxed_methods_placement() {
    let f = Fixture::new();
    let rgba = f.get("Gdk", "RGBA").unwrap().as_object().unwrap();
    let proto = f.object(rgba, "prototype");
    assert!(f.runtime.has_own_property(proto, "to_string"));
    assert!(!f.runtime.has_own_property(rgba, "to_string"));
    assert!(f.runtime.has_own_property(rgba, "parse"));
    assert!(!f.runtime.has_own_property(proto, "parse"));
}

#[test]
fn test_recording_definers_dispatch() {
    let recorder = Arc::new(RecordingDefiners::default());
    let definers = recorder.clone();
    let f = Fixture::with_bridge(move |bridge| bridge.with_definers(definers));

    f.get("Gdk", "RGBA").unwrap();
    f.get("Gdk", "beep").unwrap();
    f.get("Gtk", "Widget").unwrap();
    f.get("Gtk", "Buildable").unwrap();
    f.get("Gdk", "Gravity").unwrap();

    assert_eq!(
        recorder.calls(),
        vec![
            ("boxed", "RGBA".to_string()),
            ("function", "to_string".to_string()),
            ("function", "parse".to_string()),
            ("function", "beep".to_string()),
            ("object", "Widget".to_string()),
            ("interface", "Buildable".to_string()),
            ("function", "from_string".to_string()),
        ]
    );
}

// ============================================================================
// Overrides
// ============================================================================

#[test]
fn test_override_runs_once_after_publishing() {
    let f = Fixture::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let counted = runs.clone();
    f.bridge.register_override(
        "Gdk",
        Arc::new(move |engine: &dyn ScriptEngine, ns: ObjectRef| {
            counted.fetch_add(1, Ordering::SeqCst);
            assert_eq!(lookup_namespace_object_by_name(engine, "Gdk")?, ns);
            engine.define_property(ns, "overridden", ScriptValue::Bool(true), PropertyFlags::MODULE)
        }),
    );

    assert_eq!(f.get("Gdk", "overridden").unwrap(), ScriptValue::Bool(true));
    f.namespace("Gdk");
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failing_override_propagates() {
    let f = Fixture::new();
    f.bridge.register_override(
        "Gio",
        Arc::new(|_: &dyn ScriptEngine, _: ObjectRef| Err(BridgeError::Failed("override failed".into()))),
    );
    let err = f.runtime.get_property(f.repo, "Gio").unwrap_err();
    assert_eq!(err.to_string(), "override failed");
}

// ============================================================================
// Lookups and classification
// ============================================================================

#[test]
fn test_lookup_helpers() {
    let f = Fixture::new();
    let gdk = f.namespace("Gdk");
    assert_eq!(lookup_namespace_object_by_name(&f.runtime, "Gdk").unwrap(), gdk);

    let info = f.repository.find_by_name("Gdk", "RGBA").unwrap();
    assert_eq!(lookup_namespace_object(&f.runtime, &info).unwrap(), gdk);

    let ctor = lookup_generic_constructor(&f.runtime, &info).unwrap();
    assert_eq!(f.get("Gdk", "RGBA").unwrap(), ScriptValue::Object(ctor));
    let proto = lookup_generic_prototype(&f.runtime, &info).unwrap();
    assert_eq!(f.object(ctor, "prototype"), proto);

    let obj = new_object_with_generic_prototype(&f.runtime, &info, "GObject_Boxed").unwrap();
    assert_eq!(f.runtime.prototype_of(obj), Some(proto));
    assert_eq!(f.runtime.class_name(obj), Some("GObject_Boxed"));
}

#[test]
fn test_lookup_without_namespace() {
    let f = Fixture::new();
    let info = BaseInfo::registered(InfoType::Boxed, "Gdk", "RGBA", f.types.rgba).without_namespace();
    let err = lookup_namespace_object(&f.runtime, &info).unwrap_err();
    assert_eq!(err.to_string(), "BOXED 'RGBA' does not have a namespace");
}

#[test]
fn test_lookup_missing_constructor() {
    let f = Fixture::new();
    let info = BaseInfo::registered(InfoType::Boxed, "Gdk", "Missing", f.types.rgba);
    let err = lookup_generic_constructor(&f.runtime, &info).unwrap_err();
    assert_eq!(err.to_string(), "Constructor of Gdk.Missing was the wrong type, expected an object");
}

#[test]
fn test_classify() {
    let (repository, types): (Arc<StaticRepository>, _) = common::sample_repository();
    let classify_registered = |info_type, gtype| {
        classify(&*repository, &BaseInfo::registered(info_type, "Test", "Thing", gtype))
    };

    assert_eq!(classify_registered(InfoType::Object, types.param_int).unwrap(), Definable::Param);
    assert_eq!(classify_registered(InfoType::Object, GType::PARAM).unwrap(), Definable::Param);
    assert_eq!(classify_registered(InfoType::Object, types.widget).unwrap(), Definable::ObjectClass);
    assert_eq!(classify_registered(InfoType::Boxed, types.rgba).unwrap(), Definable::Boxed);
    assert_eq!(classify_registered(InfoType::Struct, GType::NONE).unwrap(), Definable::Boxed);
    assert_eq!(classify_registered(InfoType::Union, GType::NONE).unwrap(), Definable::Union);
    assert_eq!(classify_registered(InfoType::Interface, GType::NONE).unwrap(), Definable::Interface);

    let mini_object = repository.register_type("GstMiniObject", GType::POINTER, true);
    assert_eq!(
        classify_registered(InfoType::Object, mini_object).unwrap(),
        Definable::Fundamental
    );

    let err = classify_registered(InfoType::Object, types.rgba).unwrap_err();
    assert!(matches!(err, BridgeError::TypeError(_)));
    assert_eq!(err.to_string(), "Unsupported type GdkRGBA, deriving from fundamental GBoxed");

    let class_struct = BaseInfo::registered(InfoType::Struct, "Test", "ThingClass", GType::NONE).as_gtype_struct();
    assert_eq!(classify(&*repository, &class_struct).unwrap(), Definable::GTypeStruct);

    repository.require("Gio", None).unwrap();
    repository.require("Gdk", None).unwrap();
    let io_error = repository.find_by_name("Gio", "IOErrorEnum").unwrap();
    assert_eq!(classify(&*repository, &io_error).unwrap(), Definable::ErrorDomain);
    let gravity = repository.find_by_name("Gdk", "Gravity").unwrap();
    assert_eq!(classify(&*repository, &gravity).unwrap(), Definable::Enumeration);
    let modifiers = repository.find_by_name("Gdk", "ModifierType").unwrap();
    assert_eq!(classify(&*repository, &modifiers).unwrap(), Definable::Enumeration);

    let signal = BaseInfo::other(InfoType::Signal, "Test", "clicked");
    assert!(matches!(
        classify(&*repository, &signal),
        Err(BridgeError::Unsupported { kind: "SIGNAL", .. })
    ));
}
