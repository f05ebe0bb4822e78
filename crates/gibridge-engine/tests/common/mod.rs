//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use gibridge_engine::{BasicDefiners, Bridge, BridgeOptions, Runtime, StaticRepository, TypeDefiners};
use gibridge_sdk::{
    native_fn, BaseInfo, BridgeResult, ConstantInfo, ConstantValue, ContextId, EnumInfo, FunctionInfo,
    FunctionInfoFlags, GType, InfoType, ObjectRef, ScriptEngine, ScriptValue, TypeTag,
};
use parking_lot::Mutex;

/// Error domain of the `Gio.IOErrorEnum` fixture
pub const IO_ERROR_DOMAIN: &str = "g-io-error-quark";

/// Install a test subscriber; `RUST_LOG` selects what is shown
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Types registered by [`sample_repository`]
pub struct SampleTypes {
    pub gravity: GType,
    pub modifier_type: GType,
    pub io_error: GType,
    pub param_int: GType,
    pub param_string: GType,
    pub widget: GType,
    pub rgba: GType,
}

/// Repository with small GLib, GObject, Gio, Gdk and Gtk namespaces
pub fn sample_repository() -> (Arc<StaticRepository>, SampleTypes) {
    let repo = StaticRepository::new();
    repo.add_namespace("GLib", &["2.0"]);
    repo.add_namespace("GObject", &["2.0"]);
    repo.add_namespace("Gio", &["2.0"]);
    repo.add_namespace("Gdk", &["3.0", "4.0"]);
    repo.add_namespace("Gtk", &["3.0"]);

    let types = SampleTypes {
        gravity: repo.register_type("GdkGravity", GType::ENUM, false),
        modifier_type: repo.register_type("GdkModifierType", GType::FLAGS, false),
        io_error: repo.register_type("GIOErrorEnum", GType::ENUM, false),
        param_int: repo.register_type("GParamInt", GType::PARAM, false),
        param_string: repo.register_type("GParamString", GType::PARAM, false),
        widget: repo.register_type("GtkWidget", GType::OBJECT, false),
        rgba: repo.register_type("GdkRGBA", GType::BOXED, false),
    };

    // GLib
    repo.add_info(BaseInfo::registered(InfoType::Boxed, "GLib", "Error", GType::ERROR));
    repo.add_info(BaseInfo::constant(
        "GLib",
        "MAXUINT8",
        ConstantInfo::new(TypeTag::UInt8, ConstantValue::UInt(255)),
    ));
    repo.add_info(BaseInfo::constant(
        "GLib",
        "SYSDEF_AF_INET6",
        ConstantInfo::new(TypeTag::Int32, ConstantValue::Int(10)),
    ));
    repo.add_info(BaseInfo::constant(
        "GLib",
        "STR_DELIMITERS",
        ConstantInfo::new(TypeTag::Utf8, ConstantValue::Utf8("_-|> <.".into())),
    ));

    // GObject
    repo.add_info(
        BaseInfo::registered(InfoType::Object, "GObject", "ParamSpec", GType::PARAM).with_methods(vec![
            FunctionInfo::new("get_name", FunctionInfoFlags::IS_METHOD),
            FunctionInfo::new("get_blurb", FunctionInfoFlags::IS_METHOD),
            FunctionInfo::new("is_valid_name", FunctionInfoFlags::empty()).with_args(1),
        ]),
    );
    repo.add_info(BaseInfo::registered(InfoType::Object, "GObject", "ParamSpecInt", types.param_int));
    repo.add_info(BaseInfo::registered(InfoType::Object, "GObject", "Object", GType::OBJECT));
    repo.add_info(
        BaseInfo::registered(InfoType::Struct, "GObject", "ObjectClass", GType::NONE).as_gtype_struct(),
    );

    // Gio
    repo.add_info(BaseInfo::enumeration(
        "Gio",
        "IOErrorEnum",
        EnumInfo::new(types.io_error)
            .value("failed", 0)
            .value("not-found", 1)
            .value("exists", 2)
            .error_domain(IO_ERROR_DOMAIN),
    ));

    // Gdk
    repo.add_info(BaseInfo::enumeration(
        "Gdk",
        "Gravity",
        EnumInfo::new(types.gravity)
            .value("north-west", 1)
            .value("north", 2)
            .value("south-west", 7)
            .method(FunctionInfo::new("from_string", FunctionInfoFlags::empty()).with_args(1)),
    ));
    repo.add_info(BaseInfo::flags(
        "Gdk",
        "ModifierType",
        EnumInfo::new(types.modifier_type)
            .value("shift-mask", 1)
            .value("lock-mask", 2)
            .value("control-mask", 4),
    ));
    repo.add_info(BaseInfo::function("Gdk", FunctionInfo::new("beep", FunctionInfoFlags::empty())));
    repo.add_info(BaseInfo::other(InfoType::Callback, "Gdk", "EventFunc"));
    repo.add_info(
        BaseInfo::registered(InfoType::Boxed, "Gdk", "RGBA", types.rgba).with_methods(vec![
            FunctionInfo::new("to_string", FunctionInfoFlags::IS_METHOD),
            FunctionInfo::new("parse", FunctionInfoFlags::empty()).with_args(1),
        ]),
    );

    // Gtk
    repo.add_info(BaseInfo::registered(InfoType::Object, "Gtk", "Widget", types.widget));
    repo.add_info(BaseInfo::registered(InfoType::Interface, "Gtk", "Buildable", GType::NONE));

    (Arc::new(repo), types)
}

/// A runtime with one context and the sample repository bridged into it
pub struct Fixture {
    pub runtime: Runtime,
    pub cx: ContextId,
    pub repository: Arc<StaticRepository>,
    pub types: SampleTypes,
    pub bridge: Arc<Bridge>,
    pub repo: ObjectRef,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_bridge(|bridge| bridge)
    }

    pub fn with_bridge(configure: impl FnOnce(Bridge) -> Bridge) -> Self {
        init_tracing();
        let (repository, types) = sample_repository();
        let runtime = Runtime::new();
        let cx = runtime.create_context().unwrap();
        let bridge = Arc::new(configure(Bridge::new(repository.clone())));
        let repo = bridge.define_repo(&runtime, cx).unwrap();
        Self {
            runtime,
            cx,
            repository,
            types,
            bridge,
            repo,
        }
    }

    pub fn with_options(options: BridgeOptions) -> Self {
        Self::with_bridge(|bridge| bridge.with_options(options))
    }

    /// `repo[namespace]` as an object
    pub fn namespace(&self, namespace: &str) -> ObjectRef {
        self.runtime
            .get_property(self.repo, namespace)
            .unwrap()
            .as_object()
            .unwrap()
    }

    /// `repo[namespace][name]`
    pub fn get(&self, namespace: &str, name: &str) -> BridgeResult<ScriptValue> {
        let ns = self.namespace(namespace);
        self.runtime.get_property(ns, name)
    }

    /// `obj[name]` as an object
    pub fn object(&self, obj: ObjectRef, name: &str) -> ObjectRef {
        self.runtime.get_property(obj, name).unwrap().as_object().unwrap()
    }

    /// Call `obj[name]()` with `obj` as `this`
    pub fn call_method(&self, obj: ObjectRef, name: &str, args: &[ScriptValue]) -> BridgeResult<ScriptValue> {
        let method = self.runtime.get_property(obj, name)?;
        self.runtime.call_function(ScriptValue::Object(obj), &method, args)
    }
}

/// A plain script function returning `value`
pub fn constant_function(runtime: &Runtime, value: ScriptValue) -> ObjectRef {
    runtime
        .new_function("constant", 0, native_fn(move |_, _| Ok(value.clone())))
        .unwrap()
}

/// Definers that record every delegated definition before defining it the
/// basic way
#[derive(Default)]
pub struct RecordingDefiners {
    pub calls: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingDefiners {
    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls.lock().clone()
    }

    fn record(&self, kind: &'static str, name: &str) {
        self.calls.lock().push((kind, name.to_string()));
    }
}

impl TypeDefiners for RecordingDefiners {
    fn define_function(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        function: &FunctionInfo,
    ) -> BridgeResult<ObjectRef> {
        self.record("function", &function.name);
        BasicDefiners.define_function(engine, bridge, in_object, function)
    }

    fn define_object_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        self.record("object", info.name());
        BasicDefiners.define_object_class(engine, bridge, in_object, info)
    }

    fn define_fundamental_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        self.record("fundamental", info.name());
        BasicDefiners.define_fundamental_class(engine, bridge, in_object, info)
    }

    fn define_boxed_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        self.record("boxed", info.name());
        BasicDefiners.define_boxed_class(engine, bridge, in_object, info)
    }

    fn define_union_class(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        self.record("union", info.name());
        BasicDefiners.define_union_class(engine, bridge, in_object, info)
    }

    fn define_interface(
        &self,
        engine: &dyn ScriptEngine,
        bridge: &Bridge,
        in_object: ObjectRef,
        info: &BaseInfo,
    ) -> BridgeResult<()> {
        self.record("interface", info.name());
        BasicDefiners.define_interface(engine, bridge, in_object, info)
    }
}
