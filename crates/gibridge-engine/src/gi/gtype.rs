//! `$gtype` wrapper objects
//!
//! Constructors and enum objects expose their registered type as a small
//! wrapper object carrying the type's name. Wrappers are created fresh on each
//! request; identity comparisons between two wrappers of the same type do not
//! hold.

use std::sync::Arc;

use gibridge_sdk::{
    native_fn, private_as, BridgeResult, GType, ObjectPrivate, ObjectRef, PropertyFlags,
    Repository, ScriptEngine, ScriptValue,
};

/// Class name of wrapper objects
pub const GTYPE_CLASS: &str = "GIRepositoryGType";

/// Private data of a wrapper object
#[derive(Debug)]
pub struct GTypeWrapper {
    gtype: GType,
}

impl GTypeWrapper {
    /// Wrapped type
    pub fn gtype(&self) -> GType {
        self.gtype
    }
}

impl ObjectPrivate for GTypeWrapper {}

/// Create a wrapper object for `gtype`
pub fn gtype_wrapper(
    engine: &dyn ScriptEngine,
    repository: &dyn Repository,
    gtype: GType,
) -> BridgeResult<ObjectRef> {
    let name = repository
        .type_name(gtype)
        .unwrap_or_else(|| "<invalid>".to_string());
    let obj = engine.new_object(GTYPE_CLASS, None, Some(Arc::new(GTypeWrapper { gtype })))?;
    engine.define_property(
        obj,
        "name",
        ScriptValue::string(&name),
        PropertyFlags::READONLY | PropertyFlags::PERMANENT,
    )?;
    let description = format!("[object GType for '{}']", name);
    engine.define_function(
        obj,
        "toString",
        0,
        native_fn(move |_, _| Ok(ScriptValue::string(&description))),
        PropertyFlags::PERMANENT,
    )?;
    Ok(obj)
}

/// Type wrapped by `obj`, or by its `$gtype` property
pub fn gtype_from_object(engine: &dyn ScriptEngine, obj: ObjectRef) -> BridgeResult<Option<GType>> {
    if let Some(wrapper) = private_as::<GTypeWrapper>(engine, obj) {
        return Ok(Some(wrapper.gtype));
    }
    Ok(engine
        .get_property(obj, "$gtype")?
        .as_object()
        .and_then(|inner| private_as::<GTypeWrapper>(engine, inner))
        .map(|wrapper| wrapper.gtype))
}
