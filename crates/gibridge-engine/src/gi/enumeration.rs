//! Enumerations and flag sets
//!
//! An enumeration becomes a plain object with one integer property per member,
//! named in SCREAMING_SNAKE_CASE, plus `$gtype` and the enumeration's static
//! functions.

use std::sync::Arc;

use gibridge_sdk::{
    from_native, BaseInfo, BridgeError, BridgeResult, ObjectRef, PropertyFlags, ScriptEngine, ScriptValue,
    ValueInfo,
};

use super::bridge::Bridge;
use super::gtype::gtype_wrapper;

/// Property name for a member: ASCII letters upper-cased, everything that is
/// not a letter or digit replaced by `_`.
///
/// Leading digits and names that collide after normalisation are passed
/// through as they are.
pub fn fixed_value_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase() || upper.is_ascii_digit() {
                upper
            } else {
                '_'
            }
        })
        .collect()
}

/// Define one member on `in_object`
pub fn define_enum_value(
    engine: &dyn ScriptEngine,
    in_object: ObjectRef,
    parent_name: &str,
    value: &ValueInfo,
) -> BridgeResult<()> {
    let fixed = fixed_value_name(&value.name);
    tracing::trace!(
        target: "gibridge::enum",
        "Defining enum value {} (fixed from {}) {}",
        fixed,
        value.name,
        value.value
    );
    engine
        .define_property(in_object, &fixed, from_native(value.value), PropertyFlags::MODULE)
        .map_err(|err| {
            BridgeError::Failed(format!(
                "Unable to define enumeration value {} {}={} ({})",
                parent_name, fixed, value.value, err
            ))
        })
}

/// Define every member of an enumeration and its `$gtype` on `in_object`
pub fn define_enum_values(
    engine: &dyn ScriptEngine,
    bridge: &Bridge,
    in_object: ObjectRef,
    info: &BaseInfo,
) -> BridgeResult<()> {
    if let Some(enum_info) = info.enum_info() {
        for value in &enum_info.values {
            define_enum_value(engine, in_object, info.name(), value)?;
        }
    }
    let wrapper = gtype_wrapper(engine, bridge.repository(), info.gtype())?;
    engine.define_property(in_object, "$gtype", ScriptValue::Object(wrapper), PropertyFlags::PERMANENT)
}

/// Define the non-method functions of an enumeration on `constructor`
pub fn define_enum_static_methods(
    engine: &dyn ScriptEngine,
    bridge: &Bridge,
    constructor: ObjectRef,
    info: &BaseInfo,
) -> BridgeResult<()> {
    for method in info.methods().iter().filter(|m| !m.is_method()) {
        tracing::trace!(
            target: "gibridge::enum",
            "Defining static method {} on {}",
            method.name,
            info.qualified_name()
        );
        bridge
            .definers()
            .define_function(engine, bridge, constructor, method)?;
    }
    Ok(())
}

/// Define the enumeration `info` as a property of `in_object`.
///
/// The object is fully populated before it becomes visible.
pub fn define_enumeration(
    engine: &dyn ScriptEngine,
    bridge: &Arc<Bridge>,
    in_object: ObjectRef,
    info: &BaseInfo,
) -> BridgeResult<()> {
    let enum_obj = engine.new_plain_object()?;
    define_enum_values(engine, bridge, enum_obj, info)?;
    define_enum_static_methods(engine, bridge, enum_obj, info)?;

    tracing::debug!(target: "gibridge::enum", "Defining {} as {:?}", info.qualified_name(), enum_obj);
    engine.define_property(in_object, info.name(), ScriptValue::Object(enum_obj), PropertyFlags::MODULE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_value_name() {
        assert_eq!(fixed_value_name("south-west"), "SOUTH_WEST");
        assert_eq!(fixed_value_name("foo_bar2"), "FOO_BAR2");
        assert_eq!(fixed_value_name("a.b c"), "A_B_C");
        assert_eq!(fixed_value_name("2d"), "2D");
    }
}
