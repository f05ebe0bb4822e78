//! gibridge SDK - core types for binding introspected native libraries to a
//! script engine
//!
//! This crate provides the pieces that do not depend on a particular engine:
//! argument slots, scalar conversion, the introspection data model and the
//! [`ScriptEngine`] trait that engines implement.
//!
//! # Example
//!
//! ```ignore
//! use gibridge_sdk::{Argument, GBoolean};
//!
//! let mut arg = Argument::new();
//! arg.set::<GBoolean>(true);
//! assert_eq!(arg.get::<i32>(), 1);
//! ```

#![warn(missing_docs)]

pub mod arg;
pub mod context;
pub mod convert;
pub mod error;
pub mod repository;
pub mod value;

#[cfg(test)]
mod testing;

pub use arg::{
    array_length, is_safe_big_number, set_array_length, ArgTag, Argument, BigInteger, CodePointer,
    Enum, GBoolean, Long, PointerInt, UnsignedEnum, UnsignedLong, MAX_SAFE_BIG_NUMBER,
    MIN_SAFE_BIG_NUMBER,
};
pub use context::{
    downcast_private, native_fn, private_as, AutoContext, CallArgs, Coercion, ContextId,
    NativeFunction, ObjectPrivate, PropertyFlags, RootId, RootSlot, RuntimeId, ScriptEngine,
    Tracer,
};
pub use convert::{
    from_native, from_native_checked, set_argument_from_value, to_native, to_native_checked,
    value_from_argument, Coerced, NativeScalar,
};
pub use error::{BridgeError, BridgeResult, RepositoryError};
pub use repository::{
    BaseInfo, ConstantInfo, ConstantValue, EnumInfo, FunctionInfo, FunctionInfoFlags, GType,
    InfoDetails, InfoRef, InfoType, Quark, Repository, TypeTag, ValueInfo,
};
pub use value::{ObjectRef, ScriptValue};
