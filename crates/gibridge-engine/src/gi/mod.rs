//! Introspection bridge
//!
//! Everything that turns metadata infos into script objects, plus the two
//! lifetime helpers native callbacks depend on: [`Closure`] and the
//! [`KeepAlive`] registry.

pub mod bridge;
pub mod closure;
pub mod definers;
pub mod enumeration;
pub mod gerror;
pub mod gtype;
pub mod keep_alive;
pub mod ns;
pub mod param;
pub mod repo;

pub use bridge::{Bridge, OverrideFn};
pub use closure::{Closure, ExceptionPolicy, Invocation, Rooting};
pub use definers::{BasicDefiners, NativeInstance, TypeDefiners};
pub use enumeration::{define_enumeration, fixed_value_name};
pub use gerror::{
    define_error_class, error_from_record, error_to_record, make_error_from_script, script_error_quark,
    throw_error_record, ErrorRecord, ScriptErrorCode,
};
pub use gtype::{gtype_from_object, gtype_wrapper};
pub use keep_alive::{ChildData, KeepAlive, NotifyFn};
pub use ns::Namespace;
pub use param::{define_param_class, gparam_from_param, param_from_gparam, typecheck_param, ParamSpec};
pub use repo::{
    classify, define_info, lookup_generic_constructor, lookup_generic_prototype, lookup_namespace_object,
    lookup_namespace_object_by_name, lookup_private_namespace, new_object_with_generic_prototype, Definable,
};
