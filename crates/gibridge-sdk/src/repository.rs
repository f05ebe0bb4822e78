//! Introspection data model and the repository oracle
//!
//! A [`Repository`] answers questions about loaded native namespaces: which
//! info objects exist, how types relate, which versions are installed. The
//! definer family in the engine crate turns the answers into script objects.

use std::ffi::CString;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::arg::{Argument, GBoolean};
use crate::error::RepositoryError;

// ============================================================================
// GType
// ============================================================================

const FUNDAMENTAL_SHIFT: usize = 2;

/// Runtime type identifier of a native type.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GType(pub usize);

impl GType {
    /// Invalid type
    pub const INVALID: GType = GType(0);
    /// No type
    pub const NONE: GType = GType(1 << FUNDAMENTAL_SHIFT);
    /// Interface fundamental
    pub const INTERFACE: GType = GType(2 << FUNDAMENTAL_SHIFT);
    /// `gchar`
    pub const CHAR: GType = GType(3 << FUNDAMENTAL_SHIFT);
    /// `guchar`
    pub const UCHAR: GType = GType(4 << FUNDAMENTAL_SHIFT);
    /// `gboolean`
    pub const BOOLEAN: GType = GType(5 << FUNDAMENTAL_SHIFT);
    /// `gint`
    pub const INT: GType = GType(6 << FUNDAMENTAL_SHIFT);
    /// `guint`
    pub const UINT: GType = GType(7 << FUNDAMENTAL_SHIFT);
    /// `glong`
    pub const LONG: GType = GType(8 << FUNDAMENTAL_SHIFT);
    /// `gulong`
    pub const ULONG: GType = GType(9 << FUNDAMENTAL_SHIFT);
    /// `gint64`
    pub const INT64: GType = GType(10 << FUNDAMENTAL_SHIFT);
    /// `guint64`
    pub const UINT64: GType = GType(11 << FUNDAMENTAL_SHIFT);
    /// Enumeration fundamental
    pub const ENUM: GType = GType(12 << FUNDAMENTAL_SHIFT);
    /// Flags fundamental
    pub const FLAGS: GType = GType(13 << FUNDAMENTAL_SHIFT);
    /// `gfloat`
    pub const FLOAT: GType = GType(14 << FUNDAMENTAL_SHIFT);
    /// `gdouble`
    pub const DOUBLE: GType = GType(15 << FUNDAMENTAL_SHIFT);
    /// UTF-8 string
    pub const STRING: GType = GType(16 << FUNDAMENTAL_SHIFT);
    /// Untyped pointer
    pub const POINTER: GType = GType(17 << FUNDAMENTAL_SHIFT);
    /// Boxed fundamental
    pub const BOXED: GType = GType(18 << FUNDAMENTAL_SHIFT);
    /// Parameter specification fundamental
    pub const PARAM: GType = GType(19 << FUNDAMENTAL_SHIFT);
    /// Object fundamental
    pub const OBJECT: GType = GType(20 << FUNDAMENTAL_SHIFT);
    /// Boxed error record type. Registered at a fixed id by every repository.
    pub const ERROR: GType = GType(256 << FUNDAMENTAL_SHIFT);

    /// Raw id
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Whether this is one of the reserved fundamental ids
    pub const fn is_fundamental(self) -> bool {
        self.0 <= GType::OBJECT.0
    }
}

impl fmt::Debug for GType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GType({})", self.0)
    }
}

// ============================================================================
// Quark
// ============================================================================

/// Interned string identifier, used for error domains.
///
/// Quark 0 is the empty quark and never names a string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Quark(u32);

#[derive(Default)]
struct QuarkTable {
    ids: FxHashMap<Arc<str>, u32>,
    strings: Vec<Arc<str>>,
}

static QUARKS: Lazy<RwLock<QuarkTable>> = Lazy::new(|| RwLock::new(QuarkTable::default()));

impl Quark {
    /// Intern `s`, returning the same quark for equal strings.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Quark {
        if let Some(id) = QUARKS.read().ids.get(s) {
            return Quark(*id);
        }
        let mut table = QUARKS.write();
        if let Some(id) = table.ids.get(s) {
            return Quark(*id);
        }
        let interned: Arc<str> = Arc::from(s);
        table.strings.push(interned.clone());
        let id = table.strings.len() as u32;
        table.ids.insert(interned, id);
        Quark(id)
    }

    /// Look up an already interned string without interning it.
    pub fn try_from_str(s: &str) -> Option<Quark> {
        QUARKS.read().ids.get(s).map(|id| Quark(*id))
    }

    /// Rebuild a quark from its raw id
    pub const fn from_raw(id: u32) -> Quark {
        Quark(id)
    }

    /// Raw id
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The interned string, `None` for the empty quark or unknown ids
    pub fn as_str(self) -> Option<Arc<str>> {
        if self.0 == 0 {
            return None;
        }
        QUARKS.read().strings.get(self.0 as usize - 1).cloned()
    }
}

impl fmt::Debug for Quark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "Quark({:?})", s),
            None => write!(f, "Quark({})", self.0),
        }
    }
}

impl fmt::Display for Quark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => f.write_str(&s),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Type tags
// ============================================================================

/// Storage tag of a value in an argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// No value
    Void,
    /// `gboolean`
    Boolean,
    /// `gint8`
    Int8,
    /// `guint8`
    UInt8,
    /// `gint16`
    Int16,
    /// `guint16`
    UInt16,
    /// `gint32`
    Int32,
    /// `guint32`
    UInt32,
    /// `gint64`
    Int64,
    /// `guint64`
    UInt64,
    /// `gfloat`
    Float,
    /// `gdouble`
    Double,
    /// Type id
    GType,
    /// UTF-8 string
    Utf8,
    /// Filename string
    Filename,
    /// Unicode code point
    Unichar,
    /// Array
    Array,
    /// Registered interface/struct/object
    Interface,
    /// Doubly linked list
    GList,
    /// Singly linked list
    GSList,
    /// Hash table
    GHash,
    /// Error record
    Error,
}

impl TypeTag {
    /// Lower-case name, as used in messages
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Void => "void",
            TypeTag::Boolean => "gboolean",
            TypeTag::Int8 => "gint8",
            TypeTag::UInt8 => "guint8",
            TypeTag::Int16 => "gint16",
            TypeTag::UInt16 => "guint16",
            TypeTag::Int32 => "gint32",
            TypeTag::UInt32 => "guint32",
            TypeTag::Int64 => "gint64",
            TypeTag::UInt64 => "guint64",
            TypeTag::Float => "gfloat",
            TypeTag::Double => "gdouble",
            TypeTag::GType => "GType",
            TypeTag::Utf8 => "utf8",
            TypeTag::Filename => "filename",
            TypeTag::Unichar => "gunichar",
            TypeTag::Array => "array",
            TypeTag::Interface => "interface",
            TypeTag::GList => "glist",
            TypeTag::GSList => "gslist",
            TypeTag::GHash => "ghash",
            TypeTag::Error => "error",
        }
    }

    /// Whether the tag describes a scalar or string stored inline in the slot
    pub fn is_basic(self) -> bool {
        !matches!(
            self,
            TypeTag::Array
                | TypeTag::Interface
                | TypeTag::GList
                | TypeTag::GSList
                | TypeTag::GHash
                | TypeTag::Error
        )
    }

    /// Whether a basic value of this tag owns memory that must be released
    pub fn basic_type_needs_release(self) -> bool {
        matches!(self, TypeTag::Utf8 | TypeTag::Filename)
    }
}

// ============================================================================
// Info objects
// ============================================================================

/// Kind of an introspection info object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoType {
    /// Invalid info
    Invalid,
    /// Function
    Function,
    /// Callback type
    Callback,
    /// Plain struct
    Struct,
    /// Boxed type
    Boxed,
    /// Enumeration
    Enum,
    /// Flag set
    Flags,
    /// Object class
    Object,
    /// Interface
    Interface,
    /// Constant
    Constant,
    /// Union
    Union,
    /// Enum/flags member
    Value,
    /// Signal
    Signal,
    /// Virtual function
    VFunc,
    /// Property
    Property,
    /// Struct field
    Field,
    /// Function argument
    Arg,
    /// Type reference
    Type,
    /// Unresolved reference
    Unresolved,
}

impl InfoType {
    /// Upper-case kind name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            InfoType::Invalid => "INVALID",
            InfoType::Function => "FUNCTION",
            InfoType::Callback => "CALLBACK",
            InfoType::Struct => "STRUCT",
            InfoType::Boxed => "BOXED",
            InfoType::Enum => "ENUM",
            InfoType::Flags => "FLAGS",
            InfoType::Object => "OBJECT",
            InfoType::Interface => "INTERFACE",
            InfoType::Constant => "CONSTANT",
            InfoType::Union => "UNION",
            InfoType::Value => "VALUE",
            InfoType::Signal => "SIGNAL",
            InfoType::VFunc => "VFUNC",
            InfoType::Property => "PROPERTY",
            InfoType::Field => "FIELD",
            InfoType::Arg => "ARG",
            InfoType::Type => "TYPE",
            InfoType::Unresolved => "UNRESOLVED",
        }
    }
}

bitflags::bitflags! {
    /// Flags of a function info
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FunctionInfoFlags: u32 {
        /// Takes an instance as first argument
        const IS_METHOD = 1 << 0;
        /// Constructor
        const IS_CONSTRUCTOR = 1 << 1;
        /// Property getter
        const IS_GETTER = 1 << 2;
        /// Property setter
        const IS_SETTER = 1 << 3;
        /// Wraps a virtual function
        const WRAPS_VFUNC = 1 << 4;
        /// May raise an error record
        const THROWS = 1 << 5;
    }
}

/// A callable entry point
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    /// Script-visible name
    pub name: String,
    /// Flags
    pub flags: FunctionInfoFlags,
    /// Number of script arguments
    pub n_args: u32,
}

impl FunctionInfo {
    /// Create a function info
    pub fn new(name: impl Into<String>, flags: FunctionInfoFlags) -> Self {
        Self {
            name: name.into(),
            flags,
            n_args: 0,
        }
    }

    /// Set the argument count
    pub fn with_args(mut self, n_args: u32) -> Self {
        self.n_args = n_args;
        self
    }

    /// Whether this is an instance method
    pub fn is_method(&self) -> bool {
        self.flags.contains(FunctionInfoFlags::IS_METHOD)
    }
}

/// One member of an enumeration or flag set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueInfo {
    /// Member name as written in the introspection data
    pub name: String,
    /// Numeric value
    pub value: i64,
}

/// Enumeration or flag-set details
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnumInfo {
    /// Registered type, `GType::NONE` when unregistered
    pub gtype: GType,
    /// Members in declaration order
    pub values: Vec<ValueInfo>,
    /// Attached functions
    pub methods: Vec<FunctionInfo>,
    /// Error domain string, for enums that enumerate error codes
    pub error_domain: Option<String>,
}

impl EnumInfo {
    /// Create an enum info for `gtype`
    pub fn new(gtype: GType) -> Self {
        Self {
            gtype,
            ..Default::default()
        }
    }

    /// Add a member
    pub fn value(mut self, name: impl Into<String>, value: i64) -> Self {
        self.values.push(ValueInfo {
            name: name.into(),
            value,
        });
        self
    }

    /// Add an attached function
    pub fn method(mut self, method: FunctionInfo) -> Self {
        self.methods.push(method);
        self
    }

    /// Mark as an error-code enumeration for `domain`
    pub fn error_domain(mut self, domain: impl Into<String>) -> Self {
        self.error_domain = Some(domain.into());
        self
    }
}

/// Value of a constant as recorded in introspection data
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    /// Boolean constant
    Boolean(bool),
    /// Signed integer constant
    Int(i64),
    /// Unsigned integer constant
    UInt(u64),
    /// Floating point constant
    Double(f64),
    /// String constant
    Utf8(String),
}

/// Constant details
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantInfo {
    /// Storage tag
    pub type_tag: TypeTag,
    /// Value
    pub value: ConstantValue,
}

/// A constant loaded into an argument slot.
///
/// Owns any string storage the slot points at.
pub struct LoadedConstant {
    argument: Argument,
    _storage: Option<CString>,
}

impl LoadedConstant {
    /// The loaded slot
    pub fn argument(&self) -> &Argument {
        &self.argument
    }
}

impl ConstantInfo {
    /// Create a constant
    pub fn new(type_tag: TypeTag, value: ConstantValue) -> Self {
        Self { type_tag, value }
    }

    /// Store the value in a fresh argument slot according to `type_tag`.
    pub fn load(&self) -> LoadedConstant {
        let mut arg = Argument::new();
        let mut storage = None;
        let int = match &self.value {
            ConstantValue::Boolean(b) => *b as i64,
            ConstantValue::Int(i) => *i,
            ConstantValue::UInt(u) => *u as i64,
            ConstantValue::Double(d) => *d as i64,
            ConstantValue::Utf8(_) => 0,
        };
        match (self.type_tag, &self.value) {
            (TypeTag::Boolean, _) => arg.set::<GBoolean>(int != 0),
            (TypeTag::Int8, _) => arg.set::<i8>(int as i8),
            (TypeTag::UInt8, _) => arg.set::<u8>(int as u8),
            (TypeTag::Int16, _) => arg.set::<i16>(int as i16),
            (TypeTag::UInt16, _) => arg.set::<u16>(int as u16),
            (TypeTag::Int32, _) => arg.set::<i32>(int as i32),
            (TypeTag::UInt32, _) => arg.set::<u32>(int as u32),
            (TypeTag::Int64, _) => arg.set::<i64>(int),
            (TypeTag::UInt64, ConstantValue::UInt(u)) => arg.set::<u64>(*u),
            (TypeTag::UInt64, _) => arg.set::<u64>(int as u64),
            (TypeTag::Float, ConstantValue::Double(d)) => arg.set::<f32>(*d as f32),
            (TypeTag::Float, _) => arg.set::<f32>(int as f32),
            (TypeTag::Double, ConstantValue::Double(d)) => arg.set::<f64>(*d),
            (TypeTag::Double, _) => arg.set::<f64>(int as f64),
            (TypeTag::Utf8 | TypeTag::Filename, ConstantValue::Utf8(s)) => {
                let text = s.split('\0').next().unwrap_or_default();
                let owned = CString::new(text).unwrap_or_default();
                arg.set::<*mut std::ffi::c_char>(owned.as_ptr() as *mut _);
                storage = Some(owned);
            }
            _ => {}
        }
        LoadedConstant {
            argument: arg,
            _storage: storage,
        }
    }
}

/// Kind-specific payload of an info object
#[derive(Debug, Clone, PartialEq)]
pub enum InfoDetails {
    /// Nothing beyond the name
    Plain,
    /// Function
    Function(FunctionInfo),
    /// Registered type (object, interface, struct, boxed, union)
    Registered {
        /// Type id
        gtype: GType,
        /// Whether the struct is the class/interface struct of another type
        is_gtype_struct: bool,
        /// Attached functions
        methods: Vec<FunctionInfo>,
    },
    /// Enumeration or flags
    Enum(EnumInfo),
    /// Constant
    Constant(ConstantInfo),
}

/// Introspection info object
#[derive(Debug, Clone, PartialEq)]
pub struct BaseInfo {
    info_type: InfoType,
    namespace: Option<String>,
    name: String,
    details: InfoDetails,
}

/// Shared info handle
pub type InfoRef = Arc<BaseInfo>;

impl BaseInfo {
    fn with_details(info_type: InfoType, namespace: &str, name: &str, details: InfoDetails) -> Self {
        Self {
            info_type,
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
            details,
        }
    }

    /// Function info named after the function
    pub fn function(namespace: &str, function: FunctionInfo) -> Self {
        let name = function.name.clone();
        Self::with_details(InfoType::Function, namespace, &name, InfoDetails::Function(function))
    }

    /// Registered type info (object, interface, struct, boxed or union)
    pub fn registered(info_type: InfoType, namespace: &str, name: &str, gtype: GType) -> Self {
        Self::with_details(
            info_type,
            namespace,
            name,
            InfoDetails::Registered {
                gtype,
                is_gtype_struct: false,
                methods: Vec::new(),
            },
        )
    }

    /// Enumeration info
    pub fn enumeration(namespace: &str, name: &str, info: EnumInfo) -> Self {
        Self::with_details(InfoType::Enum, namespace, name, InfoDetails::Enum(info))
    }

    /// Flag-set info
    pub fn flags(namespace: &str, name: &str, info: EnumInfo) -> Self {
        Self::with_details(InfoType::Flags, namespace, name, InfoDetails::Enum(info))
    }

    /// Constant info
    pub fn constant(namespace: &str, name: &str, info: ConstantInfo) -> Self {
        Self::with_details(InfoType::Constant, namespace, name, InfoDetails::Constant(info))
    }

    /// Info with no payload (callbacks, signals, ...)
    pub fn other(info_type: InfoType, namespace: &str, name: &str) -> Self {
        Self::with_details(info_type, namespace, name, InfoDetails::Plain)
    }

    /// Attach methods to a registered type
    pub fn with_methods(mut self, new_methods: Vec<FunctionInfo>) -> Self {
        if let InfoDetails::Registered { methods, .. } = &mut self.details {
            methods.extend(new_methods);
        }
        self
    }

    /// Mark a struct as the class struct of another type
    pub fn as_gtype_struct(mut self) -> Self {
        if let InfoDetails::Registered { is_gtype_struct, .. } = &mut self.details {
            *is_gtype_struct = true;
        }
        self
    }

    /// Drop the namespace, as for infos created outside any typelib
    pub fn without_namespace(mut self) -> Self {
        self.namespace = None;
        self
    }

    /// Kind
    pub fn info_type(&self) -> InfoType {
        self.info_type
    }

    /// Containing namespace
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Name within the namespace
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind-specific payload
    pub fn details(&self) -> &InfoDetails {
        &self.details
    }

    /// Registered type id, `GType::NONE` for unregistered infos
    pub fn gtype(&self) -> GType {
        match &self.details {
            InfoDetails::Registered { gtype, .. } => *gtype,
            InfoDetails::Enum(info) => info.gtype,
            _ => GType::NONE,
        }
    }

    /// Whether this is a class or interface struct
    pub fn is_gtype_struct(&self) -> bool {
        matches!(
            self.details,
            InfoDetails::Registered {
                is_gtype_struct: true,
                ..
            }
        )
    }

    /// Function payload
    pub fn function_info(&self) -> Option<&FunctionInfo> {
        match &self.details {
            InfoDetails::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Enumeration payload
    pub fn enum_info(&self) -> Option<&EnumInfo> {
        match &self.details {
            InfoDetails::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Constant payload
    pub fn constant_info(&self) -> Option<&ConstantInfo> {
        match &self.details {
            InfoDetails::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Attached functions of a registered type or enumeration
    pub fn methods(&self) -> &[FunctionInfo] {
        match &self.details {
            InfoDetails::Registered { methods, .. } => methods,
            InfoDetails::Enum(info) => &info.methods,
            _ => &[],
        }
    }

    /// Find an attached function by name
    pub fn find_method(&self, name: &str) -> Option<&FunctionInfo> {
        self.methods().iter().find(|m| m.name == name)
    }

    /// `Namespace.Name`, or just the name without a namespace
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

// ============================================================================
// Repository
// ============================================================================

/// Introspection oracle.
///
/// Implementations are shared across threads; the engine consults them while
/// resolving lazily defined properties.
pub trait Repository: Send + Sync {
    /// Find an info by namespace and name
    fn find_by_name(&self, namespace: &str, name: &str) -> Option<InfoRef>;

    /// Find the info describing a registered type
    fn find_by_gtype(&self, gtype: GType) -> Option<InfoRef>;

    /// Find the error-code enumeration for an error domain
    fn find_by_error_domain(&self, domain: Quark) -> Option<InfoRef>;

    /// Load a namespace, optionally at a specific version
    fn require(&self, namespace: &str, version: Option<&str>) -> Result<(), RepositoryError>;

    /// Versions of a namespace that could be loaded
    fn enumerate_versions(&self, namespace: &str) -> Vec<String>;

    /// Whether the namespace is loaded (at `version`, if given)
    fn is_registered(&self, namespace: &str, version: Option<&str>) -> bool;

    /// Registered name of a type
    fn type_name(&self, gtype: GType) -> Option<String>;

    /// Parent type
    fn type_parent(&self, gtype: GType) -> Option<GType>;

    /// Whether instances of the type can be created
    fn type_is_instantiatable(&self, gtype: GType) -> bool;

    /// Whether `gtype` is `ancestor` or derives from it
    fn type_is_a(&self, gtype: GType, ancestor: GType) -> bool {
        let mut current = Some(gtype);
        while let Some(t) = current {
            if t == ancestor {
                return true;
            }
            current = self.type_parent(t);
        }
        false
    }

    /// Root of the type's ancestry
    fn type_fundamental(&self, gtype: GType) -> GType {
        let mut current = gtype;
        while let Some(parent) = self.type_parent(current) {
            current = parent;
        }
        current
    }
}
