//! ScriptValue: dynamically typed values as seen by the script engine
//!
//! Objects are handles into an engine heap; everything else is stored inline.
//! The primitive coercions here follow the script language's abstract
//! operations (ToNumber, ToInt32, ToUint32, ToBoolean). Coercing an object needs
//! the engine and is handled by [`ScriptEngine`](crate::context::ScriptEngine).

use std::fmt;
use std::sync::Arc;

/// Handle to an object living on a script heap.
///
/// The generation distinguishes a reused heap slot from the object that
/// previously occupied it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    index: u32,
    generation: u32,
}

impl ObjectRef {
    /// Create a handle from raw parts
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Heap slot index
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef(#{}.{})", self.index, self.generation)
    }
}

/// A script value
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ScriptValue {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number that is an exact 32-bit integer
    Int(i32),
    /// Any other number
    Double(f64),
    /// Arbitrary-precision integer (bounded to 128 bits here)
    BigInt(i128),
    /// Immutable string
    String(Arc<str>),
    /// Heap object
    Object(ObjectRef),
}

impl ScriptValue {
    /// Build a number, preferring the `Int` representation when exact.
    pub fn number(value: f64) -> Self {
        if value.fract() == 0.0
            && value >= i32::MIN as f64
            && value <= i32::MAX as f64
            && !(value == 0.0 && value.is_sign_negative())
        {
            ScriptValue::Int(value as i32)
        } else {
            ScriptValue::Double(value)
        }
    }

    /// Build a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        ScriptValue::String(Arc::from(s.as_ref()))
    }

    /// `typeof`-style name of the value kind
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Int(_) | ScriptValue::Double(_) => "number",
            ScriptValue::BigInt(_) => "bigint",
            ScriptValue::String(_) => "string",
            ScriptValue::Object(_) => "object",
        }
    }

    // ========================================================================
    // Type checks
    // ========================================================================

    /// Is `undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, ScriptValue::Undefined)
    }

    /// Is `null`
    pub fn is_null(&self) -> bool {
        matches!(self, ScriptValue::Null)
    }

    /// Is `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    /// Is a number
    pub fn is_number(&self) -> bool {
        matches!(self, ScriptValue::Int(_) | ScriptValue::Double(_))
    }

    /// Is a BigInt
    pub fn is_bigint(&self) -> bool {
        matches!(self, ScriptValue::BigInt(_))
    }

    /// Is a string
    pub fn is_string(&self) -> bool {
        matches!(self, ScriptValue::String(_))
    }

    /// Is an object
    pub fn is_object(&self) -> bool {
        matches!(self, ScriptValue::Object(_))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Object handle, if this is an object
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            ScriptValue::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean payload, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric payload, if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Int(i) => Some(*i as f64),
            ScriptValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    // ========================================================================
    // Primitive coercions
    // ========================================================================

    /// ToBoolean
    pub fn to_boolean(&self) -> bool {
        match self {
            ScriptValue::Undefined | ScriptValue::Null => false,
            ScriptValue::Bool(b) => *b,
            ScriptValue::Int(i) => *i != 0,
            ScriptValue::Double(d) => !(*d == 0.0 || d.is_nan()),
            ScriptValue::BigInt(b) => *b != 0,
            ScriptValue::String(s) => !s.is_empty(),
            ScriptValue::Object(_) => true,
        }
    }

    /// ToNumber for primitives.
    ///
    /// Returns `None` for BigInt (a TypeError in script) and for objects.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Undefined => Some(f64::NAN),
            ScriptValue::Null => Some(0.0),
            ScriptValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ScriptValue::Int(i) => Some(*i as f64),
            ScriptValue::Double(d) => Some(*d),
            ScriptValue::String(s) => Some(string_to_number(s)),
            ScriptValue::BigInt(_) | ScriptValue::Object(_) => None,
        }
    }

    /// ToInt32 for primitives
    pub fn to_int32(&self) -> Option<i32> {
        self.to_number().map(|n| wrap_to_u32(n) as i32)
    }

    /// ToUint32 for primitives
    pub fn to_uint32(&self) -> Option<u32> {
        self.to_number().map(wrap_to_u32)
    }
}

fn wrap_to_u32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let radix = match trimmed.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return match u64::from_str_radix(&trimmed[2..], radix) {
            Ok(v) => v as f64,
            Err(_) => f64::NAN,
        };
    }
    // Rust's float parser also accepts "inf" and "nan", which script does not.
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<i32> for ScriptValue {
    fn from(i: i32) -> Self {
        ScriptValue::Int(i)
    }
}

impl From<f64> for ScriptValue {
    fn from(d: f64) -> Self {
        ScriptValue::number(d)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::string(s)
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(Arc::from(s))
    }
}

impl From<ObjectRef> for ScriptValue {
    fn from(obj: ObjectRef) -> Self {
        ScriptValue::Object(obj)
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => write!(f, "undefined"),
            ScriptValue::Null => write!(f, "null"),
            ScriptValue::Bool(b) => write!(f, "{}", b),
            ScriptValue::Int(i) => write!(f, "{}", i),
            ScriptValue::Double(d) if d.is_nan() => write!(f, "NaN"),
            ScriptValue::Double(d) if d.is_infinite() => {
                write!(f, "{}Infinity", if *d < 0.0 { "-" } else { "" })
            }
            ScriptValue::Double(d) => write!(f, "{}", d),
            ScriptValue::BigInt(b) => write!(f, "{}n", b),
            ScriptValue::String(s) => write!(f, "{}", s),
            ScriptValue::Object(obj) => write!(f, "[object {:?}]", obj),
        }
    }
}
