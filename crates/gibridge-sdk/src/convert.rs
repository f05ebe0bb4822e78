//! Conversions between script values and native scalars
//!
//! Script values are first coerced into a canonical *holder* type chosen from
//! the target: the smallest of `i32`, `u32`, `f64` with the same signedness
//! and kind that can represent every target value. 64-bit integers use a
//! 128-bit carrier so that BigInt inputs and out-of-range numbers can be
//! detected exactly. The holder value is then narrowed to the target, with an
//! out-of-range flag for checked conversions.

use crate::arg::{ArgTag, Argument, GBoolean};
use crate::context::Coercion;
use crate::error::{BridgeError, BridgeResult};
use crate::repository::TypeTag;
use crate::value::ScriptValue;

/// Result of a checked conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coerced<T> {
    /// Converted value (wrapped or truncated when out of range)
    pub value: T,
    /// Whether the input did not fit the target type
    pub out_of_range: bool,
}

impl<T> Coerced<T> {
    fn exact(value: T) -> Self {
        Self {
            value,
            out_of_range: false,
        }
    }
}

/// Canonical intermediate types that script values are coerced into.
pub trait Canonical: Copy {
    /// Coerce a script value
    fn coerce<E: Coercion + ?Sized>(engine: &E, value: &ScriptValue) -> BridgeResult<Self>;
}

impl Canonical for i32 {
    fn coerce<E: Coercion + ?Sized>(engine: &E, value: &ScriptValue) -> BridgeResult<Self> {
        engine.to_int32(value)
    }
}

impl Canonical for u32 {
    fn coerce<E: Coercion + ?Sized>(engine: &E, value: &ScriptValue) -> BridgeResult<Self> {
        engine.to_uint32(value)
    }
}

impl Canonical for f64 {
    fn coerce<E: Coercion + ?Sized>(engine: &E, value: &ScriptValue) -> BridgeResult<Self> {
        engine.to_number(value)
    }
}

impl Canonical for bool {
    fn coerce<E: Coercion + ?Sized>(_engine: &E, value: &ScriptValue) -> BridgeResult<Self> {
        Ok(value.to_boolean())
    }
}

// Carrier for 64-bit targets. BigInt passes through exactly; numbers are
// truncated, and undefined or non-finite numbers become 0.
impl Canonical for i128 {
    fn coerce<E: Coercion + ?Sized>(engine: &E, value: &ScriptValue) -> BridgeResult<Self> {
        if let ScriptValue::BigInt(b) = value {
            return Ok(*b);
        }
        let n = engine.to_number(value)?;
        Ok(if n.is_finite() { n.trunc() as i128 } else { 0 })
    }
}

/// Native scalar types that script values convert to and from.
pub trait NativeScalar: Copy + 'static {
    /// Canonical holder type
    type Holder: Canonical;

    /// Native type name for messages
    const TYPE_NAME: &'static str;

    /// Narrow a holder value to this type
    fn from_holder(holder: Self::Holder) -> Coerced<Self>;

    /// Convert to a script value
    fn to_script(self) -> ScriptValue;

    /// Whether [`to_script`](Self::to_script) is exact for this value
    fn is_exact_in_script(self) -> bool {
        true
    }
}

macro_rules! int32_held {
    ($($t:ty),*) => {
        $(
            impl NativeScalar for $t {
                type Holder = i32;
                const TYPE_NAME: &'static str = stringify!($t);

                fn from_holder(h: i32) -> Coerced<Self> {
                    Coerced {
                        value: h as $t,
                        out_of_range: h < <$t>::MIN as i32 || h > <$t>::MAX as i32,
                    }
                }

                fn to_script(self) -> ScriptValue {
                    ScriptValue::Int(self as i32)
                }
            }
        )*
    };
}

macro_rules! uint32_held {
    ($($t:ty),*) => {
        $(
            impl NativeScalar for $t {
                type Holder = u32;
                const TYPE_NAME: &'static str = stringify!($t);

                fn from_holder(h: u32) -> Coerced<Self> {
                    Coerced {
                        value: h as $t,
                        out_of_range: h > <$t>::MAX as u32,
                    }
                }

                fn to_script(self) -> ScriptValue {
                    ScriptValue::number(self as f64)
                }
            }
        )*
    };
}

macro_rules! wide_held {
    ($($t:ty),*) => {
        $(
            impl NativeScalar for $t {
                type Holder = i128;
                const TYPE_NAME: &'static str = stringify!($t);

                fn from_holder(h: i128) -> Coerced<Self> {
                    Coerced {
                        value: h as $t,
                        out_of_range: h < <$t>::MIN as i128 || h > <$t>::MAX as i128,
                    }
                }

                fn to_script(self) -> ScriptValue {
                    ScriptValue::number(self as f64)
                }

                fn is_exact_in_script(self) -> bool {
                    let wide = self as i128;
                    wide >= crate::arg::MIN_SAFE_BIG_NUMBER as i128
                        && wide <= crate::arg::MAX_SAFE_BIG_NUMBER as i128
                }
            }
        )*
    };
}

int32_held!(i8, i16, i32);
uint32_held!(u8, u16, u32);
wide_held!(i64, u64, isize, usize);

impl NativeScalar for f64 {
    type Holder = f64;
    const TYPE_NAME: &'static str = "f64";

    fn from_holder(h: f64) -> Coerced<Self> {
        Coerced::exact(h)
    }

    fn to_script(self) -> ScriptValue {
        if self.is_nan() {
            ScriptValue::Double(f64::NAN)
        } else {
            ScriptValue::number(self)
        }
    }
}

impl NativeScalar for f32 {
    type Holder = f64;
    const TYPE_NAME: &'static str = "f32";

    fn from_holder(h: f64) -> Coerced<Self> {
        Coerced {
            value: h as f32,
            out_of_range: h.is_finite() && h.abs() > f32::MAX as f64,
        }
    }

    fn to_script(self) -> ScriptValue {
        (self as f64).to_script()
    }
}

impl NativeScalar for bool {
    type Holder = bool;
    const TYPE_NAME: &'static str = "bool";

    fn from_holder(h: bool) -> Coerced<Self> {
        Coerced::exact(h)
    }

    fn to_script(self) -> ScriptValue {
        ScriptValue::Bool(self)
    }
}

impl NativeScalar for char {
    type Holder = u32;
    const TYPE_NAME: &'static str = "char";

    fn from_holder(h: u32) -> Coerced<Self> {
        match char::from_u32(h) {
            Some(c) => Coerced::exact(c),
            None => Coerced {
                value: char::REPLACEMENT_CHARACTER,
                out_of_range: true,
            },
        }
    }

    fn to_script(self) -> ScriptValue {
        ScriptValue::Int(self as i32)
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Convert a script value to `T`, wrapping or truncating silently.
pub fn to_native<T: NativeScalar>(
    engine: &(impl Coercion + ?Sized),
    value: &ScriptValue,
) -> BridgeResult<T> {
    to_native_checked::<T>(engine, value).map(|c| c.value)
}

/// Convert a script value to `T`, reporting whether it fit.
pub fn to_native_checked<T: NativeScalar>(
    engine: &(impl Coercion + ?Sized),
    value: &ScriptValue,
) -> BridgeResult<Coerced<T>> {
    let holder = T::Holder::coerce(engine, value)?;
    Ok(T::from_holder(holder))
}

/// Convert a native scalar to a script value.
pub fn from_native<T: NativeScalar>(value: T) -> ScriptValue {
    value.to_script()
}

/// Convert a native scalar, warning when the script Number may be rounded.
pub fn from_native_checked<T: NativeScalar + std::fmt::Display>(value: T) -> ScriptValue {
    if !value.is_exact_in_script() {
        tracing::warn!(
            target: "gibridge::marshal",
            "Value {} cannot be safely stored in a script Number and may be rounded",
            value
        );
    }
    value.to_script()
}

/// Convert `value` and store it in the member selected by `Tag`.
///
/// Returns `Ok(false)` without touching `arg` when the value is out of range
/// for the target; the caller decides how to report that.
pub fn set_argument_from_value<Tag: ArgTag>(
    engine: &(impl Coercion + ?Sized),
    value: &ScriptValue,
    arg: &mut Argument,
) -> BridgeResult<bool>
where
    Tag::Real: NativeScalar,
{
    let coerced = to_native_checked::<Tag::Real>(engine, value)?;
    if coerced.out_of_range {
        return Ok(false);
    }
    arg.set::<Tag>(coerced.value);
    Ok(true)
}

/// Convert the value stored in `arg` under a basic type tag.
///
/// # Safety
///
/// For `Utf8` and `Filename` tags the pointer member must be null or point to a
/// NUL-terminated string that stays valid for the duration of the call.
pub unsafe fn value_from_argument(tag: TypeTag, arg: &Argument) -> BridgeResult<ScriptValue> {
    let value = match tag {
        TypeTag::Void => ScriptValue::Undefined,
        TypeTag::Boolean => ScriptValue::Bool(arg.get::<GBoolean>()),
        TypeTag::Int8 => from_native(arg.get::<i8>()),
        TypeTag::UInt8 => from_native(arg.get::<u8>()),
        TypeTag::Int16 => from_native(arg.get::<i16>()),
        TypeTag::UInt16 => from_native(arg.get::<u16>()),
        TypeTag::Int32 => from_native(arg.get::<i32>()),
        TypeTag::UInt32 => from_native(arg.get::<u32>()),
        TypeTag::Int64 => ScriptValue::number(arg.get_maybe_rounded::<i64>()),
        TypeTag::UInt64 => ScriptValue::number(arg.get_maybe_rounded::<u64>()),
        TypeTag::Float => from_native(arg.get::<f32>()),
        TypeTag::Double => from_native(arg.get::<f64>()),
        TypeTag::Unichar => ScriptValue::string(arg.get::<char>().to_string()),
        TypeTag::Utf8 | TypeTag::Filename => {
            let ptr = arg.get::<*mut std::ffi::c_char>();
            if ptr.is_null() {
                ScriptValue::Null
            } else {
                let text = std::ffi::CStr::from_ptr(ptr);
                ScriptValue::string(text.to_string_lossy())
            }
        }
        other => {
            return Err(BridgeError::TypeError(format!(
                "Unhandled type {} converting argument to a script value",
                other.name()
            )))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Coercion;
    use crate::testing::capture_warnings;

    struct PrimitiveEngine;

    impl Coercion for PrimitiveEngine {}

    #[test]
    fn test_holder_selection_is_strict() {
        let engine = PrimitiveEngine;
        // u8 goes through the unsigned holder: -1 wraps to u32::MAX, out of range.
        let c = to_native_checked::<u8>(&engine, &ScriptValue::Int(-1)).unwrap();
        assert!(c.out_of_range);

        let c = to_native_checked::<u8>(&engine, &ScriptValue::Int(200)).unwrap();
        assert_eq!(c, Coerced { value: 200, out_of_range: false });
    }

    #[test]
    fn test_int8_range_check() {
        let engine = PrimitiveEngine;
        let c = to_native_checked::<i8>(&engine, &ScriptValue::Int(300)).unwrap();
        assert!(c.out_of_range);
        let c = to_native_checked::<i8>(&engine, &ScriptValue::Int(-128)).unwrap();
        assert_eq!(c.value, -128);
        assert!(!c.out_of_range);
    }

    #[test]
    fn test_integral_nan_and_undefined_become_zero() {
        let engine = PrimitiveEngine;
        for v in [
            ScriptValue::Undefined,
            ScriptValue::Double(f64::NAN),
            ScriptValue::Double(f64::INFINITY),
        ] {
            let c = to_native_checked::<i32>(&engine, &v).unwrap();
            assert_eq!(c, Coerced { value: 0, out_of_range: false });
            let c = to_native_checked::<i64>(&engine, &v).unwrap();
            assert_eq!(c, Coerced { value: 0, out_of_range: false });
        }
    }

    #[test]
    fn test_64_bit_accepts_bigint() {
        let engine = PrimitiveEngine;
        let big = ScriptValue::BigInt(i64::MAX as i128);
        assert_eq!(to_native::<i64>(&engine, &big).unwrap(), i64::MAX);

        let too_big = ScriptValue::BigInt(u64::MAX as i128 + 1);
        assert!(to_native_checked::<u64>(&engine, &too_big).unwrap().out_of_range);

        let negative = ScriptValue::BigInt(-1);
        assert!(to_native_checked::<u64>(&engine, &negative).unwrap().out_of_range);
    }

    #[test]
    fn test_bigint_rejected_for_32_bit() {
        let engine = PrimitiveEngine;
        let err = to_native::<i32>(&engine, &ScriptValue::BigInt(1)).unwrap_err();
        assert!(matches!(err, BridgeError::NotConvertible { .. }));
    }

    #[test]
    fn test_float_keeps_non_finite() {
        let engine = PrimitiveEngine;
        let c = to_native_checked::<f32>(&engine, &ScriptValue::Double(f64::INFINITY)).unwrap();
        assert!(c.value.is_infinite());
        assert!(!c.out_of_range);

        let c = to_native_checked::<f32>(&engine, &ScriptValue::Double(1e300)).unwrap();
        assert!(c.out_of_range);

        let c = to_native_checked::<f64>(&engine, &ScriptValue::Double(f64::NAN)).unwrap();
        assert!(c.value.is_nan());
    }

    #[test]
    fn test_from_native() {
        assert_eq!(from_native(7u8), ScriptValue::Int(7));
        assert_eq!(from_native(u32::MAX), ScriptValue::Double(u32::MAX as f64));
        assert_eq!(from_native(true), ScriptValue::Bool(true));
        assert!(matches!(from_native(f32::NAN), ScriptValue::Double(d) if d.is_nan()));
        assert_eq!(from_native('A'), ScriptValue::Int(65));
    }

    #[test]
    fn test_from_native_checked_big_values() {
        assert_eq!(from_native_checked(1i64 << 53), ScriptValue::Double((1u64 << 53) as f64));
        assert!((1i64 << 53).is_exact_in_script());
        assert!(!((1i64 << 53) + 1).is_exact_in_script());
        assert!(!u64::MAX.is_exact_in_script());
        assert!(from_native_checked(u64::MAX).is_number());
    }

    #[test]
    fn test_from_native_checked_warns_outside_safe_range() {
        let (_, log) = capture_warnings(|| from_native_checked(1i64 << 53));
        assert!(log.is_empty(), "unexpected warning: {}", log);

        let (_, log) = capture_warnings(|| from_native_checked((1i64 << 53) + 1));
        assert!(log.contains("gibridge::marshal"));
        assert!(log.contains("Value 9007199254740993 cannot be safely stored"));

        let (_, log) = capture_warnings(|| from_native_checked(u64::MAX));
        assert!(log.contains("Value 18446744073709551615 cannot be safely stored"));
    }

    #[test]
    fn test_set_argument_from_value() {
        let engine = PrimitiveEngine;
        let mut arg = Argument::new();
        assert!(set_argument_from_value::<u16>(&engine, &ScriptValue::Int(65535), &mut arg).unwrap());
        assert_eq!(arg.get::<u16>(), 65535);

        assert!(!set_argument_from_value::<u16>(&engine, &ScriptValue::Int(65536), &mut arg).unwrap());
        assert_eq!(arg.get::<u16>(), 65535);

        assert!(set_argument_from_value::<GBoolean>(&engine, &ScriptValue::string("x"), &mut arg).unwrap());
        assert_eq!(arg.get::<i32>(), 1);
    }

    #[test]
    fn test_value_from_argument() {
        let mut arg = Argument::new();
        arg.set::<i8>(-3);
        assert_eq!(unsafe { value_from_argument(TypeTag::Int8, &arg) }.unwrap(), ScriptValue::Int(-3));

        arg.set::<char>('ß');
        assert_eq!(
            unsafe { value_from_argument(TypeTag::Unichar, &arg) }.unwrap(),
            ScriptValue::string("ß")
        );

        arg.set_null();
        assert_eq!(unsafe { value_from_argument(TypeTag::Utf8, &arg) }.unwrap(), ScriptValue::Null);
        assert!(unsafe { value_from_argument(TypeTag::GHash, &arg) }.is_err());
    }
}
