//! Argument slots
//!
//! An [`Argument`] is the untagged union used to pass one value across the
//! native calling boundary. The tag lives outside the slot: callers pick the
//! member with a type parameter implementing [`ArgTag`], so selecting the wrong
//! member is a compile-time question, not a runtime one.
//!
//! Most tags are the native type itself (`i32`, `f64`, `*mut T`, ...). Native
//! types that share a representation with another type but are stored in a
//! different member get a marker tag ([`GBoolean`], [`Long`], [`Enum`], ...).
//!
//! Every slot starts zeroed and every member is plain data, so reading any
//! member yields a defined value.

use std::ffi::{c_int, c_long, c_uint, c_ulong, c_void};
use std::fmt;

use crate::repository::{GType, TypeTag};

/// One value slot.
#[repr(C)]
#[derive(Clone, Copy)]
pub union Argument {
    v_boolean: i32,
    v_int8: i8,
    v_uint8: u8,
    v_int16: i16,
    v_uint16: u16,
    v_int32: i32,
    v_uint32: u32,
    v_int64: i64,
    v_uint64: u64,
    v_float: f32,
    v_double: f64,
    v_int: c_int,
    v_uint: c_uint,
    v_long: c_long,
    v_ulong: c_ulong,
    v_ssize: isize,
    v_size: usize,
    v_pointer: *mut c_void,
}

// ============================================================================
// Tags
// ============================================================================

mod sealed {
    pub trait Sealed {}
}

/// Selects a member of [`Argument`].
pub trait ArgTag: sealed::Sealed {
    /// Native type read and written through this tag
    type Real: Copy;

    /// Type of the selected union member
    type Storage: Copy;

    #[doc(hidden)]
    fn member(arg: &mut Argument) -> &mut Self::Storage;

    #[doc(hidden)]
    fn member_ref(arg: &Argument) -> &Self::Storage;

    #[doc(hidden)]
    fn load(storage: Self::Storage) -> Self::Real;

    #[doc(hidden)]
    fn store(value: Self::Real) -> Self::Storage;
}

/// `gboolean` stored in the boolean member
#[derive(Debug, Clone, Copy)]
pub enum GBoolean {}

/// `long` stored in the long member
#[derive(Debug, Clone, Copy)]
pub enum Long {}

/// `unsigned long` stored in the unsigned long member
#[derive(Debug, Clone, Copy)]
pub enum UnsignedLong {}

/// Enumeration value stored in the `int` member
#[derive(Debug, Clone, Copy)]
pub enum Enum {}

/// Unsigned enumeration (flags) value stored in the `unsigned int` member
#[derive(Debug, Clone, Copy)]
pub enum UnsignedEnum {}

// SAFETY (all `member`/`member_ref` impls): every member is plain data, the
// union is always fully initialized (see `Argument::new`), and any bit pattern
// is a valid value of every storage type. Reading through any member is sound.
macro_rules! plain_member {
    ($tag:ty, $real:ty, $field:ident) => {
        impl sealed::Sealed for $tag {}

        impl ArgTag for $tag {
            type Real = $real;
            type Storage = $real;

            #[inline]
            fn member(arg: &mut Argument) -> &mut $real {
                unsafe { &mut arg.$field }
            }

            #[inline]
            fn member_ref(arg: &Argument) -> &$real {
                unsafe { &arg.$field }
            }

            #[inline]
            fn load(storage: $real) -> $real {
                storage
            }

            #[inline]
            fn store(value: $real) -> $real {
                value
            }
        }
    };
}

plain_member!(i8, i8, v_int8);
plain_member!(u8, u8, v_uint8);
plain_member!(i16, i16, v_int16);
plain_member!(u16, u16, v_uint16);
plain_member!(i32, i32, v_int32);
plain_member!(u32, u32, v_uint32);
plain_member!(i64, i64, v_int64);
plain_member!(u64, u64, v_uint64);
plain_member!(isize, isize, v_ssize);
plain_member!(usize, usize, v_size);
plain_member!(f32, f32, v_float);
plain_member!(f64, f64, v_double);
plain_member!(Long, c_long, v_long);
plain_member!(UnsignedLong, c_ulong, v_ulong);
plain_member!(Enum, c_int, v_int);
plain_member!(UnsignedEnum, c_uint, v_uint);

macro_rules! boolean_member {
    ($tag:ty) => {
        impl sealed::Sealed for $tag {}

        impl ArgTag for $tag {
            type Real = bool;
            type Storage = i32;

            #[inline]
            fn member(arg: &mut Argument) -> &mut i32 {
                unsafe { &mut arg.v_boolean }
            }

            #[inline]
            fn member_ref(arg: &Argument) -> &i32 {
                unsafe { &arg.v_boolean }
            }

            #[inline]
            fn load(storage: i32) -> bool {
                storage != 0
            }

            #[inline]
            fn store(value: bool) -> i32 {
                value as i32
            }
        }
    };
}

boolean_member!(GBoolean);
boolean_member!(bool);

impl sealed::Sealed for GType {}

// GType is `repr(transparent)` over usize and lives in the size member.
impl ArgTag for GType {
    type Real = GType;
    type Storage = GType;

    #[inline]
    fn member(arg: &mut Argument) -> &mut GType {
        unsafe { &mut *(&mut arg.v_size as *mut usize as *mut GType) }
    }

    #[inline]
    fn member_ref(arg: &Argument) -> &GType {
        unsafe { &*(&arg.v_size as *const usize as *const GType) }
    }

    #[inline]
    fn load(storage: GType) -> GType {
        storage
    }

    #[inline]
    fn store(value: GType) -> GType {
        value
    }
}

impl sealed::Sealed for char {}

// Code points live in the 32-bit unsigned member. A slot written through
// another member may hold an invalid code point; reads map it to U+FFFD.
impl ArgTag for char {
    type Real = char;
    type Storage = u32;

    #[inline]
    fn member(arg: &mut Argument) -> &mut u32 {
        unsafe { &mut arg.v_uint32 }
    }

    #[inline]
    fn member_ref(arg: &Argument) -> &u32 {
        unsafe { &arg.v_uint32 }
    }

    #[inline]
    fn load(storage: u32) -> char {
        char::from_u32(storage).unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    #[inline]
    fn store(value: char) -> u32 {
        value as u32
    }
}

impl<T> sealed::Sealed for *mut T {}
impl<T> sealed::Sealed for *const T {}

// Pointers of any pointee share the pointer member; thin pointers all have the
// layout of `*mut c_void`.
impl<T> ArgTag for *mut T {
    type Real = *mut T;
    type Storage = *mut T;

    #[inline]
    fn member(arg: &mut Argument) -> &mut *mut T {
        unsafe { &mut *(&mut arg.v_pointer as *mut *mut c_void as *mut *mut T) }
    }

    #[inline]
    fn member_ref(arg: &Argument) -> &*mut T {
        unsafe { &*(&arg.v_pointer as *const *mut c_void as *const *mut T) }
    }

    #[inline]
    fn load(storage: *mut T) -> *mut T {
        storage
    }

    #[inline]
    fn store(value: *mut T) -> *mut T {
        value
    }
}

// Const pointers are stored with const stripped.
impl<T> ArgTag for *const T {
    type Real = *const T;
    type Storage = *mut T;

    #[inline]
    fn member(arg: &mut Argument) -> &mut *mut T {
        <*mut T as ArgTag>::member(arg)
    }

    #[inline]
    fn member_ref(arg: &Argument) -> &*mut T {
        <*mut T as ArgTag>::member_ref(arg)
    }

    #[inline]
    fn load(storage: *mut T) -> *const T {
        storage as *const T
    }

    #[inline]
    fn store(value: *const T) -> *mut T {
        value as *mut T
    }
}

// ============================================================================
// Function pointers and pointer-encoded integers
// ============================================================================

/// Function pointer types that can be stored in the pointer member.
pub trait CodePointer: Copy + sealed::Sealed {
    /// Erase to an untyped pointer
    fn into_code_ptr(self) -> *mut c_void;
}

macro_rules! code_pointer {
    ($($arg:ident),*) => {
        impl<R, $($arg),*> sealed::Sealed for extern "C" fn($($arg),*) -> R {}
        impl<R, $($arg),*> CodePointer for extern "C" fn($($arg),*) -> R {
            #[inline]
            fn into_code_ptr(self) -> *mut c_void {
                self as *const () as *mut c_void
            }
        }

        impl<R, $($arg),*> sealed::Sealed for unsafe extern "C" fn($($arg),*) -> R {}
        impl<R, $($arg),*> CodePointer for unsafe extern "C" fn($($arg),*) -> R {
            #[inline]
            fn into_code_ptr(self) -> *mut c_void {
                self as *const () as *mut c_void
            }
        }
    };
}

code_pointer!();
code_pointer!(A);
code_pointer!(A, B);
code_pointer!(A, B, C);
code_pointer!(A, B, C, D);

/// Integers that can travel inside a pointer-sized slot.
pub trait PointerInt: Copy {
    /// Decode from a pointer
    fn from_pointer(ptr: *mut c_void) -> Self;
    /// Encode into a pointer
    fn to_pointer(self) -> *mut c_void;
}

macro_rules! pointer_int {
    ($($t:ty),*) => {
        $(
            impl PointerInt for $t {
                #[inline]
                fn from_pointer(ptr: *mut c_void) -> Self {
                    ptr as usize as $t
                }

                #[inline]
                fn to_pointer(self) -> *mut c_void {
                    self as isize as usize as *mut c_void
                }
            }
        )*
    };
}

pointer_int!(i8, u8, i16, u16, i32, u32, i64, u64, isize, usize);

impl PointerInt for bool {
    fn from_pointer(ptr: *mut c_void) -> Self {
        !ptr.is_null()
    }

    fn to_pointer(self) -> *mut c_void {
        self as usize as *mut c_void
    }
}

// ============================================================================
// Big numbers
// ============================================================================

/// Largest magnitude a script Number holds without rounding concerns.
pub const MAX_SAFE_BIG_NUMBER: i64 = 1 << 53;

/// Smallest value a script Number holds without rounding concerns.
pub const MIN_SAFE_BIG_NUMBER: i64 = -MAX_SAFE_BIG_NUMBER;

/// 64-bit integers that may not fit a script Number.
pub trait BigInteger: Copy + fmt::Display {
    /// Whether the value is within ±2^53
    fn is_safe(self) -> bool;
    /// Convert, possibly rounding
    fn to_f64(self) -> f64;
}

impl BigInteger for i64 {
    fn is_safe(self) -> bool {
        (MIN_SAFE_BIG_NUMBER..=MAX_SAFE_BIG_NUMBER).contains(&self)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl BigInteger for u64 {
    fn is_safe(self) -> bool {
        self <= MAX_SAFE_BIG_NUMBER as u64
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

/// Whether `value` is representable as a script Number without rounding.
pub fn is_safe_big_number<T: BigInteger>(value: T) -> bool {
    value.is_safe()
}

// ============================================================================
// Argument
// ============================================================================

impl Argument {
    /// A zeroed slot
    #[inline]
    pub const fn new() -> Self {
        Argument { v_uint64: 0 }
    }

    /// Mutable access to the member selected by `T`
    #[inline]
    pub fn member<T: ArgTag>(&mut self) -> &mut T::Storage {
        T::member(self)
    }

    /// Read the member selected by `T`
    #[inline]
    pub fn get<T: ArgTag>(&self) -> T::Real {
        T::load(*T::member_ref(self))
    }

    /// Write the member selected by `T`
    #[inline]
    pub fn set<T: ArgTag>(&mut self, value: T::Real) {
        *T::member(self) = T::store(value);
    }

    /// Write a value whose type is its own tag
    #[inline]
    pub fn put<T: ArgTag<Real = T>>(&mut self, value: T) {
        self.set::<T>(value);
    }

    /// Zero the whole slot
    #[inline]
    pub fn unset(&mut self) {
        *self = Argument::new();
    }

    /// Read the member selected by `T`, then zero the slot
    #[inline]
    pub fn steal<T: ArgTag>(&mut self) -> T::Real {
        let value = self.get::<T>();
        self.unset();
        value
    }

    /// Store a null pointer
    #[inline]
    pub fn set_null(&mut self) {
        self.set::<*mut c_void>(std::ptr::null_mut());
    }

    /// Store a function pointer in the pointer member
    #[inline]
    pub fn set_fn<F: CodePointer>(&mut self, f: F) {
        self.set::<*mut c_void>(f.into_code_ptr());
    }

    /// Decode an integer that was carried inside a pointer
    #[inline]
    pub fn set_from_pointer<T: ArgTag>(&mut self, ptr: *mut c_void)
    where
        T::Real: PointerInt,
    {
        self.set::<T>(T::Real::from_pointer(ptr));
    }

    /// Encode the member selected by `T` as a pointer
    #[inline]
    pub fn get_as_pointer<T: ArgTag>(&self) -> *mut c_void
    where
        T::Real: PointerInt,
    {
        self.get::<T>().to_pointer()
    }

    /// Read a 64-bit member as a double, warning when precision may be lost
    pub fn get_maybe_rounded<T: ArgTag>(&self) -> f64
    where
        T::Real: BigInteger,
    {
        let value = self.get::<T>();
        if !value.is_safe() {
            tracing::warn!(
                target: "gibridge::marshal",
                "Value {} cannot be safely stored in a script Number and may be rounded",
                value
            );
        }
        value.to_f64()
    }
}

impl Default for Argument {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Argument({:#018x})", self.get::<u64>())
    }
}

/// Read an array length stored in `arg` with the integer tag `tag`.
///
/// Returns `None` for non-integer tags and for lengths that are negative or
/// do not fit a `usize`.
pub fn array_length(tag: TypeTag, arg: &Argument) -> Option<usize> {
    match tag {
        TypeTag::Int8 => usize::try_from(arg.get::<i8>()).ok(),
        TypeTag::UInt8 => Some(usize::from(arg.get::<u8>())),
        TypeTag::Int16 => usize::try_from(arg.get::<i16>()).ok(),
        TypeTag::UInt16 => Some(usize::from(arg.get::<u16>())),
        TypeTag::Int32 => usize::try_from(arg.get::<i32>()).ok(),
        TypeTag::UInt32 => usize::try_from(arg.get::<u32>()).ok(),
        TypeTag::Int64 => usize::try_from(arg.get::<i64>()).ok(),
        TypeTag::UInt64 => usize::try_from(arg.get::<u64>()).ok(),
        _ => None,
    }
}

/// Store an array length in `arg` using the integer tag `tag`.
///
/// Returns `false` for non-integer tags.
pub fn set_array_length(tag: TypeTag, arg: &mut Argument, len: usize) -> bool {
    match tag {
        TypeTag::Int8 => arg.set::<i8>(len as i8),
        TypeTag::UInt8 => arg.set::<u8>(len as u8),
        TypeTag::Int16 => arg.set::<i16>(len as i16),
        TypeTag::UInt16 => arg.set::<u16>(len as u16),
        TypeTag::Int32 => arg.set::<i32>(len as i32),
        TypeTag::UInt32 => arg.set::<u32>(len as u32),
        TypeTag::Int64 => arg.set::<i64>(len as i64),
        TypeTag::UInt64 => arg.set::<u64>(len as u64),
        _ => return false,
    }
    true
}
