//! Closed set of application-facing value types
//!
//! Every accessor is generic over one of these types. Code that must pick the
//! type at runtime (a backend building an accessor for a request, a logical
//! map wrapping a target accessor) works with [`UserTypeTag`] and the erased
//! [`AnyAccessor`], and recovers the concrete type with
//! [`dispatch_user_type!`](crate::dispatch_user_type).

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;

#[doc(hidden)]
pub use alloc::string::String;

use crate::accessor::RegisterAccessor;
use crate::converter::FixedPointConverter;

mod sealed {
    pub trait Sealed {}
}

/// Runtime tag of a [`UserType`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UserTypeTag {
    /// `i8`
    I8,
    /// `u8`
    U8,
    /// `i16`
    I16,
    /// `u16`
    U16,
    /// `i32`
    I32,
    /// `u32`
    U32,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `String`
    String,
}

impl UserTypeTag {
    /// Whether accessors of this type may transfer raw words
    #[must_use]
    pub const fn supports_raw(self) -> bool {
        matches!(self, Self::I32 | Self::U32)
    }

    /// Type name for diagnostics
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::String => "String",
        }
    }
}

/// Application value type an accessor can convert register words into
///
/// This trait is sealed; the set of implementors is fixed.
pub trait UserType: sealed::Sealed + Clone + Default + PartialEq + Debug + 'static {
    /// Runtime tag of this type
    const TAG: UserTypeTag;

    /// Convert a raw register word
    fn from_raw(converter: &FixedPointConverter, raw: u32) -> Self;

    /// Convert into a raw register word
    fn to_raw(&self, converter: &FixedPointConverter) -> u32;

    /// Erase the element type of an accessor
    fn into_any<E: 'static>(accessor: Box<dyn RegisterAccessor<Self, E>>) -> AnyAccessor<E>;

    /// Recover a typed accessor, handing the erased one back on a type mismatch
    ///
    /// # Errors
    /// Returns the input unchanged when it holds a different element type.
    fn from_any<E: 'static>(
        any: AnyAccessor<E>,
    ) -> Result<Box<dyn RegisterAccessor<Self, E>>, AnyAccessor<E>>;

    /// Borrow a typed accessor out of an erased one
    fn from_any_mut<E: 'static>(
        any: &mut AnyAccessor<E>,
    ) -> Option<&mut (dyn RegisterAccessor<Self, E> + 'static)>;

    /// Collapse the elements of a register into one scalar
    ///
    /// Numeric types take the first element. Strings concatenate every
    /// element, so a multi-word register reads as one text value.
    fn from_elements(values: &[Self]) -> Self {
        values.first().cloned().unwrap_or_default()
    }

    /// Spread one scalar over `count` register elements
    ///
    /// Numeric types fill the first element and leave the rest at zero.
    /// Strings are split into four-character words; text beyond `count`
    /// words is dropped.
    fn to_elements(&self, count: usize) -> Vec<Self> {
        let mut elements = vec![Self::default(); count.max(1)];
        elements[0] = self.clone();
        elements
    }
}

/// Type-erased accessor over the closed set of [`UserType`]s
pub enum AnyAccessor<E> {
    /// `i8` elements
    I8(Box<dyn RegisterAccessor<i8, E>>),
    /// `u8` elements
    U8(Box<dyn RegisterAccessor<u8, E>>),
    /// `i16` elements
    I16(Box<dyn RegisterAccessor<i16, E>>),
    /// `u16` elements
    U16(Box<dyn RegisterAccessor<u16, E>>),
    /// `i32` elements
    I32(Box<dyn RegisterAccessor<i32, E>>),
    /// `u32` elements
    U32(Box<dyn RegisterAccessor<u32, E>>),
    /// `f32` elements
    F32(Box<dyn RegisterAccessor<f32, E>>),
    /// `f64` elements
    F64(Box<dyn RegisterAccessor<f64, E>>),
    /// Text elements
    String(Box<dyn RegisterAccessor<String, E>>),
}

impl<E> AnyAccessor<E> {
    /// Element type of the wrapped accessor
    #[must_use]
    pub const fn tag(&self) -> UserTypeTag {
        match self {
            Self::I8(_) => UserTypeTag::I8,
            Self::U8(_) => UserTypeTag::U8,
            Self::I16(_) => UserTypeTag::I16,
            Self::U16(_) => UserTypeTag::U16,
            Self::I32(_) => UserTypeTag::I32,
            Self::U32(_) => UserTypeTag::U32,
            Self::F32(_) => UserTypeTag::F32,
            Self::F64(_) => UserTypeTag::F64,
            Self::String(_) => UserTypeTag::String,
        }
    }
}

impl<E> Debug for AnyAccessor<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("AnyAccessor").field(&self.tag()).finish()
    }
}

/// Run `$body` with `$t` bound to the concrete type named by a [`UserTypeTag`]
///
/// ```ignore
/// let any = dispatch_user_type!(request.tag, T => {
///     T::into_any(Box::new(TypedAccessor::<T, _>::new(device, info, n, offset, raw)?))
/// });
/// ```
#[macro_export]
macro_rules! dispatch_user_type {
    ($tag:expr, $t:ident => $body:expr) => {
        match $tag {
            $crate::UserTypeTag::I8 => {
                type $t = i8;
                $body
            }
            $crate::UserTypeTag::U8 => {
                type $t = u8;
                $body
            }
            $crate::UserTypeTag::I16 => {
                type $t = i16;
                $body
            }
            $crate::UserTypeTag::U16 => {
                type $t = u16;
                $body
            }
            $crate::UserTypeTag::I32 => {
                type $t = i32;
                $body
            }
            $crate::UserTypeTag::U32 => {
                type $t = u32;
                $body
            }
            $crate::UserTypeTag::F32 => {
                type $t = f32;
                $body
            }
            $crate::UserTypeTag::F64 => {
                type $t = f64;
                $body
            }
            $crate::UserTypeTag::String => {
                type $t = $crate::user_type::String;
                $body
            }
        }
    };
}

macro_rules! erase_impl {
    ($t:ty, $variant:ident) => {
        fn into_any<E: 'static>(accessor: Box<dyn RegisterAccessor<Self, E>>) -> AnyAccessor<E> {
            AnyAccessor::$variant(accessor)
        }

        fn from_any<E: 'static>(
            any: AnyAccessor<E>,
        ) -> Result<Box<dyn RegisterAccessor<Self, E>>, AnyAccessor<E>> {
            match any {
                AnyAccessor::$variant(accessor) => Ok(accessor),
                other => Err(other),
            }
        }

        fn from_any_mut<E: 'static>(
            any: &mut AnyAccessor<E>,
        ) -> Option<&mut (dyn RegisterAccessor<Self, E> + 'static)> {
            match any {
                AnyAccessor::$variant(accessor) => Some(accessor.as_mut()),
                _ => None,
            }
        }
    };
}

macro_rules! integer_user_type {
    ($t:ty, $variant:ident) => {
        impl sealed::Sealed for $t {}

        impl UserType for $t {
            const TAG: UserTypeTag = UserTypeTag::$variant;

            // Float to int casts saturate at the bounds of the target type
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            fn from_raw(converter: &FixedPointConverter, raw: u32) -> Self {
                libm::round(converter.raw_to_f64(raw)) as $t
            }

            fn to_raw(&self, converter: &FixedPointConverter) -> u32 {
                converter.f64_to_raw(f64::from(*self))
            }

            erase_impl!($t, $variant);
        }
    };
}

integer_user_type!(i8, I8);
integer_user_type!(u8, U8);
integer_user_type!(i16, I16);
integer_user_type!(u16, U16);
integer_user_type!(i32, I32);
integer_user_type!(u32, U32);

impl sealed::Sealed for f32 {}

impl UserType for f32 {
    const TAG: UserTypeTag = UserTypeTag::F32;

    #[allow(clippy::cast_possible_truncation)]
    fn from_raw(converter: &FixedPointConverter, raw: u32) -> Self {
        converter.raw_to_f64(raw) as f32
    }

    fn to_raw(&self, converter: &FixedPointConverter) -> u32 {
        converter.f64_to_raw(f64::from(*self))
    }

    erase_impl!(f32, F32);
}

impl sealed::Sealed for f64 {}

impl UserType for f64 {
    const TAG: UserTypeTag = UserTypeTag::F64;

    fn from_raw(converter: &FixedPointConverter, raw: u32) -> Self {
        converter.raw_to_f64(raw)
    }

    fn to_raw(&self, converter: &FixedPointConverter) -> u32 {
        converter.f64_to_raw(*self)
    }

    erase_impl!(f64, F64);
}

impl sealed::Sealed for String {}

impl UserType for String {
    const TAG: UserTypeTag = UserTypeTag::String;

    fn from_raw(_converter: &FixedPointConverter, raw: u32) -> Self {
        FixedPointConverter::word_to_string(raw)
    }

    fn to_raw(&self, _converter: &FixedPointConverter) -> u32 {
        FixedPointConverter::string_to_word(self)
    }

    fn from_elements(values: &[Self]) -> Self {
        values.concat()
    }

    fn to_elements(&self, count: usize) -> Vec<Self> {
        let chars: Vec<char> = self.chars().collect();
        let mut elements: Vec<Self> = chars.chunks(4).map(|chunk| chunk.iter().collect()).collect();
        elements.resize(count.max(1), String::new());
        elements
    }

    erase_impl!(String, String);
}
