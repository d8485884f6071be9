//! Fixed-point conversion between raw register words and application values
//!
//! A raw word holds `width` significant bits. For signed registers the most
//! significant of those bits is the sign bit (two's complement). The cooked
//! value is `raw * 2^-fractional_bits`; negative fractional bits scale up.
//!
//! Conversions to raw round half away from zero and saturate at the
//! representable range of the register. Conversions to integer application
//! types round the same way and saturate at the range of the target type.
//! Strings bypass the numeric path entirely: each word carries up to four
//! ASCII characters, least significant byte first.

use alloc::format;
use alloc::string::String;

use crate::Error;
use crate::user_type::UserType;

/// Largest supported register width in bits
pub const MAX_WIDTH: u32 = 32;

/// Bit-exact converter bound to one register's width, scaling and signedness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FixedPointConverter {
    width: u32,
    fractional_bits: i32,
    signed: bool,
    used_bits_mask: u32,
    sign_bit_mask: u32,
    min_raw: i64,
    max_raw: i64,
}

impl FixedPointConverter {
    /// Create a converter
    ///
    /// # Arguments
    /// * `width` - Number of significant bits in the raw word (1-32)
    /// * `fractional_bits` - Binary point position; negative values mean an
    ///   implicit left shift
    /// * `signed` - Interpret the top significant bit as two's complement sign
    ///
    /// # Errors
    /// Returns `Configuration` if the width is 0 or above 32, or if the
    /// fractional bits would push the scale factor outside the range of `f64`.
    pub fn new(width: u32, fractional_bits: i32, signed: bool) -> Result<Self, Error<()>> {
        if width == 0 || width > MAX_WIDTH {
            return Err(Error::Configuration(format!(
                "register width must be between 1 and {MAX_WIDTH} bits, got {width}"
            )));
        }

        // width is at most 32 here, the cast is lossless
        #[allow(clippy::cast_possible_wrap)]
        let signed_width = width as i32;
        if fractional_bits > 1021 - signed_width || fractional_bits < -1024 + signed_width {
            return Err(Error::Configuration(format!(
                "{fractional_bits} fractional bits are out of range for a {width} bit register"
            )));
        }

        Ok(Self::build(width, fractional_bits, signed))
    }

    /// 32-bit converter without scaling, used for raw word transfers
    #[must_use]
    pub const fn identity(signed: bool) -> Self {
        Self::build(MAX_WIDTH, 0, signed)
    }

    const fn build(width: u32, fractional_bits: i32, signed: bool) -> Self {
        let used_bits_mask = if width == MAX_WIDTH {
            u32::MAX
        } else {
            (1 << width) - 1
        };
        let (min_raw, max_raw) = if signed {
            (-(1_i64 << (width - 1)), (1_i64 << (width - 1)) - 1)
        } else {
            (0, (1_i64 << width) - 1)
        };

        Self {
            width,
            fractional_bits,
            signed,
            used_bits_mask,
            sign_bit_mask: 1 << (width - 1),
            min_raw,
            max_raw,
        }
    }

    /// Number of significant bits
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Position of the binary point
    #[must_use]
    pub const fn fractional_bits(&self) -> i32 {
        self.fractional_bits
    }

    /// Whether raw words are two's complement
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signed
    }

    /// Smallest representable raw value, sign-extended
    #[must_use]
    pub const fn min_raw(&self) -> i64 {
        self.min_raw
    }

    /// Largest representable raw value
    #[must_use]
    pub const fn max_raw(&self) -> i64 {
        self.max_raw
    }

    /// Convert a raw word into an application value
    pub fn to_cooked<T: UserType>(&self, raw: u32) -> T {
        T::from_raw(self, raw)
    }

    /// Convert an application value into a raw word
    pub fn to_raw<T: UserType>(&self, cooked: &T) -> u32 {
        cooked.to_raw(self)
    }

    /// Sign-extended integer value of the significant bits of `raw`
    #[must_use]
    pub const fn raw_to_integer(&self, raw: u32) -> i64 {
        let bits = raw & self.used_bits_mask;
        if self.signed && bits & self.sign_bit_mask != 0 {
            bits as i64 - (1_i64 << self.width)
        } else {
            bits as i64
        }
    }

    /// Exact cooked value of a raw word
    #[must_use]
    pub fn raw_to_f64(&self, raw: u32) -> f64 {
        // at most 32 significant bits, exactly representable
        #[allow(clippy::cast_precision_loss)]
        let value = self.raw_to_integer(raw) as f64;
        libm::ldexp(value, -self.fractional_bits)
    }

    /// Nearest raw word for a cooked value, saturating at the register range
    #[must_use]
    pub fn f64_to_raw(&self, cooked: f64) -> u32 {
        if cooked.is_nan() {
            return 0;
        }

        let scaled = libm::round(libm::ldexp(cooked, self.fractional_bits));
        // min/max span at most 33 bits, exactly representable
        #[allow(clippy::cast_precision_loss)]
        let clamped = scaled.clamp(self.min_raw as f64, self.max_raw as f64);

        // Clamped value fits in i64; truncating to u32 keeps the two's
        // complement pattern of the low bits
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let raw = (clamped as i64) as u32;
        raw & self.used_bits_mask
    }

    /// Up to four ASCII characters packed in a raw word, least significant
    /// byte first. Unpacking stops at the first NUL byte and replaces
    /// non-ASCII bytes with `?`.
    #[must_use]
    pub fn word_to_string(raw: u32) -> String {
        raw.to_le_bytes()
            .iter()
            .take_while(|&&byte| byte != 0)
            .map(|&byte| if byte.is_ascii() { char::from(byte) } else { '?' })
            .collect()
    }

    /// Pack the first four bytes of `text` into a raw word, zero padded
    #[must_use]
    pub fn string_to_word(text: &str) -> u32 {
        let mut word = [0u8; 4];
        for (slot, byte) in word.iter_mut().zip(text.bytes()) {
            *slot = if byte.is_ascii() { byte } else { b'?' };
        }
        u32::from_le_bytes(word)
    }
}
