//! Accessor for a contiguous range of words in a 1-D register

use alloc::format;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;

use super::{RegisterAccessor, no_such_channel};
use crate::backend::Backend;
use crate::catalogue::RegisterInfo;
use crate::converter::FixedPointConverter;
use crate::user_type::{UserType, UserTypeTag};
use crate::{Error, WORD_SIZE};

/// Buffered accessor converting every word with the register's converter
///
/// In raw mode words are transferred verbatim; only `i32` and `u32`
/// buffers can hold them.
pub struct TypedAccessor<T: UserType, E> {
    backend: Rc<dyn Backend<E>>,
    info: Rc<RegisterInfo>,
    converter: FixedPointConverter,
    address: u32,
    word_offset: usize,
    raw: bool,
    buffer: Vec<T>,
}

impl<T: UserType, E> TypedAccessor<T, E> {
    /// Accessor for `number_of_words` words from `word_offset` on
    ///
    /// A word count of 0 selects everything from the offset to the end of
    /// the register.
    ///
    /// # Errors
    /// Returns `WrongParameter` if the range exceeds the register or raw
    /// mode is requested for a type other than `i32`/`u32`, and
    /// `Configuration` if the register describes an invalid converter.
    pub fn new(
        backend: Rc<dyn Backend<E>>,
        info: Rc<RegisterInfo>,
        number_of_words: usize,
        word_offset: usize,
        raw: bool,
    ) -> Result<Self, Error<E>> {
        if raw && !T::TAG.supports_raw() {
            return Err(Error::WrongParameter(format!(
                "raw access to '{}' needs i32 or u32 elements, not {}",
                info.name,
                T::TAG.name()
            )));
        }

        let elements = info.number_of_elements;
        let length = if number_of_words == 0 {
            elements.saturating_sub(word_offset)
        } else {
            number_of_words
        };
        if word_offset.checked_add(length).is_none_or(|end| end > elements) {
            return Err(Error::WrongParameter(format!(
                "{length} words at offset {word_offset} exceed the {elements} elements of '{}'",
                info.name
            )));
        }

        let converter = if raw {
            FixedPointConverter::identity(T::TAG == UserTypeTag::I32)
        } else {
            info.converter().map_err(Error::lift)?
        };

        let address = u32::try_from(word_offset * WORD_SIZE)
            .ok()
            .and_then(|offset| info.address.checked_add(offset))
            .ok_or_else(|| {
                Error::WrongParameter(format!("offset {word_offset} overflows the address of '{}'", info.name))
            })?;

        Ok(Self {
            backend,
            info,
            converter,
            address,
            word_offset,
            raw,
            buffer: vec![T::default(); length],
        })
    }

    /// Description of the register
    #[must_use]
    pub fn register_info(&self) -> &Rc<RegisterInfo> {
        &self.info
    }

    /// First word of the register covered by the buffer
    #[must_use]
    pub const fn word_offset(&self) -> usize {
        self.word_offset
    }

    /// Whether words are transferred without conversion
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        self.raw
    }
}

impl<T: UserType, E> RegisterAccessor<T, E> for TypedAccessor<T, E> {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn read(&mut self) -> Result<(), Error<E>> {
        let mut bytes = vec![0u8; self.buffer.len() * WORD_SIZE];
        self.backend
            .read_raw(self.info.bar, self.address, &mut bytes)?;

        for (value, word) in self.buffer.iter_mut().zip(bytes.chunks_exact(WORD_SIZE)) {
            let raw = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            *value = T::from_raw(&self.converter, raw);
        }
        Ok(())
    }

    fn write(&mut self) -> Result<(), Error<E>> {
        if !self.info.is_writeable() {
            #[cfg(feature = "defmt")]
            defmt::warn!("Refusing write to read-only register {=str}", self.info.name.as_str());
            return Err(Error::NotImplemented(format!(
                "register '{}' is read-only",
                self.info.name
            )));
        }

        let mut bytes = Vec::with_capacity(self.buffer.len() * WORD_SIZE);
        for value in &self.buffer {
            bytes.extend_from_slice(&value.to_raw(&self.converter).to_le_bytes());
        }
        self.backend.write_raw(self.info.bar, self.address, &bytes)
    }

    fn number_of_channels(&self) -> usize {
        1
    }

    fn number_of_samples(&self) -> usize {
        self.buffer.len()
    }

    fn channel(&self, index: usize) -> Result<&[T], Error<E>> {
        if index == 0 {
            Ok(&self.buffer)
        } else {
            Err(no_such_channel(&self.info.name, index, 1))
        }
    }

    fn channel_mut(&mut self, index: usize) -> Result<&mut [T], Error<E>> {
        if index == 0 {
            Ok(&mut self.buffer)
        } else {
            Err(no_such_channel(&self.info.name, index, 1))
        }
    }

    fn is_writeable(&self) -> bool {
        self.info.is_writeable()
    }

    fn fixed_point_converter(&self) -> Option<&FixedPointConverter> {
        Some(&self.converter)
    }
}
