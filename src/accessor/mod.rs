//! Buffered register accessors and their per call-site cache
//!
//! A [`RegisterAccessor`] owns a buffer of application values. `read()`
//! replaces the buffer with hardware content and `write()` pushes it back;
//! nothing happens implicitly in between.
//!
//! [`AccessorRegistry`] caches one accessor per element type for a single
//! register, and [`RegisterHandle`] builds a non-buffering convenience API
//! on top of it.

pub mod multiplexed;
pub mod typed;

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;

use crate::Error;
use crate::backend::{Backend, get_accessor};
use crate::catalogue::{RegisterInfo, normalize_path};
use crate::converter::FixedPointConverter;
use crate::user_type::{AnyAccessor, UserType, UserTypeTag};

/// Buffered, typed view on a register
///
/// 1-D registers expose a single channel. Multiplexed blocks expose one
/// channel per sequence, all with the same number of samples.
pub trait RegisterAccessor<T: UserType, E> {
    /// Path of the register this accessor was built for
    fn name(&self) -> &str;

    /// Replace the buffer with the current hardware content
    ///
    /// On failure the buffer is left unchanged.
    ///
    /// # Errors
    /// Returns `Io` on transport failure.
    fn read(&mut self) -> Result<(), Error<E>>;

    /// Push the buffer to the hardware
    ///
    /// # Errors
    /// Returns `NotImplemented` for read-only targets, `Io` on transport
    /// failure.
    fn write(&mut self) -> Result<(), Error<E>>;

    /// Number of channels in the buffer
    fn number_of_channels(&self) -> usize;

    /// Number of elements per channel
    fn number_of_samples(&self) -> usize;

    /// Buffer of one channel
    ///
    /// # Errors
    /// Returns `WrongParameter` if the channel does not exist.
    fn channel(&self, index: usize) -> Result<&[T], Error<E>>;

    /// Mutable buffer of one channel
    ///
    /// # Errors
    /// Returns `WrongParameter` if the channel does not exist.
    fn channel_mut(&mut self, index: usize) -> Result<&mut [T], Error<E>>;

    /// Whether `read()` can succeed
    fn is_readable(&self) -> bool {
        true
    }

    /// Whether `write()` can succeed
    fn is_writeable(&self) -> bool;

    /// Converter used for the elements, if there is a single one
    fn fixed_point_converter(&self) -> Option<&FixedPointConverter>;
}

/// Error for a channel index past the end of an accessor
pub(crate) fn no_such_channel<E>(name: &str, index: usize, channels: usize) -> Error<E> {
    Error::WrongParameter(format!(
        "channel {index} requested from '{name}', which has {channels}"
    ))
}

/// Word count, offset and mode an accessor was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AccessorShape {
    /// Words to transfer, 0 for the rest of the register
    pub number_of_words: usize,
    /// First word inside the register
    pub word_offset: usize,
    /// Raw transfer mode
    pub raw: bool,
}

struct CachedAccessor<E> {
    shape: AccessorShape,
    accessor: AnyAccessor<E>,
}

/// Lazily populated accessors for one register, one per element type
///
/// Accessors are only built for types that are actually requested. A second
/// request for the same type must use the same shape; a different shape is
/// rejected rather than answered with a buffer of the wrong size.
pub struct AccessorRegistry<E> {
    backend: Rc<dyn Backend<E>>,
    path: String,
    cache: BTreeMap<UserTypeTag, CachedAccessor<E>>,
}

impl<E: 'static> AccessorRegistry<E> {
    /// Registry for the register at `path`
    pub fn new(backend: Rc<dyn Backend<E>>, path: &str) -> Self {
        Self {
            backend,
            path: normalize_path(path),
            cache: BTreeMap::new(),
        }
    }

    /// Register path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Backend the accessors are built from
    #[must_use]
    pub fn backend(&self) -> &Rc<dyn Backend<E>> {
        &self.backend
    }

    /// Accessor for `T`, built on first use
    ///
    /// # Errors
    /// Returns `WrongParameter` if an accessor for `T` already exists with a
    /// different shape, and forwards errors from building the accessor.
    pub fn get<T: UserType>(
        &mut self,
        number_of_words: usize,
        word_offset: usize,
        raw: bool,
    ) -> Result<&mut (dyn RegisterAccessor<T, E> + 'static), Error<E>> {
        let shape = AccessorShape {
            number_of_words,
            word_offset,
            raw,
        };

        if let Some(cached) = self.cache.get(&T::TAG) {
            if cached.shape != shape {
                return Err(Error::WrongParameter(format!(
                    "{} accessor for '{}' exists with shape {:?}, requested {:?}",
                    T::TAG.name(),
                    self.path,
                    cached.shape,
                    shape
                )));
            }
        } else {
            let accessor =
                get_accessor::<T, E>(&self.backend, &self.path, number_of_words, word_offset, raw)?;
            self.cache.insert(
                T::TAG,
                CachedAccessor {
                    shape,
                    accessor: T::into_any(accessor),
                },
            );
        }

        self.cache
            .get_mut(&T::TAG)
            .and_then(|cached| T::from_any_mut(&mut cached.accessor))
            .ok_or_else(|| {
                Error::WrongParameter(format!(
                    "cached accessor for '{}' does not hold {} elements",
                    self.path,
                    T::TAG.name()
                ))
            })
    }

    /// Shape of the cached accessor for `T`
    #[must_use]
    pub fn shape<T: UserType>(&self) -> Option<AccessorShape> {
        self.cache.get(&T::TAG).map(|cached| cached.shape)
    }

    /// Drop the cached accessor for `T`. Returns whether one existed.
    pub fn release<T: UserType>(&mut self) -> bool {
        self.cache.remove(&T::TAG).is_some()
    }

    /// Number of cached accessors
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no accessor has been built yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Non-buffering access to one register
///
/// Every call transfers directly between the caller's slice and the
/// hardware. Accessors are cached per element type; a call with a
/// different length or offset than the cached accessor replaces it.
pub struct RegisterHandle<E> {
    registry: AccessorRegistry<E>,
    info: Rc<RegisterInfo>,
}

impl<E: 'static> RegisterHandle<E> {
    /// Handle for the register at `path`
    ///
    /// # Errors
    /// Returns `NotFound` if the backend does not know the register.
    pub fn new(backend: Rc<dyn Backend<E>>, path: &str) -> Result<Self, Error<E>> {
        let info = backend.register_info(path)?;
        Ok(Self {
            registry: AccessorRegistry::new(backend, path),
            info,
        })
    }

    /// Description of the register
    #[must_use]
    pub fn register_info(&self) -> &Rc<RegisterInfo> {
        &self.info
    }

    /// Elements per channel
    #[must_use]
    pub fn number_of_elements(&self) -> usize {
        self.info.number_of_elements
    }

    /// Converter of the register (of its first channel for multiplexed blocks)
    ///
    /// # Errors
    /// Returns `Configuration` if the register describes an invalid converter.
    pub fn fixed_point_converter(&self) -> Result<FixedPointConverter, Error<E>> {
        self.info
            .channels
            .first()
            .map_or_else(|| self.info.converter(), |channel| channel.converter())
            .map_err(Error::lift)
    }

    fn accessor<T: UserType>(
        &mut self,
        number_of_words: usize,
        word_offset: usize,
        raw: bool,
    ) -> Result<&mut (dyn RegisterAccessor<T, E> + 'static), Error<E>> {
        let requested = AccessorShape {
            number_of_words,
            word_offset,
            raw,
        };
        if self
            .registry
            .shape::<T>()
            .is_some_and(|cached| cached != requested)
        {
            #[cfg(feature = "defmt")]
            defmt::debug!(
                "Rebuilding {=str} accessor for {=str}",
                T::TAG.name(),
                self.registry.path()
            );
            self.registry.release::<T>();
        }
        self.registry.get::<T>(number_of_words, word_offset, raw)
    }

    /// Read `data.len()` elements starting at `word_offset`
    ///
    /// # Errors
    /// Returns `WrongParameter` if the range exceeds the register, `Io` on
    /// transport failure.
    pub fn read<T: UserType>(&mut self, data: &mut [T], word_offset: usize) -> Result<(), Error<E>> {
        if data.is_empty() {
            return Ok(());
        }
        let accessor = self.accessor::<T>(data.len(), word_offset, false)?;
        accessor.read()?;
        data.clone_from_slice(accessor.channel(0)?);
        Ok(())
    }

    /// Write `data` starting at `word_offset`
    ///
    /// # Errors
    /// Returns `WrongParameter` if the range exceeds the register,
    /// `NotImplemented` for read-only registers, `Io` on transport failure.
    pub fn write<T: UserType>(&mut self, data: &[T], word_offset: usize) -> Result<(), Error<E>> {
        if data.is_empty() {
            return Ok(());
        }
        let accessor = self.accessor::<T>(data.len(), word_offset, false)?;
        accessor.channel_mut(0)?.clone_from_slice(data);
        accessor.write()
    }

    /// Read the register as one scalar
    ///
    /// Numeric types read the first element; strings read the whole register.
    ///
    /// # Errors
    /// Same conditions as [`read`](Self::read).
    pub fn read_value<T: UserType>(&mut self) -> Result<T, Error<E>> {
        let words = self.scalar_words::<T>();
        let accessor = self.accessor::<T>(words, 0, false)?;
        accessor.read()?;
        Ok(T::from_elements(accessor.channel(0)?))
    }

    /// Write one scalar
    ///
    /// Numeric types write the first element; strings fill the whole register.
    ///
    /// # Errors
    /// Same conditions as [`write`](Self::write).
    pub fn write_value<T: UserType>(&mut self, value: T) -> Result<(), Error<E>> {
        let words = self.scalar_words::<T>();
        let elements = value.to_elements(words);
        let accessor = self.accessor::<T>(words, 0, false)?;
        accessor.channel_mut(0)?.clone_from_slice(&elements);
        accessor.write()
    }

    fn scalar_words<T: UserType>(&self) -> usize {
        if T::TAG == UserTypeTag::String {
            self.info.number_of_elements.max(1)
        } else {
            1
        }
    }

    /// Read raw words starting at a byte offset
    ///
    /// # Errors
    /// Returns `WrongParameter` if the offset is not a multiple of 4 or the
    /// range exceeds the register, `NotImplemented` if the register has no
    /// raw representation.
    pub fn read_raw(&mut self, data: &mut [i32], byte_offset: usize) -> Result<(), Error<E>> {
        let word_offset = Self::word_offset(byte_offset)?;
        if data.is_empty() {
            return Ok(());
        }
        let accessor = self.accessor::<i32>(data.len(), word_offset, true)?;
        accessor.read()?;
        data.copy_from_slice(accessor.channel(0)?);
        Ok(())
    }

    /// Write raw words starting at a byte offset
    ///
    /// # Errors
    /// Same conditions as [`read_raw`](Self::read_raw).
    pub fn write_raw(&mut self, data: &[i32], byte_offset: usize) -> Result<(), Error<E>> {
        let word_offset = Self::word_offset(byte_offset)?;
        if data.is_empty() {
            return Ok(());
        }
        let accessor = self.accessor::<i32>(data.len(), word_offset, true)?;
        accessor.channel_mut(0)?.copy_from_slice(data);
        accessor.write()
    }

    fn word_offset(byte_offset: usize) -> Result<usize, Error<E>> {
        if byte_offset % crate::WORD_SIZE == 0 {
            Ok(byte_offset / crate::WORD_SIZE)
        } else {
            Err(Error::WrongParameter(format!(
                "byte offset {byte_offset} is not a multiple of {}",
                crate::WORD_SIZE
            )))
        }
    }
}
