//! De-multiplexing of interleaved sequences
//!
//! A multiplexed block is a sequence of rows. Each row holds one word of
//! every channel, in channel order, and words may be 1, 2 or 4 bytes wide:
//!
//! ```text
//! | ch0 s0 | ch1 s0 | ch2 s0 | ch0 s1 | ch1 s1 | ch2 s1 | ...
//! ```
//!
//! The whole block moves in one raw transfer in either direction.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use super::{RegisterAccessor, no_such_channel};
use crate::backend::Backend;
use crate::catalogue::RegisterInfo;
use crate::converter::FixedPointConverter;
use crate::user_type::UserType;
use crate::{Error, WORD_SIZE};

/// Word size and conversion of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceLayout {
    /// Bytes per word, 1, 2 or 4
    pub bytes_per_word: usize,
    /// Converter for this channel
    pub converter: FixedPointConverter,
}

/// Validated geometry of a multiplexed block
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MultiplexedSequenceDescriptor {
    bar: u8,
    address: u32,
    size_in_bytes: usize,
    channels: Vec<SequenceLayout>,
    offsets: Vec<usize>,
    stride: usize,
    samples: usize,
    writeable: bool,
}

impl MultiplexedSequenceDescriptor {
    /// Validate a block layout
    ///
    /// # Arguments
    /// * `bar`, `address` - Location of the block
    /// * `size_in_bytes` - Size of the block
    /// * `channels` - Layout of every sequence, in row order
    /// * `declared_samples` - Element count from the catalogue, if any
    /// * `writeable` - Whether the block accepts writes
    ///
    /// # Errors
    /// Returns `Configuration` for an empty channel list, unsupported word
    /// sizes, converters wider than their word, misaligned channels, a block
    /// size that is not a non-zero multiple of both the row stride and 4, or
    /// a declared element count that disagrees with the geometry.
    pub fn new(
        bar: u8,
        address: u32,
        size_in_bytes: usize,
        channels: Vec<SequenceLayout>,
        declared_samples: Option<usize>,
        writeable: bool,
    ) -> Result<Self, Error<()>> {
        if channels.is_empty() {
            return Err(Error::Configuration(String::from(
                "multiplexed block has no channels",
            )));
        }

        let mut offsets = Vec::with_capacity(channels.len());
        let mut stride = 0;
        for (index, layout) in channels.iter().enumerate() {
            if !matches!(layout.bytes_per_word, 1 | 2 | 4) {
                return Err(Error::Configuration(format!(
                    "channel {index} uses unsupported word size {}",
                    layout.bytes_per_word
                )));
            }
            if layout.converter.width() as usize > layout.bytes_per_word * 8 {
                return Err(Error::Configuration(format!(
                    "channel {index} needs {} bits but its word has {}",
                    layout.converter.width(),
                    layout.bytes_per_word * 8
                )));
            }
            if stride % layout.bytes_per_word != 0 {
                return Err(Error::Configuration(format!(
                    "channel {index} at row offset {stride} is not aligned to its {} byte words",
                    layout.bytes_per_word
                )));
            }
            offsets.push(stride);
            stride += layout.bytes_per_word;
        }

        // every row must start aligned for every channel
        if let Some((index, layout)) = channels
            .iter()
            .enumerate()
            .find(|(_, layout)| stride % layout.bytes_per_word != 0)
        {
            return Err(Error::Configuration(format!(
                "channel {index} uses {} byte words, which do not divide the row size {stride}",
                layout.bytes_per_word
            )));
        }

        if size_in_bytes == 0 || size_in_bytes % stride != 0 || size_in_bytes % WORD_SIZE != 0 {
            return Err(Error::Configuration(format!(
                "block size {size_in_bytes} is not a non-zero multiple of the row size {stride} and of {WORD_SIZE}"
            )));
        }

        let samples = size_in_bytes / stride;
        if let Some(declared) = declared_samples.filter(|&declared| declared != samples) {
            return Err(Error::Configuration(format!(
                "block declares {declared} elements but its geometry holds {samples}"
            )));
        }

        Ok(Self {
            bar,
            address,
            size_in_bytes,
            channels,
            offsets,
            stride,
            samples,
            writeable,
        })
    }

    /// Descriptor of a 2-D catalogue entry
    ///
    /// # Errors
    /// Same conditions as [`new`](Self::new), plus invalid channel converters.
    pub fn from_register_info(info: &RegisterInfo) -> Result<Self, Error<()>> {
        let channels = info
            .channels
            .iter()
            .map(|channel| {
                Ok(SequenceLayout {
                    bytes_per_word: channel.bytes_per_word as usize,
                    converter: channel.converter()?,
                })
            })
            .collect::<Result<Vec<_>, Error<()>>>()?;

        Self::new(
            info.bar,
            info.address,
            info.size_in_bytes,
            channels,
            Some(info.number_of_elements),
            info.is_writeable(),
        )
    }

    /// Number of channels
    #[must_use]
    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    #[must_use]
    pub const fn number_of_samples(&self) -> usize {
        self.samples
    }

    /// Bytes per row
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Byte offset of every channel inside a row
    #[must_use]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Size of the block
    #[must_use]
    pub const fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    /// Whether the block accepts writes
    #[must_use]
    pub const fn is_writeable(&self) -> bool {
        self.writeable
    }

    /// Layout of one channel
    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&SequenceLayout> {
        self.channels.get(index)
    }

    fn word_at(&self, block: &[u8], row: usize, channel: usize) -> u32 {
        let start = row * self.stride + self.offsets[channel];
        let mut word = [0u8; 4];
        let width = self.channels[channel].bytes_per_word;
        word[..width].copy_from_slice(&block[start..start + width]);
        u32::from_le_bytes(word)
    }

    fn put_word(&self, block: &mut [u8], row: usize, channel: usize, raw: u32) {
        let start = row * self.stride + self.offsets[channel];
        let width = self.channels[channel].bytes_per_word;
        block[start..start + width].copy_from_slice(&raw.to_le_bytes()[..width]);
    }
}

/// Gathers and scatters all channels of a multiplexed block
pub struct MultiplexedSequenceAccessor<T: UserType, E> {
    backend: Rc<dyn Backend<E>>,
    name: String,
    descriptor: MultiplexedSequenceDescriptor,
    buffers: Vec<Vec<T>>,
}

impl<T: UserType, E> MultiplexedSequenceAccessor<T, E> {
    /// Accessor over a validated block
    pub fn new(
        backend: Rc<dyn Backend<E>>,
        name: &str,
        descriptor: MultiplexedSequenceDescriptor,
    ) -> Self {
        let buffers = vec![vec![T::default(); descriptor.samples]; descriptor.channels.len()];
        Self {
            backend,
            name: String::from(name),
            descriptor,
            buffers,
        }
    }

    /// Geometry of the block
    #[must_use]
    pub fn descriptor(&self) -> &MultiplexedSequenceDescriptor {
        &self.descriptor
    }
}

impl<T: UserType, E> RegisterAccessor<T, E> for MultiplexedSequenceAccessor<T, E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<(), Error<E>> {
        let descriptor = &self.descriptor;
        let mut block = vec![0u8; descriptor.size_in_bytes];
        self.backend
            .read_raw(descriptor.bar, descriptor.address, &mut block)?;

        for (channel, buffer) in self.buffers.iter_mut().enumerate() {
            let converter = &descriptor.channels[channel].converter;
            for (row, value) in buffer.iter_mut().enumerate() {
                *value = T::from_raw(converter, descriptor.word_at(&block, row, channel));
            }
        }
        Ok(())
    }

    fn write(&mut self) -> Result<(), Error<E>> {
        let descriptor = &self.descriptor;
        if !descriptor.writeable {
            #[cfg(feature = "defmt")]
            defmt::warn!("Refusing write to read-only block {=str}", self.name.as_str());
            return Err(Error::NotImplemented(format!(
                "multiplexed block '{}' does not support writing",
                self.name
            )));
        }

        let mut block = vec![0u8; descriptor.size_in_bytes];
        for (channel, buffer) in self.buffers.iter().enumerate() {
            let converter = &descriptor.channels[channel].converter;
            for (row, value) in buffer.iter().enumerate() {
                descriptor.put_word(&mut block, row, channel, value.to_raw(converter));
            }
        }
        self.backend
            .write_raw(descriptor.bar, descriptor.address, &block)
    }

    fn number_of_channels(&self) -> usize {
        self.buffers.len()
    }

    fn number_of_samples(&self) -> usize {
        self.descriptor.samples
    }

    fn channel(&self, index: usize) -> Result<&[T], Error<E>> {
        self.buffers
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| no_such_channel(&self.name, index, self.buffers.len()))
    }

    fn channel_mut(&mut self, index: usize) -> Result<&mut [T], Error<E>> {
        let channels = self.buffers.len();
        self.buffers
            .get_mut(index)
            .map(Vec::as_mut_slice)
            .ok_or_else(|| no_such_channel(&self.name, index, channels))
    }

    fn is_writeable(&self) -> bool {
        self.descriptor.writeable
    }

    fn fixed_point_converter(&self) -> Option<&FixedPointConverter> {
        None
    }
}
