//! Accessors produced by the logical map itself

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use super::TargetKind;
use super::entry::{EntryHandle, LogicalArena};
use crate::Error;
use crate::accessor::{RegisterAccessor, no_such_channel};
use crate::converter::FixedPointConverter;
use crate::user_type::UserType;

/// Integer converter: whole 32-bit signed words, no scaling
const INTEGER_CONVERTER: FixedPointConverter = FixedPointConverter::identity(true);

/// Single-element accessor backed by an integer entry of the map
///
/// Reads resolve the entry's value at that moment; writes to a variable
/// replace it for every holder of the same map.
pub struct VariableAccessor<T: UserType, E> {
    arena: Rc<LogicalArena<E>>,
    handle: EntryHandle,
    buffer: Vec<T>,
}

impl<T: UserType, E: 'static> VariableAccessor<T, E> {
    pub(super) fn new(arena: Rc<LogicalArena<E>>, handle: EntryHandle) -> Self {
        Self {
            arena,
            handle,
            buffer: vec![T::default()],
        }
    }
}

impl<T: UserType, E: 'static> RegisterAccessor<T, E> for VariableAccessor<T, E> {
    fn name(&self) -> &str {
        self.arena.entry(self.handle).name()
    }

    fn read(&mut self) -> Result<(), Error<E>> {
        let value = self.arena.entry(self.handle).value()?;
        // reinterpret as the two's complement word the converter expects
        #[allow(clippy::cast_sign_loss)]
        let raw = value as u32;
        self.buffer[0] = T::from_raw(&INTEGER_CONVERTER, raw);
        Ok(())
    }

    fn write(&mut self) -> Result<(), Error<E>> {
        #[allow(clippy::cast_possible_wrap)]
        let value = self.buffer[0].to_raw(&INTEGER_CONVERTER) as i32;
        self.arena.entry(self.handle).set_value(value)
    }

    fn number_of_channels(&self) -> usize {
        1
    }

    fn number_of_samples(&self) -> usize {
        1
    }

    fn channel(&self, index: usize) -> Result<&[T], Error<E>> {
        if index == 0 {
            Ok(&self.buffer)
        } else {
            Err(no_such_channel(self.name(), index, 1))
        }
    }

    fn channel_mut(&mut self, index: usize) -> Result<&mut [T], Error<E>> {
        if index == 0 {
            Ok(&mut self.buffer)
        } else {
            Err(no_such_channel(self.arena.entry(self.handle).name(), index, 1))
        }
    }

    fn is_writeable(&self) -> bool {
        self.arena.entry(self.handle).kind() == TargetKind::IntVariable
    }

    fn fixed_point_converter(&self) -> Option<&FixedPointConverter> {
        Some(&INTEGER_CONVERTER)
    }
}

/// Read-only view on one sequence of a multiplexed block
pub struct ChannelAccessor<T: UserType, E> {
    name: String,
    block: Box<dyn RegisterAccessor<T, E>>,
    channel: usize,
}

impl<T: UserType, E> ChannelAccessor<T, E> {
    /// View on `channel` of `block`
    ///
    /// # Errors
    /// Returns `WrongParameter` if the block has no such channel.
    pub fn new(
        name: &str,
        block: Box<dyn RegisterAccessor<T, E>>,
        channel: usize,
    ) -> Result<Self, Error<E>> {
        if channel >= block.number_of_channels() {
            return Err(no_such_channel(block.name(), channel, block.number_of_channels()));
        }
        Ok(Self {
            name: String::from(name),
            block,
            channel,
        })
    }
}

impl<T: UserType, E> RegisterAccessor<T, E> for ChannelAccessor<T, E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<(), Error<E>> {
        self.block.read()
    }

    fn write(&mut self) -> Result<(), Error<E>> {
        #[cfg(feature = "defmt")]
        defmt::warn!("Refusing write to channel view {=str}", self.name.as_str());
        Err(Error::NotImplemented(format!(
            "logical channel '{}' is read-only",
            self.name
        )))
    }

    fn number_of_channels(&self) -> usize {
        1
    }

    fn number_of_samples(&self) -> usize {
        self.block.number_of_samples()
    }

    fn channel(&self, index: usize) -> Result<&[T], Error<E>> {
        if index == 0 {
            self.block.channel(self.channel)
        } else {
            Err(no_such_channel(&self.name, index, 1))
        }
    }

    fn channel_mut(&mut self, index: usize) -> Result<&mut [T], Error<E>> {
        if index == 0 {
            self.block.channel_mut(self.channel)
        } else {
            Err(no_such_channel(&self.name, index, 1))
        }
    }

    fn is_writeable(&self) -> bool {
        false
    }

    fn fixed_point_converter(&self) -> Option<&FixedPointConverter> {
        None
    }
}
