//! Logical name mapping
//!
//! A [`VirtualRegisterMap`] is a backend whose registers are defined by a
//! [`LogicalNameMap`]: each logical name resolves to a register or a
//! sub-range of a register on another backend, to one channel of a
//! multiplexed block, or to an integer held by the map itself.
//!
//! Every resolution parameter is a [`ValueSource`]. Literals are fixed when
//! the map is parsed; register sources are read through the map each time
//! the parameter is needed, so a target can follow hardware state.

mod accessors;
mod entry;
mod map;
mod value;

use alloc::collections::BTreeMap;
use alloc::string::String;

pub use accessors::{ChannelAccessor, VariableAccessor};
pub use entry::{EntryHandle, EntryRef, LogicalArena, LogicalRegisterEntry};
pub use map::VirtualRegisterMap;
pub use value::DynamicValue;

use crate::catalogue::normalize_path;

/// What a logical register resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetKind {
    /// A whole register on another backend
    Register,
    /// A contiguous part of a register on another backend
    Range,
    /// One sequence of a multiplexed block on another backend
    Channel,
    /// An integer that never changes
    IntConstant,
    /// An integer the application may overwrite
    IntVariable,
    /// A kind this map cannot resolve
    Invalid,
}

impl TargetKind {
    /// Kind name for diagnostics
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Range => "range",
            Self::Channel => "channel",
            Self::IntConstant => "int_constant",
            Self::IntVariable => "int_variable",
            Self::Invalid => "invalid",
        }
    }
}

/// Lifecycle of a [`VirtualRegisterMap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MapState {
    /// Description not processed yet
    Unparsed,
    /// Entries and nested backends exist, nothing opened
    Parsed,
    /// Nested backends are open
    Opened,
    /// Nested backends were closed
    Closed,
}

/// Where a resolution parameter comes from
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValueSource<T> {
    /// Fixed value
    Literal(T),
    /// Logical register of the same map, read on every use
    Register(String),
}

impl<T> ValueSource<T> {
    /// Whether the value is fixed
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

impl From<&str> for ValueSource<String> {
    fn from(value: &str) -> Self {
        Self::Literal(String::from(value))
    }
}

impl From<u32> for ValueSource<u32> {
    fn from(value: u32) -> Self {
        Self::Literal(value)
    }
}

impl From<i32> for ValueSource<i32> {
    fn from(value: i32) -> Self {
        Self::Literal(value)
    }
}

/// Declarative description of one logical register
///
/// Only the fields that apply to `kind` may be set. [`VirtualRegisterMap`]
/// rejects descriptions with missing or extra fields when it parses them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogicalRegisterSpec {
    /// Target kind
    pub kind: TargetKind,
    /// Alias of the target backend
    pub device: Option<ValueSource<String>>,
    /// Register path on the target backend
    pub register: Option<ValueSource<String>>,
    /// First element of a range
    pub first_index: Option<ValueSource<u32>>,
    /// Number of elements of a range
    pub length: Option<ValueSource<u32>>,
    /// Sequence index of a channel
    pub channel: Option<ValueSource<u32>>,
    /// Integer value
    pub value: Option<ValueSource<i32>>,
}

impl LogicalRegisterSpec {
    /// Description without any fields
    #[must_use]
    pub const fn new(kind: TargetKind) -> Self {
        Self {
            kind,
            device: None,
            register: None,
            first_index: None,
            length: None,
            channel: None,
            value: None,
        }
    }

    /// A whole register
    #[must_use]
    pub fn register(device: &str, register: &str) -> Self {
        Self::register_with(device.into(), register.into())
    }

    /// A whole register, with device and register names from any source
    #[must_use]
    pub fn register_with(device: ValueSource<String>, register: ValueSource<String>) -> Self {
        Self {
            device: Some(device),
            register: Some(register),
            ..Self::new(TargetKind::Register)
        }
    }

    /// `length` elements of a register, starting at `first_index`
    #[must_use]
    pub fn range(device: &str, register: &str, first_index: u32, length: u32) -> Self {
        Self::range_with(device.into(), register.into(), first_index.into(), length.into())
    }

    /// A range with every parameter from any source
    #[must_use]
    pub fn range_with(
        device: ValueSource<String>,
        register: ValueSource<String>,
        first_index: ValueSource<u32>,
        length: ValueSource<u32>,
    ) -> Self {
        Self {
            device: Some(device),
            register: Some(register),
            first_index: Some(first_index),
            length: Some(length),
            ..Self::new(TargetKind::Range)
        }
    }

    /// One sequence of a multiplexed block
    #[must_use]
    pub fn channel(device: &str, register: &str, channel: u32) -> Self {
        Self::channel_with(device.into(), register.into(), channel.into())
    }

    /// A channel with every parameter from any source
    #[must_use]
    pub fn channel_with(
        device: ValueSource<String>,
        register: ValueSource<String>,
        channel: ValueSource<u32>,
    ) -> Self {
        Self {
            device: Some(device),
            register: Some(register),
            channel: Some(channel),
            ..Self::new(TargetKind::Channel)
        }
    }

    /// Read-only integer
    #[must_use]
    pub fn int_constant(value: i32) -> Self {
        Self {
            value: Some(ValueSource::Literal(value)),
            ..Self::new(TargetKind::IntConstant)
        }
    }

    /// Writeable integer with an initial value
    #[must_use]
    pub fn int_variable(value: i32) -> Self {
        Self {
            value: Some(ValueSource::Literal(value)),
            ..Self::new(TargetKind::IntVariable)
        }
    }
}

/// Logical register descriptions keyed by normalised path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalNameMap {
    registers: BTreeMap<String, LogicalRegisterSpec>,
}

impl LogicalNameMap {
    /// Empty map
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registers: BTreeMap::new(),
        }
    }

    /// Add or replace a logical register
    pub fn insert(&mut self, name: &str, spec: LogicalRegisterSpec) {
        self.registers.insert(normalize_path(name), spec);
    }

    /// Description of a logical register
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LogicalRegisterSpec> {
        self.registers.get(&normalize_path(name))
    }

    /// All descriptions, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&String, &LogicalRegisterSpec)> {
        self.registers.iter()
    }

    /// Number of logical registers
    #[must_use]
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Whether the map is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}
