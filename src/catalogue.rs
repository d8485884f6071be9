//! Register descriptions and the catalogue that names them
//!
//! The catalogue is normally filled by a map-file parser living outside this
//! crate. Applications and tests build it directly with the builder methods
//! on [`RegisterInfo`].

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::converter::FixedPointConverter;
use crate::{Error, WORD_SIZE};

/// Normalise a register path
///
/// `.` and `/` are both accepted as separators. Leading, trailing and
/// repeated separators are dropped and the result uses `/`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    for component in path.split(['.', '/']).filter(|c| !c.is_empty()) {
        if !normalized.is_empty() {
            normalized.push('/');
        }
        normalized.push_str(component);
    }
    normalized
}

/// Direction a register can be transferred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterAccess {
    /// Readable and writeable
    #[default]
    ReadWrite,
    /// Readable only, e.g. a DMA region
    ReadOnly,
}

/// Layout of one sequence inside a multiplexed block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelInfo {
    /// Size of one raw word of this channel (1, 2 or 4)
    pub bytes_per_word: u32,
    /// Significant bits per word
    pub word_width: u32,
    /// Fixed-point position
    pub fractional_bits: i32,
    /// Two's complement words
    pub signed: bool,
}

impl ChannelInfo {
    /// Signed channel using every bit of its word
    #[must_use]
    pub const fn new(bytes_per_word: u32, fractional_bits: i32) -> Self {
        Self {
            bytes_per_word,
            word_width: bytes_per_word * 8,
            fractional_bits,
            signed: true,
        }
    }

    /// Restrict the number of significant bits
    #[must_use]
    pub const fn word_width(mut self, word_width: u32) -> Self {
        self.word_width = word_width;
        self
    }

    /// Treat words as unsigned
    #[must_use]
    pub const fn unsigned(mut self) -> Self {
        self.signed = false;
        self
    }

    /// Converter for this channel's words
    ///
    /// # Errors
    /// Returns `Configuration` for an invalid width or scaling.
    pub fn converter(&self) -> Result<FixedPointConverter, Error<()>> {
        FixedPointConverter::new(self.word_width, self.fractional_bits, self.signed)
    }
}

/// Immutable description of one physical register
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterInfo {
    /// Normalised full path
    pub name: String,
    /// Byte address inside the bar
    pub address: u32,
    /// Address space selector
    pub bar: u8,
    /// Elements per channel
    pub number_of_elements: usize,
    /// Bytes occupied in the address space
    pub size_in_bytes: usize,
    /// Significant bits per word (1-D registers)
    pub word_width: u32,
    /// Fixed-point position (1-D registers)
    pub fractional_bits: i32,
    /// Two's complement words (1-D registers)
    pub signed: bool,
    /// Transfer direction
    pub access: RegisterAccess,
    /// Sequence layout, empty for 1-D registers
    pub channels: Vec<ChannelInfo>,
}

impl RegisterInfo {
    /// Single-word, 32-bit signed, read-write register without scaling
    pub fn new(name: &str, address: u32, bar: u8) -> Self {
        Self {
            name: normalize_path(name),
            address,
            bar,
            number_of_elements: 1,
            size_in_bytes: WORD_SIZE,
            word_width: 32,
            fractional_bits: 0,
            signed: true,
            access: RegisterAccess::ReadWrite,
            channels: Vec::new(),
        }
    }

    /// Set the element count. For 1-D registers this also sets the size.
    #[must_use]
    pub fn elements(mut self, number_of_elements: usize) -> Self {
        self.number_of_elements = number_of_elements;
        if self.channels.is_empty() {
            self.size_in_bytes = number_of_elements * WORD_SIZE;
        }
        self
    }

    /// Set the number of significant bits
    #[must_use]
    pub fn word_width(mut self, word_width: u32) -> Self {
        self.word_width = word_width;
        self
    }

    /// Set the fixed-point position
    #[must_use]
    pub fn fractional_bits(mut self, fractional_bits: i32) -> Self {
        self.fractional_bits = fractional_bits;
        self
    }

    /// Treat words as unsigned
    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.signed = false;
        self
    }

    /// Forbid writes
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.access = RegisterAccess::ReadOnly;
        self
    }

    /// Turn this into a 2-D register of interleaved sequences
    ///
    /// The element count is derived from the block size and the row stride.
    #[must_use]
    pub fn multiplexed(mut self, channels: Vec<ChannelInfo>, size_in_bytes: usize) -> Self {
        let stride: usize = channels.iter().map(|c| c.bytes_per_word as usize).sum();
        self.number_of_elements = size_in_bytes.checked_div(stride).unwrap_or(0);
        self.size_in_bytes = size_in_bytes;
        self.channels = channels;
        self
    }

    /// Number of sequences, 1 for plain registers
    #[must_use]
    pub fn number_of_channels(&self) -> usize {
        self.channels.len().max(1)
    }

    /// 1 for plain registers, 2 for multiplexed blocks
    #[must_use]
    pub fn number_of_dimensions(&self) -> usize {
        if self.channels.is_empty() { 1 } else { 2 }
    }

    /// Whether accessors may write this register
    #[must_use]
    pub fn is_writeable(&self) -> bool {
        self.access == RegisterAccess::ReadWrite
    }

    /// Converter for the words of a 1-D register
    ///
    /// # Errors
    /// Returns `Configuration` for an invalid width or scaling.
    pub fn converter(&self) -> Result<FixedPointConverter, Error<()>> {
        FixedPointConverter::new(self.word_width, self.fractional_bits, self.signed)
    }

    fn end_address(&self) -> u64 {
        u64::from(self.address) + self.size_in_bytes as u64
    }
}

/// How serious a catalogue finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IssueSeverity {
    /// Suspicious but usable
    Warning,
    /// The catalogue is ambiguous
    Error,
}

/// Finding reported by [`RegisterCatalogue::check`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CatalogueIssue {
    /// Severity
    pub severity: IssueSeverity,
    /// First register involved
    pub first: String,
    /// Second register involved
    pub second: String,
    /// Human readable description
    pub message: String,
}

/// Collection of register descriptions addressed by path
#[derive(Debug, Clone, Default)]
pub struct RegisterCatalogue {
    registers: Vec<Rc<RegisterInfo>>,
}

impl RegisterCatalogue {
    /// Empty catalogue
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registers: Vec::new(),
        }
    }

    /// Add a register. Duplicates are kept and reported by [`check`](Self::check).
    pub fn insert(&mut self, info: RegisterInfo) {
        self.registers.push(Rc::new(info));
    }

    /// Find a register by path
    ///
    /// # Errors
    /// Returns `NotFound` if no register has this path.
    pub fn lookup(&self, path: &str) -> Result<Rc<RegisterInfo>, Error<()>> {
        let name = normalize_path(path);
        self.registers
            .iter()
            .find(|info| info.name == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("register '{name}' is not in the catalogue")))
    }

    /// Whether a register with this path exists
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        let name = normalize_path(path);
        self.registers.iter().any(|info| info.name == name)
    }

    /// All registers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Rc<RegisterInfo>> {
        self.registers.iter()
    }

    /// Number of registers
    #[must_use]
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Whether the catalogue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Registers directly or indirectly below `module`, sorted by name
    #[must_use]
    pub fn registers_in_module(&self, module: &str) -> Vec<Rc<RegisterInfo>> {
        let mut prefix = normalize_path(module);
        prefix.push('/');
        let mut found: Vec<_> = self
            .registers
            .iter()
            .filter(|info| info.name.starts_with(&prefix))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Report duplicate names and overlapping address ranges
    #[must_use]
    pub fn check(&self) -> Vec<CatalogueIssue> {
        let mut issues = Vec::new();

        for (i, first) in self.registers.iter().enumerate() {
            for second in &self.registers[i + 1..] {
                if first.name == second.name {
                    issues.push(CatalogueIssue {
                        severity: IssueSeverity::Error,
                        first: first.name.clone(),
                        second: second.name.clone(),
                        message: format!("register '{}' is defined twice", first.name),
                    });
                } else if first.bar == second.bar
                    && first.size_in_bytes > 0
                    && second.size_in_bytes > 0
                    && u64::from(first.address) < second.end_address()
                    && u64::from(second.address) < first.end_address()
                {
                    issues.push(CatalogueIssue {
                        severity: IssueSeverity::Warning,
                        first: first.name.clone(),
                        second: second.name.clone(),
                        message: format!(
                            "registers '{}' and '{}' overlap in bar {}",
                            first.name, second.name, first.bar
                        ),
                    });
                }
            }
        }

        issues
    }

    /// Bytes each bar must provide to hold every register
    #[must_use]
    pub fn bar_sizes(&self) -> Vec<(u8, usize)> {
        let mut sizes: Vec<(u8, usize)> = Vec::new();
        for info in &self.registers {
            let end = info.address as usize + info.size_in_bytes;
            match sizes.iter_mut().find(|(bar, _)| *bar == info.bar) {
                Some((_, size)) => *size = (*size).max(end),
                None => sizes.push((info.bar, end)),
            }
        }
        sizes.sort_unstable();
        sizes
    }
}
