//! Raw transfer interfaces
//!
//! Backends move bytes through the `device-driver` [`RegisterInterface`]
//! trait, addressed by a [`BarAddress`]. The `size_bits` argument always
//! equals eight times the length of the data slice.
//!
//! [`DummyInterface`] simulates a memory-mapped board and is what tests and
//! offline tools run against.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;

use device_driver::RegisterInterface;

use crate::catalogue::RegisterCatalogue;

/// Location of a transfer: address space selector plus byte address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BarAddress {
    /// Address space selector
    pub bar: u8,
    /// Byte address inside the bar
    pub address: u32,
}

impl BarAddress {
    /// Create an address
    #[must_use]
    pub const fn new(bar: u8, address: u32) -> Self {
        Self { bar, address }
    }
}

/// Raw transfer interface of a physical backend
///
/// Interfaces that hold a session (a socket, a mapped file) establish it in
/// [`open`](Self::open). Both calls may be repeated.
pub trait DeviceInterface: RegisterInterface<AddressType = BarAddress> {
    /// Prepare the interface for transfers
    ///
    /// # Errors
    /// Returns the transport error if the session cannot be established.
    fn open(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Release the session
    ///
    /// # Errors
    /// Returns the transport error if the session cannot be torn down.
    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Failures of the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DummyError {
    /// Transfer attempted before `open()` or after `close()`
    Closed,
    /// The bar was never allocated
    UnknownBar(u8),
    /// Transfer extends past the end of the bar
    OutOfRange {
        /// Address space selector
        bar: u8,
        /// First byte of the transfer
        address: u32,
        /// Transfer length in bytes
        len: usize,
    },
}

#[derive(Debug, Default)]
struct DummyState {
    bars: BTreeMap<u8, Vec<u8>>,
    open: bool,
}

/// Simulated device backed by zero-initialised memory, one array per bar
///
/// Clones share the same memory, so a test can keep one handle to inspect
/// what accessors wrote through another.
#[derive(Debug, Clone, Default)]
pub struct DummyInterface {
    state: Rc<RefCell<DummyState>>,
}

impl DummyInterface {
    /// Device without any bars
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Device with every bar large enough for the registers of a catalogue
    #[must_use]
    pub fn for_catalogue(catalogue: &RegisterCatalogue) -> Self {
        let interface = Self::new();
        for (bar, size) in catalogue.bar_sizes() {
            interface.add_bar(bar, size);
        }
        interface
    }

    /// Allocate (or grow) a bar to at least `size` bytes
    pub fn add_bar(&self, bar: u8, size: usize) {
        let mut state = self.state.borrow_mut();
        let memory = state.bars.entry(bar).or_default();
        if memory.len() < size {
            memory.resize(size, 0);
        }
    }

    /// Whether the device is open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    /// Peek at a little-endian word regardless of the open state
    #[must_use]
    pub fn word(&self, bar: u8, address: u32) -> Option<u32> {
        let state = self.state.borrow();
        let start = address as usize;
        let bytes = state.bars.get(&bar)?.get(start..start + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Poke a little-endian word regardless of the open state
    ///
    /// Returns `false` if the word lies outside the allocated bar.
    pub fn set_word(&self, bar: u8, address: u32, value: u32) -> bool {
        let mut state = self.state.borrow_mut();
        let start = address as usize;
        match state
            .bars
            .get_mut(&bar)
            .and_then(|memory| memory.get_mut(start..start + 4))
        {
            Some(bytes) => {
                bytes.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Copy of a byte range regardless of the open state
    #[must_use]
    pub fn bytes(&self, bar: u8, address: u32, len: usize) -> Vec<u8> {
        let state = self.state.borrow();
        let start = address as usize;
        state
            .bars
            .get(&bar)
            .and_then(|memory| memory.get(start..start + len))
            .map_or_else(|| vec![0; len], <[u8]>::to_vec)
    }

    fn checked_range(
        state: &DummyState,
        address: BarAddress,
        len: usize,
    ) -> Result<core::ops::Range<usize>, DummyError> {
        if !state.open {
            return Err(DummyError::Closed);
        }
        let memory = state
            .bars
            .get(&address.bar)
            .ok_or(DummyError::UnknownBar(address.bar))?;
        let start = address.address as usize;
        let end = start.checked_add(len).filter(|&end| end <= memory.len());
        end.map(|end| start..end).ok_or(DummyError::OutOfRange {
            bar: address.bar,
            address: address.address,
            len,
        })
    }
}

impl RegisterInterface for DummyInterface {
    type Error = DummyError;
    type AddressType = BarAddress;

    fn read_register(
        &mut self,
        address: Self::AddressType,
        size_bits: u32,
        read_data: &mut [u8],
    ) -> Result<(), Self::Error> {
        let _ = size_bits; // implied by read_data.len()
        let state = self.state.borrow();
        let range = Self::checked_range(&state, address, read_data.len())?;
        read_data.copy_from_slice(&state.bars[&address.bar][range]);
        Ok(())
    }

    fn write_register(
        &mut self,
        address: Self::AddressType,
        size_bits: u32,
        write_data: &[u8],
    ) -> Result<(), Self::Error> {
        let _ = size_bits; // implied by write_data.len()
        let mut state = self.state.borrow_mut();
        let range = Self::checked_range(&state, address, write_data.len())?;
        if let Some(memory) = state.bars.get_mut(&address.bar) {
            memory[range].copy_from_slice(write_data);
        }
        Ok(())
    }
}

impl DeviceInterface for DummyInterface {
    fn open(&mut self) -> Result<(), Self::Error> {
        self.state.borrow_mut().open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.state.borrow_mut().open = false;
        Ok(())
    }
}
