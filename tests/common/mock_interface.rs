//! Mock raw transfer interface with an operation log and failure injection

use device_driver::RegisterInterface;
use regaccess::{BarAddress, DeviceInterface, DummyError, DummyInterface, RegisterCatalogue};
use std::cell::RefCell;
use std::rc::Rc;

/// Records operations performed on the mock interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Interface opened
    Open,
    /// Interface closed
    Close,
    /// Raw read
    Read {
        /// Address space selector
        bar: u8,
        /// First byte
        address: u32,
        /// Bytes requested
        len: usize,
    },
    /// Raw write
    Write {
        /// Address space selector
        bar: u8,
        /// First byte
        address: u32,
        /// Bytes written
        len: usize,
    },
}

/// Errors produced by the mock interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    /// Read failure injected by the test
    InjectedRead,
    /// Write failure injected by the test
    InjectedWrite,
    /// Failure of the simulated memory
    Memory(DummyError),
}

/// Shared state for mock interface (uses interior mutability)
#[derive(Debug, Default)]
struct MockState {
    /// Operations log for verification
    operations: Vec<Operation>,

    /// Failure injection flags
    fail_next_read: bool,
    fail_next_write: bool,
}

/// Mock interface over simulated memory
///
/// Clones share memory, log and failure flags, so a test can keep one
/// clone while the device owns another.
#[derive(Debug, Clone)]
pub struct MockInterface {
    memory: DummyInterface,
    state: Rc<RefCell<MockState>>,
}

impl MockInterface {
    /// Mock with memory for every register of `catalogue`
    pub fn for_catalogue(catalogue: &RegisterCatalogue) -> Self {
        Self {
            memory: DummyInterface::for_catalogue(catalogue),
            state: Rc::new(RefCell::new(MockState::default())),
        }
    }

    /// Make the next read fail with [`MockError::InjectedRead`]
    pub fn fail_next_read(&self) {
        self.state.borrow_mut().fail_next_read = true;
    }

    /// Make the next write fail with [`MockError::InjectedWrite`]
    pub fn fail_next_write(&self) {
        self.state.borrow_mut().fail_next_write = true;
    }

    /// Everything that happened so far
    pub fn operations(&self) -> Vec<Operation> {
        self.state.borrow().operations.clone()
    }

    /// Forget the logged operations
    pub fn clear_operations(&self) {
        self.state.borrow_mut().operations.clear();
    }

    /// Number of logged opens
    pub fn open_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| **op == Operation::Open)
            .count()
    }

    /// Word in simulated memory
    pub fn word(&self, bar: u8, address: u32) -> u32 {
        self.memory.word(bar, address).expect("word outside simulated memory")
    }

    /// Set a word in simulated memory
    pub fn set_word(&self, bar: u8, address: u32, value: u32) {
        assert!(
            self.memory.set_word(bar, address, value),
            "word outside simulated memory"
        );
    }

    /// Set consecutive words in simulated memory
    pub fn set_words(&self, bar: u8, address: u32, values: &[u32]) {
        for (i, value) in values.iter().enumerate() {
            self.set_word(bar, address + 4 * i as u32, *value);
        }
    }
}

impl RegisterInterface for MockInterface {
    type Error = MockError;
    type AddressType = BarAddress;

    fn read_register(
        &mut self,
        address: Self::AddressType,
        size_bits: u32,
        read_data: &mut [u8],
    ) -> Result<(), Self::Error> {
        {
            let mut state = self.state.borrow_mut();
            state.operations.push(Operation::Read {
                bar: address.bar,
                address: address.address,
                len: read_data.len(),
            });
            if state.fail_next_read {
                state.fail_next_read = false;
                return Err(MockError::InjectedRead);
            }
        }
        self.memory
            .read_register(address, size_bits, read_data)
            .map_err(MockError::Memory)
    }

    fn write_register(
        &mut self,
        address: Self::AddressType,
        size_bits: u32,
        write_data: &[u8],
    ) -> Result<(), Self::Error> {
        {
            let mut state = self.state.borrow_mut();
            state.operations.push(Operation::Write {
                bar: address.bar,
                address: address.address,
                len: write_data.len(),
            });
            if state.fail_next_write {
                state.fail_next_write = false;
                return Err(MockError::InjectedWrite);
            }
        }
        self.memory
            .write_register(address, size_bits, write_data)
            .map_err(MockError::Memory)
    }
}

impl DeviceInterface for MockInterface {
    fn open(&mut self) -> Result<(), Self::Error> {
        self.state.borrow_mut().operations.push(Operation::Open);
        self.memory.open().map_err(MockError::Memory)
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.state.borrow_mut().operations.push(Operation::Close);
        self.memory.close().map_err(MockError::Memory)
    }
}
