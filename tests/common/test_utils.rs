//! Test utilities and helper functions

use crate::common::mock_interface::{MockError, MockInterface};
use regaccess::{Backend, ChannelInfo, Device, RegisterCatalogue, RegisterInfo};
use std::rc::Rc;

/// Device type used throughout the tests
pub type MockDevice = Device<MockInterface>;

/// Catalogue shared by most tests
///
/// | register            | bar | address | layout                               |
/// |---------------------|-----|---------|--------------------------------------|
/// | `BOARD/WORD_STATUS` | 0   | 0x00    | 1 x 32 bit signed                    |
/// | `BOARD/WORD_USER`   | 0   | 0x04    | 1 x 12 bit signed, 3 fractional bits |
/// | `ADC/AREA`          | 0   | 0x10    | 10 x 32 bit signed                   |
/// | `ADC/SCALED`        | 0   | 0x40    | 4 x 16 bit signed, 2 fractional bits |
/// | `ADC/FIRMWARE`      | 0   | 0x50    | 1 x 32 bit unsigned, read-only       |
/// | `INFO/NAME`         | 0   | 0x60    | 2 words of text                      |
/// | `MUX/SEQUENCE`      | 1   | 0x00    | 3 x 4 byte channels, 5 rows          |
/// | `DMA/SAMPLES`       | 2   | 0x00    | 16 x 2 byte channels, read-only      |
pub fn test_catalogue() -> RegisterCatalogue {
    let mut catalogue = RegisterCatalogue::new();
    catalogue.insert(RegisterInfo::new("BOARD/WORD_STATUS", 0x00, 0));
    catalogue.insert(
        RegisterInfo::new("BOARD/WORD_USER", 0x04, 0)
            .word_width(12)
            .fractional_bits(3),
    );
    catalogue.insert(RegisterInfo::new("ADC/AREA", 0x10, 0).elements(10));
    catalogue.insert(
        RegisterInfo::new("ADC/SCALED", 0x40, 0)
            .elements(4)
            .word_width(16)
            .fractional_bits(2),
    );
    catalogue.insert(
        RegisterInfo::new("ADC/FIRMWARE", 0x50, 0)
            .unsigned()
            .read_only(),
    );
    catalogue.insert(RegisterInfo::new("INFO/NAME", 0x60, 0).elements(2));
    catalogue.insert(RegisterInfo::new("MUX/SEQUENCE", 0x00, 1).multiplexed(
        vec![
            ChannelInfo::new(4, 1),
            ChannelInfo::new(4, 2),
            ChannelInfo::new(4, 3),
        ],
        60,
    ));
    catalogue.insert(
        RegisterInfo::new("DMA/SAMPLES", 0x00, 2)
            .multiplexed(vec![ChannelInfo::new(2, 0); 16], 128)
            .read_only(),
    );
    catalogue
}

/// Create a closed mock device over [`test_catalogue`]
/// Returns (device, interface) where interface is a clone that shares state with the device
pub fn create_closed_device() -> (Rc<MockDevice>, MockInterface) {
    let catalogue = test_catalogue();
    let interface = MockInterface::for_catalogue(&catalogue);
    let interface_clone = interface.clone();
    (Device::new(interface, catalogue), interface_clone)
}

/// Create an opened mock device over [`test_catalogue`] with a clean operation log
pub fn create_mock_device() -> (Rc<MockDevice>, MockInterface) {
    let (device, interface) = create_closed_device();
    device.open().expect("Failed to open mock device");
    interface.clear_operations();
    (device, interface)
}

/// Type-erased handle on a device
pub fn as_backend(device: &Rc<MockDevice>) -> Rc<dyn Backend<MockError>> {
    device.clone()
}

/// Pack text into little-endian words, four characters each
pub fn text_words(text: &str, words: usize) -> Vec<u32> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(words * 4, 0);
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Assert that two floating point values are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    let diff = (a - b).abs();
    assert!(
        diff < epsilon,
        "Values not equal within epsilon: {a} vs {b} (diff: {diff}, epsilon: {epsilon})"
    );
}
