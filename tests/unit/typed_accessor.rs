//! Unit tests for buffered typed accessors on 1-D registers

use crate::common::{MockError, Operation, as_backend, create_mock_device};
use regaccess::{Backend, Error, get_accessor};

#[test]
fn test_read_converts_every_word() {
    let (device, interface) = create_mock_device();
    interface.set_words(0, 0x40, &[4, 6, 0xFFFE, 0x7FFF]);

    let mut accessor = get_accessor::<f64, MockError>(&as_backend(&device), "ADC/SCALED", 0, 0, false).unwrap();
    accessor.read().unwrap();

    assert_eq!(accessor.channel(0).unwrap(), &[1.0, 1.5, -0.5, 8191.75]);
    assert_eq!(accessor.number_of_samples(), 4);
    assert_eq!(accessor.number_of_channels(), 1);
    assert_eq!(
        interface.operations(),
        vec![Operation::Read {
            bar: 0,
            address: 0x40,
            len: 16
        }]
    );
}

#[test]
fn test_offset_and_length_select_words() {
    let (device, interface) = create_mock_device();
    interface.set_words(0, 0x10, &[0, 10, 20, 30, 40, 50, 60, 70, 80, 90]);

    let mut accessor = get_accessor::<i32, MockError>(&as_backend(&device), "ADC.AREA", 3, 4, false).unwrap();
    accessor.read().unwrap();
    assert_eq!(accessor.channel(0).unwrap(), &[40, 50, 60]);

    // A zero word count covers the rest of the register
    let mut tail = get_accessor::<i32, MockError>(&as_backend(&device), "ADC.AREA", 0, 7, false).unwrap();
    tail.read().unwrap();
    assert_eq!(tail.channel(0).unwrap(), &[70, 80, 90]);
}

#[test]
fn test_write_pushes_buffer() {
    let (device, interface) = create_mock_device();

    let mut accessor = get_accessor::<f64, MockError>(&as_backend(&device), "BOARD/WORD_USER", 0, 0, false).unwrap();
    accessor.channel_mut(0).unwrap()[0] = -1.0;
    accessor.write().unwrap();
    assert_eq!(interface.word(0, 0x04), 0xFF8);

    // Saturates at the 12 bit range
    accessor.channel_mut(0).unwrap()[0] = 1000.0;
    accessor.write().unwrap();
    assert_eq!(interface.word(0, 0x04), 0x7FF);
    accessor.read().unwrap();
    assert_eq!(accessor.channel(0).unwrap()[0], 255.875);
}

#[test]
fn test_no_implicit_synchronisation() {
    let (device, interface) = create_mock_device();
    interface.set_word(0, 0x00, 7);

    let mut accessor = get_accessor::<i32, MockError>(&as_backend(&device), "BOARD/WORD_STATUS", 0, 0, false).unwrap();
    assert_eq!(accessor.channel(0).unwrap(), &[0], "buffer starts at the default value");
    assert!(interface.operations().is_empty(), "creating an accessor transfers nothing");

    accessor.channel_mut(0).unwrap()[0] = 99;
    assert_eq!(interface.word(0, 0x00), 7, "hardware unchanged until write()");
    accessor.read().unwrap();
    assert_eq!(accessor.channel(0).unwrap(), &[7], "read() discards local changes");
}

#[test]
fn test_range_beyond_register_is_rejected_without_transfer() {
    let (device, interface) = create_mock_device();
    let backend = as_backend(&device);

    let result = get_accessor::<i32, MockError>(&backend, "ADC/AREA", 5, 6, false);
    assert!(matches!(result, Err(Error::WrongParameter(_))));

    let result = get_accessor::<i32, MockError>(&backend, "ADC/AREA", 0, 11, false);
    assert!(matches!(result, Err(Error::WrongParameter(_))));

    let result = get_accessor::<i32, MockError>(&backend, "ADC/AREA", 11, 0, false);
    assert!(matches!(result, Err(Error::WrongParameter(_))));

    assert!(interface.operations().is_empty());
}

#[test]
fn test_channel_index_is_checked() {
    let (device, _interface) = create_mock_device();
    let mut accessor = get_accessor::<i32, MockError>(&as_backend(&device), "ADC/AREA", 0, 0, false).unwrap();
    assert!(matches!(accessor.channel(1), Err(Error::WrongParameter(_))));
    assert!(matches!(accessor.channel_mut(1), Err(Error::WrongParameter(_))));
}

#[test]
fn test_raw_mode_transfers_words_verbatim() {
    let (device, interface) = create_mock_device();
    interface.set_word(0, 0x40, 0xDEAD_BEEF);

    let mut raw = get_accessor::<i32, MockError>(&as_backend(&device), "ADC/SCALED", 1, 0, true).unwrap();
    raw.read().unwrap();
    assert_eq!(raw.channel(0).unwrap()[0], 0xDEAD_BEEF_u32 as i32);

    let mut unsigned = get_accessor::<u32, MockError>(&as_backend(&device), "ADC/SCALED", 1, 0, true).unwrap();
    unsigned.read().unwrap();
    assert_eq!(unsigned.channel(0).unwrap()[0], 0xDEAD_BEEF);

    raw.channel_mut(0).unwrap()[0] = -1;
    raw.write().unwrap();
    assert_eq!(interface.word(0, 0x40), 0xFFFF_FFFF, "raw writes ignore the 16 bit width");
}

#[test]
fn test_raw_mode_requires_32_bit_integers() {
    let (device, _interface) = create_mock_device();
    let backend = as_backend(&device);
    assert!(matches!(
        get_accessor::<f64, MockError>(&backend, "ADC/SCALED", 0, 0, true),
        Err(Error::WrongParameter(_))
    ));
    assert!(matches!(
        get_accessor::<i16, MockError>(&backend, "ADC/SCALED", 0, 0, true),
        Err(Error::WrongParameter(_))
    ));
}

#[test]
fn test_read_only_register_refuses_write() {
    let (device, interface) = create_mock_device();
    let mut accessor = get_accessor::<u32, MockError>(&as_backend(&device), "ADC/FIRMWARE", 0, 0, false).unwrap();
    assert!(!accessor.is_writeable());
    assert!(accessor.is_readable());

    let result = accessor.write();
    assert!(matches!(result, Err(Error::NotImplemented(_))));
    assert!(interface.operations().is_empty());
}

#[test]
fn test_text_register() {
    let (device, interface) = create_mock_device();
    interface.set_words(0, 0x60, &crate::common::text_words("BOARD7", 2));

    let mut accessor = get_accessor::<String, MockError>(&as_backend(&device), "INFO/NAME", 0, 0, false).unwrap();
    accessor.read().unwrap();
    assert_eq!(accessor.channel(0).unwrap(), &["BOAR", "D7"]);
}

#[test]
fn test_converter_exposed() {
    let (device, _interface) = create_mock_device();
    let accessor = get_accessor::<f64, MockError>(&as_backend(&device), "ADC/SCALED", 0, 0, false).unwrap();
    let conv = accessor.fixed_point_converter().unwrap();
    assert_eq!(conv.width(), 16);
    assert_eq!(conv.fractional_bits(), 2);
    assert!(conv.is_signed());
    assert_eq!(accessor.name(), "ADC/SCALED");
}

#[test]
fn test_misaligned_raw_transfer_rejected_before_interface() {
    let (device, interface) = create_mock_device();
    let mut bytes = [0u8; 4];
    assert!(matches!(
        device.read_raw(0, 2, &mut bytes),
        Err(Error::WrongParameter(_))
    ));
    assert!(matches!(
        device.write_raw(0, 0, &[1, 2, 3]),
        Err(Error::WrongParameter(_))
    ));
    assert!(interface.operations().is_empty());
}

#[test]
fn test_unknown_register() {
    let (device, _interface) = create_mock_device();
    let result = get_accessor::<i32, MockError>(&as_backend(&device), "ADC/NOPE", 0, 0, false);
    assert!(matches!(result, Err(Error::NotFound(_))));
}
