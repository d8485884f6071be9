//! Integration tests for basic workflow scenarios

use crate::common::{
    MockError, Operation, as_backend, assert_float_eq, create_closed_device, create_mock_device,
    test_catalogue, text_words,
};
use regaccess::{
    Backend, BackendFactory, BackendRegistry, IssueSeverity, LogicalNameMap, LogicalRegisterSpec,
    RegisterHandle, RegisterInfo, ValueSource, VirtualRegisterMap, get_accessor,
};
use std::rc::Rc;

#[test]
fn test_complete_device_workflow() {
    let (device, interface) = create_closed_device();

    // The catalogue is consistent
    assert!(device.catalogue().check().is_empty());

    // Open the device
    device.open().unwrap();
    assert!(device.is_open());
    assert_eq!(interface.open_count(), 1);

    // Write and read back a fixed-point value
    let mut user = RegisterHandle::new(as_backend(&device), "BOARD.WORD_USER").unwrap();
    user.write_value(-3.375_f64).unwrap();
    assert_float_eq(user.read_value::<f64>().unwrap(), -3.375, 1e-9);
    assert_eq!(interface.word(0, 0x04), 0xFE5);

    // Block access through a buffered accessor
    let mut area = get_accessor::<i32, MockError>(&as_backend(&device), "ADC/AREA", 0, 0, false).unwrap();
    for (i, value) in area.channel_mut(0).unwrap().iter_mut().enumerate() {
        *value = i as i32 * 100;
    }
    area.write().unwrap();

    let mut handle = RegisterHandle::new(as_backend(&device), "ADC/AREA").unwrap();
    let mut middle = [0_i32; 3];
    handle.read(&mut middle, 4).unwrap();
    assert_eq!(middle, [400, 500, 600]);

    // Close the device
    device.close().unwrap();
    assert!(!device.is_open());
    assert!(area.read().is_err(), "closed devices refuse transfers");
}

#[test]
fn test_multiplexed_acquisition() {
    let (device, interface) = create_mock_device();

    // 16 channels of 16 bit samples, 4 rows
    let words: Vec<u32> = (0..32u32).map(|i| ((2 * i + 1) << 16) | (2 * i)).collect();
    interface.set_words(2, 0x00, &words);

    let mut samples = get_accessor::<i16, MockError>(&as_backend(&device), "DMA/SAMPLES", 0, 0, false).unwrap();
    samples.read().unwrap();

    for channel in 0..16 {
        let expected: Vec<i16> = (0..4).map(|row| (row * 16 + channel) as i16).collect();
        assert_eq!(samples.channel(channel).unwrap(), expected.as_slice(), "channel {channel}");
    }
    assert_eq!(interface.operations().len(), 1);
}

#[test]
fn test_logical_view_over_two_boards() {
    let (control, control_memory) = create_mock_device();
    let (board_a, memory_a) = create_mock_device();
    let (board_b, memory_b) = create_mock_device();

    let registry = Rc::new(BackendRegistry::<MockError>::new());
    registry.register("CONTROL", control);
    registry.register("BOARD_A", board_a);
    registry.register("BOARD_B", board_b);
    assert_eq!(registry.aliases(), ["BOARD_A", "BOARD_B", "CONTROL"]);

    let mut description = LogicalNameMap::new();
    description.insert("ACTIVE_BOARD", LogicalRegisterSpec::register("CONTROL", "INFO/NAME"));
    description.insert("CHANNEL_INDEX", LogicalRegisterSpec::int_variable(0));
    description.insert(
        "TEMPERATURE",
        LogicalRegisterSpec::channel_with(
            ValueSource::Register(String::from("ACTIVE_BOARD")),
            "MUX/SEQUENCE".into(),
            ValueSource::Register(String::from("CHANNEL_INDEX")),
        ),
    );
    description.insert(
        "HEAD",
        LogicalRegisterSpec::range_with(
            ValueSource::Register(String::from("ACTIVE_BOARD")),
            "ADC/AREA".into(),
            0_u32.into(),
            2_u32.into(),
        ),
    );

    let factory: Rc<dyn BackendFactory<MockError>> = registry;
    let map = VirtualRegisterMap::new("VIEW", description, factory);
    map.open().unwrap();
    let view: Rc<dyn Backend<MockError>> = map.clone();

    let rows: Vec<u32> = (0..15).collect();
    memory_a.set_words(1, 0x00, &rows);
    memory_a.set_words(0, 0x10, &[7, 8]);
    memory_b.set_words(1, 0x00, &rows.iter().map(|w| w * 10).collect::<Vec<_>>());
    memory_b.set_words(0, 0x10, &[70, 80]);

    // Board A, channel 0
    control_memory.set_words(0, 0x60, &text_words("BOARD_A", 2));
    let mut temperature = get_accessor::<f64, MockError>(&view, "TEMPERATURE", 0, 0, false).unwrap();
    temperature.read().unwrap();
    assert_eq!(temperature.channel(0).unwrap(), &[0.0, 1.5, 3.0, 4.5, 6.0]);

    // Board B, channel 2
    control_memory.set_words(0, 0x60, &text_words("BOARD_B", 2));
    let mut index = RegisterHandle::new(Rc::clone(&view), "CHANNEL_INDEX").unwrap();
    index.write_value(2_u32).unwrap();
    let mut temperature = get_accessor::<f64, MockError>(&view, "TEMPERATURE", 0, 0, false).unwrap();
    temperature.read().unwrap();
    assert_eq!(temperature.channel(0).unwrap(), &[2.5, 6.25, 10.0, 13.75, 17.5]);

    let mut head = RegisterHandle::new(Rc::clone(&view), "HEAD").unwrap();
    let mut values = [0_i32; 2];
    head.read(&mut values, 0).unwrap();
    assert_eq!(values, [70, 80]);

    // Only the control board is known before any access
    assert_eq!(map.target_devices().unwrap(), ["CONTROL"]);
}

#[test]
fn test_handle_on_logical_register() {
    let (device, interface) = create_mock_device();
    let registry = Rc::new(BackendRegistry::<MockError>::new());
    registry.register("DEV", device);

    let mut description = LogicalNameMap::new();
    description.insert("USER", LogicalRegisterSpec::register("DEV", "BOARD/WORD_USER"));
    description.insert("PAIR", LogicalRegisterSpec::range("DEV", "ADC/SCALED", 1, 2));
    let map = VirtualRegisterMap::new("LOGICAL", description, registry as Rc<dyn BackendFactory<MockError>>);
    map.open().unwrap();
    let view: Rc<dyn Backend<MockError>> = map;

    let mut user = RegisterHandle::new(Rc::clone(&view), "USER").unwrap();
    user.write_value(1.5_f64).unwrap();
    assert_eq!(interface.word(0, 0x04), 12);
    assert_eq!(user.fixed_point_converter().unwrap().fractional_bits(), 3);

    let mut pair = RegisterHandle::new(view, "PAIR").unwrap();
    assert_eq!(pair.number_of_elements(), 2);
    pair.write(&[0.25_f64, -0.25], 0).unwrap();
    assert_eq!(interface.word(0, 0x44), 1);
    assert_eq!(interface.word(0, 0x48), 0xFFFF);
    assert!(matches!(
        pair.write(&[0.0_f64; 3], 0),
        Err(regaccess::Error::WrongParameter(_))
    ));
}

#[test]
fn test_error_recovery() {
    let (device, interface) = create_mock_device();
    let mut handle = RegisterHandle::new(as_backend(&device), "BOARD/WORD_STATUS").unwrap();

    // Inject a read failure
    interface.fail_next_read();
    assert!(handle.read_value::<i32>().is_err());

    // But subsequent reads should work (error was only for one operation)
    interface.set_word(0, 0x00, 44);
    assert_eq!(handle.read_value::<i32>().unwrap(), 44);

    let reads = interface
        .operations()
        .iter()
        .filter(|op| matches!(op, Operation::Read { .. }))
        .count();
    assert_eq!(reads, 2);
}

#[test]
fn test_catalogue_overlap_detection() {
    let mut catalogue = test_catalogue();
    catalogue.insert(RegisterInfo::new("ADC/ALIAS", 0x14, 0));
    catalogue.insert(RegisterInfo::new("ADC/AREA", 0x100, 0));

    let issues = catalogue.check();
    assert!(issues.iter().any(|issue| issue.severity == IssueSeverity::Warning
        && issue.first == "ADC/AREA"
        && issue.second == "ADC/ALIAS"));
    assert!(issues
        .iter()
        .any(|issue| issue.severity == IssueSeverity::Error && issue.first == "ADC/AREA"));
    assert_eq!(catalogue.registers_in_module("ADC").len(), 5);
}
