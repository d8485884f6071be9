//! Unit tests for de-multiplexing interleaved sequences

use crate::common::{MockError, MockInterface, Operation, as_backend, create_mock_device};
use regaccess::{
    Backend, ChannelInfo, Device, Error, RegisterCatalogue, RegisterInfo,
    get_accessor,
};
use std::rc::Rc;

#[test]
fn test_gather_three_channels() {
    let (device, interface) = create_mock_device();
    let words: Vec<u32> = (0..15).collect();
    interface.set_words(1, 0x00, &words);

    let mut accessor = get_accessor::<f64, MockError>(&as_backend(&device), "MUX/SEQUENCE", 0, 0, false).unwrap();
    assert_eq!(accessor.number_of_channels(), 3);
    assert_eq!(accessor.number_of_samples(), 5);

    accessor.read().unwrap();
    assert_eq!(accessor.channel(0).unwrap(), &[0.0, 1.5, 3.0, 4.5, 6.0]);
    assert_eq!(accessor.channel(1).unwrap(), &[0.25, 1.0, 1.75, 2.5, 3.25]);
    assert_eq!(accessor.channel(2).unwrap(), &[0.25, 0.625, 1.0, 1.375, 1.75]);

    assert_eq!(
        interface.operations(),
        vec![Operation::Read {
            bar: 1,
            address: 0,
            len: 60
        }],
        "the whole block moves in a single transfer"
    );
}

#[test]
fn test_scatter_three_channels() {
    let (device, interface) = create_mock_device();
    let words: Vec<u32> = (0..15).collect();
    interface.set_words(1, 0x00, &words);

    let mut accessor = get_accessor::<f64, MockError>(&as_backend(&device), "MUX/SEQUENCE", 0, 0, false).unwrap();
    accessor.read().unwrap();
    for channel in 0..3 {
        for value in accessor.channel_mut(channel).unwrap() {
            *value += 1.0;
        }
    }
    interface.clear_operations();
    accessor.write().unwrap();

    for i in 0..15u32 {
        let expected = i + (1 << (i % 3 + 1));
        assert_eq!(interface.word(1, 4 * i), expected, "word {i}");
    }
    assert_eq!(
        interface.operations(),
        vec![Operation::Write {
            bar: 1,
            address: 0,
            len: 60
        }]
    );
}

#[test]
fn test_mixed_word_sizes() {
    let mut catalogue = RegisterCatalogue::new();
    catalogue.insert(RegisterInfo::new("MIX/BLOCK", 0x00, 0).multiplexed(
        vec![
            ChannelInfo::new(2, 0),
            ChannelInfo::new(1, 0),
            ChannelInfo::new(1, 1),
        ],
        16,
    ));
    let interface = MockInterface::for_catalogue(&catalogue);
    let memory = interface.clone();
    let device = Device::new(interface, catalogue);
    device.open().unwrap();

    memory.set_words(0, 0x00, &[0xFE05_1234, 0x0203_FFFF]);

    let backend: Rc<dyn Backend<MockError>> = device;
    let mut accessor = get_accessor::<f64, MockError>(&backend, "MIX/BLOCK", 0, 0, false).unwrap();
    assert_eq!(accessor.number_of_samples(), 4);
    accessor.read().unwrap();
    assert_eq!(&accessor.channel(0).unwrap()[..2], &[4660.0, -1.0]);
    assert_eq!(&accessor.channel(1).unwrap()[..2], &[5.0, 3.0]);
    assert_eq!(&accessor.channel(2).unwrap()[..2], &[-1.0, 1.0]);

    accessor.channel_mut(2).unwrap()[0] = 2.5;
    accessor.write().unwrap();
    assert_eq!(memory.word(0, 0x00), 0x0505_1234, "other channels keep their bytes");
}

#[test]
fn test_read_only_block() {
    let (device, interface) = create_mock_device();
    interface.set_word(2, 0x00, 0xFFFF_0001);

    let mut accessor = get_accessor::<i32, MockError>(&as_backend(&device), "DMA/SAMPLES", 0, 0, false).unwrap();
    assert_eq!(accessor.number_of_channels(), 16);
    assert_eq!(accessor.number_of_samples(), 4);
    assert!(!accessor.is_writeable());

    accessor.read().unwrap();
    assert_eq!(accessor.channel(0).unwrap()[0], 1);
    assert_eq!(accessor.channel(1).unwrap()[0], -1);

    interface.clear_operations();
    assert!(matches!(accessor.write(), Err(Error::NotImplemented(_))));
    assert!(interface.operations().is_empty());
}

#[test]
fn test_channel_out_of_range() {
    let (device, _interface) = create_mock_device();
    let mut accessor = get_accessor::<f64, MockError>(&as_backend(&device), "MUX/SEQUENCE", 0, 0, false).unwrap();
    assert!(matches!(accessor.channel(3), Err(Error::WrongParameter(_))));
    assert!(matches!(accessor.channel_mut(3), Err(Error::WrongParameter(_))));
    assert!(accessor.fixed_point_converter().is_none());
}

#[test]
fn test_block_requests_must_cover_whole_block() {
    let (device, interface) = create_mock_device();
    let backend = as_backend(&device);

    assert!(matches!(
        get_accessor::<i32, MockError>(&backend, "MUX/SEQUENCE", 0, 0, true),
        Err(Error::NotImplemented(_))
    ));
    assert!(matches!(
        get_accessor::<i32, MockError>(&backend, "MUX/SEQUENCE", 2, 0, false),
        Err(Error::WrongParameter(_))
    ));
    assert!(matches!(
        get_accessor::<i32, MockError>(&backend, "MUX/SEQUENCE", 0, 1, false),
        Err(Error::WrongParameter(_))
    ));
    assert!(get_accessor::<i32, MockError>(&backend, "MUX/SEQUENCE", 5, 0, false).is_ok());
    assert!(interface.operations().is_empty());
}

#[test]
fn test_failed_read_keeps_buffers() {
    let (device, interface) = create_mock_device();
    let mut accessor = get_accessor::<i32, MockError>(&as_backend(&device), "MUX/SEQUENCE", 0, 0, false).unwrap();
    accessor.channel_mut(1).unwrap()[2] = 42;

    interface.fail_next_read();
    assert!(matches!(accessor.read(), Err(Error::Io(MockError::InjectedRead))));
    assert_eq!(accessor.channel(1).unwrap()[2], 42);
}
