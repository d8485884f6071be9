//! Common test utilities and mock implementations

pub mod mock_interface;
pub mod test_utils;

pub use mock_interface::{MockError, MockInterface, Operation};
pub use test_utils::{
    MockDevice, as_backend, assert_float_eq, create_closed_device, create_mock_device,
    test_catalogue, text_words,
};
