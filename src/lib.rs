#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

extern crate alloc;

pub mod accessor;
pub mod backend;
pub mod catalogue;
pub mod converter;
pub mod device;
pub mod interface;
pub mod logical;
pub mod user_type;

use alloc::string::String;

// Re-export main types
pub use accessor::multiplexed::{
    MultiplexedSequenceAccessor, MultiplexedSequenceDescriptor, SequenceLayout,
};
pub use accessor::typed::TypedAccessor;
pub use accessor::{AccessorRegistry, AccessorShape, RegisterAccessor, RegisterHandle};
pub use backend::{
    AccessorRequest, AliasChain, Backend, BackendFactory, BackendRegistry, Decorator,
    DecoratorChain, MAX_NESTING_DEPTH, get_accessor,
};
pub use catalogue::{
    CatalogueIssue, ChannelInfo, IssueSeverity, RegisterAccess, RegisterCatalogue, RegisterInfo,
    normalize_path,
};
pub use converter::FixedPointConverter;
pub use device::Device;
pub use interface::{BarAddress, DeviceInterface, DummyError, DummyInterface};
pub use logical::{
    DynamicValue, LogicalNameMap, LogicalRegisterSpec, MapState, TargetKind, ValueSource,
    VirtualRegisterMap,
};
pub use user_type::{AnyAccessor, UserType, UserTypeTag};

/// Size of one register word in bytes. All addresses and transfer sizes on the
/// raw interface are multiples of this.
pub const WORD_SIZE: usize = 4;

/// Register access errors
///
/// `E` is the error type of the raw transfer interface. Operations that never
/// reach a transport (converter construction, descriptor validation) report
/// `Error<()>` and are lifted with [`Error::lift`].
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Raw transfer on the backend failed
    Io(E),
    /// Unknown logical or physical register, or unknown device alias
    NotFound(String),
    /// Operation is not available for this target (unsupported target kind,
    /// write to a read-only block, raw access without raw representation)
    NotImplemented(String),
    /// Misaligned or out-of-range size/offset, or a request that does not
    /// match a cached accessor
    WrongParameter(String),
    /// Invalid converter parameters, block geometry or map description
    Configuration(String),
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Self::Io(error)
    }
}

impl Error<()> {
    /// Lift a transport-free error into the error type of a concrete backend
    #[must_use]
    pub fn lift<E>(self) -> Error<E> {
        match self {
            Self::Io(()) => Error::Configuration(String::from("unexpected transport failure")),
            Self::NotFound(message) => Error::NotFound(message),
            Self::NotImplemented(message) => Error::NotImplemented(message),
            Self::WrongParameter(message) => Error::WrongParameter(message),
            Self::Configuration(message) => Error::Configuration(message),
        }
    }
}

impl<E> Error<E> {
    /// Diagnostic message, if this is not a transport error
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Io(_) => None,
            Self::NotFound(message)
            | Self::NotImplemented(message)
            | Self::WrongParameter(message)
            | Self::Configuration(message) => Some(message),
        }
    }
}
