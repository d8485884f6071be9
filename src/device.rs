//! Physical backend over a raw transfer interface
//!
//! [`Device`] pairs a [`DeviceInterface`] with the catalogue describing its
//! registers. It checks word alignment before any transfer reaches the
//! interface and builds typed or multiplexed accessors depending on the
//! dimensionality of the requested register.

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use core::cell::{Cell, RefCell};

use crate::accessor::multiplexed::{MultiplexedSequenceAccessor, MultiplexedSequenceDescriptor};
use crate::accessor::typed::TypedAccessor;
use crate::backend::{AccessorRequest, Backend, DecoratorChain};
use crate::catalogue::{RegisterCatalogue, RegisterInfo};
use crate::interface::{BarAddress, DeviceInterface};
use crate::user_type::{AnyAccessor, UserType};
use crate::{Error, WORD_SIZE, dispatch_user_type};

/// Backend for a board reached through a raw transfer interface
pub struct Device<I: DeviceInterface> {
    interface: RefCell<I>,
    catalogue: RegisterCatalogue,
    opened: Cell<bool>,
    decorators: DecoratorChain<I::Error>,
}

impl<I: DeviceInterface> Device<I> {
    /// Create a closed device
    pub fn new(interface: I, catalogue: RegisterCatalogue) -> Rc<Self> {
        Rc::new(Self {
            interface: RefCell::new(interface),
            catalogue,
            opened: Cell::new(false),
            decorators: DecoratorChain::new(),
        })
    }

    /// Registers of this device
    #[must_use]
    pub fn catalogue(&self) -> &RegisterCatalogue {
        &self.catalogue
    }

    /// Transforms applied to every accessor this device builds
    #[must_use]
    pub fn decorators(&self) -> &DecoratorChain<I::Error> {
        &self.decorators
    }

    fn check_alignment(address: u32, len: usize) -> Result<(), Error<I::Error>> {
        if address as usize % WORD_SIZE != 0 {
            return Err(Error::WrongParameter(format!(
                "address {address:#x} is not aligned to {WORD_SIZE} bytes"
            )));
        }
        if len % WORD_SIZE != 0 {
            return Err(Error::WrongParameter(format!(
                "transfer of {len} bytes is not a multiple of {WORD_SIZE}"
            )));
        }
        Ok(())
    }

    fn size_bits(len: usize) -> u32 {
        u32::try_from(len * 8).unwrap_or(u32::MAX)
    }
}

impl<I> Device<I>
where
    I: DeviceInterface + 'static,
    I::Error: 'static,
{
    fn build_accessor(
        self: Rc<Self>,
        info: Rc<RegisterInfo>,
        request: AccessorRequest,
    ) -> Result<AnyAccessor<I::Error>, Error<I::Error>> {
        let backend: Rc<dyn Backend<I::Error>> = self;

        if info.number_of_dimensions() == 1 {
            return dispatch_user_type!(request.tag, T => {
                let accessor = TypedAccessor::<T, _>::new(
                    backend,
                    info,
                    request.number_of_words,
                    request.word_offset,
                    request.raw,
                )?;
                Ok(T::into_any(Box::new(accessor)))
            });
        }

        if request.raw {
            return Err(Error::NotImplemented(format!(
                "multiplexed block '{}' has no raw representation",
                info.name
            )));
        }
        let whole_block = request.word_offset == 0
            && (request.number_of_words == 0 || request.number_of_words == info.number_of_elements);
        if !whole_block {
            return Err(Error::WrongParameter(format!(
                "multiplexed block '{}' can only be accessed as a whole",
                info.name
            )));
        }

        let descriptor = MultiplexedSequenceDescriptor::from_register_info(&info).map_err(Error::lift)?;
        dispatch_user_type!(request.tag, T => {
            let accessor = MultiplexedSequenceAccessor::<T, _>::new(backend, &info.name, descriptor);
            Ok(T::into_any(Box::new(accessor)))
        })
    }
}

impl<I> Backend<I::Error> for Device<I>
where
    I: DeviceInterface + 'static,
    I::Error: 'static,
{
    fn open(&self) -> Result<(), Error<I::Error>> {
        self.interface.borrow_mut().open()?;
        self.opened.set(true);
        #[cfg(feature = "defmt")]
        defmt::debug!("Device opened with {=usize} registers", self.catalogue.len());
        Ok(())
    }

    fn close(&self) -> Result<(), Error<I::Error>> {
        self.interface.borrow_mut().close()?;
        self.opened.set(false);
        #[cfg(feature = "defmt")]
        defmt::debug!("Device closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.opened.get()
    }

    fn register_info(&self, path: &str) -> Result<Rc<RegisterInfo>, Error<I::Error>> {
        self.catalogue.lookup(path).map_err(Error::lift)
    }

    fn read_raw(&self, bar: u8, address: u32, data: &mut [u8]) -> Result<(), Error<I::Error>> {
        Self::check_alignment(address, data.len())?;
        let size_bits = Self::size_bits(data.len());
        self.interface
            .borrow_mut()
            .read_register(BarAddress::new(bar, address), size_bits, data)?;
        Ok(())
    }

    fn write_raw(&self, bar: u8, address: u32, data: &[u8]) -> Result<(), Error<I::Error>> {
        Self::check_alignment(address, data.len())?;
        let size_bits = Self::size_bits(data.len());
        self.interface
            .borrow_mut()
            .write_register(BarAddress::new(bar, address), size_bits, data)?;
        Ok(())
    }

    fn register_accessor(
        self: Rc<Self>,
        path: &str,
        request: AccessorRequest,
    ) -> Result<AnyAccessor<I::Error>, Error<I::Error>> {
        let info = self.register_info(path)?;
        let name = info.name.clone();
        let decorated = Rc::clone(&self);
        let accessor = self.build_accessor(info, request)?;
        decorated.decorators.apply(&name, accessor)
    }

    fn description(&self) -> String {
        format!("device with {} registers", self.catalogue.len())
    }
}
