//! Backend abstraction shared by physical devices and logical maps

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::Error;
use crate::accessor::{AccessorShape, RegisterAccessor};
use crate::catalogue::RegisterInfo;
use crate::user_type::{AnyAccessor, UserType, UserTypeTag};

/// Deepest allowed chain of logical maps referencing each other
pub const MAX_NESTING_DEPTH: usize = 8;

/// Aliases of the backends currently being checked, outermost first
pub type AliasChain = heapless::Vec<String, MAX_NESTING_DEPTH>;

/// Parameters of an accessor request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AccessorRequest {
    /// Element type
    pub tag: UserTypeTag,
    /// Words to transfer, 0 for everything from `word_offset` to the end
    pub number_of_words: usize,
    /// First word inside the register
    pub word_offset: usize,
    /// Transfer words without conversion
    pub raw: bool,
}

impl AccessorRequest {
    /// Create a request
    #[must_use]
    pub const fn new(tag: UserTypeTag, number_of_words: usize, word_offset: usize, raw: bool) -> Self {
        Self {
            tag,
            number_of_words,
            word_offset,
            raw,
        }
    }

    /// Shape part of the request, without the element type
    #[must_use]
    pub const fn shape(&self) -> AccessorShape {
        AccessorShape {
            number_of_words: self.number_of_words,
            word_offset: self.word_offset,
            raw: self.raw,
        }
    }
}

/// A source of register accessors
///
/// Backends are shared through `Rc` and use interior mutability, so every
/// accessor can hold on to the backend that created it.
pub trait Backend<E> {
    /// Open the backend and everything it depends on
    ///
    /// # Errors
    /// Returns the first failure of the transport or of a nested backend.
    fn open(&self) -> Result<(), Error<E>>;

    /// Close the backend and everything it depends on
    ///
    /// # Errors
    /// Returns the first failure of the transport or of a nested backend.
    fn close(&self) -> Result<(), Error<E>>;

    /// Whether the backend is open
    fn is_open(&self) -> bool;

    /// Description of a register
    ///
    /// # Errors
    /// Returns `NotFound` for unknown paths.
    fn register_info(&self, path: &str) -> Result<Rc<RegisterInfo>, Error<E>>;

    /// Read bytes from the raw address space
    ///
    /// # Errors
    /// Returns `WrongParameter` for misaligned transfers, `NotImplemented`
    /// for backends without a raw address space, `Io` on transport failure.
    fn read_raw(&self, bar: u8, address: u32, data: &mut [u8]) -> Result<(), Error<E>>;

    /// Write bytes to the raw address space
    ///
    /// # Errors
    /// Same conditions as [`read_raw`](Self::read_raw).
    fn write_raw(&self, bar: u8, address: u32, data: &[u8]) -> Result<(), Error<E>>;

    /// Build an accessor for a register
    ///
    /// # Errors
    /// Returns `NotFound`, `NotImplemented` or `WrongParameter` depending on
    /// the register and request.
    fn register_accessor(
        self: Rc<Self>,
        path: &str,
        request: AccessorRequest,
    ) -> Result<AnyAccessor<E>, Error<E>>;

    /// Verify that this backend does not reference any alias on `chain`
    ///
    /// # Errors
    /// Returns `Configuration` on a cycle or when nesting is too deep.
    fn check_references(&self, chain: &mut AliasChain) -> Result<(), Error<E>> {
        let _ = chain;
        Ok(())
    }

    /// Human readable description for diagnostics
    fn description(&self) -> String;
}

/// Request a typed accessor from a type-erased backend
///
/// # Errors
/// Forwards backend errors, and returns `WrongParameter` if the backend
/// produced an accessor of a different element type.
pub fn get_accessor<T: UserType, E: 'static>(
    backend: &Rc<dyn Backend<E>>,
    path: &str,
    number_of_words: usize,
    word_offset: usize,
    raw: bool,
) -> Result<Box<dyn RegisterAccessor<T, E>>, Error<E>> {
    let request = AccessorRequest::new(T::TAG, number_of_words, word_offset, raw);
    let any = Rc::clone(backend).register_accessor(path, request)?;
    T::from_any(any).map_err(|other| {
        Error::WrongParameter(format!(
            "backend returned a {} accessor for '{path}', expected {}",
            other.tag().name(),
            T::TAG.name()
        ))
    })
}

/// Application supplied transform applied to every freshly built accessor
pub type Decorator<E> = Box<dyn Fn(&str, AnyAccessor<E>) -> Result<AnyAccessor<E>, Error<E>>>;

/// Ordered list of decorators
pub struct DecoratorChain<E> {
    decorators: RefCell<Vec<Decorator<E>>>,
}

impl<E> Default for DecoratorChain<E> {
    fn default() -> Self {
        Self {
            decorators: RefCell::new(Vec::new()),
        }
    }
}

impl<E> DecoratorChain<E> {
    /// Empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decorator; it runs after all previously added ones
    pub fn push(&self, decorator: Decorator<E>) {
        self.decorators.borrow_mut().push(decorator);
    }

    /// Number of decorators
    #[must_use]
    pub fn len(&self) -> usize {
        self.decorators.borrow().len()
    }

    /// Whether the chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decorators.borrow().is_empty()
    }

    /// Run every decorator in order
    ///
    /// # Errors
    /// Forwards decorator failures. Returns `Configuration` if a decorator
    /// changes the element type.
    pub fn apply(&self, path: &str, mut accessor: AnyAccessor<E>) -> Result<AnyAccessor<E>, Error<E>> {
        let decorators = self.decorators.try_borrow().map_err(|_| {
            Error::Configuration(format!("decorator for '{path}' requested another accessor"))
        })?;
        for decorator in decorators.iter() {
            let tag = accessor.tag();
            accessor = decorator(path, accessor)?;
            if accessor.tag() != tag {
                return Err(Error::Configuration(format!(
                    "decorator for '{path}' changed the element type from {} to {}",
                    tag.name(),
                    accessor.tag().name()
                )));
            }
        }
        Ok(accessor)
    }
}

/// Creates or looks up backends by alias
pub trait BackendFactory<E> {
    /// Backend registered under `alias`
    ///
    /// # Errors
    /// Returns `NotFound` for unknown aliases.
    fn create_backend(&self, alias: &str) -> Result<Rc<dyn Backend<E>>, Error<E>>;
}

/// Factory over a fixed set of shared backend instances
///
/// Every lookup of the same alias yields the same instance.
pub struct BackendRegistry<E> {
    backends: RefCell<BTreeMap<String, Rc<dyn Backend<E>>>>,
}

impl<E> Default for BackendRegistry<E> {
    fn default() -> Self {
        Self {
            backends: RefCell::new(BTreeMap::new()),
        }
    }
}

impl<E> BackendRegistry<E> {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any previous one with the same alias
    pub fn register(&self, alias: &str, backend: Rc<dyn Backend<E>>) {
        self.backends.borrow_mut().insert(String::from(alias), backend);
    }

    /// Registered aliases in sorted order
    #[must_use]
    pub fn aliases(&self) -> Vec<String> {
        self.backends.borrow().keys().cloned().collect()
    }
}

impl<E> BackendFactory<E> for BackendRegistry<E> {
    fn create_backend(&self, alias: &str) -> Result<Rc<dyn Backend<E>>, Error<E>> {
        self.backends
            .borrow()
            .get(alias)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no backend registered for alias '{alias}'")))
    }
}
