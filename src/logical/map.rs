//! Backend resolving logical register names onto other backends

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, OnceCell, RefCell};

use super::accessors::{ChannelAccessor, VariableAccessor};
use super::entry::{EntryRef, LogicalArena, LogicalRegisterEntry};
use super::{LogicalNameMap, MapState, TargetKind};
use crate::backend::{AccessorRequest, AliasChain, Backend, BackendFactory, DecoratorChain, MAX_NESTING_DEPTH};
use crate::catalogue::{RegisterAccess, RegisterInfo, normalize_path};
use crate::user_type::{AnyAccessor, UserType};
use crate::{Error, WORD_SIZE, dispatch_user_type};

/// Backend whose registers are defined by a [`LogicalNameMap`]
///
/// The description is processed on the first call to
/// [`parse`](Self::parse), [`open`](Backend::open) or any register lookup.
/// Parsing builds one [`LogicalRegisterEntry`] per logical name, creates
/// (without opening) one backend per literal device alias through the
/// factory, and rejects maps that reference themselves through any chain
/// of nested maps.
pub struct VirtualRegisterMap<E: 'static> {
    alias: String,
    description: LogicalNameMap,
    factory: Rc<dyn BackendFactory<E>>,
    arena: OnceCell<Rc<LogicalArena<E>>>,
    late_devices: RefCell<BTreeMap<String, Rc<dyn Backend<E>>>>,
    state: Cell<MapState>,
    decorators: DecoratorChain<E>,
    self_ref: Weak<Self>,
}

impl<E: 'static> VirtualRegisterMap<E> {
    /// Create an unparsed map
    ///
    /// # Arguments
    /// * `alias` - Name other maps use to reference this one
    /// * `description` - Logical register definitions
    /// * `factory` - Source of the backends the definitions target
    pub fn new(
        alias: &str,
        description: LogicalNameMap,
        factory: Rc<dyn BackendFactory<E>>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            alias: String::from(alias),
            description,
            factory,
            arena: OnceCell::new(),
            late_devices: RefCell::new(BTreeMap::new()),
            state: Cell::new(MapState::Unparsed),
            decorators: DecoratorChain::new(),
            self_ref: self_ref.clone(),
        })
    }

    /// Alias of this map
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Lifecycle state
    #[must_use]
    pub fn state(&self) -> MapState {
        self.state.get()
    }

    /// Transforms applied to every accessor this map returns
    #[must_use]
    pub fn decorators(&self) -> &DecoratorChain<E> {
        &self.decorators
    }

    /// Names of all logical registers, sorted
    #[must_use]
    pub fn logical_names(&self) -> Vec<String> {
        self.description.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Process the description. Later calls do nothing.
    ///
    /// # Errors
    /// Returns `Configuration` for incomplete entries, a reference cycle or
    /// nesting deeper than [`MAX_NESTING_DEPTH`], and `NotFound` for device
    /// aliases the factory does not know.
    pub fn parse(&self) -> Result<(), Error<E>> {
        if self.state.get() != MapState::Unparsed {
            return Ok(());
        }

        let mut chain = AliasChain::new();
        self.check_references(&mut chain)?;

        self.state.set(MapState::Parsed);
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Parsed logical map {=str} with {=usize} registers",
            self.alias.as_str(),
            self.description.len()
        );
        Ok(())
    }

    /// Build the arena and the nested backends, without checking references
    fn load(&self) -> Result<Rc<LogicalArena<E>>, Error<E>> {
        if let Some(arena) = self.arena.get() {
            return Ok(Rc::clone(arena));
        }

        let backend: Weak<dyn Backend<E>> = self.self_ref.clone();
        let entries = self
            .description
            .iter()
            .map(|(name, spec)| LogicalRegisterEntry::new(name, spec.clone(), &backend))
            .collect::<Result<Vec<_>, _>>()?;

        let mut devices = BTreeMap::new();
        for spec in self.description.iter().map(|(_, spec)| spec) {
            if let Some(super::ValueSource::Literal(alias)) = &spec.device {
                if !devices.contains_key(alias) {
                    devices.insert(alias.clone(), self.factory.create_backend(alias)?);
                }
            }
        }

        let arena = Rc::new(LogicalArena::new(entries, devices));
        Ok(Rc::clone(self.arena.get_or_init(|| arena)))
    }

    fn parsed(&self) -> Result<Rc<LogicalArena<E>>, Error<E>> {
        self.parse()?;
        self.load()
    }

    /// Aliases of the backends the map targets by literal name
    ///
    /// # Errors
    /// Forwards parse failures.
    pub fn target_devices(&self) -> Result<Vec<String>, Error<E>> {
        Ok(self.parsed()?.devices().keys().cloned().collect())
    }

    /// Shared record of a logical register
    ///
    /// # Errors
    /// Returns `NotFound` for unknown names and forwards parse failures.
    pub fn entry(&self, path: &str) -> Result<EntryRef<E>, Error<E>> {
        let arena = self.parsed()?;
        let name = normalize_path(path);
        let handle = arena
            .lookup(&name)
            .ok_or_else(|| self.unknown_register(&name))?;
        Ok(EntryRef::new(arena, handle))
    }

    fn unknown_register(&self, name: &str) -> Error<E> {
        Error::NotFound(format!(
            "logical map '{}' has no register '{name}'",
            self.alias
        ))
    }

    /// Backend for a resolved device alias
    fn device(&self, arena: &LogicalArena<E>, logical: &str, alias: &str) -> Result<Rc<dyn Backend<E>>, Error<E>> {
        if let Some(device) = arena.devices().get(alias) {
            return Ok(Rc::clone(device));
        }
        if let Some(device) = self.late_devices.borrow().get(alias) {
            return Ok(Rc::clone(device));
        }

        // Alias only known at access time, read from a register
        let device = self
            .factory
            .create_backend(alias)
            .map_err(|error| with_logical_path(logical, error))?;
        let mut chain = AliasChain::new();
        chain.push(self.alias.clone()).map_err(|_| {
            Error::Configuration(format!("alias chain of '{}' is full", self.alias))
        })?;
        device.check_references(&mut chain).map_err(|error| match error {
            Error::Configuration(message) => {
                Error::Configuration(format!("{logical}: device '{alias}' is rejected, {message}"))
            }
            other => other,
        })?;
        if self.state.get() == MapState::Opened {
            device.open()?;
        }
        self.late_devices
            .borrow_mut()
            .insert(String::from(alias), Rc::clone(&device));
        Ok(device)
    }

    fn target(
        &self,
        arena: &LogicalArena<E>,
        entry: &LogicalRegisterEntry<E>,
    ) -> Result<(Rc<dyn Backend<E>>, String), Error<E>> {
        let alias = entry
            .device()
            .map_err(|error| with_logical_path(entry.name(), error))?;
        let device = self.device(arena, entry.name(), &alias)?;
        let register = entry
            .register()
            .map_err(|error| with_logical_path(entry.name(), error))?;
        Ok((device, register))
    }

    fn range(entry: &LogicalRegisterEntry<E>, request: &AccessorRequest) -> Result<(usize, usize), Error<E>> {
        let first = entry.first_index()? as usize;
        let length = entry.length()? as usize;
        let words = if request.number_of_words == 0 {
            length.saturating_sub(request.word_offset)
        } else {
            request.number_of_words
        };
        let out_of_range = || {
            Error::WrongParameter(format!(
                "{words} words at offset {} exceed the {length} elements of '{}'",
                request.word_offset,
                entry.name()
            ))
        };
        if request
            .word_offset
            .checked_add(words)
            .is_none_or(|end| end > length)
        {
            return Err(out_of_range());
        }
        let offset = first.checked_add(request.word_offset).ok_or_else(out_of_range)?;
        Ok((offset, words))
    }

    fn build_accessor(
        &self,
        arena: &Rc<LogicalArena<E>>,
        name: &str,
        request: AccessorRequest,
    ) -> Result<AnyAccessor<E>, Error<E>> {
        let handle = arena
            .lookup(name)
            .ok_or_else(|| self.unknown_register(name))?;
        let entry = arena.entry(handle);

        match entry.kind() {
            TargetKind::Register => {
                let (device, register) = self.target(arena, entry)?;
                device
                    .register_accessor(&register, request)
                    .map_err(|error| with_logical_path(name, error))
            }
            TargetKind::Range => {
                let (device, register) = self.target(arena, entry)?;
                let (offset, words) = Self::range(entry, &request)?;
                if words == 0 {
                    return Err(Error::WrongParameter(format!(
                        "range '{name}' has no elements left at offset {}",
                        request.word_offset
                    )));
                }
                let physical = AccessorRequest {
                    number_of_words: words,
                    word_offset: offset,
                    ..request
                };
                device
                    .register_accessor(&register, physical)
                    .map_err(|error| with_logical_path(name, error))
            }
            TargetKind::Channel => {
                if request.raw {
                    return Err(Error::NotImplemented(format!(
                        "logical channel '{name}' has no raw representation"
                    )));
                }
                let (device, register) = self.target(arena, entry)?;
                let channel = entry.channel()? as usize;
                let block_request = AccessorRequest {
                    number_of_words: 0,
                    word_offset: 0,
                    ..request
                };
                let block = device
                    .register_accessor(&register, block_request)
                    .map_err(|error| with_logical_path(name, error))?;
                if request.word_offset != 0
                    || (request.number_of_words != 0
                        && request.number_of_words != block_samples(&block))
                {
                    return Err(Error::WrongParameter(format!(
                        "logical channel '{name}' can only be accessed as a whole"
                    )));
                }
                dispatch_user_type!(request.tag, T => {
                    let block = T::from_any(block).map_err(|_| {
                        Error::WrongParameter(format!("target of '{name}' returned another element type"))
                    })?;
                    Ok(T::into_any(Box::new(ChannelAccessor::new(name, block, channel)?)))
                })
            }
            TargetKind::IntConstant | TargetKind::IntVariable => {
                if request.raw {
                    return Err(Error::NotImplemented(format!(
                        "logical register '{name}' is an integer and has no raw representation"
                    )));
                }
                if request.word_offset != 0 || request.number_of_words > 1 {
                    return Err(Error::WrongParameter(format!(
                        "logical register '{name}' holds a single element"
                    )));
                }
                let arena = Rc::clone(arena);
                Ok(dispatch_user_type!(request.tag, T => {
                    T::into_any(Box::new(VariableAccessor::<T, E>::new(arena, handle)))
                }))
            }
            TargetKind::Invalid => Err(Error::NotImplemented(format!(
                "logical register '{name}' has a target kind this map cannot resolve"
            ))),
        }
    }
}

fn with_logical_path<E>(logical: &str, error: Error<E>) -> Error<E> {
    match error {
        Error::NotFound(message) => Error::NotFound(format!("{logical}: {message}")),
        other => other,
    }
}

fn block_samples<E>(block: &AnyAccessor<E>) -> usize {
    match block {
        AnyAccessor::I8(a) => a.number_of_samples(),
        AnyAccessor::U8(a) => a.number_of_samples(),
        AnyAccessor::I16(a) => a.number_of_samples(),
        AnyAccessor::U16(a) => a.number_of_samples(),
        AnyAccessor::I32(a) => a.number_of_samples(),
        AnyAccessor::U32(a) => a.number_of_samples(),
        AnyAccessor::F32(a) => a.number_of_samples(),
        AnyAccessor::F64(a) => a.number_of_samples(),
        AnyAccessor::String(a) => a.number_of_samples(),
    }
}

impl<E: 'static> Backend<E> for VirtualRegisterMap<E> {
    fn open(&self) -> Result<(), Error<E>> {
        let arena = self.parsed()?;
        for device in arena.devices().values() {
            device.open()?;
        }
        for device in self.late_devices.borrow().values() {
            device.open()?;
        }
        self.state.set(MapState::Opened);
        #[cfg(feature = "defmt")]
        defmt::debug!("Opened logical map {=str}", self.alias.as_str());
        Ok(())
    }

    fn close(&self) -> Result<(), Error<E>> {
        let Some(arena) = self.arena.get() else {
            return Ok(());
        };
        for device in arena.devices().values() {
            device.close()?;
        }
        for device in self.late_devices.borrow().values() {
            device.close()?;
        }
        if self.state.get() != MapState::Unparsed {
            self.state.set(MapState::Closed);
        }
        #[cfg(feature = "defmt")]
        defmt::debug!("Closed logical map {=str}", self.alias.as_str());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.get() == MapState::Opened
    }

    fn register_info(&self, path: &str) -> Result<Rc<RegisterInfo>, Error<E>> {
        let entry = self.entry(path)?;
        let entry = entry.get();
        let name = entry.name();
        let arena = self.parsed()?;

        let info = match entry.kind() {
            TargetKind::Register => {
                let (device, register) = self.target(&arena, entry)?;
                let target = device
                    .register_info(&register)
                    .map_err(|error| with_logical_path(name, error))?;
                RegisterInfo {
                    name: String::from(name),
                    ..(*target).clone()
                }
            }
            TargetKind::Range => {
                let (device, register) = self.target(&arena, entry)?;
                let target = device
                    .register_info(&register)
                    .map_err(|error| with_logical_path(name, error))?;
                let first = entry.first_index()? as usize;
                let length = entry.length()? as usize;
                if first
                    .checked_add(length)
                    .is_none_or(|end| end > target.number_of_elements)
                {
                    return Err(Error::WrongParameter(format!(
                        "range '{name}' exceeds the {} elements of its target",
                        target.number_of_elements
                    )));
                }
                let address = first
                    .checked_mul(WORD_SIZE)
                    .and_then(|offset| u32::try_from(offset).ok())
                    .and_then(|offset| target.address.checked_add(offset))
                    .ok_or_else(|| Error::WrongParameter(format!("range '{name}' overflows its address")))?;
                RegisterInfo {
                    name: String::from(name),
                    address,
                    number_of_elements: length,
                    size_in_bytes: length * WORD_SIZE,
                    ..(*target).clone()
                }
            }
            TargetKind::Channel => {
                let (device, register) = self.target(&arena, entry)?;
                let target = device
                    .register_info(&register)
                    .map_err(|error| with_logical_path(name, error))?;
                let index = entry.channel()? as usize;
                let channel = target.channels.get(index).ok_or_else(|| {
                    Error::WrongParameter(format!(
                        "logical channel '{name}' selects channel {index} of {}",
                        target.number_of_channels()
                    ))
                })?;
                RegisterInfo {
                    name: String::from(name),
                    word_width: channel.word_width,
                    fractional_bits: channel.fractional_bits,
                    signed: channel.signed,
                    access: RegisterAccess::ReadOnly,
                    channels: Vec::new(),
                    ..(*target).clone()
                }
            }
            TargetKind::IntConstant => RegisterInfo::new(name, 0, 0).read_only(),
            TargetKind::IntVariable => RegisterInfo::new(name, 0, 0),
            TargetKind::Invalid => {
                return Err(Error::NotImplemented(format!(
                    "logical register '{name}' has a target kind this map cannot resolve"
                )));
            }
        };
        Ok(Rc::new(info))
    }

    fn read_raw(&self, _bar: u8, _address: u32, _data: &mut [u8]) -> Result<(), Error<E>> {
        Err(Error::NotImplemented(format!(
            "logical map '{}' has no raw address space",
            self.alias
        )))
    }

    fn write_raw(&self, _bar: u8, _address: u32, _data: &[u8]) -> Result<(), Error<E>> {
        Err(Error::NotImplemented(format!(
            "logical map '{}' has no raw address space",
            self.alias
        )))
    }

    fn register_accessor(
        self: Rc<Self>,
        path: &str,
        request: AccessorRequest,
    ) -> Result<AnyAccessor<E>, Error<E>> {
        let arena = self.parsed()?;
        let name = normalize_path(path);
        let accessor = self.build_accessor(&arena, &name, request)?;
        self.decorators.apply(&name, accessor)
    }

    fn check_references(&self, chain: &mut AliasChain) -> Result<(), Error<E>> {
        if chain.contains(&self.alias) {
            return Err(Error::Configuration(format!(
                "logical map '{}' references itself through {}",
                self.alias,
                chain.join(" -> ")
            )));
        }
        chain.push(self.alias.clone()).map_err(|_| {
            Error::Configuration(format!(
                "logical maps nest deeper than {MAX_NESTING_DEPTH} levels at '{}'",
                self.alias
            ))
        })?;

        let arena = self.load()?;
        for device in arena.devices().values() {
            device.check_references(chain)?;
        }

        chain.pop();
        Ok(())
    }

    fn description(&self) -> String {
        format!(
            "logical map '{}' with {} registers",
            self.alias,
            self.description.len()
        )
    }
}

impl<E: 'static> Drop for VirtualRegisterMap<E> {
    fn drop(&mut self) {
        // Reference values may hold accessors into this map's own arena
        if let Some(arena) = self.arena.get() {
            arena.release();
        }
    }
}
