//! Arena of logical register records
//!
//! Entries are created once per parse and never move. Accessors that must
//! observe later changes to an entry (integer variables) hold an
//! [`EntryHandle`] into the shared arena instead of a copy of the value.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{RefCell, RefMut};

use super::value::DynamicValue;
use super::{LogicalRegisterSpec, TargetKind, ValueSource};
use crate::Error;
use crate::backend::Backend;
use crate::user_type::UserType;

/// Stable index of an entry inside a [`LogicalArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EntryHandle(usize);

impl EntryHandle {
    /// Position in the arena
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

struct TargetFields<E> {
    device: Option<DynamicValue<String, E>>,
    register: Option<DynamicValue<String, E>>,
    first_index: Option<DynamicValue<u32, E>>,
    length: Option<DynamicValue<u32, E>>,
    channel: Option<DynamicValue<u32, E>>,
    value: Option<DynamicValue<i32, E>>,
}

impl<E> TargetFields<E> {
    fn release_all(&mut self) {
        let strings = [&mut self.device, &mut self.register];
        for value in strings.into_iter().flatten() {
            value.release();
        }
        let indices = [&mut self.first_index, &mut self.length, &mut self.channel];
        for value in indices.into_iter().flatten() {
            value.release();
        }
        if let Some(value) = &mut self.value {
            value.release();
        }
    }
}

/// One logical register: an immutable target kind plus its parameters
pub struct LogicalRegisterEntry<E> {
    name: String,
    kind: TargetKind,
    fields: RefCell<TargetFields<E>>,
}

fn build_field<T: UserType, E>(
    source: Option<ValueSource<T>>,
    applies: bool,
    name: &str,
    field: &str,
    kind: TargetKind,
    backend: &Weak<dyn Backend<E>>,
) -> Result<Option<DynamicValue<T, E>>, Error<E>> {
    match (source, applies) {
        (Some(source), true) => Ok(Some(DynamicValue::from_source(source, backend.clone()))),
        (None, false) => Ok(None),
        (None, true) => Err(Error::Configuration(format!(
            "logical register '{name}' of kind {} is missing its {field}",
            kind.name()
        ))),
        (Some(_), false) => Err(Error::Configuration(format!(
            "logical register '{name}' of kind {} does not take a {field}",
            kind.name()
        ))),
    }
}

impl<E> LogicalRegisterEntry<E> {
    /// Build an entry from its description
    ///
    /// Register sources inside the description are resolved through
    /// `backend`, normally the map owning the entry.
    ///
    /// # Errors
    /// Returns `Configuration` if a field the kind requires is missing or a
    /// field the kind does not use is present.
    pub fn new(
        name: &str,
        spec: LogicalRegisterSpec,
        backend: &Weak<dyn Backend<E>>,
    ) -> Result<Self, Error<E>> {
        let kind = spec.kind;
        let targets_register = matches!(
            kind,
            TargetKind::Register | TargetKind::Range | TargetKind::Channel
        );
        let is_range = kind == TargetKind::Range;
        let is_integer = matches!(kind, TargetKind::IntConstant | TargetKind::IntVariable);

        let fields = TargetFields {
            device: build_field(spec.device, targets_register, name, "device", kind, backend)?,
            register: build_field(spec.register, targets_register, name, "register", kind, backend)?,
            first_index: build_field(spec.first_index, is_range, name, "first index", kind, backend)?,
            length: build_field(spec.length, is_range, name, "length", kind, backend)?,
            channel: build_field(
                spec.channel,
                kind == TargetKind::Channel,
                name,
                "channel",
                kind,
                backend,
            )?,
            value: build_field(spec.value, is_integer, name, "value", kind, backend)?,
        };

        Ok(Self {
            name: String::from(name),
            kind,
            fields: RefCell::new(fields),
        })
    }

    /// Logical path
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target kind, fixed at creation
    #[must_use]
    pub const fn kind(&self) -> TargetKind {
        self.kind
    }

    fn fields(&self) -> Result<RefMut<'_, TargetFields<E>>, Error<E>> {
        self.fields.try_borrow_mut().map_err(|_| {
            Error::Configuration(format!(
                "logical register '{}' depends on itself through a register reference",
                self.name
            ))
        })
    }

    fn inapplicable(&self, field: &str) -> Error<E> {
        Error::WrongParameter(format!(
            "logical register '{}' of kind {} has no {field}",
            self.name,
            self.kind.name()
        ))
    }

    /// Drop every accessor held by the entry's reference values
    pub fn release(&self) {
        if let Ok(mut fields) = self.fields.try_borrow_mut() {
            fields.release_all();
        }
    }

    /// Run `f` on one field, failing for fields the kind does not have
    fn with_field<T: UserType, R>(
        &self,
        field: &str,
        select: impl FnOnce(&mut TargetFields<E>) -> &mut Option<DynamicValue<T, E>>,
        f: impl FnOnce(&mut DynamicValue<T, E>) -> Result<R, Error<E>>,
    ) -> Result<R, Error<E>> {
        let mut fields = self.fields()?;
        match select(&mut *fields) {
            Some(value) => f(value),
            None => Err(self.inapplicable(field)),
        }
    }

    /// Whether a field holds a literal
    ///
    /// # Errors
    /// Returns `WrongParameter` if the kind has no field of this name.
    pub fn is_literal(&self, field: &str) -> Result<bool, Error<E>> {
        let fields = self.fields()?;
        let literal = match field {
            "device" => fields.device.as_ref().map(DynamicValue::has_actual_value),
            "register" => fields.register.as_ref().map(DynamicValue::has_actual_value),
            "first_index" => fields.first_index.as_ref().map(DynamicValue::has_actual_value),
            "length" => fields.length.as_ref().map(DynamicValue::has_actual_value),
            "channel" => fields.channel.as_ref().map(DynamicValue::has_actual_value),
            "value" => fields.value.as_ref().map(DynamicValue::has_actual_value),
            _ => None,
        };
        literal.ok_or_else(|| self.inapplicable(field))
    }
}

impl<E: 'static> LogicalRegisterEntry<E> {
    /// Current target device alias
    ///
    /// # Errors
    /// Returns `WrongParameter` for integer entries and forwards failures
    /// to read a referenced register.
    pub fn device(&self) -> Result<String, Error<E>> {
        self.with_field("device", |f| &mut f.device, DynamicValue::resolve)
    }

    /// Current target register path
    ///
    /// # Errors
    /// Same conditions as [`device`](Self::device).
    pub fn register(&self) -> Result<String, Error<E>> {
        self.with_field("register", |f| &mut f.register, DynamicValue::resolve)
    }

    /// First element of a range
    ///
    /// # Errors
    /// Returns `WrongParameter` for anything but ranges.
    pub fn first_index(&self) -> Result<u32, Error<E>> {
        self.with_field("first_index", |f| &mut f.first_index, DynamicValue::resolve)
    }

    /// Number of elements of a range
    ///
    /// # Errors
    /// Returns `WrongParameter` for anything but ranges.
    pub fn length(&self) -> Result<u32, Error<E>> {
        self.with_field("length", |f| &mut f.length, DynamicValue::resolve)
    }

    /// Sequence index of a channel
    ///
    /// # Errors
    /// Returns `WrongParameter` for anything but channels.
    pub fn channel(&self) -> Result<u32, Error<E>> {
        self.with_field("channel", |f| &mut f.channel, DynamicValue::resolve)
    }

    /// Current integer value
    ///
    /// # Errors
    /// Returns `WrongParameter` for non-integer entries.
    pub fn value(&self) -> Result<i32, Error<E>> {
        self.with_field("value", |f| &mut f.value, DynamicValue::resolve)
    }

    /// Overwrite the value of an integer variable
    ///
    /// # Errors
    /// Returns `NotImplemented` for constants and `WrongParameter` for
    /// non-integer entries.
    pub fn set_value(&self, value: i32) -> Result<(), Error<E>> {
        if self.kind == TargetKind::IntConstant {
            return Err(Error::NotImplemented(format!(
                "logical register '{}' is a constant",
                self.name
            )));
        }
        self.with_field("value", |f| &mut f.value, |field| {
            field.assign(value);
            Ok(())
        })
    }
}

/// Entries of one parsed map plus the backends they target
pub struct LogicalArena<E> {
    entries: Vec<LogicalRegisterEntry<E>>,
    index: BTreeMap<String, EntryHandle>,
    devices: BTreeMap<String, Rc<dyn Backend<E>>>,
}

impl<E> LogicalArena<E> {
    pub(super) fn new(
        entries: Vec<LogicalRegisterEntry<E>>,
        devices: BTreeMap<String, Rc<dyn Backend<E>>>,
    ) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.name.clone(), EntryHandle(i)))
            .collect();
        Self {
            entries,
            index,
            devices,
        }
    }

    /// Handle of the entry with this normalised path
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<EntryHandle> {
        self.index.get(name).copied()
    }

    /// Entry behind a handle
    ///
    /// # Panics
    /// Panics if the handle belongs to another arena and is out of range.
    #[must_use]
    pub fn entry(&self, handle: EntryHandle) -> &LogicalRegisterEntry<E> {
        &self.entries[handle.0]
    }

    /// All entries in name order
    pub fn entries(&self) -> impl Iterator<Item = &LogicalRegisterEntry<E>> {
        self.entries.iter()
    }

    /// Backends targeted by literal device names
    #[must_use]
    pub fn devices(&self) -> &BTreeMap<String, Rc<dyn Backend<E>>> {
        &self.devices
    }

    /// Drop every accessor held by reference values
    pub fn release(&self) {
        for entry in &self.entries {
            entry.release();
        }
    }
}

/// Shared handle to one arena record
pub struct EntryRef<E> {
    arena: Rc<LogicalArena<E>>,
    handle: EntryHandle,
}

impl<E> EntryRef<E> {
    pub(super) const fn new(arena: Rc<LogicalArena<E>>, handle: EntryHandle) -> Self {
        Self { arena, handle }
    }

    /// Handle inside the arena
    #[must_use]
    pub const fn handle(&self) -> EntryHandle {
        self.handle
    }

    /// The record
    #[must_use]
    pub fn get(&self) -> &LogicalRegisterEntry<E> {
        self.arena.entry(self.handle)
    }
}

impl<E> Clone for EntryRef<E> {
    fn clone(&self) -> Self {
        Self {
            arena: Rc::clone(&self.arena),
            handle: self.handle,
        }
    }
}
