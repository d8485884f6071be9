//! Resolution parameters that are either literal or read from a register

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Weak;
use alloc::string::String;

use super::ValueSource;
use crate::Error;
use crate::accessor::RegisterAccessor;
use crate::backend::{Backend, get_accessor};
use crate::user_type::UserType;

/// A scalar that is a literal or a reference to a register
///
/// Reference values are re-read on every [`resolve`](Self::resolve). The
/// accessor for the referenced register is built on first use, not when the
/// value is created, because the register may not exist until the owning
/// map is fully parsed.
pub struct DynamicValue<T: UserType, E> {
    source: ValueSource<T>,
    backend: Option<Weak<dyn Backend<E>>>,
    accessor: Option<Box<dyn RegisterAccessor<T, E>>>,
}

impl<T: UserType, E> DynamicValue<T, E> {
    /// Fixed value
    pub const fn literal(value: T) -> Self {
        Self {
            source: ValueSource::Literal(value),
            backend: None,
            accessor: None,
        }
    }

    /// Value read from `register` on `backend`
    pub fn reference(register: &str, backend: Weak<dyn Backend<E>>) -> Self {
        Self {
            source: ValueSource::Register(String::from(register)),
            backend: Some(backend),
            accessor: None,
        }
    }

    /// Value from a description, bound to the backend register sources refer to
    pub fn from_source(source: ValueSource<T>, backend: Weak<dyn Backend<E>>) -> Self {
        match source {
            ValueSource::Literal(value) => Self::literal(value),
            ValueSource::Register(register) => Self::reference(&register, backend),
        }
    }

    /// Whether the value is a literal
    pub const fn has_actual_value(&self) -> bool {
        self.source.is_literal()
    }

    /// Referenced register, if this is a reference
    pub fn register_name(&self) -> Option<&str> {
        match &self.source {
            ValueSource::Literal(_) => None,
            ValueSource::Register(register) => Some(register),
        }
    }

    /// Whether the accessor of a reference has been built
    pub const fn has_accessor(&self) -> bool {
        self.accessor.is_some()
    }

    /// Replace the value with a literal, dropping any reference
    pub fn assign(&mut self, value: T) {
        self.source = ValueSource::Literal(value);
        self.backend = None;
        self.accessor = None;
    }

    /// Copy the source of another value
    ///
    /// The accessor is never copied. A reference builds its own accessor on
    /// the next resolution.
    pub fn assign_from(&mut self, template: &Self) {
        self.source = template.source.clone();
        self.backend.clone_from(&template.backend);
        self.accessor = None;
    }

    /// Drop the accessor of a reference; it is rebuilt on the next resolution
    pub fn release(&mut self) {
        self.accessor = None;
    }
}

impl<T: UserType, E: 'static> DynamicValue<T, E> {
    /// Current value, reading the referenced register if there is one
    ///
    /// # Errors
    /// Returns `NotFound` if the referenced backend is gone or does not
    /// know the register, and forwards read failures.
    pub fn resolve(&mut self) -> Result<T, Error<E>> {
        let register = match &self.source {
            ValueSource::Literal(value) => return Ok(value.clone()),
            ValueSource::Register(register) => register,
        };

        let accessor = match &mut self.accessor {
            Some(accessor) => accessor,
            slot @ None => {
                let backend = self
                    .backend
                    .as_ref()
                    .and_then(Weak::upgrade)
                    .ok_or_else(|| {
                        Error::NotFound(format!(
                            "backend for referenced register '{register}' is gone"
                        ))
                    })?;
                slot.insert(get_accessor::<T, E>(&backend, register, 0, 0, false)?)
            }
        };
        accessor.read()?;
        Ok(T::from_elements(accessor.channel(0)?))
    }
}

impl<T: UserType, E> Clone for DynamicValue<T, E> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            backend: self.backend.clone(),
            accessor: None,
        }
    }
}
