//! Per-task variable scratchpad.
//!
//! Steps exchange values through named, typed variables instead of shared
//! out-pointers: a step that produces something writes a [`Var`], later steps
//! take an [`Arg`] that is either a literal or a reference to that variable.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{ErrorKind, Result};

/// Typed handle to a slot in [`Vars`].
pub struct Var<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Var<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

// Manual impls: derives would require `T: Clone`/`T: Copy`.
impl<T> Clone for Var<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Var<T> {}

impl<T> fmt::Debug for Var<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.name)
    }
}

/// A step input: either known when the task is built, or produced by an earlier step.
#[derive(Debug, Clone)]
pub enum Arg<T> {
    Literal(T),
    Var(Var<T>),
}

impl<T: Clone + Send + 'static> Arg<T> {
    /// Resolve against the task's variables. `step` names the reader for the error.
    pub fn resolve(&self, vars: &Vars, step: &str) -> Result<T> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Var(var) => vars.require(*var, step),
        }
    }

    /// Variable name this argument depends on, if any.
    pub fn reads(&self) -> Option<&'static str> {
        match self {
            Self::Literal(_) => None,
            Self::Var(var) => Some(var.name()),
        }
    }
}

impl From<&str> for Arg<String> {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl From<String> for Arg<String> {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

impl<T> From<Var<T>> for Arg<T> {
    fn from(var: Var<T>) -> Self {
        Self::Var(var)
    }
}

/// Variables written so far during one task run.
#[derive(Default)]
pub struct Vars {
    values: HashMap<&'static str, Box<dyn Any + Send>>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Send + 'static>(&mut self, var: Var<T>, value: T) {
        self.values.insert(var.name(), Box::new(value));
    }

    /// Value of `var`, or `None` if unset or stored under a different type.
    pub fn get<T: Clone + 'static>(&self, var: Var<T>) -> Option<T> {
        self.values
            .get(var.name())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Like [`Vars::get`] but an unset variable is a `missing-variable` error.
    pub fn require<T: Clone + 'static>(&self, var: Var<T>, step: &str) -> Result<T> {
        self.get(var).ok_or_else(|| {
            ErrorKind::MissingVariable
                .error()
                .field("step", step)
                .field("var", var.name())
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Remove `name`, returning its raw value.
    pub(crate) fn take(&mut self, name: &'static str) -> Option<Box<dyn Any + Send>> {
        self.values.remove(name)
    }

    /// Put back what [`Vars::take`] returned; `None` leaves `name` unset.
    pub(crate) fn restore(&mut self, name: &'static str, value: Option<Box<dyn Any + Send>>) {
        match value {
            Some(value) => {
                self.values.insert(name, value);
            }
            None => {
                self.values.remove(name);
            }
        }
    }
}

impl fmt::Debug for Vars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&&str> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Vars").field("names", &names).finish()
    }
}
