//! Traits describing how values are built from resolved arguments.
//!
//! The container does not inspect constructors. Each constructible type reads its own
//! signature out through [Constructible]:
//!
//! * [Constructible::parameters] lists the formal parameters in order, each with the
//!   [Dependency] it declares.
//! * [Constructible::construct] receives the resolved values as [Arguments] and pulls them
//!   out in the same order, converting each one with [FromArgument].
//!
//! The [constructible!](crate::constructible) macro writes both methods from a constructor
//! function and a dependency list.

use std::any::type_name;
use std::collections::VecDeque;
use std::rc::Rc;

use thiserror::Error;

use crate::container::Dispose;
use crate::key::Key;
use crate::parameter::{Dependency, Parameter};
use crate::scope::Instance;

/// A type the container can build itself.
pub trait Constructible: Sized + 'static {
    /// Ordered formal parameters of the constructor.
    fn parameters() -> Vec<Parameter>;

    /// Build an instance, taking one argument per declared parameter.
    fn construct(args: &mut Arguments) -> Result<Self, ResolveError>;

    /// Disposal operation exposed by the instance, if any.
    fn as_disposable(self: Rc<Self>) -> Option<Rc<dyn Dispose>> {
        None
    }
}

/// Conversion from a resolved argument to a constructor or function parameter.
pub trait FromArgument: Sized {
    /// Dependency declared by a function parameter of this type.
    fn dependency() -> Dependency;

    fn from_argument(name: &str, value: Option<Instance>) -> Result<Self, ResolveError>;
}

/// Resolved through `Key::of::<T>()`: an unregistered constructible `T` is not built
/// directly. Declare the dependency with `construct::<T>()` for that.
impl<T: ?Sized + 'static> FromArgument for Rc<T> {
    fn dependency() -> Dependency {
        Dependency::Key(Key::of::<T>())
    }

    fn from_argument(name: &str, value: Option<Instance>) -> Result<Self, ResolveError> {
        let value = value.ok_or_else(|| ResolveError::Empty {
            key: format!("parameter `{}`", name),
        })?;
        downcast_argument(name, &value)
    }
}

impl<T: ?Sized + 'static> FromArgument for Option<Rc<T>> {
    fn dependency() -> Dependency {
        Dependency::Optional {
            dependency: Box::new(Dependency::Key(Key::of::<T>())),
            default: None,
        }
    }

    fn from_argument(name: &str, value: Option<Instance>) -> Result<Self, ResolveError> {
        value.map(|v| downcast_argument(name, &v)).transpose()
    }
}

impl<T: ?Sized + 'static> FromArgument for Vec<Rc<T>> {
    fn dependency() -> Dependency {
        Dependency::All(Key::of::<T>())
    }

    fn from_argument(name: &str, value: Option<Instance>) -> Result<Self, ResolveError> {
        let all: Rc<Vec<Instance>> = FromArgument::from_argument(name, value)?;
        all.iter().map(|v| downcast_argument(name, v)).collect()
    }
}

fn downcast_argument<T: ?Sized + 'static>(name: &str, value: &Instance) -> Result<Rc<T>, ResolveError> {
    value.downcast::<T>().ok_or_else(|| ResolveError::TypeMismatch {
        key: format!("parameter `{}`", name),
        expected: type_name::<T>(),
    })
}

/// Resolved values for the parameters of one construction, in parameter order.
pub struct Arguments {
    target: &'static str,
    values: VecDeque<(&'static str, Option<Instance>)>,
    consumed: usize,
}

impl Arguments {
    pub(crate) fn new(target: &'static str, values: Vec<(&'static str, Option<Instance>)>) -> Self {
        Self {
            target,
            values: values.into(),
            consumed: 0,
        }
    }

    /// Take the next argument, converted to the parameter type.
    pub fn next<A: FromArgument>(&mut self) -> Result<A, ResolveError> {
        let Some((name, value)) = self.values.pop_front() else {
            return Err(ResolveError::Declaration {
                target: self.target.to_string(),
                reason: format!(
                    "the constructor takes more than the {} declared dependencies",
                    self.consumed
                ),
            });
        };
        self.consumed += 1;
        A::from_argument(name, value)
    }

    /// Take the next argument as an `Rc<T>`.
    pub fn take<T: ?Sized + 'static>(&mut self) -> Result<Rc<T>, ResolveError> {
        self.next()
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    /// Fail if the constructor left declared arguments unused.
    pub(crate) fn finish(self) -> Result<(), ResolveError> {
        if self.values.is_empty() {
            return Ok(());
        }
        Err(ResolveError::Declaration {
            target: self.target.to_string(),
            reason: format!(
                "{} dependencies are declared but the constructor takes {}",
                self.consumed + self.values.len(),
                self.consumed
            ),
        })
    }
}

/// Errors triggered while building containers and resolving instances
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Registration of {target} is not bound to any key")]
    Build { target: String },
    #[error("Nothing registered for key {key}")]
    Unresolved { key: String },
    #[error("Key {key} resolved to nothing")]
    Empty { key: String },
    #[error("Resolving {key} went over the maximum depth of {depth}: cyclic dependencies?")]
    RecursionLimit { key: String, depth: usize },
    #[error("Invalid dependency declaration for {target}: {reason}")]
    Declaration { target: String, reason: String },
    #[error("Value of {key} is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },
    #[error("Container has been disposed")]
    Disposed,
}

impl ResolveError {
    pub(crate) fn unresolved(key: &Key) -> Self {
        ResolveError::Unresolved { key: key.to_string() }
    }

    pub(crate) fn mismatch<T: ?Sized>(key: &Key) -> Self {
        ResolveError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<T>(),
        }
    }
}
