//! Runtime dependency injection with hierarchical containers, scoped lifetimes and parameter hooks.
//!
//! # Simple use case
//!
//! ```
//! # use std::rc::Rc;
//! # use arbor::*;
//! // Define traits and implementors
//! trait Greet {
//!     fn hello(&self) -> String;
//! }
//!
//! #[derive(Default)]
//! struct English;
//!
//! impl Greet for English {
//!     fn hello(&self) -> String {
//!         "hello".into()
//!     }
//! }
//!
//! struct Desk {
//!     greeter: Rc<dyn Greet>,
//! }
//!
//! impl Desk {
//!     fn new(greeter: Rc<dyn Greet>) -> Self {
//!         Desk { greeter }
//!     }
//! }
//!
//! // Declare how they are constructed
//! constructible!(English);
//! constructible!(Desk, new, greeter: dependency::<dyn Greet>());
//!
//! # fn main() -> Result<(), ResolveError> {
//! // Register the implementation of the trait and resolve the rest
//! let mut builder = Builder::new();
//! builder
//!     .register_type::<English>()
//!     .provides(|e: Rc<English>| -> Rc<dyn Greet> { e })
//!     .once();
//! let container = builder.build()?;
//! let desk = container.construct::<Desk>()?;
//! assert_eq!(desk.greeter.hello(), "hello");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! Values are stored as type-erased [Instance]s and looked up by [Key]: either the identity
//! of a Rust type (including trait objects) or a caller-supplied string.
//!
//! * A [Registration] binds one or more keys to an instance factory, a [Lifetime] and a list
//!   of [ParameterHook]s. Registrations are collected by a [Builder], which turns them into a
//!   [Container].
//! * The [Constructible] trait describes the formal parameters of a type and how to build it
//!   from resolved [Arguments]. The [constructible!] macro implements it from a constructor
//!   and a list of [Dependency] descriptors. Constructible types resolve even when they were
//!   never registered.
//! * The lifetime decides where instances are cached: once for a whole container hierarchy,
//!   once per container, or never.
//! * While a registration is being constructed, its hooks may override the value of any of its
//!   parameters. Hooks never apply to the dependencies of that registration.
//! * Sub-containers override some registrations of their parent and inherit the others.
//!   Disposing a container disposes the instances it created and its sub-containers.
//!
//! Containers are single-threaded: they are handled through `Rc` and resolve synchronously.

mod builder;
mod container;
mod helpers;
mod inject;
mod key;
mod parameter;
mod registration;
mod resolve;
mod scope;

pub use builder::{Builder, ContainerOptions};
pub use container::{Container, Dispose};
pub use helpers::{all, construct, dependency, func, key, named, optional};
pub use inject::{Callable, Factory, Injectable};
pub use key::{Key, TypeKey};
pub use parameter::{Dependency, Parameter, ParameterHook, ParameterSelector};
pub use registration::{ParameterBuilder, Registration, RegistrationId};
pub use resolve::{Arguments, Constructible, FromArgument, ResolveError};
pub use scope::{Instance, InstanceScope, Lifetime};

#[cfg(test)]
mod tests;
