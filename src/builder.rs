use std::rc::Rc;

use tracing::debug;

use crate::container::{Container, RegistrationMap};
use crate::key::Key;
use crate::registration::Registration;
use crate::resolve::{Constructible, ResolveError};
use crate::scope::Lifetime;

/// Settings shared by a container and all its sub-containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Lifetime of registrations that do not set one
    pub default_lifetime: Lifetime,
    /// Maximum depth of the resolution-context stack. Going over it is reported as a
    /// probable dependency cycle.
    pub max_depth: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            default_lifetime: Lifetime::PerDependency,
            max_depth: 100,
        }
    }
}

/// Collects registrations and turns them into a [Container].
///
/// Building consumes the builder, so registrations cannot be added to a built container.
#[derive(Default)]
pub struct Builder {
    options: ContainerOptions,
    registrations: Vec<Registration>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_default_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.options.default_lifetime = lifetime;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.options.max_depth = max_depth;
        self
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    /// Start a new registration. It must be bound to at least one key before building.
    pub fn register(&mut self) -> &mut Registration {
        self.add(Registration::new())
    }

    pub fn add(&mut self, registration: Registration) -> &mut Registration {
        let index = self.registrations.len();
        self.registrations.push(registration);
        &mut self.registrations[index]
    }

    /// Register `T` under its own key, built by construction.
    pub fn register_type<T: Constructible>(&mut self) -> &mut Registration {
        self.register().create::<T>().as_key(Key::constructible::<T>())
    }

    /// Register `value` under the key of its type.
    pub fn register_value<T: 'static>(&mut self, value: T) -> &mut Registration {
        self.register().use_value(value).as_key(Key::of::<T>())
    }

    pub fn register_shared<T: ?Sized + 'static>(&mut self, value: Rc<T>) -> &mut Registration {
        self.register().use_shared(value).as_key(Key::of::<T>())
    }

    /// Register a factory under the key of the type it returns.
    pub fn register_factory<T, F>(&mut self, factory: F) -> &mut Registration
    where
        T: 'static,
        F: Fn(&Container) -> Result<T, ResolveError> + 'static,
    {
        self.register().call(factory).as_key(Key::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn build(self) -> Result<Rc<Container>, ResolveError> {
        let Builder {
            options,
            registrations,
        } = self;
        let registrations = collect(registrations)?;
        debug!(
            keys = registrations.len(),
            default_lifetime = %options.default_lifetime,
            "built container"
        );
        Ok(Container::assemble(options, registrations, None))
    }

    /// Build a sub-container of `parent`.
    pub(crate) fn build_child(self, parent: &Container) -> Result<Rc<Container>, ResolveError> {
        let Builder {
            mut options,
            registrations,
        } = self;
        options.default_lifetime = parent.options().default_lifetime;
        let mut registrations = collect(registrations)?;
        for (key, inherited) in parent.registrations() {
            registrations
                .entry(key.clone())
                .or_insert_with(|| inherited.clone());
        }
        Ok(Container::assemble(options, registrations, Some(parent)))
    }
}

/// Index registrations by key, keeping registration order within each key.
fn collect(registrations: Vec<Registration>) -> Result<RegistrationMap, ResolveError> {
    let mut map = RegistrationMap::new();
    for registration in registrations {
        if registration.keys().next().is_none() {
            return Err(ResolveError::Build {
                target: registration.target().to_string(),
            });
        }
        let registration = Rc::new(registration);
        for key in registration.keys() {
            map.entry(key.clone())
                .or_default()
                .push(registration.clone());
        }
    }
    map.insert(
        Key::of::<Container>(),
        vec![Rc::new(Container::self_registration())],
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_registration_fails_to_build() {
        let mut builder = Builder::new();
        builder.register().use_value(1u8);
        let err = builder.build().unwrap_err();
        assert!(matches!(err, ResolveError::Build { ref target } if target == "u8"));
    }

    #[test]
    fn registrations_keep_their_order() -> Result<(), ResolveError> {
        let mut builder = Builder::new().with_max_depth(10);
        builder.register_value(1u8);
        builder.register_value(2u8);
        builder.register().use_value(3u8).as_key("three");
        assert_eq!(builder.len(), 3);

        let container = builder.build()?;
        assert_eq!(container.options().max_depth, 10);
        assert_eq!(*container.get::<u8>()?, 2);
        let all: Vec<u8> = container.get_all::<u8>()?.iter().map(|v| **v).collect();
        assert_eq!(all, vec![1, 2]);
        assert!(container.is_registered(&Key::named("three")));
        Ok(())
    }

    #[test]
    fn child_keeps_parent_default_lifetime() -> Result<(), ResolveError> {
        let container = Builder::new()
            .with_default_lifetime(Lifetime::PerContainer)
            .build()?;
        let child = container.child()?;
        assert_eq!(child.options().default_lifetime, Lifetime::PerContainer);
        Ok(())
    }
}
