//! Resolved values, instance caches and the lifetime policies built on them.

use std::any::Any;
use std::cell::RefCell;
use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::container::Container;
use crate::registration::{Registration, RegistrationId};
use crate::resolve::ResolveError;

/// A resolved value.
///
/// Wraps an `Rc<T>` for any `T`, sized or not, so that trait objects and slices can be
/// stored and handed out like any other value. Cloning an instance never clones the value.
#[derive(Clone)]
pub struct Instance(Rc<dyn Any>);

impl Instance {
    pub fn new<T: 'static>(value: T) -> Self {
        Self::from_rc(Rc::new(value))
    }

    /// Wrap an already shared value, keeping its identity.
    pub fn from_rc<T: ?Sized + 'static>(value: Rc<T>) -> Self {
        Instance(Rc::new(value))
    }

    /// View the instance as an `Rc<T>`, if it holds a `T`.
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Rc<T>> {
        self.0.downcast_ref::<Rc<T>>().cloned()
    }

    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.0.is::<Rc<T>>()
    }

    /// True if both handles are the same stored instance.
    pub fn same(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Instance(..)")
    }
}

/// Caching rule applied to the instances of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// One instance for the whole container hierarchy
    Once,
    /// One instance per container, sub-containers get their own
    PerContainer,
    /// A new instance for every resolution
    #[default]
    PerDependency,
}

impl Lifetime {
    /// Obtain an instance of the registration according to this policy.
    ///
    /// Cached policies only call the registration's factory on a cache miss, and the
    /// cache is keyed by the registration identity, never by the requested key.
    pub(crate) fn instantiate(
        self,
        container: &Container,
        registration: &Registration,
    ) -> Result<Option<Instance>, ResolveError> {
        let create = || container.create_instance(registration);
        match self {
            Lifetime::Once => container
                .singletons()
                .get_or_try_insert_with(registration.id(), create),
            Lifetime::PerContainer => container
                .scoped()
                .get_or_try_insert_with(registration.id(), create),
            Lifetime::PerDependency => create(),
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Once => write!(f, "once"),
            Lifetime::PerContainer => write!(f, "per-container"),
            Lifetime::PerDependency => write!(f, "per-dependency"),
        }
    }
}

/// Cache of created instances, keyed by registration.
#[derive(Default)]
pub struct InstanceScope {
    instances: RefCell<HashMap<RegistrationId, Instance>>,
}

impl InstanceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, id: &RegistrationId) -> Option<Instance> {
        self.instances.borrow().get(id).cloned()
    }

    /// Return the cached instance, or create and cache a new one.
    ///
    /// No borrow is held while `create` runs: it may recurse into this scope. If the slot
    /// got filled meanwhile, the first stored instance wins.
    pub(crate) fn get_or_try_insert_with<F>(
        &self,
        id: &RegistrationId,
        create: F,
    ) -> Result<Option<Instance>, ResolveError>
    where
        F: FnOnce() -> Result<Option<Instance>, ResolveError>,
    {
        if let Some(existing) = self.get(id) {
            return Ok(Some(existing));
        }
        let Some(created) = create()? else {
            return Ok(None);
        };
        match self.instances.borrow_mut().entry(id.clone()) {
            Entry::Occupied(o) => {
                debug!(?id, "instance created during its own resolution, keeping the first one");
                Ok(Some(o.get().clone()))
            }
            Entry::Vacant(v) => Ok(Some(v.insert(created).clone())),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.borrow().is_empty()
    }

    /// Drop every cached instance.
    pub(crate) fn clear(&self) {
        // take first: dropping instances may run arbitrary code
        let dropped = std::mem::take(&mut *self.instances.borrow_mut());
        drop(dropped);
    }
}

impl fmt::Debug for InstanceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceScope")
            .field("instances", &self.len())
            .finish()
    }
}
