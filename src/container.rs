//! The resolution engine.
//!
//! A [Container] maps keys to shared [Registration]s and produces instances on demand.
//! While a registration is being constructed it sits on top of the resolution-context stack,
//! which is how parameter hooks are restricted to the registration that declared them:
//! resolving a dependency pushes that dependency's own registration, hiding the hooks of its
//! dependant.
//!
//! Instances exposing a disposal operation are tracked by the container that created them
//! and disposed, in creation order, when the container is disposed. Sub-containers are
//! tracked by their parent in the same way.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::builder::{Builder, ContainerOptions};
use crate::key::Key;
use crate::parameter::{Dependency, Parameter};
use crate::registration::Registration;
use crate::resolve::{Constructible, ResolveError};
use crate::scope::{Instance, InstanceScope};

/// Release the resources held by an instance.
///
/// Calling `dispose` directly leaves a tracked instance in its container's disposables, and
/// it will be disposed again with the container. Use [Container::dispose_instance] to dispose
/// one instance early.
pub trait Dispose: 'static {
    fn dispose(&self);
}

pub(crate) type RegistrationMap = HashMap<Key, Vec<Rc<Registration>>>;

/// Dependency injection container.
///
/// Built by a [Builder] and always handled through an `Rc`. Not meant to be shared between
/// threads: resolution is synchronous and may recurse to the depth of the dependency graph.
pub struct Container {
    this: Weak<Container>,
    parent: Weak<Container>,
    options: ContainerOptions,
    registrations: RegistrationMap,
    singletons: Rc<InstanceScope>,
    owns_singletons: bool,
    scoped: InstanceScope,
    stack: RefCell<Vec<Rc<Registration>>>,
    disposables: RefCell<Vec<Rc<dyn Dispose>>>,
    disposed: Cell<bool>,
}

impl Container {
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn assemble(
        options: ContainerOptions,
        registrations: RegistrationMap,
        parent: Option<&Container>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Container {
            this: this.clone(),
            parent: parent.map(Container::weak).unwrap_or_default(),
            options,
            registrations,
            singletons: parent
                .map(|p| p.singletons.clone())
                .unwrap_or_default(),
            owns_singletons: parent.is_none(),
            scoped: InstanceScope::new(),
            stack: RefCell::default(),
            disposables: RefCell::default(),
            disposed: Cell::new(false),
        })
    }

    /// Registration resolving the container's own key to the resolving container.
    pub(crate) fn self_registration() -> Registration {
        let mut registration = Registration::new();
        registration
            .call_optional(|c: &Container| c.shared().map(Some))
            .as_key(Key::of::<Container>())
            .per_dependency();
        registration
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    pub(crate) fn registrations(&self) -> &RegistrationMap {
        &self.registrations
    }

    pub(crate) fn singletons(&self) -> &InstanceScope {
        &self.singletons
    }

    pub(crate) fn scoped(&self) -> &InstanceScope {
        &self.scoped
    }

    pub(crate) fn weak(&self) -> Weak<Container> {
        self.this.clone()
    }

    /// Shared handle on this container.
    pub fn shared(&self) -> Result<Rc<Container>, ResolveError> {
        self.this.upgrade().ok_or(ResolveError::Disposed)
    }

    pub fn is_registered(&self, key: &Key) -> bool {
        self.registrations.contains_key(key)
    }

    /// True if resolving `key` would not fail for lack of a registration.
    pub fn can_resolve(&self, key: &Key) -> bool {
        self.is_registered(key) || key.is_constructible()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn ensure_live(&self) -> Result<(), ResolveError> {
        if self.disposed.get() {
            return Err(ResolveError::Disposed);
        }
        Ok(())
    }

    fn lookup(&self, key: &Key) -> Option<Rc<Registration>> {
        self.registrations.get(key).and_then(|r| r.last()).cloned()
    }

    /// Resolve a key to an instance.
    ///
    /// Unregistered constructible type keys are built directly with the default lifetime;
    /// any other unregistered key fails.
    pub fn resolve(&self, key: &Key) -> Result<Instance, ResolveError> {
        self.ensure_live()?;
        if let Some(registration) = self.lookup(key) {
            return self.resolve_with(&registration, key);
        }
        match key.synthesize() {
            Some(registration) => {
                trace!(%key, "no registration, constructing directly");
                self.resolve_with(&Rc::new(registration), key)
            }
            None => Err(ResolveError::unresolved(key)),
        }
    }

    /// Resolve a key and view the result as an `Rc<T>`.
    pub fn resolve_as<T: ?Sized + 'static>(&self, key: &Key) -> Result<Rc<T>, ResolveError> {
        let instance = self.resolve(key)?;
        instance.downcast::<T>().ok_or_else(|| ResolveError::mismatch::<T>(key))
    }

    /// Resolve the registration bound to the type `T`.
    ///
    /// The key is `Key::of::<T>()`, which never constructs an unregistered type: use
    /// [Container::construct] for that.
    pub fn get<T: ?Sized + 'static>(&self) -> Result<Rc<T>, ResolveError> {
        self.resolve_as(&Key::of::<T>())
    }

    /// Resolve the registration bound to the string key `name`.
    pub fn get_named<T: ?Sized + 'static>(&self, name: &str) -> Result<Rc<T>, ResolveError> {
        self.resolve_as(&Key::named(name))
    }

    /// Resolve `T`, constructing it directly if nothing is registered for it.
    pub fn construct<T: Constructible>(&self) -> Result<Rc<T>, ResolveError> {
        self.resolve_as(&Key::constructible::<T>())
    }

    /// Resolve every registration bound to `key`, in registration order.
    pub fn resolve_all(&self, key: &Key) -> Result<Vec<Instance>, ResolveError> {
        self.ensure_live()?;
        let registrations = self.registrations.get(key).cloned().unwrap_or_default();
        registrations
            .iter()
            .map(|registration| self.resolve_with(registration, key))
            .collect()
    }

    pub fn get_all<T: ?Sized + 'static>(&self) -> Result<Vec<Rc<T>>, ResolveError> {
        let key = Key::of::<T>();
        self.resolve_all(&key)?
            .iter()
            .map(|i| i.downcast::<T>().ok_or_else(|| ResolveError::mismatch::<T>(&key)))
            .collect()
    }

    /// Produce an instance of `registration` as seen through `key`.
    pub(crate) fn resolve_with(
        &self,
        registration: &Rc<Registration>,
        key: &Key,
    ) -> Result<Instance, ResolveError> {
        let lifetime = registration
            .get_lifetime()
            .unwrap_or(self.options.default_lifetime);
        trace!(%key, %lifetime, "resolving");
        let raw = {
            let _frame = ResolutionFrame::enter(self, registration, key)?;
            lifetime.instantiate(self, registration)?
        };
        let Some(raw) = raw else {
            warn!(%key, "factory produced nothing");
            return Err(ResolveError::Empty { key: key.to_string() });
        };
        registration.project(key, raw)
    }

    /// Call the raw factory of `registration`, tracking the result for disposal.
    pub(crate) fn create_instance(
        &self,
        registration: &Registration,
    ) -> Result<Option<Instance>, ResolveError> {
        let Some(factory) = registration.factory() else {
            return Ok(None);
        };
        let instance = factory(self)?;
        if let Some(instance) = &instance {
            debug!(ty = registration.target(), "created instance");
            if let Some(disposable) = registration.disposer_for(instance) {
                self.track(disposable);
            }
        }
        Ok(instance)
    }

    /// Value for a parameter of the registration currently under construction.
    ///
    /// The hooks of that registration are tried in order and the first match provides the
    /// value. Otherwise the declared dependency is resolved.
    pub fn resolve_parameter(&self, parameter: &Parameter) -> Result<Option<Instance>, ResolveError> {
        let current = self.stack.borrow().last().cloned();
        if let Some(registration) = &current {
            if let Some(hook) = registration.hooks().iter().find(|h| h.matches(parameter)) {
                trace!(parameter = parameter.name(), ty = registration.target(), "hook matched");
                return hook.resolve(self, parameter).map(Some);
            }
        }
        match parameter.dependency() {
            Some(dependency) => self.resolve_dependency(dependency),
            None => Err(ResolveError::Declaration {
                target: current.map_or("<none>", |r| r.target()).to_string(),
                reason: format!("parameter `{}` declares no dependency", parameter.name()),
            }),
        }
    }

    /// Resolve a dependency descriptor, ignoring hooks.
    pub fn resolve_dependency(&self, dependency: &Dependency) -> Result<Option<Instance>, ResolveError> {
        match dependency {
            Dependency::Key(key) => self.resolve(key).map(Some),
            Dependency::Optional { dependency, default } => {
                if self.provides(dependency) {
                    self.resolve_dependency(dependency)
                } else {
                    trace!(key = %dependency.key(), "optional dependency missing, using default");
                    Ok(default.clone())
                }
            }
            Dependency::Named { name, .. } => self.resolve(name).map(Some),
            Dependency::All(key) => Ok(Some(Instance::new(self.resolve_all(key)?))),
            Dependency::Func { target, parameters } => {
                let factory = self.factory_for(target, parameters.clone())?;
                Ok(Some(Instance::new(factory)))
            }
        }
    }

    fn provides(&self, dependency: &Dependency) -> bool {
        match dependency {
            Dependency::Key(key) | Dependency::Func { target: key, .. } => self.can_resolve(key),
            Dependency::Named { name, .. } => self.can_resolve(name),
            Dependency::Optional { .. } | Dependency::All(_) => true,
        }
    }

    /// Registration that `target` resolves to, synthesized if needed.
    pub(crate) fn registration_for(&self, target: &Key) -> Result<Rc<Registration>, ResolveError> {
        if let Some(registration) = self.lookup(target) {
            return Ok(registration);
        }
        target
            .synthesize()
            .map(Rc::new)
            .ok_or_else(|| ResolveError::unresolved(target))
    }

    /// Derive a sub-container.
    ///
    /// `configure` registers the overrides. The child uses the parent's default lifetime,
    /// shares its singleton scope and falls back to the parent's registration for every key it
    /// does not register itself. Disposing the parent disposes the child.
    pub fn create_child<F>(&self, configure: F) -> Result<Rc<Container>, ResolveError>
    where
        F: FnOnce(&mut Builder),
    {
        self.ensure_live()?;
        let mut builder = Builder::new().with_options(self.options.clone());
        configure(&mut builder);
        let child = builder.build_child(self)?;
        debug!(
            registrations = child.registrations.len(),
            "created sub-container"
        );
        self.track(child.clone());
        Ok(child)
    }

    /// Sub-container without overrides.
    pub fn child(&self) -> Result<Rc<Container>, ResolveError> {
        self.create_child(|_| {})
    }

    fn track(&self, disposable: Rc<dyn Dispose>) {
        let mut disposables = self.disposables.borrow_mut();
        if !disposables.iter().any(|d| same_object(d, &disposable)) {
            disposables.push(disposable);
        }
    }

    fn untrack(&self, disposable: *const Container) {
        self.disposables
            .borrow_mut()
            .retain(|d| !std::ptr::addr_eq(Rc::as_ptr(d), disposable));
    }

    pub fn tracked(&self) -> usize {
        self.disposables.borrow().len()
    }

    /// Dispose a single instance now.
    ///
    /// The instance is first removed from this container's disposables, so disposing the
    /// container later will not dispose it again. Returns false if it was not tracked here.
    pub fn dispose_instance<T: Dispose + ?Sized>(&self, instance: &Rc<T>) -> bool {
        let tracked = {
            let mut disposables = self.disposables.borrow_mut();
            let before = disposables.len();
            disposables.retain(|d| !std::ptr::addr_eq(Rc::as_ptr(d), Rc::as_ptr(instance)));
            disposables.len() != before
        };
        instance.dispose();
        tracked
    }

    /// Dispose every tracked instance, in creation order.
    ///
    /// A sub-container also leaves its parent's disposables. Calling it again is a no-op.
    /// Resolving from a disposed container fails.
    pub fn dispose(&self) {
        self.disposed.set(true);
        if let Some(parent) = self.parent.upgrade() {
            parent.untrack(self);
        }
        let disposables = std::mem::take(&mut *self.disposables.borrow_mut());
        if !disposables.is_empty() {
            debug!(count = disposables.len(), "disposing container");
        }
        for disposable in disposables {
            disposable.dispose();
        }
        self.scoped.clear();
        if self.owns_singletons {
            self.singletons.clear();
        }
    }
}

impl Dispose for Container {
    fn dispose(&self) {
        Container::dispose(self)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("options", &self.options)
            .field("registrations", &self.registrations.len())
            .field("singletons", &self.singletons)
            .field("scoped", &self.scoped)
            .field("tracked", &self.tracked())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

fn same_object(a: &Rc<dyn Dispose>, b: &Rc<dyn Dispose>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Entry of the resolution-context stack, popped when dropped.
struct ResolutionFrame<'c> {
    stack: &'c RefCell<Vec<Rc<Registration>>>,
}

impl<'c> ResolutionFrame<'c> {
    fn enter(
        container: &'c Container,
        registration: &Rc<Registration>,
        key: &Key,
    ) -> Result<Self, ResolveError> {
        let mut stack = container.stack.borrow_mut();
        if stack.len() >= container.options.max_depth {
            return Err(ResolveError::RecursionLimit {
                key: key.to_string(),
                depth: container.options.max_depth,
            });
        }
        stack.push(registration.clone());
        Ok(Self {
            stack: &container.stack,
        })
    }
}

impl Drop for ResolutionFrame<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_pop_on_error() {
        let mut builder = Builder::new().with_max_depth(1);
        builder
            .register()
            .as_key("outer")
            .call(|c: &Container| c.get_named::<u8>("inner"));
        builder.register_value(3u8).as_key("inner");
        let container = builder.build().unwrap();

        let err = container.get_named::<u8>("outer").unwrap_err();
        assert!(matches!(err, ResolveError::RecursionLimit { depth: 1, .. }));
        assert!(container.stack.borrow().is_empty());
        assert_eq!(*container.get_named::<u8>("inner").unwrap(), 3);
    }

    #[test]
    fn disposed_children_leave_their_parent() {
        let container = Builder::new().build().unwrap();
        for _ in 0..100 {
            let child = container.child().unwrap();
            assert_eq!(container.tracked(), 1);
            child.dispose();
        }
        assert_eq!(container.tracked(), 0);

        let kept = container.child().unwrap();
        let grandchild = kept.child().unwrap();
        grandchild.dispose();
        assert_eq!(kept.tracked(), 0);
        assert_eq!(container.tracked(), 1);
        container.dispose();
        assert!(kept.is_disposed());
    }

    #[test]
    fn container_resolves_itself() {
        let container = Builder::new().build().unwrap();
        let me = container.get::<Container>().unwrap();
        assert!(Rc::ptr_eq(&me, &container));

        let child = container.child().unwrap();
        assert!(Rc::ptr_eq(&child.get::<Container>().unwrap(), &child));
    }
}
