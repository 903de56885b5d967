//! Registrations: what a key resolves to, how long it lives and which parameters are overridden.

use std::any::type_name;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::unsync::OnceCell;

use crate::container::{Container, Dispose};
use crate::key::Key;
use crate::parameter::{Parameter, ParameterHook, ParameterSelector};
use crate::resolve::{Arguments, Constructible, ResolveError};
use crate::scope::{Instance, Lifetime};

/// Identity of a registration, used as the cache key of instance scopes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegistrationId {
    /// Registration declared on a builder
    Explicit(u64),
    /// Registration synthesized for an unregistered constructible type
    Implicit(Key),
}

impl RegistrationId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        RegistrationId::Explicit(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) type InstanceFactory = Rc<dyn Fn(&Container) -> Result<Option<Instance>, ResolveError>>;
type Cast = Rc<dyn Fn(&Instance) -> Option<Instance>>;
type Disposer = Rc<dyn Fn(&Instance) -> Option<Rc<dyn Dispose>>>;

#[derive(Clone)]
struct Binding {
    key: Key,
    cast: Option<Cast>,
}

/// Binding of one or more keys to an instance factory, a lifetime and parameter hooks.
///
/// Every setter returns the registration again so that calls can be chained. Setting the
/// factory a second time replaces the first one.
#[derive(Clone)]
pub struct Registration {
    id: RegistrationId,
    target: &'static str,
    bindings: Vec<Binding>,
    factory: Option<InstanceFactory>,
    lifetime: Option<Lifetime>,
    hooks: Vec<ParameterHook>,
    disposer: Option<Disposer>,
    explicit_disposer: bool,
}

impl Default for Registration {
    fn default() -> Self {
        Self::new()
    }
}

impl Registration {
    /// Empty registration: no key, no factory, the builder's default lifetime.
    pub fn new() -> Self {
        Self {
            id: RegistrationId::next(),
            target: "<unset>",
            bindings: Vec::new(),
            factory: None,
            lifetime: None,
            hooks: Vec::new(),
            disposer: None,
            explicit_disposer: false,
        }
    }

    /// Throwaway registration building an unregistered constructible type.
    pub(crate) fn implicit<T: Constructible>() -> Self {
        let key = Key::constructible::<T>();
        let mut registration = Self::new();
        registration.id = RegistrationId::Implicit(key.clone());
        registration.create::<T>().as_key(key);
        registration
    }

    pub fn id(&self) -> &RegistrationId {
        &self.id
    }

    /// Name of the produced type, for diagnostics.
    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.bindings.iter().map(|b| &b.key)
    }

    /// Explicit lifetime, `None` when the container default applies.
    pub fn get_lifetime(&self) -> Option<Lifetime> {
        self.lifetime
    }

    pub fn hooks(&self) -> &[ParameterHook] {
        &self.hooks
    }

    pub(crate) fn factory(&self) -> Option<&InstanceFactory> {
        self.factory.as_ref()
    }

    /// Bind to a key that receives the produced value as is.
    pub fn as_key(&mut self, key: impl Into<Key>) -> &mut Self {
        let key = key.into();
        if !self.bindings.iter().any(|b| b.key == key) {
            self.bindings.push(Binding { key, cast: None });
        }
        self
    }

    pub fn as_keys<K: Into<Key>>(&mut self, keys: impl IntoIterator<Item = K>) -> &mut Self {
        for key in keys {
            self.as_key(key);
        }
        self
    }

    /// Bind to the key of `I`, converting the produced `Rc<T>` with `cast`.
    ///
    /// Typically used to expose a concrete type as a trait object:
    /// `.provides(|db: Rc<Postgres>| -> Rc<dyn Database> { db })`.
    pub fn provides<T, I, F>(&mut self, cast: F) -> &mut Self
    where
        T: ?Sized + 'static,
        I: ?Sized + 'static,
        F: Fn(Rc<T>) -> Rc<I> + 'static,
    {
        let key = Key::of::<I>();
        let cast: Cast = Rc::new(move |raw: &Instance| {
            raw.downcast::<T>().map(|v| Instance::from_rc(cast(v)))
        });
        match self.bindings.iter_mut().find(|b| b.key == key) {
            Some(binding) => binding.cast = Some(cast),
            None => self.bindings.push(Binding { key, cast: Some(cast) }),
        }
        self
    }

    /// Build instances by constructing `T`.
    pub fn create<T: Constructible>(&mut self) -> &mut Self {
        self.target = type_name::<T>();
        self.factory = Some(construct_with::<T>());
        self.implied_disposer(Some(Rc::new(|raw: &Instance| {
            raw.downcast::<T>().and_then(T::as_disposable)
        })));
        self
    }

    /// Always resolve to `value`.
    pub fn use_value<T: 'static>(&mut self, value: T) -> &mut Self {
        self.use_shared(Rc::new(value))
    }

    /// Always resolve to the shared `value`.
    pub fn use_shared<T: ?Sized + 'static>(&mut self, value: Rc<T>) -> &mut Self {
        let instance = Instance::from_rc(value);
        self.target = type_name::<T>();
        self.factory = Some(instance_factory(move |_| Ok(Some(instance.clone()))));
        self.implied_disposer(None);
        self
    }

    /// Build instances by calling `factory`.
    pub fn call<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: 'static,
        F: Fn(&Container) -> Result<T, ResolveError> + 'static,
    {
        self.target = type_name::<T>();
        self.factory = Some(instance_factory(move |c| {
            Ok(Some(Instance::new(factory(c)?)))
        }));
        self.implied_disposer(None);
        self
    }

    /// Build instances by calling a `factory` that may produce nothing.
    pub fn call_optional<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + 'static,
        F: Fn(&Container) -> Result<Option<Rc<T>>, ResolveError> + 'static,
    {
        self.target = type_name::<T>();
        self.factory = Some(instance_factory(move |c| {
            Ok(factory(c)?.map(Instance::from_rc))
        }));
        self.implied_disposer(None);
        self
    }

    /// Resolve to a [Factory](crate::Factory) building `target` with explicit values for
    /// the parameters declared as `parameters`.
    pub fn use_factory_for(&mut self, target: impl Into<Key>, parameters: Vec<Key>) -> &mut Self {
        let target = target.into();
        self.target = type_name::<crate::Factory>();
        self.factory = Some(instance_factory(move |c| {
            Ok(Some(Instance::new(c.factory_for(&target, parameters.clone())?)))
        }));
        self.implied_disposer(None);
        self
    }

    /// Register the produced `T` for disposal with the resolving container.
    ///
    /// Can be called before or after setting the factory: an explicit disposer is kept when
    /// the factory is replaced.
    pub fn disposable<T: Dispose>(&mut self) -> &mut Self {
        self.disposer = Some(Rc::new(|raw: &Instance| {
            raw.downcast::<T>().map(|v| v as Rc<dyn Dispose>)
        }));
        self.explicit_disposer = true;
        self
    }

    /// Disposer that comes with a factory, unless one was set with [Registration::disposable].
    fn implied_disposer(&mut self, disposer: Option<Disposer>) {
        if !self.explicit_disposer {
            self.disposer = disposer;
        }
    }

    pub fn lifetime(&mut self, lifetime: Lifetime) -> &mut Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn once(&mut self) -> &mut Self {
        self.lifetime(Lifetime::Once)
    }

    pub fn per_container(&mut self) -> &mut Self {
        self.lifetime(Lifetime::PerContainer)
    }

    pub fn per_dependency(&mut self) -> &mut Self {
        self.lifetime(Lifetime::PerDependency)
    }

    /// Append a hook. Hooks are tried in the order they were added.
    pub fn hook(&mut self, hook: ParameterHook) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    /// Override the parameter with this formal name.
    pub fn with_parameter(&mut self, name: impl Into<Rc<str>>) -> ParameterBuilder<'_> {
        self.select(ParameterSelector::Name(name.into()))
    }

    /// Override the parameter at this position.
    pub fn with_parameter_at(&mut self, index: usize) -> ParameterBuilder<'_> {
        self.select(ParameterSelector::Index(index))
    }

    /// Override the parameters declaring this dependency key.
    pub fn with_parameter_key(&mut self, key: impl Into<Key>) -> ParameterBuilder<'_> {
        self.select(ParameterSelector::Key(key.into()))
    }

    /// Override the parameters declaring a dependency on `T`.
    pub fn with_parameter_of<T: ?Sized + 'static>(&mut self) -> ParameterBuilder<'_> {
        self.with_parameter_key(Key::of::<T>())
    }

    fn select(&mut self, selector: ParameterSelector) -> ParameterBuilder<'_> {
        ParameterBuilder {
            registration: self,
            selector,
        }
    }

    /// Supply fixed positional arguments, one hook per position.
    pub fn with_arguments(&mut self, arguments: impl IntoIterator<Item = Instance>) -> &mut Self {
        for (index, argument) in arguments.into_iter().enumerate() {
            self.with_parameter_at(index).use_instance(argument);
        }
        self
    }

    /// Value handed out for `key`, converted from the raw produced instance.
    pub(crate) fn project(&self, key: &Key, raw: Instance) -> Result<Instance, ResolveError> {
        let cast = self
            .bindings
            .iter()
            .find(|b| &b.key == key)
            .and_then(|b| b.cast.as_ref());
        match cast {
            None => Ok(raw),
            Some(cast) => cast(&raw).ok_or_else(|| ResolveError::TypeMismatch {
                key: key.to_string(),
                expected: self.target,
            }),
        }
    }

    pub(crate) fn disposer_for(&self, raw: &Instance) -> Option<Rc<dyn Dispose>> {
        self.disposer.as_ref().and_then(|d| d(raw))
    }

    /// One-off copy with a fresh identity, no caching and `hook` tried before the others.
    pub(crate) fn transient(&self, hook: ParameterHook) -> Self {
        let mut hooks = Vec::with_capacity(self.hooks.len() + 1);
        hooks.push(hook);
        hooks.extend(self.hooks.iter().cloned());
        Self {
            id: RegistrationId::next(),
            lifetime: Some(Lifetime::PerDependency),
            hooks,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("keys", &self.keys().collect::<Vec<_>>())
            .field("lifetime", &self.lifetime)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Sub-builder attaching one hook to its registration.
pub struct ParameterBuilder<'r> {
    registration: &'r mut Registration,
    selector: ParameterSelector,
}

impl<'r> ParameterBuilder<'r> {
    /// Compute the value on each construction.
    pub fn call<F>(self, resolve: F) -> &'r mut Registration
    where
        F: Fn(&Container, &Parameter) -> Result<Instance, ResolveError> + 'static,
    {
        let hook = ParameterHook::select(self.selector, resolve);
        self.registration.hook(hook)
    }

    pub fn use_instance(self, instance: Instance) -> &'r mut Registration {
        self.call(move |_, _| Ok(instance.clone()))
    }

    pub fn use_value<T: 'static>(self, value: T) -> &'r mut Registration {
        self.use_instance(Instance::new(value))
    }

    pub fn use_shared<T: ?Sized + 'static>(self, value: Rc<T>) -> &'r mut Registration {
        self.use_instance(Instance::from_rc(value))
    }

    /// Resolve another key instead of the declared one.
    pub fn use_key(self, key: impl Into<Key>) -> &'r mut Registration {
        let key = key.into();
        self.call(move |c, _| c.resolve(&key))
    }
}

fn instance_factory<F>(factory: F) -> InstanceFactory
where
    F: Fn(&Container) -> Result<Option<Instance>, ResolveError> + 'static,
{
    Rc::new(factory)
}

fn construct_with<T: Constructible>() -> InstanceFactory {
    let parameters: OnceCell<Rc<[Parameter]>> = OnceCell::new();
    instance_factory(move |container| {
        let parameters = parameters.get_or_try_init(read_parameters::<T>)?.clone();
        let mut values = Vec::with_capacity(parameters.len());
        for parameter in parameters.iter() {
            values.push((parameter.name(), container.resolve_parameter(parameter)?));
        }
        let mut args = Arguments::new(type_name::<T>(), values);
        let value = T::construct(&mut args)?;
        args.finish()?;
        Ok(Some(Instance::new(value)))
    })
}

/// Read the parameter list of `T` once, checking that indices follow positions.
fn read_parameters<T: Constructible>() -> Result<Rc<[Parameter]>, ResolveError> {
    let parameters = T::parameters();
    if let Some((position, parameter)) = parameters
        .iter()
        .enumerate()
        .find(|(position, p)| p.index() != *position)
    {
        return Err(ResolveError::Declaration {
            target: type_name::<T>().to_string(),
            reason: format!(
                "parameter `{}` declares index {} at position {}",
                parameter.name(),
                parameter.index(),
                position
            ),
        });
    }
    Ok(parameters.into())
}
