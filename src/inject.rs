use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::container::Container;
use crate::key::Key;
use crate::parameter::{Dependency, Parameter, ParameterHook};
use crate::registration::Registration;
use crate::resolve::{Arguments, FromArgument, ResolveError};
use crate::scope::Instance;

/// Builds new instances of a target, with caller-supplied values for some of its parameters.
///
/// Obtained from [Container::factory_for] or by declaring a [Dependency::Func]. Each call
/// resolves a one-off copy of the target registration that is never cached: the values
/// passed to [Factory::call] are paired in order with the parameter keys given when the
/// factory was created, and any parameter declaring one of these keys receives the paired
/// value. Other parameters resolve as usual.
#[derive(Clone)]
pub struct Factory {
    container: Weak<Container>,
    registration: Rc<Registration>,
    target: Key,
    parameters: Rc<[Key]>,
}

impl Factory {
    pub fn target(&self) -> &Key {
        &self.target
    }

    /// Keys of the parameters receiving explicit values.
    pub fn parameters(&self) -> &[Key] {
        &self.parameters
    }

    /// Build a new instance. Values beyond the declared parameter keys are ignored.
    pub fn call(&self, values: Vec<Instance>) -> Result<Instance, ResolveError> {
        let container = self.container.upgrade().ok_or(ResolveError::Disposed)?;
        let explicit: Rc<Vec<(Key, Instance)>> =
            Rc::new(self.parameters.iter().cloned().zip(values).collect());
        let lookup = explicit.clone();
        let hook = ParameterHook::new(
            move |p: &Parameter| p.key().is_some_and(|k| explicit.iter().any(|(key, _)| key == k)),
            move |_: &Container, p: &Parameter| {
                lookup
                    .iter()
                    .find(|(key, _)| Some(key) == p.key())
                    .map(|(_, value)| value.clone())
                    .ok_or_else(|| ResolveError::Unresolved {
                        key: format!("parameter `{}`", p.name()),
                    })
            },
        );
        let transient = Rc::new(self.registration.transient(hook));
        container.resolve_with(&transient, &self.target)
    }

    /// Build a new instance and view it as an `Rc<T>`.
    pub fn create<T: ?Sized + 'static>(&self, values: Vec<Instance>) -> Result<Rc<T>, ResolveError> {
        self.call(values)?
            .downcast::<T>()
            .ok_or_else(|| ResolveError::mismatch::<T>(&self.target))
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("target", &self.target)
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl Container {
    /// Factory building `target`, taking explicit values for the parameters declaring
    /// the `parameters` keys.
    pub fn factory_for(&self, target: &Key, parameters: Vec<Key>) -> Result<Factory, ResolveError> {
        Ok(Factory {
            container: self.weak(),
            registration: self.registration_for(target)?,
            target: target.clone(),
            parameters: parameters.into(),
        })
    }

    /// Bind a plain function to this container.
    ///
    /// Each call of the returned closure resolves the function's arguments from their
    /// types, calls it and returns its result.
    pub fn resolve_function<Args, Ret, F>(&self, function: F) -> impl Fn() -> Result<Ret, ResolveError>
    where
        Args: Injectable,
        F: Callable<Args, Ret>,
    {
        self.resolve_function_with(function, Vec::new())
    }

    /// Like [Container::resolve_function], with local values taking precedence over the
    /// container for the given keys.
    pub fn resolve_function_with<Args, Ret, F>(
        &self,
        function: F,
        locals: impl IntoIterator<Item = (Key, Instance)>,
    ) -> impl Fn() -> Result<Ret, ResolveError>
    where
        Args: Injectable,
        F: Callable<Args, Ret>,
    {
        let container = self.weak();
        let locals: HashMap<Key, Instance> = locals.into_iter().collect();
        move || {
            let container = container.upgrade().ok_or(ResolveError::Disposed)?;
            let parameters = Args::parameters();
            let mut values = Vec::with_capacity(parameters.len());
            for parameter in &parameters {
                let value = match parameter.key().and_then(|k| locals.get(k)) {
                    Some(local) => Some(local.clone()),
                    None => match parameter.dependency() {
                        Some(dependency) => container.resolve_dependency(dependency)?,
                        None => None,
                    },
                };
                values.push((parameter.name(), value));
            }
            let mut args = Arguments::new(type_name::<F>(), values);
            let injected = Args::extract(&mut args)?;
            args.finish()?;
            Ok(function.call(injected))
        }
    }
}

/// Generic trait for functions that can be called with a tuple of arguments.
///
/// This allows functions with any number of parameters to be handled as a single type.
pub trait Callable<Args, Ret> {
    fn call(&self, args: Args) -> Ret;
}

/// Tuple of argument types that can be resolved by a container.
pub trait Injectable: Sized {
    /// One parameter per tuple element, declaring the element's dependency.
    fn parameters() -> Vec<Parameter>;

    fn extract(args: &mut Arguments) -> Result<Self, ResolveError>;
}

macro_rules! callable_tuple ({ $($param:ident)* } => {
    impl<Func, Ret, $($param,)*> Callable<($($param,)*), Ret> for Func
    where
        Func: Fn($($param),*) -> Ret,
    {
        #[inline]
        #[allow(non_snake_case)]
        fn call(&self, ($($param,)*): ($($param,)*)) -> Ret {
            (self)($($param,)*)
        }
    }

    // Resolve such tuples element by element
    #[allow(clippy::unused_unit)]
    impl<$($param: FromArgument,)*> Injectable for ($($param,)*) {
        fn parameters() -> Vec<Parameter> {
            let declared: Vec<(&'static str, Dependency)> =
                vec![$((stringify!($param), <$param as FromArgument>::dependency()),)*];
            declared
                .into_iter()
                .enumerate()
                .map(|(index, (name, dependency))| Parameter::new(name, index, dependency))
                .collect()
        }

        #[allow(unused_variables)]
        fn extract(args: &mut Arguments) -> Result<Self, ResolveError> {
            Ok(($(args.next::<$param>()?,)*))
        }
    }
});

callable_tuple! {}
callable_tuple! { A }
callable_tuple! { A B }
callable_tuple! { A B C }
callable_tuple! { A B C D }
callable_tuple! { A B C D E }
callable_tuple! { A B C D E F }
callable_tuple! { A B C D E F G }
callable_tuple! { A B C D E F G H }
callable_tuple! { A B C D E F G H I }
callable_tuple! { A B C D E F G H I J }
