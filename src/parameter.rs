//! Formal parameters of constructibles and the hooks that can override them.

use std::fmt;
use std::rc::Rc;

use crate::container::Container;
use crate::key::Key;
use crate::resolve::ResolveError;
use crate::scope::Instance;

/// What a parameter asks the container for.
#[derive(Clone, Debug)]
pub enum Dependency {
    /// Resolve the key
    Key(Key),
    /// Use the default when nothing is registered for the inner dependency
    Optional {
        dependency: Box<Dependency>,
        default: Option<Instance>,
    },
    /// Declared as `ty`, but resolved through the string key `name`
    Named { ty: Key, name: Key },
    /// Every registration bound to the key, in registration order
    All(Key),
    /// A [Factory](crate::Factory) for `target`, taking explicit values for `parameters`
    Func { target: Key, parameters: Vec<Key> },
}

impl Dependency {
    /// Declared dependency key, used to match hooks.
    pub fn key(&self) -> &Key {
        match self {
            Dependency::Key(key) | Dependency::All(key) => key,
            Dependency::Optional { dependency, .. } => dependency.key(),
            Dependency::Named { ty, .. } => ty,
            Dependency::Func { target, .. } => target,
        }
    }
}

impl From<Key> for Dependency {
    fn from(key: Key) -> Self {
        Dependency::Key(key)
    }
}

/// One formal argument of a constructible.
#[derive(Clone, Debug)]
pub struct Parameter {
    name: &'static str,
    index: usize,
    dependency: Option<Dependency>,
}

impl Parameter {
    pub fn new(name: &'static str, index: usize, dependency: impl Into<Option<Dependency>>) -> Self {
        Self {
            name,
            index,
            dependency: dependency.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn dependency(&self) -> Option<&Dependency> {
        self.dependency.as_ref()
    }

    /// Declared dependency key, if any.
    pub fn key(&self) -> Option<&Key> {
        self.dependency.as_ref().map(Dependency::key)
    }
}

/// Selects the parameters a hook applies to.
#[derive(Clone, Debug)]
pub enum ParameterSelector {
    Index(usize),
    Name(Rc<str>),
    Key(Key),
}

impl ParameterSelector {
    pub fn matches(&self, parameter: &Parameter) -> bool {
        match self {
            ParameterSelector::Index(index) => parameter.index == *index,
            ParameterSelector::Name(name) => parameter.name == &**name,
            ParameterSelector::Key(key) => parameter.key() == Some(key),
        }
    }
}

type Matcher = Rc<dyn Fn(&Parameter) -> bool>;
type HookResolver = Rc<dyn Fn(&Container, &Parameter) -> Result<Instance, ResolveError>>;

/// Overrides the value of matching parameters while its registration is being constructed.
#[derive(Clone)]
pub struct ParameterHook {
    matches: Matcher,
    resolve: HookResolver,
}

impl ParameterHook {
    pub fn new<M, R>(matches: M, resolve: R) -> Self
    where
        M: Fn(&Parameter) -> bool + 'static,
        R: Fn(&Container, &Parameter) -> Result<Instance, ResolveError> + 'static,
    {
        Self {
            matches: Rc::new(matches),
            resolve: Rc::new(resolve),
        }
    }

    /// Hook for the parameters picked by `selector`.
    pub fn select<R>(selector: ParameterSelector, resolve: R) -> Self
    where
        R: Fn(&Container, &Parameter) -> Result<Instance, ResolveError> + 'static,
    {
        Self::new(move |p| selector.matches(p), resolve)
    }

    pub fn matches(&self, parameter: &Parameter) -> bool {
        (self.matches)(parameter)
    }

    pub fn resolve(&self, container: &Container, parameter: &Parameter) -> Result<Instance, ResolveError> {
        (self.resolve)(container, parameter)
    }
}

impl fmt::Debug for ParameterHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParameterHook")
    }
}
