use crate::key::Key;
use crate::parameter::Dependency;
use crate::resolve::Constructible;
use crate::scope::Instance;

/// Dependency on the registration bound to the type `T`.
pub fn dependency<T: ?Sized + 'static>() -> Dependency {
    Dependency::Key(Key::of::<T>())
}

/// Dependency on `T`, which is constructed directly if nothing is registered for it.
pub fn construct<T: Constructible>() -> Dependency {
    Dependency::Key(Key::constructible::<T>())
}

/// Dependency on an arbitrary key.
pub fn key(key: impl Into<Key>) -> Dependency {
    Dependency::Key(key.into())
}

/// Use `default` when nothing is registered for `dependency`.
pub fn optional(dependency: impl Into<Dependency>, default: Option<Instance>) -> Dependency {
    Dependency::Optional {
        dependency: Box::new(dependency.into()),
        default,
    }
}

/// Dependency declared as `T` but resolved through the string key `name`.
pub fn named<T: ?Sized + 'static>(name: &str) -> Dependency {
    Dependency::Named {
        ty: Key::of::<T>(),
        name: Key::named(name),
    }
}

/// Every registration bound to `T`, as a `Vec<Instance>`.
pub fn all<T: ?Sized + 'static>() -> Dependency {
    Dependency::All(Key::of::<T>())
}

/// A [Factory](crate::Factory) for `target` taking explicit values for `parameters`.
pub fn func(target: impl Into<Key>, parameters: Vec<Key>) -> Dependency {
    Dependency::Func {
        target: target.into(),
        parameters,
    }
}

/// Declare how the container constructs a type.
///
/// This macro implements [Constructible](crate::Constructible) for `$type`. The constructor is an
/// associated function of the type and receives one argument per listed dependency, in order.
/// Each dependency is an expression converting into a [Dependency](crate::Dependency), usually
/// built with the helpers of this crate, and is named after the constructor parameter so that
/// parameter hooks can select it by name.
///
/// A type implementing `Default` can omit the constructor. Prefixing the type with `dispose`
/// makes the instances tracked for disposal, which requires a [Dispose](crate::Dispose) implementation.
///
/// ```
/// use std::rc::Rc;
/// use arbor::{constructible, dependency, Builder};
///
/// #[derive(Default)]
/// struct Clock;
///
/// struct Greeter {
///     clock: Rc<Clock>,
///     greeting: Rc<String>,
/// }
///
/// impl Greeter {
///     fn new(clock: Rc<Clock>, greeting: Rc<String>) -> Self {
///         Greeter { clock, greeting }
///     }
/// }
///
/// constructible!(Clock);
/// constructible!(Greeter, new, clock: dependency::<Clock>(), greeting: dependency::<String>());
///
/// let mut builder = Builder::new();
/// builder.register_type::<Clock>().once();
/// builder.register_value(String::from("hello"));
/// let container = builder.build().unwrap();
/// let greeter = container.construct::<Greeter>().unwrap();
/// assert_eq!(greeter.greeting.as_str(), "hello");
/// ```
#[macro_export]
macro_rules! constructible {
    (@impl $type:ty, $constructor:ident $(, $name:ident : $dependency:expr)* ; { $($extra:tt)* }) => {
        impl $crate::Constructible for $type {
            fn parameters() -> ::std::vec::Vec<$crate::Parameter> {
                let declared: ::std::vec::Vec<(&'static str, $crate::Dependency)> =
                    vec![$((stringify!($name), $crate::Dependency::from($dependency)),)*];
                declared
                    .into_iter()
                    .enumerate()
                    .map(|(index, (name, dependency))| $crate::Parameter::new(name, index, dependency))
                    .collect()
            }

            #[allow(unused_variables)]
            fn construct(args: &mut $crate::Arguments) -> ::std::result::Result<Self, $crate::ResolveError> {
                Ok(<$type>::$constructor($({
                    let _ = stringify!($name);
                    args.next()?
                }),*))
            }

            $($extra)*
        }
    };
    (dispose $type:ty) => {
        $crate::constructible!(dispose $type, default);
    };
    (dispose $type:ty, $constructor:ident $(, $name:ident : $dependency:expr)* $(,)?) => {
        $crate::constructible!(@impl $type, $constructor $(, $name : $dependency)* ; {
            fn as_disposable(
                self: ::std::rc::Rc<Self>,
            ) -> ::std::option::Option<::std::rc::Rc<dyn $crate::Dispose>> {
                Some(self)
            }
        });
    };
    ($type:ty) => {
        $crate::constructible!($type, default);
    };
    ($type:ty, $constructor:ident $(, $name:ident : $dependency:expr)* $(,)?) => {
        $crate::constructible!(@impl $type, $constructor $(, $name : $dependency)* ; {});
    };
}
