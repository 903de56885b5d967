//! Identity of registration targets.
//!
//! A [Key] is either a type identity or a caller-supplied string. The kind is decided when
//! the key is built, never inferred from the shape of a value at resolution time.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::registration::Registration;
use crate::resolve::Constructible;

/// Lookup key for registrations.
///
/// Two keys built from the same type, or from the same string, are always equal.
/// Equality and hashing only look at the [TypeId] or the string: the display name and the
/// optional synthesizer of a type key are not part of its identity.
#[derive(Clone)]
pub enum Key {
    /// Identity of a Rust type, including unsized ones such as `dyn Trait` or `str`
    Type(TypeKey),
    /// Identity chosen by the caller
    Name(Rc<str>),
}

/// Type half of [Key].
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    synthesize: Option<fn() -> Registration>,
}

impl Key {
    /// Key of any type. Resolving it fails if nothing is registered.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Key::Type(TypeKey {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            synthesize: None,
        })
    }

    /// Key of a constructible type.
    ///
    /// When nothing is registered for it, the container builds the type directly
    /// instead of failing.
    pub fn constructible<T: Constructible>() -> Self {
        Key::Type(TypeKey {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            synthesize: Some(Registration::implicit::<T>),
        })
    }

    /// Key identified by a string.
    pub fn named(name: impl Into<Rc<str>>) -> Self {
        Key::Name(name.into())
    }

    /// Human-readable form: the type name or the string.
    pub fn display_name(&self) -> &str {
        match self {
            Key::Type(t) => t.name,
            Key::Name(name) => name,
        }
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Key::Type(_))
    }

    /// True if resolving this key without a registration builds the type directly.
    pub fn is_constructible(&self) -> bool {
        matches!(
            self,
            Key::Type(TypeKey {
                synthesize: Some(_),
                ..
            })
        )
    }

    /// Registration used when this key has no explicit registration, if the key allows it.
    pub(crate) fn synthesize(&self) -> Option<Registration> {
        match self {
            Key::Type(TypeKey {
                synthesize: Some(make),
                ..
            }) => Some(make()),
            _ => None,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Type(a), Key::Type(b)) => a.id == b.id,
            (Key::Name(a), Key::Name(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Type(t) => {
                0u8.hash(state);
                t.id.hash(state);
            }
            Key::Name(name) => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Type(t) => f.write_str(t.name),
            Key::Name(name) => write!(f, "\"{}\"", name),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Type(t) => write!(f, "Key::Type({})", t.name),
            Key::Name(name) => write!(f, "Key::Name({:?})", name),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::named(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::named(name)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}
