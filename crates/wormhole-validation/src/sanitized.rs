//! Strings tagged with the check they passed.

use std::fmt;
use std::marker::PhantomData;

mod sealed {
    pub trait Sealed {}
}

/// What a [`Sanitized`] value was checked as. Sealed.
pub trait Kind: sealed::Sealed {}

macro_rules! kinds {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(());
            impl sealed::Sealed for $name {}
            impl Kind for $name {}
        )+
    };
}

kinds! {
    /// A single relay label.
    Subdomain,
    /// A dotted host name.
    Hostname,
    /// A `scheme://` URL.
    Url,
    /// A relay auth token.
    AuthToken,
}

/// A string that passed the check named by `K`.
///
/// Only this crate's `sanitize_*` functions construct one, so holding a
/// `Sanitized<Hostname>` means the value really is a hostname.
///
/// ```
/// use wormhole_validation::{Sanitized, Subdomain, sanitize_subdomain};
///
/// let sub: Sanitized<Subdomain> = sanitize_subdomain("MyHouse")?;
/// assert_eq!(sub.as_str(), "myhouse");
/// # Ok::<(), wormhole_validation::ValidationError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sanitized<K: Kind> {
    value: String,
    kind: PhantomData<K>,
}

impl<K: Kind> Sanitized<K> {
    pub(crate) fn checked(value: String) -> Self {
        Self {
            value,
            kind: PhantomData,
        }
    }

    /// Borrows the value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Takes the value.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.value
    }
}

impl<K: Kind> AsRef<str> for Sanitized<K> {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl<K: Kind> fmt::Display for Sanitized<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
