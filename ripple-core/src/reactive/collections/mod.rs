//! Reactive containers.
//!
//! Each container kind exposes an explicit accessor interface that calls
//! `track` on every read and `trigger` on every write that changes
//! something:
//!
//! | Container  | Reads track                          | Writes trigger                         |
//! |------------|--------------------------------------|----------------------------------------|
//! | [`Record`] | field name, `Iterate` for key lists  | field; plus `Iterate` on add/remove    |
//! | [`List`]   | `Index(i)`, `Length`, `Iterate`      | touched indices, `Length`, `Iterate`   |
//! | [`Map`]    | key, `Iterate`, `KeyIterate`         | key, `Iterate`; `KeyIterate` on add/remove |
//! | [`Set`]    | value as key, `Iterate`              | value as key, `Iterate`                |
//!
//! Handles are cheap to clone and compare by identity. Dropping the last
//! handle removes the container's buckets from the registry.

mod list;
mod map;
mod record;
mod set;

pub use list::List;
pub use map::Map;
pub use record::Record;
pub use set::Set;

use std::hash::Hash;
use std::rc::Rc;

use super::registry::Key;

/// A value usable as a key of a [`Map`] or a member of a [`Set`].
pub trait MapKey: Clone + Eq + Hash + 'static {
    /// The registry key reads and writes of this entry go through.
    fn to_key(&self) -> Key;
}

impl MapKey for String {
    fn to_key(&self) -> Key {
        Key::Str(Rc::from(self.as_str()))
    }
}

impl MapKey for Rc<str> {
    fn to_key(&self) -> Key {
        Key::Str(self.clone())
    }
}

impl MapKey for &'static str {
    fn to_key(&self) -> Key {
        Key::from(*self)
    }
}

impl MapKey for char {
    fn to_key(&self) -> Key {
        Key::Str(Rc::from(self.encode_utf8(&mut [0; 4]) as &str))
    }
}

impl MapKey for bool {
    fn to_key(&self) -> Key {
        Key::Bool(*self)
    }
}

impl MapKey for usize {
    fn to_key(&self) -> Key {
        Key::Index(*self)
    }
}

macro_rules! impl_int_key {
    ($variant:ident as $wide:ty: $($ty:ty),+) => {
        $(
            impl MapKey for $ty {
                fn to_key(&self) -> Key {
                    Key::$variant(<$wide>::from(*self))
                }
            }
        )+
    };
}

impl_int_key!(Int as i64: i8, i16, i32, i64);
impl_int_key!(Uint as u64: u8, u16, u32, u64);

/// Identity, cloning and runtime membership shared by every container
/// handle. Each handle is `{ inner: Rc<..> }` with a `handle: TargetHandle`
/// field inside.
macro_rules! impl_container_handle {
    ($name:ident<$($param:ident),+>) => {
        impl<$($param: 'static),+> $name<$($param),+> {
            pub fn id(&self) -> $crate::reactive::TargetId {
                self.inner.handle.id()
            }

            /// Whether the container was created by `runtime`.
            pub fn belongs_to(&self, runtime: &$crate::reactive::Runtime) -> bool {
                self.inner.handle.belongs_to(runtime)
            }
        }

        impl<$($param: 'static),+> Clone for $name<$($param),+> {
            fn clone(&self) -> Self {
                Self {
                    inner: ::std::rc::Rc::clone(&self.inner),
                }
            }
        }

        impl<$($param: 'static),+> PartialEq for $name<$($param),+> {
            fn eq(&self, other: &Self) -> bool {
                ::std::rc::Rc::ptr_eq(&self.inner, &other.inner)
            }
        }

        impl<$($param: 'static),+> Eq for $name<$($param),+> {}
    };
}

pub(crate) use impl_container_handle;
