//! Densely indexed arenas keyed by opaque, `u32`-backed entity handles.
//!
//! Everything in this crate exists to avoid writing `Vec<T>` + "index is
//! actually a `BlockId`" comments by hand. An entity reference is a newtype
//! around a `u32`; a `PrimaryMap` owns the data an entity refers to, and a
//! `SecondaryMap` attaches additional, independently-resizable data to
//! entities defined elsewhere.

mod keys;
mod packed_option;
mod primary_map;
mod secondary_map;

pub use keys::{EntityRef, Keys};
pub use packed_option::{PackedOption, ReservedValue};
pub use primary_map::PrimaryMap;
pub use secondary_map::SecondaryMap;

/// Implement the `EntityRef` boilerplate for a tuple struct wrapping a `u32`.
///
/// `entity_impl!(Value)` implements `EntityRef`, `Default` (as the reserved
/// value), `Display`, and `Debug` in terms of a `prefix` used by the textual
/// printer (e.g. `v12`, `block3`).
#[macro_export]
macro_rules! entity_impl {
    ($entity:ident) => {
        impl $crate::EntityRef for $entity {
            fn new(index: usize) -> Self {
                debug_assert!(index < (u32::MAX as usize));
                $entity(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl $crate::ReservedValue for $entity {
            fn reserved_value() -> Self {
                $entity(u32::MAX)
            }

            fn is_reserved_value(&self) -> bool {
                self.0 == u32::MAX
            }
        }

        impl Default for $entity {
            fn default() -> Self {
                $crate::ReservedValue::reserved_value()
            }
        }
    };

    ($entity:ident, $display_prefix:expr) => {
        entity_impl!($entity);

        impl ::core::fmt::Display for $entity {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                write!(f, "{}{}", $display_prefix, self.0)
            }
        }

        impl ::core::fmt::Debug for $entity {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                (self as &dyn ::core::fmt::Display).fmt(f)
            }
        }
    };
}
