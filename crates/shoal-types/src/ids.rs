//! Type-safe identifier wrappers around plain integers.
//!
//! Areas and stocks are assigned stable numeric identifiers at model setup.
//! Wrapping them in newtypes prevents accidentally passing a stock index
//! where an area identifier is expected.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `u32` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Create an identifier from its raw value.
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Return the inner raw value.
            pub const fn into_inner(self) -> u32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier of a model area, as written in the configuration.
    AreaId
}

define_id! {
    /// Index of a stock inside the ecosystem, assigned in configuration order.
    StockId
}

impl StockId {
    /// Return the identifier as a vector index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}
