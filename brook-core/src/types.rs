//! Strongly-typed identifiers for Brook entities.
//!
//! Explicit types prevent bugs from mixing up IDs. Partition ids are
//! 32-bit because they index a fixed, small partition vector; member and
//! generation counters are 64-bit so they never wrap in practice.

use std::fmt;

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps an unsigned integer and provides:
/// - Type safety (can't mix `PartitionId` with `MemberId`)
/// - Debug/Display formatting
/// - Zero-cost abstraction (same as the raw integer)
macro_rules! define_id {
    ($name:ident, $repr:ty, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name($repr);

        impl $name {
            /// Creates a new ID from a raw value.
            #[inline]
            #[must_use]
            pub const fn new(value: $repr) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> $repr {
                self.0
            }

            /// Returns the next ID in sequence.
            ///
            /// # Panics
            /// Panics if the ID would overflow.
            #[inline]
            #[must_use]
            pub const fn next(self) -> Self {
                assert!(self.0 < <$repr>::MAX, "ID overflow");
                Self(self.0 + 1)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for $repr {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(
    PartitionId,
    u32,
    "partition",
    "Index of a partition within its topic. Contiguous from zero."
);
define_id!(
    MemberId,
    u64,
    "member",
    "Group-scoped identifier for one consumer instance, assigned at join."
);
define_id!(
    Generation,
    u64,
    "generation",
    "Membership generation of a consumer group. Bumped on every join or leave."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = PartitionId::new(3);
        assert_eq!(id.get(), 3);
        assert_eq!(u32::from(id), 3);
        assert_eq!(PartitionId::from(3), id);
    }

    #[test]
    fn test_id_next() {
        assert_eq!(MemberId::new(7).next(), MemberId::new(8));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(format!("{}", Generation::new(2)), "generation-2");
        assert_eq!(format!("{:?}", PartitionId::new(1)), "partition(1)");
    }

    #[test]
    fn test_id_ordering() {
        assert!(Generation::new(1) < Generation::new(2));
    }
}
