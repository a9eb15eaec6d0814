//! Process-unique resource identifiers.
//!
//! Every buffer and image instance draws its id from a global atomic
//! counter at creation, so an id is never reused within a process.
//! Dependents may therefore cache `(id, sub-range)` keys and re-resolve
//! them through the [`registry`](crate::registry) without risking
//! confusion with a later resource.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! instance_ids {
    ($(#[$attr:meta] $name:ident : $counter:ident;)*) => {
        $(
            static $counter: AtomicU64 = AtomicU64::new(1);

            #[$attr]
            #[repr(transparent)]
            #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(NonZeroU64);

            impl $name {
                /// Allocates the next id. Called once per instance creation.
                pub(crate) fn next() -> Self {
                    let raw = $counter.fetch_add(1, Ordering::Relaxed);
                    Self(NonZeroU64::new(raw).unwrap())
                }

                /// The raw numeric value, for logging and external maps.
                pub fn raw(self) -> u64 {
                    self.0.get()
                }
            }

            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }
        )*
    };
}

instance_ids! {
    /// Identity of one buffer instance.
    BufferId: NEXT_BUFFER_ID;
    /// Identity of one image instance.
    ImageId: NEXT_IMAGE_ID;
}

/// Identity of one tracking context.
///
/// A context is an isolated bookkeeping namespace for one independently
/// recorded operation sequence; the engine's default path uses one per
/// in-flight frame. The value is chosen by the recording layer, not
/// allocated here. State assigned under one context is never visible to
/// queries under another.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_monotonic() {
        let a = BufferId::next();
        let b = BufferId::next();
        assert!(a < b);
        assert_ne!(a.raw(), b.raw());
        // Counters are independent per resource kind.
        let i = ImageId::next();
        assert!(i.raw() >= 1);
    }
}
