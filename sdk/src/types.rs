//! Identity types shared between engine components

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_OBSERVABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a spawned actor task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(u64);

impl ActorId {
    /// Allocate a fresh, never reused id
    pub fn next() -> Self {
        Self(NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Identity of an observable slot of state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObservableId(u64);

impl ObservableId {
    /// Allocate a fresh, never reused id
    pub fn next() -> Self {
        Self(NEXT_OBSERVABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObservableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observable#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_not_reused() {
        let a = ActorId::next();
        let b = ActorId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());

        let x = ObservableId::next();
        let y = ObservableId::next();
        assert_ne!(x, y);
    }

    #[test]
    fn test_display() {
        let id = ObservableId::next();
        assert_eq!(id.to_string(), format!("observable#{}", id.as_u64()));
    }
}
