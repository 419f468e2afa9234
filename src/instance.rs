//! # Application instance identity.
//!
//! [`InstanceId`] is the key under which resources are acquired and released.
//! Ids come from a process-wide counter, so an id is never handed out twice
//! within a process, even after the instance it named has been deleted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Opaque, comparable identity of one application instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Allocates a fresh identity.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value (for logs).
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..100).map(|_| InstanceId::new()).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn test_display() {
        let id = InstanceId::new();
        assert_eq!(id.to_string(), format!("instance#{}", id.as_u64()));
    }
}
