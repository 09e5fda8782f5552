//! Logical clock over the object registry.
//!
//! Every mutation batch committed through a [`crate::registry::RegistryWriter`] advances the
//! clock exactly once. Snapshots are tagged with the version they were computed against, so
//! staleness is a single integer comparison.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct WorldVersion(u64);
impl WorldVersion {
    /// Tag for snapshots restored from disk. Older than any live version, so a restored
    /// snapshot is always stale once the registry has been touched.
    pub const RESTORED: Self = Self(0);
    /// Version of a freshly created registry.
    pub const INITIAL: Self = Self(1);
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
    /// A version tag read back from disk. Only meaningful for diagnostics.
    pub(crate) fn from_raw(version: u64) -> Self {
        Self(version)
    }
}
impl std::fmt::Display for WorldVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Monotonic counter of world versions.
#[derive(Debug)]
pub struct WorldClock(AtomicU64);
impl Default for WorldClock {
    fn default() -> Self {
        Self(AtomicU64::new(WorldVersion::INITIAL.0))
    }
}
impl WorldClock {
    #[must_use]
    pub fn current(&self) -> WorldVersion {
        WorldVersion(self.0.load(Ordering::Acquire))
    }
    /// Advance the clock, returning the new version.
    pub fn bump(&self) -> WorldVersion {
        WorldVersion(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn bump_is_monotonic() {
        let clock = WorldClock::default();
        assert_eq!(clock.current(), WorldVersion::INITIAL);
        let next = clock.bump();
        assert!(next > WorldVersion::INITIAL);
        assert_eq!(clock.current(), next);
        assert!(WorldVersion::RESTORED < WorldVersion::INITIAL);
    }
}
