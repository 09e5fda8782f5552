//! # IDs
//! Everything the engine refers to across a save/load cycle needs an identity that survives
//! the cycle. This is implemented in this module via the `StableID<T>` type, a random UUID
//! namespaced by the type T.
//!
//! To get a fresh ID, simply use `StableID<YourNamespaceTy>`'s `Default` impl. To restore one
//! from disk, use [`StableID::from_bytes`].

/// ID that is stable across saves and reloads of a workspace.
/// IDs with different types may share a value but should not be considered equal.
pub struct StableID<T: std::any::Any> {
    id: uuid::Uuid,
    // Namespace marker. `fn() -> T` keeps the ID Send + Sync regardless of T,
    // as we never actually store a T.
    _phantom: std::marker::PhantomData<fn() -> T>,
}
impl<T: std::any::Any> Clone for StableID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: std::any::Any> Copy for StableID<T> {}
impl<T: std::any::Any> std::cmp::PartialEq<StableID<T>> for StableID<T> {
    fn eq(&self, other: &StableID<T>) -> bool {
        // Namespace already checked at compile time.
        self.id == other.id
    }
}
impl<T: std::any::Any> std::cmp::Eq for StableID<T> {}
impl<T: std::any::Any> std::cmp::PartialOrd for StableID<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T: std::any::Any> std::cmp::Ord for StableID<T> {
    /// Order is arbitrary but stable between runs.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}
impl<T: std::any::Any> std::hash::Hash for StableID<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: std::any::Any> StableID<T> {
    /// Allocate a new random ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            _phantom: std::marker::PhantomData,
        }
    }
    /// Restore an ID from its raw bytes, as written by [`Self::to_bytes`].
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self {
            id: uuid::Uuid::from_bytes(bytes),
            _phantom: std::marker::PhantomData,
        }
    }
    #[must_use]
    pub fn to_bytes(self) -> [u8; 16] {
        self.id.into_bytes()
    }
    #[must_use]
    pub fn uuid(&self) -> uuid::Uuid {
        self.id
    }
    /// Short name of the namespace, e.g. `Object` for `StableID<Object>`.
    fn namespace() -> &'static str {
        // rsplit always yields at least one element, even for empty strings.
        std::any::type_name::<T>()
            .rsplit("::")
            .next()
            .unwrap_or_default()
    }
}
impl<T: std::any::Any> Default for StableID<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T: std::any::Any> std::fmt::Display for StableID<T> {
    /// Abbreviated, for logs. Use `Debug` for the full UUID.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let simple = self.id.simple().to_string();
        write!(f, "{}#{}", Self::namespace(), &simple[..8])
    }
}

impl<T: std::any::Any> std::fmt::Debug for StableID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", Self::namespace(), self.id.hyphenated())
    }
}
#[cfg(test)]
mod test {
    use super::StableID;

    #[test]
    fn many_ids_unique() {
        // Local namespace for testing.
        struct Namespace;
        type TestID = StableID<Namespace>;

        let mut v: Vec<_> = (0..1024).map(|_| TestID::new()).collect();
        v.sort_unstable();
        let length_before = v.len();
        v.dedup();

        assert_eq!(length_before, v.len(), "had duplicate ids");
    }
    #[test]
    fn survives_bytes() {
        struct Namespace;
        type TestID = StableID<Namespace>;

        let id = TestID::new();
        assert_eq!(TestID::from_bytes(id.to_bytes()), id);
    }
    #[test]
    fn display_is_namespaced() {
        struct Namespace;
        type TestID = StableID<Namespace>;

        let id = TestID::from_bytes([0xAB; 16]);
        assert_eq!(id.to_string(), "Namespace#abababab");
        assert_eq!(
            format!("{id:?}"),
            "Namespace#abababab-abab-abab-abab-abababababab"
        );
    }
}
