use super::{Category, CategoryID, Element, ElementID, Object, ObjectID, Registry};
use crate::world::WorldClock;
use std::sync::Arc;

/// A change that may affect containment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    CategoryInserted(CategoryID),
    CategoryVisibility {
        category: CategoryID,
        visible: bool,
    },
    ObjectInserted(ObjectID),
    ObjectRemoved(ObjectID),
    ElementInserted {
        object: ObjectID,
        element: ElementID,
    },
    ElementReplaced {
        object: ObjectID,
        element: ElementID,
    },
    ElementRemoved {
        object: ObjectID,
        element: ElementID,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("no category {0}")]
    UnknownCategory(CategoryID),
    #[error("no object {0}")]
    UnknownObject(ObjectID),
    #[error("no element {element} in {object}")]
    UnknownElement {
        object: ObjectID,
        element: ElementID,
    },
    #[error("object {0} already exists")]
    DuplicateObject(ObjectID),
}

pub struct RegistryWriter<'a> {
    pub(super) lock: parking_lot::RwLockWriteGuard<'a, Registry>,
    pub(super) clock: &'a WorldClock,
    // Optimize for exactly one mutation (the most common case)
    pub(super) mutations: smallvec::SmallVec<[Mutation; 1]>,
}
// Bump happens while the write lock is still held, so no reader can observe new
// registry contents paired with an old version.
impl Drop for RegistryWriter<'_> {
    fn drop(&mut self) {
        if self.mutations.is_empty() {
            return;
        }
        let version = self.clock.bump();
        log::debug!(
            "registry advanced to {version} after {} mutation(s)",
            self.mutations.len()
        );
        log::trace!("mutations: {:#?}", self.mutations);
    }
}
impl RegistryWriter<'_> {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.mutations.is_empty()
    }
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.lock
    }
    /// Insert or replace a category.
    pub fn insert_category(&mut self, category: Category) -> CategoryID {
        let id = category.id;
        self.lock.categories.insert(id, category);
        self.mutations.push(Mutation::CategoryInserted(id));
        id
    }
    /// Returns the previous visibility. Setting the current value is not a mutation.
    pub fn set_category_visible(
        &mut self,
        category: CategoryID,
        visible: bool,
    ) -> Result<bool, WriteError> {
        let entry = self
            .lock
            .categories
            .get_mut(&category)
            .ok_or(WriteError::UnknownCategory(category))?;
        let previous = std::mem::replace(&mut entry.visible, visible);
        if previous != visible {
            self.mutations
                .push(Mutation::CategoryVisibility { category, visible });
        }
        Ok(previous)
    }
    pub fn insert_object(&mut self, object: Object) -> Result<ObjectID, WriteError> {
        let id = object.id;
        if !self.lock.categories.contains_key(&object.category) {
            return Err(WriteError::UnknownCategory(object.category));
        }
        if self.lock.objects.contains_key(&id) {
            return Err(WriteError::DuplicateObject(id));
        }
        self.lock.objects.insert(id, Arc::new(object));
        self.mutations.push(Mutation::ObjectInserted(id));
        Ok(id)
    }
    pub fn remove_object(&mut self, id: ObjectID) -> Result<Arc<Object>, WriteError> {
        let removed = self
            .lock
            .objects
            .remove(&id)
            .ok_or(WriteError::UnknownObject(id))?;
        self.mutations.push(Mutation::ObjectRemoved(id));
        Ok(removed)
    }
    fn object_mut(&mut self, id: ObjectID) -> Result<&mut Object, WriteError> {
        self.lock
            .objects
            .get_mut(&id)
            .map(Arc::make_mut)
            .ok_or(WriteError::UnknownObject(id))
    }
    pub fn push_element(
        &mut self,
        object: ObjectID,
        element: Element,
    ) -> Result<ElementID, WriteError> {
        let id = element.id;
        self.object_mut(object)?.elements.push(element);
        self.mutations.push(Mutation::ElementInserted {
            object,
            element: id,
        });
        Ok(id)
    }
    /// Swap in a new version of an element with the same id. Masks are never edited in place;
    /// this is how geometry changes.
    pub fn replace_element(
        &mut self,
        object: ObjectID,
        element: Element,
    ) -> Result<Element, WriteError> {
        let id = element.id;
        let slot = self
            .object_mut(object)?
            .elements
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(WriteError::UnknownElement {
                object,
                element: id,
            })?;
        let old = std::mem::replace(slot, element);
        self.mutations.push(Mutation::ElementReplaced {
            object,
            element: id,
        });
        Ok(old)
    }
    pub fn remove_element(
        &mut self,
        object: ObjectID,
        element: ElementID,
    ) -> Result<Element, WriteError> {
        let elements = &mut self.object_mut(object)?.elements;
        let idx = elements
            .iter()
            .position(|e| e.id == element)
            .ok_or(WriteError::UnknownElement { object, element })?;
        let removed = elements.remove(idx);
        self.mutations
            .push(Mutation::ElementRemoved { object, element });
        Ok(removed)
    }
}

#[cfg(test)]
mod test {
    use super::super::{CategoryKind, ElementMode, SharedRegistry};
    use super::*;
    use crate::raster::{CanvasSize, Mask};

    fn element(category: CategoryID) -> Element {
        let mask = Mask::from_pixels(CanvasSize::new(8, 8), [(1, 1)]);
        Element::with_mask(category, ElementMode::Filled, Arc::new([]), mask)
    }

    #[test]
    fn one_bump_per_scope() {
        let shared = SharedRegistry::default();
        let before = shared.version();
        let object = shared.write_with(|w| {
            let category = w.insert_category(Category::new("c", CategoryKind::Component));
            let object = w
                .insert_object(Object::new(category, [element(category)]))
                .unwrap();
            w.set_category_visible(category, false).unwrap();
            object
        });
        let after = shared.version();
        assert_eq!(after.get(), before.get() + 1);
        assert!(shared.read().contains_object(object));
    }
    #[test]
    fn no_op_scope_keeps_version() {
        let shared = SharedRegistry::default();
        let category =
            shared.write_with(|w| w.insert_category(Category::new("c", CategoryKind::Component)));
        let before = shared.version();
        shared.write_with(|w| {
            // Already visible.
            assert!(w.set_category_visible(category, true).unwrap());
            assert!(!w.changed());
        });
        assert_eq!(shared.version(), before);
    }
    #[test]
    fn failed_writes_report() {
        let shared = SharedRegistry::default();
        let missing = CategoryID::default();
        let err = shared.write_with(|w| w.insert_object(Object::new(missing, [])));
        assert_eq!(err, Err(WriteError::UnknownCategory(missing)));
        let ghost = ObjectID::default();
        let err = shared.write_with(|w| w.remove_object(ghost).map(|_| ()));
        assert_eq!(err, Err(WriteError::UnknownObject(ghost)));
    }
    #[test]
    fn element_edits() {
        let shared = SharedRegistry::default();
        let (object, first) = shared.write_with(|w| {
            let category = w.insert_category(Category::new("c", CategoryKind::Component));
            let first = element(category);
            let first_id = first.id;
            let object = w.insert_object(Object::new(category, [first])).unwrap();
            (object, first_id)
        });
        let (forked, _) = shared.fork();
        let v = shared.version();
        shared.write_with(|w| {
            let category = w.registry().object(object).unwrap().category;
            let mut replacement = element(category);
            replacement.id = first;
            w.replace_element(object, replacement).unwrap();
            w.push_element(object, element(category)).unwrap();
            w.remove_element(object, first).unwrap();
        });
        assert!(shared.version() > v);
        assert_eq!(shared.read().object(object).unwrap().elements.len(), 1);
        // Forks are unaffected by later writes.
        assert_eq!(forked.object(object).unwrap().elements[0].id, first);
    }
}
