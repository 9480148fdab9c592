//! Component storage - one index-addressable container per component type.
//!
//! Slots are addressed by entity id. Plain and pooled types use a sparse
//! `Vec<Option<T>>`; fixed types use a dense array with a presence bitset.
//! Pooled types keep removed instances, reset, for the next `create`.

use std::any::Any;

use fixedbitset::FixedBitSet;

use crate::{
    component::{Component, ComponentId, StorageStrategy},
    entity::Entity,
};

/// Slot layout chosen from the storage strategy.
enum Slots<T> {
    /// One optional instance per entity id.
    Sparse(Vec<Option<T>>),
    /// Inline records plus a presence bit per entity id.
    Packed { data: Vec<T>, present: FixedBitSet },
}

/// Storage for all instances of one component type.
pub struct ComponentStorage<T: Component> {
    /// Component this storage belongs to.
    id: ComponentId,
    /// Instances indexed by entity id.
    slots: Slots<T>,
    /// Reset instances waiting for reuse (pooled strategy only).
    pool: Vec<T>,
    /// Upper bound on `pool.len()`.
    pool_limit: usize,
    /// Number of live instances.
    len: usize,
}

impl<T: Component> ComponentStorage<T> {
    /// Create an empty storage.
    #[must_use]
    pub fn new(id: ComponentId) -> Self {
        Self::with_capacity(id, 0, usize::MAX)
    }

    /// Create a storage with room for `capacity` entity ids.
    #[must_use]
    pub fn with_capacity(id: ComponentId, capacity: usize, pool_limit: usize) -> Self {
        let slots = match T::STRATEGY {
            StorageStrategy::Fixed => Slots::Packed {
                data: Vec::with_capacity(capacity),
                present: FixedBitSet::with_capacity(capacity),
            },
            StorageStrategy::Plain | StorageStrategy::Pooled => {
                Slots::Sparse(Vec::with_capacity(capacity))
            }
        };

        Self {
            id,
            slots,
            pool: Vec::new(),
            pool_limit,
            len: 0,
        }
    }

    /// Component id of this storage.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Create an instance for `entity` and return a handle to it.
    ///
    /// Pooled storages hand out a previously reset instance when one is
    /// available; everything else starts from `T::default()`.
    pub fn create(&mut self, entity: Entity) -> &mut T {
        let value = match T::STRATEGY {
            StorageStrategy::Pooled => self.pool.pop().unwrap_or_default(),
            StorageStrategy::Plain | StorageStrategy::Fixed => T::default(),
        };
        self.insert(entity, value)
    }

    /// Store `value` for `entity`, recycling any instance it replaces.
    pub fn insert(&mut self, entity: Entity, value: T) -> &mut T {
        let index = entity.index();

        let replaced = match &mut self.slots {
            Slots::Sparse(slots) => {
                if index >= slots.len() {
                    slots.resize_with(index + 1, || None);
                }
                slots[index].replace(value)
            }
            Slots::Packed { data, present } => {
                if index >= data.len() {
                    data.resize_with(index + 1, T::default);
                    present.grow(index + 1);
                }
                let was_present = present.put(index);
                data[index] = value;
                // Fixed records have no identity to recycle.
                was_present.then(T::default)
            }
        };

        match replaced {
            Some(old) => self.recycle(old),
            None => self.len += 1,
        }

        match &mut self.slots {
            Slots::Sparse(slots) => slots[index].get_or_insert_with(T::default),
            Slots::Packed { data, .. } => &mut data[index],
        }
    }

    /// Get the instance for `entity`, if any.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        let index = entity.index();
        match &self.slots {
            Slots::Sparse(slots) => slots.get(index)?.as_ref(),
            Slots::Packed { data, present } => present.contains(index).then(|| &data[index]),
        }
    }

    /// Get the instance for `entity` mutably, if any.
    #[must_use]
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let index = entity.index();
        match &mut self.slots {
            Slots::Sparse(slots) => slots.get_mut(index)?.as_mut(),
            Slots::Packed { data, present } => {
                if present.contains(index) {
                    Some(&mut data[index])
                } else {
                    None
                }
            }
        }
    }

    /// Check if `entity` has an instance.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    /// Remove the instance for `entity`.
    ///
    /// Returns `true` if an instance was removed. `get` returns `None`
    /// afterwards until the next `create` or `insert` for that id.
    pub fn remove(&mut self, entity: Entity) -> bool {
        let index = entity.index();

        let removed = match &mut self.slots {
            Slots::Sparse(slots) => slots.get_mut(index).and_then(Option::take),
            Slots::Packed { data, present } => {
                if index < data.len() && present.contains(index) {
                    present.set(index, false);
                    data[index] = T::default();
                    Some(T::default())
                } else {
                    None
                }
            }
        };

        match removed {
            Some(old) => {
                self.len -= 1;
                self.recycle(old);
                true
            }
            None => false,
        }
    }

    /// Number of live instances.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if no entity has an instance.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of reset instances waiting in the pool.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    /// Iterate over `(entity, instance)` pairs in id order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (Entity, &T)> + '_> {
        match &self.slots {
            Slots::Sparse(slots) => Box::new(slots.iter().enumerate().filter_map(|(id, slot)| {
                slot.as_ref().map(|value| (Entity::from_raw(id as u32), value))
            })),
            Slots::Packed { data, present } => Box::new(
                present
                    .ones()
                    .map(move |id| (Entity::from_raw(id as u32), &data[id])),
            ),
        }
    }

    fn recycle(&mut self, mut value: T) {
        if T::STRATEGY == StorageStrategy::Pooled && self.pool.len() < self.pool_limit {
            value.reset();
            self.pool.push(value);
        }
    }
}

/// Boxed one-shot initializer applied to a freshly created instance.
pub(crate) type ErasedInit = Box<dyn FnOnce(&mut dyn Any) + Send>;

/// Type-erased view of a [`ComponentStorage`], one per registered type.
pub(crate) trait ErasedStorage: Send + Sync {
    fn remove(&mut self, entity: Entity) -> bool;
    fn create_default(&mut self, entity: Entity);
    fn create_with(&mut self, entity: Entity, init: ErasedInit);
    fn insert_boxed(&mut self, entity: Entity, value: Box<dyn Any + Send>) -> bool;
    fn get_any(&self, entity: Entity) -> Option<&dyn Any>;
    fn get_any_mut(&mut self, entity: Entity) -> Option<&mut dyn Any>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedStorage for ComponentStorage<T> {
    fn remove(&mut self, entity: Entity) -> bool {
        ComponentStorage::remove(self, entity)
    }

    fn create_default(&mut self, entity: Entity) {
        self.create(entity);
    }

    fn create_with(&mut self, entity: Entity, init: ErasedInit) {
        init(self.create(entity));
    }

    fn insert_boxed(&mut self, entity: Entity, value: Box<dyn Any + Send>) -> bool {
        match value.downcast::<T>() {
            Ok(value) => {
                self.insert(entity, *value);
                true
            }
            Err(_) => false,
        }
    }

    fn get_any(&self, entity: Entity) -> Option<&dyn Any> {
        self.get(entity).map(|value| value as &dyn Any)
    }

    fn get_any_mut(&mut self, entity: Entity) -> Option<&mut dyn Any> {
        self.get_mut(entity).map(|value| value as &mut dyn Any)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {}

    #[derive(Debug, Default, PartialEq)]
    struct Trail {
        length: u32,
        points: Vec<u32>,
    }

    impl Component for Trail {
        const STRATEGY: StorageStrategy = StorageStrategy::Pooled;

        fn reset(&mut self) {
            self.length = 0;
            self.points.clear();
        }
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Cell {
        row: u16,
        col: u16,
    }

    impl Component for Cell {
        const STRATEGY: StorageStrategy = StorageStrategy::Fixed;
    }

    fn e(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    #[test]
    fn test_storage_create_get_remove() {
        let mut storage = ComponentStorage::<Position>::new(ComponentId::from_raw(0));

        storage.create(e(5)).x = 3.0;
        assert_eq!(storage.get(e(5)), Some(&Position { x: 3.0, y: 0.0 }));
        assert_eq!(storage.len(), 1);
        assert!(storage.get(e(4)).is_none());

        assert!(storage.remove(e(5)));
        assert!(storage.get(e(5)).is_none());
        assert!(!storage.remove(e(5)));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_storage_insert_replaces() {
        let mut storage = ComponentStorage::<Position>::new(ComponentId::from_raw(0));

        storage.insert(e(0), Position { x: 1.0, y: 1.0 });
        storage.insert(e(0), Position { x: 2.0, y: 2.0 });

        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(e(0)).unwrap().x, 2.0);
    }

    #[test]
    fn test_pooled_storage_reuses_reset_instance() {
        let mut storage = ComponentStorage::<Trail>::new(ComponentId::from_raw(0));

        let trail = storage.create(e(1));
        trail.length = 9;
        trail.points.extend([1, 2, 3]);
        let capacity = trail.points.capacity();

        storage.remove(e(1));
        assert_eq!(storage.pooled(), 1);

        let reused = storage.create(e(2));
        assert_eq!(reused.length, 0);
        assert!(reused.points.is_empty());
        // Same allocation came back from the pool
        assert_eq!(reused.points.capacity(), capacity);
        assert_eq!(storage.pooled(), 0);
    }

    #[derive(Debug, Default)]
    struct Bag {
        coins: u32,
        items: Vec<u32>,
    }

    impl Component for Bag {
        const STRATEGY: StorageStrategy = StorageStrategy::Pooled;
    }

    #[test]
    fn test_pooled_default_reset_starts_over() {
        let mut storage = ComponentStorage::<Bag>::new(ComponentId::from_raw(0));

        let bag = storage.create(e(1));
        bag.coins = 42;
        bag.items.push(7);
        storage.remove(e(1));

        let reused = storage.create(e(2));
        assert_eq!(reused.coins, 0);
        assert!(reused.items.is_empty());
    }

    #[test]
    fn test_pool_limit() {
        let mut storage = ComponentStorage::<Trail>::with_capacity(ComponentId::from_raw(0), 4, 1);

        storage.create(e(0));
        storage.create(e(1));
        storage.remove(e(0));
        storage.remove(e(1));

        assert_eq!(storage.pooled(), 1);
    }

    #[test]
    fn test_fixed_storage() {
        let mut storage = ComponentStorage::<Cell>::new(ComponentId::from_raw(0));

        storage.insert(e(3), Cell { row: 1, col: 2 });
        assert_eq!(storage.get(e(3)), Some(&Cell { row: 1, col: 2 }));
        assert!(storage.get(e(2)).is_none());

        assert!(storage.remove(e(3)));
        assert!(storage.get(e(3)).is_none());

        // A fresh create starts from the zero record
        assert_eq!(*storage.create(e(3)), Cell::default());
        assert_eq!(storage.pooled(), 0);
    }

    #[test]
    fn test_storage_iter() {
        let mut storage = ComponentStorage::<Cell>::new(ComponentId::from_raw(0));
        storage.insert(e(4), Cell { row: 4, col: 0 });
        storage.insert(e(1), Cell { row: 1, col: 0 });

        let rows: Vec<_> = storage.iter().map(|(entity, c)| (entity.id(), c.row)).collect();
        assert_eq!(rows, vec![(1, 1), (4, 4)]);
    }

    #[test]
    fn test_erased_insert_wrong_type() {
        let mut storage = ComponentStorage::<Position>::new(ComponentId::from_raw(0));
        let erased: &mut dyn ErasedStorage = &mut storage;

        assert!(!erased.insert_boxed(e(0), Box::new(5u32)));
        assert!(erased.insert_boxed(e(0), Box::new(Position { x: 1.0, y: 0.0 })));
        assert!(erased.get_any(e(0)).is_some());
    }
}
