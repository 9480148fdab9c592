//! Entity identifiers and the id allocator.
//!
//! Entities are plain integer handles. Released ids go onto a free list and
//! are handed out again before the high-water mark grows. The world only
//! releases an id after every subscription has observed its deletion, so a
//! recycled id never shows up in a stale live set.

use std::{fmt, ops::Range};

use bitflags::bitflags;

use crate::error::{EcsError, EcsResult};

/// Raw entity index.
pub type EntityId = u32;

/// A unique identifier for an entity in the world.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(EntityId);

impl Entity {
    /// Create an entity handle from a raw id.
    #[must_use]
    pub const fn from_raw(id: EntityId) -> Self {
        Self(id)
    }

    /// Get the raw id.
    #[must_use]
    pub const fn id(self) -> EntityId {
        self.0
    }

    /// Index into per-entity tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Lifecycle state of one id slot.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SlotState: u8 {
        /// Handed out by the allocator and not yet released.
        const ALLOCATED = 1;
        /// First composition commit has landed.
        const ACTIVE = 1 << 1;
        /// Deleted by a committed transaction, waiting for release.
        const DELETED = 1 << 2;
    }
}

/// Allocator for entity ids.
///
/// Maintains a free list of released ids and the lifecycle state of every
/// slot below the high-water mark.
pub struct EntityAllocator {
    /// State for each id slot.
    slots: Vec<SlotState>,
    /// Free list of released ids. Entries claimed since by `allocate_exact`
    /// are skipped when popped.
    free_list: Vec<EntityId>,
    /// Ranges skipped over by `allocate_exact`, consumed like the free list.
    holes: Vec<Range<EntityId>>,
    /// Exclusive upper bound for `allocate_exact`.
    id_limit: EntityId,
    /// Number of allocated, not yet released ids.
    alive_count: u32,
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityAllocator {
    /// Create a new entity allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            holes: Vec::new(),
            id_limit: EntityId::MAX,
            alive_count: 0,
        }
    }

    /// Create an allocator with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity / 4),
            holes: Vec::new(),
            id_limit: EntityId::MAX,
            alive_count: 0,
        }
    }

    /// Reject `allocate_exact` for ids at or above `limit`.
    #[must_use]
    pub const fn with_id_limit(mut self, limit: EntityId) -> Self {
        self.id_limit = limit;
        self
    }

    /// Allocate an id, reusing the free list before growing.
    pub fn allocate(&mut self) -> Entity {
        self.alive_count += 1;

        let id = self.take_free().unwrap_or_else(|| {
            self.slots.push(SlotState::empty());
            (self.slots.len() - 1) as EntityId
        });
        self.slots[id as usize] = SlotState::ALLOCATED;
        Entity(id)
    }

    /// Pop a reusable id, dropping stale free-list and hole entries.
    fn take_free(&mut self) -> Option<EntityId> {
        while let Some(id) = self.free_list.pop() {
            if self.slots[id as usize].is_empty() {
                return Some(id);
            }
        }
        while let Some(range) = self.holes.last_mut() {
            match range.next() {
                Some(id) if self.slots[id as usize].is_empty() => return Some(id),
                Some(_) => {}
                None => {
                    self.holes.pop();
                }
            }
        }
        None
    }

    /// Allocate a specific id.
    ///
    /// Ids skipped over by growing the high-water mark are recorded as one
    /// range and handed out by later `allocate` calls. Fails with
    /// `IdOutOfRange` at or above the configured limit.
    pub fn allocate_exact(&mut self, entity: Entity) -> EcsResult<Entity> {
        if entity.id() >= self.id_limit {
            return Err(EcsError::IdOutOfRange {
                entity,
                limit: self.id_limit,
            });
        }

        let index = entity.index();
        if index < self.slots.len() {
            if self.slots[index].contains(SlotState::ALLOCATED) {
                return Err(EcsError::IdTaken(entity));
            }
        } else {
            let high_water = self.slots.len() as EntityId;
            if high_water < entity.id() {
                self.holes.push(high_water..entity.id());
            }
            self.slots.resize(index + 1, SlotState::empty());
        }

        self.slots[index] = SlotState::ALLOCATED;
        self.alive_count += 1;
        Ok(entity)
    }

    /// Return an id to the free list.
    ///
    /// Fails with `InvalidId` if the id is already free or was never allocated.
    pub fn release(&mut self, entity: Entity) -> EcsResult<()> {
        let slot = self
            .slots
            .get_mut(entity.index())
            .filter(|slot| slot.contains(SlotState::ALLOCATED))
            .ok_or(EcsError::InvalidId(entity))?;

        *slot = SlotState::empty();
        self.free_list.push(entity.id());
        self.alive_count -= 1;
        Ok(())
    }

    /// Mark an entity as active after its first composition commit.
    pub fn activate(&mut self, entity: Entity) {
        if let Some(slot) = self.slots.get_mut(entity.index()) {
            slot.insert(SlotState::ACTIVE);
        }
    }

    /// Mark an entity as deleted. It stays allocated until released.
    pub fn mark_deleted(&mut self, entity: Entity) {
        if let Some(slot) = self.slots.get_mut(entity.index()) {
            slot.remove(SlotState::ACTIVE);
            slot.insert(SlotState::DELETED);
        }
    }

    /// Lifecycle state of an id.
    #[must_use]
    pub fn state(&self, entity: Entity) -> SlotState {
        self.slots
            .get(entity.index())
            .copied()
            .unwrap_or_default()
    }

    /// Allocated and not deleted.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let state = self.state(entity);
        state.contains(SlotState::ALLOCATED) && !state.contains(SlotState::DELETED)
    }

    /// Alive and has had at least one composition commit.
    #[must_use]
    pub fn is_active(&self, entity: Entity) -> bool {
        self.state(entity).contains(SlotState::ACTIVE)
    }

    /// Check whether an id is sitting on the free list.
    #[must_use]
    pub fn is_free(&self, entity: Entity) -> bool {
        entity.index() < self.slots.len() && self.state(entity).is_empty()
    }

    /// Iterate over all active entities in id order.
    pub fn active(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.contains(SlotState::ACTIVE))
            .map(|(id, _)| Entity(id as EntityId))
    }

    /// Get the number of allocated, not yet released ids.
    #[must_use]
    pub const fn alive_count(&self) -> u32 {
        self.alive_count
    }

    /// Get the high-water mark.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
