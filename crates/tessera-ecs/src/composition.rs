//! Composition table - the component bitset of every entity id.
//!
//! Bit `i` of an entity's row is set exactly when storage `i` holds a live
//! instance for it. Rows grow on demand, so registering new component types
//! never touches existing rows. Mutation is crate-private: only transaction
//! commits and archetype instantiation write here.

use fixedbitset::FixedBitSet;

use crate::{component::ComponentId, entity::Entity};

/// Per-entity composition bitsets indexed by entity id.
#[derive(Debug, Default)]
pub struct CompositionTable {
    rows: Vec<FixedBitSet>,
    /// Returned for ids without a row.
    empty: FixedBitSet,
}

impl CompositionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with rows for `capacity` entity ids.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            empty: FixedBitSet::new(),
        }
    }

    /// Composition of an entity. Unknown ids have the empty composition.
    #[must_use]
    pub fn get(&self, entity: Entity) -> &FixedBitSet {
        self.rows.get(entity.index()).unwrap_or(&self.empty)
    }

    /// Check a single bit.
    #[must_use]
    pub fn has(&self, entity: Entity, component: ComponentId) -> bool {
        self.get(entity).contains(component.index())
    }

    /// Component ids an entity carries, ascending.
    pub fn components(&self, entity: Entity) -> impl Iterator<Item = ComponentId> + '_ {
        self.get(entity)
            .ones()
            .map(|index| ComponentId::from_raw(index as u32))
    }

    fn row_mut(&mut self, entity: Entity) -> &mut FixedBitSet {
        let index = entity.index();
        if index >= self.rows.len() {
            self.rows.resize_with(index + 1, FixedBitSet::new);
        }
        &mut self.rows[index]
    }

    pub(crate) fn set_bit(&mut self, entity: Entity, component: ComponentId) {
        let row = self.row_mut(entity);
        row.grow(component.index() + 1);
        row.insert(component.index());
    }

    pub(crate) fn clear_bit(&mut self, entity: Entity, component: ComponentId) {
        if let Some(row) = self.rows.get_mut(entity.index()) {
            if component.index() < row.len() {
                row.set(component.index(), false);
            }
        }
    }

    /// Overwrite an entity's row in one step.
    pub(crate) fn replace(&mut self, entity: Entity, mask: &FixedBitSet) {
        self.row_mut(entity).clone_from(mask);
    }

    pub(crate) fn clear(&mut self, entity: Entity) {
        if let Some(row) = self.rows.get_mut(entity.index()) {
            row.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: u32) -> ComponentId {
        ComponentId::from_raw(id)
    }

    #[test]
    fn test_set_and_clear_bits() {
        let mut table = CompositionTable::new();
        let e = Entity::from_raw(3);

        table.set_bit(e, c(0));
        table.set_bit(e, c(5));
        assert!(table.has(e, c(5)));
        assert_eq!(table.components(e).collect::<Vec<_>>(), vec![c(0), c(5)]);

        table.clear_bit(e, c(0));
        assert_eq!(table.components(e).collect::<Vec<_>>(), vec![c(5)]);

        // Clearing past the row width is a no-op
        table.clear_bit(e, c(40));
        table.clear(e);
        assert!(table.get(e).is_clear());
    }

    #[test]
    fn test_unknown_entity_is_empty() {
        let table = CompositionTable::new();
        assert!(table.get(Entity::from_raw(100)).is_clear());
        assert!(!table.has(Entity::from_raw(100), c(0)));
    }

    #[test]
    fn test_replace_row() {
        let mut table = CompositionTable::with_capacity(4);
        let e = Entity::from_raw(1);
        table.set_bit(e, c(7));

        let mut mask = FixedBitSet::with_capacity(3);
        mask.insert(1);
        mask.insert(2);
        table.replace(e, &mask);

        assert_eq!(table.components(e).collect::<Vec<_>>(), vec![c(1), c(2)]);
    }
}
