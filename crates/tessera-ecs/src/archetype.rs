//! Archetypes - precompiled composition templates for bulk creation.
//!
//! An archetype is a fixed set of component types, resolved once into a
//! sorted id list and a composition mask. Instantiating one writes the mask
//! in a single step and creates a default instance per listed type, skipping
//! the per-operation diffing an edit transaction performs.
//!
//! ```ignore
//! let bullet = world.archetype(ArchetypeBuilder::new().add::<(Position, Velocity, Damage)>())?;
//! let spawned = world.instantiate_batch(&bullet, 1_000)?;
//! ```

use std::fmt;

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::{
    component::{ComponentId, ComponentRegistry, ComponentSet, ComponentType},
    error::{EcsError, EcsResult},
};

type ComponentList = SmallVec<[ComponentId; 8]>;

/// Unique identifier for an archetype.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The empty archetype (no components).
    pub const EMPTY: Self = Self(0);

    /// Create an archetype ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

/// An immutable composition template.
#[derive(Clone, PartialEq, Eq)]
pub struct Archetype {
    /// Unique identifier for this archetype.
    id: ArchetypeId,
    /// Sorted list of component IDs to instantiate.
    components: ComponentList,
    /// Composition written on instantiation.
    mask: FixedBitSet,
}

impl Archetype {
    fn new(id: ArchetypeId, components: ComponentList) -> Self {
        let width = components.last().map_or(0, |last| last.index() + 1);
        let mut mask = FixedBitSet::with_capacity(width);
        mask.extend(components.iter().map(|c| c.index()));

        Self {
            id,
            components,
            mask,
        }
    }

    /// Get the archetype ID.
    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Get the component IDs in this archetype (sorted).
    #[must_use]
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    /// Precomputed composition bitset.
    #[must_use]
    pub const fn mask(&self) -> &FixedBitSet {
        &self.mask
    }

    /// Check if this archetype contains a component type.
    #[must_use]
    pub fn contains(&self, component_id: ComponentId) -> bool {
        self.mask.contains(component_id.index())
    }

    /// Number of component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if this is the empty archetype.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("components", &self.components)
            .finish()
    }
}

#[derive(Clone, Copy, Debug)]
enum Entry {
    Type(ComponentType),
    Id(ComponentId),
}

/// Declarative archetype, resolved by [`ArchetypeStorage::build`].
///
/// Duplicate entries collapse. Starting from an existing archetype extends
/// or narrows it, similar to deriving one template from another.
#[derive(Clone, Debug, Default)]
pub struct ArchetypeBuilder {
    add: SmallVec<[Entry; 8]>,
    remove: SmallVec<[Entry; 2]>,
}

impl ArchetypeBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the components of an existing archetype.
    #[must_use]
    pub fn extend(parent: &Archetype) -> Self {
        Self {
            add: parent.components.iter().copied().map(Entry::Id).collect(),
            remove: SmallVec::new(),
        }
    }

    /// Add every type in `S`.
    #[must_use]
    pub fn add<S: ComponentSet>(mut self) -> Self {
        let mut types = Vec::new();
        S::collect_types(&mut types);
        self.add.extend(types.into_iter().map(Entry::Type));
        self
    }

    /// Add a component by id.
    #[must_use]
    pub fn add_id(mut self, id: ComponentId) -> Self {
        self.add.push(Entry::Id(id));
        self
    }

    /// Drop every type in `S`.
    #[must_use]
    pub fn remove<S: ComponentSet>(mut self) -> Self {
        let mut types = Vec::new();
        S::collect_types(&mut types);
        self.remove.extend(types.into_iter().map(Entry::Type));
        self
    }
}

fn resolve(entry: Entry, registry: &ComponentRegistry) -> EcsResult<ComponentId> {
    match entry {
        Entry::Type(ty) => registry.resolve(ty),
        Entry::Id(id) => registry.info(id).map(|info| info.id()),
    }
}

/// Storage for all archetypes in a world.
pub struct ArchetypeStorage {
    /// All archetypes.
    archetypes: Vec<Archetype>,
    /// Map from component set to archetype ID.
    /// Key is a sorted set of component IDs.
    archetype_map: HashMap<ComponentList, ArchetypeId, FxBuildHasher>,
}

impl Default for ArchetypeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchetypeStorage {
    /// Create new archetype storage with the empty archetype.
    #[must_use]
    pub fn new() -> Self {
        let mut storage = Self {
            archetypes: Vec::new(),
            archetype_map: HashMap::default(),
        };

        // Empty archetype at index 0
        storage
            .archetypes
            .push(Archetype::new(ArchetypeId::EMPTY, SmallVec::new()));
        storage
            .archetype_map
            .insert(SmallVec::new(), ArchetypeId::EMPTY);

        storage
    }

    /// Resolve a builder and get or create the matching archetype.
    pub fn build(
        &mut self,
        builder: &ArchetypeBuilder,
        registry: &ComponentRegistry,
    ) -> EcsResult<&Archetype> {
        let removed = builder
            .remove
            .iter()
            .map(|&entry| resolve(entry, registry))
            .collect::<EcsResult<ComponentList>>()?;

        let mut ids = ComponentList::new();
        for &entry in &builder.add {
            let id = resolve(entry, registry)?;
            if !removed.contains(&id) {
                ids.push(id);
            }
        }

        let id = self.get_or_create(&ids);
        self.get(id)
    }

    /// Get or create an archetype for the given component set.
    pub fn get_or_create(&mut self, component_ids: &[ComponentId]) -> ArchetypeId {
        let mut key: ComponentList = component_ids.iter().copied().collect();
        key.sort_unstable();
        key.dedup();

        if let Some(&id) = self.archetype_map.get(&key) {
            return id;
        }

        let id = ArchetypeId::from_raw(self.archetypes.len() as u32);
        tracing::debug!(?id, components = ?key, "created archetype");

        self.archetypes.push(Archetype::new(id, key.clone()));
        self.archetype_map.insert(key, id);

        id
    }

    /// Get an archetype by ID.
    pub fn get(&self, id: ArchetypeId) -> EcsResult<&Archetype> {
        self.archetypes
            .get(id.as_raw() as usize)
            .ok_or(EcsError::UnknownArchetype(id.as_raw()))
    }

    /// Check that an archetype handle was produced by this storage.
    pub fn verify(&self, archetype: &Archetype) -> EcsResult<()> {
        match self.archetypes.get(archetype.id.as_raw() as usize) {
            Some(own) if own == archetype => Ok(()),
            _ => Err(EcsError::UnknownArchetype(archetype.id.as_raw())),
        }
    }

    /// Find the archetype ID for a given component set, if it exists.
    #[must_use]
    pub fn find(&self, component_ids: &[ComponentId]) -> Option<ArchetypeId> {
        let mut key: ComponentList = component_ids.iter().copied().collect();
        key.sort_unstable();
        key.dedup();
        self.archetype_map.get(&key).copied()
    }

    /// Get the number of archetypes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        // Always has at least the empty archetype
        self.archetypes.len() <= 1
    }

    /// Iterate over all archetypes.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }
}

impl fmt::Debug for ArchetypeStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeStorage")
            .field("archetype_count", &self.archetypes.len())
            .finish()
    }
}
