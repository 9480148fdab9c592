//! Component type registration and metadata.
//!
//! Components are data types that can be attached to entities.
//! Each registered type gets a dense, append-only [`ComponentId`] which is
//! also its bit position in composition bitsets, plus a storage strategy.
//! The registry is owned by one world; there is no process-wide state.

use std::{any::TypeId, fmt, sync::Arc};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::{
    entity::Entity,
    error::{EcsError, EcsResult},
    field::{ErasedFieldTable, FieldTable},
    storage::{ComponentStorage, ErasedStorage},
};

/// How instances of a component type are stored and recycled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StorageStrategy {
    /// Instances are dropped on removal.
    #[default]
    Plain,
    /// Instances are reset and kept in a pool on removal, then handed to the
    /// next `create` of the same type.
    Pooled,
    /// Flat records stored inline in a dense array; removal overwrites the
    /// slot with the default value.
    Fixed,
}

/// Trait for types that can be attached to entities.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(Component, Default)]
/// struct Position { x: f32, y: f32 }
///
/// #[derive(Component, Default)]
/// #[component(pooled)]
/// struct Projectile { speed: f32, trail: Vec<(f32, f32)> }
/// ```
pub trait Component: Default + Send + Sync + 'static {
    /// Storage strategy used when this type is registered.
    const STRATEGY: StorageStrategy = StorageStrategy::Plain;

    /// Fields the reset step leaves untouched.
    ///
    /// Reset is shallow: primitives, options, strings and recognized
    /// collections are zeroed or cleared, everything else keeps whatever the
    /// previous owner left in it. Pooled types listing fields here must not
    /// rely on those fields being fresh after `create`.
    const RETAINED_ON_RESET: &'static [&'static str] = &[];

    /// Restore the documented zero state before a pooled instance is reused.
    ///
    /// Hand-written pooled types that do not override this start over from
    /// `Default`. The derive replaces it with a field-by-field reset that
    /// keeps collection capacity.
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Unique identifier for a component type within one registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Create a component ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Bit position in composition bitsets.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

/// A component type named by its Rust type, before resolution to an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentType {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentType {
    /// The component type for `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Rust type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// A set of component types, used by aspect and archetype builders.
///
/// Implemented for every component and for tuples of sets.
pub trait ComponentSet: 'static {
    /// Append the types in this set.
    fn collect_types(out: &mut Vec<ComponentType>);
}

impl<C: Component> ComponentSet for C {
    fn collect_types(out: &mut Vec<ComponentType>) {
        out.push(ComponentType::of::<C>());
    }
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: ComponentSet),+> ComponentSet for ($($name,)+) {
            fn collect_types(out: &mut Vec<ComponentType>) {
                $($name::collect_types(out);)+
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

/// Shared view of the type-to-id mapping.
///
/// Edit transactions hold a clone so they can resolve types the moment an
/// operation is recorded, without borrowing the world.
#[derive(Clone, Default)]
pub struct TypeIndex(Arc<RwLock<FxHashMap<TypeId, ComponentId>>>);

impl TypeIndex {
    /// Resolve a component type, failing with `UnknownType`.
    pub fn resolve(&self, ty: ComponentType) -> EcsResult<ComponentId> {
        self.0
            .read()
            .get(&ty.type_id)
            .copied()
            .ok_or(EcsError::UnknownType(ty.name))
    }

    /// Resolve `T`, failing with `UnknownType`.
    pub fn resolve_of<T: Component>(&self) -> EcsResult<ComponentId> {
        self.resolve(ComponentType::of::<T>())
    }

    /// Check that an id was issued by this index.
    #[must_use]
    pub fn contains_id(&self, id: ComponentId) -> bool {
        id.index() < self.0.read().len()
    }

    fn get(&self, type_id: TypeId) -> Option<ComponentId> {
        self.0.read().get(&type_id).copied()
    }

    fn insert(&self, type_id: TypeId, id: ComponentId) {
        self.0.write().insert(type_id, id);
    }
}

/// Runtime information about a component type.
#[derive(Clone)]
pub struct ComponentInfo {
    /// Unique ID for this component type.
    id: ComponentId,
    /// Type name for debugging.
    name: &'static str,
    /// Storage strategy tag.
    strategy: StorageStrategy,
    /// Fields the pooled reset leaves untouched.
    retained_on_reset: &'static [&'static str],
    /// Rust TypeId for type checking.
    type_id: TypeId,
    /// Field accessors registered by the component author.
    fields: Option<Arc<ErasedFieldTable>>,
}

impl ComponentInfo {
    /// Create component info for a concrete type.
    #[must_use]
    pub fn of<T: Component>(id: ComponentId) -> Self {
        Self {
            id,
            name: std::any::type_name::<T>(),
            strategy: T::STRATEGY,
            retained_on_reset: T::RETAINED_ON_RESET,
            type_id: TypeId::of::<T>(),
            fields: None,
        }
    }

    /// Get the component ID.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Get the component type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Get the storage strategy.
    #[must_use]
    pub const fn strategy(&self) -> StorageStrategy {
        self.strategy
    }

    /// Fields a pooled reset leaves untouched.
    #[must_use]
    pub const fn retained_on_reset(&self) -> &'static [&'static str] {
        self.retained_on_reset
    }

    /// Field accessor table, if one was registered.
    #[must_use]
    pub fn fields(&self) -> Option<&ErasedFieldTable> {
        self.fields.as_deref()
    }

    pub(crate) fn shared_fields(&self) -> Option<Arc<ErasedFieldTable>> {
        self.fields.clone()
    }

    /// Check if this info is for the given type.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .field("fields", &self.fields.as_ref().map(|t| t.len()))
            .finish()
    }
}

/// Registry for component types and owner of their storages.
///
/// Maps Rust types to `ComponentId`s, stores metadata about each type and
/// keeps one storage per type, indexed by id.
#[derive(Default)]
pub struct ComponentRegistry {
    /// Map from TypeId to ComponentId.
    index: TypeIndex,
    /// Component info indexed by ComponentId.
    infos: Vec<ComponentInfo>,
    /// Storage indexed by ComponentId.
    storages: Vec<Box<dyn ErasedStorage>>,
    /// Pool bound handed to pooled storages.
    pool_limit: usize,
    /// Initial slot capacity for new storages.
    expected_entities: usize,
}

impl ComponentRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(usize::MAX, 0)
    }

    /// Create a registry with a pool bound and an initial storage capacity.
    #[must_use]
    pub fn with_limits(pool_limit: usize, expected_entities: usize) -> Self {
        Self {
            index: TypeIndex::default(),
            infos: Vec::new(),
            storages: Vec::new(),
            pool_limit,
            expected_entities,
        }
    }

    /// Register a component type and return its ID.
    ///
    /// If the type is already registered, returns the existing ID.
    pub fn register<T: Component>(&mut self) -> ComponentId {
        let type_id = TypeId::of::<T>();

        if let Some(id) = self.index.get(type_id) {
            return id;
        }

        let id = ComponentId(self.infos.len() as u32);
        let info = ComponentInfo::of::<T>(id);

        if info.strategy == StorageStrategy::Pooled && !info.retained_on_reset.is_empty() {
            tracing::warn!(
                component = info.name,
                retained = ?info.retained_on_reset,
                "pooled component reset leaves fields untouched"
            );
        }
        tracing::debug!(component = info.name, ?id, strategy = ?info.strategy, "registered component");

        self.index.insert(type_id, id);
        self.infos.push(info);
        self.storages.push(Box::new(ComponentStorage::<T>::with_capacity(
            id,
            self.expected_entities,
            self.pool_limit,
        )));

        id
    }

    /// Register a component type together with its field accessors.
    ///
    /// Replaces any field table registered earlier for the same type.
    pub fn register_with_fields<T: Component>(&mut self, fields: FieldTable<T>) -> ComponentId {
        let id = self.register::<T>();
        self.infos[id.index()].fields = Some(Arc::new(fields.into_erased()));
        id
    }

    /// Get the component ID for a type, failing with `UnknownType`.
    pub fn id_of<T: Component>(&self) -> EcsResult<ComponentId> {
        self.index.resolve_of::<T>()
    }

    /// Resolve a component type, failing with `UnknownType`.
    pub fn resolve(&self, ty: ComponentType) -> EcsResult<ComponentId> {
        self.index.resolve(ty)
    }

    /// Shared type index for edit transactions.
    #[must_use]
    pub fn type_index(&self) -> TypeIndex {
        self.index.clone()
    }

    /// Get component info by ID.
    pub fn info(&self, id: ComponentId) -> EcsResult<&ComponentInfo> {
        self.infos
            .get(id.index())
            .ok_or(EcsError::UnknownComponent(id))
    }

    /// Typed storage for `T`.
    pub fn storage<T: Component>(&self) -> EcsResult<&ComponentStorage<T>> {
        let id = self.id_of::<T>()?;
        self.storages[id.index()]
            .as_any()
            .downcast_ref()
            .ok_or(EcsError::UnknownType(std::any::type_name::<T>()))
    }

    /// Mutable typed storage for `T`.
    pub fn storage_mut<T: Component>(&mut self) -> EcsResult<&mut ComponentStorage<T>> {
        let id = self.id_of::<T>()?;
        self.storages[id.index()]
            .as_any_mut()
            .downcast_mut()
            .ok_or(EcsError::UnknownType(std::any::type_name::<T>()))
    }

    /// Type-erased storage by id.
    pub(crate) fn erased(&self, id: ComponentId) -> EcsResult<&dyn ErasedStorage> {
        self.storages
            .get(id.index())
            .map(Box::as_ref)
            .ok_or(EcsError::UnknownComponent(id))
    }

    /// Mutable type-erased storage by id.
    pub(crate) fn erased_mut(&mut self, id: ComponentId) -> EcsResult<&mut dyn ErasedStorage> {
        match self.storages.get_mut(id.index()) {
            Some(storage) => Ok(storage.as_mut()),
            None => Err(EcsError::UnknownComponent(id)),
        }
    }

    /// Remove every component an entity owns, following the given ids.
    pub(crate) fn remove_all(&mut self, entity: Entity, ids: impl Iterator<Item = usize>) {
        for index in ids {
            if let Some(storage) = self.storages.get_mut(index) {
                storage.remove(entity);
            }
        }
    }

    /// Get the number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Iterate over all registered component infos.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("count", &self.len())
            .field("components", &self.infos)
            .finish()
    }
}
