//! Systems - per-tick processing over one aspect.
//!
//! A system declares an aspect, is subscribed to it when added to the world
//! and receives that subscription's deltas like any other listener. During
//! the processing step it sees the world through a [`SystemContext`]:
//! component values may be read and written in place, but composition
//! changes are deferred edits that land at the start of the next tick.
//!
//! ```ignore
//! struct Movement;
//!
//! impl System for Movement {
//!     fn aspect(&self) -> AspectBuilder {
//!         Aspect::all::<(Position, Velocity)>()
//!     }
//!
//!     fn process(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), BoxError> {
//!         for &entity in ctx.entities() {
//!             let v = ctx.get::<Velocity>(entity)?.map(|v| (v.dx, v.dy));
//!             if let (Some((dx, dy)), Some(p)) = (v, ctx.get_mut::<Position>(entity)?) {
//!                 p.x += dx * ctx.delta();
//!                 p.y += dy * ctx.delta();
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::{any::Any, fmt, sync::Arc};

use fixedbitset::FixedBitSet;

use crate::{
    archetype::{Archetype, ArchetypeStorage},
    aspect::AspectBuilder,
    component::{Component, ComponentRegistry},
    composition::CompositionTable,
    edit::{EditTransaction, PendingEdit, SharedLedger},
    entity::{Entity, EntityAllocator},
    error::{BoxError, EcsError, EcsResult},
    storage::ComponentStorage,
    subscription::{Subscription, SubscriptionId, SubscriptionManager},
    world::World,
};

/// Handle to a system within one world.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(u32);

impl SystemId {
    /// Get the raw id value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemId({})", self.0)
    }
}

/// Processing logic run once per tick, in registration order.
pub trait System: Send + 'static {
    /// Aspect whose entities this system iterates.
    ///
    /// The default matches every active entity.
    fn aspect(&self) -> AspectBuilder {
        AspectBuilder::new()
    }

    /// Called once when the system is added, before its aspect is compiled.
    fn initialize(&mut self, _world: &mut World) -> EcsResult<()> {
        Ok(())
    }

    /// Entities that started matching the aspect.
    fn inserted(&mut self, _entities: &[Entity]) -> Result<(), BoxError> {
        Ok(())
    }

    /// Entities that stopped matching the aspect, deletions included.
    fn removed(&mut self, _entities: &[Entity]) -> Result<(), BoxError> {
        Ok(())
    }

    /// Skip `begin`, `process` and `end` for this tick when `false`.
    fn check_processing(&self) -> bool {
        true
    }

    fn begin(&mut self, _ctx: &mut SystemContext<'_>) {}

    /// Process this tick.
    fn process(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), BoxError>;

    fn end(&mut self, _ctx: &mut SystemContext<'_>) {}
}

/// Object-safe view of a system with downcasting for typed access.
pub(crate) trait ErasedSystem: Send {
    fn system(&mut self) -> &mut dyn System;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<S: System> ErasedSystem for S {
    fn system(&mut self) -> &mut dyn System {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A registered system.
pub(crate) struct SystemEntry {
    pub(crate) id: SystemId,
    pub(crate) name: &'static str,
    pub(crate) subscription: SubscriptionId,
    pub(crate) enabled: bool,
    pub(crate) system: Box<dyn ErasedSystem>,
}

impl fmt::Debug for SystemEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("subscription", &self.subscription)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// The world as seen from inside a system's processing step.
///
/// The entity snapshot is fixed for the whole tick. Edits, spawns and
/// deletes issued here are queued and committed at the start of the next
/// tick.
pub struct SystemContext<'w> {
    pub(crate) subscription: &'w Subscription,
    pub(crate) subscriptions: &'w SubscriptionManager,
    pub(crate) registry: &'w mut ComponentRegistry,
    pub(crate) compositions: &'w CompositionTable,
    pub(crate) entities: &'w mut EntityAllocator,
    pub(crate) archetypes: &'w ArchetypeStorage,
    pub(crate) ledger: &'w SharedLedger,
    pub(crate) delta: f32,
    pub(crate) tick: u64,
}

impl<'w> SystemContext<'w> {
    /// Entities matching this system's aspect, in stable order.
    #[must_use]
    pub fn entities(&self) -> &'w [Entity] {
        self.subscription.entities()
    }

    /// Entities that started matching this tick.
    #[must_use]
    pub fn inserted(&self) -> &'w [Entity] {
        self.subscription.inserted()
    }

    /// Entities that stopped matching this tick.
    #[must_use]
    pub fn removed(&self) -> &'w [Entity] {
        self.subscription.removed()
    }

    /// Live set of another subscription.
    pub fn subscription(&self, id: SubscriptionId) -> EcsResult<&'w Subscription> {
        self.subscriptions.get(id)
    }

    /// Elapsed time passed to `World::tick`.
    #[must_use]
    pub const fn delta(&self) -> f32 {
        self.delta
    }

    /// Number of the running tick, starting at 1.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Read a component.
    ///
    /// Fails with `UnknownType` when `T` was never registered.
    pub fn get<T: Component>(&self, entity: Entity) -> EcsResult<Option<&T>> {
        Ok(self.registry.storage::<T>()?.get(entity))
    }

    /// Write a component in place. Does not change composition.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> EcsResult<Option<&mut T>> {
        Ok(self.registry.storage_mut::<T>()?.get_mut(entity))
    }

    /// Typed storage for `T`.
    pub fn storage<T: Component>(&self) -> EcsResult<&ComponentStorage<T>> {
        self.registry.storage::<T>()
    }

    /// Composition of an entity.
    #[must_use]
    pub fn composition(&self, entity: Entity) -> &FixedBitSet {
        self.compositions.get(entity)
    }

    /// Check whether an entity carries `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        Ok(self.compositions.has(entity, self.registry.id_of::<T>()?))
    }

    /// Open a deferred edit on an existing entity.
    pub fn edit(&mut self, entity: Entity) -> EcsResult<EditTransaction> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::InvalidId(entity));
        }
        EditTransaction::open(
            entity,
            self.registry.type_index(),
            Arc::clone(self.ledger),
            false,
        )
    }

    /// Allocate an id and open a deferred edit on it.
    pub fn spawn(&mut self) -> EcsResult<EditTransaction> {
        let entity = self.entities.allocate();
        EditTransaction::open(
            entity,
            self.registry.type_index(),
            Arc::clone(self.ledger),
            true,
        )
    }

    /// Allocate an id and queue an archetype instantiation for it.
    pub fn instantiate(&mut self, archetype: &Archetype) -> EcsResult<Entity> {
        self.archetypes.verify(archetype)?;
        let entity = self.entities.allocate();
        self.ledger.lock().push(PendingEdit::Instantiate {
            entity,
            archetype: archetype.id(),
        });
        Ok(entity)
    }

    /// Queue deletion of an entity.
    pub fn delete(&mut self, entity: Entity) -> EcsResult<()> {
        let mut edit = self.edit(entity)?;
        edit.delete();
        edit.submit();
        Ok(())
    }
}

impl fmt::Debug for SystemContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemContext")
            .field("subscription", &self.subscription.id())
            .field("entities", &self.subscription.len())
            .field("delta", &self.delta)
            .field("tick", &self.tick)
            .finish()
    }
}
