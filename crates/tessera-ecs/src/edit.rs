//! Edit transactions - batched composition changes for one entity.
//!
//! A transaction records operations against one entity and is submitted as a
//! unit. Submitted edits wait in the world's ledger and are committed, in
//! submission order, at the start of the next tick. Component types are
//! resolved while recording, so an unregistered type fails immediately.
//!
//! Only one transaction per entity may be open at a time; opening a second
//! fails with `ConcurrentEdit`. Dropping a transaction without submitting it
//! discards its operations.
//!
//! ```ignore
//! let mut edit = world.edit(entity)?;
//! edit.add(Velocity { dx: 1.0, dy: 0.0 })?.remove::<Frozen>()?;
//! edit.submit();
//! ```

use std::{any::Any, fmt, mem, sync::Arc};

use fixedbitset::FixedBitSet;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
    archetype::{Archetype, ArchetypeId},
    component::{Component, ComponentId, ComponentRegistry, TypeIndex},
    composition::CompositionTable,
    entity::{Entity, EntityAllocator},
    error::{EcsError, EcsResult},
    storage::ErasedInit,
    subscription::SubscriptionManager,
};

/// One recorded operation.
pub(crate) enum EditOp {
    Add {
        component: ComponentId,
        value: Box<dyn Any + Send>,
    },
    Create {
        component: ComponentId,
        init: Option<ErasedInit>,
    },
    Remove(ComponentId),
    Clear,
    Apply {
        mask: FixedBitSet,
        components: SmallVec<[ComponentId; 8]>,
    },
}

impl fmt::Debug for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { component, .. } => f.debug_tuple("Add").field(component).finish(),
            Self::Create { component, .. } => f.debug_tuple("Create").field(component).finish(),
            Self::Remove(component) => f.debug_tuple("Remove").field(component).finish(),
            Self::Clear => f.write_str("Clear"),
            Self::Apply { components, .. } => f.debug_tuple("Apply").field(components).finish(),
        }
    }
}

/// A submitted transaction waiting for commit.
#[derive(Debug)]
pub(crate) struct StagedEdit {
    pub(crate) entity: Entity,
    ops: Vec<EditOp>,
    delete: bool,
}

/// Outcome of committing one staged edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Committed {
    Applied,
    Deleted,
    /// Target was deleted earlier in the same drain.
    Skipped,
}

/// World state a commit writes to.
pub(crate) struct CommitTarget<'a> {
    pub(crate) registry: &'a mut ComponentRegistry,
    pub(crate) compositions: &'a mut CompositionTable,
    pub(crate) entities: &'a mut EntityAllocator,
    pub(crate) subscriptions: &'a mut SubscriptionManager,
}

impl StagedEdit {
    /// An edit with no operations, which only activates the entity.
    pub(crate) const fn activation(entity: Entity) -> Self {
        Self {
            entity,
            ops: Vec::new(),
            delete: false,
        }
    }

    /// Apply every operation in recording order, then hand the entity to
    /// the subscription engine.
    ///
    /// Later operations on the same component win over earlier ones.
    pub(crate) fn commit(self, target: &mut CommitTarget<'_>) -> EcsResult<Committed> {
        let Self {
            entity,
            ops,
            delete,
        } = self;

        if !target.entities.is_alive(entity) {
            tracing::warn!(%entity, "skipping edit for entity deleted earlier in this tick");
            return Ok(Committed::Skipped);
        }

        if delete {
            target
                .registry
                .remove_all(entity, target.compositions.get(entity).ones());
            target.compositions.clear(entity);
            target.entities.mark_deleted(entity);
            target.subscriptions.mark_dirty(entity);
            tracing::trace!(%entity, "committed delete");
            return Ok(Committed::Deleted);
        }

        let op_count = ops.len();
        for op in ops {
            match op {
                EditOp::Add { component, value } => {
                    if !target.registry.erased_mut(component)?.insert_boxed(entity, value) {
                        return Err(EcsError::UnknownComponent(component));
                    }
                    target.compositions.set_bit(entity, component);
                }
                EditOp::Create { component, init } => {
                    let storage = target.registry.erased_mut(component)?;
                    match init {
                        Some(init) => storage.create_with(entity, init),
                        None => storage.create_default(entity),
                    }
                    target.compositions.set_bit(entity, component);
                }
                EditOp::Remove(component) => {
                    target.registry.erased_mut(component)?.remove(entity);
                    target.compositions.clear_bit(entity, component);
                }
                EditOp::Clear => {
                    target
                        .registry
                        .remove_all(entity, target.compositions.get(entity).ones());
                    target.compositions.clear(entity);
                }
                EditOp::Apply { mask, components } => {
                    let stale: SmallVec<[usize; 8]> =
                        target.compositions.get(entity).difference(&mask).collect();
                    target.registry.remove_all(entity, stale.iter().copied());

                    for component in components {
                        if !target.compositions.has(entity, component) {
                            target.registry.erased_mut(component)?.create_default(entity);
                        }
                    }
                    target.compositions.replace(entity, &mask);
                }
            }
        }

        target.entities.activate(entity);
        target.subscriptions.mark_dirty(entity);
        tracing::trace!(%entity, ops = op_count, "committed transaction");
        Ok(Committed::Applied)
    }
}

/// Work queued for the next tick's drain.
#[derive(Debug)]
pub(crate) enum PendingEdit {
    Edit(StagedEdit),
    /// Deferred archetype instantiation on an already allocated id.
    Instantiate {
        entity: Entity,
        archetype: ArchetypeId,
    },
}

/// Open transactions and outstanding edits, shared by the world and every
/// transaction it hands out.
#[derive(Debug, Default)]
pub(crate) struct EditLedger {
    /// Entities with an open transaction.
    open: FixedBitSet,
    /// Submitted, not yet committed, in submission order.
    outstanding: Vec<PendingEdit>,
    /// Fresh ids whose spawning transaction was dropped unsubmitted.
    abandoned: Vec<Entity>,
}

pub(crate) type SharedLedger = Arc<Mutex<EditLedger>>;

impl EditLedger {
    fn open(&mut self, entity: Entity) -> EcsResult<()> {
        self.open.grow(entity.index() + 1);
        if self.open.put(entity.index()) {
            return Err(EcsError::ConcurrentEdit(entity));
        }
        Ok(())
    }

    fn close(&mut self, entity: Entity) {
        if entity.index() < self.open.len() {
            self.open.set(entity.index(), false);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self, entity: Entity) -> bool {
        self.open.contains(entity.index())
    }

    pub(crate) fn push(&mut self, edit: PendingEdit) {
        self.outstanding.push(edit);
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Take everything submitted so far. Later submissions start a new batch.
    pub(crate) fn drain(&mut self) -> (Vec<PendingEdit>, Vec<Entity>) {
        (
            mem::take(&mut self.outstanding),
            mem::take(&mut self.abandoned),
        )
    }
}

/// Pending changes to one entity.
///
/// Created by `World::edit`, `World::spawn`, `World::create_exact` or the
/// system context. Operations take effect when the world next drains its
/// ledger, all at once.
#[must_use = "edits are discarded unless submitted"]
pub struct EditTransaction {
    entity: Entity,
    types: TypeIndex,
    ledger: SharedLedger,
    ops: Vec<EditOp>,
    delete: bool,
    /// The id was allocated for this transaction alone.
    fresh: bool,
    submitted: bool,
}

impl EditTransaction {
    pub(crate) fn open(
        entity: Entity,
        types: TypeIndex,
        ledger: SharedLedger,
        fresh: bool,
    ) -> EcsResult<Self> {
        ledger.lock().open(entity)?;
        Ok(Self {
            entity,
            types,
            ledger,
            ops: Vec::new(),
            delete: false,
            fresh,
            submitted: false,
        })
    }

    /// The entity being edited.
    pub const fn entity(&self) -> Entity {
        self.entity
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && !self.delete
    }

    /// Attach `value`, replacing any instance of the same type.
    pub fn add<T: Component>(&mut self, value: T) -> EcsResult<&mut Self> {
        let component = self.types.resolve_of::<T>()?;
        self.ops.push(EditOp::Add {
            component,
            value: Box::new(value),
        });
        Ok(self)
    }

    /// Attach a fresh instance of `T`, taken from the pool for pooled types.
    pub fn create<T: Component>(&mut self) -> EcsResult<&mut Self> {
        let component = self.types.resolve_of::<T>()?;
        self.ops.push(EditOp::Create {
            component,
            init: None,
        });
        Ok(self)
    }

    /// Attach a fresh instance of `T` and initialize it in place.
    pub fn create_with<T: Component>(
        &mut self,
        init: impl FnOnce(&mut T) + Send + 'static,
    ) -> EcsResult<&mut Self> {
        let component = self.types.resolve_of::<T>()?;
        let init: ErasedInit = Box::new(move |any: &mut dyn Any| {
            if let Some(value) = any.downcast_mut::<T>() {
                init(value);
            }
        });
        self.ops.push(EditOp::Create {
            component,
            init: Some(init),
        });
        Ok(self)
    }

    /// Detach `T`. Detaching a type the entity lacks is a no-op.
    pub fn remove<T: Component>(&mut self) -> EcsResult<&mut Self> {
        let component = self.types.resolve_of::<T>()?;
        self.ops.push(EditOp::Remove(component));
        Ok(self)
    }

    /// Detach a component by id.
    pub fn remove_id(&mut self, component: ComponentId) -> EcsResult<&mut Self> {
        if !self.types.contains_id(component) {
            return Err(EcsError::UnknownComponent(component));
        }
        self.ops.push(EditOp::Remove(component));
        Ok(self)
    }

    /// Detach every component.
    pub fn clear(&mut self) -> &mut Self {
        self.ops.push(EditOp::Clear);
        self
    }

    /// Make the composition exactly the archetype's set.
    ///
    /// Instances of types the archetype shares with the current composition
    /// are kept; missing ones are created with defaults.
    pub fn apply(&mut self, archetype: &Archetype) -> EcsResult<&mut Self> {
        if let Some(&unknown) = archetype
            .components()
            .iter()
            .find(|&&c| !self.types.contains_id(c))
        {
            return Err(EcsError::UnknownComponent(unknown));
        }
        self.ops.push(EditOp::Apply {
            mask: archetype.mask().clone(),
            components: archetype.components().iter().copied().collect(),
        });
        Ok(self)
    }

    /// Delete the entity on commit.
    ///
    /// Any other operation recorded on this transaction is ignored.
    pub fn delete(&mut self) -> &mut Self {
        self.delete = true;
        self
    }

    /// Queue the transaction for the next drain and close it.
    pub fn submit(mut self) {
        let staged = StagedEdit {
            entity: self.entity,
            ops: mem::take(&mut self.ops),
            delete: self.delete,
        };
        self.submitted = true;

        let mut ledger = self.ledger.lock();
        ledger.close(self.entity);
        ledger.push(PendingEdit::Edit(staged));
    }
}

impl Drop for EditTransaction {
    fn drop(&mut self) {
        if self.submitted {
            return;
        }
        let mut ledger = self.ledger.lock();
        ledger.close(self.entity);
        if self.fresh {
            ledger.abandoned.push(self.entity);
        }
    }
}

impl fmt::Debug for EditTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditTransaction")
            .field("entity", &self.entity)
            .field("ops", &self.ops)
            .field("delete", &self.delete)
            .finish()
    }
}
