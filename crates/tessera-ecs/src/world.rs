//! World - the main container for all ECS data and the tick scheduler.
//!
//! The world owns the id allocator, the component registry with its
//! storages, the composition table, every subscription and every system.
//! Each [`World::tick`] runs four steps:
//!
//! 1. Drain the edit ledger and commit every submitted transaction in
//!    submission order.
//! 2. Compute subscription deltas and notify listeners and systems. All
//!    insertions go out before any removal. This step is never cut short
//!    except by a listener failure, which poisons the world.
//! 3. Run every enabled system in registration order. Edits issued here are
//!    deferred to step 1 of the next tick, so systems share one snapshot.
//! 4. Release the ids deleted in step 1, now that every subscription has
//!    observed the deletion.

use std::{fmt, sync::Arc};

use fixedbitset::FixedBitSet;

use crate::{
    archetype::{Archetype, ArchetypeBuilder, ArchetypeStorage},
    aspect::{Aspect, AspectBuilder},
    component::{Component, ComponentId, ComponentRegistry},
    composition::CompositionTable,
    config::WorldConfig,
    edit::{CommitTarget, Committed, EditTransaction, PendingEdit, SharedLedger, StagedEdit},
    entity::{Entity, EntityAllocator},
    error::{EcsError, EcsResult},
    field::{FieldTable, FieldValue},
    subscription::{DeltaKind, Subscription, SubscriptionId, SubscriptionListener, SubscriptionManager},
    system::{System, SystemContext, SystemEntry, SystemId},
};

/// Counters maintained across ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    /// Ticks started.
    pub ticks: u64,
    /// Edit transactions committed through the generic path.
    pub transactions_committed: u64,
    /// Entities created through the archetype fast path.
    pub archetype_spawns: u64,
    /// Ids returned to the allocator.
    pub entities_released: u64,
}

/// The ECS world - container for all entities and components.
pub struct World {
    config: WorldConfig,
    /// Entity ID allocator.
    entities: EntityAllocator,
    /// Component type registry and storages.
    components: ComponentRegistry,
    /// Composition bitset per entity.
    compositions: CompositionTable,
    subscriptions: SubscriptionManager,
    /// Archetype templates.
    archetypes: ArchetypeStorage,
    /// Systems in registration order.
    systems: Vec<SystemEntry>,
    /// Open transactions and submitted edits.
    ledger: SharedLedger,
    /// Deleted ids waiting for a successful notification pass.
    pending_release: Vec<Entity>,
    poisoned: bool,
    stats: WorldStats,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create a world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create a world sized and tuned by `config`.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            entities: EntityAllocator::with_capacity(config.expected_entities)
                .with_id_limit(config.id_limit),
            components: ComponentRegistry::with_limits(config.pool_limit, config.expected_entities),
            compositions: CompositionTable::with_capacity(config.expected_entities),
            subscriptions: SubscriptionManager::new(),
            archetypes: ArchetypeStorage::new(),
            systems: Vec::new(),
            ledger: SharedLedger::default(),
            pending_release: Vec::new(),
            poisoned: false,
            stats: WorldStats::default(),
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Counters since creation.
    #[must_use]
    pub const fn stats(&self) -> WorldStats {
        self.stats
    }

    // ==================== Registration ====================

    /// Register a component type. Idempotent.
    pub fn register<T: Component>(&mut self) -> ComponentId {
        self.components.register::<T>()
    }

    /// Register a component type with field accessors.
    pub fn register_with_fields<T: Component>(&mut self, fields: FieldTable<T>) -> ComponentId {
        self.components.register_with_fields(fields)
    }

    /// Get the id of a registered component type.
    pub fn component_id<T: Component>(&self) -> EcsResult<ComponentId> {
        self.components.id_of::<T>()
    }

    /// The component registry, for enumerating types.
    #[must_use]
    pub const fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Compile an aspect against this world's registry.
    pub fn aspect(&self, builder: &AspectBuilder) -> EcsResult<Aspect> {
        builder.compile(&self.components)
    }

    /// Get or create the subscription for an aspect.
    pub fn subscribe(&mut self, builder: &AspectBuilder) -> EcsResult<SubscriptionId> {
        let aspect = self.aspect(builder)?;
        Ok(self.subscribe_aspect(aspect))
    }

    /// Get or create the subscription for a compiled aspect.
    pub fn subscribe_aspect(&mut self, aspect: Aspect) -> SubscriptionId {
        self.subscriptions
            .subscribe(aspect, &self.compositions, &self.entities)
    }

    /// Attach a listener to a subscription.
    pub fn add_listener(
        &mut self,
        subscription: SubscriptionId,
        listener: impl SubscriptionListener + 'static,
    ) -> EcsResult<()> {
        self.subscriptions
            .add_listener(subscription, Box::new(listener))
    }

    /// Get a subscription.
    pub fn subscription(&self, id: SubscriptionId) -> EcsResult<&Subscription> {
        self.subscriptions.get(id)
    }

    /// All subscriptions in creation order.
    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    /// Resolve an archetype template, reusing an existing one with the same set.
    pub fn archetype(&mut self, builder: &ArchetypeBuilder) -> EcsResult<Archetype> {
        self.archetypes
            .build(builder, &self.components)
            .cloned()
    }

    /// Add a system. It is initialized, then subscribed to its aspect.
    pub fn add_system<S: System>(&mut self, mut system: S) -> EcsResult<SystemId> {
        system.initialize(self)?;

        let aspect = self.aspect(&system.aspect())?;
        let subscription = self.subscribe_aspect(aspect);
        let id = SystemId::from_index(self.systems.len());
        let name = std::any::type_name::<S>();

        tracing::debug!(system = name, ?id, ?subscription, "added system");
        self.systems.push(SystemEntry {
            id,
            name,
            subscription,
            enabled: true,
            system: Box::new(system),
        });
        Ok(id)
    }

    /// Enable or disable a system. Disabled systems still receive deltas.
    pub fn set_system_enabled(&mut self, id: SystemId, enabled: bool) -> EcsResult<()> {
        let entry = self
            .systems
            .get_mut(id.index())
            .ok_or(EcsError::UnknownSystem(id))?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Check whether a system is enabled.
    pub fn is_system_enabled(&self, id: SystemId) -> EcsResult<bool> {
        self.systems
            .get(id.index())
            .map(|entry| entry.enabled)
            .ok_or(EcsError::UnknownSystem(id))
    }

    /// Typed access to the first system of type `S`.
    #[must_use]
    pub fn system<S: System>(&self) -> Option<&S> {
        self.systems
            .iter()
            .find_map(|entry| entry.system.as_any().downcast_ref())
    }

    /// Mutable typed access to the first system of type `S`.
    #[must_use]
    pub fn system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems
            .iter_mut()
            .find_map(|entry| entry.system.as_any_mut().downcast_mut())
    }

    /// Subscription a system iterates.
    pub fn system_subscription(&self, id: SystemId) -> EcsResult<SubscriptionId> {
        self.systems
            .get(id.index())
            .map(|entry| entry.subscription)
            .ok_or(EcsError::UnknownSystem(id))
    }

    // ==================== Entity Operations ====================

    /// Create an empty entity. It becomes active on the next tick.
    pub fn create(&mut self) -> Entity {
        let entity = self.entities.allocate();
        self.ledger
            .lock()
            .push(PendingEdit::Edit(StagedEdit::activation(entity)));
        entity
    }

    /// Allocate an id and open a transaction on it.
    ///
    /// Dropping the transaction unsubmitted returns the id on the next tick.
    pub fn spawn(&mut self) -> EcsResult<EditTransaction> {
        let entity = self.entities.allocate();
        EditTransaction::open(
            entity,
            self.components.type_index(),
            Arc::clone(&self.ledger),
            true,
        )
    }

    /// Claim a specific id and open a transaction on it.
    ///
    /// Used when re-creating entities from a snapshot. Fails with `IdTaken`
    /// if the id is in use and with `IdOutOfRange` at or above
    /// `WorldConfig::id_limit`.
    pub fn create_exact(&mut self, entity: Entity) -> EcsResult<EditTransaction> {
        let entity = self.entities.allocate_exact(entity)?;
        EditTransaction::open(
            entity,
            self.components.type_index(),
            Arc::clone(&self.ledger),
            true,
        )
    }

    /// Open a transaction on an existing entity.
    ///
    /// Fails with `InvalidId` for released or deleted ids and with
    /// `ConcurrentEdit` while another transaction on it is open.
    pub fn edit(&mut self, entity: Entity) -> EcsResult<EditTransaction> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::InvalidId(entity));
        }
        EditTransaction::open(
            entity,
            self.components.type_index(),
            Arc::clone(&self.ledger),
            false,
        )
    }

    /// Queue a transaction for the next tick.
    pub fn submit(&mut self, edit: EditTransaction) {
        edit.submit();
    }

    /// Queue deletion of an entity for the next tick.
    pub fn delete(&mut self, entity: Entity) -> EcsResult<()> {
        let mut edit = self.edit(entity)?;
        edit.delete();
        edit.submit();
        Ok(())
    }

    /// Create an entity from an archetype immediately.
    ///
    /// The composition is written in one step and the id goes straight to
    /// the subscription engine; no edit transaction is involved.
    pub fn instantiate(&mut self, archetype: &Archetype) -> EcsResult<Entity> {
        self.archetypes.verify(archetype)?;
        let entity = self.entities.allocate();
        spawn_archetype(&mut self.commit_target(), entity, archetype)?;
        self.stats.archetype_spawns += 1;
        Ok(entity)
    }

    /// Create `count` entities from one archetype.
    pub fn instantiate_batch(&mut self, archetype: &Archetype, count: usize) -> EcsResult<Vec<Entity>> {
        self.archetypes.verify(archetype)?;

        let mut spawned = Vec::with_capacity(count);
        let mut target = CommitTarget {
            registry: &mut self.components,
            compositions: &mut self.compositions,
            entities: &mut self.entities,
            subscriptions: &mut self.subscriptions,
        };
        for _ in 0..count {
            let entity = target.entities.allocate();
            spawn_archetype(&mut target, entity, archetype)?;
            spawned.push(entity);
        }

        self.stats.archetype_spawns += count as u64;
        Ok(spawned)
    }

    /// Allocated and not deleted.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Alive and committed at least once.
    #[must_use]
    pub fn is_active(&self, entity: Entity) -> bool {
        self.entities.is_active(entity)
    }

    /// Number of allocated ids.
    #[must_use]
    pub const fn entity_count(&self) -> u32 {
        self.entities.alive_count()
    }

    /// Active entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.active()
    }

    /// Read-only composition bitset of an entity.
    #[must_use]
    pub fn composition(&self, entity: Entity) -> &FixedBitSet {
        self.compositions.get(entity)
    }

    /// Check whether an entity currently carries `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        Ok(self.compositions.has(entity, self.components.id_of::<T>()?))
    }

    /// Read a component.
    ///
    /// Fails with `UnknownType` when `T` was never registered.
    pub fn get<T: Component>(&self, entity: Entity) -> EcsResult<Option<&T>> {
        Ok(self.components.storage::<T>()?.get(entity))
    }

    /// Write a component in place. Composition is unaffected.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> EcsResult<Option<&mut T>> {
        Ok(self.components.storage_mut::<T>()?.get_mut(entity))
    }

    /// Number of submitted edits waiting for the next tick.
    #[must_use]
    pub fn pending_edits(&self) -> usize {
        self.ledger.lock().outstanding()
    }

    // ==================== Field Access ====================

    /// Read a field through the component's accessor table.
    pub fn read_field(&self, entity: Entity, component: ComponentId, name: &str) -> EcsResult<FieldValue> {
        let info = self.components.info(component)?;
        let fields = info.fields().ok_or_else(|| EcsError::UnknownField {
            component: info.name(),
            field: name.to_owned(),
        })?;
        let value = self
            .components
            .erased(component)?
            .get_any(entity)
            .ok_or(EcsError::InvalidId(entity))?;
        fields.read(value, name)
    }

    /// Write a field through the component's accessor table.
    pub fn write_field(
        &mut self,
        entity: Entity,
        component: ComponentId,
        name: &str,
        value: FieldValue,
    ) -> EcsResult<()> {
        let info = self.components.info(component)?;
        let fields = info.shared_fields().ok_or_else(|| EcsError::UnknownField {
            component: info.name(),
            field: name.to_owned(),
        })?;
        let target = self
            .components
            .erased_mut(component)?
            .get_any_mut(entity)
            .ok_or(EcsError::InvalidId(entity))?;
        fields.write(target, name, value)
    }

    /// Names of a component's entity-reference fields.
    pub fn entity_fields(&self, component: ComponentId) -> EcsResult<Vec<&'static str>> {
        let info = self.components.info(component)?;
        Ok(info
            .fields()
            .map(|fields| fields.entity_fields().collect())
            .unwrap_or_default())
    }

    // ==================== Tick ====================

    /// Advance one tick with `delta` elapsed time.
    ///
    /// Fails with `Poisoned` after an earlier listener failure until
    /// [`recover`](Self::recover) is called. A system failure still releases
    /// the ids deleted this tick before it is returned.
    pub fn tick(&mut self, delta: f32) -> EcsResult<()> {
        if self.poisoned {
            return Err(EcsError::Poisoned);
        }

        self.stats.ticks += 1;
        let tick = self.stats.ticks;
        let span = tracing::debug_span!("tick", tick);
        let _enter = span.enter();

        let commits = self.drain()?;

        let summary = self
            .subscriptions
            .compute_deltas(&self.compositions, &self.entities);
        let systems = &mut self.systems;
        let notified = self.subscriptions.notify(|id, kind, entities| {
            for entry in systems.iter_mut().filter(|entry| entry.subscription == id) {
                let system = entry.system.system();
                match kind {
                    DeltaKind::Inserted => system.inserted(entities)?,
                    DeltaKind::Removed => system.removed(entities)?,
                }
            }
            Ok(())
        });
        if let Err(err) = notified {
            self.poisoned = true;
            return Err(err);
        }

        let processed = self.run_systems(delta, tick);
        let released = self.release_pending()?;

        if self.config.trace_ticks {
            tracing::debug!(
                commits,
                evaluated = summary.evaluated,
                inserted = summary.inserted,
                removed = summary.removed,
                released,
                "tick complete"
            );
        }
        processed
    }

    /// Check whether a listener failure poisoned the world.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Clear the poisoned flag after handling a listener failure.
    ///
    /// Deltas the failed pass did not deliver are dropped at the next
    /// computation. Deleted ids are released by the next successful tick.
    pub fn recover(&mut self) {
        if self.poisoned {
            tracing::info!("world recovered from listener failure");
        }
        self.poisoned = false;
    }

    fn commit_target(&mut self) -> CommitTarget<'_> {
        CommitTarget {
            registry: &mut self.components,
            compositions: &mut self.compositions,
            entities: &mut self.entities,
            subscriptions: &mut self.subscriptions,
        }
    }

    /// Step 1: commit everything submitted since the previous drain.
    fn drain(&mut self) -> EcsResult<usize> {
        let (edits, abandoned) = self.ledger.lock().drain();

        for entity in abandoned {
            self.entities.release(entity)?;
            self.stats.entities_released += 1;
        }

        let mut commits = 0;
        let mut spawns = 0;
        let mut target = CommitTarget {
            registry: &mut self.components,
            compositions: &mut self.compositions,
            entities: &mut self.entities,
            subscriptions: &mut self.subscriptions,
        };
        for edit in edits {
            match edit {
                PendingEdit::Edit(staged) => {
                    let entity = staged.entity;
                    match staged.commit(&mut target)? {
                        Committed::Applied => commits += 1,
                        Committed::Deleted => {
                            commits += 1;
                            self.pending_release.push(entity);
                        }
                        Committed::Skipped => {}
                    }
                }
                PendingEdit::Instantiate { entity, archetype } => {
                    spawn_archetype(&mut target, entity, self.archetypes.get(archetype)?)?;
                    spawns += 1;
                }
            }
        }

        self.stats.transactions_committed += commits as u64;
        self.stats.archetype_spawns += spawns;
        Ok(commits)
    }

    /// Step 3: run enabled systems against a fixed snapshot.
    fn run_systems(&mut self, delta: f32, tick: u64) -> EcsResult<()> {
        for entry in &mut self.systems {
            if !entry.enabled {
                continue;
            }
            let system = entry.system.system();
            if !system.check_processing() {
                continue;
            }

            let mut ctx = SystemContext {
                subscription: self.subscriptions.get(entry.subscription)?,
                subscriptions: &self.subscriptions,
                registry: &mut self.components,
                compositions: &self.compositions,
                entities: &mut self.entities,
                archetypes: &self.archetypes,
                ledger: &self.ledger,
                delta,
                tick,
            };

            system.begin(&mut ctx);
            if let Err(source) = system.process(&mut ctx) {
                tracing::error!(system = entry.name, error = %source, "system failed");
                return Err(EcsError::SystemFailure {
                    system: entry.name.to_owned(),
                    source,
                });
            }
            system.end(&mut ctx);
        }
        Ok(())
    }

    /// Step 4: return deleted ids to the allocator.
    fn release_pending(&mut self) -> EcsResult<usize> {
        let released = self.pending_release.len();
        for entity in self.pending_release.drain(..) {
            self.entities.release(entity)?;
        }
        self.stats.entities_released += released as u64;
        Ok(released)
    }
}

/// Archetype fast path: write the mask in one step and create defaults.
fn spawn_archetype(target: &mut CommitTarget<'_>, entity: Entity, archetype: &Archetype) -> EcsResult<()> {
    for &component in archetype.components() {
        target.registry.erased_mut(component)?.create_default(entity);
    }
    target.compositions.replace(entity, archetype.mask());
    target.entities.activate(entity);
    target.subscriptions.mark_dirty(entity);
    tracing::trace!(%entity, archetype = ?archetype.id(), "instantiated archetype");
    Ok(())
}

/// A plugin that can be added to a World to register components, systems, and initial state.
///
/// This is the primary way to modularize ECS setup code across crates.
///
/// # Example
///
/// ```ignore
/// struct PhysicsPlugin;
///
/// impl Plugin for PhysicsPlugin {
///     fn build(&self, world: &mut World) -> EcsResult<()> {
///         world.register::<Velocity>();
///         world.register::<Acceleration>();
///         world.add_system(Integrate)?;
///         Ok(())
///     }
/// }
///
/// let mut world = World::new();
/// world.add_plugin(PhysicsPlugin)?;
/// ```
pub trait Plugin {
    /// Build/configure the world with this plugin's components and systems.
    fn build(&self, world: &mut World) -> EcsResult<()>;
}

impl World {
    /// Add a plugin to this world.
    pub fn add_plugin<P: Plugin>(&mut self, plugin: P) -> EcsResult<&mut Self> {
        plugin.build(self)?;
        Ok(self)
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.entities.alive_count())
            .field("component_types", &self.components.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("systems", &self.systems.len())
            .field("poisoned", &self.poisoned)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::{error::BoxError, subscription::listener_fn};

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }
    impl Component for Velocity {}

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    fn world() -> World {
        let mut world = World::new();
        world.register::<Position>();
        world.register::<Velocity>();
        world.register::<Health>();
        world
    }

    fn spawn_with(world: &mut World, pos: Position, vel: Option<Velocity>) -> Entity {
        let mut edit = world.spawn().unwrap();
        edit.add(pos).unwrap();
        if let Some(vel) = vel {
            edit.add(vel).unwrap();
        }
        let entity = edit.entity();
        edit.submit();
        entity
    }

    #[derive(Default)]
    struct Movement {
        processed: usize,
        seen_inserted: Vec<Entity>,
        seen_removed: Vec<Entity>,
    }

    impl System for Movement {
        fn aspect(&self) -> AspectBuilder {
            Aspect::all::<(Position, Velocity)>()
        }

        fn inserted(&mut self, entities: &[Entity]) -> Result<(), BoxError> {
            self.seen_inserted.extend_from_slice(entities);
            Ok(())
        }

        fn removed(&mut self, entities: &[Entity]) -> Result<(), BoxError> {
            self.seen_removed.extend_from_slice(entities);
            Ok(())
        }

        fn process(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), BoxError> {
            let dt = ctx.delta();
            for &entity in ctx.entities() {
                let Some(vel) = ctx.get::<Velocity>(entity)?.copied() else {
                    continue;
                };
                if let Some(pos) = ctx.get_mut::<Position>(entity)? {
                    pos.x += vel.dx * dt;
                    pos.y += vel.dy * dt;
                }
                self.processed += 1;
            }
            Ok(())
        }
    }

    #[test]
    fn test_spawn_and_tick() {
        let mut world = world();
        let sub = world
            .subscribe(&Aspect::all::<(Position, Velocity)>())
            .unwrap();

        let e1 = spawn_with(&mut world, Position::default(), Some(Velocity { dx: 1.0, dy: 0.0 }));
        let e2 = spawn_with(&mut world, Position::default(), None);
        assert!(!world.is_active(e1));

        world.tick(1.0).unwrap();

        assert!(world.is_active(e1) && world.is_active(e2));
        assert_eq!(world.subscription(sub).unwrap().entities(), &[e1]);
        assert_eq!(world.stats().transactions_committed, 2);
    }

    #[test]
    fn test_system_processes_snapshot() {
        let mut world = world();
        let id = world.add_system(Movement::default()).unwrap();

        let e = spawn_with(&mut world, Position::default(), Some(Velocity { dx: 2.0, dy: 1.0 }));
        world.tick(0.5).unwrap();

        assert_eq!(world.get::<Position>(e).unwrap(), Some(&Position { x: 1.0, y: 0.5 }));
        let movement = world.system::<Movement>().unwrap();
        assert_eq!(movement.processed, 1);
        assert_eq!(movement.seen_inserted, vec![e]);

        world.set_system_enabled(id, false).unwrap();
        world.tick(0.5).unwrap();
        assert_eq!(world.system::<Movement>().unwrap().processed, 1);
        assert!(!world.is_system_enabled(id).unwrap());
    }

    #[test]
    fn test_system_edits_are_deferred() {
        struct Reaper;

        impl System for Reaper {
            fn aspect(&self) -> AspectBuilder {
                Aspect::all::<Health>()
            }

            fn process(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), BoxError> {
                for &entity in ctx.entities() {
                    if ctx.get::<Health>(entity)?.is_some_and(|h| h.0 == 0) {
                        ctx.delete(entity)?;
                    }
                }
                // Nothing committed yet
                assert!(ctx.entities().iter().all(|&e| ctx.has::<Health>(e).unwrap()));
                Ok(())
            }
        }

        let mut world = world();
        world.add_system(Reaper).unwrap();

        let mut edit = world.spawn().unwrap();
        edit.add(Health(0)).unwrap();
        let doomed = edit.entity();
        edit.submit();

        world.tick(1.0).unwrap();
        assert!(world.is_alive(doomed));
        assert_eq!(world.pending_edits(), 1);

        world.tick(1.0).unwrap();
        assert!(!world.is_alive(doomed));
        assert_eq!(world.stats().entities_released, 1);
    }

    #[test]
    fn test_delete_releases_after_notification() {
        let mut world = world();
        let sub = world.subscribe(&AspectBuilder::new()).unwrap();

        let e = world.create();
        world.tick(0.0).unwrap();
        assert_eq!(world.subscription(sub).unwrap().entities(), &[e]);

        world.delete(e).unwrap();
        world.tick(0.0).unwrap();

        let subscription = world.subscription(sub).unwrap();
        assert!(subscription.is_empty());
        assert_eq!(subscription.removed(), &[e]);
        assert!(!world.is_alive(e));

        // The released id is handed out again
        let reused = world.create();
        assert_eq!(reused, e);
    }

    #[test]
    fn test_edit_invalid_and_concurrent() {
        let mut world = world();
        let e = world.create();

        let open = world.edit(e).unwrap();
        assert!(matches!(world.edit(e), Err(EcsError::ConcurrentEdit(_))));
        assert!(matches!(world.delete(e), Err(EcsError::ConcurrentEdit(_))));
        drop(open);

        assert!(matches!(
            world.edit(Entity::from_raw(99)),
            Err(EcsError::InvalidId(_))
        ));
    }

    #[test]
    fn test_create_exact() {
        let mut world = world();

        let mut edit = world.create_exact(Entity::from_raw(10)).unwrap();
        edit.add(Health(3)).unwrap();
        edit.submit();
        world.tick(0.0).unwrap();

        assert_eq!(world.get::<Health>(Entity::from_raw(10)).unwrap(), Some(&Health(3)));
        assert!(matches!(
            world.create_exact(Entity::from_raw(10)),
            Err(EcsError::IdTaken(_))
        ));
        // Ids below the claimed one are still available
        assert_eq!(world.create().id(), 0);

        let limit = world.config().id_limit;
        assert!(matches!(
            world.create_exact(Entity::from_raw(limit)),
            Err(EcsError::IdOutOfRange { .. })
        ));
    }

    #[test]
    fn test_abandoned_spawn_returns_id() {
        let mut world = world();

        let edit = world.spawn().unwrap();
        let entity = edit.entity();
        drop(edit);

        world.tick(0.0).unwrap();
        assert!(!world.is_alive(entity));
        assert_eq!(world.create(), entity);
    }

    #[test]
    fn test_listener_failure_poisons() {
        let mut world = world();
        let sub = world.subscribe(&Aspect::all::<Health>()).unwrap();
        let fail = std::sync::Arc::new(Mutex::new(true));
        let flag = std::sync::Arc::clone(&fail);
        world
            .add_listener(
                sub,
                listener_fn(move |_, _| {
                    if *flag.lock() {
                        Err("listener exploded".into())
                    } else {
                        Ok(())
                    }
                }),
            )
            .unwrap();

        let mut edit = world.spawn().unwrap();
        edit.add(Health(1)).unwrap();
        edit.submit();

        let err = world.tick(0.0).unwrap_err();
        assert!(matches!(err, EcsError::ListenerFailure { subscription, .. } if subscription == sub));
        assert!(world.is_poisoned());
        assert!(matches!(world.tick(0.0), Err(EcsError::Poisoned)));

        *fail.lock() = false;
        world.recover();
        world.tick(0.0).unwrap();
        assert!(!world.is_poisoned());
    }

    #[test]
    fn test_system_failure() {
        struct Broken;

        impl System for Broken {
            fn process(&mut self, _ctx: &mut SystemContext<'_>) -> Result<(), BoxError> {
                Err("out of fuel".into())
            }
        }

        let mut world = world();
        world.add_system(Broken).unwrap();

        let err = world.tick(0.0).unwrap_err();
        assert!(matches!(&err, EcsError::SystemFailure { system, .. } if system.ends_with("Broken")));
        assert!(!world.is_poisoned());
    }

    #[test]
    fn test_instantiate_fast_path() {
        let mut world = world();
        let sub = world
            .subscribe(&Aspect::all::<(Position, Velocity)>())
            .unwrap();
        let archetype = world
            .archetype(&ArchetypeBuilder::new().add::<(Position, Velocity)>())
            .unwrap();

        let e = world.instantiate(&archetype).unwrap();
        assert!(world.is_active(e));
        assert_eq!(world.get::<Velocity>(e).unwrap(), Some(&Velocity::default()));

        world.tick(0.0).unwrap();
        assert_eq!(world.subscription(sub).unwrap().entities(), &[e]);
        assert_eq!(world.stats().archetype_spawns, 1);
        assert_eq!(world.stats().transactions_committed, 0);
    }

    #[test]
    fn test_foreign_archetype_rejected() {
        let mut other = world();
        other
            .archetype(&ArchetypeBuilder::new().add::<Health>())
            .unwrap();
        let foreign = other
            .archetype(&ArchetypeBuilder::new().add::<Position>())
            .unwrap();

        let mut world = world();
        assert!(matches!(
            world.instantiate(&foreign),
            Err(EcsError::UnknownArchetype(_))
        ));
    }

    #[test]
    fn test_field_access() {
        let mut world = World::new();
        let pos = world.register_with_fields(
            FieldTable::<Position>::new()
                .float("x", |p| f64::from(p.x), |p, v| p.x = v as f32)
                .float("y", |p| f64::from(p.y), |p, v| p.y = v as f32),
        );
        let vel = world.register::<Velocity>();

        let mut edit = world.spawn().unwrap();
        edit.add(Position { x: 1.5, y: 0.0 }).unwrap();
        let e = edit.entity();
        edit.submit();
        world.tick(0.0).unwrap();

        assert_eq!(world.read_field(e, pos, "x").unwrap(), FieldValue::Float(1.5));
        world.write_field(e, pos, "y", FieldValue::Float(4.0)).unwrap();
        assert_eq!(world.get::<Position>(e).unwrap().unwrap().y, 4.0);

        assert!(matches!(
            world.read_field(e, vel, "dx"),
            Err(EcsError::UnknownField { .. })
        ));
        assert!(world.entity_fields(pos).unwrap().is_empty());
    }

    #[test]
    fn test_unregistered_type_is_reported() {
        struct Inspect;

        impl System for Inspect {
            fn aspect(&self) -> AspectBuilder {
                Aspect::all::<Position>()
            }

            fn process(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), BoxError> {
                for &entity in ctx.entities() {
                    assert!(matches!(ctx.has::<Health>(entity), Err(EcsError::UnknownType(_))));
                    assert!(matches!(ctx.get::<Health>(entity), Err(EcsError::UnknownType(_))));
                    assert!(ctx.get_mut::<Position>(entity)?.is_some());
                }
                Ok(())
            }
        }

        let mut world = World::new();
        world.register::<Position>();
        world.add_system(Inspect).unwrap();
        let e = spawn_with(&mut world, Position::default(), None);
        world.tick(0.0).unwrap();

        assert!(matches!(world.get::<Health>(e), Err(EcsError::UnknownType(_))));
        assert!(matches!(world.get_mut::<Health>(e), Err(EcsError::UnknownType(_))));
        assert!(matches!(world.has::<Health>(e), Err(EcsError::UnknownType(_))));
        assert!(world.has::<Position>(e).unwrap());
        assert_eq!(world.get::<Position>(e).unwrap(), Some(&Position::default()));
    }

    #[test]
    fn test_plugin() {
        struct Physics;

        impl Plugin for Physics {
            fn build(&self, world: &mut World) -> EcsResult<()> {
                world.register::<Position>();
                world.register::<Velocity>();
                world.add_system(Movement::default())?;
                Ok(())
            }
        }

        let mut world = World::new();
        world.add_plugin(Physics).unwrap();

        assert_eq!(world.components().len(), 2);
        assert!(world.system::<Movement>().is_some());
    }
}
