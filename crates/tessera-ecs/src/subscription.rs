//! Subscription engine - live entity sets per compiled aspect.
//!
//! Every distinct aspect gets one [`Subscription`]. Commits only mark the
//! touched entity dirty; once per tick the dirty list is evaluated against
//! every aspect, producing net insertion and removal deltas, and then the
//! listeners are notified.
//!
//! Per subscription the engine cycles through
//! `Clean -> EditsPending -> DeltaComputed -> ListenersNotified -> Clean`.
//! A notification pass delivers the insertions of every subscription before
//! the removals of any subscription.
//!
//! Deltas stay readable after notification so systems can inspect them
//! during processing. They are dropped at the start of the next delta
//! computation.

use std::fmt;

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::{
    aspect::Aspect,
    composition::CompositionTable,
    entity::{Entity, EntityAllocator},
    error::{BoxError, EcsError, EcsResult},
};

/// Handle to a subscription within one world.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    /// Create a subscription id from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

/// Where a subscription is in the per-tick cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Nothing pending.
    #[default]
    Clean,
    /// Commits or a back-fill are waiting for delta computation.
    EditsPending,
    /// Deltas computed, listeners not yet (fully) notified.
    DeltaComputed,
    /// Listeners saw this pass's deltas.
    ListenersNotified,
}

/// Which half of a delta is being delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    Inserted,
    Removed,
}

/// Receives the deltas of one subscription.
///
/// Returning an error aborts the rest of the notification pass and is
/// surfaced from `World::tick` as `ListenerFailure`.
pub trait SubscriptionListener: Send {
    /// Entities that started matching this tick.
    fn inserted(&mut self, entities: &[Entity]) -> Result<(), BoxError>;

    /// Entities that stopped matching this tick, deletions included.
    fn removed(&mut self, entities: &[Entity]) -> Result<(), BoxError>;
}

/// Listener built from a closure. See [`listener_fn`].
pub struct FnListener<F>(F);

/// Wrap a closure receiving both halves of every delta as a listener.
///
/// ```ignore
/// world.add_listener(sub, listener_fn(|kind, entities| {
///     println!("{kind:?}: {entities:?}");
///     Ok(())
/// }))?;
/// ```
pub fn listener_fn<F>(f: F) -> FnListener<F>
where
    F: FnMut(DeltaKind, &[Entity]) -> Result<(), BoxError> + Send,
{
    FnListener(f)
}

impl<F> SubscriptionListener for FnListener<F>
where
    F: FnMut(DeltaKind, &[Entity]) -> Result<(), BoxError> + Send,
{
    fn inserted(&mut self, entities: &[Entity]) -> Result<(), BoxError> {
        (self.0)(DeltaKind::Inserted, entities)
    }

    fn removed(&mut self, entities: &[Entity]) -> Result<(), BoxError> {
        (self.0)(DeltaKind::Removed, entities)
    }
}

/// Live set and deltas for one aspect.
pub struct Subscription {
    id: SubscriptionId,
    aspect: Aspect,
    /// Matching entities, in the order they started matching.
    entities: Vec<Entity>,
    /// Membership bitset over entity ids.
    members: FixedBitSet,
    inserted: Vec<Entity>,
    removed: Vec<Entity>,
    /// Back-filled insertions not yet through a computation.
    backfill: FixedBitSet,
    state: SubscriptionState,
    /// Deltas were produced by an earlier computation.
    stale: bool,
    listeners: Vec<Box<dyn SubscriptionListener>>,
}

impl Subscription {
    fn new(id: SubscriptionId, aspect: Aspect) -> Self {
        Self {
            id,
            aspect,
            entities: Vec::new(),
            members: FixedBitSet::new(),
            inserted: Vec::new(),
            removed: Vec::new(),
            backfill: FixedBitSet::new(),
            state: SubscriptionState::Clean,
            stale: false,
            listeners: Vec::new(),
        }
    }

    /// Subscription handle.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The aspect this subscription tracks.
    #[must_use]
    pub const fn aspect(&self) -> &Aspect {
        &self.aspect
    }

    /// Current live set, in a stable order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Check membership in the live set.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.members.contains(entity.index())
    }

    /// Entities inserted by the most recent pass.
    #[must_use]
    pub fn inserted(&self) -> &[Entity] {
        &self.inserted
    }

    /// Entities removed by the most recent pass.
    #[must_use]
    pub fn removed(&self) -> &[Entity] {
        &self.removed
    }

    /// One half of the most recent delta.
    #[must_use]
    pub fn delta(&self, kind: DeltaKind) -> &[Entity] {
        match kind {
            DeltaKind::Inserted => &self.inserted,
            DeltaKind::Removed => &self.removed,
        }
    }

    /// Position in the per-tick cycle.
    #[must_use]
    pub const fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the live set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn has_deltas(&self) -> bool {
        !self.inserted.is_empty() || !self.removed.is_empty()
    }

    fn insert(&mut self, entity: Entity) {
        self.members.grow(entity.index() + 1);
        self.members.insert(entity.index());
        self.entities.push(entity);
        self.inserted.push(entity);
    }

    fn evaluate(&mut self, entity: Entity, matches: bool) -> bool {
        let was = self.contains(entity);
        if matches && !was {
            self.insert(entity);
        } else if !matches && was {
            self.members.set(entity.index(), false);
            // A back-filled insertion that was never delivered just vanishes;
            // it is pruned from `inserted` after the pass.
            if self.backfill.contains(entity.index()) {
                self.backfill.set(entity.index(), false);
            } else {
                self.removed.push(entity);
            }
            return true;
        }
        false
    }

    fn deliver(&mut self, kind: DeltaKind) -> Result<(), BoxError> {
        let Self {
            listeners,
            inserted,
            removed,
            ..
        } = self;

        for listener in listeners.iter_mut() {
            match kind {
                DeltaKind::Inserted => listener.inserted(inserted)?,
                DeltaKind::Removed => listener.removed(removed)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("entities", &self.entities.len())
            .field("inserted", &self.inserted.len())
            .field("removed", &self.removed.len())
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Totals of one delta computation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeltaSummary {
    /// Dirty entities evaluated.
    pub evaluated: usize,
    /// Insertions across all subscriptions.
    pub inserted: usize,
    /// Removals across all subscriptions.
    pub removed: usize,
}

/// Owner of every subscription in a world.
#[derive(Default)]
pub struct SubscriptionManager {
    subscriptions: Vec<Subscription>,
    /// One subscription per distinct aspect.
    by_aspect: HashMap<Aspect, SubscriptionId, FxBuildHasher>,
    /// Entities touched since the last computation, first-touch order.
    dirty: Vec<Entity>,
    dirty_marks: FixedBitSet,
}

impl SubscriptionManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the subscription for `aspect`.
    ///
    /// A new subscription is back-filled with every active matching entity;
    /// the back-fill is delivered as insertions on the next pass.
    pub fn subscribe(
        &mut self,
        aspect: Aspect,
        compositions: &CompositionTable,
        entities: &EntityAllocator,
    ) -> SubscriptionId {
        if let Some(&id) = self.by_aspect.get(&aspect) {
            return id;
        }

        let id = SubscriptionId(self.subscriptions.len() as u32);
        let mut subscription = Subscription::new(id, aspect.clone());

        for entity in entities.active() {
            if subscription.aspect.matches(compositions.get(entity)) {
                subscription.insert(entity);
                subscription.backfill.grow(entity.index() + 1);
                subscription.backfill.insert(entity.index());
            }
        }
        if subscription.has_deltas() {
            subscription.state = SubscriptionState::EditsPending;
        }

        tracing::debug!(?id, backfill = subscription.len(), "created subscription");

        self.by_aspect.insert(aspect, id);
        self.subscriptions.push(subscription);
        id
    }

    /// Look up the subscription for an aspect, if one exists.
    #[must_use]
    pub fn find(&self, aspect: &Aspect) -> Option<SubscriptionId> {
        self.by_aspect.get(aspect).copied()
    }

    /// Get a subscription by id.
    pub fn get(&self, id: SubscriptionId) -> EcsResult<&Subscription> {
        self.subscriptions
            .get(id.index())
            .ok_or(EcsError::UnknownSubscription(id))
    }

    /// Attach a listener to a subscription.
    pub fn add_listener(
        &mut self,
        id: SubscriptionId,
        listener: Box<dyn SubscriptionListener>,
    ) -> EcsResult<()> {
        let subscription = self
            .subscriptions
            .get_mut(id.index())
            .ok_or(EcsError::UnknownSubscription(id))?;
        subscription.listeners.push(listener);
        Ok(())
    }

    /// Iterate over all subscriptions in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    /// Number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if there are no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Number of entities waiting for evaluation.
    #[must_use]
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Queue an entity for evaluation at the next computation.
    pub(crate) fn mark_dirty(&mut self, entity: Entity) {
        let index = entity.index();
        self.dirty_marks.grow(index + 1);
        if !self.dirty_marks.put(index) {
            self.dirty.push(entity);
            for subscription in &mut self.subscriptions {
                subscription.state = SubscriptionState::EditsPending;
            }
        }
    }

    /// Evaluate every dirty entity against every aspect.
    ///
    /// Deltas left over from the previous computation are dropped first.
    /// An entity matches only while it is active, so deleted entities land
    /// in the removal deltas.
    pub(crate) fn compute_deltas(
        &mut self,
        compositions: &CompositionTable,
        entities: &EntityAllocator,
    ) -> DeltaSummary {
        let mut summary = DeltaSummary {
            evaluated: self.dirty.len(),
            ..DeltaSummary::default()
        };

        for subscription in &mut self.subscriptions {
            if subscription.stale {
                subscription.inserted.clear();
                subscription.removed.clear();
            }

            let had_backfill = !subscription.backfill.is_clear();
            let mut any_removed = false;
            for &entity in &self.dirty {
                let matches = entities.is_active(entity)
                    && subscription.aspect.matches(compositions.get(entity));
                any_removed |= subscription.evaluate(entity, matches);
            }
            if any_removed {
                let Subscription {
                    entities,
                    members,
                    inserted,
                    ..
                } = subscription;
                entities.retain(|e| members.contains(e.index()));
                if had_backfill {
                    inserted.retain(|e| members.contains(e.index()));
                }
            }
            subscription.backfill.clear();

            summary.inserted += subscription.inserted.len();
            summary.removed += subscription.removed.len();
            subscription.stale = true;
            subscription.state = SubscriptionState::DeltaComputed;
        }

        self.dirty.clear();
        self.dirty_marks.clear();
        summary
    }

    /// Deliver the computed deltas.
    ///
    /// Insertions of every subscription go out before any removal. Each
    /// subscription's own listeners run first, then `observer`, which the
    /// world uses to reach systems. The first failure stops the pass.
    pub(crate) fn notify(
        &mut self,
        mut observer: impl FnMut(SubscriptionId, DeltaKind, &[Entity]) -> Result<(), BoxError>,
    ) -> EcsResult<()> {
        for kind in [DeltaKind::Inserted, DeltaKind::Removed] {
            for subscription in &mut self.subscriptions {
                if subscription.delta(kind).is_empty() {
                    continue;
                }

                let id = subscription.id;
                subscription
                    .deliver(kind)
                    .and_then(|()| observer(id, kind, subscription.delta(kind)))
                    .map_err(|source| {
                        tracing::error!(subscription = ?id, ?kind, error = %source, "listener failed");
                        EcsError::ListenerFailure {
                            subscription: id,
                            source,
                        }
                    })?;
            }
        }

        for subscription in &mut self.subscriptions {
            subscription.state = if subscription.has_deltas() {
                SubscriptionState::ListenersNotified
            } else {
                SubscriptionState::Clean
            };
        }
        Ok(())
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &self.subscriptions)
            .field("dirty", &self.dirty.len())
            .finish()
    }
}
