//! Error types for world operations.
//!
//! Every variant reflects a logic error in calling code or a state the world
//! cannot continue from on its own. Nothing here is retried internally.

use thiserror::Error;

use crate::{
    component::ComponentId, entity::Entity, field::FieldKind, subscription::SubscriptionId,
    system::SystemId,
};

/// Boxed error returned by listeners and systems.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// World error type.
#[derive(Debug, Error)]
pub enum EcsError {
    /// A component type was used before it was registered.
    #[error("unknown component type: {0}")]
    UnknownType(&'static str),

    /// A raw component id does not belong to this world's registry.
    #[error("unknown component: {0:?}")]
    UnknownComponent(ComponentId),

    /// Operation on a released or never-allocated entity.
    #[error("invalid entity: {0}")]
    InvalidId(Entity),

    /// `allocate_exact` asked for an id that is already in use.
    #[error("entity id already taken: {0}")]
    IdTaken(Entity),

    /// `allocate_exact` asked for an id at or above the configured limit.
    #[error("entity id {entity} is out of range (limit {limit})")]
    IdOutOfRange { entity: Entity, limit: u32 },

    /// A second edit transaction was opened while one is still open.
    #[error("entity {0} already has an open edit transaction")]
    ConcurrentEdit(Entity),

    /// A subscription listener failed during notification.
    ///
    /// The remaining notifications for that tick were skipped and the world
    /// is poisoned until [`World::recover`](crate::World::recover) is called.
    #[error("listener on {subscription:?} failed: {source}")]
    ListenerFailure {
        subscription: SubscriptionId,
        #[source]
        source: BoxError,
    },

    /// A system failed while processing.
    #[error("system `{system}` failed: {source}")]
    SystemFailure {
        system: String,
        #[source]
        source: BoxError,
    },

    /// The world is poisoned by an earlier listener failure.
    #[error("world is poisoned by an earlier listener failure")]
    Poisoned,

    /// Unknown subscription handle.
    #[error("unknown subscription: {0:?}")]
    UnknownSubscription(SubscriptionId),

    /// Unknown system handle.
    #[error("unknown system: {0:?}")]
    UnknownSystem(SystemId),

    /// Archetype handle from another world.
    #[error("unknown archetype: {0}")]
    UnknownArchetype(u32),

    /// Field name not present in the component's field table.
    #[error("component {component} has no field `{field}`")]
    UnknownField {
        component: &'static str,
        field: String,
    },

    /// A field value of the wrong kind was written.
    #[error("field `{field}` of {component} expects {expected:?}, got {found:?}")]
    FieldMismatch {
        component: &'static str,
        field: &'static str,
        expected: FieldKind,
        found: FieldKind,
    },
}

/// Result type for world operations.
pub type EcsResult<T> = Result<T, EcsError>;
