//! Aspects - compiled predicates over entity composition.
//!
//! An aspect is built declaratively from `all`, `one` and `exclude` terms and
//! compiled against a registry into three bitsets. Terms are order
//! independent and may be repeated.
//!
//! ```ignore
//! let aspect = Aspect::all::<(Position, Velocity)>()
//!     .exclude::<Frozen>()
//!     .compile(world.components())?;
//! ```
//!
//! Component ids are append-only, so a compiled aspect stays valid for the
//! lifetime of the registry no matter how many types are registered later.

use fixedbitset::FixedBitSet;
use smallvec::SmallVec;

use crate::{
    component::{ComponentId, ComponentRegistry, ComponentSet, ComponentType},
    error::EcsResult,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Term {
    Type(ComponentType),
    Id(ComponentId),
}

impl Term {
    fn resolve(self, registry: &ComponentRegistry) -> EcsResult<ComponentId> {
        match self {
            Self::Type(ty) => registry.resolve(ty),
            Self::Id(id) => registry.info(id).map(|info| info.id()),
        }
    }
}

type Terms = SmallVec<[Term; 4]>;

/// Declarative aspect, not yet bound to a registry.
#[derive(Clone, Debug, Default)]
pub struct AspectBuilder {
    all: Terms,
    one: Terms,
    exclude: Terms,
}

impl AspectBuilder {
    /// The empty builder. Compiles to an aspect matching every active entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every type in `S`.
    #[must_use]
    pub fn all<S: ComponentSet>(mut self) -> Self {
        push_set::<S>(&mut self.all);
        self
    }

    /// Require at least one type in `S`.
    #[must_use]
    pub fn one<S: ComponentSet>(mut self) -> Self {
        push_set::<S>(&mut self.one);
        self
    }

    /// Reject entities carrying any type in `S`.
    #[must_use]
    pub fn exclude<S: ComponentSet>(mut self) -> Self {
        push_set::<S>(&mut self.exclude);
        self
    }

    /// Require every listed component id.
    #[must_use]
    pub fn all_ids(mut self, ids: impl IntoIterator<Item = ComponentId>) -> Self {
        self.all.extend(ids.into_iter().map(Term::Id));
        self
    }

    /// Require at least one listed component id.
    #[must_use]
    pub fn one_ids(mut self, ids: impl IntoIterator<Item = ComponentId>) -> Self {
        self.one.extend(ids.into_iter().map(Term::Id));
        self
    }

    /// Reject entities carrying any listed component id.
    #[must_use]
    pub fn exclude_ids(mut self, ids: impl IntoIterator<Item = ComponentId>) -> Self {
        self.exclude.extend(ids.into_iter().map(Term::Id));
        self
    }

    /// Compile against a registry.
    ///
    /// Fails with `UnknownType` if a term names an unregistered type and
    /// with `UnknownComponent` for a foreign id.
    pub fn compile(&self, registry: &ComponentRegistry) -> EcsResult<Aspect> {
        Ok(Aspect {
            all: compile_mask(&self.all, registry)?,
            one: compile_mask(&self.one, registry)?,
            exclude: compile_mask(&self.exclude, registry)?,
        })
    }
}

fn push_set<S: ComponentSet>(terms: &mut Terms) {
    let mut types = Vec::new();
    S::collect_types(&mut types);
    terms.extend(types.into_iter().map(Term::Type));
}

/// Build a mask sized exactly to its highest set bit.
fn compile_mask(terms: &[Term], registry: &ComponentRegistry) -> EcsResult<FixedBitSet> {
    let ids = terms
        .iter()
        .map(|term| term.resolve(registry).map(ComponentId::index))
        .collect::<EcsResult<SmallVec<[usize; 4]>>>()?;

    let width = ids.iter().max().map_or(0, |max| max + 1);
    let mut mask = FixedBitSet::with_capacity(width);
    mask.extend(ids);
    Ok(mask)
}

/// A compiled aspect: all, one and exclude masks.
///
/// Two aspects with the same terms compare and hash equal, which is what
/// lets the subscription engine share one subscription per aspect.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Aspect {
    all: FixedBitSet,
    one: FixedBitSet,
    exclude: FixedBitSet,
}

impl Aspect {
    /// Start a builder requiring every type in `S`.
    #[must_use]
    pub fn all<S: ComponentSet>() -> AspectBuilder {
        AspectBuilder::new().all::<S>()
    }

    /// Start a builder requiring at least one type in `S`.
    #[must_use]
    pub fn one<S: ComponentSet>() -> AspectBuilder {
        AspectBuilder::new().one::<S>()
    }

    /// Start a builder excluding every type in `S`.
    #[must_use]
    pub fn exclude<S: ComponentSet>() -> AspectBuilder {
        AspectBuilder::new().exclude::<S>()
    }

    /// Test a composition bitset against this aspect.
    #[must_use]
    pub fn matches(&self, composition: &FixedBitSet) -> bool {
        self.all.is_subset(composition)
            && (self.one.is_clear() || !self.one.is_disjoint(composition))
            && self.exclude.is_disjoint(composition)
    }

    /// The match-everything aspect.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_clear() && self.one.is_clear() && self.exclude.is_clear()
    }

    /// Required components.
    #[must_use]
    pub const fn all_mask(&self) -> &FixedBitSet {
        &self.all
    }

    /// Components of which at least one is required.
    #[must_use]
    pub const fn one_mask(&self) -> &FixedBitSet {
        &self.one
    }

    /// Forbidden components.
    #[must_use]
    pub const fn exclude_mask(&self) -> &FixedBitSet {
        &self.exclude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{component::Component, error::EcsError};

    #[derive(Default)]
    struct Position;
    impl Component for Position {}

    #[derive(Default)]
    struct Velocity;
    impl Component for Velocity {}

    #[derive(Default)]
    struct Frozen;
    impl Component for Frozen {}

    #[derive(Default)]
    struct Unregistered;
    impl Component for Unregistered {}

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register::<Position>();
        registry.register::<Velocity>();
        registry.register::<Frozen>();
        registry
    }

    fn bits(ids: &[usize]) -> FixedBitSet {
        let mut set = FixedBitSet::with_capacity(8);
        set.extend(ids.iter().copied());
        set
    }

    #[test]
    fn test_aspect_matching() {
        let registry = registry();
        let aspect = Aspect::all::<(Position, Velocity)>()
            .exclude::<Frozen>()
            .compile(&registry)
            .unwrap();

        assert!(aspect.matches(&bits(&[0, 1])));
        assert!(!aspect.matches(&bits(&[0])));
        assert!(!aspect.matches(&bits(&[0, 1, 2])));
    }

    #[test]
    fn test_one_mask() {
        let registry = registry();
        let aspect = Aspect::one::<(Velocity, Frozen)>()
            .compile(&registry)
            .unwrap();

        assert!(aspect.matches(&bits(&[1])));
        assert!(aspect.matches(&bits(&[0, 2])));
        assert!(!aspect.matches(&bits(&[0])));
        assert!(!aspect.matches(&FixedBitSet::new()));
    }

    #[test]
    fn test_empty_aspect_matches_everything() {
        let registry = registry();
        let aspect = AspectBuilder::new().compile(&registry).unwrap();

        assert!(aspect.is_empty());
        assert!(aspect.matches(&FixedBitSet::new()));
        assert!(aspect.matches(&bits(&[0, 1, 2])));
    }

    #[test]
    fn test_order_independent_equality() {
        let registry = registry();
        let a = Aspect::all::<(Position, Velocity)>().compile(&registry).unwrap();
        let b = Aspect::all::<Velocity>()
            .all::<Position>()
            .all::<Velocity>()
            .compile(&registry)
            .unwrap();
        let c = AspectBuilder::new()
            .all_ids([ComponentId::from_raw(1), ComponentId::from_raw(0)])
            .compile(&registry)
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_stable_across_registration() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Position>();
        let before = Aspect::all::<Position>().compile(&registry).unwrap();

        registry.register::<Velocity>();
        registry.register::<Frozen>();
        let after = Aspect::all::<Position>().compile(&registry).unwrap();

        assert_eq!(before, after);
        // Wider compositions still match the old mask
        assert!(before.matches(&bits(&[0, 2])));
    }

    #[test]
    fn test_unknown_terms() {
        let registry = registry();

        assert!(matches!(
            Aspect::exclude::<Unregistered>().compile(&registry),
            Err(EcsError::UnknownType(_))
        ));
        assert!(matches!(
            AspectBuilder::new()
                .one_ids([ComponentId::from_raw(9)])
                .compile(&registry),
            Err(EcsError::UnknownComponent(_))
        ));
    }
}
