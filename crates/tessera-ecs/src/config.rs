//! World configuration.

/// Sizing and diagnostics knobs for a [`World`](crate::World).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WorldConfig {
    /// Entity count the allocator, composition table and storages are
    /// pre-sized for.
    pub expected_entities: usize,
    /// Upper bound on reset instances kept per pooled component type.
    pub pool_limit: usize,
    /// Emit a `debug` summary event for every tick.
    pub trace_ticks: bool,
    /// Exclusive upper bound on ids accepted by `World::create_exact`.
    pub id_limit: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            expected_entities: 1024,
            pool_limit: 4096,
            trace_ticks: true,
            id_limit: 1 << 24,
        }
    }
}

impl WorldConfig {
    /// Set the expected entity count.
    #[must_use]
    pub const fn with_expected_entities(mut self, expected_entities: usize) -> Self {
        self.expected_entities = expected_entities;
        self
    }

    /// Set the per-type pool bound.
    #[must_use]
    pub const fn with_pool_limit(mut self, pool_limit: usize) -> Self {
        self.pool_limit = pool_limit;
        self
    }

    /// Enable or disable the per-tick summary event.
    #[must_use]
    pub const fn with_trace_ticks(mut self, trace_ticks: bool) -> Self {
        self.trace_ticks = trace_ticks;
        self
    }

    /// Set the exclusive upper bound for explicit ids.
    #[must_use]
    pub const fn with_id_limit(mut self, id_limit: u32) -> Self {
        self.id_limit = id_limit;
        self
    }
}
