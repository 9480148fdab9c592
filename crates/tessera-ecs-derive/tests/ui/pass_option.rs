//! Test that Option fields reset to None in pooled components.

use tessera_ecs::{Component, Entity};

#[derive(Component, Default)]
#[component(pooled)]
struct Target {
    entity: Option<Entity>,
    distance: Option<f32>,
}

#[derive(Component, Default, Clone, Copy)]
#[component(fixed)]
struct Slot {
    item: Option<u32>,
}

fn main() {
    let mut target = Target {
        entity: None,
        distance: Some(4.0),
    };
    target.reset();
    assert!(target.distance.is_none());
    assert!(Target::RETAINED_ON_RESET.is_empty());

    let _ = Slot::default();
}
