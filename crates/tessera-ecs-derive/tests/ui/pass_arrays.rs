//! Test that fixed-size arrays are allowed in fixed and pooled components.

use tessera_ecs::{Component, StorageStrategy};

#[derive(Component, Default, Clone, Copy)]
#[component(fixed)]
struct ChunkKey {
    bytes: [u8; 13],
}

#[derive(Component, Default)]
#[component(pooled)]
struct Matrix3x3 {
    values: [[f32; 3]; 3],
}

#[derive(Component, Default)]
#[component(pooled)]
struct Lanes {
    queues: [Vec<u32>; 4],
}

fn main() {
    assert!(matches!(ChunkKey::STRATEGY, StorageStrategy::Fixed));

    let mut m = Matrix3x3 { values: [[1.0; 3]; 3] };
    m.reset();
    assert_eq!(m.values, [[0.0; 3]; 3]);
    assert!(Matrix3x3::RETAINED_ON_RESET.is_empty());

    let mut lanes = Lanes::default();
    lanes.queues[2].push(7);
    lanes.reset();
    assert!(lanes.queues.iter().all(Vec::is_empty));
}
