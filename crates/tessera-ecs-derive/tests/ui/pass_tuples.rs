//! Test that tuple fields and tuple structs reset element by element.

use tessera_ecs::Component;

#[derive(Component, Default, Clone, Copy)]
#[component(fixed)]
struct Velocity(f32, f32, f32);

#[derive(Component, Default)]
#[component(pooled)]
struct Path {
    cursor: (u32, Option<u32>),
    points: Vec<(f32, f32)>,
}

#[derive(Component, Default)]
#[component(pooled)]
struct Pair(u8, String);

fn main() {
    let mut path = Path {
        cursor: (4, Some(2)),
        points: vec![(1.0, 1.0)],
    };
    path.reset();
    assert_eq!(path.cursor, (0, None));
    assert!(path.points.is_empty());

    let mut pair = Pair(9, "nine".into());
    pair.reset();
    assert_eq!(pair.0, 0);
    assert!(pair.1.is_empty());

    let _ = Velocity::default();
}
