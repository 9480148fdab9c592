//! Test that enums derive Component for every strategy.

use tessera_ecs::{Component, StorageStrategy};

#[derive(Component, Default, Clone, Copy, PartialEq, Debug)]
enum GameMode {
    #[default]
    Survival,
    Creative,
}

#[derive(Component, Default, Clone, Copy)]
#[component(fixed)]
enum Direction {
    #[default]
    North,
    South,
    East,
    West,
}

#[derive(Component, Default, PartialEq, Debug)]
#[component(pooled)]
enum Order {
    #[default]
    Idle,
    MoveTo { x: f32, y: f32 },
}

fn main() {
    assert!(matches!(GameMode::STRATEGY, StorageStrategy::Plain));
    assert!(matches!(Direction::STRATEGY, StorageStrategy::Fixed));

    let mut order = Order::MoveTo { x: 1.0, y: 2.0 };
    order.reset();
    assert_eq!(order, Order::Idle);
}
