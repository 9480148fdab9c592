//! Test that primitives work in every strategy and reset to zero.

use tessera_ecs::{Component, StorageStrategy};

#[derive(Component, Default, Clone, Copy)]
#[component(fixed)]
struct Position {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Component, Default)]
struct Health(u16);

#[derive(Component, Default)]
#[component(pooled)]
struct Stats {
    hits: u32,
    alive: bool,
    grade: char,
    score: i64,
}

fn main() {
    assert!(matches!(Position::STRATEGY, StorageStrategy::Fixed));
    assert!(matches!(Health::STRATEGY, StorageStrategy::Plain));
    assert!(matches!(Stats::STRATEGY, StorageStrategy::Pooled));

    let mut stats = Stats {
        hits: 3,
        alive: true,
        grade: 'a',
        score: -9,
    };
    stats.reset();
    assert_eq!(stats.hits, 0);
    assert!(!stats.alive);
    assert_eq!(stats.grade, '\0');
    assert_eq!(stats.score, 0);
}
