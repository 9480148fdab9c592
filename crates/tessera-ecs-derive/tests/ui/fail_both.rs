//! A component picks a single storage strategy.

#![allow(dead_code)]

use tessera_ecs::Component;

#[derive(Component, Default)]
#[component(pooled, fixed)]
struct Undecided {
    value: u32,
}

fn main() {}
