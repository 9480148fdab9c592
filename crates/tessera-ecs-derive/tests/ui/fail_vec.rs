//! Vec<T> is rejected in fixed components.

#![allow(dead_code)]

use tessera_ecs::Component;

#[derive(Component, Default)]
#[component(fixed)]
struct Inventory {
    items: Vec<u32>,
}

fn main() {}
