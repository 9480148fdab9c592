//! Unions cannot be components.

#![allow(dead_code)]

use tessera_ecs::Component;

#[derive(Component)]
union Bits {
    int: u32,
    float: f32,
}

fn main() {}
