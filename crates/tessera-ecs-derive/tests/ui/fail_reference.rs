//! References are rejected in fixed components.

#![allow(dead_code)]

use tessera_ecs::Component;

#[derive(Component)]
#[component(fixed)]
struct Borrowed<'a> {
    data: &'a [u8],
}

fn main() {}
