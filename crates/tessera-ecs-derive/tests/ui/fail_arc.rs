//! Arc<T> is rejected in fixed components, even inside an Option.

#![allow(dead_code)]

use std::sync::Arc;

use tessera_ecs::Component;

#[derive(Component, Default)]
#[component(fixed)]
struct Shared {
    data: Option<Arc<[u8]>>,
}

fn main() {}
