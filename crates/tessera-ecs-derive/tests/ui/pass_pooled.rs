//! Test that pooled components keep unrecognized fields and list them.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tessera_ecs::Component;

#[derive(Default)]
struct Sprite {
    frame: u32,
}

#[derive(Component, Default)]
#[component(pooled)]
struct PacketBuffer {
    incoming: VecDeque<u8>,
    outgoing: VecDeque<u8>,
    peers: HashMap<u32, String>,
    shared: Option<Arc<[u8]>>,
    sprite: Sprite,
    codec: Arc<str>,
}

#[derive(Component, Default)]
#[component(pooled)]
struct Wrapper<T: Default + Send + Sync + 'static> {
    inner: T,
    count: usize,
}

fn main() {
    assert_eq!(PacketBuffer::RETAINED_ON_RESET, &["sprite", "codec"]);

    let mut buffer = PacketBuffer::default();
    buffer.incoming.push_back(1);
    buffer.peers.insert(1, "a".into());
    buffer.sprite.frame = 5;
    buffer.reset();
    assert!(buffer.incoming.is_empty());
    assert!(buffer.peers.is_empty());
    assert_eq!(buffer.sprite.frame, 5);

    assert_eq!(Wrapper::<u8>::RETAINED_ON_RESET, &["inner"]);
    let mut w = Wrapper::<u8> { inner: 3, count: 2 };
    w.reset();
    assert_eq!(w.inner, 3);
    assert_eq!(w.count, 0);
}
