//! Fixtures shared by the Beacon benchmarks.

use beacon_core::{ClientWatcher, EventSink, LogErrorSink, RelaySpace, Watcher, WatcherId};
use beacon_protocol::{Frame, SpaceFilter, SpaceUser, UserId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Sink counting frames and discarding them. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct CountingSink {
    frames: Arc<AtomicUsize>,
}

impl CountingSink {
    /// Number of frames written so far.
    pub fn count(&self) -> usize {
        self.frames.load(Ordering::Relaxed)
    }
}

impl EventSink for CountingSink {
    fn write(&self, _frame: Frame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

/// Watcher discarding every frame.
#[derive(Debug)]
pub struct NullWatcher(pub WatcherId);

impl EventSink for NullWatcher {
    fn write(&self, _frame: Frame) {}
}

impl Watcher for NullWatcher {
    fn id(&self) -> WatcherId {
        self.0
    }
}

/// A user whose name cycles through a small alphabet so name filters
/// admit a predictable share of the space.
pub fn user(id: UserId) -> SpaceUser {
    let mut user = SpaceUser::new(id, format!("{}-user-{}", ["ann", "bob", "cid", "dee"][id as usize % 4], id));
    user.megaphone_state = id % 10 == 0;
    user.camera_state = id % 2 == 0;
    user
}

/// A client watcher writing into `sink`, with `filters` declared.
pub fn client(id: WatcherId, sink: CountingSink, filters: &[SpaceFilter]) -> Arc<ClientWatcher> {
    let watcher = ClientWatcher::new(id, sink);
    for filter in filters {
        watcher.declare_filter(filter.clone());
    }
    Arc::new(watcher)
}

/// A relay space with `users` users and `clients` clients sharing `filters`.
pub fn relay_space(
    users: u32,
    clients: u64,
    filters: &[SpaceFilter],
) -> (RelaySpace, CountingSink) {
    let sink = CountingSink::default();
    let upstream: Arc<dyn EventSink> = Arc::new(NullWatcher(0));
    let mut space = RelaySpace::new(
        "bench",
        upstream,
        0,
        client(1, sink.clone(), filters),
        Arc::new(LogErrorSink),
    );
    for id in 2..=clients {
        space.add_client_watcher(client(id, sink.clone(), filters));
    }
    for id in 0..users {
        space.local_add_user(user(id));
    }
    (space, sink)
}
