//! Downstream connection endpoints.
//!
//! A watcher is anything a space can write frames to. At the authoritative
//! tier it is a relay connection; at the relay tier it is a
//! [`ClientWatcher`], which also carries the client's filters.

use beacon_protocol::{Frame, SpaceFilter};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

/// Identifier of a watcher, unique per process.
pub type WatcherId = u64;

/// Destination for outgoing frames.
///
/// `write` enqueues and returns immediately. Batching and backpressure are
/// the connection's business.
pub trait EventSink: Send + Sync {
    /// Enqueue a frame.
    fn write(&self, frame: Frame);
}

/// An [`EventSink`] with an identity, used to skip the originator of a
/// mutation and to key per-watcher state.
pub trait Watcher: EventSink {
    /// Get the watcher's identifier.
    fn id(&self) -> WatcherId;
}

impl EventSink for mpsc::UnboundedSender<Frame> {
    fn write(&self, frame: Frame) {
        if self.send(frame).is_err() {
            trace!("Dropping frame for closed connection");
        }
    }
}

/// A watcher backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelWatcher {
    id: WatcherId,
    sender: mpsc::UnboundedSender<Frame>,
}

impl ChannelWatcher {
    /// Create a watcher and the receiving half of its queue.
    #[must_use]
    pub fn new(id: WatcherId) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { id, sender }, receiver)
    }

    /// Create a watcher writing into an existing channel.
    #[must_use]
    pub fn with_sender(id: WatcherId, sender: mpsc::UnboundedSender<Frame>) -> Self {
        Self { id, sender }
    }
}

impl EventSink for ChannelWatcher {
    fn write(&self, frame: Frame) {
        self.sender.write(frame);
    }
}

impl Watcher for ChannelWatcher {
    fn id(&self) -> WatcherId {
        self.id
    }
}

/// An end-client connection at the relay tier.
///
/// The client owns its filters, grouped by space name. Relay spaces read
/// them when deciding what to forward.
pub struct ClientWatcher {
    id: WatcherId,
    sink: Box<dyn EventSink>,
    spaces_filters: DashMap<String, Vec<SpaceFilter>>,
}

impl ClientWatcher {
    /// Create a client watcher.
    #[must_use]
    pub fn new(id: WatcherId, sink: impl EventSink + 'static) -> Self {
        Self {
            id,
            sink: Box::new(sink),
            spaces_filters: DashMap::new(),
        }
    }

    /// Get a copy of the filters declared for a space.
    #[must_use]
    pub fn filters(&self, space_name: &str) -> Vec<SpaceFilter> {
        self.spaces_filters
            .get(space_name)
            .map(|filters| filters.value().clone())
            .unwrap_or_default()
    }

    /// Find a filter by name.
    #[must_use]
    pub fn find_filter(&self, space_name: &str, filter_name: &str) -> Option<SpaceFilter> {
        self.spaces_filters.get(space_name).and_then(|filters| {
            filters
                .iter()
                .find(|f| f.filter_name == filter_name)
                .cloned()
        })
    }

    /// Record a filter without notifying anyone.
    ///
    /// A filter with the same name in the same space is replaced.
    pub fn declare_filter(&self, filter: SpaceFilter) {
        let mut filters = self
            .spaces_filters
            .entry(filter.space_name.clone())
            .or_default();
        match filters
            .iter_mut()
            .find(|f| f.filter_name == filter.filter_name)
        {
            Some(existing) => *existing = filter,
            None => filters.push(filter),
        }
    }

    /// Forget a filter. Returns the removed definition.
    pub fn forget_filter(&self, space_name: &str, filter_name: &str) -> Option<SpaceFilter> {
        let mut filters = self.spaces_filters.get_mut(space_name)?;
        let position = filters.iter().position(|f| f.filter_name == filter_name)?;
        Some(filters.value_mut().remove(position))
    }

    /// Names of the spaces this client has filters for.
    #[must_use]
    pub fn filtered_spaces(&self) -> Vec<String> {
        self.spaces_filters.iter().map(|e| e.key().clone()).collect()
    }
}

impl std::fmt::Debug for ClientWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientWatcher")
            .field("id", &self.id)
            .field("spaces", &self.spaces_filters.len())
            .finish()
    }
}

impl EventSink for ClientWatcher {
    fn write(&self, frame: Frame) {
        self.sink.write(frame);
    }
}

impl Watcher for ClientWatcher {
    fn id(&self) -> WatcherId {
        self.id
    }
}
