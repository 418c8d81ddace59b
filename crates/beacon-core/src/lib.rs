//! # beacon-core
//!
//! Presence spaces for the Beacon realtime presence system.
//!
//! Presence is served by two tiers:
//!
//! - **BackSpace** - The authoritative copy of a space. Each watching relay
//!   owns the users it introduced; mutations are re-broadcast to every other
//!   relay.
//! - **RelaySpace** - A relay's mirror of a space. Mutations are forwarded
//!   to local clients according to their filters.
//! - **Filters** - Named per-client views of a space, with delta
//!   computation when a view changes.
//! - **Registries** - `BackSpaces` and `RelaySpaces` create and collect
//!   spaces and route frames to them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Clients   │◀───▶│ RelaySpaces │◀───▶│ BackSpaces  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   ▲
//!        │                   ▼                   │
//!        │            ┌─────────────┐     other relays
//!        └────────────│   Filters   │
//!                     └─────────────┘
//! ```

pub mod back;
pub mod error;
pub mod filter;
pub mod registry;
pub mod relay;
pub mod user;
pub mod watcher;

pub use back::BackSpace;
pub use error::{ErrorSink, LogErrorSink, SpaceError};
pub use filter::{admits, delta, filter_users, Delta, FilteredUsers};
pub use registry::{validate_space_name, BackSpaces, RelaySpaces, SpacesConfig, SpacesStats};
pub use relay::RelaySpace;
pub use user::RelayUser;
pub use watcher::{ChannelWatcher, ClientWatcher, EventSink, Watcher, WatcherId};
