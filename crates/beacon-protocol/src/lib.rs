//! # beacon-protocol
//!
//! Wire protocol definitions for the Beacon presence system.
//!
//! This crate defines the presence records, subscription filters and frames
//! exchanged between the authoritative tier, the relay tier and clients.
//!
//! ## Frame Types
//!
//! - `WatchSpace` / `UnwatchSpace` - Relay interest in a space
//! - `Space` - Add, update or remove a user
//! - `AddFilter` / `UpdateFilter` / `RemoveFilter` - Client subscriptions
//! - `Ping` / `Pong` / `Error` - Keepalive and errors
//!
//! ## Example
//!
//! ```rust
//! use beacon_protocol::{codec, Frame, SpaceEvent, SpaceUser};
//!
//! let frame = Frame::space(SpaceEvent::add_user("lobby", SpaceUser::new(1, "Ann")));
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod filter;
pub mod frames;
pub mod user;

pub use codec::{decode, encode, FrameCodec, ProtocolError};
pub use filter::{FilterKind, SpaceFilter};
pub use frames::{Frame, FrameType, SpaceEvent};
pub use user::{AvailabilityStatus, CharacterLayer, PartialSpaceUser, SpaceUser, UserId};
