//! Frame types for the Beacon protocol.
//!
//! Frames are the unit exchanged on every connection: between the relay and
//! the authoritative tier, and between the relay and its clients.
//! Each frame is serialized using MessagePack.

use serde::{Deserialize, Serialize};

use crate::filter::SpaceFilter;
use crate::user::{PartialSpaceUser, SpaceUser, UserId};

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    WatchSpace = 0x01,
    UnwatchSpace = 0x02,
    Space = 0x03,
    AddFilter = 0x04,
    UpdateFilter = 0x05,
    RemoveFilter = 0x06,
    Ping = 0x07,
    Pong = 0x08,
    Error = 0x09,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::WatchSpace),
            0x02 => Ok(FrameType::UnwatchSpace),
            0x03 => Ok(FrameType::Space),
            0x04 => Ok(FrameType::AddFilter),
            0x05 => Ok(FrameType::UpdateFilter),
            0x06 => Ok(FrameType::RemoveFilter),
            0x07 => Ok(FrameType::Ping),
            0x08 => Ok(FrameType::Pong),
            0x09 => Ok(FrameType::Error),
            _ => Err("Invalid frame type"),
        }
    }
}

/// A presence mutation scoped to one space.
///
/// `filter_name` is set only on relay-to-client events and names the
/// subscription that produced the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "case", rename_all = "camelCase")]
pub enum SpaceEvent {
    /// A user became present (or visible).
    #[serde(rename_all = "camelCase")]
    AddUser {
        space_name: String,
        user: SpaceUser,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter_name: Option<String>,
    },

    /// Some fields of a user changed.
    #[serde(rename_all = "camelCase")]
    UpdateUser {
        space_name: String,
        user: PartialSpaceUser,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter_name: Option<String>,
    },

    /// A user left (or became hidden).
    #[serde(rename_all = "camelCase")]
    RemoveUser {
        space_name: String,
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter_name: Option<String>,
    },
}

impl SpaceEvent {
    /// Create an unfiltered add event.
    #[must_use]
    pub fn add_user(space_name: impl Into<String>, user: SpaceUser) -> Self {
        SpaceEvent::AddUser {
            space_name: space_name.into(),
            user,
            filter_name: None,
        }
    }

    /// Create an unfiltered update event.
    #[must_use]
    pub fn update_user(space_name: impl Into<String>, user: PartialSpaceUser) -> Self {
        SpaceEvent::UpdateUser {
            space_name: space_name.into(),
            user,
            filter_name: None,
        }
    }

    /// Create an unfiltered remove event.
    #[must_use]
    pub fn remove_user(space_name: impl Into<String>, user_id: UserId) -> Self {
        SpaceEvent::RemoveUser {
            space_name: space_name.into(),
            user_id,
            filter_name: None,
        }
    }

    /// Tag the event with the filter that admitted it.
    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>) -> Self {
        let name = Some(name.into());
        match &mut self {
            SpaceEvent::AddUser { filter_name, .. }
            | SpaceEvent::UpdateUser { filter_name, .. }
            | SpaceEvent::RemoveUser { filter_name, .. } => *filter_name = name,
        }
        self
    }

    /// Name of the space the event belongs to.
    #[must_use]
    pub fn space_name(&self) -> &str {
        match self {
            SpaceEvent::AddUser { space_name, .. }
            | SpaceEvent::UpdateUser { space_name, .. }
            | SpaceEvent::RemoveUser { space_name, .. } => space_name,
        }
    }

    /// Identifier of the user the event is about.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        match self {
            SpaceEvent::AddUser { user, .. } => user.id,
            SpaceEvent::UpdateUser { user, .. } => user.id,
            SpaceEvent::RemoveUser { user_id, .. } => *user_id,
        }
    }

    /// Name of the filter that admitted the event, if any.
    #[must_use]
    pub fn filter_name(&self) -> Option<&str> {
        match self {
            SpaceEvent::AddUser { filter_name, .. }
            | SpaceEvent::UpdateUser { filter_name, .. }
            | SpaceEvent::RemoveUser { filter_name, .. } => filter_name.as_deref(),
        }
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Relay asks the authoritative tier to start sending a space.
    #[serde(rename = "watchSpace")]
    WatchSpace {
        /// Space to watch.
        #[serde(rename = "spaceName")]
        space_name: String,
    },

    /// Relay stops watching a space.
    #[serde(rename = "unwatchSpace")]
    UnwatchSpace {
        /// Space to stop watching.
        #[serde(rename = "spaceName")]
        space_name: String,
    },

    /// A presence mutation.
    #[serde(rename = "space")]
    Space {
        /// The mutation.
        event: SpaceEvent,
    },

    /// Client declares a new filter.
    #[serde(rename = "addFilter")]
    AddFilter {
        /// The filter.
        filter: SpaceFilter,
    },

    /// Client redefines an existing filter, matched by name.
    #[serde(rename = "updateFilter")]
    UpdateFilter {
        /// The new definition.
        filter: SpaceFilter,
    },

    /// Client drops a filter.
    #[serde(rename = "removeFilter")]
    RemoveFilter {
        /// The filter being removed.
        filter: SpaceFilter,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Error report.
    #[serde(rename = "error")]
    Error {
        /// Error code.
        code: u16,
        /// Human-readable error message.
        message: String,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::WatchSpace { .. } => FrameType::WatchSpace,
            Frame::UnwatchSpace { .. } => FrameType::UnwatchSpace,
            Frame::Space { .. } => FrameType::Space,
            Frame::AddFilter { .. } => FrameType::AddFilter,
            Frame::UpdateFilter { .. } => FrameType::UpdateFilter,
            Frame::RemoveFilter { .. } => FrameType::RemoveFilter,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Error { .. } => FrameType::Error,
        }
    }

    /// Create a WatchSpace frame.
    #[must_use]
    pub fn watch_space(space_name: impl Into<String>) -> Self {
        Frame::WatchSpace {
            space_name: space_name.into(),
        }
    }

    /// Create an UnwatchSpace frame.
    #[must_use]
    pub fn unwatch_space(space_name: impl Into<String>) -> Self {
        Frame::UnwatchSpace {
            space_name: space_name.into(),
        }
    }

    /// Wrap a space event.
    #[must_use]
    pub fn space(event: SpaceEvent) -> Self {
        Frame::Space { event }
    }

    /// Create a Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create an Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            code,
            message: message.into(),
        }
    }

    /// The space event carried by this frame, if any.
    #[must_use]
    pub fn as_event(&self) -> Option<&SpaceEvent> {
        match self {
            Frame::Space { event } => Some(event),
            _ => None,
        }
    }
}

impl From<SpaceEvent> for Frame {
    fn from(event: SpaceEvent) -> Self {
        Frame::Space { event }
    }
}
