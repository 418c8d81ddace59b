//! Space errors and the sink that receives non-fatal anomalies.

use beacon_protocol::{FrameType, UserId};
use thiserror::Error;
use tracing::error;

use crate::watcher::WatcherId;

/// Errors raised by spaces and space registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpaceError {
    /// Invalid space name.
    #[error("Invalid space name: {0}")]
    InvalidSpaceName(&'static str),

    /// Space not found.
    #[error("Space not found: {0}")]
    UnknownSpace(String),

    /// A watcher that never called `add_watcher` addressed the space.
    #[error("No users list associated to watcher {watcher} in space {space}")]
    UnknownWatcher { space: String, watcher: WatcherId },

    /// Update or removal of a user the space does not know.
    #[error("User {user_id} not found in space {space}")]
    UnknownUser { space: String, user_id: UserId },

    /// A filter arrived without its predicate.
    #[error("Empty filter {filter_name} received for space {space}")]
    EmptyFilter { space: String, filter_name: String },

    /// Maximum number of spaces reached.
    #[error("Maximum spaces reached")]
    MaxSpacesReached,

    /// The frame has no meaning on this side of the connection.
    #[error("Unexpected frame: {0:?}")]
    UnexpectedFrame(FrameType),
}

/// Receives anomalies that do not interrupt the operation that found them.
///
/// Implementations must not block.
pub trait ErrorSink: Send + Sync {
    /// Report an anomaly.
    fn report(&self, error: &SpaceError);
}

/// Error sink writing to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, error: &SpaceError) {
        error!(error = %error, "Space anomaly");
    }
}
