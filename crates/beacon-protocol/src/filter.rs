//! Subscription filters declared by clients.

use serde::{Deserialize, Serialize};

/// The predicate carried by a [`SpaceFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "case", rename_all = "camelCase")]
pub enum FilterKind {
    /// Case-insensitive substring match on the user's name.
    ContainsName {
        /// Text to look for.
        value: String,
    },
    /// Every user.
    Everybody,
    /// Users broadcasting media through the megaphone.
    LiveStreaming,
}

/// A named filter owned by one client within one space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceFilter {
    /// Space the filter applies to.
    pub space_name: String,
    /// Name identifying the filter within its (client, space) scope.
    pub filter_name: String,
    /// The predicate. `None` when the client sent a filter without payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterKind>,
}

impl SpaceFilter {
    /// Create a filter.
    #[must_use]
    pub fn new(
        space_name: impl Into<String>,
        filter_name: impl Into<String>,
        filter: FilterKind,
    ) -> Self {
        Self {
            space_name: space_name.into(),
            filter_name: filter_name.into(),
            filter: Some(filter),
        }
    }

    /// Create a filter admitting every user.
    #[must_use]
    pub fn everybody(space_name: impl Into<String>, filter_name: impl Into<String>) -> Self {
        Self::new(space_name, filter_name, FilterKind::Everybody)
    }

    /// Create a filter matching names containing `value`.
    #[must_use]
    pub fn contains_name(
        space_name: impl Into<String>,
        filter_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            space_name,
            filter_name,
            FilterKind::ContainsName {
                value: value.into(),
            },
        )
    }

    /// Create a filter matching live-streaming users.
    #[must_use]
    pub fn live_streaming(space_name: impl Into<String>, filter_name: impl Into<String>) -> Self {
        Self::new(space_name, filter_name, FilterKind::LiveStreaming)
    }
}
