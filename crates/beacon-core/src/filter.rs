//! Filter evaluation.

use beacon_protocol::{FilterKind, SpaceFilter, UserId};
use std::collections::BTreeMap;

use crate::error::{ErrorSink, SpaceError};
use crate::user::RelayUser;

/// A filtered view of a space's users, ordered by id.
pub type FilteredUsers<'a> = BTreeMap<UserId, &'a RelayUser>;

/// Check whether a predicate admits a user.
#[must_use]
pub fn admits(kind: &FilterKind, user: &RelayUser) -> bool {
    match kind {
        FilterKind::ContainsName { value } => user.lowercase_name().contains(&value.to_lowercase()),
        FilterKind::Everybody => true,
        FilterKind::LiveStreaming => {
            (user.screen_sharing || user.microphone_state || user.camera_state)
                && user.megaphone_state
        }
    }
}

/// Check whether a filter admits a user.
///
/// A filter without predicate admits nobody and is reported to `errors`.
pub fn filter_admits(filter: &SpaceFilter, user: &RelayUser, errors: &dyn ErrorSink) -> bool {
    match &filter.filter {
        Some(kind) => admits(kind, user),
        None => {
            errors.report(&SpaceError::EmptyFilter {
                space: filter.space_name.clone(),
                filter_name: filter.filter_name.clone(),
            });
            false
        }
    }
}

/// Compute the view of `users` under `filter`.
pub fn filter_users<'a, I>(filter: &SpaceFilter, users: I, errors: &dyn ErrorSink) -> FilteredUsers<'a>
where
    I: IntoIterator<Item = &'a RelayUser>,
{
    if filter.filter.is_none() {
        // One report per view, not one per user.
        errors.report(&SpaceError::EmptyFilter {
            space: filter.space_name.clone(),
            filter_name: filter.filter_name.clone(),
        });
        return FilteredUsers::new();
    }

    users
        .into_iter()
        .filter(|user| filter_admits(filter, user, errors))
        .map(|user| (user.id(), user))
        .collect()
}

/// Users entering and leaving a view when it changes from `old` to `new`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Delta<'a> {
    /// Users in `new` but not in `old`.
    pub added: Vec<&'a RelayUser>,
    /// Users in `old` but not in `new`.
    pub removed: Vec<UserId>,
}

/// Compare two views of the same user set by user id.
#[must_use]
pub fn delta<'a>(old: &FilteredUsers<'a>, new: &FilteredUsers<'a>) -> Delta<'a> {
    Delta {
        added: new
            .iter()
            .filter(|(id, _)| !old.contains_key(*id))
            .map(|(_, user)| *user)
            .collect(),
        removed: old.keys().filter(|id| !new.contains_key(*id)).copied().collect(),
    }
}
