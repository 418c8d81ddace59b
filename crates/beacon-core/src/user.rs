//! The relay-side user record.

use beacon_protocol::{PartialSpaceUser, SpaceUser, UserId};
use std::ops::Deref;

/// A [`SpaceUser`] with its lowercased name cached for name filters.
///
/// The cache is only reachable through [`RelayUser::new`] and
/// [`RelayUser::apply`], so it always matches `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayUser {
    user: SpaceUser,
    lowercase_name: String,
}

impl RelayUser {
    /// Wrap a user.
    #[must_use]
    pub fn new(user: SpaceUser) -> Self {
        let lowercase_name = user.name.to_lowercase();
        Self {
            user,
            lowercase_name,
        }
    }

    /// Get the user's id.
    #[must_use]
    pub fn id(&self) -> UserId {
        self.user.id
    }

    /// Get the lowercased name.
    #[must_use]
    pub fn lowercase_name(&self) -> &str {
        &self.lowercase_name
    }

    /// Get the wrapped record.
    #[must_use]
    pub fn user(&self) -> &SpaceUser {
        &self.user
    }

    /// Merge a partial update, refreshing the cached name.
    pub fn apply(&mut self, update: &PartialSpaceUser) {
        if self.user.apply(update) {
            self.lowercase_name = self.user.name.to_lowercase();
        }
    }
}

impl Deref for RelayUser {
    type Target = SpaceUser;

    fn deref(&self) -> &SpaceUser {
        &self.user
    }
}

impl From<SpaceUser> for RelayUser {
    fn from(user: SpaceUser) -> Self {
        Self::new(user)
    }
}
