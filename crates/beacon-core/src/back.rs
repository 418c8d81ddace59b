//! Authoritative space.
//!
//! The authoritative tier keeps, for every relay watching a space, the users
//! that relay introduced. Every mutation is re-broadcast unfiltered to every
//! other relay; filtering happens downstream.

use beacon_protocol::{Frame, PartialSpaceUser, SpaceEvent, SpaceUser, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::SpaceError;
use crate::watcher::{Watcher, WatcherId};

/// The users one relay introduced into a space.
struct Partition {
    watcher: Arc<dyn Watcher>,
    users: HashMap<UserId, SpaceUser>,
}

/// A space at the authoritative tier.
pub struct BackSpace {
    name: String,
    partitions: HashMap<WatcherId, Partition>,
}

impl BackSpace {
    /// Create an empty space.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(space = %name, "Space created");
        Self {
            name,
            partitions: HashMap::new(),
        }
    }

    /// Get the space name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a watcher and replay every known user to it.
    pub fn add_watcher(&mut self, watcher: Arc<dyn Watcher>) {
        let id = watcher.id();
        let mut replayed = 0;
        for (other, partition) in &self.partitions {
            if *other == id {
                continue;
            }
            for user in partition.users.values() {
                watcher.write(Frame::space(SpaceEvent::add_user(&self.name, user.clone())));
                replayed += 1;
            }
        }

        self.partitions.insert(
            id,
            Partition {
                watcher,
                users: HashMap::new(),
            },
        );
        debug!(space = %self.name, watcher = id, replayed, "Watcher added");
    }

    /// Drop a watcher and every user it introduced. Nobody is notified.
    ///
    /// Returns `true` if the watcher was registered.
    pub fn remove_watcher(&mut self, id: WatcherId) -> bool {
        let removed = self.partitions.remove(&id).is_some();
        if removed {
            debug!(space = %self.name, watcher = id, "Watcher removed");
        }
        removed
    }

    /// Add a user on behalf of `origin` and tell every other watcher.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::UnknownWatcher`] if `origin` is not registered.
    pub fn add_user(&mut self, origin: WatcherId, user: SpaceUser) -> Result<(), SpaceError> {
        let id = user.id;
        self.partition_mut(origin)?.users.insert(id, user.clone());
        self.broadcast(origin, SpaceEvent::add_user(&self.name, user));
        debug!(space = %self.name, watcher = origin, user = id, "User added");
        Ok(())
    }

    /// Merge an update into a user `origin` introduced and forward the
    /// update as received to every other watcher.
    ///
    /// Updates for users unknown to `origin` are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::UnknownWatcher`] if `origin` is not registered.
    pub fn update_user(
        &mut self,
        origin: WatcherId,
        update: PartialSpaceUser,
    ) -> Result<(), SpaceError> {
        let id = update.id;
        let known = match self.partition_mut(origin)?.users.get_mut(&id) {
            Some(user) => {
                user.apply(&update);
                true
            }
            None => false,
        };
        if !known {
            debug!(space = %self.name, watcher = origin, user = id, "Update for unknown user dropped");
            return Ok(());
        }
        self.broadcast(origin, SpaceEvent::update_user(&self.name, update));
        debug!(space = %self.name, watcher = origin, user = id, "User updated");
        Ok(())
    }

    /// Remove a user `origin` introduced and tell every other watcher,
    /// whether or not the user was known.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::UnknownWatcher`] if `origin` is not registered.
    pub fn remove_user(&mut self, origin: WatcherId, user_id: UserId) -> Result<(), SpaceError> {
        self.partition_mut(origin)?.users.remove(&user_id);
        self.broadcast(origin, SpaceEvent::remove_user(&self.name, user_id));
        debug!(space = %self.name, watcher = origin, user = user_id, "User removed");
        Ok(())
    }

    /// Check whether no watcher remains.
    #[must_use]
    pub fn can_be_deleted(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Get the number of watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.partitions.len()
    }

    /// Get the number of users across all watchers.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.partitions.values().map(|p| p.users.len()).sum()
    }

    /// Get the users introduced by one watcher.
    #[must_use]
    pub fn users_of(&self, watcher: WatcherId) -> Vec<&SpaceUser> {
        self.partitions
            .get(&watcher)
            .map(|p| p.users.values().collect())
            .unwrap_or_default()
    }

    fn partition_mut(&mut self, watcher: WatcherId) -> Result<&mut Partition, SpaceError> {
        self.partitions
            .get_mut(&watcher)
            .ok_or_else(|| SpaceError::UnknownWatcher {
                space: self.name.clone(),
                watcher,
            })
    }

    fn broadcast(&self, origin: WatcherId, event: SpaceEvent) {
        for (id, partition) in &self.partitions {
            if *id != origin {
                trace!(space = %self.name, watcher = id, "Forwarding event");
                partition.watcher.write(Frame::space(event.clone()));
            }
        }
    }
}

impl std::fmt::Debug for BackSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackSpace")
            .field("name", &self.name)
            .field("watchers", &self.partitions.len())
            .field("users", &self.user_count())
            .finish()
    }
}
