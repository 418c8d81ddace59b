//! Space registries.
//!
//! Each tier keeps its spaces in a [`DashMap`] keyed by name. A space is
//! created by the first watcher that asks for it and deleted once nothing
//! keeps it alive. All mutation of a space happens under its entry guard.

use beacon_protocol::{Frame, PartialSpaceUser, SpaceEvent, SpaceFilter, SpaceUser, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::back::BackSpace;
use crate::error::{ErrorSink, SpaceError};
use crate::relay::RelaySpace;
use crate::watcher::{ClientWatcher, EventSink, Watcher, WatcherId};

/// Maximum space name length.
pub const MAX_SPACE_NAME_LENGTH: usize = 256;

/// Validate a space name.
///
/// # Errors
///
/// Returns a description of the problem if the name is rejected.
pub fn validate_space_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Space name cannot be empty");
    }
    if name.len() > MAX_SPACE_NAME_LENGTH {
        return Err("Space name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Space name contains control characters");
    }
    Ok(())
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct SpacesConfig {
    /// Maximum number of spaces.
    pub max_spaces: usize,
}

impl Default for SpacesConfig {
    fn default() -> Self {
        Self { max_spaces: 10_000 }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpacesStats {
    /// Number of live spaces.
    pub space_count: usize,
    /// Number of watchers attached to at least one space.
    pub watcher_count: usize,
    /// Number of users across all spaces.
    pub user_count: usize,
}

/// Registry of the authoritative tier.
pub struct BackSpaces {
    spaces: DashMap<String, BackSpace>,
    /// Spaces each watcher is attached to.
    watched: DashMap<WatcherId, DashSet<String>>,
    config: SpacesConfig,
}

impl BackSpaces {
    /// Create a registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SpacesConfig::default())
    }

    /// Create a registry with custom configuration.
    #[must_use]
    pub fn with_config(config: SpacesConfig) -> Self {
        info!("Creating authoritative registry with config: {:?}", config);
        Self {
            spaces: DashMap::new(),
            watched: DashMap::new(),
            config,
        }
    }

    /// Attach a watcher to a space, creating the space if needed.
    ///
    /// The watcher receives every user already in the space.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the space limit is reached.
    pub fn watch_space(&self, space_name: &str, watcher: Arc<dyn Watcher>) -> Result<(), SpaceError> {
        validate_space_name(space_name).map_err(SpaceError::InvalidSpaceName)?;
        if !self.spaces.contains_key(space_name) && self.spaces.len() >= self.config.max_spaces {
            return Err(SpaceError::MaxSpacesReached);
        }

        let id = watcher.id();
        self.spaces
            .entry(space_name.to_string())
            .or_insert_with(|| BackSpace::new(space_name))
            .add_watcher(watcher);
        self.watched
            .entry(id)
            .or_default()
            .insert(space_name.to_string());
        Ok(())
    }

    /// Detach a watcher from a space, deleting the space once unwatched.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::UnknownSpace`] if the space does not exist.
    pub fn unwatch_space(&self, space_name: &str, id: WatcherId) -> Result<(), SpaceError> {
        {
            let mut space = self
                .spaces
                .get_mut(space_name)
                .ok_or_else(|| SpaceError::UnknownSpace(space_name.to_string()))?;
            space.remove_watcher(id);
        }
        if let Some(names) = self.watched.get(&id) {
            names.remove(space_name);
        }
        self.watched.remove_if(&id, |_, names| names.is_empty());
        self.collect(space_name);
        Ok(())
    }

    /// Detach a watcher from every space, on disconnect.
    pub fn unwatch_all(&self, id: WatcherId) {
        let Some((_, names)) = self.watched.remove(&id) else {
            return;
        };
        for name in names {
            if let Some(mut space) = self.spaces.get_mut(&name) {
                space.remove_watcher(id);
            }
            self.collect(&name);
        }
        debug!(watcher = id, "Unwatched all spaces");
    }

    /// Add a user on behalf of a watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the space does not exist or the watcher is not
    /// attached to it.
    pub fn add_user(&self, space_name: &str, origin: WatcherId, user: SpaceUser) -> Result<(), SpaceError> {
        self.space_mut(space_name)?.add_user(origin, user)
    }

    /// Update a user on behalf of a watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the space does not exist or the watcher is not
    /// attached to it.
    pub fn update_user(
        &self,
        space_name: &str,
        origin: WatcherId,
        update: PartialSpaceUser,
    ) -> Result<(), SpaceError> {
        self.space_mut(space_name)?.update_user(origin, update)
    }

    /// Remove a user on behalf of a watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the space does not exist or the watcher is not
    /// attached to it.
    pub fn remove_user(&self, space_name: &str, origin: WatcherId, user_id: UserId) -> Result<(), SpaceError> {
        self.space_mut(space_name)?.remove_user(origin, user_id)
    }

    /// Handle a frame received from a relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be applied.
    pub fn handle_frame(&self, watcher: &Arc<dyn Watcher>, frame: Frame) -> Result<(), SpaceError> {
        let origin = watcher.id();
        match frame {
            Frame::WatchSpace { space_name } => self.watch_space(&space_name, Arc::clone(watcher)),
            Frame::UnwatchSpace { space_name } => self.unwatch_space(&space_name, origin),
            Frame::Space { event } => match event {
                SpaceEvent::AddUser {
                    space_name, user, ..
                } => self.add_user(&space_name, origin, user),
                SpaceEvent::UpdateUser {
                    space_name, user, ..
                } => self.update_user(&space_name, origin, user),
                SpaceEvent::RemoveUser {
                    space_name,
                    user_id,
                    ..
                } => self.remove_user(&space_name, origin, user_id),
            },
            Frame::Ping { timestamp } => {
                watcher.write(Frame::pong(timestamp));
                Ok(())
            }
            Frame::Pong { .. } => Ok(()),
            other => Err(SpaceError::UnexpectedFrame(other.frame_type())),
        }
    }

    /// Check if a space exists.
    #[must_use]
    pub fn space_exists(&self, space_name: &str) -> bool {
        self.spaces.contains_key(space_name)
    }

    /// Get the spaces a watcher is attached to.
    #[must_use]
    pub fn watcher_spaces(&self, id: WatcherId) -> Vec<String> {
        self.watched
            .get(&id)
            .map(|names| names.iter().map(|n| n.clone()).collect())
            .unwrap_or_default()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> SpacesStats {
        SpacesStats {
            space_count: self.spaces.len(),
            watcher_count: self.watched.len(),
            user_count: self.spaces.iter().map(|s| s.user_count()).sum(),
        }
    }

    fn space_mut(
        &self,
        space_name: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, BackSpace>, SpaceError> {
        self.spaces
            .get_mut(space_name)
            .ok_or_else(|| SpaceError::UnknownSpace(space_name.to_string()))
    }

    fn collect(&self, space_name: &str) {
        if self
            .spaces
            .remove_if(space_name, |_, space| space.can_be_deleted())
            .is_some()
        {
            debug!(space = %space_name, "Deleted unwatched space");
        }
    }
}

impl Default for BackSpaces {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of the relay tier.
///
/// Owns the connection to the authoritative tier: the first client joining a
/// space makes the registry watch it upstream, and the space is unwatched
/// once it holds neither users nor clients.
pub struct RelaySpaces {
    spaces: DashMap<String, RelaySpace>,
    /// Spaces each client has joined.
    joined: DashMap<WatcherId, DashSet<String>>,
    upstream: Arc<dyn EventSink>,
    back_id: u64,
    errors: Arc<dyn ErrorSink>,
    config: SpacesConfig,
}

impl RelaySpaces {
    /// Create a registry with default configuration.
    #[must_use]
    pub fn new(upstream: Arc<dyn EventSink>, back_id: u64, errors: Arc<dyn ErrorSink>) -> Self {
        Self::with_config(upstream, back_id, errors, SpacesConfig::default())
    }

    /// Create a registry with custom configuration.
    #[must_use]
    pub fn with_config(
        upstream: Arc<dyn EventSink>,
        back_id: u64,
        errors: Arc<dyn ErrorSink>,
        config: SpacesConfig,
    ) -> Self {
        info!(back = back_id, "Creating relay registry with config: {:?}", config);
        Self {
            spaces: DashMap::new(),
            joined: DashMap::new(),
            upstream,
            back_id,
            errors,
            config,
        }
    }

    /// Add a client to a space.
    ///
    /// The first client creates the space and makes it watched upstream.
    /// Later clients receive the users their filters already admit.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the space limit is reached.
    pub fn join(&self, space_name: &str, watcher: Arc<ClientWatcher>) -> Result<(), SpaceError> {
        validate_space_name(space_name).map_err(SpaceError::InvalidSpaceName)?;
        if !self.spaces.contains_key(space_name) && self.spaces.len() >= self.config.max_spaces {
            return Err(SpaceError::MaxSpacesReached);
        }

        let id = watcher.id();
        match self.spaces.entry(space_name.to_string()) {
            Entry::Occupied(mut entry) => entry.get_mut().add_client_watcher(watcher),
            Entry::Vacant(entry) => {
                self.upstream.write(Frame::watch_space(space_name));
                entry.insert(RelaySpace::new(
                    space_name,
                    Arc::clone(&self.upstream),
                    self.back_id,
                    watcher,
                    Arc::clone(&self.errors),
                ));
            }
        }
        self.joined
            .entry(id)
            .or_default()
            .insert(space_name.to_string());
        Ok(())
    }

    /// Remove a client from a space.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::UnknownSpace`] if the space does not exist.
    pub fn leave(&self, space_name: &str, id: WatcherId) -> Result<(), SpaceError> {
        self.space_mut(space_name)?.remove_client_watcher(id);
        if let Some(names) = self.joined.get(&id) {
            names.remove(space_name);
        }
        self.joined.remove_if(&id, |_, names| names.is_empty());
        self.collect(space_name);
        Ok(())
    }

    /// Remove a client from every space, on disconnect.
    pub fn leave_all(&self, id: WatcherId) {
        let Some((_, names)) = self.joined.remove(&id) else {
            return;
        };
        for name in names {
            if let Some(mut space) = self.spaces.get_mut(&name) {
                space.remove_client_watcher(id);
            }
            self.collect(&name);
        }
        debug!(watcher = id, "Left all spaces");
    }

    /// Add a user made by a local client.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::UnknownSpace`] if the space does not exist.
    pub fn add_user(&self, space_name: &str, user: SpaceUser) -> Result<(), SpaceError> {
        self.space_mut(space_name)?.add_user(user);
        Ok(())
    }

    /// Update a user on behalf of a local client.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::UnknownSpace`] if the space does not exist.
    pub fn update_user(&self, space_name: &str, update: PartialSpaceUser) -> Result<(), SpaceError> {
        self.space_mut(space_name)?.update_user(update);
        Ok(())
    }

    /// Remove a user on behalf of a local client.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::UnknownSpace`] if the space does not exist.
    pub fn remove_user(&self, space_name: &str, user_id: UserId) -> Result<(), SpaceError> {
        self.space_mut(space_name)?.remove_user(user_id);
        self.collect(space_name);
        Ok(())
    }

    /// Handle a frame received from the authoritative tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame addresses an unknown space or has no
    /// meaning coming from upstream.
    pub fn handle_upstream(&self, frame: Frame) -> Result<(), SpaceError> {
        match frame {
            Frame::Space { event } => {
                let space_name = event.space_name().to_string();
                {
                    let mut space = self.space_mut(&space_name)?;
                    match event {
                        SpaceEvent::AddUser { user, .. } => space.local_add_user(user),
                        SpaceEvent::UpdateUser { user, .. } => space.local_update_user(user),
                        SpaceEvent::RemoveUser { user_id, .. } => space.local_remove_user(user_id),
                    }
                }
                self.collect(&space_name);
                Ok(())
            }
            Frame::Ping { timestamp } => {
                self.upstream.write(Frame::pong(timestamp));
                Ok(())
            }
            Frame::Pong { .. } => Ok(()),
            Frame::Error { code, message } => {
                warn!(back = self.back_id, code, message = %message, "Upstream error");
                Ok(())
            }
            other => Err(SpaceError::UnexpectedFrame(other.frame_type())),
        }
    }

    /// Declare a client filter.
    ///
    /// If the space is live, the client receives the users the filter admits.
    pub fn add_filter(&self, watcher: &ClientWatcher, filter: SpaceFilter) {
        match self.spaces.get(&filter.space_name) {
            Some(space) => space.handle_add_filter(watcher, filter),
            None => watcher.declare_filter(filter),
        }
    }

    /// Redefine a client filter.
    pub fn update_filter(&self, watcher: &ClientWatcher, filter: SpaceFilter) {
        if let Some(space) = self.spaces.get(&filter.space_name) {
            space.handle_update_filter(watcher, filter);
        } else if watcher
            .find_filter(&filter.space_name, &filter.filter_name)
            .is_some()
        {
            watcher.declare_filter(filter);
        } else {
            warn!(
                space = %filter.space_name,
                watcher = watcher.id(),
                filter = %filter.filter_name,
                "Update for undeclared filter ignored"
            );
        }
    }

    /// Drop a client filter.
    pub fn remove_filter(&self, watcher: &ClientWatcher, filter: SpaceFilter) {
        match self.spaces.get(&filter.space_name) {
            Some(space) => space.handle_remove_filter(watcher, filter),
            None => {
                watcher.forget_filter(&filter.space_name, &filter.filter_name);
            }
        }
    }

    /// Handle a frame received from a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be applied.
    pub fn handle_client_frame(&self, watcher: &Arc<ClientWatcher>, frame: Frame) -> Result<(), SpaceError> {
        match frame {
            Frame::WatchSpace { space_name } => self.join(&space_name, Arc::clone(watcher)),
            Frame::UnwatchSpace { space_name } => self.leave(&space_name, watcher.id()),
            Frame::Space { event } => match event {
                SpaceEvent::AddUser {
                    space_name, user, ..
                } => self.add_user(&space_name, user),
                SpaceEvent::UpdateUser {
                    space_name, user, ..
                } => self.update_user(&space_name, user),
                SpaceEvent::RemoveUser {
                    space_name,
                    user_id,
                    ..
                } => self.remove_user(&space_name, user_id),
            },
            Frame::AddFilter { filter } => {
                self.add_filter(watcher, filter);
                Ok(())
            }
            Frame::UpdateFilter { filter } => {
                self.update_filter(watcher, filter);
                Ok(())
            }
            Frame::RemoveFilter { filter } => {
                self.remove_filter(watcher, filter);
                Ok(())
            }
            Frame::Ping { timestamp } => {
                watcher.write(Frame::pong(timestamp));
                Ok(())
            }
            Frame::Pong { .. } => Ok(()),
            other => Err(SpaceError::UnexpectedFrame(other.frame_type())),
        }
    }

    /// Check if a space exists.
    #[must_use]
    pub fn space_exists(&self, space_name: &str) -> bool {
        self.spaces.contains_key(space_name)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> SpacesStats {
        SpacesStats {
            space_count: self.spaces.len(),
            watcher_count: self.joined.len(),
            user_count: self.spaces.iter().map(|s| s.user_count()).sum(),
        }
    }

    fn space_mut(
        &self,
        space_name: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, RelaySpace>, SpaceError> {
        self.spaces
            .get_mut(space_name)
            .ok_or_else(|| SpaceError::UnknownSpace(space_name.to_string()))
    }

    fn collect(&self, space_name: &str) {
        if self
            .spaces
            .remove_if(space_name, |_, space| space.is_empty() && space.client_count() == 0)
            .is_some()
        {
            self.upstream.write(Frame::unwatch_space(space_name));
            debug!(space = %space_name, "Deleted empty space");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::RecordingErrorSink;
    use crate::watcher::ChannelWatcher;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn drain(rx: &mut UnboundedReceiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn back_watcher(id: WatcherId) -> (Arc<dyn Watcher>, UnboundedReceiver<Frame>) {
        let (watcher, rx) = ChannelWatcher::new(id);
        (Arc::new(watcher), rx)
    }

    fn relay() -> (RelaySpaces, UnboundedReceiver<Frame>, Arc<RecordingErrorSink>) {
        let (tx, rx) = mpsc::unbounded_channel::<Frame>();
        let errors = Arc::new(RecordingErrorSink::default());
        (RelaySpaces::new(Arc::new(tx), 1, errors.clone()), rx, errors)
    }

    fn client(id: WatcherId) -> (Arc<ClientWatcher>, UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel::<Frame>();
        (Arc::new(ClientWatcher::new(id, tx)), rx)
    }

    #[test]
    fn test_validate_space_name() {
        assert!(validate_space_name("world/lobby").is_ok());
        assert!(validate_space_name("").is_err());
        assert!(validate_space_name("a\nb").is_err());
        assert!(validate_space_name(&"x".repeat(MAX_SPACE_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_back_watch_unwatch() {
        let spaces = BackSpaces::new();
        let (a, _rx) = back_watcher(1);

        spaces.watch_space("lobby", a).unwrap();
        assert!(spaces.space_exists("lobby"));
        assert_eq!(spaces.watcher_spaces(1), vec!["lobby".to_string()]);

        spaces.unwatch_space("lobby", 1).unwrap();
        assert!(!spaces.space_exists("lobby"));
        assert!(spaces.watcher_spaces(1).is_empty());
        assert_eq!(
            spaces.unwatch_space("lobby", 1),
            Err(SpaceError::UnknownSpace("lobby".to_string()))
        );
    }

    #[test]
    fn test_back_unwatch_all() {
        let spaces = BackSpaces::new();
        let (a, _rx_a) = back_watcher(1);
        let (b, _rx_b) = back_watcher(2);
        spaces.watch_space("one", a.clone()).unwrap();
        spaces.watch_space("two", a).unwrap();
        spaces.watch_space("two", b).unwrap();
        spaces.add_user("two", 1, SpaceUser::new(1, "Ann")).unwrap();

        spaces.unwatch_all(1);

        let stats = spaces.stats();
        assert_eq!(stats.space_count, 1);
        assert_eq!(stats.watcher_count, 1);
        assert_eq!(stats.user_count, 0);
    }

    #[test]
    fn test_back_max_spaces() {
        let spaces = BackSpaces::with_config(SpacesConfig { max_spaces: 1 });
        let (a, _rx) = back_watcher(1);

        spaces.watch_space("one", a.clone()).unwrap();
        spaces.watch_space("one", a.clone()).unwrap();
        assert_eq!(spaces.watch_space("two", a), Err(SpaceError::MaxSpacesReached));
    }

    #[test]
    fn test_back_handle_frame() {
        let spaces = BackSpaces::new();
        let (a, mut rx_a) = back_watcher(1);
        let (b, mut rx_b) = back_watcher(2);

        spaces.handle_frame(&a, Frame::watch_space("lobby")).unwrap();
        spaces.handle_frame(&b, Frame::watch_space("lobby")).unwrap();
        spaces
            .handle_frame(&a, Frame::space(SpaceEvent::add_user("lobby", SpaceUser::new(1, "Ann"))))
            .unwrap();
        spaces.handle_frame(&a, Frame::Ping { timestamp: Some(7) }).unwrap();

        assert_eq!(drain(&mut rx_a), vec![Frame::pong(Some(7))]);
        assert_eq!(
            drain(&mut rx_b),
            vec![Frame::space(SpaceEvent::add_user("lobby", SpaceUser::new(1, "Ann")))]
        );
        assert_eq!(
            spaces.handle_frame(&a, Frame::space(SpaceEvent::remove_user("nowhere", 1))),
            Err(SpaceError::UnknownSpace("nowhere".to_string()))
        );
        assert!(matches!(
            spaces.handle_frame(&a, Frame::AddFilter {
                filter: SpaceFilter::everybody("lobby", "all")
            }),
            Err(SpaceError::UnexpectedFrame(_))
        ));
    }

    #[test]
    fn test_back_user_from_unattached_watcher() {
        let spaces = BackSpaces::new();
        let (a, _rx) = back_watcher(1);
        spaces.watch_space("lobby", a).unwrap();

        assert!(matches!(
            spaces.add_user("lobby", 9, SpaceUser::new(1, "Ann")),
            Err(SpaceError::UnknownWatcher { watcher: 9, .. })
        ));
    }

    #[test]
    fn test_relay_join_watches_upstream_once() {
        let (spaces, mut upstream, _errors) = relay();
        let (a, _rx_a) = client(1);
        let (b, _rx_b) = client(2);

        spaces.join("lobby", a).unwrap();
        spaces.join("lobby", b).unwrap();

        assert_eq!(drain(&mut upstream), vec![Frame::watch_space("lobby")]);
        assert_eq!(spaces.stats().watcher_count, 2);
    }

    #[test]
    fn test_relay_leave_unwatches_empty_space() {
        let (spaces, mut upstream, _errors) = relay();
        let (a, _rx_a) = client(1);
        spaces.join("lobby", a).unwrap();
        drain(&mut upstream);

        spaces.leave("lobby", 1).unwrap();

        assert_eq!(drain(&mut upstream), vec![Frame::unwatch_space("lobby")]);
        assert!(!spaces.space_exists("lobby"));
    }

    #[test]
    fn test_relay_space_with_users_survives_leave() {
        let (spaces, mut upstream, _errors) = relay();
        let (a, _rx_a) = client(1);
        spaces.join("lobby", a).unwrap();
        spaces
            .handle_upstream(Frame::space(SpaceEvent::add_user("lobby", SpaceUser::new(5, "Eve"))))
            .unwrap();

        spaces.leave_all(1);
        assert!(spaces.space_exists("lobby"));

        spaces
            .handle_upstream(Frame::space(SpaceEvent::remove_user("lobby", 5)))
            .unwrap();
        assert!(!spaces.space_exists("lobby"));
        assert_eq!(
            drain(&mut upstream),
            vec![Frame::watch_space("lobby"), Frame::unwatch_space("lobby")]
        );
    }

    #[test]
    fn test_relay_client_mutations_go_upstream() {
        let (spaces, mut upstream, _errors) = relay();
        let (a, mut rx_a) = client(1);
        spaces.join("lobby", a.clone()).unwrap();
        spaces.add_filter(&a, SpaceFilter::everybody("lobby", "all"));
        drain(&mut upstream);

        let user = SpaceUser::new(3, "Cid");
        spaces
            .handle_client_frame(&a, Frame::space(SpaceEvent::add_user("lobby", user.clone())))
            .unwrap();

        assert_eq!(
            drain(&mut upstream),
            vec![Frame::space(SpaceEvent::add_user("lobby", user.clone()))]
        );
        assert_eq!(
            drain(&mut rx_a),
            vec![Frame::space(SpaceEvent::add_user("lobby", user).with_filter("all"))]
        );
    }

    #[test]
    fn test_relay_filters_before_join() {
        let (spaces, _upstream, _errors) = relay();
        let (a, mut rx_a) = client(1);

        spaces.add_filter(&a, SpaceFilter::everybody("lobby", "all"));
        spaces.update_filter(&a, SpaceFilter::live_streaming("lobby", "ghost"));
        assert_eq!(a.filters("lobby"), vec![SpaceFilter::everybody("lobby", "all")]);

        let (b, _rx_b) = client(2);
        spaces.join("lobby", b).unwrap();
        spaces
            .handle_upstream(Frame::space(SpaceEvent::add_user("lobby", SpaceUser::new(1, "Ann"))))
            .unwrap();
        spaces.join("lobby", a.clone()).unwrap();

        assert_eq!(
            drain(&mut rx_a),
            vec![Frame::space(
                SpaceEvent::add_user("lobby", SpaceUser::new(1, "Ann")).with_filter("all")
            )]
        );

        spaces.remove_filter(&a, SpaceFilter::everybody("lobby", "all"));
        assert!(a.filters("lobby").is_empty());
    }

    #[test]
    fn test_relay_upstream_for_unknown_space() {
        let (spaces, mut upstream, _errors) = relay();

        assert_eq!(
            spaces.handle_upstream(Frame::space(SpaceEvent::remove_user("gone", 1))),
            Err(SpaceError::UnknownSpace("gone".to_string()))
        );
        spaces.handle_upstream(Frame::Ping { timestamp: None }).unwrap();
        assert_eq!(drain(&mut upstream), vec![Frame::pong(None)]);
        assert!(matches!(
            spaces.handle_upstream(Frame::watch_space("lobby")),
            Err(SpaceError::UnexpectedFrame(_))
        ));
    }
}
