//! Relay space.
//!
//! A relay mirrors the users of a space as seen from the authoritative tier
//! and forwards to each client only what that client's filters admit.
//!
//! Mutations come in two flavours. The send variants ([`RelaySpace::add_user`]
//! and friends) are used for mutations made by this relay's own clients: they
//! forward the mutation upstream and then apply it. The local variants
//! ([`RelaySpace::local_add_user`] and friends) apply a mutation that arrived
//! from upstream. Both end in the same code path.
//!
//! Every event sent to a client is tagged with the name of the filter that
//! admitted it, so a client with two matching filters gets two events.

use beacon_protocol::{Frame, PartialSpaceUser, SpaceEvent, SpaceFilter, SpaceUser, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::error::{ErrorSink, SpaceError};
use crate::filter::{delta, filter_admits, filter_users, FilteredUsers};
use crate::user::RelayUser;
use crate::watcher::{ClientWatcher, EventSink, Watcher, WatcherId};

/// A space at the relay tier.
pub struct RelaySpace {
    name: String,
    upstream: Arc<dyn EventSink>,
    back_id: u64,
    users: HashMap<UserId, RelayUser>,
    clients: HashMap<WatcherId, Arc<ClientWatcher>>,
    errors: Arc<dyn ErrorSink>,
}

impl RelaySpace {
    /// Create a space with its first client.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        upstream: Arc<dyn EventSink>,
        back_id: u64,
        watcher: Arc<ClientWatcher>,
        errors: Arc<dyn ErrorSink>,
    ) -> Self {
        let mut space = Self {
            name: name.into(),
            upstream,
            back_id,
            users: HashMap::new(),
            clients: HashMap::new(),
            errors,
        };
        debug!(space = %space.name, back = back_id, "Space created");
        space.add_client_watcher(watcher);
        space
    }

    /// Get the space name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the id of the authoritative server this space is mirrored from.
    #[must_use]
    pub fn back_id(&self) -> u64 {
        self.back_id
    }

    /// Get a user.
    #[must_use]
    pub fn user(&self, id: UserId) -> Option<&RelayUser> {
        self.users.get(&id)
    }

    /// Get the number of users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Get the number of clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Check if a client is registered.
    #[must_use]
    pub fn has_client(&self, id: WatcherId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Check whether the space has no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Register a client and send it the users its filters already admit.
    pub fn add_client_watcher(&mut self, watcher: Arc<ClientWatcher>) {
        let filters = watcher.filters(&self.name);
        let mut sent = 0;
        for user in self.users.values() {
            for filter in &filters {
                if filter_admits(filter, user, &*self.errors) {
                    watcher.write(add_event(&self.name, user, &filter.filter_name));
                    sent += 1;
                }
            }
        }

        debug!(space = %self.name, watcher = watcher.id(), sent, "Client added");
        self.clients.insert(watcher.id(), watcher);
    }

    /// Deregister a client. Nobody is notified.
    pub fn remove_client_watcher(&mut self, id: WatcherId) -> Option<Arc<ClientWatcher>> {
        let removed = self.clients.remove(&id);
        if removed.is_some() {
            debug!(space = %self.name, watcher = id, "Client removed");
        }
        removed
    }

    /// Add a user made by one of our clients.
    pub fn add_user(&mut self, user: SpaceUser) {
        trace!(space = %self.name, user = user.id, "Sending user add upstream");
        self.upstream
            .write(Frame::space(SpaceEvent::add_user(&self.name, user.clone())));
        self.local_add_user(user);
    }

    /// Update a user on behalf of one of our clients.
    pub fn update_user(&mut self, update: PartialSpaceUser) {
        trace!(space = %self.name, user = update.id, "Sending user update upstream");
        self.upstream
            .write(Frame::space(SpaceEvent::update_user(&self.name, update.clone())));
        self.local_update_user(update);
    }

    /// Remove a user on behalf of one of our clients.
    pub fn remove_user(&mut self, user_id: UserId) {
        trace!(space = %self.name, user = user_id, "Sending user removal upstream");
        self.upstream
            .write(Frame::space(SpaceEvent::remove_user(&self.name, user_id)));
        self.local_remove_user(user_id);
    }

    /// Apply a user addition and notify admitting clients.
    pub fn local_add_user(&mut self, user: SpaceUser) {
        let user = RelayUser::new(user);
        for client in self.clients.values() {
            for filter in client.filters(&self.name) {
                if filter_admits(&filter, &user, &*self.errors) {
                    client.write(add_event(&self.name, &user, &filter.filter_name));
                }
            }
        }

        debug!(space = %self.name, user = user.id(), "User added");
        self.users.insert(user.id(), user);
    }

    /// Apply a user update.
    ///
    /// For each client filter, a user that becomes admitted is sent as an
    /// add, a user that stops being admitted is sent as a remove, and a user
    /// admitted before and after gets the update as received.
    pub fn local_update_user(&mut self, update: PartialSpaceUser) {
        let id = update.id;
        let Some(user) = self.users.get_mut(&id) else {
            self.errors.report(&SpaceError::UnknownUser {
                space: self.name.clone(),
                user_id: id,
            });
            return;
        };

        let old = user.clone();
        user.apply(&update);
        let new: &RelayUser = user;
        debug!(space = %self.name, user = id, "User updated");

        for client in self.clients.values() {
            for filter in client.filters(&self.name) {
                let before = filter_admits(&filter, &old, &*self.errors);
                let after = filter_admits(&filter, new, &*self.errors);
                let event = match (before, after) {
                    (false, true) => SpaceEvent::add_user(&self.name, new.user().clone()),
                    (true, false) => SpaceEvent::remove_user(&self.name, id),
                    (true, true) => SpaceEvent::update_user(&self.name, update.clone()),
                    (false, false) => continue,
                };
                client.write(Frame::space(event.with_filter(filter.filter_name)));
            }
        }
    }

    /// Apply a user removal and notify clients whose filters admitted it.
    pub fn local_remove_user(&mut self, user_id: UserId) {
        let Some(user) = self.users.remove(&user_id) else {
            self.errors.report(&SpaceError::UnknownUser {
                space: self.name.clone(),
                user_id,
            });
            return;
        };
        debug!(space = %self.name, user = user_id, "User removed");

        for client in self.clients.values() {
            for filter in client.filters(&self.name) {
                if filter_admits(&filter, &user, &*self.errors) {
                    client.write(remove_event(&self.name, user_id, &filter.filter_name));
                }
            }
        }
    }

    /// Declare a new filter for a client and send the users it admits.
    pub fn handle_add_filter(&self, watcher: &ClientWatcher, filter: SpaceFilter) {
        debug!(space = %self.name, watcher = watcher.id(), filter = %filter.filter_name, "Filter added");
        let new = filter_users(&filter, self.users.values(), &*self.errors);
        self.send_delta(watcher, &FilteredUsers::new(), &new, &filter.filter_name);
        watcher.declare_filter(filter);
    }

    /// Redefine a client filter, sending only the users whose visibility
    /// changes.
    ///
    /// Ignored if the client has no filter with that name in this space.
    pub fn handle_update_filter(&self, watcher: &ClientWatcher, filter: SpaceFilter) {
        let Some(previous) = watcher.find_filter(&self.name, &filter.filter_name) else {
            warn!(
                space = %self.name,
                watcher = watcher.id(),
                filter = %filter.filter_name,
                "Update for undeclared filter ignored"
            );
            return;
        };

        debug!(space = %self.name, watcher = watcher.id(), filter = %filter.filter_name, "Filter updated");
        let old = filter_users(&previous, self.users.values(), &*self.errors);
        let new = filter_users(&filter, self.users.values(), &*self.errors);
        self.send_delta(watcher, &old, &new, &filter.filter_name);
        watcher.declare_filter(filter);
    }

    /// Drop a client filter. Every user it admitted is sent as a remove;
    /// nothing is added, even if other filters of the client admit them.
    pub fn handle_remove_filter(&self, watcher: &ClientWatcher, filter: SpaceFilter) {
        let previous = watcher
            .forget_filter(&self.name, &filter.filter_name)
            .unwrap_or(filter);

        debug!(space = %self.name, watcher = watcher.id(), filter = %previous.filter_name, "Filter removed");
        let old = filter_users(&previous, self.users.values(), &*self.errors);
        self.send_delta(watcher, &old, &FilteredUsers::new(), &previous.filter_name);
    }

    fn send_delta(
        &self,
        watcher: &ClientWatcher,
        old: &FilteredUsers<'_>,
        new: &FilteredUsers<'_>,
        filter_name: &str,
    ) {
        let change = delta(old, new);
        for user in &change.added {
            watcher.write(add_event(&self.name, user, filter_name));
        }
        for user_id in &change.removed {
            watcher.write(remove_event(&self.name, *user_id, filter_name));
        }

        debug!(
            space = %self.name,
            watcher = watcher.id(),
            filter = %filter_name,
            added = change.added.len(),
            removed = change.removed.len(),
            "Filter delta sent"
        );
    }
}

fn add_event(space: &str, user: &RelayUser, filter_name: &str) -> Frame {
    Frame::space(SpaceEvent::add_user(space, user.user().clone()).with_filter(filter_name))
}

fn remove_event(space: &str, user_id: UserId, filter_name: &str) -> Frame {
    Frame::space(SpaceEvent::remove_user(space, user_id).with_filter(filter_name))
}

impl std::fmt::Debug for RelaySpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySpace")
            .field("name", &self.name)
            .field("back_id", &self.back_id)
            .field("users", &self.users.len())
            .field("clients", &self.clients.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::RecordingErrorSink;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct Fixture {
        space: RelaySpace,
        upstream: UnboundedReceiver<Frame>,
        errors: Arc<RecordingErrorSink>,
    }

    fn client(id: WatcherId, filters: &[SpaceFilter]) -> (Arc<ClientWatcher>, UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel::<Frame>();
        let watcher = ClientWatcher::new(id, tx);
        for filter in filters {
            watcher.declare_filter(filter.clone());
        }
        (Arc::new(watcher), rx)
    }

    fn fixture(first: Arc<ClientWatcher>) -> Fixture {
        let (tx, upstream) = mpsc::unbounded_channel::<Frame>();
        let errors = Arc::new(RecordingErrorSink::default());
        let space = RelaySpace::new("lobby", Arc::new(tx), 1, first, errors.clone());
        Fixture {
            space,
            upstream,
            errors,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Frame>) -> Vec<SpaceEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Frame::Space { event } = frame {
                events.push(event);
            }
        }
        events
    }

    fn user(id: UserId, name: &str) -> SpaceUser {
        SpaceUser::new(id, name)
    }

    #[test]
    fn test_send_variants_go_upstream() {
        let (watcher, mut rx) = client(1, &[SpaceFilter::everybody("lobby", "all")]);
        let mut f = fixture(watcher);

        f.space.add_user(user(1, "Ann"));
        f.space.update_user(PartialSpaceUser::new(1).with_name("Anna"));
        f.space.remove_user(1);

        assert_eq!(
            drain(&mut f.upstream),
            vec![
                SpaceEvent::add_user("lobby", user(1, "Ann")),
                SpaceEvent::update_user("lobby", PartialSpaceUser::new(1).with_name("Anna")),
                SpaceEvent::remove_user("lobby", 1),
            ]
        );
        // The originating client sees its own mutation through its filter.
        assert_eq!(drain(&mut rx).len(), 3);
        assert!(f.space.is_empty());
    }

    #[test]
    fn test_local_variants_stay_local() {
        let (watcher, _rx) = client(1, &[]);
        let mut f = fixture(watcher);

        f.space.local_add_user(user(1, "Ann"));
        f.space.local_remove_user(1);

        assert!(drain(&mut f.upstream).is_empty());
    }

    #[test]
    fn test_add_user_tags_each_matching_filter() {
        let (watcher, mut rx) = client(
            1,
            &[
                SpaceFilter::everybody("lobby", "all"),
                SpaceFilter::contains_name("lobby", "search", "an"),
                SpaceFilter::contains_name("lobby", "other", "zed"),
            ],
        );
        let mut f = fixture(watcher);

        f.space.local_add_user(user(1, "Ann"));

        let tags: Vec<_> = drain(&mut rx)
            .iter()
            .map(|e| e.filter_name().map(str::to_string))
            .collect();
        assert_eq!(tags, vec![Some("all".to_string()), Some("search".to_string())]);
    }

    #[test]
    fn test_clients_without_filters_see_nothing() {
        let (watcher, mut rx) = client(1, &[]);
        let mut f = fixture(watcher);

        f.space.local_add_user(user(1, "Ann"));
        f.space
            .local_update_user(PartialSpaceUser::new(1).with_name("Bob"));
        f.space.local_remove_user(1);

        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_update_becoming_visible_is_an_add() {
        let (watcher, mut rx) = client(1, &[SpaceFilter::live_streaming("lobby", "live")]);
        let mut f = fixture(watcher);
        f.space.local_add_user(user(1, "Ann"));
        assert!(drain(&mut rx).is_empty());

        f.space.local_update_user(
            PartialSpaceUser::new(1)
                .with_megaphone(true)
                .with_media(None, None, Some(true)),
        );

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            SpaceEvent::AddUser {
                user, filter_name, ..
            } => {
                assert_eq!(user.id, 1);
                assert!(user.megaphone_state && user.camera_state);
                assert_eq!(filter_name.as_deref(), Some("live"));
            }
            other => panic!("Expected add, got {:?}", other),
        }
    }

    #[test]
    fn test_update_becoming_hidden_is_a_remove() {
        let (watcher, mut rx) = client(1, &[SpaceFilter::contains_name("lobby", "f", "ann")]);
        let mut f = fixture(watcher);
        f.space.local_add_user(user(1, "Ann"));
        drain(&mut rx);

        f.space
            .local_update_user(PartialSpaceUser::new(1).with_name("Bob"));

        assert_eq!(
            drain(&mut rx),
            vec![SpaceEvent::remove_user("lobby", 1).with_filter("f")]
        );
        assert_eq!(f.space.user(1).unwrap().lowercase_name(), "bob");
    }

    #[test]
    fn test_update_still_visible_is_forwarded_verbatim() {
        let (watcher, mut rx) = client(1, &[SpaceFilter::contains_name("lobby", "f", "ann")]);
        let mut f = fixture(watcher);
        f.space.local_add_user(user(1, "Ann"));
        drain(&mut rx);

        let update = PartialSpaceUser::new(1).with_name("Annie");
        f.space.local_update_user(update.clone());

        assert_eq!(
            drain(&mut rx),
            vec![SpaceEvent::update_user("lobby", update).with_filter("f")]
        );
    }

    #[test]
    fn test_unknown_user_is_reported() {
        let (watcher, mut rx) = client(1, &[SpaceFilter::everybody("lobby", "all")]);
        let mut f = fixture(watcher);
        f.space.local_add_user(user(1, "Ann"));
        drain(&mut rx);

        f.space.local_update_user(PartialSpaceUser::new(2).with_name("Nobody"));
        f.space.local_remove_user(1);
        f.space.local_remove_user(1);

        assert_eq!(
            drain(&mut rx),
            vec![SpaceEvent::remove_user("lobby", 1).with_filter("all")]
        );
        assert_eq!(
            f.errors.reports(),
            vec![
                SpaceError::UnknownUser {
                    space: "lobby".to_string(),
                    user_id: 2
                },
                SpaceError::UnknownUser {
                    space: "lobby".to_string(),
                    user_id: 1
                },
            ]
        );
    }

    #[test]
    fn test_new_client_catches_up() {
        let (first, _rx) = client(1, &[]);
        let mut f = fixture(first);
        for (id, name) in [(3, "Cid"), (1, "Ann"), (2, "Bob")] {
            f.space.local_add_user(user(id, name));
        }

        let (late, mut rx) = client(2, &[SpaceFilter::everybody("lobby", "all")]);
        f.space.add_client_watcher(late);

        let mut ids: Vec<UserId> = drain(&mut rx).iter().map(SpaceEvent::user_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_removed_client_gets_nothing() {
        let (watcher, mut rx) = client(1, &[SpaceFilter::everybody("lobby", "all")]);
        let mut f = fixture(watcher);

        assert!(f.space.remove_client_watcher(1).is_some());
        f.space.local_add_user(user(1, "Ann"));

        assert!(drain(&mut rx).is_empty());
        assert_eq!(f.space.client_count(), 0);
    }

    #[test]
    fn test_add_filter_sends_admitted_users() {
        let (watcher, mut rx) = client(1, &[]);
        let mut f = fixture(watcher.clone());
        for (id, name) in [(1, "Ann"), (2, "Bob"), (3, "Hannah")] {
            f.space.local_add_user(user(id, name));
        }

        f.space
            .handle_add_filter(&watcher, SpaceFilter::contains_name("lobby", "f", "AN"));

        assert_eq!(
            drain(&mut rx),
            vec![
                SpaceEvent::add_user("lobby", user(1, "Ann")).with_filter("f"),
                SpaceEvent::add_user("lobby", user(3, "Hannah")).with_filter("f"),
            ]
        );
        assert_eq!(watcher.filters("lobby").len(), 1);
    }

    #[test]
    fn test_update_filter_sends_only_changes() {
        let (watcher, mut rx) = client(1, &[SpaceFilter::contains_name("lobby", "f", "an")]);
        let mut f = fixture(watcher.clone());
        for (id, name) in [(1, "Ann"), (2, "Bob"), (3, "Hannah"), (4, "Dan")] {
            f.space.local_add_user(user(id, name));
        }
        drain(&mut rx);

        f.space
            .handle_update_filter(&watcher, SpaceFilter::contains_name("lobby", "f", "h"));

        assert_eq!(
            drain(&mut rx),
            vec![
                SpaceEvent::remove_user("lobby", 1).with_filter("f"),
                SpaceEvent::remove_user("lobby", 4).with_filter("f"),
            ]
        );
        assert_eq!(
            watcher.find_filter("lobby", "f"),
            Some(SpaceFilter::contains_name("lobby", "f", "h"))
        );

        f.space
            .handle_update_filter(&watcher, SpaceFilter::everybody("lobby", "f"));
        let added: Vec<UserId> = drain(&mut rx).iter().map(SpaceEvent::user_id).collect();
        assert_eq!(added, vec![1, 2, 4]);
    }

    #[test]
    fn test_update_of_undeclared_filter_is_ignored() {
        let (watcher, mut rx) = client(1, &[]);
        let mut f = fixture(watcher.clone());
        f.space.local_add_user(user(1, "Ann"));

        f.space
            .handle_update_filter(&watcher, SpaceFilter::everybody("lobby", "ghost"));

        assert!(drain(&mut rx).is_empty());
        assert!(watcher.filters("lobby").is_empty());
    }

    #[test]
    fn test_remove_filter_revokes_without_granting() {
        let (watcher, mut rx) = client(
            1,
            &[
                SpaceFilter::contains_name("lobby", "f", "an"),
                SpaceFilter::everybody("lobby", "all"),
            ],
        );
        let mut f = fixture(watcher.clone());
        for (id, name) in [(1, "Ann"), (2, "Bob")] {
            f.space.local_add_user(user(id, name));
        }
        drain(&mut rx);

        f.space
            .handle_remove_filter(&watcher, SpaceFilter::contains_name("lobby", "f", "an"));

        assert_eq!(
            drain(&mut rx),
            vec![SpaceEvent::remove_user("lobby", 1).with_filter("f")]
        );
        assert_eq!(watcher.filters("lobby"), vec![SpaceFilter::everybody("lobby", "all")]);
    }

    #[test]
    fn test_empty_filter_fails_closed() {
        let broken = SpaceFilter {
            space_name: "lobby".to_string(),
            filter_name: "broken".to_string(),
            filter: None,
        };
        let (watcher, mut rx) = client(1, &[]);
        let mut f = fixture(watcher.clone());
        f.space.local_add_user(user(1, "Ann"));

        f.space.handle_add_filter(&watcher, broken);
        f.space.local_add_user(user(2, "Bob"));

        assert!(drain(&mut rx).is_empty());
        assert!(f
            .errors
            .reports()
            .iter()
            .all(|e| matches!(e, SpaceError::EmptyFilter { .. })));
        assert_eq!(f.errors.reports().len(), 2);
    }
}
