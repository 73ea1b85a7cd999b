//! Replicated armed/disarmed cell
//!
//! The replica is a synchronous state machine. Each handler consumes one
//! event and returns a [`Reaction`]: at most one message to broadcast and
//! at most one value to render. The caller owns all I/O.
//!
//! Mutations are serialized through the authority:
//! - the authority flips the value and pushes a `StateUpdate`
//! - everyone else sends a `ToggleRequest` and waits
//! - a received `StateUpdate` is adopted unconditionally (last write wins)
//! - a peer newly promoted to authority re-broadcasts its value

use armsync_core::{Message, PeerId};
use tracing::{debug, info};

use crate::{AuthorityCache, AuthorityChange, PeerChange, PeerSet};

/// Side effects requested by a replica handler
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reaction {
    /// Message to broadcast to the session
    pub broadcast: Option<Message>,
    /// Value to hand to the presentation sink
    pub render: Option<bool>,
}

impl Reaction {
    pub fn none() -> Self {
        Reaction::default()
    }

    pub fn is_empty(&self) -> bool {
        self.broadcast.is_none() && self.render.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaStats {
    pub local_toggles: u64,
    pub requests_sent: u64,
    pub requests_served: u64,
    pub requests_ignored: u64,
    pub updates_sent: u64,
    pub updates_applied: u64,
    pub authority_changes: u64,
}

/// Local copy of the replicated value
#[derive(Debug)]
pub struct StateReplica {
    peers: PeerSet,
    authority: AuthorityCache,
    armed: bool,
    /// Authority named by the last `StateUpdate`; display only
    advertised_authority: Option<PeerId>,
    stats: ReplicaStats,
}

impl StateReplica {
    /// Create a disarmed replica whose peer set holds only `local`
    pub fn new(local: PeerId) -> Self {
        StateReplica {
            peers: PeerSet::new(local),
            authority: AuthorityCache::new(),
            armed: false,
            advertised_authority: None,
            stats: ReplicaStats::default(),
        }
    }

    /// Render the initial value and resolve the first authority
    pub fn start(&mut self) -> Reaction {
        let mut reaction = self.recompute_authority();
        reaction.render = Some(self.armed);
        reaction
    }

    pub fn local_id(&self) -> &PeerId {
        self.peers.local()
    }

    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Locally resolved authority; `None` before [`StateReplica::start`]
    pub fn authority(&self) -> Option<&PeerId> {
        self.authority.current()
    }

    pub fn is_authority(&self) -> bool {
        self.authority.is(self.peers.local())
    }

    pub fn advertised_authority(&self) -> Option<&PeerId> {
        self.advertised_authority.as_ref()
    }

    pub fn stats(&self) -> &ReplicaStats {
        &self.stats
    }

    /// The local user asked for a flip
    pub fn request_toggle(&mut self) -> Reaction {
        self.stats.local_toggles += 1;

        if self.is_authority() {
            debug!(peer = %self.local_id(), "local peer is authority, toggling");
            return self.toggle_and_broadcast();
        }

        debug!(
            peer = %self.local_id(),
            authority = ?self.authority.current(),
            "local peer is not authority, requesting toggle"
        );
        self.stats.requests_sent += 1;
        Reaction {
            broadcast: Some(Message::toggle_request(self.local_id().clone())),
            render: None,
        }
    }

    /// Handle a message received from the session
    pub fn handle_message(&mut self, sender: &PeerId, msg: Message) -> Reaction {
        match msg {
            Message::StateUpdate { value, authority } => {
                self.armed = value;
                self.stats.updates_applied += 1;
                debug!(
                    %sender,
                    armed = value,
                    advertised = %authority,
                    "state update received"
                );
                self.advertised_authority = Some(authority);
                Reaction {
                    broadcast: None,
                    render: Some(value),
                }
            }
            Message::ToggleRequest { requester } => {
                debug!(%sender, %requester, "toggle request received");
                if self.is_authority() {
                    self.stats.requests_served += 1;
                    self.toggle_and_broadcast()
                } else {
                    self.stats.requests_ignored += 1;
                    Reaction::none()
                }
            }
        }
    }

    /// Apply a membership change and re-resolve the authority
    pub fn apply_peer_change(&mut self, change: PeerChange) -> Reaction {
        if !self.peers.apply(change) {
            return Reaction::none();
        }
        self.recompute_authority()
    }

    fn recompute_authority(&mut self) -> Reaction {
        match self.authority.refresh(&self.peers) {
            AuthorityChange::Unchanged => Reaction::none(),
            AuthorityChange::Changed { previous, current } => {
                self.stats.authority_changes += 1;
                info!(
                    peer = %self.local_id(),
                    previous = ?previous,
                    authority = %current,
                    "authority changed"
                );

                if self.is_authority() {
                    Reaction {
                        broadcast: Some(self.broadcast_state()),
                        render: None,
                    }
                } else {
                    Reaction::none()
                }
            }
        }
    }

    fn toggle_and_broadcast(&mut self) -> Reaction {
        self.armed = !self.armed;
        Reaction {
            broadcast: Some(self.broadcast_state()),
            render: Some(self.armed),
        }
    }

    fn broadcast_state(&mut self) -> Message {
        self.stats.updates_sent += 1;
        info!(
            peer = %self.local_id(),
            armed = self.armed,
            "broadcasting state"
        );
        Message::state_update(self.armed, self.local_id().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> PeerId {
        PeerId::new(s)
    }

    /// Started replica with the given view of the session
    fn replica(local: &str, members: &[&str]) -> StateReplica {
        let mut r = StateReplica::new(id(local));
        r.start();
        r.apply_peer_change(PeerChange::Snapshot(
            members.iter().map(|s| id(s)).collect(),
        ));
        r
    }

    #[test]
    fn test_start_renders_and_promotes_self() {
        let mut r = StateReplica::new(id("b1"));
        assert!(r.authority().is_none());
        assert!(!r.is_authority());

        let reaction = r.start();
        assert_eq!(reaction.render, Some(false));
        assert_eq!(reaction.broadcast, Some(Message::state_update(false, id("b1"))));
        assert!(r.is_authority());
    }

    #[test]
    fn test_request_routing() {
        let members = ["a1", "b1", "c1"];
        let mut a = replica("a1", &members);
        let mut b = replica("b1", &members);
        let mut c = replica("c1", &members);
        let prev = c.armed();

        // C is not authority: it requests and does not mutate
        let reaction = c.request_toggle();
        assert_eq!(reaction.broadcast, Some(Message::toggle_request(id("c1"))));
        assert_eq!(reaction.render, None);
        assert_eq!(c.armed(), prev);

        // B ignores the request
        let ignored = b.handle_message(&id("c1"), Message::toggle_request(id("c1")));
        assert!(ignored.is_empty());
        assert_eq!(b.armed(), prev);

        // A serves it
        let served = a.handle_message(&id("c1"), Message::toggle_request(id("c1")));
        let update = served.broadcast.unwrap();
        assert_eq!(update, Message::state_update(!prev, id("a1")));
        assert_eq!(a.armed(), !prev);

        b.handle_message(&id("a1"), update.clone());
        c.handle_message(&id("a1"), update);
        assert_eq!(b.armed(), !prev);
        assert_eq!(c.armed(), !prev);
        assert_eq!(c.advertised_authority(), Some(&id("a1")));
    }

    #[test]
    fn test_authority_toggles_locally() {
        let mut a = replica("a1", &["a1", "b1"]);

        let reaction = a.request_toggle();
        assert!(a.armed());
        assert_eq!(reaction.render, Some(true));
        assert_eq!(reaction.broadcast, Some(Message::state_update(true, id("a1"))));
    }

    #[test]
    fn test_state_update_idempotent() {
        let mut b = replica("b1", &["a1", "b1"]);
        let update = Message::state_update(true, id("a1"));

        b.handle_message(&id("a1"), update.clone());
        let once = (b.armed(), b.advertised_authority().cloned());
        b.handle_message(&id("a1"), update);
        let twice = (b.armed(), b.advertised_authority().cloned());

        assert_eq!(once, twice);
        assert!(b.armed());
    }

    #[test]
    fn test_self_echo_is_noop() {
        let mut a = replica("a1", &["a1", "b1"]);
        let update = a.request_toggle().broadcast.unwrap();
        let before = a.armed();

        let reaction = a.handle_message(&id("a1"), update);
        assert!(reaction.broadcast.is_none());
        assert_eq!(a.armed(), before);
    }

    #[test]
    fn test_promotion_rebroadcasts_in_same_reaction() {
        let mut b = replica("b1", &["a1", "b1"]);
        b.handle_message(&id("a1"), Message::state_update(true, id("a1")));
        assert!(!b.is_authority());

        let reaction = b.apply_peer_change(PeerChange::Left(id("a1")));
        assert!(b.is_authority());
        assert_eq!(reaction.broadcast, Some(Message::state_update(true, id("b1"))));
    }

    #[test]
    fn test_unchanged_authority_is_silent() {
        let mut a = replica("a1", &["a1", "b1"]);

        assert!(a.apply_peer_change(PeerChange::Joined(id("c1"))).is_empty());
        assert!(a.apply_peer_change(PeerChange::Left(id("b1"))).is_empty());
        assert!(a.apply_peer_change(PeerChange::Left(id("zz"))).is_empty());
    }

    #[test]
    fn test_demotion_does_not_broadcast() {
        let mut b = replica("b1", &["b1", "c1"]);
        assert!(b.is_authority());

        let reaction = b.apply_peer_change(PeerChange::Joined(id("a1")));
        assert!(reaction.is_empty());
        assert!(!b.is_authority());
        assert_eq!(b.authority(), Some(&id("a1")));
    }

    #[test]
    fn test_stale_authority_ignores_request() {
        let mut b = replica("b1", &["b1"]);
        assert!(b.is_authority());

        // A joins; B is no longer authority by the time the request lands
        b.apply_peer_change(PeerChange::Joined(id("a1")));
        let reaction = b.handle_message(&id("c1"), Message::toggle_request(id("c1")));
        assert!(reaction.is_empty());
        assert!(!b.armed());
        assert_eq!(b.stats().requests_ignored, 1);
    }

    proptest! {
        #[test]
        fn at_most_one_authority_per_view(
            ids in proptest::collection::btree_set("[a-z]{1,4}[0-9]", 1..10),
        ) {
            let ids: Vec<String> = ids.into_iter().collect();
            let members: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();

            let authorities = members
                .iter()
                .map(|local| replica(local, &members))
                .filter(|r| r.is_authority())
                .count();
            prop_assert_eq!(authorities, 1);
        }

        #[test]
        fn non_authority_never_mutates_on_request(
            armed in any::<bool>(),
            requester in "[a-z]{1,4}",
        ) {
            let mut c = replica("zz", &["aa", "zz"]);
            c.handle_message(&id("aa"), Message::state_update(armed, id("aa")));

            let reaction = c.handle_message(&id(&requester), Message::toggle_request(id(&requester)));
            prop_assert!(reaction.is_empty());
            prop_assert_eq!(c.armed(), armed);
        }
    }
}
