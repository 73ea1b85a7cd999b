//! Peer set - the local view of session membership

use std::collections::BTreeSet;
use std::iter;

use armsync_core::PeerId;

/// Membership change reported by the peer directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerChange {
    Joined(PeerId),
    Left(PeerId),
    /// Full roster re-read, e.g. after the local peer joined a session
    Snapshot(Vec<PeerId>),
}

/// Peers known to the local process, self included
///
/// The local peer is stored apart from the remote ones, so the set can
/// never become empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerSet {
    local: PeerId,
    remote: BTreeSet<PeerId>,
}

impl PeerSet {
    pub fn new(local: PeerId) -> Self {
        PeerSet {
            local,
            remote: BTreeSet::new(),
        }
    }

    /// Build from a member list; the local peer is added if missing
    pub fn from_members(local: PeerId, members: impl IntoIterator<Item = PeerId>) -> Self {
        let mut set = PeerSet::new(local);
        for peer in members {
            set.insert(peer);
        }
        set
    }

    pub fn local(&self) -> &PeerId {
        &self.local
    }

    /// Returns false if the peer was already known
    pub fn insert(&mut self, peer: PeerId) -> bool {
        if peer == self.local {
            return false;
        }
        self.remote.insert(peer)
    }

    /// Removing the local peer is ignored
    pub fn remove(&mut self, peer: &PeerId) -> bool {
        self.remote.remove(peer)
    }

    /// Replace all remote members; returns whether anything changed
    pub fn replace(&mut self, members: impl IntoIterator<Item = PeerId>) -> bool {
        let local = &self.local;
        let remote: BTreeSet<PeerId> = members.into_iter().filter(|p| p != local).collect();
        if remote == self.remote {
            return false;
        }
        self.remote = remote;
        true
    }

    /// Apply a directory change; returns whether membership changed
    pub fn apply(&mut self, change: PeerChange) -> bool {
        match change {
            PeerChange::Joined(peer) => self.insert(peer),
            PeerChange::Left(peer) => self.remove(&peer),
            PeerChange::Snapshot(members) => self.replace(members),
        }
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        *peer == self.local || self.remote.contains(peer)
    }

    pub fn len(&self) -> usize {
        self.remote.len() + 1
    }

    /// Always false: the local peer is a member
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Local peer first, then remote peers in order
    pub fn iter(&self) -> impl Iterator<Item = &PeerId> {
        iter::once(&self.local).chain(self.remote.iter())
    }
}
