//! Authority Model - Who may mutate the replicated value
//!
//! Exactly one peer of a peer set is the authority: the one with the
//! byte-wise smallest id. Every peer that sees the same set picks the
//! same authority, without exchanging a single message.

use armsync_core::PeerId;

use crate::PeerSet;

/// Maps a peer set to its authority
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthorityResolver;

impl AuthorityResolver {
    /// Linear scan for the minimum id. Total: a peer set is never empty.
    pub fn resolve(peers: &PeerSet) -> PeerId {
        let mut min = peers.local();
        for peer in peers.iter() {
            if peer.as_bytes() < min.as_bytes() {
                min = peer;
            }
        }
        min.clone()
    }
}

/// Result of refreshing the memoized authority
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthorityChange {
    Unchanged,
    Changed {
        previous: Option<PeerId>,
        current: PeerId,
    },
}

/// Memoized authority, refreshed only when the peer set changes
#[derive(Clone, Debug, Default)]
pub struct AuthorityCache {
    current: Option<PeerId>,
}

impl AuthorityCache {
    pub fn new() -> Self {
        AuthorityCache::default()
    }

    pub fn current(&self) -> Option<&PeerId> {
        self.current.as_ref()
    }

    /// True if the cached authority is `peer`
    pub fn is(&self, peer: &PeerId) -> bool {
        self.current.as_ref() == Some(peer)
    }

    pub fn refresh(&mut self, peers: &PeerSet) -> AuthorityChange {
        let resolved = AuthorityResolver::resolve(peers);
        if self.current.as_ref() == Some(&resolved) {
            return AuthorityChange::Unchanged;
        }

        let previous = self.current.replace(resolved.clone());
        AuthorityChange::Changed {
            previous,
            current: resolved,
        }
    }
}
