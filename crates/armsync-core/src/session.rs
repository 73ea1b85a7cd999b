//! Session membership interfaces
//!
//! A [`PeerDirectory`] owns the roster of a session and tells subscribers
//! when it changes. A [`SessionClient`] is a directory that can also be
//! asked to join a session.

use std::fmt;

use tokio::sync::mpsc;

use crate::{ArmsyncResult, PeerId, SessionId};

/// Roster change notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectoryEvent {
    PeerJoined(PeerId),
    PeerLeft(PeerId),
    /// The local peer completed a join; the full roster should be re-read
    SelfJoined,
}

/// Live subscription to directory events
///
/// Dropping the subscription releases it at the directory.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<DirectoryEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<DirectoryEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Subscription {
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next event; `None` once the directory is gone
    pub async fn recv(&mut self) -> Option<DirectoryEvent> {
        self.events.recv().await
    }

    /// Non-blocking poll
    pub fn try_recv(&mut self) -> Option<DirectoryEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// Source of session membership
pub trait PeerDirectory: Send + Sync {
    /// Local peer id, `None` until the directory is initialised
    fn self_id(&self) -> Option<PeerId>;

    /// Current members, the local peer included
    fn members(&self) -> Vec<PeerId>;

    /// Register for roster changes
    fn subscribe(&self) -> Subscription;
}

/// A session that has been joined
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
}

impl SessionInfo {
    pub fn join_code(&self) -> String {
        self.id.join_code()
    }
}

/// Directory that can join sessions
pub trait SessionClient: PeerDirectory {
    /// Number of live links to the session fabric
    fn connection_count(&self) -> usize;

    /// Session currently joined, if any
    fn joined_session(&self) -> Option<SessionInfo>;

    /// Join a session; fails with [`crate::ArmsyncError::JoinRejected`]
    fn join(&self, name: &str, id: SessionId) -> ArmsyncResult<SessionInfo>;
}
