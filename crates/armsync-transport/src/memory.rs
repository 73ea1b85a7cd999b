//! In-process session hub
//!
//! A [`LocalSession`] hosts any number of named sessions. Each
//! [`LocalPeer`] is at once a [`Transport`], a [`PeerDirectory`] and a
//! [`SessionClient`], which is all a replica actor needs to run.
//!
//! Lock order is hub first, then peer.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use armsync_core::{
    ArmsyncError, ArmsyncResult, DirectoryEvent, PeerDirectory, PeerId, SessionClient, SessionId,
    SessionInfo, Subscription,
};

use crate::{Inbound, InboundReceiver, InboundSender, Transport};

/// Hub configuration
#[derive(Clone, Debug, Default)]
pub struct LocalSessionConfig {
    /// Deliver a peer's broadcasts back to itself
    pub echo: bool,
    /// Maximum members per session
    pub capacity: Option<usize>,
}

#[derive(Default)]
struct HubState {
    rooms: HashMap<SessionId, Room>,
}

struct Room {
    name: String,
    members: BTreeMap<PeerId, Arc<Mutex<PeerState>>>,
}

struct PeerState {
    session: Option<SessionInfo>,
    connected: bool,
    inbox: InboundSender,
    subscribers: HashMap<u64, mpsc::UnboundedSender<DirectoryEvent>>,
    next_subscriber: u64,
}

impl PeerState {
    fn notify(&mut self, event: DirectoryEvent) {
        self.subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// In-process session fabric
#[derive(Clone, Default)]
pub struct LocalSession {
    hub: Arc<Mutex<HubState>>,
    config: LocalSessionConfig,
}

impl LocalSession {
    pub fn new(config: LocalSessionConfig) -> Self {
        LocalSession {
            hub: Arc::new(Mutex::new(HubState::default())),
            config,
        }
    }

    /// Create a connected peer
    pub fn peer(&self, id: impl Into<PeerId>) -> LocalPeer {
        self.make_peer(id.into(), true)
    }

    /// Create a peer with no connection yet; see [`LocalPeer::set_connected`]
    pub fn detached_peer(&self, id: impl Into<PeerId>) -> LocalPeer {
        self.make_peer(id.into(), false)
    }

    /// Members of a session, in id order
    pub fn members(&self, session: SessionId) -> Vec<PeerId> {
        self.hub
            .lock()
            .rooms
            .get(&session)
            .map(|room| room.members.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn make_peer(&self, id: PeerId, connected: bool) -> LocalPeer {
        let (inbox, inbound) = mpsc::unbounded_channel();
        LocalPeer {
            id,
            hub: self.hub.clone(),
            config: self.config.clone(),
            state: Arc::new(Mutex::new(PeerState {
                session: None,
                connected,
                inbox,
                subscribers: HashMap::new(),
                next_subscriber: 0,
            })),
            inbound: Mutex::new(Some(inbound)),
        }
    }
}

/// One participant's handle on a [`LocalSession`]
///
/// Dropping the handle leaves the session.
pub struct LocalPeer {
    id: PeerId,
    hub: Arc<Mutex<HubState>>,
    config: LocalSessionConfig,
    state: Arc<Mutex<PeerState>>,
    inbound: Mutex<Option<InboundReceiver>>,
}

impl LocalPeer {
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Leave the current session, if any
    pub fn leave(&self) {
        let mut hub = self.hub.lock();
        self.leave_locked(&mut hub);
    }

    fn leave_locked(&self, hub: &mut HubState) {
        let Some(info) = self.state.lock().session.take() else {
            return;
        };

        let Some(room) = hub.rooms.get_mut(&info.id) else {
            return;
        };
        room.members.remove(&self.id);
        for member in room.members.values() {
            member
                .lock()
                .notify(DirectoryEvent::PeerLeft(self.id.clone()));
        }
        if room.members.is_empty() {
            hub.rooms.remove(&info.id);
        }
        debug!(peer = %self.id, session = %info.name, "left session");
    }
}

impl Drop for LocalPeer {
    fn drop(&mut self) {
        self.leave();
    }
}

impl Transport for LocalPeer {
    fn broadcast(&self, payload: Bytes) -> ArmsyncResult<()> {
        let hub = self.hub.lock();
        let session = self
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| s.id)
            .ok_or(ArmsyncError::NotJoined)?;

        let room = hub.rooms.get(&session).ok_or(ArmsyncError::NotJoined)?;
        for (id, member) in &room.members {
            if *id == self.id && !self.config.echo {
                continue;
            }
            let inbound = Inbound {
                sender: self.id.clone(),
                payload: payload.clone(),
            };
            // A receiver that went away is equivalent to a departed peer
            let _ = member.lock().inbox.send(inbound);
        }
        trace!(peer = %self.id, bytes = payload.len(), "broadcast");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.state.lock().connected
    }

    fn take_inbound(&self) -> Option<InboundReceiver> {
        self.inbound.lock().take()
    }
}

impl PeerDirectory for LocalPeer {
    fn self_id(&self) -> Option<PeerId> {
        Some(self.id.clone())
    }

    fn members(&self) -> Vec<PeerId> {
        let hub = self.hub.lock();
        let session = self.state.lock().session.as_ref().map(|s| s.id);
        match session.and_then(|id| hub.rooms.get(&id)) {
            Some(room) => room.members.keys().cloned().collect(),
            None => vec![self.id.clone()],
        }
    }

    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = {
            let mut state = self.state.lock();
            let key = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.insert(key, tx);
            key
        };

        let weak: Weak<Mutex<PeerState>> = Arc::downgrade(&self.state);
        Subscription::new(rx, move || {
            if let Some(state) = weak.upgrade() {
                state.lock().subscribers.remove(&key);
            }
        })
    }
}

impl SessionClient for LocalPeer {
    fn connection_count(&self) -> usize {
        usize::from(self.state.lock().connected)
    }

    fn joined_session(&self) -> Option<SessionInfo> {
        self.state.lock().session.clone()
    }

    fn join(&self, name: &str, id: SessionId) -> ArmsyncResult<SessionInfo> {
        if !self.is_ready() {
            return Err(ArmsyncError::JoinRejected {
                session: id,
                reason: "not connected".into(),
            });
        }
        if self.joined_session().is_some_and(|s| s.id == id) {
            return self.joined_session().ok_or(ArmsyncError::NotJoined);
        }

        // A rejected join keeps the current session and creates no room
        let mut hub = self.hub.lock();
        if let Some(capacity) = self.config.capacity {
            let occupied = hub.rooms.get(&id).map_or(0, |room| room.members.len());
            if occupied >= capacity {
                return Err(ArmsyncError::JoinRejected {
                    session: id,
                    reason: format!("session full ({} members)", capacity),
                });
            }
        }
        self.leave_locked(&mut hub);

        let room = hub.rooms.entry(id).or_insert_with(|| Room {
            name: name.to_string(),
            members: BTreeMap::new(),
        });
        for member in room.members.values() {
            member
                .lock()
                .notify(DirectoryEvent::PeerJoined(self.id.clone()));
        }
        room.members.insert(self.id.clone(), self.state.clone());

        let info = SessionInfo {
            id,
            name: room.name.clone(),
        };
        {
            let mut state = self.state.lock();
            state.session = Some(info.clone());
            state.notify(DirectoryEvent::SelfJoined);
        }
        debug!(peer = %self.id, session = %info.name, "joined session");
        Ok(info)
    }
}
