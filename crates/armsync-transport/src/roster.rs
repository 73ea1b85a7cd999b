//! Static roster directory
//!
//! For packet transports with no membership service: the roster is fixed
//! at construction and the only event ever emitted is `SelfJoined`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use armsync_core::{
    ArmsyncResult, DirectoryEvent, PeerDirectory, PeerId, SessionClient, SessionId, SessionInfo,
    Subscription,
};

#[derive(Default)]
struct RosterState {
    session: Option<SessionInfo>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<DirectoryEvent>>,
    next_subscriber: u64,
}

/// Fixed membership list
pub struct StaticRoster {
    local: PeerId,
    members: Vec<PeerId>,
    state: Arc<Mutex<RosterState>>,
}

impl StaticRoster {
    /// `members` may or may not contain `local`
    pub fn new(local: PeerId, members: impl IntoIterator<Item = PeerId>) -> Self {
        let mut members: Vec<PeerId> = members.into_iter().collect();
        if !members.contains(&local) {
            members.push(local.clone());
        }
        members.sort();
        members.dedup();

        StaticRoster {
            local,
            members,
            state: Arc::new(Mutex::new(RosterState::default())),
        }
    }
}

impl PeerDirectory for StaticRoster {
    fn self_id(&self) -> Option<PeerId> {
        Some(self.local.clone())
    }

    fn members(&self) -> Vec<PeerId> {
        if self.state.lock().session.is_some() {
            self.members.clone()
        } else {
            vec![self.local.clone()]
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

        let weak: Weak<Mutex<RosterState>> = Arc::downgrade(&self.state);
        Subscription::new(rx, move || {
            if let Some(state) = weak.upgrade() {
                state.lock().subscribers.remove(&key);
            }
        })
    }
}

impl SessionClient for StaticRoster {
    fn connection_count(&self) -> usize {
        self.members.len() - 1
    }

    fn joined_session(&self) -> Option<SessionInfo> {
        self.state.lock().session.clone()
    }

    fn join(&self, name: &str, id: SessionId) -> ArmsyncResult<SessionInfo> {
        let info = SessionInfo {
            id,
            name: name.to_string(),
        };

        let mut state = self.state.lock();
        state.session = Some(info.clone());
        state
            .subscribers
            .retain(|_, tx| tx.send(DirectoryEvent::SelfJoined).is_ok());
        Ok(info)
    }
}
