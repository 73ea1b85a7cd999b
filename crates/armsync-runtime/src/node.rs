//! ARMSYNC Node - Replica actor
//!
//! One task per peer. Inbound payloads, directory events and local toggle
//! commands are merged into a single `select!` loop, so the replica sees
//! exactly one event at a time and needs no locking. Nothing in the loop
//! waits on the network: broadcasts are enqueued on the transport.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use armsync_core::{
    ArmsyncError, ArmsyncResult, DirectoryEvent, PeerDirectory, PeerId, Subscription,
};
use armsync_state::{PeerChange, Reaction, ReplicaStats, StateReplica};
use armsync_transport::{Inbound, InboundReceiver, Transport};
use armsync_wire::MessageCodec;

use crate::config::NodeConfig;
use crate::surface::ToggleSurface;

/// Commands accepted by a running node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeCommand {
    /// The local user asked for a flip
    Toggle,
    Shutdown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub replica: ReplicaStats,
    pub payloads_in: u64,
    pub malformed_dropped: u64,
    pub broadcasts_failed: u64,
}

/// Published view of a node, refreshed after every event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub local: PeerId,
    pub armed: bool,
    pub authority: Option<PeerId>,
    pub advertised_authority: Option<PeerId>,
    pub is_authority: bool,
    pub peers: Vec<PeerId>,
    pub stats: RuntimeStats,
}

/// Handle to a running node
#[derive(Clone)]
pub struct NodeHandle {
    local: PeerId,
    commands: mpsc::Sender<NodeCommand>,
    snapshots: watch::Receiver<NodeSnapshot>,
}

impl NodeHandle {
    pub fn local_id(&self) -> &PeerId {
        &self.local
    }

    pub async fn request_toggle(&self) -> ArmsyncResult<()> {
        self.commands
            .send(NodeCommand::Toggle)
            .await
            .map_err(|_| ArmsyncError::NodeStopped)
    }

    pub async fn shutdown(&self) {
        // Already stopped is fine
        let _ = self.commands.send(NodeCommand::Shutdown).await;
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait until the published snapshot satisfies `pred`
    pub async fn wait_for(&self, pred: impl Fn(&NodeSnapshot) -> bool) -> ArmsyncResult<NodeSnapshot> {
        let mut snapshots = self.snapshots.clone();
        loop {
            {
                let current = snapshots.borrow_and_update();
                if pred(&current) {
                    return Ok(current.clone());
                }
            }
            snapshots
                .changed()
                .await
                .map_err(|_| ArmsyncError::NodeStopped)?;
        }
    }
}

/// Replica actor state
pub struct ReplicaNode {
    replica: StateReplica,
    transport: Arc<dyn Transport>,
    directory: Arc<dyn PeerDirectory>,
    /// Released when the node stops
    subscription: Subscription,
    inbound: InboundReceiver,
    commands: mpsc::Receiver<NodeCommand>,
    surface: Box<dyn ToggleSurface>,
    codec: MessageCodec,
    stats: RuntimeStats,
    snapshots: watch::Sender<NodeSnapshot>,
}

impl ReplicaNode {
    /// Build a node; the directory subscription is taken here
    pub fn new(
        transport: Arc<dyn Transport>,
        directory: Arc<dyn PeerDirectory>,
        surface: Box<dyn ToggleSurface>,
        config: &NodeConfig,
    ) -> ArmsyncResult<(Self, NodeHandle)> {
        let local = directory.self_id().ok_or(ArmsyncError::ClientUnavailable)?;
        let inbound = transport
            .take_inbound()
            .ok_or_else(|| ArmsyncError::TransportError("inbound stream already taken".into()))?;
        let subscription = directory.subscribe();

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let replica = StateReplica::new(local.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot_of(&replica, &RuntimeStats::default()));

        let node = ReplicaNode {
            replica,
            transport,
            directory,
            subscription,
            inbound,
            commands: command_rx,
            surface,
            codec: MessageCodec::new(config.wire_format),
            stats: RuntimeStats::default(),
            snapshots: snapshot_tx,
        };
        let handle = NodeHandle {
            local,
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        Ok((node, handle))
    }

    /// Build a node and run it on the current runtime
    pub fn spawn(
        transport: Arc<dyn Transport>,
        directory: Arc<dyn PeerDirectory>,
        surface: Box<dyn ToggleSurface>,
        config: &NodeConfig,
    ) -> ArmsyncResult<(NodeHandle, JoinHandle<()>)> {
        let (node, handle) = ReplicaNode::new(transport, directory, surface, config)?;
        Ok((handle, tokio::spawn(node.run())))
    }

    /// Run the event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        self.start();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(NodeCommand::Toggle) => {
                        let reaction = self.replica.request_toggle();
                        self.apply(reaction);
                    }
                    Some(NodeCommand::Shutdown) | None => break,
                },
                Some(inbound) = self.inbound.recv() => self.handle_inbound(inbound),
                event = self.subscription.recv() => match event {
                    Some(event) => self.handle_directory_event(event),
                    None => {
                        warn!(peer = %self.replica.local_id(), "peer directory closed");
                        break;
                    }
                },
            }
            self.publish();
        }

        info!(peer = %self.replica.local_id(), "node shutting down");
    }

    fn start(&mut self) {
        let reaction = self.replica.start();
        self.apply(reaction);

        // The directory may already hold a session roster
        let members = self.directory.members();
        let reaction = self.replica.apply_peer_change(PeerChange::Snapshot(members));
        self.apply(reaction);
        self.publish();
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        self.stats.payloads_in += 1;
        match self.codec.decode(&inbound.payload) {
            Ok(msg) => {
                let reaction = self.replica.handle_message(&inbound.sender, msg);
                self.apply(reaction);
            }
            Err(err) => {
                self.stats.malformed_dropped += 1;
                warn!(
                    peer = %self.replica.local_id(),
                    sender = %inbound.sender,
                    error = %err,
                    "dropping malformed message"
                );
            }
        }
    }

    fn handle_directory_event(&mut self, event: DirectoryEvent) {
        let change = match event {
            DirectoryEvent::PeerJoined(peer) => PeerChange::Joined(peer),
            DirectoryEvent::PeerLeft(peer) => PeerChange::Left(peer),
            DirectoryEvent::SelfJoined => PeerChange::Snapshot(self.directory.members()),
        };
        debug!(peer = %self.replica.local_id(), ?change, "peer set change");

        let reaction = self.replica.apply_peer_change(change);
        self.apply(reaction);
    }

    fn apply(&mut self, reaction: Reaction) {
        if let Some(armed) = reaction.render {
            self.surface.render(armed);
        }

        let Some(msg) = reaction.broadcast else {
            return;
        };
        let sent = self
            .codec
            .encode(&msg)
            .and_then(|payload| self.transport.broadcast(payload));

        match sent {
            Ok(()) => {}
            Err(ArmsyncError::NotJoined) => {
                debug!(peer = %self.replica.local_id(), kind = msg.kind(), "not in a session, broadcast skipped");
            }
            Err(err) => {
                self.stats.broadcasts_failed += 1;
                warn!(peer = %self.replica.local_id(), error = %err, "broadcast failed");
            }
        }
    }

    fn publish(&mut self) {
        self.stats.replica = self.replica.stats().clone();
        self.snapshots
            .send_replace(snapshot_of(&self.replica, &self.stats));
    }
}

fn snapshot_of(replica: &StateReplica, stats: &RuntimeStats) -> NodeSnapshot {
    NodeSnapshot {
        local: replica.local_id().clone(),
        armed: replica.armed(),
        authority: replica.authority().cloned(),
        advertised_authority: replica.advertised_authority().cloned(),
        is_authority: replica.is_authority(),
        peers: replica.peers().iter().cloned().collect(),
        stats: stats.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bytes::Bytes;

    use armsync_core::{SessionClient, SessionId};
    use armsync_transport::{LocalPeer, LocalSession, LocalSessionConfig};

    use crate::surface::RecordingSurface;

    const WAIT: Duration = Duration::from_secs(2);

    fn lobby() -> SessionId {
        SessionId::from_name("lobby")
    }

    struct Running {
        peer: Arc<LocalPeer>,
        handle: NodeHandle,
        surface: RecordingSurface,
    }

    fn spawn_node(hub: &LocalSession, id: &str) -> Running {
        let peer = Arc::new(hub.peer(id));
        let surface = RecordingSurface::new();
        let (handle, _task) = ReplicaNode::spawn(
            peer.clone(),
            peer.clone(),
            Box::new(surface.clone()),
            &NodeConfig::default(),
        )
        .unwrap();
        Running {
            peer,
            handle,
            surface,
        }
    }

    async fn wait(handle: &NodeHandle, pred: impl Fn(&NodeSnapshot) -> bool) -> NodeSnapshot {
        tokio::time::timeout(WAIT, handle.wait_for(pred))
            .await
            .expect("timed out waiting for node")
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_routed_through_authority() {
        let hub = LocalSession::default();
        let nodes: Vec<Running> = ["a1", "b1", "c1"].iter().map(|id| spawn_node(&hub, id)).collect();
        for node in &nodes {
            node.peer.join("lobby", lobby()).unwrap();
        }
        for node in &nodes {
            wait(&node.handle, |s| s.peers.len() == 3).await;
        }

        let c = &nodes[2];
        let snap = c.handle.snapshot();
        assert_eq!(snap.authority, Some(PeerId::new("a1")));
        assert!(!snap.is_authority);

        c.handle.request_toggle().await.unwrap();
        for node in &nodes {
            let snap = wait(&node.handle, |s| s.armed).await;
            assert_eq!(snap.authority, Some(PeerId::new("a1")));
        }

        let a = wait(&nodes[0].handle, |s| s.stats.replica.requests_served == 1).await;
        assert!(a.armed);
        let c = wait(&nodes[2].handle, |s| s.stats.replica.requests_sent == 1).await;
        assert_eq!(c.advertised_authority, Some(PeerId::new("a1")));
        assert_eq!(nodes[2].surface.last(), Some(true));
    }

    #[tokio::test]
    async fn test_promotion_on_leave_rebroadcasts() {
        let hub = LocalSession::default();
        let a = spawn_node(&hub, "a1");
        let b = spawn_node(&hub, "b1");
        let c = spawn_node(&hub, "c1");
        for node in [&a, &b, &c] {
            node.peer.join("lobby", lobby()).unwrap();
        }
        for node in [&a, &b, &c] {
            wait(&node.handle, |s| s.peers.len() == 3).await;
        }

        a.handle.request_toggle().await.unwrap();
        wait(&b.handle, |s| s.armed).await;
        wait(&c.handle, |s| s.armed).await;

        a.handle.shutdown().await;
        a.peer.leave();

        let b_snap = wait(&b.handle, |s| s.is_authority && s.peers.len() == 2).await;
        assert!(b_snap.armed);

        // C adopts B's push and resolves B on its own
        let c_snap = wait(&c.handle, |s| {
            s.advertised_authority == Some(PeerId::new("b1")) && s.peers.len() == 2
        })
        .await;
        assert!(c_snap.armed);
        assert_eq!(c_snap.authority, Some(PeerId::new("b1")));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let hub = LocalSession::default();
        let a = spawn_node(&hub, "a1");
        let rogue = hub.peer("r0");
        a.peer.join("lobby", lobby()).unwrap();
        rogue.join("lobby", lobby()).unwrap();

        rogue.broadcast(Bytes::from_static(b"{not json")).unwrap();
        let snap = wait(&a.handle, |s| s.stats.malformed_dropped == 1).await;
        assert!(!snap.armed);
    }

    #[tokio::test]
    async fn test_echoed_update_does_not_flip_back() {
        let hub = LocalSession::new(LocalSessionConfig {
            echo: true,
            capacity: None,
        });
        let peer = Arc::new(hub.peer("a1"));
        peer.join("lobby", lobby()).unwrap();
        let (handle, _task) = ReplicaNode::spawn(
            peer.clone(),
            peer.clone(),
            Box::new(RecordingSurface::new()),
            &NodeConfig::default(),
        )
        .unwrap();

        // Start pushes once, the toggle pushes again; both come back as updates
        handle.request_toggle().await.unwrap();
        let snap = wait(&handle, |s| s.stats.replica.updates_applied == 2).await;
        assert!(snap.armed);
        assert_eq!(snap.stats.replica.updates_sent, 2);
        assert_eq!(snap.stats.replica.requests_served, 0);
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let hub = LocalSession::default();
        let peer = Arc::new(hub.peer("a1"));
        let (handle, task) = ReplicaNode::spawn(
            peer.clone(),
            peer.clone(),
            Box::new(RecordingSurface::new()),
            &NodeConfig::default(),
        )
        .unwrap();

        handle.shutdown().await;
        task.await.unwrap();
        assert!(matches!(
            handle.request_toggle().await,
            Err(ArmsyncError::NodeStopped)
        ));
    }

    #[test]
    fn test_inbound_can_only_be_taken_once() {
        let hub = LocalSession::default();
        let peer = Arc::new(hub.peer("a1"));
        peer.take_inbound();

        let result = ReplicaNode::new(
            peer.clone(),
            peer,
            Box::new(RecordingSurface::new()),
            &NodeConfig::default(),
        );
        assert!(matches!(result, Err(ArmsyncError::TransportError(_))));
    }

    #[tokio::test]
    async fn test_legacy_wire_interop() {
        let hub = LocalSession::default();
        let peer = Arc::new(hub.peer("b1"));
        let config = NodeConfig {
            wire_format: armsync_wire::WireFormat::Legacy,
            ..Default::default()
        };
        let (handle, _task) =
            ReplicaNode::spawn(peer.clone(), peer.clone(), Box::new(RecordingSurface::new()), &config)
                .unwrap();

        let old = hub.peer("a0");
        peer.join("lobby", lobby()).unwrap();
        old.join("lobby", lobby()).unwrap();
        wait(&handle, |s| s.authority == Some(PeerId::new("a0"))).await;

        old.broadcast(Bytes::from_static(
            br#"{"type":"state","state":true,"requester":"","authority":"a0"}"#,
        ))
        .unwrap();
        let snap = wait(&handle, |s| s.armed).await;
        assert_eq!(snap.advertised_authority, Some(PeerId::new("a0")));
    }
}
