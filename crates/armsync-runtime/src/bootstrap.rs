//! Peer bootstrap
//!
//! Wires a session client into a running replica node and kicks off the
//! join sequence beside it. The node is up before the join so that no
//! directory event is missed, and the join waits for the transport.

use std::sync::Arc;

use tokio::task::JoinHandle;

use armsync_core::{ArmsyncResult, SessionClient, SessionInfo};
use armsync_transport::Transport;

use crate::config::RuntimeConfig;
use crate::joiner::SessionJoiner;
use crate::node::{NodeHandle, ReplicaNode};
use crate::surface::ToggleSurface;

/// A launched peer
pub struct Launched {
    pub handle: NodeHandle,
    pub node_task: JoinHandle<()>,
    /// Resolves once the join sequence ends; a rejection is not retried
    pub join_task: JoinHandle<ArmsyncResult<SessionInfo>>,
}

/// Start a replica node on `client` and join the configured session
pub fn launch<C>(
    client: Arc<C>,
    surface: Box<dyn ToggleSurface>,
    config: &RuntimeConfig,
) -> ArmsyncResult<Launched>
where
    C: Transport + SessionClient + 'static,
{
    let (handle, node_task) =
        ReplicaNode::spawn(client.clone(), client.clone(), surface, &config.node)?;

    let joiner = SessionJoiner::new(client.clone(), config.session.clone()).with_transport(client);
    let join_task = tokio::spawn(async move { joiner.run().await });

    Ok(Launched {
        handle,
        node_task,
        join_task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use armsync_core::{PeerId, SessionId};
    use armsync_transport::LocalSession;

    use crate::surface::RecordingSurface;

    fn config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.session.session_name = "range-7".into();
        config.session.auto_join_delay = Duration::ZERO;
        config.session.poll_interval = Duration::from_millis(1);
        config.session.ready_timeout = Some(Duration::from_secs(2));
        config
    }

    #[tokio::test]
    async fn test_launched_peers_converge() {
        let hub = LocalSession::default();
        let config = config();

        let mut peers = Vec::new();
        for id in ["b1", "a1"] {
            let client = Arc::new(hub.peer(id));
            let launched = launch(client.clone(), Box::new(RecordingSurface::new()), &config).unwrap();
            let session = launched.join_task.await.unwrap().unwrap();
            assert_eq!(session.id, SessionId::from_name("range-7"));
            peers.push((client, launched.handle));
        }

        let (_, b) = &peers[0];
        let (_, a) = &peers[1];
        tokio::time::timeout(Duration::from_secs(2), b.wait_for(|s| s.peers.len() == 2))
            .await
            .unwrap()
            .unwrap();

        b.request_toggle().await.unwrap();
        let snap = tokio::time::timeout(Duration::from_secs(2), a.wait_for(|s| s.armed))
            .await
            .unwrap()
            .unwrap();
        assert!(snap.is_authority);
        assert_eq!(snap.authority, Some(PeerId::new("a1")));
    }
}
