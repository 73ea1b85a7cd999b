//! Session join sequencer
//!
//! Waits for the session client to come up and, when one is attached, for
//! the transport to report ready. Optionally waits for a live connection,
//! then issues exactly one join for the configured session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use armsync_core::{
    ArmsyncError, ArmsyncResult, PeerDirectory, SessionClient, SessionId, SessionInfo,
};

use armsync_transport::Transport;

use crate::config::JoinConfig;

/// Floor for the readiness poll; a zero interval would never yield
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct SessionJoiner<C: SessionClient + ?Sized> {
    client: Arc<C>,
    transport: Option<Arc<dyn Transport>>,
    config: JoinConfig,
}

impl<C: SessionClient + ?Sized> SessionJoiner<C> {
    pub fn new(client: Arc<C>, config: JoinConfig) -> Self {
        SessionJoiner {
            client,
            transport: None,
            config,
        }
    }

    /// Hold the join until `transport` reports ready
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Session id derived from the configured name
    pub fn session_id(&self) -> SessionId {
        SessionId::from_name(&self.config.session_name)
    }

    /// Run the sequence; returns the joined session
    pub async fn run(&self) -> ArmsyncResult<SessionInfo> {
        self.wait_until("session client", || self.client.self_id().is_some())
            .await?;

        if let Some(transport) = &self.transport {
            self.wait_until("transport", || transport.is_ready()).await?;
        }

        if !self.config.auto_join_delay.is_zero() {
            tokio::time::sleep(self.config.auto_join_delay).await;
        }

        if self.config.require_connection {
            self.wait_until("session connection", || {
                self.client.connection_count() > 0
            })
            .await?;
        }

        if let Some(session) = self.client.joined_session() {
            info!(session = %session.name, "already in session");
            return Ok(session);
        }

        let name = &self.config.session_name;
        let id = self.session_id();
        info!(session = %name, guid = %id, "joining session");

        match self.client.join(name, id) {
            Ok(session) => {
                info!(
                    session = %session.name,
                    join_code = %session.join_code(),
                    "joined session"
                );
                Ok(session)
            }
            Err(err) => {
                warn!(session = %name, error = %err, "join rejected");
                Err(err)
            }
        }
    }

    async fn wait_until(&self, what: &'static str, ready: impl Fn() -> bool) -> ArmsyncResult<()> {
        let interval = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let poll = async {
            while !ready() {
                tokio::time::sleep(interval).await;
            }
        };
        with_optional_timeout(self.config.ready_timeout, what, poll).await
    }
}

async fn with_optional_timeout(
    limit: Option<Duration>,
    what: &'static str,
    fut: impl Future<Output = ()>,
) -> ArmsyncResult<()> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ArmsyncError::Timeout(what)),
        None => {
            fut.await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use bytes::Bytes;

    use armsync_transport::{InboundReceiver, LocalSession, LocalSessionConfig};

    /// Transport whose readiness is flipped by hand
    #[derive(Default)]
    struct GatedTransport {
        ready: AtomicBool,
    }

    impl Transport for GatedTransport {
        fn broadcast(&self, _payload: Bytes) -> ArmsyncResult<()> {
            Ok(())
        }

        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn take_inbound(&self) -> Option<InboundReceiver> {
            None
        }
    }

    fn fast_config(name: &str) -> JoinConfig {
        JoinConfig {
            session_name: name.to_string(),
            auto_join_delay: Duration::ZERO,
            require_connection: true,
            poll_interval: Duration::from_millis(1),
            ready_timeout: Some(Duration::from_secs(2)),
        }
    }

    #[tokio::test]
    async fn test_joins_named_session() {
        let hub = LocalSession::default();
        let peer = Arc::new(hub.peer("a1"));

        let joiner = SessionJoiner::new(peer.clone(), fast_config("range-7"));
        let session = joiner.run().await.unwrap();

        assert_eq!(session.id, SessionId::from_name("range-7"));
        assert_eq!(session.name, "range-7");
        assert_eq!(hub.members(session.id), peer.members());
    }

    #[tokio::test]
    async fn test_waits_for_connection() {
        let hub = LocalSession::default();
        let peer = Arc::new(hub.detached_peer("a1"));

        let joiner = SessionJoiner::new(peer.clone(), fast_config("range-7"));
        let task = tokio::spawn(async move { joiner.run().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(peer.joined_session().is_none());

        peer.set_connected(true);
        let session = task.await.unwrap().unwrap();
        assert_eq!(peer.joined_session(), Some(session));
    }

    #[tokio::test]
    async fn test_connection_wait_times_out() {
        let hub = LocalSession::default();
        let peer = Arc::new(hub.detached_peer("a1"));

        let mut config = fast_config("range-7");
        config.ready_timeout = Some(Duration::from_millis(20));

        let err = SessionJoiner::new(peer, config).run().await.unwrap_err();
        assert!(matches!(err, ArmsyncError::Timeout("session connection")));
    }

    #[tokio::test]
    async fn test_already_joined_is_not_rejoined() {
        let hub = LocalSession::default();
        let peer = Arc::new(hub.peer("a1"));
        peer.join("first", SessionId::from_name("first")).unwrap();

        let session = SessionJoiner::new(peer.clone(), fast_config("second"))
            .run()
            .await
            .unwrap();
        assert_eq!(session.name, "first");
    }

    #[tokio::test]
    async fn test_rejection_is_returned() {
        let hub = LocalSession::new(LocalSessionConfig {
            echo: false,
            capacity: Some(1),
        });
        let a = Arc::new(hub.peer("a1"));
        a.join("range-7", SessionId::from_name("range-7")).unwrap();

        let b = Arc::new(hub.peer("b1"));
        let err = SessionJoiner::new(b, fast_config("range-7"))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ArmsyncError::JoinRejected { .. }));
    }

    #[tokio::test]
    async fn test_waits_for_transport_ready() {
        let hub = LocalSession::default();
        let peer = Arc::new(hub.peer("a1"));
        let transport = Arc::new(GatedTransport::default());

        let joiner = SessionJoiner::new(peer.clone(), fast_config("range-7"))
            .with_transport(transport.clone());
        let task = tokio::spawn(async move { joiner.run().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(peer.joined_session().is_none());

        transport.ready.store(true, Ordering::SeqCst);
        let session = task.await.unwrap().unwrap();
        assert_eq!(peer.joined_session(), Some(session));
    }

    #[tokio::test]
    async fn test_transport_wait_times_out() {
        let hub = LocalSession::default();
        let peer = Arc::new(hub.peer("a1"));

        let mut config = fast_config("range-7");
        config.ready_timeout = Some(Duration::from_millis(20));

        let err = SessionJoiner::new(peer.clone(), config)
            .with_transport(Arc::new(GatedTransport::default()))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ArmsyncError::Timeout("transport")));
        assert!(peer.joined_session().is_none());
    }

    #[tokio::test]
    async fn test_zero_poll_interval_still_yields() {
        let hub = LocalSession::default();
        let peer = Arc::new(hub.detached_peer("a1"));

        let mut config = fast_config("range-7");
        config.poll_interval = Duration::ZERO;
        config.ready_timeout = Some(Duration::from_millis(20));

        let err = SessionJoiner::new(peer, config).run().await.unwrap_err();
        assert!(matches!(err, ArmsyncError::Timeout("session connection")));
    }
}
