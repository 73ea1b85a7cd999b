//! UDP transport implementation
//!
//! Broadcast is a fan-out of one datagram per configured peer address.
//! Datagrams can be lost; nothing here retries.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use armsync_core::{ArmsyncError, ArmsyncResult, PeerId, SessionId};
use armsync_wire::{Frame, MAX_FRAME_SIZE};

use crate::{Inbound, InboundReceiver, InboundSender, Transport};

/// UDP transport for ARMSYNC
///
/// Dropping the transport stops both loops and releases the port.
pub struct UdpTransport {
    local_addr: SocketAddr,
    local_id: PeerId,
    session: SessionId,
    outgoing: mpsc::UnboundedSender<Bytes>,
    inbound: Mutex<Option<InboundReceiver>>,
    receive_task: JoinHandle<()>,
}

impl UdpTransport {
    /// Bind to a local address and start the send and receive loops
    pub async fn bind(
        addr: SocketAddr,
        local_id: PeerId,
        session: SessionId,
        peers: Vec<SocketAddr>,
    ) -> ArmsyncResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| ArmsyncError::TransportError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| ArmsyncError::TransportError(e.to_string()))?;

        let socket = Arc::new(socket);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let receive_task = start_receive_loop(socket.clone(), session, inbound_tx);
        // Ends once `outgoing` is dropped
        let outgoing = start_send_loop(socket, peers);

        Ok(UdpTransport {
            local_addr,
            local_id,
            session,
            outgoing,
            inbound: Mutex::new(Some(inbound_rx)),
            receive_task,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}

impl Transport for UdpTransport {
    fn broadcast(&self, payload: Bytes) -> ArmsyncResult<()> {
        let frame = Frame::new(self.session, self.local_id.clone(), payload);
        let bytes = frame.serialize()?;
        self.outgoing
            .send(bytes)
            .map_err(|_| ArmsyncError::TransportClosed)
    }

    fn is_ready(&self) -> bool {
        !self.outgoing.is_closed()
    }

    fn take_inbound(&self) -> Option<InboundReceiver> {
        self.inbound.lock().take()
    }
}

/// Start a background send loop fanning each datagram out to `peers`
fn start_send_loop(socket: Arc<UdpSocket>, peers: Vec<SocketAddr>) -> mpsc::UnboundedSender<Bytes> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            for dest in &peers {
                if let Err(e) = socket.send_to(&bytes, dest).await {
                    tracing::warn!("UDP send to {} failed: {}", dest, e);
                }
            }
        }
    });

    tx
}

/// Start a background receive loop
fn start_receive_loop(
    socket: Arc<UdpSocket>,
    session: SessionId,
    tx: InboundSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    let frame = match Frame::parse(&buf[..len]) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!("Dropping datagram from {}: {}", addr, e);
                            continue;
                        }
                    };
                    if frame.session != session {
                        tracing::debug!("Dropping datagram for session {}", frame.session);
                        continue;
                    }
                    let inbound = Inbound {
                        sender: frame.sender,
                        payload: frame.payload,
                    };
                    if tx.send(inbound).is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                }
            }
        }
    })
}
