//! ARMSYNC Session Demo
//!
//! Runs a small session inside one process and scripts a few toggles:
//! - Three peers on the in-memory session hub (default)
//! - Two peers over UDP on loopback (`--udp`)
//!
//! Usage: `session-demo [--udp] [config.json]`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use armsync_core::{ArmsyncError, ArmsyncResult, PeerId, SessionId};
use armsync_runtime::{
    init_logging, launch, ConsoleSurface, NodeHandle, NodeSnapshot, ReplicaNode, RuntimeConfig,
    SessionJoiner,
};
use armsync_transport::{LocalSession, StaticRoster, UdpTransport};

const SETTLE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut udp = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--udp" => udp = true,
            _ => config_path = Some(arg),
        }
    }

    let config = match config_path {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    init_logging(&config.logging)?;

    println!("=== ARMSYNC Session Demo ===\n");
    if udp {
        run_udp(&config).await?;
    } else {
        run_local(&config).await?;
    }
    println!("\nDone.");
    Ok(())
}

fn surface(config: &RuntimeConfig, label: &str) -> Box<ConsoleSurface> {
    Box::new(ConsoleSurface::new(
        label,
        config.presentation.palette,
        &config.presentation.technique,
    ))
}

async fn run_local(config: &RuntimeConfig) -> ArmsyncResult<()> {
    let hub = LocalSession::default();

    println!("1. Starting peers a1, b1, c1 on the local hub...");
    let mut peers = Vec::new();
    for id in ["a1", "b1", "c1"] {
        let client = Arc::new(hub.peer(id));
        let launched = launch(client.clone(), surface(config, id), config)?;
        let session = launched
            .join_task
            .await
            .map_err(|e| ArmsyncError::TransportError(e.to_string()))??;
        println!("   {} joined {} (code {})", id, session.name, session.join_code());
        peers.push((client, launched.handle));
    }
    for (_, handle) in &peers {
        settle(handle, |s| s.peers.len() == 3).await?;
    }
    print_status(&peers.iter().map(|(_, h)| h.clone()).collect::<Vec<_>>());

    println!("\n2. c1 asks for a toggle; a1 is authority and serves it...");
    peers[2].1.request_toggle().await?;
    for (_, handle) in &peers {
        settle(handle, |s| s.armed).await?;
    }

    println!("\n3. a1 leaves; b1 takes over and re-broadcasts...");
    let (a_client, a_handle) = peers.remove(0);
    a_handle.shutdown().await;
    a_client.leave();
    for (_, handle) in &peers {
        settle(handle, |s| s.authority == Some(PeerId::new("b1"))).await?;
    }

    println!("\n4. c1 toggles again through b1...");
    peers[1].1.request_toggle().await?;
    for (_, handle) in &peers {
        settle(handle, |s| !s.armed).await?;
    }

    print_status(&peers.iter().map(|(_, h)| h.clone()).collect::<Vec<_>>());
    Ok(())
}

async fn run_udp(config: &RuntimeConfig) -> ArmsyncResult<()> {
    let loopback: SocketAddr = ([127, 0, 0, 1], 0).into();
    let roster = [PeerId::new("a1"), PeerId::new("b1")];
    let session = SessionId::from_name(&config.session.session_name);

    println!("1. Binding two UDP peers on loopback...");
    let mut sockets = Vec::new();
    for _ in &roster {
        let reserved = tokio::net::UdpSocket::bind(loopback)
            .await
            .map_err(|e| ArmsyncError::TransportError(e.to_string()))?;
        let addr = reserved
            .local_addr()
            .map_err(|e| ArmsyncError::TransportError(e.to_string()))?;
        drop(reserved);
        sockets.push(addr);
    }

    let mut handles = Vec::new();
    for (i, id) in roster.iter().enumerate() {
        let others: Vec<SocketAddr> = sockets
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, addr)| *addr)
            .collect();
        let transport = Arc::new(UdpTransport::bind(sockets[i], id.clone(), session, others).await?);
        let directory = Arc::new(StaticRoster::new(id.clone(), roster.clone()));

        let (handle, _task) = ReplicaNode::spawn(
            transport.clone(),
            directory.clone(),
            surface(config, id.as_str()),
            &config.node,
        )?;
        let info = SessionJoiner::new(directory, config.session.clone()).run().await?;
        println!("   {} on {} joined {}", id, transport.local_addr(), info.name);
        handles.push(handle);
    }
    for handle in &handles {
        settle(handle, |s| s.peers.len() == 2).await?;
    }

    println!("\n2. b1 asks a1 for a toggle over the wire...");
    handles[1].request_toggle().await?;
    for handle in &handles {
        settle(handle, |s| s.armed).await?;
    }
    print_status(&handles);

    for handle in &handles {
        handle.shutdown().await;
    }
    Ok(())
}

async fn settle(
    handle: &NodeHandle,
    pred: impl Fn(&NodeSnapshot) -> bool,
) -> ArmsyncResult<()> {
    tokio::time::timeout(SETTLE, handle.wait_for(pred))
        .await
        .map_err(|_| ArmsyncError::Timeout("peer to settle"))??;
    Ok(())
}

fn print_status(handles: &[NodeHandle]) {
    for handle in handles {
        let snap = handle.snapshot();
        info!(peer = %snap.local, armed = snap.armed, "status");
        println!(
            "   {} armed={} authority={} peers={}",
            snap.local,
            snap.armed,
            snap.authority.map(|a| a.to_string()).unwrap_or_else(|| "-".into()),
            snap.peers.len()
        );
    }
}
