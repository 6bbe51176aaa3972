//! Multicast discovery: per-peer HELLO/GOODBYE heartbeats over a fixed
//! UDP group.
//!
//! An active agent runs two loops. The sender announces
//! `HELLO:<ip>:<port>` every heartbeat interval; the listener folds
//! incoming heartbeats into the owner's peer state. `close()` announces
//! departure with a single GOODBYE before stopping either loop, so
//! other peers observe the departure while this one is still alive.

use log::{debug, info, warn};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep, timeout};

use crate::core::peer_state::PeerState;
use crate::core::protocol::{Heartbeat, PeerAddress};
use crate::utils::{Result, net};

const RECV_BUF_SIZE: usize = 1024;
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A running discovery agent. Dropping it without `close()` stops the
/// loops eventually but skips the GOODBYE; orderly shutdown goes
/// through `close()`.
pub struct MulticastDiscovery {
    local: PeerAddress,
    group: SocketAddrV4,
    send_socket: Arc<UdpSocket>,
    shutdown_tx: watch::Sender<bool>,
    listener: JoinHandle<()>,
    sender: JoinHandle<()>,
}

impl MulticastDiscovery {
    /// Join the group and start the listener and sender loops. The
    /// local address is registered into the owner's known/available
    /// sets immediately.
    pub async fn start(
        group: Ipv4Addr,
        port: u16,
        ttl: u32,
        interval: Duration,
        local: PeerAddress,
        state: Arc<PeerState>,
    ) -> Result<Self> {
        let listen_socket = net::multicast_listener_socket(group, port)?;
        let send_socket = Arc::new(net::multicast_sender_socket(ttl)?);
        let group = SocketAddrV4::new(group, port);

        state.mark_seen(&local);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listener = tokio::spawn(listener_loop(
            listen_socket,
            local.clone(),
            state,
            shutdown_rx.clone(),
        ));
        let sender = tokio::spawn(sender_loop(
            send_socket.clone(),
            local.clone(),
            group,
            interval,
            shutdown_rx,
        ));

        info!("Multicast discovery active on {} as {}", group, local);
        Ok(Self {
            local,
            group,
            send_socket,
            shutdown_tx,
            listener,
            sender,
        })
    }

    /// Announce departure, then stop both loops. The GOODBYE send
    /// happens strictly before the stop signal is raised.
    pub async fn close(self) -> Result<()> {
        let goodbye = Heartbeat::Goodbye(self.local.clone()).to_string();
        if let Err(e) = self.send_socket.send_to(goodbye.as_bytes(), self.group).await {
            warn!("Failed to send GOODBYE: {}", e);
        }

        let _ = self.shutdown_tx.send(true);

        for (name, handle) in [("listener", self.listener), ("sender", self.sender)] {
            let mut handle = handle;
            if timeout(JOIN_TIMEOUT, &mut handle).await.is_err() {
                warn!("Multicast {} did not stop in time, aborting it", name);
                handle.abort();
            }
        }

        info!("Multicast discovery stopped for {}", self.local);
        Ok(())
    }
}

async fn sender_loop(
    socket: Arc<UdpSocket>,
    local: PeerAddress,
    group: SocketAddrV4,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let hello = Heartbeat::Hello(local).to_string();
    loop {
        if let Err(e) = socket.send_to(hello.as_bytes(), group).await {
            warn!("Heartbeat send failed: {}", e);
        }
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Multicast sender stopping");
                return;
            }
            _ = sleep(interval) => {}
        }
    }
}

async fn listener_loop(
    socket: UdpSocket,
    local: PeerAddress,
    state: Arc<PeerState>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Addresses currently believed alive from this agent's point of
    // view; a GOODBYE forgets the address so a later HELLO counts as
    // newly seen again.
    let mut seen: HashSet<PeerAddress> = HashSet::new();
    let mut buf = [0u8; RECV_BUF_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Multicast listener stopping");
                return;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, src)) => {
                    if let Ok(text) = std::str::from_utf8(&buf[..len]) {
                        debug!("Multicast datagram from {}: {:?}", src, text.trim());
                        process_datagram(text.trim(), &local, &mut seen, &state);
                    }
                }
                Err(e) => {
                    warn!("Multicast receive error: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// Fold one datagram into the seen set and the owner's peer state.
/// Unknown prefixes and malformed payloads are dropped silently; our
/// own announcements are ignored.
fn process_datagram(
    text: &str,
    local: &PeerAddress,
    seen: &mut HashSet<PeerAddress>,
    state: &PeerState,
) {
    let Some(heartbeat) = Heartbeat::parse(text) else {
        return;
    };
    if heartbeat.addr() == local {
        return;
    }

    match heartbeat {
        Heartbeat::Hello(addr) => {
            if seen.insert(addr.clone()) {
                info!("Peer appeared via multicast: {}", addr);
                state.mark_seen(&addr);
            }
        }
        Heartbeat::Goodbye(addr) => {
            if seen.remove(&addr) {
                info!("Peer left via multicast: {}", addr);
                state.mark_left(&addr);
            }
        }
    }
}
