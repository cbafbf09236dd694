//! UDP fan-out transport for the authoritative host.
//!
//! One socket, many observers. A peer becomes a recipient once it sends a
//! `Hello` and stays one while it keeps talking; observers repeat the hello
//! as a keepalive, and a peer silent for [`PEER_TIMEOUT`] is dropped. Nothing
//! here blocks: a full socket buffer drops the datagram, which the
//! replication layer already tolerates.

use std::{
    io,
    net::SocketAddr,
    time::{Duration, Instant},
};

use anyhow::Context;
use bytes::Bytes;
use replication_shared::{
    error::ReplicationError,
    net::{Channel, Packet},
};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Silence after which a peer stops receiving snapshots.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(10);
/// Consecutive receive errors tolerated in one poll.
const MAX_RECV_ERRORS: usize = 16;

struct Peer {
    addr: SocketAddr,
    last_heard: Instant,
}

pub struct UdpHostChannel {
    socket: UdpSocket,
    peers: Vec<Peer>,
    buf: Vec<u8>,
}

impl UdpHostChannel {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr).await.context("udp bind")?;
        Ok(Self {
            socket,
            peers: Vec::new(),
            buf: vec![0u8; 64 * 1024],
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.socket.local_addr().context("udp local_addr")
    }

    /// Live observers, in arrival order.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers.iter().map(|p| p.addr).collect()
    }

    /// Drops peers not heard from since `now - PEER_TIMEOUT`. Returns how many.
    pub fn expire_idle(&mut self, now: Instant) -> usize {
        let before = self.peers.len();
        self.peers.retain(|p| {
            let alive = now.saturating_duration_since(p.last_heard) < PEER_TIMEOUT;
            if !alive {
                info!(peer = %p.addr, "Observer timed out");
            }
            alive
        });
        before - self.peers.len()
    }

    fn heard_from(&mut self, addr: SocketAddr, hello: bool, now: Instant) {
        if let Some(peer) = self.peers.iter_mut().find(|p| p.addr == addr) {
            peer.last_heard = now;
        } else if hello {
            self.peers.push(Peer {
                addr,
                last_heard: now,
            });
            info!(peer = %addr, peers = self.peers.len(), "Observer joined");
        }
    }
}

impl Channel for UdpHostChannel {
    fn send(&mut self, bytes: Bytes) -> Result<(), ReplicationError> {
        for peer in &self.peers {
            match self.socket.try_send_to(&bytes, peer.addr) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    debug!(peer = %peer.addr, "Socket buffer full, datagram dropped");
                }
                Err(e) => debug!(peer = %peer.addr, error = %e, "udp send failed"),
            }
        }
        Ok(())
    }

    fn try_receive(&mut self) -> Result<Option<Bytes>, ReplicationError> {
        let mut errors = 0;
        loop {
            match self.socket.try_recv_from(&mut self.buf) {
                Ok((n, from)) => {
                    let bytes = Bytes::copy_from_slice(&self.buf[..n]);
                    let hello = matches!(Packet::decode(&bytes), Ok(Packet::Hello));
                    self.heard_from(from, hello, Instant::now());
                    return Ok(Some(bytes));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.expire_idle(Instant::now());
                    return Ok(None);
                }
                // ICMP errors from departed peers surface here; skip a few.
                Err(e) => {
                    errors += 1;
                    if errors >= MAX_RECV_ERRORS {
                        warn!(error = %e, errors, "udp recv keeps failing, ending poll");
                        return Ok(None);
                    }
                    debug!(error = %e, "udp recv failed");
                }
            }
        }
    }
}
