//! UDP transport for an observer: one socket connected to the host.

use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};

use anyhow::Context;
use bytes::Bytes;
use replication_shared::{error::ReplicationError, net::Channel};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Consecutive receive errors tolerated in one poll.
const MAX_RECV_ERRORS: usize = 16;

pub struct UdpObserverChannel {
    socket: UdpSocket,
    buf: Vec<u8>,
    received: u64,
}

impl UdpObserverChannel {
    /// Binds an ephemeral local port and connects it to `server`.
    pub async fn connect(server: SocketAddr) -> anyhow::Result<Self> {
        let ip = match server.ip() {
            ip if ip.is_loopback() => ip,
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = UdpSocket::bind(SocketAddr::new(ip, 0))
            .await
            .context("udp bind")?;
        socket.connect(server).await.context("udp connect")?;
        Ok(Self {
            socket,
            buf: vec![0u8; 64 * 1024],
            received: 0,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.socket.local_addr().context("udp local_addr")
    }

    /// Datagrams received so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}

impl Channel for UdpObserverChannel {
    fn send(&mut self, bytes: Bytes) -> Result<(), ReplicationError> {
        match self.socket.try_send(&bytes) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("Socket buffer full, datagram dropped");
            }
            // Host not up yet; the next hello retries.
            Err(e) => debug!(error = %e, "udp send failed"),
        }
        Ok(())
    }

    fn try_receive(&mut self) -> Result<Option<Bytes>, ReplicationError> {
        let mut errors = 0;
        loop {
            match self.socket.try_recv(&mut self.buf) {
                Ok(n) => {
                    self.received += 1;
                    return Ok(Some(Bytes::copy_from_slice(&self.buf[..n])));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                // Refused while the host is down; give up on this poll after a few.
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
