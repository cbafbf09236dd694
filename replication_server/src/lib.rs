//! `replication_server`
//!
//! Authoritative host:
//! - Fixed timestep simulation loop
//! - Owns the demo world and its physics
//! - Classifies, schedules and sends actor snapshots
//! - Answers observer resync requests
//!
//! Networking model:
//! - UDP only: observers announce themselves with `Hello`, the host fans
//!   every datagram out to all of them.

pub mod host;
pub mod transport;

pub use host::HostNode;
pub use transport::UdpHostChannel;
