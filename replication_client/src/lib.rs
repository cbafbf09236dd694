//! `replication_client`
//!
//! Observer side:
//! - Connects to a host over UDP and announces itself
//! - Applies received snapshots through the configured reconstruction
//! - Asks the host to resync actors that went quiet

pub mod observer;
pub mod transport;

pub use observer::ObserverNode;
pub use transport::UdpObserverChannel;
