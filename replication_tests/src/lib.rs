//! Helpers shared by the integration tests.

use replication_client::ObserverNode;
use replication_server::HostNode;
use replication_shared::{
    net::Channel,
    world::{ActorAccessor, ActorTags, World},
};

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Steps host then observer, `ticks` times, with no wall-clock pacing.
pub fn lockstep<H: Channel, O: Channel>(
    host: &mut HostNode<H>,
    observer: &mut ObserverNode<O>,
    ticks: u32,
    dt: f64,
) -> anyhow::Result<()> {
    for _ in 0..ticks {
        host.step(dt)?;
        observer.step(dt)?;
    }
    Ok(())
}

/// Largest position gap between the two worlds over tracked actors.
pub fn max_position_error(truth: &World, replica: &World) -> f32 {
    truth
        .with_tags(ActorTags::TRACKED)
        .into_iter()
        .map(|id| match (truth.get_state(id), replica.get_state(id)) {
            (Some(a), Some(b)) => a.position.distance(b.position),
            _ => f32::INFINITY,
        })
        .fold(0.0, f32::max)
}
