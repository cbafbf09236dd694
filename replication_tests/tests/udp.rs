//! Full socket-based integration test for host ↔ observer replication.

use std::time::Duration;

use replication_client::ObserverNode;
use replication_server::host::bind_ephemeral;
use replication_shared::{config::EngineConfig, scene::SceneConfig};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn observer_receives_snapshots_over_udp() -> anyhow::Result<()> {
    replication_tests::init_tracing();

    let (mut host, cfg) = bind_ephemeral(EngineConfig {
        scene: SceneConfig {
            cubes: 16,
            ..Default::default()
        },
        ..Default::default()
    })
    .await?;
    let mut observer = ObserverNode::connect(cfg.clone()).await?;
    let dt = cfg.tick_secs();

    for _ in 0..150 {
        host.step(dt)?;
        tokio::time::sleep(Duration::from_millis(2)).await;
        observer.step(dt)?;
    }

    assert_eq!(host.peers(), vec![observer.local_addr()?]);
    assert!(observer.stats().applied > 0, "expected at least one snapshot");
    assert_eq!(observer.session().registry().len(), 16);
    Ok(())
}
