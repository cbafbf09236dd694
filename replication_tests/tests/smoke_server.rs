use replication_server::host::bind_ephemeral;
use replication_shared::config::EngineConfig;

/// Smoke test: host can run a few ticks with nobody listening.
#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    replication_tests::init_tracing();
    let (mut host, cfg) = bind_ephemeral(EngineConfig::default()).await?;
    assert_ne!(cfg.server_addr, "127.0.0.1:0");
    host.run_for_ticks(3).await?;
    assert_eq!(host.tick(), 3);
    assert!(host.peers().is_empty());
    Ok(())
}
