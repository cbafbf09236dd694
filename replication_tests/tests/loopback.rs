//! Host and observer wired through in-process channels, stepped in lockstep.

use replication_client::ObserverNode;
use replication_server::HostNode;
use replication_shared::{
    config::{EngineConfig, StrategyKind},
    net::{LoopbackChannel, LossyChannel},
    scene::SceneConfig,
};
use replication_tests::{init_tracing, lockstep, max_position_error};

const DT: f64 = 0.02;

fn cfg(strategy: StrategyKind) -> EngineConfig {
    let mut cfg = EngineConfig {
        scene: SceneConfig {
            cubes: 32,
            ..Default::default()
        },
        ..Default::default()
    };
    cfg.replication.strategy = strategy;
    cfg
}

#[test]
fn snap_observer_matches_host_once_scene_settles() -> anyhow::Result<()> {
    init_tracing();
    let (host_end, obs_end) = LoopbackChannel::pair();
    let mut host = HostNode::new(cfg(StrategyKind::Snap), host_end)?;
    let mut observer = ObserverNode::new(cfg(StrategyKind::Snap), obs_end)?;

    lockstep(&mut host, &mut observer, 1000, DT)?;

    assert!(observer.stats().applied > 0);
    assert_eq!(
        observer.session().registry().actor_ids(),
        host.session().registry().actor_ids()
    );
    let err = max_position_error(host.world(), observer.world());
    assert!(err < 1e-4, "max error {err}");
    Ok(())
}

#[test]
fn observers_tolerate_loss_and_duplication() -> anyhow::Result<()> {
    init_tracing();
    for strategy in [StrategyKind::FirstOrder, StrategyKind::Phbe] {
        let (host_end, obs_end) = LoopbackChannel::pair();
        let lossy = LossyChannel::new(host_end, 0.3, 0.1, 42);
        let mut host = HostNode::new(cfg(strategy), lossy)?;
        let mut observer = ObserverNode::new(cfg(strategy), obs_end)?;

        lockstep(&mut host, &mut observer, 1500, DT)?;

        let err = max_position_error(host.world(), observer.world());
        assert!(err < 0.05, "{strategy:?}: max error {err}");
        assert!(observer.stats().skipped > 0, "{strategy:?}: duplicates reached history");
    }
    Ok(())
}

#[test]
fn sync_budget_only_delays() -> anyhow::Result<()> {
    init_tracing();
    let mut cfg = cfg(StrategyKind::Snap);
    cfg.replication.sync_budget = Some(2);
    let (host_end, obs_end) = LoopbackChannel::pair();
    let mut host = HostNode::new(cfg.clone(), host_end)?;
    let mut observer = ObserverNode::new(cfg, obs_end)?;

    let report = host.step(DT)?;
    assert_eq!(report.sent, 2);
    observer.step(DT)?;

    lockstep(&mut host, &mut observer, 1000, DT)?;
    let err = max_position_error(host.world(), observer.world());
    assert!(err < 1e-4, "max error {err}");
    Ok(())
}
