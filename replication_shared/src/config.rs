//! Configuration system.
//!
//! Loads engine configuration from JSON strings/files (file IO left to app).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{registry::PriorityTier, scene::SceneConfig};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Host listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Replication engine tuning.
    #[serde(default)]
    pub replication: ReplicationConfig,
    /// Demo scene both binaries build.
    #[serde(default)]
    pub scene: SceneConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 50,
            replication: ReplicationConfig::default(),
            scene: SceneConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Seconds per fixed step.
    pub fn tick_secs(&self) -> f64 {
        1.0 / f64::from(self.tick_hz.max(1))
    }
}

/// Which reconstruction the observer runs on each received snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Snap,
    #[default]
    FirstOrder,
    Phbe,
}

/// Replication engine tuning. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Actors closer than this to every point of interest are not synced.
    pub no_sync_radius: f32,
    /// Actors closer than this to any point of interest get the high tier.
    pub priority_radius: f32,
    pub prioritize_by_distance: bool,
    pub high_priority_tier: PriorityTier,
    pub default_tier: PriorityTier,
    pub time_between_sync_high_priority: f64,
    pub time_between_sync_low_priority: f64,
    /// Per-tier interval overrides in seconds.
    pub tier_intervals: BTreeMap<PriorityTier, f64>,
    pub time_maximum_unsynced: f64,
    pub history_depth: usize,
    pub strategy: StrategyKind,
    pub blend_alpha: f32,
    /// Max actors serialized per tick; `None` drains everything due.
    pub sync_budget: Option<usize>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            no_sync_radius: 0.0,
            priority_radius: 10.0,
            prioritize_by_distance: true,
            high_priority_tier: PriorityTier::MAX,
            default_tier: PriorityTier::MIN,
            time_between_sync_high_priority: 0.1,
            time_between_sync_low_priority: 1.0,
            tier_intervals: BTreeMap::new(),
            time_maximum_unsynced: 5.0,
            history_depth: 4,
            strategy: StrategyKind::FirstOrder,
            blend_alpha: 0.5,
            sync_budget: None,
        }
    }
}

impl ReplicationConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Seconds between syncs of `tier`.
    pub fn interval_for(&self, tier: PriorityTier) -> f64 {
        if let Some(secs) = self.tier_intervals.get(&tier) {
            return *secs;
        }
        if tier >= self.high_priority_tier {
            self.time_between_sync_high_priority
        } else {
            self.time_between_sync_low_priority
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for tier in [self.high_priority_tier, self.default_tier]
            .iter()
            .chain(self.tier_intervals.keys())
        {
            anyhow::ensure!(tier.is_valid(), "tier {} outside [1,10]", tier.get());
        }
        let intervals = [
            self.time_between_sync_high_priority,
            self.time_between_sync_low_priority,
            self.time_maximum_unsynced,
        ];
        for secs in intervals.iter().chain(self.tier_intervals.values()) {
            anyhow::ensure!(
                secs.is_finite() && *secs > 0.0,
                "intervals must be positive, got {secs}"
            );
        }
        anyhow::ensure!(self.history_depth > 0, "history_depth must be at least 1");
        anyhow::ensure!(
            self.no_sync_radius >= 0.0 && self.no_sync_radius <= self.priority_radius,
            "no_sync_radius {} must lie in [0, priority_radius {}]",
            self.no_sync_radius,
            self.priority_radius
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.blend_alpha),
            "blend_alpha {} outside [0,1]",
            self.blend_alpha
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg = ReplicationConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg.history_depth, 4);
        assert_eq!(cfg.strategy, StrategyKind::FirstOrder);
        assert_eq!(cfg.sync_budget, None);
        cfg.validate().unwrap();
    }

    #[test]
    fn engine_config_nests_replication() {
        let json = r#"{
            "server_addr": "0.0.0.0:25000",
            "tick_hz": 60,
            "replication": { "strategy": "phbe", "sync_budget": 8, "tier_intervals": { "5": 0.5 } }
        }"#;
        let cfg = EngineConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.tick_hz, 60);
        assert_eq!(cfg.replication.strategy, StrategyKind::Phbe);
        assert_eq!(cfg.replication.sync_budget, Some(8));
        assert_eq!(cfg.replication.interval_for(PriorityTier::new(5)), 0.5);
        assert_eq!(cfg.scene.cubes, SceneConfig::default().cubes);
    }

    #[test]
    fn interval_mapping_is_monotonic_by_default() {
        let cfg = ReplicationConfig::default();
        assert_eq!(cfg.interval_for(PriorityTier::MAX), 0.1);
        assert_eq!(cfg.interval_for(PriorityTier::new(3)), 1.0);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = ReplicationConfig {
            no_sync_radius: 20.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        cfg.no_sync_radius = 1.0;
        cfg.history_depth = 0;
        assert!(cfg.validate().is_err());

        cfg.history_depth = 4;
        cfg.tier_intervals.insert(PriorityTier::new(11), 1.0);
        assert!(cfg.validate().is_err());
    }
}
