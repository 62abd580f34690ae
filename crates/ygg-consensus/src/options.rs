use std::time::Duration;

use openraft::SnapshotPolicy;
use ygg_types::{RegionId, YggError};

/// Consensus tuning shared by every region on a node.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RaftOptions {
    pub heartbeat_interval_ms: u64,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    /// Build a snapshot once this many entries were applied since the last one.
    pub snapshot_logs_since_last: u64,
    /// Entries kept in the log behind the latest snapshot.
    pub max_in_snapshot_log_to_keep: u64,
    /// Commit timeout for writes whose context carries none.
    pub write_timeout_ms: u64,
}

impl Default for RaftOptions {
    fn default() -> Self {
        RaftOptions {
            heartbeat_interval_ms: 250,
            election_timeout_min_ms: 1000,
            election_timeout_max_ms: 2000,
            snapshot_logs_since_last: 10_000,
            max_in_snapshot_log_to_keep: 1000,
            write_timeout_ms: 5000,
        }
    }
}

impl RaftOptions {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn to_config(&self, region_id: RegionId) -> Result<openraft::Config, YggError> {
        openraft::Config {
            cluster_name: format!("region-{region_id}"),
            heartbeat_interval: self.heartbeat_interval_ms,
            election_timeout_min: self.election_timeout_min_ms,
            election_timeout_max: self.election_timeout_max_ms,
            snapshot_policy: SnapshotPolicy::LogsSinceLast(self.snapshot_logs_since_last),
            max_in_snapshot_log_to_keep: self.max_in_snapshot_log_to_keep,
            ..Default::default()
        }
        .validate()
        .map_err(|e| YggError::RaftInitFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        let cfg = RaftOptions::default().to_config(9).unwrap();
        assert_eq!(cfg.cluster_name, "region-9");
        assert_eq!(cfg.heartbeat_interval, 250);
    }

    #[test]
    fn inverted_election_bounds_rejected() {
        let opts = RaftOptions {
            election_timeout_min_ms: 500,
            election_timeout_max_ms: 100,
            ..RaftOptions::default()
        };
        assert!(matches!(opts.to_config(1), Err(YggError::RaftInitFailed(_))));
    }
}
