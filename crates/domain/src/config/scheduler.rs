use serde::{Deserialize, Serialize};
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum sources processed in parallel within one run.
    #[serde(default = "d_worker_concurrency")]
    pub worker_concurrency: usize,
    /// End-to-end deadline per source in seconds, covering fetch,
    /// extraction, normalization, persistence and alert dispatch.
    #[serde(default = "d_source_deadline_s")]
    pub source_deadline_s: u64,
    /// Whole-run deadline in seconds. In-flight sources finish; no new
    /// ones are started past this point. 0 disables the cutoff.
    #[serde(default = "d_run_deadline_s")]
    pub run_deadline_s: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: d_worker_concurrency(),
            source_deadline_s: d_source_deadline_s(),
            run_deadline_s: d_run_deadline_s(),
        }
    }
}

impl SchedulerConfig {
    pub fn source_deadline(&self) -> Duration {
        Duration::from_secs(self.source_deadline_s)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        (self.run_deadline_s > 0).then(|| Duration::from_secs(self.run_deadline_s))
    }
}

fn d_worker_concurrency() -> usize {
    8
}

fn d_source_deadline_s() -> u64 {
    120
}

fn d_run_deadline_s() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_is_eight_workers() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.worker_concurrency, 8);
        assert_eq!(cfg.source_deadline_s, 120);
    }

    #[test]
    fn zero_run_deadline_disables_cutoff() {
        let cfg = SchedulerConfig {
            run_deadline_s: 0,
            ..Default::default()
        };
        assert!(cfg.run_deadline().is_none());
    }
}
