//! Agent statistics tracking and persistence.
//!
//! Counters are atomics so the progress reporter can read them while the
//! learner updates them. Snapshots are written to a JSON file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Aggregated agent statistics, designed for lock-free updates.
#[derive(Debug)]
pub struct AgentStats {
    episodes_completed: AtomicU32,
    successful_episodes: AtomicU32,
    total_steps: AtomicU64,
    /// Sum of episode cumulative rewards, stored as `f64` bits
    reward_sum_bits: AtomicU64,
    /// Requests answered with a protocol error
    protocol_errors: AtomicU32,
    /// Times the agent had to re-fetch its state
    resyncs: AtomicU32,
    start_time: Instant,
    stats_path: PathBuf,
    agent_id: String,
}

/// Serializable stats for JSON output.
#[derive(Debug, Serialize, Deserialize)]
pub struct AgentStatsSnapshot {
    pub agent_id: String,
    pub episodes_completed: u32,
    pub successful_episodes: u32,
    pub success_rate: f64,
    pub total_steps: u64,
    pub avg_episode_length: f64,
    pub avg_cumulative_reward: f64,
    pub protocol_errors: u32,
    pub resyncs: u32,
    pub epsilon: f64,
    pub episodes_per_second: f64,
    pub runtime_seconds: f64,
    pub timestamp: u64,
}

impl AgentStats {
    /// Create a tracker that writes to `stats_path`.
    pub fn new(stats_path: impl Into<PathBuf>, agent_id: &str) -> Self {
        let stats_path = stats_path.into();
        if let Some(dir) = stats_path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!("Failed to create stats directory: {}", e);
            }
        }

        Self {
            episodes_completed: AtomicU32::new(0),
            successful_episodes: AtomicU32::new(0),
            total_steps: AtomicU64::new(0),
            reward_sum_bits: AtomicU64::new(0.0f64.to_bits()),
            protocol_errors: AtomicU32::new(0),
            resyncs: AtomicU32::new(0),
            start_time: Instant::now(),
            stats_path,
            agent_id: agent_id.to_string(),
        }
    }

    /// Record a concluded episode.
    pub fn record_episode(&self, steps: u32, cumulative_reward: f64, success: bool) {
        self.episodes_completed.fetch_add(1, Ordering::Relaxed);
        self.total_steps.fetch_add(steps as u64, Ordering::Relaxed);
        if success {
            self.successful_episodes.fetch_add(1, Ordering::Relaxed);
        }
        // The closure always returns Some, so this cannot fail.
        let _ = self
            .reward_sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + cumulative_reward).to_bits())
            });
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn episodes_completed(&self) -> u32 {
        self.episodes_completed.load(Ordering::Relaxed)
    }

    /// Get a snapshot of current stats.
    pub fn snapshot(&self, epsilon: f64) -> AgentStatsSnapshot {
        let episodes = self.episodes_completed.load(Ordering::Relaxed);
        let successes = self.successful_episodes.load(Ordering::Relaxed);
        let steps = self.total_steps.load(Ordering::Relaxed);
        let reward_sum = f64::from_bits(self.reward_sum_bits.load(Ordering::Relaxed));
        let runtime = self.start_time.elapsed().as_secs_f64();

        let per_episode = |total: f64| {
            if episodes > 0 {
                total / episodes as f64
            } else {
                0.0
            }
        };

        let episodes_per_second = if runtime > 0.0 {
            episodes as f64 / runtime
        } else {
            0.0
        };

        AgentStatsSnapshot {
            agent_id: self.agent_id.clone(),
            episodes_completed: episodes,
            successful_episodes: successes,
            success_rate: per_episode(successes as f64),
            total_steps: steps,
            avg_episode_length: per_episode(steps as f64),
            avg_cumulative_reward: per_episode(reward_sum),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            epsilon,
            episodes_per_second,
            runtime_seconds: runtime,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Write stats to JSON file (atomic write-then-rename).
    pub fn write_stats(&self, epsilon: f64) {
        let snapshot = self.snapshot(epsilon);

        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize agent stats: {}", e);
                return;
            }
        };

        let temp_path = self.stats_path.with_extension("json.tmp");
        match fs::File::create(&temp_path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(json.as_bytes()) {
                    warn!("Failed to write agent stats: {}", e);
                    return;
                }
            }
            Err(e) => {
                warn!("Failed to create temp stats file: {}", e);
                return;
            }
        }

        if let Err(e) = fs::rename(&temp_path, &self.stats_path) {
            warn!("Failed to rename stats file: {}", e);
            let _ = fs::remove_file(&temp_path);
            return;
        }

        debug!("Wrote agent stats to {}", self.stats_path.display());
    }

    pub fn stats_path(&self) -> &Path {
        &self.stats_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stats_in(dir: &Path) -> AgentStats {
        AgentStats::new(dir.join("stats").join("alice_stats.json"), "alice")
    }

    #[test]
    fn test_record_episode() {
        let dir = tempdir().unwrap();
        let stats = stats_in(dir.path());

        stats.record_episode(8, 9.93, true);
        stats.record_episode(50, -1.5, false);

        let snapshot = stats.snapshot(0.5);
        assert_eq!(snapshot.episodes_completed, 2);
        assert_eq!(snapshot.successful_episodes, 1);
        assert_eq!(snapshot.total_steps, 58);
        assert!((snapshot.success_rate - 0.5).abs() < 1e-9);
        assert!((snapshot.avg_episode_length - 29.0).abs() < 1e-9);
        assert!((snapshot.avg_cumulative_reward - (9.93 - 1.5) / 2.0).abs() < 1e-9);
        assert_eq!(snapshot.epsilon, 0.5);
    }

    #[test]
    fn test_averages_with_zero_episodes() {
        let dir = tempdir().unwrap();
        let snapshot = stats_in(dir.path()).snapshot(1.0);

        assert_eq!(snapshot.episodes_completed, 0);
        assert_eq!(snapshot.avg_episode_length, 0.0);
        assert!(!snapshot.avg_cumulative_reward.is_nan());
        assert!(!snapshot.success_rate.is_nan());
    }

    #[test]
    fn test_error_and_resync_counters() {
        let dir = tempdir().unwrap();
        let stats = stats_in(dir.path());
        stats.record_protocol_error();
        stats.record_protocol_error();
        stats.record_resync();

        let snapshot = stats.snapshot(1.0);
        assert_eq!(snapshot.protocol_errors, 2);
        assert_eq!(snapshot.resyncs, 1);
    }

    #[test]
    fn test_write_stats_creates_directory_and_replaces_file() {
        let dir = tempdir().unwrap();
        let stats = stats_in(dir.path());

        stats.record_episode(5, 1.0, true);
        stats.write_stats(0.9);
        let content = fs::read_to_string(stats.stats_path()).unwrap();
        let parsed: AgentStatsSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.episodes_completed, 1);
        assert_eq!(parsed.agent_id, "alice");

        stats.record_episode(7, -1.0, false);
        stats.write_stats(0.8);
        let content = fs::read_to_string(stats.stats_path()).unwrap();
        let parsed: AgentStatsSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.episodes_completed, 2);
        assert!(!stats.stats_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let dir = tempdir().unwrap();
        let stats = Arc::new(stats_in(dir.path()));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_episode(5, 1.0, true);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot(0.0);
        assert_eq!(snapshot.episodes_completed, 1000);
        assert!((snapshot.avg_cumulative_reward - 1.0).abs() < 1e-9);
    }
}
