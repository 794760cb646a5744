//! Transfer-rate estimation and swarm-level accounting.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::constants::RATE_WINDOW;

/// Sliding-window byte-rate estimator.
///
/// Samples older than the window are discarded on every access, so an
/// idle peer's rate decays to zero without a background task.
#[derive(Debug)]
pub struct RateEstimator {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
    total: u64,
}

impl RateEstimator {
    pub fn new() -> Self {
        Self::with_window(RATE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            total: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.total += bytes;
        self.samples.push_back((Instant::now(), bytes));
        self.evict(Instant::now());
    }

    /// Instantaneous rate in bytes per second.
    pub fn rate(&mut self) -> f64 {
        let now = Instant::now();
        self.evict(now);
        let bytes: u64 = self.samples.iter().map(|(_, b)| b).sum();
        bytes as f64 / self.window.as_secs_f64()
    }

    /// Total bytes ever recorded.
    pub fn total(&self) -> u64 {
        self.total
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.samples.front() {
            if now.duration_since(at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of swarm throughput and progress.
#[derive(Debug, Clone, Default)]
pub struct SwarmStats {
    /// Sum of per-peer download rates, bytes/sec.
    pub download_rate: f64,
    /// Sum of per-peer upload rates, bytes/sec.
    pub upload_rate: f64,
    /// Monotonic total of bytes served to remote peers.
    pub uploaded: u64,
    /// Peers currently in the active (connected) set.
    pub active_peers: usize,
    /// Pieces still missing locally.
    pub pending_pieces: usize,
}
