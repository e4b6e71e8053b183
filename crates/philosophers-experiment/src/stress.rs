//! Stress runner: many seeded rooms across ring sizes.
//!
//! Orchestrates each trial:
//! 1. Build a room from the trial's seed
//! 2. Run it under an outer timeout (the room itself has no abort path)
//! 3. Check the recorded events for protocol violations
//! 4. Collect the trial result

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::Rng;
use tracing::{info, warn};

use philosophers_kernel::{DelayConfig, EventSink, MemorySink, Room, RoomConfig, TracingSink};

use crate::results::{StressResults, TrialResult};

/// Configuration for the stress runner.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Trials per ring size
    pub trials: usize,
    /// Ring sizes to test
    pub sizes: Vec<usize>,
    /// Pauses inside each room (short, so trials finish quickly)
    pub think: DelayConfig,
    /// A trial still running after this long counts as stalled
    pub timeout: Duration,
    /// Seed of the first trial; later trials count up from it (None for random)
    pub base_seed: Option<u64>,
    /// Also forward every philosopher event to the log
    pub trace_events: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            trials: 20,
            sizes: vec![1, 2, 3, 5, 8],
            think: DelayConfig { min_ms: 0, max_ms: 5 },
            timeout: Duration::from_secs(30),
            base_seed: None,
            trace_events: false,
        }
    }
}

/// The stress runner.
pub struct StressRunner {
    config: StressConfig,
}

impl StressRunner {
    /// Create a new stress runner.
    pub fn new(config: StressConfig) -> Self {
        Self { config }
    }

    /// Run every trial for every ring size.
    pub async fn run(&self) -> Result<StressResults> {
        let base_seed = self.config.base_seed.unwrap_or_else(|| rand::rng().random());
        let total = self.config.sizes.len() * self.config.trials;
        let mut results = StressResults::new();
        let mut completed = 0;

        info!(
            trials = self.config.trials,
            sizes = ?self.config.sizes,
            base_seed = base_seed,
            "Starting stress run"
        );

        for &size in &self.config.sizes {
            for trial in 0..self.config.trials {
                let seed = base_seed.wrapping_add(trial as u64);
                let result = self.run_trial(size, trial, seed).await?;

                if !result.completed {
                    warn!(size = size, trial = trial, seed = seed, stalled = result.stalled, "Trial did not finish");
                }
                results.add(result);
                completed += 1;

                info!(
                    progress = format!("{}/{}", completed, total),
                    size = size,
                    trial = trial,
                    "Completed trial"
                );
            }
        }

        results.compute_summary();
        Ok(results)
    }

    /// Run one seeded room to completion, stall or protocol failure.
    pub async fn run_trial(&self, size: usize, trial: usize, seed: u64) -> Result<TrialResult> {
        let room = Arc::new(Room::new(RoomConfig {
            size,
            think: self.config.think,
            seed: Some(seed),
        })?);
        let memory = Arc::new(MemorySink::new());
        let sink: Arc<dyn EventSink> = if self.config.trace_events {
            Arc::new((TracingSink, memory.clone()))
        } else {
            memory.clone()
        };

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout, room.clone().run(sink)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let (completed, stalled, error, report) = match outcome {
            Ok(Ok(report)) => (true, false, None, Some(report)),
            Ok(Err(err)) => (false, false, Some(format!("{:#}", err)), None),
            Err(_) => (false, true, None, None),
        };

        let decisions: Vec<usize> = room.philosophers().iter().map(|p| p.decisions()).collect();

        Ok(TrialResult {
            size,
            trial,
            seed,
            completed,
            stalled,
            error,
            meals: report.map_or(0, |r| r.meals.len()),
            total_decisions: decisions.iter().sum(),
            max_decisions: decisions.iter().copied().max().unwrap_or(0),
            elapsed_ms,
            diversification_violations: memory.diversification_violations(),
            separate_chair_overlaps: memory.separate_chair_overlaps(),
            seated_at_end: room.seated(),
        })
    }
}
