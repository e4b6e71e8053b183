//! Results collection and output for stress runs.
//!
//! Captures per trial:
//! - Whether every philosopher ate its quota, stalled or broke the protocol
//! - Decision rounds taken (the liveness measure)
//! - Protocol checks recorded from the trial's events

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Results from a single simulation under stress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    /// Ring size
    pub size: usize,
    /// Trial number within its ring size
    pub trial: usize,
    /// Base seed of the room
    pub seed: u64,
    /// Every philosopher ate its quota and left
    pub completed: bool,
    /// The trial ran into the harness timeout
    pub stalled: bool,
    /// Protocol error that ended the trial, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Meals in the record
    pub meals: usize,
    /// Decision rounds summed over all philosophers
    pub total_decisions: usize,
    /// Most decision rounds any one philosopher needed
    pub max_decisions: usize,
    /// Wall-clock duration of the trial
    pub elapsed_ms: u64,
    /// Negotiations that saw one peer preference and did not mirror it
    pub diversification_violations: usize,
    /// Overlapping stays on the separate chair
    pub separate_chair_overlaps: usize,
    /// Seated counter after the trial ended
    pub seated_at_end: usize,
}

/// Summary statistics for one ring size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeSummary {
    pub size: usize,
    pub trials: usize,
    pub completion_rate: f64,
    /// Standard error of completion rate: sqrt(p(1-p)/n)
    pub completion_rate_se: f64,
    /// 95% confidence interval for completion rate: (lower, upper)
    pub completion_rate_ci: (f64, f64),
    pub stalls: usize,
    pub failures: usize,
    /// Average of each trial's total decision rounds
    pub avg_decisions: f64,
    /// Standard error of avg_decisions
    pub avg_decisions_se: f64,
    pub max_decisions: usize,
    pub avg_elapsed_ms: f64,
    pub protocol_violations: usize,
}

/// Aggregate results from a stress run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressResults {
    pub started_at: DateTime<Utc>,
    /// All individual trials
    pub results: Vec<TrialResult>,
    /// Summary statistics by ring size
    pub summary: BTreeMap<usize, SizeSummary>,
}

impl TrialResult {
    /// Checks that must hold in every trial, finished or not.
    pub fn protocol_violations(&self) -> usize {
        self.diversification_violations
            + self.separate_chair_overlaps
            + usize::from(self.completed && self.seated_at_end != 0)
            + usize::from(self.completed && self.meals != self.size * self.size)
    }
}

impl StressResults {
    /// Create new empty stress results.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            results: Vec::new(),
            summary: BTreeMap::new(),
        }
    }

    /// Add a result.
    pub fn add(&mut self, result: TrialResult) {
        self.results.push(result);
    }

    pub fn total_violations(&self) -> usize {
        self.results.iter().map(TrialResult::protocol_violations).sum()
    }

    /// Compute summary statistics.
    pub fn compute_summary(&mut self) {
        let mut by_size: BTreeMap<usize, Vec<&TrialResult>> = BTreeMap::new();
        for result in &self.results {
            by_size.entry(result.size).or_default().push(result);
        }

        self.summary.clear();
        for (size, results) in by_size {
            let trials = results.len();
            let n = trials as f64;
            let completed = results.iter().filter(|r| r.completed).count();
            let completion_rate = completed as f64 / n;

            // Standard error for proportion: SE = sqrt(p(1-p)/n)
            let completion_rate_se = if trials > 1 {
                (completion_rate * (1.0 - completion_rate) / n).sqrt()
            } else {
                0.0
            };

            // 95% CI: p ± 1.96 * SE, clamped to [0, 1]
            let z = 1.96;
            let completion_rate_ci = (
                (completion_rate - z * completion_rate_se).max(0.0),
                (completion_rate + z * completion_rate_se).min(1.0),
            );

            let decisions: Vec<f64> = results.iter().map(|r| r.total_decisions as f64).collect();
            let avg_decisions = decisions.iter().sum::<f64>() / n;

            // Standard error for continuous: SE = std_dev / sqrt(n)
            let avg_decisions_se = if trials > 1 {
                let variance = decisions
                    .iter()
                    .map(|d| (d - avg_decisions).powi(2))
                    .sum::<f64>()
                    / (n - 1.0);
                variance.sqrt() / n.sqrt()
            } else {
                0.0
            };

            self.summary.insert(
                size,
                SizeSummary {
                    size,
                    trials,
                    completion_rate,
                    completion_rate_se,
                    completion_rate_ci,
                    stalls: results.iter().filter(|r| r.stalled).count(),
                    failures: results.iter().filter(|r| r.error.is_some()).count(),
                    avg_decisions,
                    avg_decisions_se,
                    max_decisions: results.iter().map(|r| r.max_decisions).max().unwrap_or(0),
                    avg_elapsed_ms: results.iter().map(|r| r.elapsed_ms as f64).sum::<f64>() / n,
                    protocol_violations: results.iter().map(|r| r.protocol_violations()).sum(),
                },
            );
        }
    }

    /// Save results to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load results from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let results = serde_json::from_str(&json)?;
        Ok(results)
    }
}

impl Default for StressResults {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a timestamped output path from the given path.
/// e.g., "results.json" -> "results-20260108-010530.json"
pub fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("results");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

/// Format a duration in milliseconds for display.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{:.1}m", ms as f64 / 60_000.0)
    }
}
