//! Per-cycle statistics and run results for external analysis.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::cases::{EvaluatedCases, MutationKind};

/// Counts of mutation operations drawn in one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationCounts {
    pub delete: usize,
    pub change: usize,
    pub insert: usize,
    pub swap: usize,
}

impl MutationCounts {
    /// Tally labels from a mutated batch. `None` labels are not counted.
    pub fn from_labels(labels: &[MutationKind]) -> Self {
        let mut counts = MutationCounts::default();
        for label in labels {
            match label {
                MutationKind::Delete => counts.delete += 1,
                MutationKind::Change => counts.change += 1,
                MutationKind::Insert => counts.insert += 1,
                MutationKind::Swap => counts.swap += 1,
                MutationKind::None => {}
            }
        }
        counts
    }

    /// Total mutations tallied.
    pub fn total(&self) -> usize {
        self.delete + self.change + self.insert + self.swap
    }
}

/// Snapshot of one evolutionary cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleStats {
    /// Cycle number, starting at 1.
    pub cycle: usize,
    /// Pool size at cycle start.
    pub n_population: usize,
    /// Candidates picked by the selector.
    pub n_selected: usize,
    /// Children produced by the crosser.
    pub n_offspring: usize,
    /// Candidates leaving the mutator.
    pub n_mutated: usize,
    /// Merged pool size before recombination.
    pub n_candidates: usize,
    /// Survivors kept by the recombiner.
    pub n_survivors: usize,
    /// Mutation operations drawn this cycle.
    pub mutations: MutationCounts,
    /// Mean survivor viability.
    pub avg_viability: f64,
    /// Median survivor viability.
    pub median_viability: f64,
    /// Best survivor viability.
    pub max_viability: f64,
    /// Average share of padding positions among survivors.
    pub avg_padding_share: f64,
}

/// Ordered per-cycle records of one search run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHistory {
    cycles: Vec<CycleStats>,
}

impl SearchHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one cycle record.
    pub fn push(&mut self, stats: CycleStats) {
        self.cycles.push(stats);
    }

    /// All records in cycle order.
    pub fn cycles(&self) -> &[CycleStats] {
        &self.cycles
    }

    /// Number of recorded cycles.
    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&CycleStats> {
        self.cycles.last()
    }

    /// Write the history as pretty JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }

    /// Read a history written by [`SearchHistory::save`].
    pub fn load(path: &Path) -> io::Result<SearchHistory> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(io::Error::other)
    }
}

/// Why a search run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StopReason {
    /// Cycle budget exhausted.
    MaxCycles,
    /// Best viability unchanged for the configured number of cycles.
    Stagnation { cycles: usize },
    /// Cancelled through the external handle.
    Cancelled,
}

/// Aggregate counters for one search run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchStats {
    /// Cycles actually run.
    pub cycles_run: usize,
    /// Candidates scored across the run.
    pub evaluations: usize,
    /// Best viability total observed.
    pub best_viability: f64,
    /// Wall-clock duration.
    pub elapsed_secs: f64,
}

/// Outcome of one search run over a single factual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Final survivors, ranked best first.
    pub survivors: EvaluatedCases,
    /// Why the run stopped.
    pub stop_reason: StopReason,
    /// Per-cycle records.
    pub history: SearchHistory,
    /// Aggregate counters.
    pub stats: SearchStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stats(cycle: usize) -> CycleStats {
        CycleStats {
            cycle,
            n_population: 8,
            n_selected: 8,
            n_offspring: 8,
            n_mutated: 8,
            n_candidates: 16,
            n_survivors: 4,
            mutations: MutationCounts {
                delete: 1,
                change: 3,
                insert: 2,
                swap: 2,
            },
            avg_viability: 1.5,
            median_viability: 1.4,
            max_viability: 2.1,
            avg_padding_share: 0.25,
        }
    }

    #[test]
    fn test_mutation_counts_skip_unmutated() {
        let labels = [
            MutationKind::Delete,
            MutationKind::None,
            MutationKind::Swap,
            MutationKind::Swap,
            MutationKind::Change,
        ];
        let counts = MutationCounts::from_labels(&labels);
        assert_eq!(counts.delete, 1);
        assert_eq!(counts.change, 1);
        assert_eq!(counts.insert, 0);
        assert_eq!(counts.swap, 2);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_history_push_and_last() {
        let mut history = SearchHistory::new();
        assert!(history.is_empty());
        history.push(test_stats(1));
        history.push(test_stats(2));
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().cycle, 2);
        assert_eq!(history.cycles()[0].cycle, 1);
    }

    #[test]
    fn test_history_save_load_roundtrip() {
        let mut history = SearchHistory::new();
        history.push(test_stats(1));
        history.push(test_stats(2));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        history.save(&path).unwrap();

        let loaded = SearchHistory::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.cycles()[1].mutations, history.cycles()[1].mutations);
        assert!((loaded.cycles()[0].max_viability - 2.1).abs() < 1e-12);
    }

    #[test]
    fn test_stop_reason_roundtrip() {
        let reason = StopReason::Stagnation { cycles: 5 };
        let json = serde_json::to_string(&reason).unwrap();
        let back: StopReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reason);
    }
}
