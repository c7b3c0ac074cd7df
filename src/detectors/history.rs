//! History analyzer: commit counts, per-file churn, contributors, recency,
//! and the co-change graph.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::Result;
use crate::core::model::CoChangeGraph;
use crate::core::pipeline::context::StageView;
use crate::core::registry::{AnalyzerInfo, AnalyzerKind};

use super::{Analyzer, AnalyzerOutput, AnalyzerRun};

/// Output of the history analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFacts {
    /// Number of commits in the analyzed window
    pub commit_count: usize,
    /// Commits touching each tracked file
    pub churn: BTreeMap<PathBuf, usize>,
    /// Distinct author keys
    pub contributors: BTreeSet<String>,
    /// Timestamp of the most recent commit
    pub last_commit: Option<DateTime<Utc>>,
    /// Commit co-occurrence graph over tracked files
    pub co_change: CoChangeGraph,
}

/// Commit-history aggregation. Depends on nothing; reads only the snapshot's
/// pre-extracted commit records.
pub struct HistoryAnalyzer {
    info: AnalyzerInfo,
}

impl HistoryAnalyzer {
    /// Create the analyzer.
    pub fn new() -> Self {
        Self {
            info: AnalyzerInfo::new(AnalyzerKind::History, &[], 0),
        }
    }
}

impl Default for HistoryAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for HistoryAnalyzer {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    async fn run(&self, view: StageView) -> Result<AnalyzerRun> {
        let tracked: BTreeSet<&std::path::Path> = view
            .snapshot
            .files
            .iter()
            .map(|entry| entry.path.as_path())
            .collect();

        let mut facts = HistoryFacts {
            commit_count: view.snapshot.commits.len(),
            ..HistoryFacts::default()
        };

        for commit in &view.snapshot.commits {
            facts.contributors.insert(commit.author_key.clone());
            facts.last_commit = match facts.last_commit {
                Some(latest) if latest >= commit.timestamp => Some(latest),
                _ => Some(commit.timestamp),
            };

            // Churn and co-change are restricted to files still tracked by
            // the snapshot; deleted files carry no facts.
            let touched_tracked: Vec<&PathBuf> = commit
                .touched
                .iter()
                .map(|t| &t.path)
                .filter(|path| tracked.contains(path.as_path()))
                .collect();

            for path in &touched_tracked {
                *facts.churn.entry((*path).clone()).or_insert(0) += 1;
            }
            for (ix, a) in touched_tracked.iter().enumerate() {
                for b in &touched_tracked[ix + 1..] {
                    facts.co_change.record(a, b);
                }
            }
        }

        debug!(
            commits = facts.commit_count,
            contributors = facts.contributors.len(),
            "history analysis complete"
        );

        Ok(AnalyzerRun::output_only(AnalyzerOutput::History(facts)))
    }
}
