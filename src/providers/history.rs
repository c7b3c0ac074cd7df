//! Reference commit-history providers.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::core::errors::Result;
use crate::core::snapshot::{CommitRecord, WorktreeStatus};

use super::CommitHistoryProvider;

/// Provider for repositories without interrogable history (plain directory
/// trees). Yields no commits and no worktree state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHistoryProvider;

impl CommitHistoryProvider for NullHistoryProvider {
    fn commits(
        &self,
        _root: &Path,
        _reference: &str,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CommitRecord>> {
        Ok(Vec::new())
    }
}

/// In-memory provider over pre-built commit records. Used by tests and by
/// hosts that interrogate git themselves and hand the records in.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistoryProvider {
    commits: Vec<CommitRecord>,
    worktree: Option<WorktreeStatus>,
}

impl InMemoryHistoryProvider {
    /// Create a provider over the given records (expected newest first).
    pub fn new(commits: Vec<CommitRecord>) -> Self {
        Self {
            commits,
            worktree: None,
        }
    }

    /// Attach worktree state.
    pub fn with_worktree(mut self, worktree: WorktreeStatus) -> Self {
        self.worktree = Some(worktree);
        self
    }
}

impl CommitHistoryProvider for InMemoryHistoryProvider {
    fn commits(
        &self,
        _root: &Path,
        _reference: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CommitRecord>> {
        let commits = match since {
            Some(cutoff) => self
                .commits
                .iter()
                .filter(|c| c.timestamp >= cutoff)
                .cloned()
                .collect(),
            None => self.commits.clone(),
        };
        Ok(commits)
    }

    fn worktree_status(&self, _root: &Path) -> Result<Option<WorktreeStatus>> {
        Ok(self.worktree.clone())
    }
}
