//! External collaborator interfaces.
//!
//! The core treats metric extraction and commit-history interrogation as
//! pluggable services: hosts hand in implementations of these traits, and
//! the pipeline never talks to git or a parser directly. Reference
//! implementations live here so the engine is usable out of the box and so
//! tests have deterministic providers.

pub mod history;
pub mod measure;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::core::model::Language;
use crate::core::snapshot::{CommitRecord, WorktreeStatus};

pub use history::{InMemoryHistoryProvider, NullHistoryProvider};
pub use measure::LexicalMeasurementProvider;

/// Output of one measurement call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Cyclomatic complexity of the file
    pub complexity: f64,
    /// Maintainability index in [0, 100]
    pub maintainability: f64,
    /// Number of function-like definitions
    pub function_count: usize,
}

/// Pluggable metric extractor: `measure(file_content, language)`.
///
/// Implementations must be pure with respect to their inputs; the pipeline
/// caches outputs under the snapshot identity.
pub trait MeasurementProvider: Send + Sync {
    /// Measure a single file. An `Err` marks the file as unparseable; the
    /// complexity analyzer records complexity 0 and emits an issue.
    fn measure(&self, content: &str, language: Language) -> Result<Measurement>;

    /// The universe level this provider operates at (0 = parse-only).
    /// Checked by the stratification guard on self-analysis.
    fn level(&self) -> u8 {
        0
    }
}

/// Read-only commit-history service.
///
/// The git interrogation layer is outside the core; this trait is the whole
/// surface the core consumes from it.
pub trait CommitHistoryProvider: Send + Sync {
    /// List commits touching the tree at `root`/`reference`, newest first,
    /// optionally bounded by a since-date.
    fn commits(
        &self,
        root: &Path,
        reference: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CommitRecord>>;

    /// Uncommitted worktree state, when the provider can observe it.
    fn worktree_status(&self, _root: &Path) -> Result<Option<WorktreeStatus>> {
        Ok(None)
    }
}
