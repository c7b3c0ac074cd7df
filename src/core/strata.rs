//! Stratification guard for self-analysis.
//!
//! Universe levels: 0 = parse-only, 1 = metrics, 2 = ontological mapping.
//! Level 3 (full reasoning) is never permitted on the analyzer's own source
//! tree. The guard also bounds the meta-analysis recursion depth. It is a
//! carried context value; there is no process-wide guard state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::core::config::StratificationPolicy;
use crate::core::errors::{RepoqError, Result};
use crate::core::snapshot::Snapshot;

/// Level above which self-analysis is categorically forbidden.
pub const FORBIDDEN_SELF_LEVEL: u8 = 3;

/// Enforces universe levels and recursion depth for self-analysis.
#[derive(Debug)]
pub struct StratificationGuard {
    policy: StratificationPolicy,
    /// Snapshot identity of the engine's own source tree, when known
    self_identity: Option<String>,
    depth: Arc<AtomicU8>,
}

impl StratificationGuard {
    /// Create a guard from policy bounds.
    pub fn new(policy: StratificationPolicy) -> Self {
        Self {
            policy,
            self_identity: None,
            depth: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Declare the snapshot identity of the engine's own source tree.
    /// Analyses of matching snapshots are level-checked.
    pub fn with_self_identity(mut self, identity: impl Into<String>) -> Self {
        self.self_identity = Some(identity.into());
        self
    }

    /// Whether a snapshot is the engine analyzing itself.
    pub fn is_self(&self, snapshot: &Snapshot) -> bool {
        self.self_identity
            .as_deref()
            .is_some_and(|id| id == snapshot.id)
    }

    /// Check a requested universe level against the permitted maximum for
    /// this snapshot. Non-self snapshots are unrestricted.
    pub fn check_level(&self, snapshot: &Snapshot, requested: u8) -> Result<()> {
        if !self.is_self(snapshot) {
            return Ok(());
        }
        if requested >= FORBIDDEN_SELF_LEVEL {
            return Err(RepoqError::StratificationBreach {
                message: format!(
                    "level {requested} reasoning is forbidden on the analyzer's own source tree"
                ),
                requested_level: Some(requested),
                permitted_level: Some(self.policy.max_self_level),
            });
        }
        if requested > self.policy.max_self_level {
            return Err(RepoqError::StratificationBreach {
                message: format!(
                    "self-analysis requested level {requested}, permitted maximum is {}",
                    self.policy.max_self_level
                ),
                requested_level: Some(requested),
                permitted_level: Some(self.policy.max_self_level),
            });
        }
        debug!(level = requested, "self-analysis level admitted");
        Ok(())
    }

    /// Enter one meta-analysis recursion level. The returned token releases
    /// the level on drop.
    pub fn enter_recursion(&self) -> Result<RecursionToken> {
        let previous = self.depth.fetch_add(1, Ordering::SeqCst);
        if previous >= self.policy.max_depth {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(RepoqError::StratificationBreach {
                message: format!(
                    "meta-analysis recursion depth exceeded the maximum of {}",
                    self.policy.max_depth
                ),
                requested_level: None,
                permitted_level: None,
            });
        }
        Ok(RecursionToken {
            depth: Arc::clone(&self.depth),
        })
    }

    /// Current recursion depth.
    pub fn current_depth(&self) -> u8 {
        self.depth.load(Ordering::SeqCst)
    }
}

/// RAII token for one recursion level.
#[derive(Debug)]
pub struct RecursionToken {
    depth: Arc<AtomicU8>,
}

impl Drop for RecursionToken {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
