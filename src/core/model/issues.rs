//! Issue records emitted by analyzers.
//!
//! Issue identity is a stable hash of (kind, file path, line) so that the
//! same finding carries the same id across runs and across BASE/HEAD
//! comparisons.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The kind of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Public symbol without a docstring
    MissingDocstring,
    /// Docstring parameter set disagrees with the signature
    SignatureMismatch,
    /// Docstring contains stale TODO/FIXME content
    OutdatedDoc,
    /// TODO/FIXME comment marker
    TodoMarker,
    /// Tracked file with uncommitted modifications
    UncommittedChange,
    /// Untracked files present in the worktree
    UntrackedFiles,
    /// Import crossing a disallowed layer direction
    LayeringViolation,
    /// Strongly connected component in the dependency graph
    CircularDependency,
    /// Dependency matching a known advisory range
    VulnerableDependency,
    /// Project license outside the configured allowlist
    IncompatibleLicense,
    /// Committed credential material
    SecretLeak,
    /// Semantic diagnostic that fits no other kind
    Other,
}

impl IssueKind {
    /// Stable lowercase name used in identities and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingDocstring => "missing_docstring",
            Self::SignatureMismatch => "signature_mismatch",
            Self::OutdatedDoc => "outdated_doc",
            Self::TodoMarker => "todo_marker",
            Self::UncommittedChange => "uncommitted_change",
            Self::UntrackedFiles => "untracked_files",
            Self::LayeringViolation => "layering_violation",
            Self::CircularDependency => "circular_dependency",
            Self::VulnerableDependency => "vulnerable_dependency",
            Self::IncompatibleLicense => "incompatible_license",
            Self::SecretLeak => "secret_leak",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational finding
    Info,
    /// Minor finding
    Minor,
    /// Major finding
    Major,
    /// Critical finding
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// A single finding against a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Stable identity hash of (kind, path, line)
    pub id: String,
    /// Kind tag
    pub kind: IssueKind,
    /// Severity
    pub severity: Severity,
    /// File the issue refers to
    pub path: PathBuf,
    /// Line number, when the finding is line-anchored
    pub line: Option<u32>,
    /// Human-readable message
    pub message: String,
    /// Optional suggested fix
    pub suggestion: Option<String>,
}

impl Issue {
    /// Create a new issue; the identity hash is derived from (kind, path,
    /// line) and nothing else.
    pub fn new(
        kind: IssueKind,
        severity: Severity,
        path: impl Into<PathBuf>,
        line: Option<u32>,
        message: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let id = Self::identity(kind, &path, line);
        Self {
            id,
            kind,
            severity,
            path,
            line,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Attach a suggested fix.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Stable identity hash of (kind, path, line).
    pub fn identity(kind: IssueKind, path: &Path, line: Option<u32>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b"\x00");
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\x00");
        hasher.update(line.unwrap_or(0).to_be_bytes());
        let digest = hasher.finalize();
        // 16 hex chars is plenty for collision resistance at issue scale
        hex_prefix(&digest, 16)
    }

    /// The canonical issue ordering: (path, line, kind).
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then(self.line.unwrap_or(0).cmp(&other.line.unwrap_or(0)))
            .then(self.kind.cmp(&other.kind))
            .then(self.severity.cmp(&other.severity))
    }
}

/// Render the first `chars` hex characters of a digest.
fn hex_prefix(digest: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in digest {
        if out.len() >= chars {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(chars);
    out
}
