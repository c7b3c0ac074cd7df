//! Immutable repository snapshots.
//!
//! A snapshot is the content-addressed input to one analysis run: the file
//! set, the commit history, and the optional dependency manifest. Its
//! identity hash covers the file content hashes, the head commit id, and the
//! policy hash, so any change to inputs or policy produces a new identity.

pub mod loader;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{RepoqError, Result};
use crate::core::model::Language;

pub use loader::RepositoryLoader;

/// One tracked file in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the snapshot root
    pub path: PathBuf,
    /// Inferred language tag
    pub language: Language,
    /// File size in bytes
    pub bytes: u64,
    /// SHA-256 of the file content, hex
    pub content_hash: String,
}

/// Line-delta summary for one file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchedFile {
    /// Touched path
    pub path: PathBuf,
    /// Lines added
    pub added: u32,
    /// Lines deleted
    pub deleted: u32,
}

/// One commit in the snapshot's history window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit id
    pub id: String,
    /// Parent commit ids
    pub parents: Vec<String>,
    /// Stable hash of the author email
    pub author_key: String,
    /// Author timestamp
    pub timestamp: DateTime<Utc>,
    /// Files touched with line deltas
    pub touched: Vec<TouchedFile>,
}

impl CommitRecord {
    /// Derive the stable author key from an author email.
    pub fn author_key_for(email: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(email.trim().to_lowercase().as_bytes());
        let digest = hasher.finalize();
        digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
    }
}

/// Uncommitted worktree state observed at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeStatus {
    /// Tracked files with uncommitted modifications
    pub modified: Vec<PathBuf>,
    /// Untracked files present in the worktree
    pub untracked: Vec<PathBuf>,
}

/// Where file contents are materialized from.
#[derive(Debug, Clone)]
pub enum ContentStore {
    /// Contents live on disk under the snapshot root
    OnDisk {
        /// Snapshot root directory
        root: PathBuf,
    },
    /// Contents were captured in memory (tests, synthetic snapshots)
    InMemory {
        /// Path-to-content map
        contents: BTreeMap<PathBuf, String>,
    },
}

/// The content-addressed, immutable input to one analysis run.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Identity hash (file hashes ⊕ head commit ⊕ policy hash)
    pub id: String,
    /// Reference the snapshot was taken at ("." = working copy)
    pub reference: String,
    /// Tracked files, sorted by path
    pub files: Vec<FileEntry>,
    /// Commit history window, newest first
    pub commits: Vec<CommitRecord>,
    /// Dependency manifest (name → raw version range), when one was found
    pub manifest: Option<BTreeMap<String, String>>,
    /// Uncommitted worktree state, when observed
    pub worktree: Option<WorktreeStatus>,
    /// Content materialization backend
    pub content_store: ContentStore,
}

impl Snapshot {
    /// Compute the snapshot identity from its constituents.
    pub fn compute_identity(files: &[FileEntry], head_commit: Option<&str>, policy_hash: &str) -> String {
        let mut hasher = Sha256::new();
        for entry in files {
            hasher.update(entry.path.to_string_lossy().as_bytes());
            hasher.update(b"\x00");
            hasher.update(entry.content_hash.as_bytes());
            hasher.update(b"\x00");
        }
        hasher.update(head_commit.unwrap_or("").as_bytes());
        hasher.update(b"\x00");
        hasher.update(policy_hash.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Look up a file entry by path.
    pub fn file(&self, path: &Path) -> Option<&FileEntry> {
        self.files
            .binary_search_by(|entry| entry.path.as_path().cmp(path))
            .ok()
            .map(|ix| &self.files[ix])
    }

    /// The head commit id, when history is present.
    pub fn head_commit(&self) -> Option<&str> {
        self.commits.first().map(|c| c.id.as_str())
    }

    /// Number of tracked files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Materialize the content of a tracked file.
    pub fn read_file(&self, path: &Path) -> Result<String> {
        if self.file(path).is_none() {
            return Err(RepoqError::validation(format!(
                "path not tracked by snapshot: {}",
                path.display()
            )));
        }
        match &self.content_store {
            ContentStore::OnDisk { root } => {
                let absolute = root.join(path);
                std::fs::read_to_string(&absolute).map_err(|e| {
                    RepoqError::io(format!("Failed to read {}", absolute.display()), e)
                })
            }
            ContentStore::InMemory { contents } => contents
                .get(path)
                .cloned()
                .ok_or_else(|| {
                    RepoqError::internal(format!(
                        "tracked file missing from in-memory store: {}",
                        path.display()
                    ))
                }),
        }
    }

    /// Builder for synthetic snapshots (tests, BASE/HEAD fixtures).
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }
}

/// Builder for in-memory snapshots.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    reference: Option<String>,
    files: Vec<(PathBuf, String)>,
    commits: Vec<CommitRecord>,
    manifest: Option<BTreeMap<String, String>>,
    worktree: Option<WorktreeStatus>,
}

impl SnapshotBuilder {
    /// Set the reference label (defaults to ".").
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Add a file with inline content; language is inferred from the path.
    pub fn file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }

    /// Add a commit record.
    pub fn commit(mut self, commit: CommitRecord) -> Self {
        self.commits.push(commit);
        self
    }

    /// Set the dependency manifest.
    pub fn manifest(mut self, manifest: BTreeMap<String, String>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Set the worktree status.
    pub fn worktree(mut self, worktree: WorktreeStatus) -> Self {
        self.worktree = Some(worktree);
        self
    }

    /// Finalize into an immutable snapshot with a computed identity.
    pub fn build(self, policy_hash: &str) -> Snapshot {
        let mut entries: Vec<FileEntry> = self
            .files
            .iter()
            .map(|(path, content)| {
                let mut hasher = Sha256::new();
                hasher.update(content.as_bytes());
                let digest = hasher.finalize();
                let content_hash: String =
                    digest.iter().map(|b| format!("{b:02x}")).collect();
                let language = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(Language::from_extension)
                    .unwrap_or(Language::Unknown);
                FileEntry {
                    path: path.clone(),
                    language,
                    bytes: content.len() as u64,
                    content_hash,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let contents: BTreeMap<PathBuf, String> = self.files.into_iter().collect();
        let head = self.commits.first().map(|c| c.id.clone());
        let id = Snapshot::compute_identity(&entries, head.as_deref(), policy_hash);

        Snapshot {
            id,
            reference: self.reference.unwrap_or_else(|| ".".to_string()),
            files: entries,
            commits: self.commits,
            manifest: self.manifest,
            worktree: self.worktree,
            content_store: ContentStore::InMemory { contents },
        }
    }
}
