//! Repository loader: working tree + history → immutable snapshot.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::config::Policy;
use crate::core::errors::{RepoqError, Result};
use crate::core::model::Language;
use crate::core::snapshot::{ContentStore, FileEntry, Snapshot};
use crate::providers::CommitHistoryProvider;

/// Well-known dependency manifest file names, in probe order.
const MANIFEST_CANDIDATES: &[&str] = &["Cargo.toml", "package.json", "requirements.txt"];

/// Produces deterministic snapshots from a path and ref.
pub struct RepositoryLoader {
    history: Arc<dyn CommitHistoryProvider>,
    since: Option<DateTime<Utc>>,
}

impl RepositoryLoader {
    /// Create a loader over the given history provider.
    pub fn new(history: Arc<dyn CommitHistoryProvider>) -> Self {
        Self {
            history,
            since: None,
        }
    }

    /// Restrict history to commits at or after the given date.
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Load a snapshot of `root` at `reference` ("." = working copy).
    ///
    /// The policy supplies the exclusion globs, the file-count bound, and
    /// the policy hash folded into the snapshot identity.
    pub fn load(&self, root: &Path, reference: &str, policy: &Policy) -> Result<Snapshot> {
        if !root.is_dir() {
            return Err(RepoqError::not_a_repository(root.display().to_string()));
        }

        let exclusions = compile_globs(&policy.excluded_globs)?;
        let mut files = self.walk_files(root, &exclusions, policy.max_files)?;
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let commits = self
            .history
            .commits(root, reference, self.since)?;
        let worktree = self.history.worktree_status(root)?;
        let manifest = load_manifest(root);

        let head = commits.first().map(|c| c.id.clone());
        let id = Snapshot::compute_identity(&files, head.as_deref(), &policy.content_hash());

        info!(
            files = files.len(),
            commits = commits.len(),
            id = %id,
            "loaded snapshot"
        );

        Ok(Snapshot {
            id,
            reference: reference.to_string(),
            files,
            commits,
            manifest,
            worktree,
            content_store: ContentStore::OnDisk {
                root: root.to_path_buf(),
            },
        })
    }

    /// Walk the working tree, hashing every included file.
    fn walk_files(
        &self,
        root: &Path,
        exclusions: &GlobSet,
        max_files: usize,
    ) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();

        for dirent in WalkDir::new(root).follow_links(false) {
            let dirent = match dirent {
                Ok(d) => d,
                Err(e) => {
                    warn!("skipping unreadable directory entry: {e}");
                    continue;
                }
            };
            if !dirent.file_type().is_file() {
                continue;
            }
            let relative = dirent
                .path()
                .strip_prefix(root)
                .map_err(|_| RepoqError::internal("walked path escaped the snapshot root"))?;
            if exclusions.is_match(relative) {
                continue;
            }

            match hash_file(dirent.path()) {
                Ok((bytes, content_hash)) => {
                    let language = relative
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(Language::from_extension)
                        .unwrap_or(Language::Unknown);
                    entries.push(FileEntry {
                        path: relative.to_path_buf(),
                        language,
                        bytes,
                        content_hash,
                    });
                }
                Err(e) => {
                    // Unreadable files are absent from the snapshot, not fatal
                    warn!("skipping unreadable file {}: {e}", relative.display());
                }
            }
        }

        if max_files > 0 && entries.len() > max_files {
            warn!(
                "limiting snapshot to {} files (found {})",
                max_files,
                entries.len()
            );
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            entries.truncate(max_files);
        }

        Ok(entries)
    }
}

/// Compile exclusion globs into a matcher.
fn compile_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            RepoqError::policy_field(format!("invalid exclusion glob '{pattern}': {e}"), "excluded_globs")
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RepoqError::policy_field(format!("glob set build failed: {e}"), "excluded_globs"))
}

/// Hash one file's content, returning (byte length, hex digest).
fn hash_file(path: &Path) -> std::io::Result<(u64, String)> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok((bytes.len() as u64, hex))
}

/// Probe for a dependency manifest and parse it into (name → raw range).
fn load_manifest(root: &Path) -> Option<BTreeMap<String, String>> {
    for candidate in MANIFEST_CANDIDATES {
        let path = root.join(candidate);
        if !path.is_file() {
            continue;
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("manifest {} unreadable: {e}", path.display());
                continue;
            }
        };
        match parse_manifest(candidate, &content) {
            Ok(map) => {
                debug!(manifest = candidate, entries = map.len(), "parsed manifest");
                return Some(map);
            }
            Err(e) => warn!("manifest {} unparseable: {e}", path.display()),
        }
    }
    None
}

/// Parse a manifest by file name convention.
pub(crate) fn parse_manifest(name: &str, content: &str) -> Result<BTreeMap<String, String>> {
    match name {
        "Cargo.toml" => parse_cargo_manifest(content),
        "package.json" => parse_package_json(content),
        "requirements.txt" => Ok(parse_requirements(content)),
        other => Err(RepoqError::parse(
            "manifest",
            format!("unknown manifest kind: {other}"),
        )),
    }
}

fn parse_cargo_manifest(content: &str) -> Result<BTreeMap<String, String>> {
    let value: toml::Value = content
        .parse()
        .map_err(|e| RepoqError::parse("manifest", format!("invalid Cargo.toml: {e}")))?;
    let mut map = BTreeMap::new();
    for table_name in ["dependencies", "dev-dependencies", "build-dependencies"] {
        if let Some(table) = value.get(table_name).and_then(|v| v.as_table()) {
            for (name, spec) in table {
                let range = match spec {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Table(t) => t
                        .get("version")
                        .and_then(|v| v.as_str())
                        .unwrap_or("*")
                        .to_string(),
                    _ => "*".to_string(),
                };
                map.entry(name.clone()).or_insert(range);
            }
        }
    }
    Ok(map)
}

fn parse_package_json(content: &str) -> Result<BTreeMap<String, String>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let mut map = BTreeMap::new();
    for table_name in ["dependencies", "devDependencies"] {
        if let Some(table) = value.get(table_name).and_then(|v| v.as_object()) {
            for (name, spec) in table {
                if let Some(range) = spec.as_str() {
                    map.entry(name.clone()).or_insert_with(|| range.to_string());
                }
            }
        }
    }
    Ok(map)
}

fn parse_requirements(content: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // name==1.2.3 / name>=1.0 / bare name
        let split_at = line
            .find(|c: char| ['=', '<', '>', '~', '!'].contains(&c))
            .unwrap_or(line.len());
        let (name, range) = line.split_at(split_at);
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let range = if range.is_empty() { "*" } else { range.trim() };
        map.insert(name.to_string(), range.to_string());
    }
    map
}
