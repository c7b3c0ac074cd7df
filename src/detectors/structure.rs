//! Structure analyzer: file enumeration, module partitioning, manifest
//! carriage.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{RepoqError, Result};
use crate::core::model::Language;
use crate::core::pipeline::context::StageView;
use crate::core::registry::{AnalyzerInfo, AnalyzerKind};

use super::{Analyzer, AnalyzerOutput, AnalyzerRun};

/// Output of the structure analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureFacts {
    /// Language tag per file
    pub languages: BTreeMap<PathBuf, Language>,
    /// Physical line count per file
    pub loc: BTreeMap<PathBuf, usize>,
    /// Module partition: module path → member files. Every file belongs to
    /// exactly one module (its parent directory; "." for the root).
    pub modules: BTreeMap<String, BTreeSet<PathBuf>>,
    /// Dependency manifest entries (name → raw version range)
    pub manifest: BTreeMap<String, String>,
    /// Path of the manifest file inside the snapshot, when present
    pub manifest_path: Option<PathBuf>,
}

impl StructureFacts {
    /// The module a file belongs to.
    pub fn module_of(path: &std::path::Path) -> String {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                parent.to_string_lossy().into_owned()
            }
            _ => ".".to_string(),
        }
    }
}

/// File enumeration and module partitioning.
pub struct StructureAnalyzer {
    info: AnalyzerInfo,
}

impl StructureAnalyzer {
    /// Create the analyzer.
    pub fn new() -> Self {
        Self {
            info: AnalyzerInfo::new(AnalyzerKind::Structure, &[], 0),
        }
    }
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for StructureAnalyzer {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    async fn run(&self, view: StageView) -> Result<AnalyzerRun> {
        let mut facts = StructureFacts::default();
        let mut diagnostics = Vec::new();

        for entry in &view.snapshot.files {
            if view.is_cancelled() {
                return Err(RepoqError::Cancelled {
                    stage: AnalyzerKind::Structure.to_string(),
                });
            }

            facts.languages.insert(entry.path.clone(), entry.language);
            facts
                .modules
                .entry(StructureFacts::module_of(&entry.path))
                .or_default()
                .insert(entry.path.clone());

            match view.snapshot.read_file(&entry.path) {
                Ok(content) => {
                    facts.loc.insert(entry.path.clone(), content.lines().count());
                }
                Err(e) => {
                    diagnostics.push(format!(
                        "structure: could not read {}: {e}",
                        entry.path.display()
                    ));
                    facts.loc.insert(entry.path.clone(), 0);
                }
            }
        }

        if let Some(manifest) = &view.snapshot.manifest {
            facts.manifest = manifest.clone();
            facts.manifest_path = view
                .snapshot
                .files
                .iter()
                .find(|entry| {
                    matches!(
                        entry.path.file_name().and_then(|n| n.to_str()),
                        Some("Cargo.toml") | Some("package.json") | Some("requirements.txt")
                    )
                })
                .map(|entry| entry.path.clone());
        }

        debug!(
            files = facts.languages.len(),
            modules = facts.modules.len(),
            "structure analysis complete"
        );

        Ok(AnalyzerRun {
            output: AnalyzerOutput::Structure(facts),
            issues: Vec::new(),
            diagnostics,
        })
    }
}
