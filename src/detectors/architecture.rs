//! Architecture analyzer: layer assignment, layering violations, and
//! dependency-cycle detection.
//!
//! Layers are assigned per module from a path heuristic; imports are
//! extracted lexically and resolved against the snapshot's file set; cycles
//! are the strongly connected components of the resulting file graph.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ahash::AHashSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{RepoqError, Result};
use crate::core::model::{DependencyGraph, Issue, IssueKind, Language, Layer, Severity};
use crate::core::pipeline::context::StageView;
use crate::core::registry::{AnalyzerInfo, AnalyzerKind};

use super::{Analyzer, AnalyzerOutput, AnalyzerRun, StructureFacts};

/// Path-segment keywords per layer, probed in declaration order.
static LAYER_KEYWORDS: &[(Layer, &[&str])] = &[
    (
        Layer::Presentation,
        &["ui", "cli", "api", "views", "web", "frontend", "presentation", "handlers"],
    ),
    (
        Layer::Business,
        &["core", "domain", "services", "business", "logic", "engine", "app"],
    ),
    (
        Layer::Data,
        &["data", "db", "models", "storage", "persistence", "repository", "dao"],
    ),
    (
        Layer::Infrastructure,
        &["infra", "infrastructure", "utils", "util", "common", "shared", "io", "config"],
    ),
];

/// Output of the architecture analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureFacts {
    /// Layer per module path
    pub module_layers: BTreeMap<String, Layer>,
    /// Layer per file (derived from the file's module)
    pub file_layers: BTreeMap<PathBuf, Layer>,
    /// Resolved file-to-file dependency graph
    pub graph: DependencyGraph,
    /// Strongly connected components of size >= 2
    pub cycles: Vec<Vec<PathBuf>>,
    /// Number of layering violations found
    pub violation_count: usize,
}

/// Layering and cycle detection.
pub struct ArchitectureAnalyzer {
    info: AnalyzerInfo,
}

impl ArchitectureAnalyzer {
    /// Create the analyzer.
    pub fn new() -> Self {
        Self {
            info: AnalyzerInfo::new(AnalyzerKind::Architecture, &[AnalyzerKind::Structure], 2),
        }
    }
}

impl Default for ArchitectureAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for ArchitectureAnalyzer {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    async fn run(&self, view: StageView) -> Result<AnalyzerRun> {
        let structure = view.structure(AnalyzerKind::Architecture)?;

        let mut facts = ArchitectureFacts::default();
        let mut issues = Vec::new();
        let mut diagnostics = Vec::new();

        // One layer per module; files inherit their module's layer, so no
        // file is ever assigned to two layers.
        for (module, members) in &structure.modules {
            let layer = assign_layer(module);
            facts.module_layers.insert(module.clone(), layer);
            for member in members {
                facts.file_layers.insert(member.clone(), layer);
            }
        }

        let rules = view.policy.layer_rules();
        let resolver = ImportResolver::new(structure);

        for (path, language) in &structure.languages {
            if view.is_cancelled() {
                return Err(RepoqError::Cancelled {
                    stage: AnalyzerKind::Architecture.to_string(),
                });
            }
            if !language.is_source() {
                continue;
            }
            let content = match view.snapshot.read_file(path) {
                Ok(c) => c,
                Err(e) => {
                    diagnostics.push(format!(
                        "architecture: could not read {}: {e}",
                        path.display()
                    ));
                    continue;
                }
            };

            for (line_no, import) in extract_imports(&content, *language) {
                let Some(target) = resolver.resolve(path, &import) else {
                    continue;
                };
                if target == *path {
                    continue;
                }
                facts.graph.add_edge(path.clone(), target.clone());

                let source_layer = facts.file_layers.get(path).copied();
                let target_layer = facts.file_layers.get(&target).copied();
                if let (Some(source), Some(dest)) = (source_layer, target_layer) {
                    if !rules.permits(source, dest) {
                        facts.violation_count += 1;
                        let severity = if source == Layer::Data && dest == Layer::Presentation {
                            Severity::Critical
                        } else {
                            Severity::Major
                        };
                        issues.push(Issue::new(
                            IssueKind::LayeringViolation,
                            severity,
                            path.clone(),
                            Some(line_no),
                            format!(
                                "{source} layer must not depend on {dest} layer (import of {})",
                                target.display()
                            ),
                        ));
                    }
                }
            }
        }

        // One issue per strongly connected component of size >= 2
        facts.cycles = facts
            .graph
            .cycles()
            .into_iter()
            .filter(|component| component.len() >= 2)
            .collect();
        for component in &facts.cycles {
            let members = component
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            issues.push(Issue::new(
                IssueKind::CircularDependency,
                Severity::Major,
                component[0].clone(),
                None,
                format!("circular dependency component: {{{members}}}"),
            ));
        }

        debug!(
            edges = facts.graph.edge_count(),
            cycles = facts.cycles.len(),
            violations = facts.violation_count,
            "architecture analysis complete"
        );

        Ok(AnalyzerRun {
            output: AnalyzerOutput::Architecture(facts),
            issues,
            diagnostics,
        })
    }
}

/// Assign a layer to a module path by keyword probing; modules that match
/// nothing default to Business.
fn assign_layer(module: &str) -> Layer {
    let segments: Vec<String> = module
        .split(['/', '\\'])
        .map(|s| s.to_lowercase())
        .collect();
    for (layer, keywords) in LAYER_KEYWORDS {
        if segments
            .iter()
            .any(|segment| keywords.contains(&segment.as_str()))
        {
            return *layer;
        }
    }
    Layer::Business
}

/// Lexically extract (line, import target) pairs from source text.
fn extract_imports(content: &str, language: Language) -> Vec<(u32, String)> {
    let mut imports = Vec::new();
    for (ix, line) in content.lines().enumerate() {
        let line_no = (ix + 1) as u32;
        let trimmed = line.trim();
        let target = match language {
            Language::Python => python_import(trimmed),
            Language::Rust => rust_import(trimmed),
            Language::JavaScript | Language::TypeScript => js_import(trimmed),
            Language::Go => go_import(trimmed),
            _ => None,
        };
        if let Some(target) = target {
            imports.push((line_no, target));
        }
    }
    imports
}

fn python_import(line: &str) -> Option<String> {
    if let Some(rest) = line.strip_prefix("from ") {
        let module = rest.split_whitespace().next()?;
        return Some(module.trim_start_matches('.').replace('.', "/"));
    }
    if let Some(rest) = line.strip_prefix("import ") {
        let module = rest.split([' ', ',']).next()?;
        return Some(module.replace('.', "/"));
    }
    None
}

fn rust_import(line: &str) -> Option<String> {
    let rest = line.strip_prefix("use crate::")?;
    let path = rest
        .split([';', ':', '{', ' '])
        .next()
        .filter(|s| !s.is_empty())?;
    Some(format!("src/{path}"))
}

fn js_import(line: &str) -> Option<String> {
    let from_ix = line.find(" from ")?;
    let rest = &line[from_ix + 6..];
    let quote = rest.chars().next().filter(|c| matches!(c, '\'' | '"'))?;
    let inner: String = rest[1..].chars().take_while(|c| *c != quote).collect();
    // Only same-directory relative imports are resolvable lexically
    inner.strip_prefix("./").map(str::to_string)
}

fn go_import(line: &str) -> Option<String> {
    let rest = line.strip_prefix("import ")?;
    let quoted = rest.trim().trim_matches('"');
    (!quoted.is_empty()).then(|| quoted.to_string())
}

/// Resolves lexical import strings to files inside the snapshot.
struct ImportResolver {
    known: AHashSet<PathBuf>,
}

impl ImportResolver {
    fn new(structure: &StructureFacts) -> Self {
        Self {
            known: structure.languages.keys().cloned().collect(),
        }
    }

    fn resolve(&self, importer: &Path, target: &str) -> Option<PathBuf> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        let roots = [
            PathBuf::new(),
            importer.parent().map(PathBuf::from).unwrap_or_default(),
        ];
        for root in roots {
            for suffix in [
                format!("{target}.py"),
                format!("{target}/__init__.py"),
                format!("{target}.rs"),
                format!("{target}/mod.rs"),
                format!("{target}.js"),
                format!("{target}.ts"),
                format!("{target}/index.ts"),
                format!("{target}/index.js"),
                format!("{target}.go"),
            ] {
                candidates.push(normalize_join(&root, &suffix));
            }
        }
        candidates
            .into_iter()
            .find(|candidate| self.known.contains(candidate))
    }
}

/// Join and collapse `.` components without touching the filesystem.
fn normalize_join(root: &Path, suffix: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in root.join(suffix).components() {
        match component {
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::context::test_support::{view_for, view_with_outputs};
    use crate::core::snapshot::Snapshot;
    use crate::detectors::StructureAnalyzer;
    use std::collections::BTreeMap;

    async fn run_over(snapshot: Snapshot) -> AnalyzerRun {
        let structure = StructureAnalyzer::new()
            .run(view_for(snapshot.clone()))
            .await
            .unwrap();
        let mut outputs = BTreeMap::new();
        outputs.insert(AnalyzerKind::Structure, structure.output);

        ArchitectureAnalyzer::new()
            .run(view_with_outputs(snapshot, outputs))
            .await
            .unwrap()
    }

    #[test]
    fn layer_heuristic_matches_keywords() {
        assert_eq!(assign_layer("src/ui"), Layer::Presentation);
        assert_eq!(assign_layer("src/models"), Layer::Data);
        assert_eq!(assign_layer("src/utils"), Layer::Infrastructure);
        assert_eq!(assign_layer("src/pricing"), Layer::Business);
    }

    #[tokio::test]
    async fn three_cycle_emits_exactly_one_issue() {
        let snapshot = Snapshot::builder()
            .file("pkg/a.py", "import pkg.b\n")
            .file("pkg/b.py", "import pkg.c\n")
            .file("pkg/c.py", "import pkg.a\n")
            .build("p");

        let run = run_over(snapshot).await;
        let AnalyzerOutput::Architecture(facts) = &run.output else {
            panic!("wrong variant");
        };

        let cycle_issues: Vec<_> = run
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::CircularDependency)
            .collect();
        assert_eq!(cycle_issues.len(), 1);
        assert!(cycle_issues[0].message.contains("pkg/a.py"));
        assert!(cycle_issues[0].message.contains("pkg/b.py"));
        assert!(cycle_issues[0].message.contains("pkg/c.py"));

        // Removing the reported component leaves an acyclic graph
        let remainder = facts.graph.without_cycle_edges(&facts.cycles);
        assert!(remainder.is_acyclic());
    }

    #[tokio::test]
    async fn data_to_presentation_is_critical() {
        let snapshot = Snapshot::builder()
            .file("models/store.py", "import ui.screen\n")
            .file("ui/screen.py", "x = 1\n")
            .build("p");

        let run = run_over(snapshot).await;
        let violation = run
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::LayeringViolation)
            .expect("expected a layering violation");
        assert_eq!(violation.severity, Severity::Critical);
        assert_eq!(violation.line, Some(1));
    }

    #[tokio::test]
    async fn allowed_direction_is_not_flagged() {
        let snapshot = Snapshot::builder()
            .file("ui/screen.py", "import core.pricing\n")
            .file("core/pricing.py", "x = 1\n")
            .build("p");

        let run = run_over(snapshot).await;
        assert!(!run
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::LayeringViolation));
        let AnalyzerOutput::Architecture(facts) = &run.output else {
            panic!("wrong variant");
        };
        assert_eq!(facts.graph.edge_count(), 1);
    }
}
