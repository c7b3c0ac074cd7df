//! Doc-code sync analyzer: docstring presence and signature consistency.
//!
//! Python gets the full treatment: parameter multisets declared in the
//! docstring are compared against the actual signature. Other languages are
//! checked for documentation presence on public functions. Private symbols
//! (leading underscore) are skipped, the constructor initializer is checked,
//! and nested functions are not.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use crate::core::errors::{RepoqError, Result};
use crate::core::model::{Issue, IssueKind, Language, Severity};
use crate::core::pipeline::context::StageView;
use crate::core::registry::{AnalyzerInfo, AnalyzerKind};

use super::{Analyzer, AnalyzerOutput, AnalyzerRun};

/// Output of the doc-code sync analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocSyncFacts {
    /// Symbols checked
    pub checked: usize,
    /// Missing docstrings
    pub missing: usize,
    /// Signature mismatches
    pub mismatched: usize,
    /// Docstrings containing stale TODO/FIXME content
    pub outdated: usize,
}

/// Docstring consistency checking.
pub struct DocCodeSyncAnalyzer {
    info: AnalyzerInfo,
}

impl DocCodeSyncAnalyzer {
    /// Create the analyzer.
    pub fn new() -> Self {
        Self {
            info: AnalyzerInfo::new(AnalyzerKind::DocCodeSync, &[AnalyzerKind::Structure], 2),
        }
    }
}

impl Default for DocCodeSyncAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for DocCodeSyncAnalyzer {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    async fn run(&self, view: StageView) -> Result<AnalyzerRun> {
        let structure = view.structure(AnalyzerKind::DocCodeSync)?;

        let mut facts = DocSyncFacts::default();
        let mut issues = Vec::new();
        let mut diagnostics = Vec::new();

        for (path, language) in &structure.languages {
            if view.is_cancelled() {
                return Err(RepoqError::Cancelled {
                    stage: AnalyzerKind::DocCodeSync.to_string(),
                });
            }
            let content = match language {
                Language::Python | Language::Rust => match view.snapshot.read_file(path) {
                    Ok(c) => c,
                    Err(e) => {
                        diagnostics.push(format!(
                            "doc_code_sync: could not read {}: {e}",
                            path.display()
                        ));
                        continue;
                    }
                },
                _ => continue,
            };

            match language {
                Language::Python => check_python(path, &content, &mut facts, &mut issues),
                Language::Rust => check_rust(path, &content, &mut facts, &mut issues),
                _ => {}
            }
        }

        debug!(
            checked = facts.checked,
            missing = facts.missing,
            mismatched = facts.mismatched,
            "doc-code sync analysis complete"
        );

        Ok(AnalyzerRun {
            output: AnalyzerOutput::DocCodeSync(facts),
            issues,
            diagnostics,
        })
    }
}

/// One Python function definition found in a file.
struct PyFunction {
    name: String,
    line: u32,
    params: Vec<String>,
    docstring: Option<String>,
}

fn check_python(path: &Path, content: &str, facts: &mut DocSyncFacts, issues: &mut Vec<Issue>) {
    for function in parse_python_functions(content) {
        // Private symbols are skipped; the constructor initializer is not
        if function.name.starts_with('_') && function.name != "__init__" {
            continue;
        }
        facts.checked += 1;

        let Some(docstring) = &function.docstring else {
            facts.missing += 1;
            issues.push(Issue::new(
                IssueKind::MissingDocstring,
                Severity::Minor,
                path.to_path_buf(),
                Some(function.line),
                format!("public function '{}' has no docstring", function.name),
            ));
            continue;
        };

        if docstring.contains("TODO") || docstring.contains("FIXME") {
            facts.outdated += 1;
            issues.push(Issue::new(
                IssueKind::OutdatedDoc,
                Severity::Minor,
                path.to_path_buf(),
                Some(function.line),
                format!("docstring of '{}' contains deferred-work markers", function.name),
            ));
        }

        let documented = documented_params(docstring);
        if documented.is_empty() {
            continue;
        }
        let declared: BTreeSet<String> = function.params.iter().cloned().collect();
        let missing: Vec<&String> = declared.difference(&documented).collect();
        let extra: Vec<&String> = documented.difference(&declared).collect();
        if missing.is_empty() && extra.is_empty() {
            continue;
        }

        facts.mismatched += 1;
        let mut parts = Vec::new();
        for name in &missing {
            parts.push(format!("missing parameter '{name}'"));
        }
        for name in &extra {
            parts.push(format!("extra documented parameter '{name}'"));
        }
        issues.push(Issue::new(
            IssueKind::SignatureMismatch,
            Severity::Major,
            path.to_path_buf(),
            Some(function.line),
            format!(
                "docstring of '{}' disagrees with its signature: {}",
                function.name,
                parts.join(", ")
            ),
        ));
    }
}

/// Parse module- and class-level function definitions (nested functions are
/// excluded), with their parameter lists and docstrings.
fn parse_python_functions(content: &str) -> Vec<PyFunction> {
    let lines: Vec<&str> = content.lines().collect();
    let mut functions = Vec::new();
    // Stack of (indent, is_def) for enclosing blocks
    let mut scope: SmallVec<[(usize, bool); 8]> = SmallVec::new();

    let mut ix = 0;
    while ix < lines.len() {
        let line = lines[ix];
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            ix += 1;
            continue;
        }
        let indent = line.len() - trimmed.len();
        while scope.last().is_some_and(|(scope_indent, _)| indent <= *scope_indent) {
            scope.pop();
        }

        if trimmed.starts_with("class ") {
            scope.push((indent, false));
            ix += 1;
            continue;
        }

        let Some(rest) = trimmed.strip_prefix("def ") else {
            ix += 1;
            continue;
        };
        let nested_in_def = scope.iter().any(|(_, is_def)| *is_def);
        scope.push((indent, true));

        // Accumulate a possibly multi-line signature until parens balance
        let mut signature = rest.to_string();
        let mut sig_end = ix;
        while paren_balance(&signature) > 0 && sig_end + 1 < lines.len() {
            sig_end += 1;
            signature.push(' ');
            signature.push_str(lines[sig_end].trim());
        }

        if !nested_in_def {
            if let Some((name, params)) = split_signature(&signature) {
                let docstring = extract_docstring(&lines, sig_end + 1);
                functions.push(PyFunction {
                    name,
                    line: (ix + 1) as u32,
                    params,
                    docstring,
                });
            }
        }
        ix = sig_end + 1;
    }

    functions
}

fn paren_balance(text: &str) -> i64 {
    let mut balance = 0i64;
    for ch in text.chars() {
        match ch {
            '(' => balance += 1,
            ')' => balance -= 1,
            _ => {}
        }
    }
    balance
}

/// Split `name(params) -> ret:` into the name and the cleaned parameter
/// names, excluding the implicit self/cls receiver.
fn split_signature(signature: &str) -> Option<(String, Vec<String>)> {
    let open = signature.find('(')?;
    let name = signature[..open].trim().to_string();
    let close = signature.rfind(')')?;
    let raw_params = &signature[open + 1..close];

    let mut params = Vec::new();
    let mut depth = 0i64;
    let mut current = String::new();
    for ch in raw_params.chars() {
        match ch {
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                push_param(&mut params, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_param(&mut params, &current);
    Some((name, params))
}

fn push_param(params: &mut Vec<String>, raw: &str) {
    let name: String = raw
        .trim()
        .trim_start_matches('*')
        .chars()
        .take_while(|c| *c != ':' && *c != '=')
        .collect();
    let name = name.trim();
    if name.is_empty() || name == "self" || name == "cls" || name == "/" {
        return;
    }
    params.push(name.to_string());
}

/// Extract the triple-quoted docstring starting at or after `start`.
fn extract_docstring(lines: &[&str], start: usize) -> Option<String> {
    let mut ix = start;
    while ix < lines.len() && lines[ix].trim().is_empty() {
        ix += 1;
    }
    let first = lines.get(ix)?.trim();
    let delimiter = if first.starts_with("\"\"\"") {
        "\"\"\""
    } else if first.starts_with("'''") {
        "'''"
    } else {
        return None;
    };

    let mut body = String::new();
    let after_open = &first[delimiter.len()..];
    if let Some(close) = after_open.find(delimiter) {
        return Some(after_open[..close].to_string());
    }
    body.push_str(after_open);
    body.push('\n');
    for line in &lines[ix + 1..] {
        if let Some(close) = line.find(delimiter) {
            body.push_str(&line[..close]);
            return Some(body);
        }
        body.push_str(line);
        body.push('\n');
    }
    None
}

/// Parameter names declared in a docstring: `Args:`/`Parameters:` blocks and
/// Sphinx `:param name:` fields.
fn documented_params(docstring: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut in_args_block = false;

    for line in docstring.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(":param ") {
            if let Some(name) = rest.split(':').next() {
                let name = name.split_whitespace().last().unwrap_or(name);
                names.insert(name.trim().to_string());
            }
            continue;
        }

        if trimmed.eq_ignore_ascii_case("args:") || trimmed.eq_ignore_ascii_case("parameters:") {
            in_args_block = true;
            continue;
        }
        if in_args_block {
            if trimmed.is_empty() || trimmed.ends_with(':') && !trimmed.contains(' ') {
                in_args_block = false;
                continue;
            }
            if let Some(colon) = trimmed.find(':') {
                let name_part = trimmed[..colon].trim();
                let name = name_part.split(['(', ' ']).next().unwrap_or(name_part);
                if !name.is_empty()
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    names.insert(name.to_string());
                }
            }
        }
    }
    names
}

/// Rust: public functions should carry a doc comment.
fn check_rust(path: &Path, content: &str, facts: &mut DocSyncFacts, issues: &mut Vec<Issue>) {
    let lines: Vec<&str> = content.lines().collect();
    for (ix, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix("pub fn ") else {
            continue;
        };
        let name: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() || name.starts_with('_') {
            continue;
        }
        facts.checked += 1;

        // Walk back over attributes to the nearest comment or code line
        let mut back = ix;
        let documented = loop {
            if back == 0 {
                break false;
            }
            back -= 1;
            let previous = lines[back].trim_start();
            if previous.starts_with("#[") || previous.is_empty() {
                continue;
            }
            break previous.starts_with("///") || previous.starts_with("/**");
        };

        if !documented {
            facts.missing += 1;
            issues.push(Issue::new(
                IssueKind::MissingDocstring,
                Severity::Minor,
                path.to_path_buf(),
                Some((ix + 1) as u32),
                format!("public function '{name}' has no doc comment"),
            ));
        }
    }
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

        DocCodeSyncAnalyzer::new()
            .run(view_with_outputs(snapshot, outputs))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn signature_mismatch_names_both_sides() {
        let source = r#"def run(config, verbose):
    """Run the tool.

    Args:
        options: bag of options
        verbose: chatty output
    """
    return config
"#;
        let snapshot = Snapshot::builder().file("tool.py", source).build("p");
        let run = run_over(snapshot).await;

        let mismatch = run
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::SignatureMismatch)
            .expect("expected a mismatch");
        assert_eq!(mismatch.severity, Severity::Major);
        assert!(mismatch.message.contains("missing parameter 'config'"));
        assert!(mismatch.message.contains("extra documented parameter 'options'"));
    }

    #[tokio::test]
    async fn matching_docstring_is_clean() {
        let source = r#"def run(config, verbose):
    """Run the tool.

    Args:
        config: configuration
        verbose: chatty output
    """
    return config
"#;
        let snapshot = Snapshot::builder().file("tool.py", source).build("p");
        let run = run_over(snapshot).await;
        assert!(run.issues.is_empty());
    }

    #[tokio::test]
    async fn private_functions_are_skipped_but_init_is_checked() {
        let source = r#"def _internal(x):
    return x

class Widget:
    def __init__(self, size):
        pass
"#;
        let snapshot = Snapshot::builder().file("widget.py", source).build("p");
        let run = run_over(snapshot).await;

        let missing: Vec<_> = run
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::MissingDocstring)
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].message.contains("__init__"));
    }

    #[tokio::test]
    async fn nested_functions_are_not_checked() {
        let source = r#"def outer():
    """Documented."""
    def inner(x):
        return x
    return inner
"#;
        let snapshot = Snapshot::builder().file("nest.py", source).build("p");
        let run = run_over(snapshot).await;
        assert!(run.issues.is_empty());
    }

    #[tokio::test]
    async fn todo_in_docstring_is_outdated() {
        let source = r#"def run():
    """TODO write real docs."""
    return 1
"#;
        let snapshot = Snapshot::builder().file("tool.py", source).build("p");
        let run = run_over(snapshot).await;
        assert!(run.issues.iter().any(|i| i.kind == IssueKind::OutdatedDoc));
    }

    #[tokio::test]
    async fn undocumented_pub_fn_in_rust_is_flagged() {
        let source = "/// Documented.\npub fn fine() {}\n\npub fn naked() {}\n";
        let snapshot = Snapshot::builder().file("lib.rs", source).build("p");
        let run = run_over(snapshot).await;

        let missing: Vec<_> = run
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::MissingDocstring)
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].message.contains("naked"));
    }
}
