//! Lexical, parse-only measurement provider.
//!
//! Computes cyclomatic complexity from branch-token counts, a maintainability
//! index from complexity and size, and function counts from definition
//! keywords. It never builds an AST, which is what makes it admissible at
//! stratification level 0 for self-analysis.

use once_cell::sync::Lazy;

use crate::core::errors::{RepoqError, Result};
use crate::core::model::Language;

use super::{Measurement, MeasurementProvider};

/// Branch-point tokens per language. Matched on word boundaries after
/// comment stripping.
static PYTHON_BRANCHES: &[&str] = &[
    "if", "elif", "for", "while", "except", "and", "or", "case", "assert",
];
static RUST_BRANCHES: &[&str] = &["if", "for", "while", "match", "loop", "&&", "||"];
static C_FAMILY_BRANCHES: &[&str] = &[
    "if", "for", "while", "case", "catch", "&&", "||", "?",
];
static GO_BRANCHES: &[&str] = &["if", "for", "case", "select", "&&", "||"];

/// Function-definition markers per language.
static PYTHON_DEFS: &[&str] = &["def "];
static RUST_DEFS: &[&str] = &["fn "];
static JS_DEFS: &[&str] = &["function ", "=> "];
static GO_DEFS: &[&str] = &["func "];
static JAVA_DEFS: &[&str] = &["void ", "public ", "private ", "protected "];

static LINE_COMMENT_PREFIXES: Lazy<Vec<(&'static str, Vec<Language>)>> = Lazy::new(|| {
    vec![
        ("#", vec![Language::Python]),
        (
            "//",
            vec![
                Language::Rust,
                Language::JavaScript,
                Language::TypeScript,
                Language::Go,
                Language::Java,
            ],
        ),
    ]
});

/// The reference level-0 measurement provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalMeasurementProvider;

impl LexicalMeasurementProvider {
    /// Create a new provider.
    pub fn new() -> Self {
        Self
    }

    fn branch_tokens(language: Language) -> &'static [&'static str] {
        match language {
            Language::Python => PYTHON_BRANCHES,
            Language::Rust => RUST_BRANCHES,
            Language::JavaScript | Language::TypeScript | Language::Java => C_FAMILY_BRANCHES,
            Language::Go => GO_BRANCHES,
            Language::Unknown => &[],
        }
    }

    fn def_markers(language: Language) -> &'static [&'static str] {
        match language {
            Language::Python => PYTHON_DEFS,
            Language::Rust => RUST_DEFS,
            Language::JavaScript | Language::TypeScript => JS_DEFS,
            Language::Go => GO_DEFS,
            Language::Java => JAVA_DEFS,
            Language::Unknown => &[],
        }
    }

    /// Strip the line-comment suffix for the language, if any.
    fn code_portion<'a>(line: &'a str, language: Language) -> &'a str {
        for (prefix, languages) in LINE_COMMENT_PREFIXES.iter() {
            if languages.contains(&language) {
                if let Some(ix) = line.find(prefix) {
                    return &line[..ix];
                }
            }
        }
        line
    }

    /// Cheap structural validity check: balanced bracket counts. Grossly
    /// unbalanced files are reported as unparseable rather than measured.
    fn check_balance(content: &str, language: Language) -> Result<()> {
        if language == Language::Python {
            return Ok(());
        }
        let mut depth: i64 = 0;
        for ch in content.chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            if depth < -3 {
                return Err(RepoqError::parse(
                    language.as_str(),
                    "unbalanced braces; refusing to measure",
                ));
            }
        }
        if depth.unsigned_abs() > 3 {
            return Err(RepoqError::parse(
                language.as_str(),
                "unbalanced braces; refusing to measure",
            ));
        }
        Ok(())
    }

    fn count_word(haystack: &str, needle: &str) -> usize {
        if needle.chars().all(|c| c.is_alphanumeric() || c == '_') {
            // Word-boundary match for keyword tokens
            haystack
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .filter(|word| *word == needle)
                .count()
        } else {
            haystack.matches(needle).count()
        }
    }
}

impl MeasurementProvider for LexicalMeasurementProvider {
    fn measure(&self, content: &str, language: Language) -> Result<Measurement> {
        Self::check_balance(content, language)?;

        let mut branch_count = 0usize;
        let mut function_count = 0usize;
        let mut loc = 0usize;

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            loc += 1;
            let code = Self::code_portion(trimmed, language);
            for token in Self::branch_tokens(language) {
                branch_count += Self::count_word(code, token);
            }
            for marker in Self::def_markers(language) {
                function_count += code.matches(marker).count();
            }
        }

        let complexity = 1.0 + branch_count as f64;

        // Classic maintainability-index shape with size standing in for
        // Halstead volume, rescaled to [0, 100].
        let size = (loc.max(1)) as f64;
        let raw = 171.0 - 5.2 * size.ln() - 0.23 * complexity - 16.2 * size.ln();
        let maintainability = (raw * 100.0 / 171.0).clamp(0.0, 100.0);

        Ok(Measurement {
            complexity,
            maintainability,
            function_count,
        })
    }

    fn level(&self) -> u8 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_python_has_complexity_one() {
        let provider = LexicalMeasurementProvider::new();
        let m = provider
            .measure("x = 1\ny = 2\n", Language::Python)
            .unwrap();
        assert_eq!(m.complexity, 1.0);
        assert_eq!(m.function_count, 0);
    }

    #[test]
    fn branches_raise_complexity() {
        let provider = LexicalMeasurementProvider::new();
        let source = "def f(x):\n    if x:\n        return 1\n    elif x < 0:\n        return 2\n    return 0\n";
        let m = provider.measure(source, Language::Python).unwrap();
        assert_eq!(m.complexity, 3.0);
        assert_eq!(m.function_count, 1);
    }

    #[test]
    fn comments_do_not_count_as_branches() {
        let provider = LexicalMeasurementProvider::new();
        let source = "x = 1  # if this were code, complexity would rise\n";
        let m = provider.measure(source, Language::Python).unwrap();
        assert_eq!(m.complexity, 1.0);
    }

    #[test]
    fn grossly_unbalanced_rust_is_rejected() {
        let provider = LexicalMeasurementProvider::new();
        let source = "fn broken() {{{{{{\n";
        assert!(provider.measure(source, Language::Rust).is_err());
    }

    #[test]
    fn maintainability_shrinks_with_size() {
        let provider = LexicalMeasurementProvider::new();
        let small = provider.measure("x = 1\n", Language::Python).unwrap();
        let large_src = "x = 1\n".repeat(500);
        let large = provider.measure(&large_src, Language::Python).unwrap();
        assert!(small.maintainability > large.maintainability);
    }
}
