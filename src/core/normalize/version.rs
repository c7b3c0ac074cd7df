//! Version-range rule family and parser.
//!
//! A range is a conjunction of inequalities over semver versions. Rules
//! merge overlapping bounds, canonicalize exact equalities, and collapse
//! contradictions into the distinguished `EMPTY` form.

use semver::Version;

use crate::core::errors::{RepoqError, Result};
use crate::core::normalize::term::{CmpOp, Operator, Term};
use crate::core::normalize::RewriteRule;

/// The version rule family, in application priority order.
pub fn rules() -> &'static [RewriteRule] {
    &[
        RewriteRule {
            name: "version/flatten-assoc",
            apply: flatten_assoc,
        },
        RewriteRule {
            name: "version/empty-absorb",
            apply: empty_absorb,
        },
        RewriteRule {
            name: "version/dedup",
            apply: dedup,
        },
        RewriteRule {
            name: "version/contradiction",
            apply: contradiction,
        },
        RewriteRule {
            name: "version/eq-absorb",
            apply: eq_absorb,
        },
        RewriteRule {
            name: "version/merge-lower",
            apply: merge_lower,
        },
        RewriteRule {
            name: "version/merge-upper",
            apply: merge_upper,
        },
        RewriteRule {
            name: "version/pinch",
            apply: pinch,
        },
        RewriteRule {
            name: "version/collapse",
            apply: collapse,
        },
        RewriteRule {
            name: "version/sort",
            apply: sort_args,
        },
    ]
}

/// Whether `candidate` satisfies the constraint (`op`, `bound`).
fn satisfies(candidate: &Version, op: CmpOp, bound: &Version) -> bool {
    match op {
        CmpOp::Eq => candidate == bound,
        CmpOp::Ge => candidate >= bound,
        CmpOp::Gt => candidate > bound,
        CmpOp::Le => candidate <= bound,
        CmpOp::Lt => candidate < bound,
    }
}

fn conjunction_args(term: &Term) -> Option<&Vec<Term>> {
    match term {
        Term::Op {
            op: Operator::And,
            args,
        } => Some(args),
        _ => None,
    }
}

fn flatten_assoc(term: &Term) -> Option<Term> {
    let args = conjunction_args(term)?;
    if !args.iter().any(|arg| conjunction_args(arg).is_some()) {
        return None;
    }
    let mut flattened = Vec::with_capacity(args.len());
    for arg in args {
        match conjunction_args(arg) {
            Some(inner) => flattened.extend(inner.clone()),
            None => flattened.push(arg.clone()),
        }
    }
    Some(Term::op(Operator::And, flattened))
}

/// A conjunction containing EMPTY is EMPTY.
fn empty_absorb(term: &Term) -> Option<Term> {
    let args = conjunction_args(term)?;
    args.iter()
        .any(|arg| matches!(arg, Term::Empty))
        .then_some(Term::Empty)
}

/// Identical constraints collapse to one occurrence.
fn dedup(term: &Term) -> Option<Term> {
    let args = conjunction_args(term)?;
    let mut kept: Vec<Term> = Vec::with_capacity(args.len());
    for arg in args {
        if !kept.contains(arg) {
            kept.push(arg.clone());
        }
    }
    (kept.len() < args.len()).then(|| Term::op(Operator::And, kept))
}

/// A pair of constraints with empty intersection collapses the whole
/// conjunction to EMPTY.
fn contradiction(term: &Term) -> Option<Term> {
    let args = conjunction_args(term)?;
    let constraints: Vec<(CmpOp, &Version)> = args
        .iter()
        .filter_map(|arg| match arg {
            Term::Constraint { op, version } => Some((*op, version)),
            _ => None,
        })
        .collect();

    for (ix, (op_a, ver_a)) in constraints.iter().enumerate() {
        for (op_b, ver_b) in &constraints[ix + 1..] {
            let empty = match (op_a, op_b) {
                (CmpOp::Eq, CmpOp::Eq) => ver_a != ver_b,
                (CmpOp::Eq, other) => !satisfies(ver_a, *other, ver_b),
                (other, CmpOp::Eq) => !satisfies(ver_b, *other, ver_a),
                (lower, upper) if lower.is_lower() && upper.is_upper() => {
                    ver_a > ver_b
                        || (ver_a == ver_b
                            && (matches!(lower, CmpOp::Gt) || matches!(upper, CmpOp::Lt)))
                }
                (upper, lower) if upper.is_upper() && lower.is_lower() => {
                    ver_b > ver_a
                        || (ver_a == ver_b
                            && (matches!(lower, CmpOp::Gt) || matches!(upper, CmpOp::Lt)))
                }
                _ => false,
            };
            if empty {
                return Some(Term::Empty);
            }
        }
    }
    None
}

/// An exact equality absorbs every bound it satisfies.
fn eq_absorb(term: &Term) -> Option<Term> {
    let args = conjunction_args(term)?;
    let pinned = args.iter().find_map(|arg| match arg {
        Term::Constraint {
            op: CmpOp::Eq,
            version,
        } => Some(version.clone()),
        _ => None,
    })?;

    let removable = args.iter().position(|arg| match arg {
        Term::Constraint { op, version } if *op != CmpOp::Eq => satisfies(&pinned, *op, version),
        _ => false,
    })?;

    let mut kept = args.clone();
    kept.remove(removable);
    Some(Term::op(Operator::And, kept))
}

/// ≥a ∧ ≥b → ≥max(a,b); strictness wins ties.
fn merge_lower(term: &Term) -> Option<Term> {
    merge_bounds(term, true)
}

/// ≤a ∧ ≤b → ≤min(a,b); strictness wins ties.
fn merge_upper(term: &Term) -> Option<Term> {
    merge_bounds(term, false)
}

fn merge_bounds(term: &Term, lower: bool) -> Option<Term> {
    let args = conjunction_args(term)?;
    let indices: Vec<usize> = args
        .iter()
        .enumerate()
        .filter_map(|(ix, arg)| match arg {
            Term::Constraint { op, .. } if op.is_lower() == lower && op.is_upper() != lower => {
                Some(ix)
            }
            _ => None,
        })
        .collect();
    if indices.len() < 2 {
        return None;
    }

    let (first, second) = (indices[0], indices[1]);
    let (op_a, ver_a) = constraint_parts(&args[first])?;
    let (op_b, ver_b) = constraint_parts(&args[second])?;

    let winner = if ver_a != ver_b {
        let a_wins = if lower { ver_a > ver_b } else { ver_a < ver_b };
        if a_wins {
            Term::constraint(op_a, ver_a)
        } else {
            Term::constraint(op_b, ver_b)
        }
    } else {
        // Same boundary: the strict operator is the stronger constraint
        let strict = if lower { CmpOp::Gt } else { CmpOp::Lt };
        if op_a == strict || op_b == strict {
            Term::constraint(strict, ver_a)
        } else {
            Term::constraint(op_a, ver_a)
        }
    };

    let mut kept = args.clone();
    kept.remove(second);
    kept[first] = winner;
    Some(Term::op(Operator::And, kept))
}

fn constraint_parts(term: &Term) -> Option<(CmpOp, Version)> {
    match term {
        Term::Constraint { op, version } => Some((*op, version.clone())),
        _ => None,
    }
}

/// ≥a ∧ ≤a → =a.
fn pinch(term: &Term) -> Option<Term> {
    let args = conjunction_args(term)?;
    let ge = args.iter().position(
        |arg| matches!(arg, Term::Constraint { op: CmpOp::Ge, .. }),
    )?;
    let (_, lower_ver) = constraint_parts(&args[ge])?;
    let le = args.iter().position(|arg| {
        matches!(arg, Term::Constraint { op: CmpOp::Le, version } if *version == lower_ver)
    })?;

    let mut kept = args.clone();
    let (keep_ix, drop_ix) = if ge < le { (ge, le) } else { (le, ge) };
    kept.remove(drop_ix);
    kept[keep_ix] = Term::constraint(CmpOp::Eq, lower_ver);
    Some(Term::op(Operator::And, kept))
}

/// Singleton collapse. The empty conjunction stays as the unconstrained
/// range `*`.
fn collapse(term: &Term) -> Option<Term> {
    let args = conjunction_args(term)?;
    (args.len() == 1).then(|| args[0].clone())
}

fn sort_args(term: &Term) -> Option<Term> {
    let args = conjunction_args(term)?;
    let mut sorted = args.clone();
    sorted.sort_by(|a, b| a.canonical_cmp(b));
    (sorted != *args).then(|| Term::op(Operator::And, sorted))
}

/// Parse a whitespace/comma-separated conjunction of version constraints.
pub fn parse(input: &str) -> Result<Term> {
    let tokens: Vec<&str> = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(RepoqError::parse("VersionRange", "empty range"));
    }

    let mut constraints = Vec::new();
    for token in tokens {
        if token == "*" {
            continue;
        }
        // The distinguished empty form round-trips through the parser
        if token == "EMPTY" {
            constraints.push(Term::Empty);
            continue;
        }
        constraints.push(parse_constraint(token)?);
    }

    Ok(match constraints.len() {
        0 => Term::op(Operator::And, Vec::new()),
        1 => constraints.pop().unwrap_or(Term::Empty),
        _ => Term::op(Operator::And, constraints),
    })
}

fn parse_constraint(token: &str) -> Result<Term> {
    let (op, rest) = if let Some(rest) = token.strip_prefix(">=") {
        (CmpOp::Ge, rest)
    } else if let Some(rest) = token.strip_prefix("<=") {
        (CmpOp::Le, rest)
    } else if let Some(rest) = token.strip_prefix("==") {
        (CmpOp::Eq, rest)
    } else if let Some(rest) = token.strip_prefix('=') {
        (CmpOp::Eq, rest)
    } else if let Some(rest) = token.strip_prefix('>') {
        (CmpOp::Gt, rest)
    } else if let Some(rest) = token.strip_prefix('<') {
        (CmpOp::Lt, rest)
    } else {
        (CmpOp::Eq, token)
    };

    let version = parse_version(rest)?;
    Ok(Term::constraint(op, version))
}

/// Parse a version, padding missing minor/patch components with zero.
fn parse_version(text: &str) -> Result<Version> {
    let text = text.trim();
    if text.is_empty() {
        return Err(RepoqError::parse("VersionRange", "missing version"));
    }
    let dot_count = text.bytes().filter(|b| *b == b'.').count();
    let padded = match dot_count {
        0 => format!("{text}.0.0"),
        1 => format!("{text}.0"),
        _ => text.to_string(),
    };
    Version::parse(&padded)
        .map_err(|e| RepoqError::parse("VersionRange", format!("invalid version '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_constraints() {
        let term = parse(">=1.2.3 <2.0.0").unwrap();
        assert_eq!(term.render(), ">=1.2.3 <2.0.0");
    }

    #[test]
    fn bare_version_is_exact() {
        let term = parse("1.2.3").unwrap();
        assert_eq!(term.render(), "=1.2.3");
    }

    #[test]
    fn short_versions_are_padded() {
        assert_eq!(parse(">=2").unwrap().render(), ">=2.0.0");
        assert_eq!(parse("<1.5").unwrap().render(), "<1.5.0");
    }

    #[test]
    fn star_is_unconstrained() {
        assert_eq!(parse("*").unwrap().render(), "*");
    }

    #[test]
    fn empty_form_round_trips() {
        assert_eq!(parse("EMPTY").unwrap(), Term::Empty);
    }

    #[test]
    fn contradiction_detects_inverted_bounds() {
        let term = parse(">=2.0.0 <1.0.0").unwrap();
        assert_eq!(contradiction(&term), Some(Term::Empty));
    }

    #[test]
    fn strict_tie_contradicts() {
        let term = parse(">1.0.0 <=1.0.0").unwrap();
        assert_eq!(contradiction(&term), Some(Term::Empty));
    }

    #[test]
    fn inclusive_tie_does_not_contradict() {
        let term = parse(">=1.0.0 <=1.0.0").unwrap();
        assert_eq!(contradiction(&term), None);
        // It pinches to an exact equality instead
        assert_eq!(pinch(&term).unwrap().render(), "=1.0.0");
    }

    #[test]
    fn merge_keeps_the_stronger_lower_bound() {
        let term = parse(">=1.2.3 >=1.5.0").unwrap();
        assert_eq!(merge_lower(&term).unwrap().render(), ">=1.5.0");
    }
}
