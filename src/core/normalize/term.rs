//! Shared term representation for the rewriting normalizer.
//!
//! All three artifact kinds (license expressions, version ranges, metric
//! expressions) normalize over this one term type, so a single well-founded
//! measure can police every rule.

use std::cmp::Ordering;

use semver::Version;
use serde::{Deserialize, Serialize};

/// Comparison operator inside a version constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    /// Exactly equal
    Eq,
    /// Greater or equal
    Ge,
    /// Strictly greater
    Gt,
    /// Less or equal
    Le,
    /// Strictly less
    Lt,
}

impl CmpOp {
    /// Canonical rendering.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Lt => "<",
        }
    }

    /// True for lower bounds (>=, >).
    pub fn is_lower(&self) -> bool {
        matches!(self, Self::Ge | Self::Gt)
    }

    /// True for upper bounds (<=, <).
    pub fn is_upper(&self) -> bool {
        matches!(self, Self::Le | Self::Lt)
    }
}

/// N-ary or binary operator node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Boolean/constraint conjunction (n-ary, commutative)
    And,
    /// Boolean disjunction (n-ary, commutative)
    Or,
    /// Arithmetic sum (n-ary, commutative)
    Add,
    /// Arithmetic difference (binary)
    Sub,
    /// Arithmetic product (n-ary, commutative)
    Mul,
    /// Arithmetic quotient (binary)
    Div,
}

impl Operator {
    /// Whether argument order is canonicalized by sorting.
    pub fn is_commutative(&self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Add | Self::Mul)
    }

    /// Whether nested nodes of the same operator flatten into the parent.
    pub fn is_associative(&self) -> bool {
        self.is_commutative()
    }
}

/// A normalizer term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// Named atom (license id, metric symbol)
    Atom(String),
    /// Boolean constant (license algebra TRUE/FALSE)
    Bool(bool),
    /// Numeric literal (metric expressions)
    Num(f64),
    /// Overflow sentinel carrying the decimal magnitude of the collapsed
    /// value; absorbing in arithmetic
    Large(i32),
    /// Version constraint atom
    Constraint {
        /// Comparison operator
        op: CmpOp,
        /// Constraint boundary
        version: Version,
    },
    /// Distinguished empty version range (contradiction)
    Empty,
    /// Operator application
    Op {
        /// Operator kind
        op: Operator,
        /// Arguments; binary for Sub/Div, n-ary otherwise
        args: Vec<Term>,
    },
}

impl Term {
    /// Build an operator node.
    pub fn op(op: Operator, args: Vec<Term>) -> Self {
        Self::Op { op, args }
    }

    /// Build a version constraint.
    pub fn constraint(op: CmpOp, version: Version) -> Self {
        Self::Constraint { op, version }
    }

    /// Nesting depth: atoms are 1, operators are 1 + max arg depth.
    pub fn depth(&self) -> usize {
        match self {
            Self::Op { args, .. } => 1 + args.iter().map(Term::depth).max().unwrap_or(0),
            _ => 1,
        }
    }

    /// Total node count.
    pub fn node_count(&self) -> usize {
        match self {
            Self::Op { args, .. } => 1 + args.iter().map(Term::node_count).sum::<usize>(),
            _ => 1,
        }
    }

    /// Canonical rendering. Compound arguments of compound operators are
    /// parenthesized, so rendering is unambiguous and injective on normal
    /// forms.
    pub fn render(&self) -> String {
        match self {
            Self::Atom(name) => name.clone(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Num(value) => render_number(*value),
            Self::Large(magnitude) => format!("large:{magnitude}"),
            Self::Constraint { op, version } => format!("{}{}", op.as_str(), version),
            Self::Empty => "EMPTY".to_string(),
            Self::Op { op, args } => {
                if args.is_empty() {
                    return match op {
                        Operator::And => "*".to_string(),
                        Operator::Or => "FALSE".to_string(),
                        Operator::Add => "0".to_string(),
                        Operator::Mul => "1".to_string(),
                        _ => String::new(),
                    };
                }
                let separator = match op {
                    Operator::And => {
                        // Version conjunctions render space-separated;
                        // license conjunctions render with AND
                        if args.iter().any(|a| matches!(a, Term::Constraint { .. })) {
                            " "
                        } else {
                            " AND "
                        }
                    }
                    Operator::Or => " OR ",
                    Operator::Add => " + ",
                    Operator::Sub => " - ",
                    Operator::Mul => " * ",
                    Operator::Div => " / ",
                };
                args.iter()
                    .map(|arg| match arg {
                        Term::Op { .. } => format!("({})", arg.render()),
                        _ => arg.render(),
                    })
                    .collect::<Vec<_>>()
                    .join(separator)
            }
        }
    }

    /// Sort key for canonical commutative reordering. Version constraints
    /// order by (kind rank, version), so conjunctions render as
    /// `=… >=… <…`; everything else orders by rendered form.
    pub fn sort_key(&self) -> String {
        match self {
            Self::Constraint { op, version } => {
                let rank = match op {
                    CmpOp::Eq => 0,
                    CmpOp::Ge | CmpOp::Gt => 1,
                    CmpOp::Le | CmpOp::Lt => 2,
                };
                format!(
                    "#{rank}:{:010}.{:010}.{:010}:{}",
                    version.major,
                    version.minor,
                    version.patch,
                    op.as_str()
                )
            }
            Self::Op { op, args } => {
                // The separator must sort below every content character, or
                // prefix-related keys ("GPL-2.0" / "GPL-2.0+") would make
                // argument sorting non-monotone in the joined key.
                let inner = args
                    .iter()
                    .map(Term::sort_key)
                    .collect::<Vec<_>>()
                    .join("\u{1}");
                format!("({op:?}\u{1}{inner})")
            }
            _ => self.render(),
        }
    }

    /// Total order used for canonical commutative reordering.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Render a float without a trailing `.0` for integral values.
fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// The shared well-founded measure: (depth, node count, lexicographic
/// weight). Every rule application must strictly decrease this triple
/// lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Measure {
    /// Nesting depth
    pub depth: usize,
    /// Node count
    pub nodes: usize,
    /// Sort-key weight, ordering permutations of equal-size terms
    pub weight: String,
}

impl Measure {
    /// Measure a term.
    pub fn of(term: &Term) -> Self {
        Self {
            depth: term.depth(),
            nodes: term.node_count(),
            weight: term.sort_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_and_nodes_count_operators() {
        let term = Term::op(
            Operator::And,
            vec![
                Term::Atom("MIT".into()),
                Term::op(
                    Operator::Or,
                    vec![Term::Atom("MIT".into()), Term::Atom("Apache-2.0".into())],
                ),
            ],
        );
        assert_eq!(term.depth(), 3);
        assert_eq!(term.node_count(), 5);
    }

    #[test]
    fn rendering_parenthesizes_compound_args() {
        let term = Term::op(
            Operator::And,
            vec![
                Term::Atom("MIT".into()),
                Term::op(
                    Operator::Or,
                    vec![Term::Atom("Apache-2.0".into()), Term::Atom("MIT".into())],
                ),
            ],
        );
        assert_eq!(term.render(), "MIT AND (Apache-2.0 OR MIT)");
    }

    #[test]
    fn sorted_args_have_smaller_measure() {
        let sorted = Term::op(
            Operator::And,
            vec![Term::Atom("Apache-2.0".into()), Term::Atom("MIT".into())],
        );
        let unsorted = Term::op(
            Operator::And,
            vec![Term::Atom("MIT".into()), Term::Atom("Apache-2.0".into())],
        );
        assert!(Measure::of(&sorted) < Measure::of(&unsorted));
    }

    #[test]
    fn prefix_atoms_sort_monotonically() {
        // "GPL-2.0" is a prefix of "GPL-2.0+"; sorting must still shrink
        // the measure
        let sorted = Term::op(
            Operator::And,
            vec![Term::Atom("GPL-2.0".into()), Term::Atom("GPL-2.0+".into())],
        );
        let unsorted = Term::op(
            Operator::And,
            vec![Term::Atom("GPL-2.0+".into()), Term::Atom("GPL-2.0".into())],
        );
        assert!(Measure::of(&sorted) < Measure::of(&unsorted));
    }

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(Term::Num(4.0).render(), "4");
        assert_eq!(Term::Num(2.5).render(), "2.5");
    }

    #[test]
    fn version_conjunction_renders_space_separated() {
        let term = Term::op(
            Operator::And,
            vec![
                Term::constraint(CmpOp::Ge, Version::new(1, 5, 0)),
                Term::constraint(CmpOp::Lt, Version::new(2, 0, 0)),
            ],
        );
        assert_eq!(term.render(), ">=1.5.0 <2.0.0");
    }
}
