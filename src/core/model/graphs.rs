//! File-level dependency and co-change graphs.
//!
//! Both graphs address files by dense node indices over the sorted path set;
//! cycle detection runs Tarjan's strongly-connected-components algorithm over
//! a petgraph view built on demand.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

/// A directed file-to-file dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Importing file
    pub from: PathBuf,
    /// Imported file
    pub to: PathBuf,
}

/// Directed file-to-file dependency graph.
///
/// The edge set is the source of truth; it is deterministic by construction
/// (ordered set) and serializes to a sorted edge list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    edges: BTreeSet<DependencyEdge>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency edge (`from` -> `to`). Self-edges are kept; they
    /// surface as single-node cycles.
    pub fn add_edge(&mut self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) {
        self.edges.insert(DependencyEdge {
            from: from.into(),
            to: to.into(),
        });
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterate edges in canonical (from, to) order.
    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter()
    }

    /// All distinct node paths, sorted.
    pub fn nodes(&self) -> BTreeSet<&Path> {
        self.edges
            .iter()
            .flat_map(|e| [e.from.as_path(), e.to.as_path()])
            .collect()
    }

    /// Strongly connected components of size >= 2, plus self-loop singletons.
    /// Components are returned with members sorted by path, and the component
    /// list itself sorted by its smallest member, so output is reproducible.
    pub fn cycles(&self) -> Vec<Vec<PathBuf>> {
        let (graph, index_of) = self.petgraph_view();

        let mut cycles: Vec<Vec<PathBuf>> = tarjan_scc(&graph)
            .into_iter()
            .filter_map(|component| {
                if component.len() > 1 {
                    let mut members: Vec<PathBuf> = component
                        .iter()
                        .map(|ix| graph[*ix].clone())
                        .collect();
                    members.sort();
                    return Some(members);
                }
                // Single-node SCC is a cycle only with a self-loop
                let node = component[0];
                let path = graph[node].clone();
                let self_ix = index_of[&path];
                graph
                    .find_edge(self_ix, self_ix)
                    .map(|_| vec![path])
            })
            .collect();

        cycles.sort();
        cycles
    }

    /// The graph that remains after removing every edge internal to one of
    /// the given components. Used to verify the DAG-after-cycle-reporting
    /// invariant.
    pub fn without_cycle_edges(&self, components: &[Vec<PathBuf>]) -> Self {
        let component_sets: Vec<BTreeSet<&PathBuf>> =
            components.iter().map(|c| c.iter().collect()).collect();

        let edges = self
            .edges
            .iter()
            .filter(|edge| {
                !component_sets
                    .iter()
                    .any(|set| set.contains(&edge.from) && set.contains(&edge.to))
            })
            .cloned()
            .collect();
        Self { edges }
    }

    /// True when the graph contains no cycle.
    pub fn is_acyclic(&self) -> bool {
        self.cycles().is_empty()
    }

    /// Build a petgraph view with a stable path -> node index mapping.
    fn petgraph_view(&self) -> (DiGraph<PathBuf, ()>, BTreeMap<PathBuf, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index_of = BTreeMap::new();

        for path in self.nodes() {
            let ix = graph.add_node(path.to_path_buf());
            index_of.insert(path.to_path_buf(), ix);
        }
        for edge in &self.edges {
            graph.add_edge(index_of[&edge.from], index_of[&edge.to], ());
        }
        (graph, index_of)
    }
}

/// A weighted, symmetric co-change edge. Endpoints are stored in sorted
/// order so each unordered pair appears exactly once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoChangeEdge {
    /// Lexicographically smaller endpoint
    pub a: PathBuf,
    /// Lexicographically larger endpoint
    pub b: PathBuf,
    /// Number of commits touching both endpoints
    pub weight: u32,
}

/// Weighted symmetric file-to-file co-change graph. Serializes as a sorted
/// edge list (map keys must be strings in the canonical JSON form).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoChangeGraph {
    edges: BTreeMap<(PathBuf, PathBuf), u32>,
}

impl Serialize for CoChangeGraph {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.edges())
    }
}

impl<'de> Deserialize<'de> for CoChangeGraph {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let edges = Vec::<CoChangeEdge>::deserialize(deserializer)?;
        let mut graph = Self::new();
        for edge in edges {
            graph.edges.insert((edge.a, edge.b), edge.weight);
        }
        Ok(graph)
    }
}

impl CoChangeGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one co-occurrence of `a` and `b` in the same commit.
    pub fn record(&mut self, a: &Path, b: &Path) {
        if a == b {
            return;
        }
        let key = if a < b {
            (a.to_path_buf(), b.to_path_buf())
        } else {
            (b.to_path_buf(), a.to_path_buf())
        };
        *self.edges.entry(key).or_insert(0) += 1;
    }

    /// Co-occurrence count for an unordered pair.
    pub fn weight_between(&self, a: &Path, b: &Path) -> u32 {
        let key = if a < b {
            (a.to_path_buf(), b.to_path_buf())
        } else {
            (b.to_path_buf(), a.to_path_buf())
        };
        self.edges.get(&key).copied().unwrap_or(0)
    }

    /// Number of distinct pairs.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterate edges in canonical order.
    pub fn edges(&self) -> impl Iterator<Item = CoChangeEdge> + '_ {
        self.edges.iter().map(|((a, b), weight)| CoChangeEdge {
            a: a.clone(),
            b: b.clone(),
            weight: *weight,
        })
    }
}
