//! The aggregated result model: facts, issues, graphs, and the quality
//! report.

pub mod facts;
pub mod graphs;
pub mod issues;
pub mod report;
pub mod result;

pub use facts::{FileFacts, Language, Layer, ModuleFacts};
pub use graphs::{CoChangeEdge, CoChangeGraph, DependencyEdge, DependencyGraph};
pub use issues::{Issue, IssueKind, Severity};
pub use report::{
    Hotspot, ProposedAction, QualityReport, RecommendationTask, RefactoringPlan, RiskIndex,
    RiskVector,
};
pub use result::{ResultModel, ResultModelBuilder};
