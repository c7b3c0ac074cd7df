//! # Repoq-RS: Repository Quality Analysis Engine
//!
//! A Rust engine that analyzes source-code repositories and produces a
//! quality assessment: an aggregate score Q, a per-module floor PCQ, the
//! issues behind both, and a prioritized refactoring plan. Its signature
//! capability is the **admission gate**, which compares a HEAD analysis
//! against a BASE analysis and accepts the replacement only under monotone
//! quality improvement with anti-compensation guarantees.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       API Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Core Engine     │  Detectors    │  Providers │  I/O        │
//! │                  │               │            │             │
//! │ • Normalizer     │ • Structure   │ • Measure  │ • Cache     │
//! │ • Snapshot       │ • Complexity  │ • History  │ • Export    │
//! │ • Scheduler      │ • Weakness    │            │             │
//! │ • Quality/Gate   │ • Architecture│            │             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use repoq_rs::{Policy, RepoqEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = RepoqEngine::new(Policy::default())?;
//!     let model = engine.analyze_path(std::path::Path::new("./src"), ".").await?;
//!
//!     println!("Q = {:.1}, PCQ = {:.2}", model.report.q, model.report.pcq);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

// Core analysis engine modules
pub mod core {
    //! Core analysis algorithms and data structures.

    pub mod config;
    pub mod errors;
    pub mod gate;
    pub mod model;
    pub mod normalize;
    pub mod pipeline;
    pub mod quality;
    pub mod registry;
    pub mod snapshot;
    pub mod strata;
}

// The fixed analyzer family
pub mod detectors;

// External collaborator interfaces and reference implementations
pub mod providers;

// Caching and export surfaces
pub mod io {
    //! I/O: the analysis cache and the semantic export surface.

    pub mod cache;
    pub mod export;
}

// Public API and engine interface
pub mod api {
    //! High-level API and engine interface.

    pub mod engine;
}

// Re-export primary types for convenience
pub use crate::api::engine::RepoqEngine;
pub use crate::core::config::Policy;
pub use crate::core::errors::{RepoqError, Result, ResultExt};
pub use crate::core::gate::{AdmissionGate, GateState, Verdict};
pub use crate::core::model::ResultModel;
pub use crate::core::normalize::{ArtifactKind, CanonicalForm, Normalizer};
pub use crate::core::snapshot::Snapshot;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
