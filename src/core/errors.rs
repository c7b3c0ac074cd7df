//! Error types for the repoq-rs library.
//!
//! The taxonomy follows the analysis lifecycle: input errors abort before any
//! analyzer runs, containment errors are recovered at the stage boundary,
//! invariant errors indicate a defect in the engine itself, and resource
//! errors bound runaway work. Semantic problems that do not stop the pipeline
//! are reported as diagnostics on the result model instead of errors.

use std::io;
use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

/// Main result type for repoq operations.
pub type Result<T> = std::result::Result<T, RepoqError>;

/// Comprehensive error type for all repoq operations.
#[derive(Error, Debug)]
pub enum RepoqError {
    /// I/O related errors (file operations, cache persistence, etc.)
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable error message
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The requested path is not an analyzable repository. Fatal input error.
    #[error("not a repository: {path}")]
    NotARepository {
        /// Path that was rejected
        path: String,
    },

    /// The requested ref does not resolve. Fatal input error.
    #[error("ref not found: {reference}")]
    RefNotFound {
        /// Reference that failed to resolve
        reference: String,
    },

    /// Policy document failed validation. Fatal input error.
    #[error("invalid policy: {message}")]
    PolicyInvalid {
        /// Error description
        message: String,
        /// Policy field that caused the error
        field: Option<String>,
    },

    /// The analyzer dependency graph contains a cycle. Invariant error.
    #[error("analyzer dependency cycle: {cycle:?}")]
    DependencyCycle {
        /// Names of the analyzers forming the cycle
        cycle: Vec<String>,
    },

    /// A dependency of this analyzer failed or was skipped, so the analyzer
    /// cannot run. Containment error; never escapes the stage boundary.
    #[error("analyzer '{analyzer}' unavailable: dependency '{dependency}' did not produce output")]
    DependencyUnavailable {
        /// Analyzer that could not run
        analyzer: String,
        /// Dependency that is missing
        dependency: String,
    },

    /// Analysis pipeline errors scoped to a stage.
    #[error("pipeline error at stage '{stage}': {message}")]
    Pipeline {
        /// Pipeline stage where the error occurred
        stage: String,
        /// Error description
        message: String,
    },

    /// An individual analyzer failed. Containment error.
    #[error("analyzer '{analyzer}' failed: {message}")]
    Analyzer {
        /// Analyzer name
        analyzer: String,
        /// Error description
        message: String,
    },

    /// The rewriting self-check found a divergent critical pair. Invariant
    /// error; indicates a broken rule set, not bad input.
    #[error("confluence self-check failed for {kind}: {message}")]
    ConfluenceSelfCheckFailed {
        /// Artifact kind whose rule set diverged
        kind: String,
        /// Description of the divergent pair
        message: String,
    },

    /// Normalization exceeded its step budget. Recoverable: the caller falls
    /// back to the unnormalized form and flags the artifact.
    #[error("normalization budget exceeded after {steps} steps")]
    BudgetExceeded {
        /// Steps consumed before giving up
        steps: usize,
        /// Last term reached, rendered
        last_term: String,
    },

    /// A rewrite rule failed to decrease the shared termination measure.
    /// Invariant error surfaced by the startup self-check.
    #[error("non-terminating rule '{rule}': measure did not decrease")]
    NonTerminating {
        /// Offending rule name
        rule: String,
    },

    /// Self-analysis exceeded the permitted universe level or recursion
    /// depth. Invariant error.
    #[error("stratification breach: {message}")]
    StratificationBreach {
        /// Error description
        message: String,
        /// Requested level, if the breach was a level violation
        requested_level: Option<u8>,
        /// Maximum permitted level
        permitted_level: Option<u8>,
    },

    /// Memory or wall-clock ceiling exceeded. Fatal for the current analysis.
    #[error("resource exhausted: {message}")]
    ResourceExhausted {
        /// Error description
        message: String,
        /// Type of resource exhausted
        resource: String,
    },

    /// The pipeline was cancelled before producing a result model.
    #[error("analysis cancelled at stage '{stage}'")]
    Cancelled {
        /// Stage at which cancellation was observed
        stage: String,
    },

    /// Cache and persistence errors.
    #[error("cache error: {message}")]
    Cache {
        /// Error description
        message: String,
        /// Cache key that caused the issue
        key: Option<String>,
    },

    /// Artifact parsing errors (license expressions, version ranges, metric
    /// expressions, manifests).
    #[error("parse error in {kind}: {message}")]
    Parse {
        /// Kind of artifact being parsed
        kind: String,
        /// Error description
        message: String,
    },

    /// Serialization/deserialization errors.
    #[error("serialization error: {message}")]
    Serialization {
        /// Error description
        message: String,
        /// Underlying serialization error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors for input data.
    #[error("validation error: {message}")]
    Validation {
        /// Error description
        message: String,
        /// Field or input that failed validation
        field: Option<String>,
    },

    /// Generic internal errors.
    #[error("internal error: {message}")]
    Internal {
        /// Error description
        message: String,
        /// Additional context
        context: Option<String>,
    },
}

impl RepoqError {
    /// Create a new I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a new not-a-repository error
    pub fn not_a_repository(path: impl Into<String>) -> Self {
        Self::NotARepository { path: path.into() }
    }

    /// Create a new ref-not-found error
    pub fn ref_not_found(reference: impl Into<String>) -> Self {
        Self::RefNotFound {
            reference: reference.into(),
        }
    }

    /// Create a new policy validation error
    pub fn policy(message: impl Into<String>) -> Self {
        Self::PolicyInvalid {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new policy validation error with field context
    pub fn policy_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::PolicyInvalid {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new pipeline error
    pub fn pipeline(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pipeline {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a new contained analyzer error
    pub fn analyzer(analyzer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Analyzer {
            analyzer: analyzer.into(),
            message: message.into(),
        }
    }

    /// Create a new stratification breach error
    pub fn stratification(message: impl Into<String>) -> Self {
        Self::StratificationBreach {
            message: message.into(),
            requested_level: None,
            permitted_level: None,
        }
    }

    /// Create a new resource exhaustion error
    pub fn resource(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
            resource: resource.into(),
        }
    }

    /// Create a new cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            key: None,
        }
    }

    /// Create a new artifact parse error
    pub fn parse(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: None,
        }
    }

    /// True for errors that abort the whole analysis rather than a single
    /// analyzer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotARepository { .. }
                | Self::RefNotFound { .. }
                | Self::PolicyInvalid { .. }
                | Self::DependencyCycle { .. }
                | Self::ConfluenceSelfCheckFailed { .. }
                | Self::NonTerminating { .. }
                | Self::StratificationBreach { .. }
                | Self::ResourceExhausted { .. }
                | Self::Cancelled { .. }
        )
    }

    /// Add context to an existing error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        if let Self::Internal { context: ctx, .. } = &mut self {
            *ctx = Some(context.into());
        }
        self
    }
}

// Implement From traits for common error types
impl From<io::Error> for RepoqError {
    fn from(err: io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

impl From<serde_json::Error> for RepoqError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON serialization failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for RepoqError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML serialization failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

impl From<ParseIntError> for RepoqError {
    fn from(err: ParseIntError) -> Self {
        Self::validation(format!("Invalid integer: {err}"))
    }
}

impl From<ParseFloatError> for RepoqError {
    fn from(err: ParseFloatError) -> Self {
        Self::validation(format!("Invalid float: {err}"))
    }
}

impl From<semver::Error> for RepoqError {
    fn from(err: semver::Error) -> Self {
        Self::parse("VersionRange", err.to_string())
    }
}

/// Result extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context produced lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error result
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<RepoqError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }

    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| e.into().with_context(msg))
    }
}
