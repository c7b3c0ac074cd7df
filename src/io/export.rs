//! Semantic export surface.
//!
//! Downstream serializers (RDF, SHACL validation, credential signing) are
//! pure transforms over the sealed model; this module gives them the entity
//! identity scheme and a reference JSON exporter. Every identity is derived
//! from content hashes, never from run-scoped state.

use crate::core::errors::Result;
use crate::core::model::{Issue, ResultModel};
use crate::core::snapshot::FileEntry;

/// IRI prefix for exported entities.
pub const ENTITY_PREFIX: &str = "urn:repoq";

/// Identity IRI for a snapshot.
pub fn snapshot_iri(snapshot_id: &str) -> String {
    format!("{ENTITY_PREFIX}:snapshot:{snapshot_id}")
}

/// Identity IRI for a file, derived from its content hash.
pub fn file_iri(entry: &FileEntry) -> String {
    format!("{ENTITY_PREFIX}:file:{}", entry.content_hash)
}

/// Identity IRI for an issue, derived from its (kind, path, line) hash.
pub fn issue_iri(issue: &Issue) -> String {
    format!("{ENTITY_PREFIX}:issue:{}", issue.id)
}

/// Identity IRI for a module within a snapshot.
pub fn module_iri(snapshot_id: &str, module: &str) -> String {
    format!("{ENTITY_PREFIX}:snapshot:{snapshot_id}:module:{module}")
}

/// A pure transform from the sealed model to an export document.
pub trait FactExporter {
    /// Render the model. Must not mutate it and must be deterministic for a
    /// given model.
    fn export(&self, model: &ResultModel) -> Result<String>;
}

/// Reference exporter: the canonical JSON form backing determinism checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalJsonExporter;

impl FactExporter for CanonicalJsonExporter {
    fn export(&self, model: &ResultModel) -> Result<String> {
        model.to_canonical_json()
    }
}
