//! The id-translation façade.
//!
//! [`IdentityMapper`] is the single entry point the rest of the crate uses
//! to move between the two id spaces. It owns a [`MappingRegistry`] and
//! handles the sentinel pair before any scheme is consulted, in both
//! directions.

use tracing::debug;

use crate::errors::MappingError;
use crate::models::{NodeHash, RevisionId, NULL_REVISION};

use super::file_id::{self, FileId};
use super::registry::MappingRegistry;

/// Bidirectional translator between flat-system hashes / paths and
/// tree-system revision ids / file ids.
///
/// Pure functions over the registry; no I/O. Cheap to construct per
/// operation.
#[derive(Debug, Clone, Default)]
pub struct IdentityMapper {
    registry: MappingRegistry,
}

impl IdentityMapper {
    /// A mapper over the default registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mapper over an explicit registry (e.g. with a non-default mapping
    /// version selected by configuration).
    pub fn with_registry(registry: MappingRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Revision ids
    // -----------------------------------------------------------------------

    /// Translate a flat-system hash into the tree id space.
    ///
    /// Accepts a 20-byte binary hash or a 40-character hex rendering; the
    /// all-zero hash maps to the sentinel before any encoding happens.
    pub fn revision_foreign_to_local(&self, raw: &[u8]) -> Result<RevisionId, MappingError> {
        let hash = match raw.len() {
            20 => NodeHash::from_bytes(raw),
            40 => std::str::from_utf8(raw).ok().and_then(NodeHash::from_hex),
            _ => None,
        }
        .ok_or_else(|| MappingError::InvalidRevisionId {
            id: String::from_utf8_lossy(raw).into_owned(),
            detail: "expected a 20-byte hash or its 40-character hex form".into(),
        })?;
        Ok(self.revision_to_local(&hash))
    }

    /// Typed variant of [`Self::revision_foreign_to_local`]; total.
    pub fn revision_to_local(&self, hash: &NodeHash) -> RevisionId {
        if hash.is_null() {
            return RevisionId::Null;
        }
        self.registry.default_version().encode(hash)
    }

    /// Translate a tree-system revision id back into the flat id space,
    /// returning the hash and the mapping-version prefix it was encoded
    /// under.
    ///
    /// The sentinel maps to the all-zero hash without consulting the
    /// registry and reports the default version.
    pub fn revision_local_to_foreign(
        &self,
        id: &RevisionId,
    ) -> Result<(NodeHash, String), MappingError> {
        match id {
            RevisionId::Null => Ok((NodeHash::NULL, self.registry.default_prefix().to_string())),
            RevisionId::Mapped { version, hash } => {
                // A Mapped id could have been minted by a foreign registry;
                // reject versions this registry does not know.
                if self.registry.get(version).is_none() {
                    return Err(MappingError::InvalidRevisionId {
                        id: id.to_string(),
                        detail: format!("unknown mapping version prefix '{}'", version),
                    });
                }
                Ok((*hash, version.clone()))
            }
        }
    }

    /// Parse a rendered revision id string into the flat id space.
    pub fn parse_revision_id(&self, id: &str) -> Result<(NodeHash, String), MappingError> {
        if id == NULL_REVISION {
            return Ok((NodeHash::NULL, self.registry.default_prefix().to_string()));
        }
        debug!(id, "parsing foreign revision id");
        self.registry.parse(id)
    }

    // -----------------------------------------------------------------------
    // File ids
    // -----------------------------------------------------------------------

    /// Derive the stable file id for a path.
    pub fn file_id_for_path(&self, path: &str) -> FileId {
        file_id::file_id_for_path(path)
    }

    /// Recover the path a file id was derived from.
    pub fn path_for_file_id(&self, id: &FileId) -> Result<String, MappingError> {
        file_id::path_for_file_id(id)
    }
}
