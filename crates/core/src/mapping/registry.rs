//! Registry of mapping versions.
//!
//! Lookups are by exact prefix match only. Exactly one registered version
//! is the default, used when encoding new ids; unknown prefixes fail with
//! `InvalidRevisionId` and never fall back to the default.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::MappingError;
use crate::models::NodeHash;

use super::version::{ExperimentalMapping, MappingVersion};

/// Family prefix shared by all mapped revision ids. Ids outside this
/// family are rejected before any version lookup.
const FAMILY_PREFIX: &str = "hg-";

/// A table from mapping-version prefix to scheme implementation, with one
/// designated default.
///
/// Passed by reference through the call chain rather than held as
/// process-wide mutable state, so concurrent operations each see a
/// consistent table.
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    versions: BTreeMap<String, Arc<dyn MappingVersion>>,
    default_version: Arc<dyn MappingVersion>,
}

impl Default for MappingRegistry {
    /// A registry with [`ExperimentalMapping`] registered as the default.
    fn default() -> Self {
        let default: Arc<dyn MappingVersion> = Arc::new(ExperimentalMapping);
        let mut registry = Self {
            versions: BTreeMap::new(),
            default_version: Arc::clone(&default),
        };
        registry.register(default);
        registry
    }
}

impl MappingRegistry {
    /// Register a mapping version under its prefix.
    pub fn register(&mut self, version: Arc<dyn MappingVersion>) {
        self.versions.insert(version.prefix().to_string(), version);
    }

    /// Make a registered version the default for encoding.
    pub fn set_default(&mut self, prefix: &str) -> Result<(), MappingError> {
        let version =
            self.versions
                .get(prefix)
                .ok_or_else(|| MappingError::InvalidRevisionId {
                    id: prefix.to_string(),
                    detail: "not a registered mapping version".into(),
                })?;
        self.default_version = Arc::clone(version);
        Ok(())
    }

    /// Look up a version by exact prefix.
    pub fn get(&self, prefix: &str) -> Option<&Arc<dyn MappingVersion>> {
        self.versions.get(prefix)
    }

    /// The default version.
    pub fn default_version(&self) -> &Arc<dyn MappingVersion> {
        &self.default_version
    }

    /// Prefix of the default version.
    pub fn default_prefix(&self) -> &str {
        self.default_version.prefix()
    }

    /// Parse a rendered tree-system revision id into its embedded hash and
    /// mapping-version prefix.
    ///
    /// The caller handles the `null:` sentinel before calling this.
    pub fn parse(&self, id: &str) -> Result<(NodeHash, String), MappingError> {
        if !id.starts_with(FAMILY_PREFIX) {
            return Err(MappingError::InvalidRevisionId {
                id: id.to_string(),
                detail: format!("id does not start with '{}'", FAMILY_PREFIX),
            });
        }
        let (prefix, payload) = id.split_once(':').ok_or_else(|| {
            MappingError::InvalidRevisionId {
                id: id.to_string(),
                detail: "id has no ':' separator".into(),
            }
        })?;
        let version = self
            .get(prefix)
            .ok_or_else(|| MappingError::InvalidRevisionId {
                id: id.to_string(),
                detail: format!("unknown mapping version prefix '{}'", prefix),
            })?;
        let hash = version.decode_payload(payload)?;
        Ok((hash, prefix.to_string()))
    }
}
