//! Versioned revision-id mapping schemes.
//!
//! A mapping version is an invertible encoding of a flat-system hash into
//! a tree-system revision id, identified by its prefix. The sentinel pair
//! (all-zero hash / `null:`) is handled by the [`IdentityMapper`] before
//! any scheme is consulted and never reaches `decode_payload`.
//!
//! [`IdentityMapper`]: super::IdentityMapper

use std::fmt;

use crate::errors::MappingError;
use crate::models::{NodeHash, RevisionId};

/// An invertible scheme for embedding flat-system hashes in tree-system
/// revision ids.
///
/// `encode` and `decode_payload` must be mutual inverses for every hash.
pub trait MappingVersion: fmt::Debug + Send + Sync {
    /// The id prefix this version registers under, e.g. `hg-experimental`.
    fn prefix(&self) -> &'static str;

    /// Encode a (non-sentinel) hash as a tree-system revision id.
    fn encode(&self, hash: &NodeHash) -> RevisionId {
        RevisionId::Mapped {
            version: self.prefix().to_string(),
            hash: *hash,
        }
    }

    /// Decode the payload following `<prefix>:` back into a hash.
    fn decode_payload(&self, payload: &str) -> Result<NodeHash, MappingError> {
        NodeHash::from_hex(payload).ok_or_else(|| MappingError::InvalidRevisionId {
            id: format!("{}:{}", self.prefix(), payload),
            detail: "payload is not 40 hex characters".into(),
        })
    }
}

/// The first (and default) mapping version.
///
/// Encodes the hash as `hg-experimental:<40-hex>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExperimentalMapping;

/// Prefix of [`ExperimentalMapping`].
pub const EXPERIMENTAL_PREFIX: &str = "hg-experimental";

impl MappingVersion for ExperimentalMapping {
    fn prefix(&self) -> &'static str {
        EXPERIMENTAL_PREFIX
    }
}
