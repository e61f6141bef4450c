//! Translation between the flat-system and tree-system id spaces.
//!
//! Revision ids are translated through a registry of versioned, invertible
//! mapping schemes ([`registry::MappingRegistry`]); file ids are derived
//! from paths by a reversible escaping scheme ([`file_id`]). The
//! [`IdentityMapper`] ties both together behind one façade.

pub mod file_id;
pub mod mapper;
pub mod registry;
pub mod version;

pub use file_id::FileId;
pub use mapper::IdentityMapper;
pub use registry::MappingRegistry;
pub use version::{ExperimentalMapping, MappingVersion, EXPERIMENTAL_PREFIX};
