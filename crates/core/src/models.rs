//! Domain model types used throughout HgBzrSync.
//!
//! These types bridge the mapping layer, the discovery engine, the tree
//! synthesizer, and the repository collaborators. Identifiers from the two
//! id spaces are kept strictly apart: [`NodeHash`] is a flat-system
//! (Mercurial) identifier, [`RevisionId`] is a tree-system identifier, and
//! only the mapping layer converts between them.

use std::fmt;

use chrono::{DateTime, FixedOffset, TimeZone};
use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// NodeHash — flat-system revision / file identifier
// ---------------------------------------------------------------------------

/// A 20-byte flat-system content hash.
///
/// The all-zero hash is the flat system's "no revision" sentinel and maps
/// to [`RevisionId::Null`] in the tree id space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHash([u8; 20]);

impl NodeHash {
    /// The flat-system sentinel: twenty zero bytes.
    pub const NULL: NodeHash = NodeHash([0; 20]);

    /// Wrap a raw 20-byte hash.
    pub const fn from_array(bytes: [u8; 20]) -> Self {
        NodeHash(bytes)
    }

    /// Parse from a 20-byte binary slice. Returns `None` on length mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 20] = bytes.try_into().ok()?;
        Some(NodeHash(arr))
    }

    /// Parse from a 40-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 40 {
            return None;
        }
        let mut arr = [0u8; 20];
        hex::decode_to_slice(s, &mut arr).ok()?;
        Some(NodeHash(arr))
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase 40-character hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether this is the all-zero sentinel.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash({})", self.to_hex())
    }
}

impl Serialize for NodeHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// RevisionId — tree-system revision identifier
// ---------------------------------------------------------------------------

/// A tree-system revision identifier.
///
/// Modeled as a tagged value rather than a raw string so that mapping
/// failures are exhaustive and compiler-checked. `Mapped` ids are only
/// constructed by the mapping layer; the `version` field is the mapping
/// version prefix under which the embedded hash was encoded.
///
/// The derived total order (`Null` first, then by version, then by hash
/// bytes) is the deterministic tie-break used during tree synthesis when
/// neither of two candidate revisions is an ancestor of the other.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RevisionId {
    /// The tree system's "no revision" sentinel. Renders as `null:`.
    Null,
    /// A flat-system hash embedded under a mapping version.
    Mapped { version: String, hash: NodeHash },
}

/// Textual rendering of the tree-system sentinel revision.
pub const NULL_REVISION: &str = "null:";

impl RevisionId {
    /// Whether this is the sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, RevisionId::Null)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionId::Null => f.write_str(NULL_REVISION),
            RevisionId::Mapped { version, hash } => write!(f, "{}:{}", version, hash),
        }
    }
}

impl fmt::Debug for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevisionId({})", self)
    }
}

impl Serialize for RevisionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Entry kinds and mode decoding
// ---------------------------------------------------------------------------

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    TreeReference,
}

/// Mode bits selecting directory entries.
pub const MODE_DIRECTORY: u32 = 0o040000;
/// Mode bits selecting regular files.
pub const MODE_FILE: u32 = 0o100000;
/// Mode bits selecting symlinks.
pub const MODE_SYMLINK: u32 = 0o120000;
/// Mode bits selecting nested-tree references.
pub const MODE_TREE_REFERENCE: u32 = 0o160000;

/// Mask isolating the kind field of a packed mode.
const MODE_KIND_MASK: u32 = 0o170000;

impl EntryKind {
    /// Decode the kind field of a packed file mode.
    ///
    /// Returns `None` for encodings that select no known kind; callers
    /// treat that as malformed input, not a recoverable condition.
    pub fn from_mode(mode: u32) -> Option<EntryKind> {
        match mode & MODE_KIND_MASK {
            MODE_DIRECTORY => Some(EntryKind::Directory),
            MODE_FILE => Some(EntryKind::File),
            MODE_SYMLINK => Some(EntryKind::Symlink),
            MODE_TREE_REFERENCE => Some(EntryKind::TreeReference),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Directory => write!(f, "directory"),
            Self::Symlink => write!(f, "symlink"),
            Self::TreeReference => write!(f, "tree_reference"),
        }
    }
}

// ---------------------------------------------------------------------------
// Manifests
// ---------------------------------------------------------------------------

/// One path's entry in a flat manifest: content hash plus packed mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// Hash of the content stored at this path.
    pub node: NodeHash,
    /// Packed file mode.
    pub mode: u32,
}

impl ManifestEntry {
    /// Decode the entry kind from the mode bits.
    pub fn kind(&self) -> Option<EntryKind> {
        EntryKind::from_mode(self.mode)
    }

    /// Whether the entry carries an executable bit (files only).
    pub fn executable(&self) -> bool {
        self.kind() == Some(EntryKind::File) && self.mode & 0o111 != 0
    }
}

/// A flat mapping from path to [`ManifestEntry`], total only at the single
/// revision it describes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    entries: std::collections::BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(path.into(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<ManifestEntry> {
        self.entries.remove(path)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Branch segments
// ---------------------------------------------------------------------------

/// A maximal linear run of flat-system history.
///
/// `head` is the newest revision of the run, `root` the oldest, and
/// `parent1` / `parent2` are the parents of `root` (the sentinel when
/// absent). Segments are produced by the source's `branches` query and
/// consumed by the discovery engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BranchSegment {
    pub head: NodeHash,
    pub root: NodeHash,
    pub parent1: NodeHash,
    pub parent2: NodeHash,
}

// ---------------------------------------------------------------------------
// Changelog entries and revision metadata
// ---------------------------------------------------------------------------

/// The flat system's record of one revision, as returned by the source.
///
/// `tz_offset_secs` follows the flat system's convention: seconds west of
/// UTC. [`RevisionMetadata`] flips the sign to the tree system's
/// east-positive convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangelogEntry {
    pub committer: String,
    pub message: String,
    pub timestamp: i64,
    pub tz_offset_secs: i32,
    /// Paths touched by this revision, as recorded by the flat system.
    pub files: Vec<String>,
}

/// Tree-system-facing metadata for one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionMetadata {
    pub id: RevisionId,
    /// Parents in the tree id space; sentinel parents are omitted.
    pub parent_ids: Vec<RevisionId>,
    pub committer: String,
    pub message: String,
    /// Seconds since the epoch.
    pub timestamp: i64,
    /// Seconds east of UTC.
    pub tz_offset_secs: i32,
}

impl RevisionMetadata {
    /// Commit time as a zoned timestamp, if the stored offset is sane.
    pub fn when(&self) -> Option<DateTime<FixedOffset>> {
        let tz = FixedOffset::east_opt(self.tz_offset_secs)?;
        tz.timestamp_opt(self.timestamp, 0).single()
    }
}

// ---------------------------------------------------------------------------
// Fetch statistics
// ---------------------------------------------------------------------------

/// Statistics from a single fetch operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchStats {
    /// Size of the frontier returned by discovery.
    pub frontier_size: usize,
    /// Revisions actually copied into the target.
    pub revisions_fetched: usize,
    /// File texts copied into the target.
    pub texts_copied: usize,
    pub started_at: String,
    pub completed_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_hash_hex_round_trip() {
        let hex = "0123456789abcdef0123456789abcdef01234567";
        let hash = NodeHash::from_hex(hex).unwrap();
        assert_eq!(hash.to_hex(), hex);
        assert_eq!(NodeHash::from_bytes(hash.as_bytes()), Some(hash));
        assert!(!hash.is_null());
    }

    #[test]
    fn test_node_hash_rejects_bad_input() {
        assert!(NodeHash::from_hex("abcd").is_none());
        assert!(NodeHash::from_hex(&"zz".repeat(20)).is_none());
        assert!(NodeHash::from_bytes(&[0u8; 19]).is_none());
    }

    #[test]
    fn test_null_sentinel() {
        assert!(NodeHash::NULL.is_null());
        assert_eq!(NodeHash::NULL.to_hex(), "0".repeat(40));
        assert!(RevisionId::Null.is_null());
        assert_eq!(RevisionId::Null.to_string(), "null:");
    }

    #[test]
    fn test_revision_id_ordering() {
        let a = RevisionId::Mapped {
            version: "hg-experimental".into(),
            hash: NodeHash::from_array([1; 20]),
        };
        let b = RevisionId::Mapped {
            version: "hg-experimental".into(),
            hash: NodeHash::from_array([2; 20]),
        };
        assert!(RevisionId::Null < a);
        assert!(a < b);
    }

    #[test]
    fn test_mode_decoding() {
        assert_eq!(EntryKind::from_mode(0o100644), Some(EntryKind::File));
        assert_eq!(EntryKind::from_mode(0o100755), Some(EntryKind::File));
        assert_eq!(EntryKind::from_mode(0o040000), Some(EntryKind::Directory));
        assert_eq!(EntryKind::from_mode(0o120000), Some(EntryKind::Symlink));
        assert_eq!(
            EntryKind::from_mode(0o160000),
            Some(EntryKind::TreeReference)
        );
        assert_eq!(EntryKind::from_mode(0o777777), None);
    }

    #[test]
    fn test_manifest_entry_executable() {
        let plain = ManifestEntry {
            node: NodeHash::from_array([3; 20]),
            mode: 0o100644,
        };
        let exec = ManifestEntry {
            node: NodeHash::from_array([3; 20]),
            mode: 0o100755,
        };
        let link = ManifestEntry {
            node: NodeHash::from_array([3; 20]),
            mode: 0o120777,
        };
        assert!(!plain.executable());
        assert!(exec.executable());
        // symlinks are never reported executable, whatever their bits
        assert!(!link.executable());
    }

    #[test]
    fn test_revision_metadata_when() {
        let meta = RevisionMetadata {
            id: RevisionId::Null,
            parent_ids: vec![],
            committer: "alice".into(),
            message: "m".into(),
            timestamp: 1_000_000,
            tz_offset_secs: 3600,
        };
        let when = meta.when().unwrap();
        assert_eq!(when.timestamp(), 1_000_000);
        assert_eq!(when.offset().local_minus_utc(), 3600);
    }
}
