//! Path-derived file ids.
//!
//! The tree system needs a stable identifier per versioned path; the flat
//! system has none, so file ids are derived deterministically from the
//! UTF-8 path via a reversible escaping scheme: `_` → `__`, `/` → `_s`,
//! space → `_w`. The path root gets the fixed well-known id rather than
//! the empty-string encoding.

use std::fmt;

use serde::Serialize;

use crate::errors::MappingError;

/// Prefix carried by every path-derived file id.
pub const FILE_ID_PREFIX: &str = "hg:";

/// The fixed id of the tree root entry.
pub const TREE_ROOT_ID: &str = "TREE_ROOT";

/// A stable tree-system file identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(String);

impl FileId {
    /// The well-known root id.
    pub fn root() -> Self {
        FileId(TREE_ROOT_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == TREE_ROOT_ID
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape a path for embedding in a file id.
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '_' => out.push_str("__"),
            '/' => out.push_str("_s"),
            ' ' => out.push_str("_w"),
            other => out.push(other),
        }
    }
    out
}

/// Invert [`escape_path`]. Fails on any `_x` sequence that is not one of
/// the three defined escapes, and on a trailing `_`.
pub fn unescape_path(escaped: &str) -> Result<String, MappingError> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '_' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('_') => out.push('_'),
            Some('s') => out.push('/'),
            Some('w') => out.push(' '),
            Some(other) => {
                return Err(MappingError::MalformedFileId {
                    id: escaped.to_string(),
                    detail: format!("invalid escape sequence '_{}'", other),
                })
            }
            None => {
                return Err(MappingError::MalformedFileId {
                    id: escaped.to_string(),
                    detail: "trailing '_' with no escape code".into(),
                })
            }
        }
    }
    Ok(out)
}

/// Derive the file id for a path. The empty path maps to the well-known
/// root id, bypassing escaping.
pub fn file_id_for_path(path: &str) -> FileId {
    if path.is_empty() {
        return FileId::root();
    }
    FileId(format!("{}{}", FILE_ID_PREFIX, escape_path(path)))
}

/// Recover the path a file id was derived from. The root id maps to the
/// empty path.
pub fn path_for_file_id(id: &FileId) -> Result<String, MappingError> {
    if id.is_root() {
        return Ok(String::new());
    }
    let escaped = id
        .as_str()
        .strip_prefix(FILE_ID_PREFIX)
        .ok_or_else(|| MappingError::MalformedFileId {
            id: id.as_str().to_string(),
            detail: format!("missing '{}' prefix", FILE_ID_PREFIX),
        })?;
    unescape_path(escaped)
}
