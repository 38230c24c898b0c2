//! Request-scoped references to remote objects.

use object_store::path::Path;
use std::fmt;

/// Opaque object identifier taken verbatim from the URL after `/files/`.
///
/// Percent-decoding is left to the HTTP layer; nested keys such as
/// `runs/2024/sample.bam` are carried through untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ObjectPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl From<&str> for ObjectPath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

/// A resolved object that existed when it was probed.
///
/// Owns no payload, only the backend location and the size reported by the
/// metadata probe. Handles are never reused across requests.
#[derive(Clone, Debug)]
pub struct ObjectHandle {
    /// Logical path the client asked for.
    pub path: ObjectPath,

    /// Fully-qualified backend location (store prefix + key).
    pub location: Path,

    size: u64,
}

impl ObjectHandle {
    pub fn new(path: ObjectPath, location: Path, size: u64) -> Self {
        Self {
            path,
            location,
            size,
        }
    }

    /// Size in bytes, as reported by the probe.
    pub fn size(&self) -> u64 {
        self.size
    }
}
