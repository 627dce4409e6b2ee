//! Track references.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Opaque, immutable reference to a playable audio item.
///
/// The core never inspects it beyond handing the path to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRef(PathBuf);

impl TrackRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// File stem, used as a display fallback when no tags are available.
    pub fn display_name(&self) -> String {
        self.0
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.to_string_lossy().into_owned())
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&str> for TrackRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TrackRef {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<PathBuf> for TrackRef {
    fn from(p: PathBuf) -> Self {
        Self(p)
    }
}

impl From<&Path> for TrackRef {
    fn from(p: &Path) -> Self {
        Self::new(p)
    }
}

impl AsRef<Path> for TrackRef {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}
