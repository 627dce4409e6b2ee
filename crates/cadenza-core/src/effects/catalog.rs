//! File catalog: find candidate tracks under a music folder.
//!
//! Extension matching is only a first filter. A file that passes it can
//! still fail to decode; the engine rejects those at load time.

use std::io;
use std::path::Path;

use crate::models::TrackRef;

/// Supported audio extensions (lowercase, without the dot).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "ogg"];

const MAX_SCAN_DEPTH: usize = 32;

/// True if the path carries an allow-listed audio extension.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collect supported files under `dir`, sorted by path.
///
/// Directory symlinks are not followed. Unreadable subdirectories are
/// skipped with a warning; a missing or non-directory root is an error.
pub fn scan_dir(dir: &Path) -> io::Result<Vec<TrackRef>> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("folder does not exist: {}", dir.display()),
        ));
    }
    let mut found = Vec::new();
    scan_inner(dir, 0, &mut found);
    found.sort();
    Ok(found.into_iter().map(TrackRef::from).collect())
}

fn scan_inner(dir: &Path, depth: usize, found: &mut Vec<std::path::PathBuf>) {
    if depth > MAX_SCAN_DEPTH {
        log::warn!("cadenza: scan depth limit reached at {}", dir.display());
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("cadenza: cannot read {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_symlink = std::fs::symlink_metadata(&path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        if path.is_file() {
            if is_supported(&path) {
                found.push(path);
            }
        } else if path.is_dir() && !is_symlink {
            scan_inner(&path, depth + 1, found);
        }
    }
}

/// Expand a mix of files and folders into one ordered track list.
///
/// Folders are scanned in place; explicit files are kept even when their
/// extension is not allow-listed, since the backend has the final word.
pub fn collect(inputs: &[impl AsRef<Path>]) -> io::Result<Vec<TrackRef>> {
    let mut tracks = Vec::new();
    for input in inputs {
        let path = input.as_ref();
        if path.is_dir() {
            tracks.extend(scan_dir(path)?);
        } else {
            tracks.push(TrackRef::from(path));
        }
    }
    Ok(tracks)
}
