//! Watched folder scanning.
//!
//! Every media file directly in the folder is its own post; every subfolder
//! is one post made of the media files directly inside it. Oldest entries
//! come first.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use crate::{
    error::ScanError,
    media::{MediaKind, PostGroup},
};

#[derive(Debug)]
struct Entry {
    created: SystemTime,
    path: PathBuf,
    is_dir: bool,
}

pub fn scan(folder: &Path) -> Result<Vec<PostGroup>, ScanError> {
    let read_dir = fs::read_dir(folder).map_err(|source| ScanError {
        path: folder.to_path_buf(),
        source,
    })?;

    let mut entries = vec![];

    for entry in read_dir {
        let entry = entry.map_err(|source| ScanError {
            path: folder.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        // Follows symlinks, a link to an album is an album.
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                debug!("skipping {}: {}", path.display(), e);
                continue;
            }
        };

        entries.push(Entry {
            created: metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(UNIX_EPOCH),
            path,
            is_dir: metadata.is_dir(),
        });
    }

    sort_oldest_first(&mut entries);

    let mut groups = vec![];

    for entry in entries {
        if entry.is_dir {
            let files = media_in(&entry.path);
            if files.is_empty() {
                debug!("no media in {}", entry.path.display());
            } else {
                groups.push(PostGroup {
                    origin: entry.path,
                    files,
                });
            }
        } else if MediaKind::of(&entry.path).is_some() {
            groups.push(PostGroup::single(entry.path));
        } else {
            debug!("not media: {}", entry.path.display());
        }
    }

    Ok(groups)
}

fn sort_oldest_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.path.cmp(&b.path)));
}

/// Direct media files of `dir`, sorted by name. Unreadable subfolders are empty.
fn media_in(dir: &Path) -> Vec<PathBuf> {
    let read_dir = match fs::read_dir(dir) {
        Ok(r) => r,
        Err(e) => {
            debug!("skipping {}: {}", dir.display(), e);
            return vec![];
        }
    };

    let mut files: Vec<PathBuf> = read_dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && MediaKind::of(p).is_some())
        .collect();
    files.sort();

    files
}
