use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use lazy_static::lazy_static;

use crate::filter::extension_of;

lazy_static! {
    /// Built-in table of extensions that can be posted, independent of
    /// the user's white/black lists.
    static ref MEDIA_KINDS: HashMap<&'static str, MediaKind> = HashMap::from([
        (".jpg", MediaKind::Photo),
        (".jpeg", MediaKind::Photo),
        (".png", MediaKind::Photo),
        (".mp4", MediaKind::Video),
    ]);
}

/// Kind of media item, as understood by the Bot API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    /// Photo. .png, .jpeg or .jpg (NOT GIF)
    Photo,
    /// Video. .mp4 only
    Video,
}

impl MediaKind {
    pub fn of(path: &Path) -> Option<Self> {
        extension_of(path).and_then(|ext| MEDIA_KINDS.get(ext.as_str()).copied())
    }

    /// `type` field of `InputMedia`, also the method suffix (`sendPhoto`).
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }
}

/// Files posted together as one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostGroup {
    /// Entry of the watched folder this group came from:
    /// the file itself or the subfolder.
    pub origin: PathBuf,
    /// May be empty after filtering.
    pub files: Vec<PathBuf>,
}

impl PostGroup {
    pub fn single(path: PathBuf) -> Self {
        Self {
            origin: path.clone(),
            files: vec![path],
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Media file loaded into memory, ready for upload.
#[derive(Clone, Debug)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub path: PathBuf,
    pub data: Vec<u8>,
}

impl MediaItem {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("file.{}", self.kind.as_str()))
    }
}
