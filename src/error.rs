//! Error types shared by the poster core.

use std::path::PathBuf;

use thiserror::Error;

/// Settings could not be turned into a usable [`Settings`](crate::config::Settings).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither the user nor the bundled settings file could be read.
    #[error("no readable settings file (tried {})", join_paths(.0))]
    NotFound(Vec<PathBuf>),

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Credential or channel is empty.
    #[error("`{0}` must be set")]
    MissingField(&'static str),

    #[error("min delay ({min} min) is greater than max delay ({max} min)")]
    DelayRange { min: u32, max: u32 },
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The watched folder could not be listed.
#[derive(Debug, Error)]
#[error("failed to scan {}: {source}", .path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A persistent write was refused or failed.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Write skipped, nothing was touched.
    #[error("not enough free space for {}: {available} bytes available, {required} required", .path.display())]
    DiskSpace {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {0}")]
    Encode(String),
}

/// Failure of a single send call to the messaging backend.
#[derive(Debug, Error)]
pub enum SendError {
    /// Connect, read or write timed out. Retried by the delivery pipeline.
    #[error("request timed out")]
    Timeout,

    /// The Bot API answered with an error.
    #[error("telegram error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),
}

impl SendError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SendError::Timeout)
    }
}

impl From<reqwest::Error> for SendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SendError::Timeout
        } else {
            SendError::Http(e)
        }
    }
}

/// A settings change was refused.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Invalid(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("phrase list is empty")]
    EmptyPhraseList,
}

/// Delivery aborted before anything was sent.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no deliverable media in group")]
    NoDeliverableMedia,

    #[error(transparent)]
    Caption(#[from] CaptionError),
}
