//! Delivery of one [`PostGroup`] to the channel.
//!
//! Build: filter and load the group's files. Send: post the batch in chunks,
//! retrying timeouts per chunk. Cleanup: on full success remove every file of
//! the original group.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use rand::RngCore;
use tokio::{fs, time::sleep};

use crate::{
    backend::MessagingBackend,
    caption::compose_caption,
    config::Settings,
    error::{DeliveryError, SendError},
    events::Observer,
    filter::is_allowed,
    media::{MediaItem, MediaKind, PostGroup},
};

/// Bot API limit of items per media group.
pub const MAX_GROUP_ITEMS: usize = 10;

#[derive(Clone, Debug)]
pub struct DeliveryPolicy {
    pub chunk_size: usize,
    /// Pause between two chunks of one post.
    pub chunk_cooldown: Duration,
    /// Total attempts per send call, first one included.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            chunk_size: MAX_GROUP_ITEMS,
            chunk_cooldown: Duration::from_secs(30),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Fatal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryAttempt {
    /// 0-based chunk index.
    pub chunk: usize,
    /// 1-based attempt number within the chunk.
    pub ordinal: u32,
    pub outcome: AttemptOutcome,
}

/// Why a file of the group was left out of the batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Rejected by the white/black lists.
    Filtered,
    /// Passed the lists but can't be posted as photo or video.
    Unsupported,
    /// Vanished since the scan.
    Missing,
    Unreadable(String),
}

#[derive(Debug)]
pub enum DeliveryOutcome {
    Succeeded,
    /// Earlier chunks are already in the channel.
    PartiallyFailed {
        chunks_sent: usize,
        chunks_total: usize,
        error: SendError,
    },
    Failed(SendError),
}

#[derive(Debug, Default)]
pub struct Cleanup {
    pub removed: Vec<PathBuf>,
    pub already_missing: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

#[derive(Debug)]
pub struct DeliveryReport {
    pub outcome: DeliveryOutcome,
    pub attempts: Vec<DeliveryAttempt>,
    pub sent: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
    pub cleanup: Cleanup,
}

impl DeliveryReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Succeeded)
    }
}

pub struct Delivery<'a, B: ?Sized> {
    backend: &'a B,
    observer: &'a dyn Observer,
    policy: &'a DeliveryPolicy,
}

impl<'a, B: MessagingBackend + ?Sized> Delivery<'a, B> {
    pub fn new(backend: &'a B, observer: &'a dyn Observer, policy: &'a DeliveryPolicy) -> Self {
        Self {
            backend,
            observer,
            policy,
        }
    }

    pub async fn deliver(
        &self,
        group: &PostGroup,
        settings: &Settings,
        phrases: &[String],
        rng: &mut (dyn RngCore + Send),
    ) -> Result<DeliveryReport, DeliveryError> {
        let (batch, skipped) = self.build(group, settings).await;

        if batch.is_empty() {
            self.observer.on_progress(0);
            self.observer.error("No media files to send.");
            return Err(DeliveryError::NoDeliverableMedia);
        }

        let caption = match compose_caption(rng, phrases, &settings.default_hashtags) {
            Ok(c) => c,
            Err(e) => {
                self.observer.on_progress(0);
                self.observer.error(&format!("Can't compose caption: {}", e));
                return Err(e.into());
            }
        };

        let mut report = DeliveryReport {
            outcome: DeliveryOutcome::Succeeded,
            attempts: vec![],
            sent: vec![],
            skipped,
            cleanup: Cleanup::default(),
        };

        let chunks: Vec<&[MediaItem]> = batch.chunks(self.policy.chunk_size.max(1)).collect();
        let total = chunks.len();
        if total > 1 {
            self.observer.warn(&format!(
                "Group has {} items, splitting into {} parts.",
                batch.len(),
                total
            ));
        }

        for (index, chunk) in chunks.into_iter().enumerate() {
            if index > 0 {
                sleep(self.policy.chunk_cooldown).await;
            }

            let chunk_caption = if index == 0 { Some(caption.as_str()) } else { None };

            match self
                .send_with_retry(&settings.channel_id, chunk, chunk_caption, index, &mut report.attempts)
                .await
            {
                Ok(()) => {
                    report.sent.extend(chunk.iter().map(|item| item.path.clone()));
                    if total > 1 {
                        self.observer.success(&format!("Sent part {} of {}.", index + 1, total));
                    }
                }
                Err(error) => {
                    self.observer.error(&format!("Send failed: {}", error));
                    self.observer.error("Post was not sent. Files are kept.");
                    self.observer.on_progress(0);
                    report.outcome = if index == 0 {
                        DeliveryOutcome::Failed(error)
                    } else {
                        DeliveryOutcome::PartiallyFailed {
                            chunks_sent: index,
                            chunks_total: total,
                            error,
                        }
                    };
                    return Ok(report);
                }
            }
        }

        self.observer.success("Post sent.");

        // The whole group counts as consumed, skipped files included.
        report.cleanup = self.remove_files(group).await;
        self.observer.on_progress(0);

        Ok(report)
    }

    async fn build(&self, group: &PostGroup, settings: &Settings) -> (Vec<MediaItem>, Vec<(PathBuf, SkipReason)>) {
        let total = group.len();
        let mut batch = vec![];
        let mut skipped = vec![];

        for (i, path) in group.files.iter().enumerate() {
            match self.load(path, settings).await {
                Ok(item) => batch.push(item),
                Err(reason) => {
                    let message = match &reason {
                        SkipReason::Filtered => format!("File {} skipped (extension filter).", path.display()),
                        SkipReason::Unsupported => format!("Unsupported file type: {}. Skipping.", path.display()),
                        SkipReason::Missing => format!("File not found: {}. Skipping.", path.display()),
                        SkipReason::Unreadable(e) => format!("Can't open {}: {}. Skipping.", path.display(), e),
                    };
                    self.observer.warn(&message);
                    skipped.push((path.clone(), reason));
                }
            }

            self.observer.on_progress(percent(i + 1, total));
        }

        (batch, skipped)
    }

    async fn load(&self, path: &Path, settings: &Settings) -> Result<MediaItem, SkipReason> {
        if !is_allowed(path, &settings.whitelist, &settings.blacklist) {
            return Err(SkipReason::Filtered);
        }

        let kind = MediaKind::of(path).ok_or(SkipReason::Unsupported)?;

        let data = fs::read(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => SkipReason::Missing,
            _ => SkipReason::Unreadable(e.to_string()),
        })?;

        Ok(MediaItem {
            kind,
            path: path.to_path_buf(),
            data,
        })
    }

    /// Timeouts retry the same call; anything else gives up at once.
    async fn send_with_retry(
        &self,
        channel_id: &str,
        chunk: &[MediaItem],
        caption: Option<&str>,
        index: usize,
        attempts: &mut Vec<DeliveryAttempt>,
    ) -> Result<(), SendError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut ordinal = 0;

        loop {
            ordinal += 1;

            match self.backend.send_media_batch(channel_id, chunk, caption).await {
                Ok(()) => {
                    attempts.push(DeliveryAttempt {
                        chunk: index,
                        ordinal,
                        outcome: AttemptOutcome::Success,
                    });
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    attempts.push(DeliveryAttempt {
                        chunk: index,
                        ordinal,
                        outcome: AttemptOutcome::Timeout,
                    });
                    if ordinal >= max_attempts {
                        return Err(e);
                    }
                    self.observer.warn(&format!(
                        "Send timed out. Retrying, attempt {}/{}.",
                        ordinal + 1,
                        max_attempts
                    ));
                    sleep(self.policy.retry_backoff).await;
                }
                Err(e) => {
                    attempts.push(DeliveryAttempt {
                        chunk: index,
                        ordinal,
                        outcome: AttemptOutcome::Fatal,
                    });
                    return Err(e);
                }
            }
        }
    }

    async fn remove_files(&self, group: &PostGroup) -> Cleanup {
        let mut cleanup = Cleanup::default();

        for path in &group.files {
            match fs::remove_file(path).await {
                Ok(()) => {
                    self.observer.info(&format!("File {} deleted.", path.display()));
                    cleanup.removed.push(path.clone());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.observer.warn(&format!("File {} already deleted.", path.display()));
                    cleanup.already_missing.push(path.clone());
                }
                Err(e) => {
                    self.observer.error(&format!("Can't delete {}: {}", path.display(), e));
                    cleanup.failed.push((path.clone(), e.to_string()));
                }
            }
        }

        cleanup
    }
}

/// Whether the lists and the media table leave anything of `group` to post.
pub fn has_deliverable(group: &PostGroup, settings: &Settings) -> bool {
    group
        .files
        .iter()
        .any(|p| is_allowed(p, &settings.whitelist, &settings.blacklist) && MediaKind::of(p).is_some())
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (done.min(total) * 100 / total) as u8
}
