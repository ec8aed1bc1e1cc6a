use async_trait::async_trait;

use crate::{error::SendError, media::MediaItem};

/// Messaging service the delivery pipeline posts to.
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    /// Post `items` as one message to `channel_id`.
    /// `caption` goes on the first item.
    ///
    /// `items` is never empty and never longer than a chunk.
    async fn send_media_batch(
        &self,
        channel_id: &str,
        items: &[MediaItem],
        caption: Option<&str>,
    ) -> Result<(), SendError>;

    /// Bot name, used to verify the credential at start.
    async fn get_identity(&self) -> Result<String, SendError>;
}
