use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::{InboundMessage, MediaKind, Outbound, Presence};

/// Chunked attachment content as produced by the transport.
pub type MediaStream = BoxStream<'static, Result<Vec<u8>>>;

/// Outbound half of the messaging transport.
///
/// Implementations own the connection to the chat network; the dispatcher and
/// plugins only ever see this capability.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, chat: &str, message: Outbound) -> Result<()>;

    async fn send_presence(&self, chat: &str, presence: Presence) -> Result<()>;

    /// Open a stream over the decrypted content of the attachment on `message`.
    async fn media_stream(&self, message: &InboundMessage, kind: MediaKind) -> Result<MediaStream>;
}
