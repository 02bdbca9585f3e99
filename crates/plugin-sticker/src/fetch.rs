use core::time::Duration;

use futures_util::StreamExt as _;
use plugin_core::error::{HTTP_TIMEOUT, MAX_MEDIA_BYTES, with_timeout};
use plugin_core::{BotError, CallClass, InboundMessage, MediaKind, Transport};

/// Raw attachment bytes, consumed once by the transcoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBuffer {
    pub kind: MediaKind,
    pub mimetype: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub max_bytes: usize,
    pub timeout: Duration,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_bytes: MAX_MEDIA_BYTES,
            timeout: HTTP_TIMEOUT,
        }
    }
}

/// Download the `kind` attachment of `message`, chunk by chunk.
///
/// # Errors
///
/// `MediaUnavailable` when the message has no such attachment or the transport
/// cannot produce it, `MediaTooLarge` once the running total passes
/// `limits.max_bytes`, `Timeout` past `limits.timeout`.
pub async fn fetch(
    transport: &dyn Transport,
    message: &InboundMessage,
    kind: MediaKind,
    limits: FetchLimits,
) -> Result<MediaBuffer, BotError> {
    if message.media_kind() != Some(kind) {
        return Err(BotError::MediaUnavailable(format!(
            "message {} carries no {kind}",
            message.id
        )));
    }

    with_timeout(CallClass::MediaFetch, limits.timeout, async {
        let mut stream = transport
            .media_stream(message, kind)
            .await
            .map_err(|e| BotError::MediaUnavailable(format!("{e:#}")))?;

        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| BotError::MediaUnavailable(format!("{e:#}")))?;
            if bytes.len() + chunk.len() > limits.max_bytes {
                return Err(BotError::MediaTooLarge {
                    limit: limits.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(BotError::MediaUnavailable("empty attachment".to_owned()));
        }

        Ok(MediaBuffer {
            kind,
            mimetype: message.media.as_ref().and_then(|m| m.mimetype.clone()),
            bytes,
        })
    })
    .await
}
