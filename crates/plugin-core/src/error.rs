use core::{fmt, time::Duration};

use thiserror::Error;

/// Upper bound for any HTTP round trip (media fetch, resolver, AI relay).
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound for one transcoder run.
pub const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(60);
/// Default cap on a fetched attachment.
pub const MAX_MEDIA_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClass {
    MediaFetch,
    Transcode,
    Resolve,
    Relay,
}

impl fmt::Display for CallClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MediaFetch => "media fetch",
            Self::Transcode => "transcode",
            Self::Resolve => "download resolution",
            Self::Relay => "AI relay",
        })
    }
}

/// Failures of the command pipeline. Each one is turned into a fixed notice
/// for the user by the plugin that hit it.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("media exceeds the {limit} byte limit")]
    MediaTooLarge { limit: usize },

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("resolution failed: {0}")]
    Resolution(String),

    #[error("AI backend error: {0}")]
    Backend(String),

    #[error("{call} timed out after {after:?}")]
    Timeout { call: CallClass, after: Duration },
}

impl BotError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Run `fut` under `after`, mapping an elapsed deadline to [`BotError::Timeout`].
///
/// # Errors
///
/// Returns the inner error, or `Timeout` when the deadline passes first.
pub async fn with_timeout<T, F>(call: CallClass, after: Duration, fut: F) -> Result<T, BotError>
where
    F: Future<Output = Result<T, BotError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .unwrap_or(Err(BotError::Timeout { call, after }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_deadline_maps_to_timeout() {
        let res: Result<(), BotError> = with_timeout(CallClass::Relay, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = res.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "AI relay timed out after 10ms");
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let res: Result<(), BotError> = with_timeout(CallClass::Resolve, HTTP_TIMEOUT, async {
            Err(BotError::Resolution("boom".to_owned()))
        })
        .await;
        assert!(matches!(res, Err(BotError::Resolution(msg)) if msg == "boom"));
    }
}
