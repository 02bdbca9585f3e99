//! In-memory transport and context builders for tests.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures_util::stream;

use crate::{
    InboundMessage, MediaKind, MediaRef, MediaStream, Outbound, PluginContext, Presence, Transport,
};

/// Records everything sent through it; media is served from `media_chunks`.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Outbound)>>,
    presences: Mutex<Vec<(String, Presence)>>,
    media_chunks: Option<Vec<Vec<u8>>>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_media(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            media_chunks: Some(chunks),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, Outbound)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|(_, out)| match out {
                Outbound::Text(t) => Some(t),
                Outbound::Sticker(_) | Outbound::Video { .. } => None,
            })
            .collect()
    }

    pub fn presences(&self) -> Vec<(String, Presence)> {
        self.presences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, chat: &str, message: Outbound) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((chat.to_owned(), message));
        Ok(())
    }

    async fn send_presence(&self, chat: &str, presence: Presence) -> Result<()> {
        self.presences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((chat.to_owned(), presence));
        Ok(())
    }

    async fn media_stream(&self, _message: &InboundMessage, _kind: MediaKind) -> Result<MediaStream> {
        let chunks = self
            .media_chunks
            .clone()
            .ok_or_else(|| anyhow!("media expired"))?;
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}

#[must_use]
pub fn text_message(text: &str) -> InboundMessage {
    InboundMessage {
        id: "MSG1".to_owned(),
        chat: "15550001111@s.whatsapp.net".to_owned(),
        push_name: Some("Tester".to_owned()),
        text: text.to_owned(),
        media: None,
        from_me: false,
    }
}

#[must_use]
pub fn media_message(text: &str, kind: MediaKind) -> InboundMessage {
    InboundMessage {
        media: Some(MediaRef {
            kind,
            mimetype: None,
        }),
        ..text_message(text)
    }
}

#[must_use]
pub fn context(transport: Arc<RecordingTransport>, message: InboundMessage) -> PluginContext {
    PluginContext {
        transport,
        message: Arc::new(message),
    }
}
