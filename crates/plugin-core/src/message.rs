use core::fmt;

/// Kind of media attached to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an attachment that still lives on the transport side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub mimetype: Option<String>,
}

/// A message received from the chat network.
///
/// Built by the transport for every event that carries a message payload and
/// dropped once dispatch finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Transport message id, used to fetch attachments.
    pub id: String,
    /// Chat the message came from; replies go back here.
    pub chat: String,
    pub push_name: Option<String>,
    pub text: String,
    pub media: Option<MediaRef>,
    pub from_me: bool,
}

impl InboundMessage {
    #[must_use]
    pub fn media_kind(&self) -> Option<MediaKind> {
        self.media.as_ref().map(|m| m.kind)
    }
}

/// Payloads the bot can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// WebP sticker bytes.
    Sticker(Vec<u8>),
    /// A video the gateway fetches from a remote URL.
    Video { url: String, caption: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Composing,
}

impl Presence {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Composing => "composing",
        }
    }
}
