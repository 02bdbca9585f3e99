use std::sync::Arc;

use plugin_core::{InboundMessage, MediaKind, PluginContext, PluginRegistry, Transport, sanitize_line};
use plugin_downloader::Platform;
use tracing::{debug, info, warn};

const STICKER_TAG: &str = ".sticker";

/// What an inbound message asks for. Borrowed from the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Menu,
    Ping,
    Owner,
    /// Prompt text after the `.ai ` prefix, untrimmed.
    AskAi(&'a str),
    MakeSticker(MediaKind),
    Download(Platform, &'a str),
    Unrecognized,
}

impl<'a> Command<'a> {
    /// Classify already-trimmed `text`. First matching rule wins.
    #[must_use]
    pub fn parse(text: &'a str, media: Option<MediaKind>) -> Self {
        match text {
            ".menu" => return Self::Menu,
            ".ping" => return Self::Ping,
            ".owner" => return Self::Owner,
            _ => {}
        }
        if let Some(prompt) = text.strip_prefix(".ai ") {
            return Self::AskAi(prompt);
        }
        if let Some(kind) = media
            && text.contains(STICKER_TAG)
        {
            return Self::MakeSticker(kind);
        }
        for (prefix, platform) in [
            (".tt ", Platform::TikTok),
            (".ig ", Platform::Instagram),
            (".yt ", Platform::YouTube),
        ] {
            if text.starts_with(prefix) {
                return text
                    .split_whitespace()
                    .nth(1)
                    .map_or(Self::Unrecognized, |url| Self::Download(platform, url));
            }
        }
        Self::Unrecognized
    }

    /// Registry id of the plugin that serves this command.
    #[must_use]
    pub const fn plugin_id(&self) -> Option<&'static str> {
        match *self {
            Self::Menu => Some("menu"),
            Self::Ping => Some("ping"),
            Self::Owner => Some("owner"),
            Self::AskAi(_) => Some("ai"),
            Self::MakeSticker(_) => Some("sticker"),
            Self::Download(platform, _) => Some(platform.id()),
            Self::Unrecognized => None,
        }
    }

    #[must_use]
    pub const fn args(&self) -> &'a str {
        match *self {
            Self::AskAi(prompt) => prompt,
            Self::Download(_, url) => url,
            Self::MakeSticker(kind) => kind.as_str(),
            Self::Menu | Self::Ping | Self::Owner | Self::Unrecognized => "",
        }
    }
}

/// Routes one message to at most one plugin. Holds no per-message state, so a
/// single instance is shared by every handler task.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    registry: Arc<PluginRegistry>,
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<PluginRegistry>) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Handle `message` to completion. Plugin failures are logged, never raised.
    pub async fn handle(&self, message: InboundMessage) {
        let text = message.text.trim();
        info!(
            chat = %message.chat,
            from = ?message.push_name,
            media = ?message.media_kind(),
            text = %sanitize_line(text, 200),
            "Incoming message"
        );

        let command = Command::parse(text, message.media_kind());
        let Some(plugin_id) = command.plugin_id() else {
            debug!(chat = %message.chat, "No command matched");
            return;
        };
        let Some(entry) = self.registry.entry(plugin_id).await else {
            warn!(plugin = %plugin_id, "Command matched but plugin is not registered");
            return;
        };
        if !entry.spec.enabled {
            info!(plugin = %plugin_id, "Plugin disabled");
            return;
        }

        // Owned copy so the context can outlive the borrowed command.
        let args = command.args().to_owned();
        info!(plugin = %plugin_id, chat = %message.chat, ?command, "Parsed command");
        let ctx = PluginContext {
            transport: Arc::clone(&self.transport),
            message: Arc::new(message),
        };
        if let Err(e) = entry.plugin.run(&ctx, &args, &entry.spec).await {
            warn!(error = %e, plugin = %plugin_id, chat = %ctx.chat(), "Plugin failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use plugin_core::testing::{RecordingTransport, media_message, text_message};
    use plugin_core::{Outbound, PluginSpec};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn dispatcher_with(
        transport: &Arc<RecordingTransport>,
        specs: Vec<PluginSpec>,
    ) -> Dispatcher {
        let registry = crate::plugins::registry_from_specs(specs).await;
        Dispatcher::new(Arc::clone(transport) as Arc<dyn Transport>, registry)
    }

    fn owner_spec(owner: &str) -> PluginSpec {
        let mut spec = PluginSpec::new("owner");
        spec.config = serde_yaml::to_value(json!({ "owner": owner })).unwrap();
        spec
    }

    #[test]
    fn parse_exact_commands() {
        assert_eq!(Command::parse(".menu", None), Command::Menu);
        assert_eq!(Command::parse(".ping", None), Command::Ping);
        assert_eq!(Command::parse(".owner", None), Command::Owner);
        assert_eq!(Command::parse(".ping now", None), Command::Unrecognized);
        assert_eq!(Command::parse(".PING", None), Command::Unrecognized);
    }

    #[test]
    fn parse_ai_keeps_prompt_verbatim() {
        assert_eq!(Command::parse(".ai  two spaces", None), Command::AskAi(" two spaces"));
        assert_eq!(Command::parse(".ai", None), Command::Unrecognized);
        assert_eq!(Command::parse(".aiwhat", None), Command::Unrecognized);
    }

    #[test]
    fn parse_sticker_by_containment() {
        assert_eq!(
            Command::parse("please .sticker now", Some(MediaKind::Image)),
            Command::MakeSticker(MediaKind::Image)
        );
        assert_eq!(
            Command::parse("make.stickerplease", Some(MediaKind::Video)),
            Command::MakeSticker(MediaKind::Video)
        );
        assert_eq!(Command::parse(".sticker", None), Command::Unrecognized);
        assert_eq!(Command::parse("hello", Some(MediaKind::Image)), Command::Unrecognized);
    }

    #[test]
    fn parse_downloads_take_second_token() {
        assert_eq!(
            Command::parse(".tt https://example.com/v/1 extra", None),
            Command::Download(Platform::TikTok, "https://example.com/v/1")
        );
        assert_eq!(
            Command::parse(".ig   https://instagram.com/p/x", None),
            Command::Download(Platform::Instagram, "https://instagram.com/p/x")
        );
        assert_eq!(
            Command::parse(".yt notaurl", None),
            Command::Download(Platform::YouTube, "notaurl")
        );
        assert_eq!(Command::parse(".tt", None), Command::Unrecognized);
    }

    #[test]
    fn earlier_rules_win() {
        // `.ai` outranks the sticker rule even with media attached.
        assert_eq!(
            Command::parse(".ai make a .sticker", Some(MediaKind::Image)),
            Command::AskAi("make a .sticker")
        );
        // The sticker rule outranks downloads.
        assert_eq!(
            Command::parse(".tt .sticker", Some(MediaKind::Video)),
            Command::MakeSticker(MediaKind::Video)
        );
    }

    #[test]
    fn plugin_ids() {
        assert_eq!(Command::Download(Platform::YouTube, "u").plugin_id(), Some("youtube"));
        assert_eq!(Command::MakeSticker(MediaKind::Image).plugin_id(), Some("sticker"));
        assert_eq!(Command::Unrecognized.plugin_id(), None);
    }

    #[tokio::test]
    async fn ping_replies_exactly_once() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(&transport, Vec::new()).await;

        dispatcher.handle(text_message("  .ping  ")).await;

        assert_eq!(transport.texts(), vec!["Pong! 🏓".to_owned()]);
        assert!(transport.presences().is_empty());
    }

    #[tokio::test]
    async fn static_commands_are_idempotent() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(&transport, vec![owner_spec("Alice")]).await;

        for text in [".ping", ".menu", ".owner"] {
            dispatcher.handle(text_message(text)).await;
            dispatcher.handle(text_message(text)).await;
        }

        let texts = transport.texts();
        assert_eq!(texts.len(), 6);
        assert_eq!(texts[0], texts[1]);
        assert_eq!(texts[2], texts[3]);
        assert_eq!(texts[4], "Bot Owner:\nAlice");
        assert_eq!(texts[4], texts[5]);
    }

    #[tokio::test]
    async fn unmatched_text_sends_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(&transport, Vec::new()).await;

        dispatcher.handle(text_message("hello there")).await;
        dispatcher.handle(text_message("")).await;

        assert!(transport.sent().is_empty());
        assert!(transport.presences().is_empty());
    }

    #[tokio::test]
    async fn disabled_plugin_is_silent() {
        let transport = Arc::new(RecordingTransport::new());
        let mut spec = PluginSpec::new("ping");
        spec.enabled = false;
        let dispatcher = dispatcher_with(&transport, vec![spec]).await;

        dispatcher.handle(text_message(".ping")).await;

        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn ai_prompt_is_relayed_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(body_json(json!({ "message": " spaced prompt" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "reply": "ok" })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = Arc::new(RecordingTransport::new());
        let mut ai = PluginSpec::new("ai");
        ai.config = serde_yaml::to_value(json!({ "backend_url": server.uri() })).unwrap();
        let dispatcher = dispatcher_with(&transport, vec![ai]).await;

        dispatcher.handle(text_message(".ai  spaced prompt")).await;

        assert_eq!(transport.texts(), vec!["🧠 *AI Reply:*\nok".to_owned()]);
    }

    #[tokio::test]
    async fn sticker_failure_is_reported_not_raised() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(&transport, Vec::new()).await;

        dispatcher
            .handle(media_message("please .sticker now", MediaKind::Image))
            .await;

        assert_eq!(transport.texts(), vec![plugin_sticker::FETCH_FAILED.to_owned()]);
        assert!(!transport.sent().iter().any(|(_, o)| matches!(o, Outbound::Sticker(_))));
    }
}
