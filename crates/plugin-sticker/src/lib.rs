mod fetch;
mod transcode;

pub use fetch::{FetchLimits, MediaBuffer, fetch};
pub use transcode::{FfmpegTranscoder, StickerArtifact, StickerProfile, Transcoder};

use core::time::Duration;
use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use plugin_core::error::{HTTP_TIMEOUT, MAX_MEDIA_BYTES, TRANSCODE_TIMEOUT};
use plugin_core::factory::{PluginFactory, push_default};
use plugin_core::{BotError, Plugin, PluginContext, PluginSpec, send_sticker, send_text};

pub const FETCH_FAILED: &str = "❌ Could not download the media.";
pub const TOO_LARGE: &str = "❌ Media is too large to convert.";
pub const STICKER_FAILED: &str = "❌ Failed to create sticker.";

#[derive(Debug)]
pub struct StickerPlugin;

impl PluginFactory for StickerPlugin {
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        push_default(specs, PluginSpec::new("sticker"));
    }

    fn build(&self) -> Arc<dyn Plugin> {
        Arc::new(StickerTool::default())
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct StickerConfig {
    ffmpeg: String,
    max_media_bytes: usize,
    fetch_timeout_secs: u64,
    transcode_timeout_secs: u64,
    profile: StickerProfile,
    /// Where per-request temp files go; the system temp dir when unset.
    scratch_dir: Option<PathBuf>,
}

impl Default for StickerConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_owned(),
            max_media_bytes: MAX_MEDIA_BYTES,
            fetch_timeout_secs: HTTP_TIMEOUT.as_secs(),
            transcode_timeout_secs: TRANSCODE_TIMEOUT.as_secs(),
            profile: StickerProfile::default(),
            scratch_dir: None,
        }
    }
}

impl StickerConfig {
    fn from_spec(spec: &PluginSpec) -> Self {
        if spec.config.is_null() {
            return Self::default();
        }
        serde_yaml::from_value(spec.config.clone()).unwrap_or_else(|err| {
            warn!(plugin = %spec.id, error = %err, "Invalid sticker config, using defaults");
            Self::default()
        })
    }

    const fn limits(&self) -> FetchLimits {
        FetchLimits {
            max_bytes: self.max_media_bytes,
            timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }
}

/// Turns an attached image or short video into a WebP sticker.
#[derive(Debug, Default)]
pub struct StickerTool {
    /// Overrides the ffmpeg transcoder built from config.
    transcoder: Option<Arc<dyn Transcoder>>,
}

impl StickerTool {
    #[must_use]
    pub fn with_transcoder(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            transcoder: Some(transcoder),
        }
    }

    fn transcoder(&self, cfg: &StickerConfig) -> Arc<dyn Transcoder> {
        self.transcoder.clone().unwrap_or_else(|| {
            let mut ffmpeg = FfmpegTranscoder::new(&cfg.ffmpeg)
                .with_timeout(Duration::from_secs(cfg.transcode_timeout_secs))
                .with_profile(cfg.profile);
            if let Some(dir) = &cfg.scratch_dir {
                ffmpeg = ffmpeg.with_scratch_dir(dir);
            }
            Arc::new(ffmpeg)
        })
    }
}

const fn fetch_notice(err: &BotError) -> &'static str {
    match err {
        BotError::MediaTooLarge { .. } => TOO_LARGE,
        _ => FETCH_FAILED,
    }
}

#[async_trait]
impl Plugin for StickerTool {
    fn id(&self) -> &'static str {
        "sticker"
    }
    fn help(&self) -> &'static str {
        "Reply to an image or short video with .sticker"
    }

    async fn run(&self, ctx: &PluginContext, _args: &str, spec: &PluginSpec) -> Result<()> {
        let Some(kind) = ctx.message.media_kind() else {
            return send_text(ctx, FETCH_FAILED).await;
        };
        let cfg = StickerConfig::from_spec(spec);

        let buffer = match fetch(ctx.transport.as_ref(), &ctx.message, kind, cfg.limits()).await {
            Ok(buffer) => buffer,
            Err(err) => {
                warn!(plugin = %self.id(), chat = %ctx.chat(), error = %err, "Media fetch failed");
                return send_text(ctx, fetch_notice(&err)).await;
            }
        };

        let size = buffer.bytes.len();
        match self.transcoder(&cfg).to_sticker(buffer).await {
            Ok(sticker) => {
                info!(plugin = %self.id(), chat = %ctx.chat(), %kind, input = size, output = sticker.bytes.len(), "Sticker created");
                send_sticker(ctx, sticker.bytes).await
            }
            Err(err) => {
                warn!(plugin = %self.id(), chat = %ctx.chat(), %kind, error = %err, "Sticker conversion failed");
                send_text(ctx, STICKER_FAILED).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use plugin_core::testing::{RecordingTransport, context, media_message, text_message};
    use plugin_core::{MediaKind, Outbound};

    use super::*;

    /// Echoes a fixed WebP payload and remembers what it was given.
    #[derive(Debug, Default)]
    struct FakeTranscoder {
        seen: Mutex<Vec<MediaBuffer>>,
        fail: bool,
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn to_sticker(&self, buffer: MediaBuffer) -> Result<StickerArtifact, BotError> {
            self.seen.lock().unwrap().push(buffer);
            if self.fail {
                return Err(BotError::Transcode("bad input".to_owned()));
            }
            Ok(StickerArtifact {
                bytes: b"RIFF....WEBP".to_vec(),
            })
        }
    }

    fn spec_with_cap(max: usize) -> PluginSpec {
        let mut spec = PluginSpec::new("sticker");
        spec.config = serde_yaml::from_str(&format!("max_media_bytes: {max}")).unwrap();
        spec
    }

    #[tokio::test]
    async fn image_becomes_exactly_one_sticker() {
        let transport = Arc::new(RecordingTransport::with_media(vec![b"jpegdata".to_vec()]));
        let ctx = context(
            Arc::clone(&transport),
            media_message("please .sticker now", MediaKind::Image),
        );
        let fake = Arc::new(FakeTranscoder::default());

        StickerTool::with_transcoder(fake.clone())
            .run(&ctx, "", &PluginSpec::new("sticker"))
            .await
            .unwrap();

        assert_eq!(
            transport.sent(),
            vec![(ctx.chat().to_owned(), Outbound::Sticker(b"RIFF....WEBP".to_vec()))]
        );
        let seen = fake.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, MediaKind::Image);
        assert_eq!(seen[0].bytes, b"jpegdata");
    }

    #[tokio::test]
    async fn video_is_passed_as_video() {
        let transport = Arc::new(RecordingTransport::with_media(vec![b"mp4".to_vec()]));
        let ctx = context(Arc::clone(&transport), media_message(".sticker", MediaKind::Video));
        let fake = Arc::new(FakeTranscoder::default());

        StickerTool::with_transcoder(fake.clone())
            .run(&ctx, "", &PluginSpec::new("sticker"))
            .await
            .unwrap();

        assert_eq!(fake.seen.lock().unwrap()[0].kind, MediaKind::Video);
        assert!(matches!(transport.sent()[0].1, Outbound::Sticker(_)));
    }

    #[tokio::test]
    async fn oversized_media_is_refused() {
        let transport = Arc::new(RecordingTransport::with_media(vec![vec![0; 64]]));
        let ctx = context(Arc::clone(&transport), media_message(".sticker", MediaKind::Image));
        let fake = Arc::new(FakeTranscoder::default());

        StickerTool::with_transcoder(fake.clone())
            .run(&ctx, "", &spec_with_cap(16))
            .await
            .unwrap();

        assert_eq!(transport.texts(), vec![TOO_LARGE.to_owned()]);
        assert!(fake.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_media_reports_download_failure() {
        let transport = Arc::new(RecordingTransport::new());
        let ctx = context(Arc::clone(&transport), media_message(".sticker", MediaKind::Image));

        StickerTool::with_transcoder(Arc::new(FakeTranscoder::default()))
            .run(&ctx, "", &PluginSpec::new("sticker"))
            .await
            .unwrap();

        assert_eq!(transport.texts(), vec![FETCH_FAILED.to_owned()]);
    }

    #[tokio::test]
    async fn transcode_failure_reports_sticker_failure() {
        let transport = Arc::new(RecordingTransport::with_media(vec![b"x".to_vec()]));
        let ctx = context(Arc::clone(&transport), media_message(".sticker", MediaKind::Video));
        let fake = Arc::new(FakeTranscoder {
            fail: true,
            ..FakeTranscoder::default()
        });

        StickerTool::with_transcoder(fake)
            .run(&ctx, "", &PluginSpec::new("sticker"))
            .await
            .unwrap();

        assert_eq!(transport.texts(), vec![STICKER_FAILED.to_owned()]);
    }

    #[tokio::test]
    async fn no_attachment_reports_download_failure() {
        let transport = Arc::new(RecordingTransport::with_media(vec![b"x".to_vec()]));
        let ctx = context(Arc::clone(&transport), text_message(".sticker"));

        StickerTool::default()
            .run(&ctx, "", &PluginSpec::new("sticker"))
            .await
            .unwrap();

        assert_eq!(transport.texts(), vec![FETCH_FAILED.to_owned()]);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg = StickerConfig::from_spec(&spec_with_cap(10));
        assert_eq!(cfg.max_media_bytes, 10);
        assert_eq!(cfg.ffmpeg, "ffmpeg");
        assert_eq!(cfg.transcode_timeout_secs, 60);
        assert_eq!(cfg.profile, StickerProfile::default());
        assert!(cfg.scratch_dir.is_none());
    }

    #[test]
    fn profile_is_read_from_config() {
        let mut spec = PluginSpec::new("sticker");
        spec.config = serde_yaml::from_str(
            "profile:\n  size: 320\n  quality: 60\nscratch_dir: /var/tmp/stickers\n",
        )
        .unwrap();
        let cfg = StickerConfig::from_spec(&spec);
        assert_eq!(
            cfg.profile,
            StickerProfile {
                size: 320,
                quality: 60,
                ..StickerProfile::default()
            }
        );
        assert_eq!(cfg.scratch_dir, Some(PathBuf::from("/var/tmp/stickers")));
    }
}
