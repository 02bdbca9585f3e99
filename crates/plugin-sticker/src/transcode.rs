use core::time::Duration;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use mime::Mime;
use plugin_core::error::{TRANSCODE_TIMEOUT, with_timeout};
use plugin_core::{BotError, CallClass, MediaKind, truncate};
use serde::Deserialize;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use crate::fetch::MediaBuffer;

/// An encoded WebP sticker, held in memory until it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerArtifact {
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Transcoder: Send + Sync + core::fmt::Debug {
    async fn to_sticker(&self, buffer: MediaBuffer) -> Result<StickerArtifact, BotError>;
}

/// Output constraints of the sticker format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StickerProfile {
    /// Side of the square canvas, in pixels.
    pub size: u32,
    pub max_fps: u32,
    pub max_video_secs: u32,
    /// libwebp quality, 0-100.
    pub quality: u8,
}

impl Default for StickerProfile {
    fn default() -> Self {
        Self {
            size: 512,
            max_fps: 14,
            max_video_secs: 8,
            quality: 75,
        }
    }
}

/// Runs ffmpeg as a child process. Input and output both go through uniquely
/// named temp files: mp4 needs a seekable source, and the animated WebP muxer
/// patches its RIFF header after the last frame, so it needs a seekable sink.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: OsString,
    profile: StickerProfile,
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            profile: StickerProfile::default(),
            timeout: TRANSCODE_TIMEOUT,
            scratch_dir: None,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_profile(mut self, profile: StickerProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Directory for the per-request temp files; the system temp dir otherwise.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    fn args(&self, kind: MediaKind, input: &Path, output: &Path) -> Vec<OsString> {
        let StickerProfile {
            size,
            max_fps,
            max_video_secs,
            quality,
        } = self.profile;
        let fit = format!(
            "scale={size}:{size}:force_original_aspect_ratio=decrease,format=rgba,\
             pad={size}:{size}:(ow-iw)/2:(oh-ih)/2:color=0x00000000"
        );

        // -y: the output temp file already exists.
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
        ];
        match kind {
            MediaKind::Image => {
                args.extend(["-vf".into(), fit.into(), "-frames:v".into(), "1".into()]);
            }
            MediaKind::Video => {
                args.extend([
                    "-t".into(),
                    max_video_secs.to_string().into(),
                    "-vf".into(),
                    format!("fps={max_fps},{fit}").into(),
                    "-an".into(),
                    "-loop".into(),
                    "0".into(),
                ]);
            }
        }
        args.extend([
            "-c:v".into(),
            "libwebp".into(),
            "-lossless".into(),
            "0".into(),
            "-q:v".into(),
            quality.to_string().into(),
            "-f".into(),
            "webp".into(),
            output.as_os_str().to_owned(),
        ]);
        args
    }

    fn scratch_file(&self, prefix: &str, suffix: &str) -> Result<NamedTempFile, BotError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(suffix);
        match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| BotError::Transcode(format!("creating {prefix}* temp file: {e}")))
    }

    async fn run(&self, buffer: &MediaBuffer) -> Result<Vec<u8>, BotError> {
        let input = self.scratch_file(
            "sticker-in-",
            &input_suffix(buffer.kind, buffer.mimetype.as_deref()),
        )?;
        tokio::fs::write(input.path(), &buffer.bytes)
            .await
            .map_err(|e| BotError::Transcode(format!("writing temp input: {e}")))?;
        let output = self.scratch_file("sticker-out-", ".webp")?;

        let args = self.args(buffer.kind, input.path(), output.path());
        debug!(program = ?self.program, ?args, "Running transcoder");
        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BotError::Transcode(format!("spawning {:?}: {e}", self.program)))?;

        if !status.status.success() {
            let stderr = String::from_utf8_lossy(&status.stderr);
            return Err(BotError::Transcode(format!(
                "{:?} exited with {}: {}",
                self.program,
                status.status,
                truncate(stderr.trim(), 240)
            )));
        }
        let bytes = tokio::fs::read(output.path())
            .await
            .map_err(|e| BotError::Transcode(format!("reading temp output: {e}")))?;
        if bytes.is_empty() {
            return Err(BotError::Transcode("transcoder produced no output".to_owned()));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_sticker(&self, buffer: MediaBuffer) -> Result<StickerArtifact, BotError> {
        let bytes = with_timeout(CallClass::Transcode, self.timeout, self.run(&buffer)).await?;
        Ok(StickerArtifact { bytes })
    }
}

/// File suffix that helps ffmpeg pick a demuxer.
fn input_suffix(kind: MediaKind, mimetype: Option<&str>) -> String {
    mimetype
        .and_then(|m| m.parse::<Mime>().ok())
        .filter(|m| m.type_() == mime::IMAGE || m.type_() == mime::VIDEO)
        .map(|m| m.subtype().as_str().to_ascii_lowercase())
        .filter(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()))
        .map_or_else(
            || match kind {
                MediaKind::Image => ".jpg".to_owned(),
                MediaKind::Video => ".mp4".to_owned(),
            },
            |sub| format!(".{sub}"),
        )
}
