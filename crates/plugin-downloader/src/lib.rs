mod resolver;

pub use resolver::{DownloadResult, Endpoint, Platform, Resolver};

use core::time::Duration;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use plugin_core::factory::{PluginFactory, push_default};
use plugin_core::{Plugin, PluginContext, PluginSpec, send_text, send_video, u64_config};

/// Registers one downloader plugin per platform.
#[derive(Debug)]
pub struct DownloaderPlugin(pub Platform);

impl PluginFactory for DownloaderPlugin {
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        let mut spec = PluginSpec::new(self.0.id());
        spec.config = serde_yaml::to_value(Endpoint::default_for(self.0)).unwrap_or_default();
        push_default(specs, spec);
    }

    fn build(&self) -> Arc<dyn Plugin> {
        Arc::new(Downloader::new(self.0))
    }
}

#[derive(Debug)]
pub struct Downloader {
    platform: Platform,
    http: reqwest::Client,
}

impl Downloader {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            http: reqwest::Client::new(),
        }
    }

    fn resolver(&self, spec: &PluginSpec) -> Resolver {
        // Partial configs (e.g. only `enabled: false`) fall back to the built-in endpoint.
        let endpoint = serde_yaml::from_value::<Endpoint>(spec.config.clone())
            .unwrap_or_else(|_| Endpoint::default_for(self.platform));
        let resolver = Resolver::new(self.http.clone()).with_endpoint(self.platform, endpoint);
        match u64_config(spec, "timeout_secs") {
            Some(secs) => resolver.with_timeout(Duration::from_secs(secs)),
            None => resolver,
        }
    }
}

#[must_use]
pub fn progress_notice(platform: Platform) -> String {
    format!("⏳ Downloading from {platform}…")
}

#[must_use]
pub fn failure_notice(platform: Platform) -> String {
    format!("❌ {platform} download failed.")
}

#[async_trait]
impl Plugin for Downloader {
    fn id(&self) -> &'static str {
        self.platform.id()
    }

    fn help(&self) -> &'static str {
        match self.platform {
            Platform::TikTok => "Download a TikTok video: .tt <url>",
            Platform::Instagram => "Download an Instagram post: .ig <url>",
            Platform::YouTube => "Download a YouTube video: .yt <url>",
        }
    }

    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()> {
        send_text(ctx, progress_notice(self.platform)).await?;

        match self.resolver(spec).resolve(self.platform, args).await {
            Ok(found) => {
                info!(plugin = %self.id(), chat = %ctx.chat(), media = %found.url, "Resolved download");
                send_video(ctx, found.url, format!("✅ {} download", found.platform)).await
            }
            Err(err) => {
                warn!(plugin = %self.id(), chat = %ctx.chat(), url = %args, error = %err, "Download failed");
                send_text(ctx, failure_notice(self.platform)).await
            }
        }
    }
}
