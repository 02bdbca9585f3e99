pub mod error;
pub mod factory;
mod message;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod transport;

pub use error::{BotError, CallClass};
pub use message::{InboundMessage, MediaKind, MediaRef, Outbound, Presence};
pub use transport::{MediaStream, Transport};

use std::{borrow::ToOwned, collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Everything a plugin needs to answer one inbound message.
#[derive(Clone)]
pub struct PluginContext {
    pub transport: Arc<dyn Transport>,
    pub message: Arc<InboundMessage>,
}

impl core::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginContext")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl PluginContext {
    #[must_use]
    pub fn chat(&self) -> &str {
        &self.message.chat
    }
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn help(&self) -> &'static str;
    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginSpec {
    pub id: String,
    #[serde(default = "enabled_true")]
    pub enabled: bool,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

impl PluginSpec {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            config: serde_yaml::Value::default(),
        }
    }
}

const fn enabled_true() -> bool {
    true
}

#[derive(Clone)]
pub struct PluginEntry {
    pub spec: PluginSpec,
    pub plugin: Arc<dyn Plugin>,
}

impl core::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("spec", &self.spec)
            .field("plugin", &self.plugin.id())
            .finish()
    }
}

#[derive(Clone, Default, Debug)]
pub struct PluginRegistry {
    inner: Arc<RwLock<HashMap<String, PluginEntry>>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, spec: PluginSpec, plugin: Arc<dyn Plugin>) -> Option<PluginEntry> {
        let mut inner = self.inner.write().await;
        inner.insert(spec.id.clone(), PluginEntry { spec, plugin })
    }

    pub async fn entry(&self, id: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner.get(id).cloned()
    }

    pub async fn entries(&self) -> Vec<(String, PluginEntry)> {
        let inner = self.inner.read().await;
        let mut all: Vec<_> = inner
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

pub fn str_config(spec: &PluginSpec, key: &str) -> Option<String> {
    spec.config
        .get(key)
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
}

pub fn u64_config(spec: &PluginSpec, key: &str) -> Option<u64> {
    spec.config.get(key).and_then(serde_yaml::Value::as_u64)
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub async fn send_text(ctx: &PluginContext, text: impl Into<String>) -> Result<()> {
    ctx.transport
        .send(ctx.chat(), Outbound::Text(text.into()))
        .await
}

pub async fn send_sticker(ctx: &PluginContext, webp: Vec<u8>) -> Result<()> {
    ctx.transport.send(ctx.chat(), Outbound::Sticker(webp)).await
}

pub async fn send_video(
    ctx: &PluginContext,
    url: impl Into<String>,
    caption: impl Into<String>,
) -> Result<()> {
    ctx.transport
        .send(
            ctx.chat(),
            Outbound::Video {
                url: url.into(),
                caption: caption.into(),
            },
        )
        .await
}

/// Best-effort "typing…" indicator; failures are ignored.
pub async fn composing(ctx: &PluginContext) {
    let _ = ctx
        .transport
        .send_presence(ctx.chat(), Presence::Composing)
        .await;
}

#[must_use]
pub fn sanitize_line(s: &str, max: usize) -> String {
    let compact = s.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&compact, max)
}
