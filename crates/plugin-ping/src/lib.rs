use std::sync::Arc;

use anyhow::Result;

use async_trait::async_trait;
use plugin_core::factory::{PluginFactory, push_default};
use plugin_core::{Plugin, PluginContext, PluginSpec, send_text};

pub const PONG: &str = "Pong! 🏓";

#[derive(Debug)]
pub struct PingPlugin;

impl PluginFactory for PingPlugin {
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        push_default(specs, PluginSpec::new("ping"));
    }

    fn build(&self) -> Arc<dyn Plugin> {
        Arc::new(Ping)
    }
}

#[derive(Debug)]
pub struct Ping;

#[async_trait]
impl Plugin for Ping {
    fn id(&self) -> &'static str {
        "ping"
    }
    fn help(&self) -> &'static str {
        "🏓"
    }

    async fn run(&self, ctx: &PluginContext, _args: &str, _spec: &PluginSpec) -> Result<()> {
        send_text(ctx, PONG).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use plugin_core::testing::{RecordingTransport, context, text_message};

    use super::*;

    #[tokio::test]
    async fn replies_pong_only() {
        let transport = Arc::new(RecordingTransport::new());
        let ctx = context(Arc::clone(&transport), text_message(".ping"));
        Ping.run(&ctx, "", &PluginSpec::new("ping")).await.unwrap();
        assert_eq!(transport.texts(), vec!["Pong! 🏓".to_owned()]);
        assert!(transport.presences().is_empty());
    }
}
