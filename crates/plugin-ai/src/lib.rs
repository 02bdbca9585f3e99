mod relay;

pub use relay::{AiRelay, FALLBACK_REPLY};

use core::time::Duration;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use plugin_core::factory::{PluginFactory, push_default};
use plugin_core::{
    Plugin, PluginContext, PluginSpec, composing, sanitize_line, send_text, str_config, u64_config,
};

pub const BACKEND_ERROR: &str = "❌ AI Backend Error";

#[derive(Debug)]
pub struct AiPlugin;

impl PluginFactory for AiPlugin {
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        push_default(specs, PluginSpec::new("ai"));
    }

    fn build(&self) -> Arc<dyn Plugin> {
        Arc::new(AiTool::default())
    }
}

#[derive(Debug, Default)]
pub struct AiTool {
    http: reqwest::Client,
}

impl AiTool {
    fn relay(&self, spec: &PluginSpec) -> Option<AiRelay> {
        let base = str_config(spec, "backend_url").filter(|u| !u.trim().is_empty())?;
        let relay = AiRelay::new(self.http.clone(), base);
        Some(match u64_config(spec, "timeout_secs") {
            Some(secs) => relay.with_timeout(Duration::from_secs(secs)),
            None => relay,
        })
    }
}

#[async_trait]
impl Plugin for AiTool {
    fn id(&self) -> &'static str {
        "ai"
    }
    fn help(&self) -> &'static str {
        "Ask the AI: .ai <prompt>"
    }

    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()> {
        composing(ctx).await;

        let Some(relay) = self.relay(spec) else {
            warn!(plugin = %self.id(), "AI request blocked: no backend_url / AI_BACKEND_URL set");
            return send_text(ctx, BACKEND_ERROR).await;
        };

        info!(plugin = %self.id(), chat = %ctx.chat(), prompt = %sanitize_line(args, 80), "AI request");
        match relay.ask(args).await {
            Ok(reply) => send_text(ctx, format!("🧠 *AI Reply:*\n{reply}")).await,
            Err(err) => {
                warn!(plugin = %self.id(), chat = %ctx.chat(), error = %err, "AI relay failed");
                send_text(ctx, BACKEND_ERROR).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use plugin_core::Presence;
    use plugin_core::testing::{RecordingTransport, context, text_message};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn spec_for(url: &str) -> PluginSpec {
        let mut spec = PluginSpec::new("ai");
        spec.config = serde_yaml::to_value(json!({ "backend_url": url })).unwrap();
        spec
    }

    #[tokio::test]
    async fn relays_and_formats_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(body_json(json!({ "message": "what is rust" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "reply": "a language" })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = Arc::new(RecordingTransport::new());
        let ctx = context(Arc::clone(&transport), text_message(".ai what is rust"));
        AiTool::default()
            .run(&ctx, "what is rust", &spec_for(&server.uri()))
            .await
            .unwrap();

        assert_eq!(transport.texts(), vec!["🧠 *AI Reply:*\na language".to_owned()]);
        assert_eq!(transport.presences().len(), 1);
        assert_eq!(transport.presences()[0].1, Presence::Composing);
    }

    #[tokio::test]
    async fn missing_backend_reports_error() {
        let transport = Arc::new(RecordingTransport::new());
        let ctx = context(Arc::clone(&transport), text_message(".ai hi"));
        AiTool::default()
            .run(&ctx, "hi", &PluginSpec::new("ai"))
            .await
            .unwrap();
        assert_eq!(transport.texts(), vec![BACKEND_ERROR.to_owned()]);
    }

    #[tokio::test]
    async fn backend_failure_hides_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("stack trace"))
            .mount(&server)
            .await;

        let transport = Arc::new(RecordingTransport::new());
        let ctx = context(Arc::clone(&transport), text_message(".ai hi"));
        AiTool::default()
            .run(&ctx, "hi", &spec_for(&server.uri()))
            .await
            .unwrap();
        assert_eq!(transport.texts(), vec![BACKEND_ERROR.to_owned()]);
    }
}
