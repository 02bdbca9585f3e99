mod dispatch;
mod evolution;
mod logging;
mod plugins;
mod qr;
mod supervisor;
mod webhook;

use std::{fs, net::SocketAddr, path::Path, path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::evolution::EvolutionGateway;
use crate::logging::init_tracing;
use crate::plugins::Injected;
use crate::supervisor::{Connector, Supervisor};
use plugin_core::{PluginSpec, Transport};

/// Webhook deliveries buffered ahead of the supervisor.
const EVENT_BUFFER: usize = 256;

#[derive(Parser, Debug)]
#[command(
    name = "whatsapp-command-bot",
    version,
    about = "WhatsApp command bot (menu, AI relay, stickers, downloads) behind an Evolution API gateway"
)]
struct Args {
    /// Base URL of the AI backend; `/chat` is appended.
    #[arg(long, env = "AI_BACKEND_URL")]
    ai_backend_url: Option<String>,

    /// Owner shown by `.owner`
    #[arg(long, env = "BOT_OWNER", default_value = plugin_info::DEFAULT_OWNER)]
    owner: String,

    /// Evolution API base URL
    #[arg(long, env = "EVOLUTION_API_URL", default_value = "http://127.0.0.1:8080")]
    gateway_url: String,

    /// Evolution API key, sent as the `apikey` header
    #[arg(long, env = "EVOLUTION_API_KEY")]
    gateway_key: Option<String>,

    /// Gateway instance holding the WhatsApp session
    #[arg(long, env = "EVOLUTION_INSTANCE", default_value = "mik-md")]
    instance: String,

    /// Address the webhook listener binds to
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:8086")]
    webhook_addr: SocketAddr,

    /// Public URL of this bot's webhook; registered with the gateway when set
    #[arg(long, env = "WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// ffmpeg binary used for stickers
    #[arg(long = "ffmpeg", env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg: String,

    /// Optional YAML file with per-plugin settings
    #[arg(long, env = "BOT_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub(crate) struct BotConfig {
    #[serde(default)]
    pub(crate) plugins: Option<Vec<PluginSpec>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env first so it can also carry RUST_LOG / RUST_LOG_MODE.
    let _ = dotenvy::dotenv();
    init_tracing();
    let args = Args::parse();

    let config = load_config(&args.config)?;
    let injected = Injected {
        owner: Some(args.owner.clone()),
        ai_backend_url: args.ai_backend_url.clone(),
        ffmpeg: Some(args.ffmpeg.clone()),
    };
    if injected.ai_backend_url.is_none() {
        warn!("AI_BACKEND_URL is not set; .ai will answer with a backend error");
    }
    let registry = plugins::build_registry(&config, &injected).await;

    let gateway = Arc::new(EvolutionGateway::new(
        &args.gateway_url,
        args.gateway_key.clone(),
        args.instance.clone(),
    )?);
    if let Some(url) = &args.webhook_url
        && let Err(e) = gateway.register_webhook(url).await
    {
        warn!(error = %format!("{e:#}"), "Could not register webhook; configure it on the gateway");
    }

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let listener = TcpListener::bind(args.webhook_addr)
        .await
        .with_context(|| format!("binding webhook listener on {}", args.webhook_addr))?;
    info!(addr = %args.webhook_addr, instance = %args.instance, gateway = %args.gateway_url, "Webhook listening");
    let server = tokio::spawn(async move {
        axum::serve(listener, webhook::router(events_tx)).await
    });

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&gateway) as Arc<dyn Transport>,
        registry,
    ));
    let supervisor = Supervisor::new(gateway as Arc<dyn Connector>, dispatcher);

    tokio::select! {
        res = supervisor.run(events_rx) => res,
        res = server => match res {
            Ok(Ok(())) => Err(anyhow!("webhook server stopped")),
            Ok(Err(e)) => Err(e).context("webhook server failed"),
            Err(e) => Err(e).context("webhook server task failed"),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

/// The config file is optional; a missing file means plugin defaults.
fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        info!(path = %path.display(), "No config file, using plugin defaults");
        return Ok(BotConfig::default());
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    let cfg: BotConfig = serde_yaml::from_str(&yaml).context("parsing YAML config")?;
    Ok(cfg)
}
