//! Static replies: `.menu` and `.owner`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use plugin_core::factory::{PluginFactory, push_default};
use plugin_core::{Plugin, PluginContext, PluginSpec, send_text};

pub const DEFAULT_OWNER: &str = "Owner Not Set";

pub const MENU: &str = "
╔═══🔥 *MÎK-MD MENU* 🔥═══╗

🤖 *Basic Commands*
• .menu
• .ping
• .owner

🧠 *AI Commands*
• .ai <text>

🎨 *Sticker*
• Send image/video with caption: *.sticker*

📥 *Downloaders*
• .yt <url>
• .ig <url>
• .tt <url>

╚══════════════════════╝
";

#[derive(Debug)]
pub struct MenuPlugin;

impl PluginFactory for MenuPlugin {
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        push_default(specs, PluginSpec::new("menu"));
    }

    fn build(&self) -> Arc<dyn Plugin> {
        Arc::new(Menu)
    }
}

#[derive(Debug)]
pub struct Menu;

#[async_trait]
impl Plugin for Menu {
    fn id(&self) -> &'static str {
        "menu"
    }
    fn help(&self) -> &'static str {
        "List available commands"
    }
    async fn run(&self, ctx: &PluginContext, _args: &str, _spec: &PluginSpec) -> Result<()> {
        send_text(ctx, MENU).await
    }
}

#[derive(Debug)]
pub struct OwnerPlugin;

impl PluginFactory for OwnerPlugin {
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        push_default(specs, PluginSpec::new("owner"));
    }

    fn build(&self) -> Arc<dyn Plugin> {
        Arc::new(Owner)
    }
}

#[derive(Debug)]
pub struct Owner;

#[derive(Debug, Clone, Deserialize, Default)]
struct OwnerConfig {
    #[serde(default)]
    owner: Option<String>,
}

#[must_use]
pub fn owner_text(owner: &str) -> String {
    format!("Bot Owner:\n{owner}")
}

#[async_trait]
impl Plugin for Owner {
    fn id(&self) -> &'static str {
        "owner"
    }
    fn help(&self) -> &'static str {
        "Show who runs this bot. Config: owner"
    }
    async fn run(&self, ctx: &PluginContext, _args: &str, spec: &PluginSpec) -> Result<()> {
        let cfg: OwnerConfig = serde_yaml::from_value(spec.config.clone()).unwrap_or_default();
        let owner = cfg
            .owner
            .filter(|o| !o.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OWNER.to_owned());
        send_text(ctx, owner_text(&owner)).await
    }
}
