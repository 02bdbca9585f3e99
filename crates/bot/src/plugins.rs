use std::sync::Arc;

use plugin_core::factory::PluginFactory;
use plugin_core::{PluginRegistry, PluginSpec};
use plugin_downloader::{DownloaderPlugin, Platform};
use tracing::{debug, info, warn};

use crate::BotConfig;

/// Values taken from the environment/CLI that belong to individual plugins.
#[derive(Debug, Default, Clone)]
pub struct Injected {
    pub owner: Option<String>,
    pub ai_backend_url: Option<String>,
    pub ffmpeg: Option<String>,
}

fn factories() -> Vec<Box<dyn PluginFactory>> {
    let mut all: Vec<Box<dyn PluginFactory>> = vec![
        Box::new(plugin_info::MenuPlugin),
        Box::new(plugin_ping::PingPlugin),
        Box::new(plugin_info::OwnerPlugin),
        Box::new(plugin_ai::AiPlugin),
        Box::new(plugin_sticker::StickerPlugin),
    ];
    all.extend(
        Platform::ALL
            .into_iter()
            .map(|p| Box::new(DownloaderPlugin(p)) as Box<dyn PluginFactory>),
    );
    all
}

pub async fn build_registry(config: &BotConfig, injected: &Injected) -> Arc<PluginRegistry> {
    let mut specs = config.plugins.clone().unwrap_or_default();
    for (id, key, value) in [
        ("owner", "owner", &injected.owner),
        ("ai", "backend_url", &injected.ai_backend_url),
        ("sticker", "ffmpeg", &injected.ffmpeg),
    ] {
        if let Some(value) = value {
            inject(&mut specs, id, key, value);
        }
    }

    let registry = registry_from_specs(specs).await;
    let enabled: Vec<String> = registry
        .entries()
        .await
        .into_iter()
        .filter(|(_, e)| e.spec.enabled)
        .map(|(id, _)| id)
        .collect();
    info!(plugins = ?enabled, "Registered plugins");
    registry
}

/// Merge user `specs` over every plugin's defaults and register the result.
pub async fn registry_from_specs(specs: Vec<PluginSpec>) -> Arc<PluginRegistry> {
    let factories = factories();
    let mut defaults = Vec::new();
    for f in &factories {
        f.register_defaults(&mut defaults);
    }

    for spec in &specs {
        if !defaults.iter().any(|d| d.id == spec.id) {
            warn!("Unknown plugin ID: {}", spec.id);
        }
    }

    let registry = Arc::new(PluginRegistry::new());
    for factory in &factories {
        let plugin = factory.build();
        let default = defaults
            .iter()
            .find(|d| d.id == plugin.id())
            .cloned()
            .unwrap_or_else(|| PluginSpec::new(plugin.id()));
        let spec = match specs.iter().find(|s| s.id == default.id) {
            Some(user) => PluginSpec {
                id: default.id,
                enabled: user.enabled,
                config: merge_yaml(user.config.clone(), default.config),
            },
            None => default,
        };
        debug!(plugin = %spec.id, enabled = spec.enabled, help = %plugin.help(), "Plugin loaded");
        registry.register(spec, plugin).await;
    }
    registry
}

/// Set `key` in the config of plugin `id` unless the YAML already does.
fn inject(specs: &mut Vec<PluginSpec>, id: &str, key: &str, value: &str) {
    let idx = specs.iter().position(|s| s.id == id).unwrap_or_else(|| {
        specs.push(PluginSpec::new(id));
        specs.len() - 1
    });
    let spec = &mut specs[idx];
    if !spec.config.is_mapping() {
        spec.config = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }
    if let serde_yaml::Value::Mapping(map) = &mut spec.config {
        let key = serde_yaml::Value::from(key);
        if !map.contains_key(&key) {
            map.insert(key, serde_yaml::Value::from(value));
        }
    }
}

/// Deep-merge two YAML values; `primary` wins on conflicts.
fn merge_yaml(primary: serde_yaml::Value, fallback: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value::{Mapping, Null};
    match (primary, fallback) {
        (Mapping(mut a), Mapping(b)) => {
            for (k, v_b) in b {
                match a.get_mut(&k) {
                    Some(v_a) => {
                        let merged = merge_yaml(v_a.clone(), v_b);
                        *v_a = merged;
                    }
                    None => {
                        a.insert(k, v_b);
                    }
                }
            }
            Mapping(a)
        }
        (Null, b) => b,
        (a, _b) => a,
    }
}
