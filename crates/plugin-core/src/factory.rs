use std::sync::Arc;

use crate::{Plugin, PluginSpec};

/// Builds one plugin and describes its default spec.
pub trait PluginFactory: Send + Sync {
    /// Push the plugin's default spec unless `specs` already carries one with
    /// the same id.
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>);

    #[must_use]
    fn build(&self) -> Arc<dyn Plugin>;
}

/// Push `spec` unless an entry with the same id exists.
pub fn push_default(specs: &mut Vec<PluginSpec>, spec: PluginSpec) {
    if !specs.iter().any(|s| s.id == spec.id) {
        specs.push(spec);
    }
}
