//! The engine's global layer and the values derived from it

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::descriptor::SettingKey;
use super::layer::SettingsLayer;
use super::resolve::{LayerKind, LayerStack};
use crate::cache::UpdateDelay;
use tplcore_names::NameFormat;

/// An immutable snapshot of the global layer.
///
/// Engine setters build a new snapshot; renders and cache lookups that
/// already hold one keep using it.
#[derive(Debug, Clone)]
pub struct GlobalSettings {
    layer: Arc<SettingsLayer>,
    fingerprint: String,
    update_delay: UpdateDelay,
    localized_lookup: bool,
    name_format: NameFormat,
}

impl GlobalSettings {
    pub fn new(layer: SettingsLayer) -> Self {
        let layer = Arc::new(layer);
        let stack = LayerStack::new().with_layer(LayerKind::GlobalDefaults, Arc::clone(&layer));
        Self {
            fingerprint: parse_fingerprint(&stack),
            update_delay: stack.template_update_delay(),
            localized_lookup: stack.localized_lookup(),
            name_format: stack.template_name_format(),
            layer,
        }
    }

    pub fn layer(&self) -> &Arc<SettingsLayer> {
        &self.layer
    }

    /// A stack holding only the global layer.
    pub fn stack(&self) -> LayerStack {
        LayerStack::new().with_layer(LayerKind::GlobalDefaults, Arc::clone(&self.layer))
    }

    /// Stable digest of the parse-relevant global settings.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn update_delay(&self) -> UpdateDelay {
        self.update_delay
    }

    pub fn localized_lookup(&self) -> bool {
        self.localized_lookup
    }

    pub fn name_format(&self) -> NameFormat {
        self.name_format
    }
}

/// Sorted JSON of every non-engine-level built-in setting, hashed.
///
/// Custom settings are excluded: they are read at render time, never while
/// parsing.
fn parse_fingerprint(stack: &LayerStack) -> String {
    let relevant: BTreeMap<&str, Value> = SettingKey::ALL
        .iter()
        .filter(|key| !key.descriptor().engine_level)
        .map(|key| (key.snake_name(), stack.get(*key).to_json()))
        .collect();
    let json = Value::Object(
        relevant
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    );
    let mut hasher = Sha256::new();
    hasher.update(json.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
