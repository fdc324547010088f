//! Ordered layer stacks and setting resolution
//!
//! Layers are ordered by [`LayerKind`], lowest authority first. Within one
//! kind (several source overlays) insertion order is kept. An `Override`
//! setting resolves to the highest layer that sets it; union settings fold
//! every layer that sets them, lowest first.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::defaults::GlobalDefaults;
use super::descriptor::{MergePolicy, SettingKey};
use super::layer::{SettingValue, SettingsLayer};
use super::merge::{merge_layers, merge_values};
use crate::cache::UpdateDelay;
use crate::error::{Error, Result};
use crate::lookup::Locale;
use tplcore_names::NameFormat;

/// Kinds of configuration layers, lowest authority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    GlobalDefaults,
    SourceOverlay,
    InSourceHeader,
    RenderSession,
}

/// A resolved value and the layer that defined it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: SettingValue,
    pub origin: LayerKind,
}

#[derive(Debug, Clone)]
struct StackEntry {
    kind: LayerKind,
    settings: Arc<SettingsLayer>,
}

/// An ordered stack of shared layers.
///
/// Layers are shared through `Arc`; [`LayerStack::layer_mut`] copies a layer
/// before the first write, so stacks cloned earlier never see the change.
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    entries: Vec<StackEntry>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a layer above every layer of the same or lower kind.
    pub fn push(&mut self, kind: LayerKind, settings: Arc<SettingsLayer>) {
        self.insert(kind, settings);
    }

    fn insert(&mut self, kind: LayerKind, settings: Arc<SettingsLayer>) -> usize {
        let at = self
            .entries
            .iter()
            .rposition(|e| e.kind <= kind)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.entries.insert(at, StackEntry { kind, settings });
        at
    }

    pub fn with_layer(mut self, kind: LayerKind, settings: Arc<SettingsLayer>) -> Self {
        self.push(kind, settings);
        self
    }

    /// Layers, lowest authority first.
    pub fn layers(&self) -> impl Iterator<Item = (LayerKind, &SettingsLayer)> {
        self.entries.iter().map(|e| (e.kind, e.settings.as_ref()))
    }

    pub fn kinds(&self) -> Vec<LayerKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The same stack with its global layers replaced by `globals`.
    pub fn with_globals(&self, globals: Arc<SettingsLayer>) -> LayerStack {
        let mut stack = LayerStack::new().with_layer(LayerKind::GlobalDefaults, globals);
        for entry in self.entries.iter().filter(|e| e.kind != LayerKind::GlobalDefaults) {
            stack.push(entry.kind, Arc::clone(&entry.settings));
        }
        stack
    }

    /// The topmost layer of `kind`, created empty if there is none.
    pub fn layer_mut(&mut self, kind: LayerKind) -> &mut SettingsLayer {
        let index = match self.entries.iter().rposition(|e| e.kind == kind) {
            Some(index) => index,
            None => self.insert(kind, Arc::new(SettingsLayer::new())),
        };
        Arc::make_mut(&mut self.entries[index].settings)
    }

    /// Resolve a built-in setting.
    ///
    /// `None` only if no layer sets it; stacks with a global layer always
    /// resolve built-in keys.
    pub fn resolve(&self, key: SettingKey) -> Option<Resolved> {
        match key.descriptor().policy {
            MergePolicy::ListUnion | MergePolicy::MapUnion => {
                let policy = key.descriptor().policy;
                self.entries.iter().fold(None, |acc: Option<Resolved>, e| {
                    match (acc, e.settings.get(key)) {
                        (acc, None) => acc,
                        (None, Some(v)) => Some(Resolved {
                            value: v.clone(),
                            origin: e.kind,
                        }),
                        (Some(acc), Some(v)) => Some(Resolved {
                            value: merge_values(policy, &acc.value, v),
                            origin: e.kind,
                        }),
                    }
                })
            }
            MergePolicy::Override | MergePolicy::CustomMap => {
                self.entries.iter().rev().find_map(|e| {
                    e.settings.get(key).map(|v| Resolved {
                        value: v.clone(),
                        origin: e.kind,
                    })
                })
            }
        }
    }

    /// Resolved value, falling back to the built-in default.
    pub fn get(&self, key: SettingKey) -> SettingValue {
        self.resolve(key)
            .map(|r| r.value)
            .or_else(|| GlobalDefaults::builtin_layer().get(key).cloned())
            .unwrap_or(SettingValue::Null)
    }

    /// All layers folded into one.
    pub fn flatten(&self) -> SettingsLayer {
        merge_layers(self.entries.iter().map(|e| e.settings.as_ref()))
    }

    // custom settings

    /// The custom setting, or `SettingNotSet` if no layer sets it.
    pub fn custom(&self, key: &str) -> Result<Value> {
        self.custom_lookup(key)
            .cloned()
            .ok_or_else(|| Error::SettingNotSet {
                key: key.to_string(),
            })
    }

    /// The custom setting, or `default` if no layer sets it.
    pub fn custom_or(&self, key: &str, default: Value) -> Value {
        self.custom_lookup(key).cloned().unwrap_or(default)
    }

    /// `None` is the "missing" marker; an explicit `null` is `Some(Value::Null)`.
    pub fn custom_lookup(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find_map(|e| e.settings.custom(key))
    }

    /// The layer kind that defines a custom setting.
    pub fn custom_origin(&self, key: &str) -> Option<LayerKind> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.settings.custom(key).is_some())
            .map(|e| e.kind)
    }

    /// A detached, read-only copy of custom settings.
    ///
    /// With `include_inherited` false only the topmost layer's own entries
    /// are included.
    pub fn custom_snapshot(&self, include_inherited: bool) -> CustomSnapshot {
        let entries = if include_inherited {
            self.entries.iter().fold(BTreeMap::new(), |mut acc, e| {
                acc.extend(
                    e.settings
                        .custom_entries()
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone())),
                );
                acc
            })
        } else {
            self.entries
                .last()
                .map(|e| e.settings.custom_entries().clone())
                .unwrap_or_default()
        };
        CustomSnapshot { entries }
    }

    // typed getters

    fn bool_setting(&self, key: SettingKey) -> bool {
        self.get(key).as_bool().unwrap_or(false)
    }

    fn string_setting(&self, key: SettingKey) -> String {
        self.get(key).as_str().unwrap_or_default().to_string()
    }

    pub fn locale(&self) -> Locale {
        self.get(SettingKey::Locale)
            .as_locale()
            .cloned()
            .unwrap_or_default()
    }

    pub fn time_zone(&self) -> String {
        self.string_setting(SettingKey::TimeZone)
    }

    pub fn source_encoding(&self) -> String {
        self.string_setting(SettingKey::SourceEncoding)
    }

    pub fn output_encoding(&self) -> Option<String> {
        self.get(SettingKey::OutputEncoding).as_str().map(str::to_string)
    }

    pub fn output_format(&self) -> String {
        self.string_setting(SettingKey::OutputFormat)
    }

    pub fn whitespace_stripping(&self) -> bool {
        self.bool_setting(SettingKey::WhitespaceStripping)
    }

    pub fn tab_size(&self) -> i64 {
        self.get(SettingKey::TabSize).as_int().unwrap_or(8)
    }

    pub fn template_language(&self) -> String {
        self.string_setting(SettingKey::TemplateLanguage)
    }

    pub fn lazy_imports(&self) -> bool {
        self.bool_setting(SettingKey::LazyImports)
    }

    /// `None` means "same as `lazy_imports`".
    pub fn lazy_auto_imports(&self) -> Option<bool> {
        self.get(SettingKey::LazyAutoImports).as_bool()
    }

    pub fn effective_lazy_auto_imports(&self) -> bool {
        self.lazy_auto_imports().unwrap_or_else(|| self.lazy_imports())
    }

    /// Merged auto-imports (alias to template name), in import order.
    pub fn auto_imports(&self) -> IndexMap<String, String> {
        self.get(SettingKey::AutoImport)
            .as_map()
            .cloned()
            .unwrap_or_default()
    }

    /// Merged auto-includes, in include order.
    pub fn auto_includes(&self) -> Vec<String> {
        self.get(SettingKey::AutoInclude)
            .as_list()
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    pub fn template_update_delay(&self) -> UpdateDelay {
        self.get(SettingKey::TemplateUpdateDelay)
            .as_duration()
            .map(UpdateDelay::from_duration)
            .unwrap_or(UpdateDelay::Always)
    }

    pub fn localized_lookup(&self) -> bool {
        self.bool_setting(SettingKey::LocalizedLookup)
    }

    pub fn template_name_format(&self) -> NameFormat {
        self.get(SettingKey::TemplateNameFormat)
            .as_str()
            .and_then(NameFormat::from_name)
            .unwrap_or_default()
    }
}

/// Read-only copy of custom settings.
///
/// Later changes to the configuration are never visible through it, and it
/// has no mutating methods:
///
/// ```compile_fail
/// let stack = tplcore::config::LayerStack::new();
/// let mut snapshot = stack.custom_snapshot(true);
/// snapshot.insert("k".to_string(), serde_json::Value::Null);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomSnapshot {
    entries: BTreeMap<String, Value>,
}

impl CustomSnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// An owned, independent copy of the entries.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.entries.clone()
    }
}
