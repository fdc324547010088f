//! Configuration files and the effective settings report
//!
//! A TOML file can populate the global layer:
//!
//! ```toml
//! [settings]
//! locale = "de_DE"
//! template_update_delay = "2s"
//! lazy_imports = true
//! auto_include = ["common/header.ftl"]
//!
//! [auto_imports]
//! lib = "lib/util.ftl"
//!
//! [custom_settings]
//! site_name = "Example"
//! ```
//!
//! The effective report captures every resolved value plus the layer it came
//! from.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::codec;
use super::descriptor::{SettingKey, ValueType};
use super::layer::{SettingValue, SettingsLayer};
use super::resolve::{LayerKind, LayerStack};

/// Schema version of the effective settings report
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "tplcore/effective_settings@1";

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigSource {
    /// Layer this source was loaded into
    pub origin: LayerKind,

    /// File path (None for programmatic configuration)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// A layer loaded from a configuration file
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub layer: SettingsLayer,
    pub source: ConfigSource,
}

/// Load a TOML configuration file into a global layer.
pub fn load_toml_file(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
    let layer = parse_toml_str(&contents)?;

    Ok(LoadedConfig {
        layer,
        source: ConfigSource {
            origin: LayerKind::GlobalDefaults,
            path: Some(path.to_string_lossy().to_string()),
            digest: Some(digest),
        },
    })
}

/// Parse TOML configuration text into a layer.
pub fn parse_toml_str(contents: &str) -> Result<SettingsLayer, ConfigError> {
    let toml_value: toml::Value = toml::from_str(contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;
    let root = match toml_to_json(toml_value) {
        Value::Object(map) => map,
        _ => return Err(ConfigError::ParseError("expected a TOML table".to_string())),
    };

    let mut layer = SettingsLayer::new();
    for (section, value) in root {
        match (section.as_str(), value) {
            ("settings", Value::Object(settings)) => {
                for (name, value) in settings {
                    let key = SettingKey::from_name(&name)
                        .ok_or_else(|| ConfigError::UnknownSetting(name.clone()))?;
                    layer.set(key, codec::from_json(key.descriptor().value_type, &value)?)?;
                }
            }
            ("auto_imports", Value::Object(entries)) => {
                let imports = codec::from_json(ValueType::Map, &Value::Object(entries))?;
                let merged = match (layer.get(SettingKey::AutoImport), imports) {
                    (Some(SettingValue::Map(existing)), SettingValue::Map(added)) => {
                        let mut all: IndexMap<String, String> = existing.clone();
                        all.extend(added);
                        SettingValue::Map(all)
                    }
                    (_, imports) => imports,
                };
                layer.set(SettingKey::AutoImport, merged)?;
            }
            ("custom_settings", Value::Object(entries)) => {
                for (key, value) in entries {
                    layer.set_custom(key, value);
                }
            }
            (other, _) => {
                return Err(ConfigError::ParseError(format!(
                    "unknown or malformed section [{}]",
                    other
                )))
            }
        }
    }
    Ok(layer)
}

/// Convert TOML Value to JSON Value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            Value::Object(map)
        }
    }
}

/// One resolved setting with its origin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveValue {
    pub value: Value,
    pub origin: LayerKind,
}

/// Effective settings with full provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveSettings {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When this report was computed
    pub created_at: DateTime<Utc>,

    /// Built-in settings by snake_case name
    pub settings: BTreeMap<String, EffectiveValue>,

    /// Custom settings
    pub custom_settings: BTreeMap<String, EffectiveValue>,

    /// Layers of the stack, lowest first
    pub layers: Vec<LayerKind>,

    /// Contributing configuration files
    pub sources: Vec<ConfigSource>,
}

impl EffectiveSettings {
    /// Build the report for a stack.
    pub fn build(stack: &LayerStack, sources: Vec<ConfigSource>) -> Self {
        let settings = SettingKey::ALL
            .iter()
            .filter_map(|key| {
                stack.resolve(*key).map(|r| {
                    (
                        key.snake_name().to_string(),
                        EffectiveValue {
                            value: r.value.to_json(),
                            origin: r.origin,
                        },
                    )
                })
            })
            .collect();

        let custom_settings = stack
            .custom_snapshot(true)
            .iter()
            .filter_map(|(key, value)| {
                stack.custom_origin(key).map(|origin| {
                    (
                        key.to_string(),
                        EffectiveValue {
                            value: value.clone(),
                            origin,
                        },
                    )
                })
            })
            .collect();

        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            settings,
            custom_settings,
            layers: stack.kinds(),
            sources,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn get(&self, name: &str) -> Option<&EffectiveValue> {
        self.settings.get(name)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {raw:?} for a {target} setting: {reason}")]
    InvalidValue {
        raw: String,
        target: &'static str,
        reason: String,
    },

    #[error("Unknown setting {0:?}")]
    UnknownSetting(String),

    #[error("A {actual} value does not fit setting {key}, which is a {expected} setting")]
    TypeMismatch {
        key: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Setting {0} can only be set on the engine level")]
    EngineLevelOnly(&'static str),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}
