//! One configuration layer
//!
//! A layer only holds what was explicitly set on it. A missing key means
//! "defer to the next lower layer"; an explicit [`SettingValue::Null`] is a
//! set value and wins like any other.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use super::codec;
use super::descriptor::{SettingKey, ValueType};
use super::effective::ConfigError;
use crate::lookup::Locale;

/// A typed setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// Explicitly unset; only legal for nullable types.
    Null,
    Bool(bool),
    Int(i64),
    /// Strings, charsets, time zones and enum variants (snake_case).
    Str(String),
    Locale(Locale),
    Duration(Duration),
    List(Vec<String>),
    Map(IndexMap<String, String>),
}

impl SettingValue {
    /// Whether this value is a legal value of type `ty`.
    pub fn fits(&self, ty: ValueType) -> bool {
        match (self, ty) {
            (SettingValue::Null, ty) => ty.is_nullable(),
            (SettingValue::Bool(_), ValueType::Boolean | ValueType::TriState) => true,
            (SettingValue::Int(n), ValueType::Integer { min, max }) => *n >= min && *n <= max,
            (SettingValue::Str(s), ValueType::Enum(allowed)) => {
                allowed.iter().any(|a| *a == s.as_str())
            }
            (
                SettingValue::Str(_),
                ValueType::String
                | ValueType::Charset
                | ValueType::OptionalCharset
                | ValueType::TimeZone,
            ) => true,
            (SettingValue::Locale(_), ValueType::Locale) => true,
            (SettingValue::Duration(_), ValueType::Duration) => true,
            (SettingValue::List(_), ValueType::List) => true,
            (SettingValue::Map(_), ValueType::Map) => true,
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SettingValue::Null => "null",
            SettingValue::Bool(_) => "boolean",
            SettingValue::Int(_) => "integer",
            SettingValue::Str(_) => "string",
            SettingValue::Locale(_) => "locale",
            SettingValue::Duration(_) => "duration",
            SettingValue::List(_) => "list",
            SettingValue::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_locale(&self) -> Option<&Locale> {
        match self {
            SettingValue::Locale(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            SettingValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            SettingValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, String>> {
        match self {
            SettingValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// JSON form for reports and fingerprints.
    pub fn to_json(&self) -> Value {
        match self {
            SettingValue::Null => Value::Null,
            SettingValue::Bool(b) => Value::Bool(*b),
            SettingValue::Int(n) => Value::from(*n),
            SettingValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            SettingValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            other => Value::String(codec::format_value(other)),
        }
    }
}

/// The explicitly set values of one layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsLayer {
    values: BTreeMap<SettingKey, SettingValue>,
    custom: BTreeMap<String, Value>,
}

impl SettingsLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a built-in setting; the value must fit the setting's type.
    pub fn set(&mut self, key: SettingKey, value: SettingValue) -> Result<(), ConfigError> {
        let descriptor = key.descriptor();
        if !value.fits(descriptor.value_type) {
            return Err(ConfigError::TypeMismatch {
                key: descriptor.snake,
                expected: descriptor.value_type.name(),
                actual: value.type_name(),
            });
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Builder form of [`SettingsLayer::set`].
    pub fn with(mut self, key: SettingKey, value: SettingValue) -> Result<Self, ConfigError> {
        self.set(key, value)?;
        Ok(self)
    }

    /// Set a built-in setting from its textual form, by snake_case or camelCase name.
    pub fn set_str(&mut self, name: &str, raw: &str) -> Result<SettingKey, ConfigError> {
        let key =
            SettingKey::from_name(name).ok_or_else(|| ConfigError::UnknownSetting(name.into()))?;
        let value = codec::parse_value(key.descriptor().value_type, raw)?;
        self.values.insert(key, value);
        Ok(key)
    }

    /// Remove a value so lookups fall through to lower layers.
    pub fn unset(&mut self, key: SettingKey) -> Option<SettingValue> {
        self.values.remove(&key)
    }

    pub fn get(&self, key: SettingKey) -> Option<&SettingValue> {
        self.values.get(&key)
    }

    pub fn is_set(&self, key: SettingKey) -> bool {
        self.values.contains_key(&key)
    }

    /// Explicitly set keys, in key order.
    pub fn keys(&self) -> impl Iterator<Item = SettingKey> + '_ {
        self.values.keys().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = (SettingKey, &SettingValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Set a custom setting. `Value::Null` is a real value, not "unset".
    pub fn set_custom(&mut self, key: impl Into<String>, value: Value) {
        self.custom.insert(key.into(), value);
    }

    pub fn unset_custom(&mut self, key: &str) -> Option<Value> {
        self.custom.remove(key)
    }

    pub fn custom(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    pub fn custom_entries(&self) -> &BTreeMap<String, Value> {
        &self.custom
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.custom.is_empty()
    }

    /// Keys that only the global layer may set, if any are set here.
    pub fn engine_level_keys(&self) -> Vec<SettingKey> {
        self.keys()
            .filter(|k| k.descriptor().engine_level)
            .collect()
    }

    pub(crate) fn from_parts(
        values: BTreeMap<SettingKey, SettingValue>,
        custom: BTreeMap<String, Value>,
    ) -> Self {
        Self { values, custom }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_checks_type() {
        let mut layer = SettingsLayer::new();
        layer.set(SettingKey::TabSize, SettingValue::Int(4)).unwrap();
        assert_eq!(layer.get(SettingKey::TabSize), Some(&SettingValue::Int(4)));

        let err = layer
            .set(SettingKey::TabSize, SettingValue::Str("4".into()))
            .unwrap_err();
        assert!(err.to_string().contains("tab_size"));
        assert!(layer.set(SettingKey::TabSize, SettingValue::Int(0)).is_err());
        assert!(layer.set(SettingKey::Locale, SettingValue::Null).is_err());
        assert!(layer.set(SettingKey::LazyAutoImports, SettingValue::Null).is_ok());
    }

    #[test]
    fn test_set_str_by_either_name() {
        let mut layer = SettingsLayer::new();
        assert_eq!(layer.set_str("tabSize", "2").unwrap(), SettingKey::TabSize);
        assert_eq!(layer.set_str("whitespace_stripping", "no").unwrap(), SettingKey::WhitespaceStripping);
        assert_eq!(layer.get(SettingKey::TabSize), Some(&SettingValue::Int(2)));
        assert_eq!(layer.get(SettingKey::WhitespaceStripping), Some(&SettingValue::Bool(false)));

        assert!(matches!(
            layer.set_str("tabsize", "2"),
            Err(ConfigError::UnknownSetting(ref n)) if n == "tabsize"
        ));
        assert!(matches!(
            layer.set_str("tab_size", "two"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unset_falls_back() {
        let mut layer = SettingsLayer::new();
        layer.set(SettingKey::LazyImports, SettingValue::Bool(true)).unwrap();
        assert!(layer.is_set(SettingKey::LazyImports));
        layer.unset(SettingKey::LazyImports);
        assert!(!layer.is_set(SettingKey::LazyImports));
        assert!(layer.is_empty());
    }

    #[test]
    fn test_custom_null_is_a_value() {
        let mut layer = SettingsLayer::new();
        layer.set_custom("k", Value::Null);
        assert_eq!(layer.custom("k"), Some(&Value::Null));
        assert_eq!(layer.custom("other"), None);
    }

    #[test]
    fn test_engine_level_keys() {
        let layer = SettingsLayer::new()
            .with(SettingKey::LocalizedLookup, SettingValue::Bool(false))
            .unwrap()
            .with(SettingKey::Locale, SettingValue::Locale(Locale::parse("de").unwrap()))
            .unwrap();
        assert_eq!(layer.engine_level_keys(), vec![SettingKey::LocalizedLookup]);
    }
}
