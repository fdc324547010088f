//! String and JSON codecs for setting values
//!
//! Every value type has a textual form accepted by `set_setting` and a
//! canonical textual form produced by `format_value`:
//! - booleans: `true|false|yes|no|y|n|1|0|on|off`
//! - durations: plain milliseconds, or a number with `ms|s|m|h`
//! - lists: `a, b` or `["a", "b"]`
//! - maps: `k: v, k2 = v2` or `{"k": "v"}`

use indexmap::IndexMap;
use regex_lite::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

use super::descriptor::ValueType;
use super::effective::ConfigError;
use super::layer::SettingValue;
use crate::lookup::Locale;

fn invalid(raw: &str, ty: ValueType, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        raw: raw.to_string(),
        target: ty.name(),
        reason: reason.into(),
    }
}

/// Parse the textual form of a value of type `ty`.
pub fn parse_value(ty: ValueType, raw: &str) -> Result<SettingValue, ConfigError> {
    let trimmed = raw.trim();
    match ty {
        ValueType::Boolean => parse_bool(raw).map(SettingValue::Bool),
        ValueType::TriState => match parse_tri_state(raw)? {
            Some(b) => Ok(SettingValue::Bool(b)),
            None => Ok(SettingValue::Null),
        },
        ValueType::Integer { min, max } => {
            let n: i64 = trimmed
                .parse()
                .map_err(|_| invalid(raw, ty, "not an integer"))?;
            if n < min || n > max {
                return Err(invalid(raw, ty, format!("must be in [{}, {}]", min, max)));
            }
            Ok(SettingValue::Int(n))
        }
        ValueType::Duration => parse_duration(raw).map(SettingValue::Duration),
        ValueType::Locale => Locale::parse(raw)
            .map(SettingValue::Locale)
            .map_err(|e| invalid(raw, ty, e.reason)),
        ValueType::TimeZone => parse_time_zone(raw).map(SettingValue::Str),
        ValueType::Charset => parse_charset(raw, ty).map(SettingValue::Str),
        ValueType::OptionalCharset => {
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                Ok(SettingValue::Null)
            } else {
                parse_charset(raw, ty).map(SettingValue::Str)
            }
        }
        ValueType::String => Ok(SettingValue::Str(raw.to_string())),
        ValueType::Enum(allowed) => parse_enum(raw, allowed)
            .map(|v| SettingValue::Str(v.to_string()))
            .ok_or_else(|| invalid(raw, ty, format!("must be one of {}", allowed.join(", ")))),
        ValueType::List => parse_list(raw).map(SettingValue::List),
        ValueType::Map => parse_map(raw).map(SettingValue::Map),
    }
}

/// Convert a structured (TOML or JSON) value to a value of type `ty`.
pub fn from_json(ty: ValueType, value: &Value) -> Result<SettingValue, ConfigError> {
    match value {
        Value::Null if ty.is_nullable() => Ok(SettingValue::Null),
        Value::Null => Err(invalid("null", ty, "value can't be null")),
        Value::Bool(b) if matches!(ty, ValueType::Boolean | ValueType::TriState) => {
            Ok(SettingValue::Bool(*b))
        }
        Value::Number(n) if matches!(ty, ValueType::Duration) => n
            .as_u64()
            .map(|ms| SettingValue::Duration(Duration::from_millis(ms)))
            .ok_or_else(|| invalid(&n.to_string(), ty, "must be a non-negative integer")),
        Value::String(s) => parse_value(ty, s),
        Value::Array(items) if ty == ValueType::List => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(invalid(&other.to_string(), ty, "list items must be strings")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SettingValue::List),
        Value::Object(entries) if ty == ValueType::Map => entries
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k.clone(), s.clone())),
                other => Err(invalid(&other.to_string(), ty, "map values must be strings")),
            })
            .collect::<Result<IndexMap<_, _>, _>>()
            .map(SettingValue::Map),
        other => parse_value(ty, &other.to_string()),
    }
}

/// Canonical textual form; `parse_value` accepts it back.
pub fn format_value(value: &SettingValue) -> String {
    match value {
        SettingValue::Null => "null".to_string(),
        SettingValue::Bool(b) => b.to_string(),
        SettingValue::Int(n) => n.to_string(),
        SettingValue::Str(s) => s.clone(),
        SettingValue::Locale(l) => l.to_string(),
        SettingValue::Duration(d) => format_duration(*d),
        SettingValue::List(items) => {
            let items: Vec<String> = items.iter().map(|s| quote(s)).collect();
            format!("[{}]", items.join(", "))
        }
        SettingValue::Map(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), quote(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

pub fn parse_bool(raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" => Ok(true),
        "false" | "no" | "n" | "0" | "off" => Ok(false),
        _ => Err(invalid(raw, ValueType::Boolean, "not a boolean")),
    }
}

/// `None` means "inherit".
pub fn parse_tri_state(raw: &str) -> Result<Option<bool>, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "null" | "inherit" | "default" => Ok(None),
        _ => parse_bool(raw)
            .map(Some)
            .map_err(|_| invalid(raw, ValueType::TriState, "not a boolean, null or inherit")),
    }
}

fn duration_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+)\s*(ms|s|m|h)?$").ok())
        .as_ref()
}

/// `never` parses to `Duration::MAX`.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    if raw.trim().eq_ignore_ascii_case("never") {
        return Ok(Duration::MAX);
    }
    let caps = duration_regex()
        .and_then(|re| re.captures(raw.trim()))
        .ok_or_else(|| invalid(raw, ValueType::Duration, "expected <number>[ms|s|m|h]"))?;
    let amount: u64 = caps[1]
        .parse()
        .map_err(|_| invalid(raw, ValueType::Duration, "number out of range"))?;
    let unit_ms: u64 = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
        None | Some("ms") => 1,
        Some("s") => 1_000,
        Some("m") => 60_000,
        Some(_) => 3_600_000,
    };
    amount
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| invalid(raw, ValueType::Duration, "number out of range"))
}

pub fn format_duration(duration: Duration) -> String {
    if duration == Duration::MAX {
        return "never".to_string();
    }
    let ms = duration.as_millis();
    if ms != 0 && ms % 3_600_000 == 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms != 0 && ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else if ms != 0 && ms % 1_000 == 0 {
        format!("{}s", ms / 1_000)
    } else {
        format!("{}ms", ms)
    }
}

fn time_zone_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:UTC|GMT|Z|(?:UTC|GMT)?[+-]\d{1,2}(?::\d{2})?|[A-Za-z_]+(?:/[A-Za-z0-9_+-]+)+)$",
        )
        .ok()
    })
    .as_ref()
}

/// Syntactic check only; `Area/City` ids are not looked up.
pub fn parse_time_zone(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if time_zone_regex().is_some_and(|re| re.is_match(trimmed)) {
        Ok(trimmed.to_string())
    } else {
        Err(invalid(raw, ValueType::TimeZone, "not a time zone id or offset"))
    }
}

fn parse_charset(raw: &str, ty: ValueType) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let valid = trimmed
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '+' | '-'));
    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(invalid(raw, ty, "not a charset name"))
    }
}

/// Case-insensitive; `camelCase` spellings match `snake_case` variants.
pub fn parse_enum(raw: &str, allowed: &[&'static str]) -> Option<&'static str> {
    let trimmed = raw.trim();
    let has_lower = trimmed.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = trimmed.chars().any(|c| c.is_ascii_uppercase());
    let normalized = if has_lower && has_upper && !trimmed.contains('_') {
        camel_to_snake(trimmed)
    } else {
        trimmed.to_ascii_lowercase()
    };
    allowed.iter().copied().find(|v| *v == normalized)
}

fn camel_to_snake(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for (i, c) in camel.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn parse_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut body = raw.trim();
    if let Some(inner) = body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) {
        body = inner.trim();
    }
    if body.is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(body, &[','])
        .map_err(|reason| invalid(raw, ValueType::List, reason))?
        .into_iter()
        .map(|item| {
            let item = unquote(item.trim());
            if item.is_empty() {
                Err(invalid(raw, ValueType::List, "empty list item"))
            } else {
                Ok(item)
            }
        })
        .collect()
}

pub fn parse_map(raw: &str) -> Result<IndexMap<String, String>, ConfigError> {
    let mut body = raw.trim();
    if let Some(inner) = body.strip_prefix('{').and_then(|b| b.strip_suffix('}')) {
        body = inner.trim();
    }
    let mut map = IndexMap::new();
    if body.is_empty() {
        return Ok(map);
    }

    let entries =
        split_top_level(body, &[',']).map_err(|reason| invalid(raw, ValueType::Map, reason))?;
    for entry in entries {
        let parts = split_top_level(entry.trim(), &[':', '='])
            .map_err(|reason| invalid(raw, ValueType::Map, reason))?;
        let (key, value) = match parts.split_first() {
            Some((key, rest)) if !rest.is_empty() => {
                // only the first separator splits; the rest belongs to the value
                let value_start = key.len() + 1;
                (key.trim(), entry.trim()[value_start..].trim())
            }
            _ => return Err(invalid(raw, ValueType::Map, format!("missing ':' in {:?}", entry))),
        };
        let key = unquote(key);
        let value = unquote(value);
        if key.is_empty() || value.is_empty() {
            return Err(invalid(raw, ValueType::Map, "empty map key or value"));
        }
        map.shift_remove(&key);
        map.insert(key, value);
    }
    Ok(map)
}

/// Split on any of `separators` outside of quotes.
fn split_top_level<'a>(s: &'a str, separators: &[char]) -> Result<Vec<&'a str>, &'static str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
        } else if c == '"' || c == '\'' {
            quote = Some(c);
        } else if separators.contains(&c) {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    if quote.is_some() {
        return Err("unclosed quotation mark");
    }
    parts.push(&s[start..]);
    Ok(parts)
}

fn unquote(s: &str) -> String {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if !quoted {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;
    for c in s[1..s.len() - 1].chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    out
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        for yes in ["true", "YES", "y", "1", "On"] {
            assert!(parse_bool(yes).unwrap(), "{}", yes);
        }
        for no in ["false", "No", "n", "0", "off"] {
            assert!(!parse_bool(no).unwrap(), "{}", no);
        }
        let err = parse_bool("maybe").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref raw, target: "boolean", .. } if raw == "maybe"
        ));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5 s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1H").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("5 days").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("").is_err());
        assert_eq!(parse_duration("Never").unwrap(), Duration::MAX);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
        assert_eq!(format_duration(Duration::MAX), "never");
    }

    #[test]
    fn test_parse_time_zone() {
        for ok in ["UTC", "GMT", "Z", "+02:00", "-5", "GMT+1", "Europe/Budapest", "America/Argentina/Buenos_Aires"] {
            assert!(parse_time_zone(ok).is_ok(), "{}", ok);
        }
        for bad in ["", "Mars Time", "+2:0:0"] {
            assert!(parse_time_zone(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_parse_enum() {
        let allowed = &["enable_if_default", "disable"];
        assert_eq!(parse_enum("enableIfDefault", allowed), Some("enable_if_default"));
        assert_eq!(parse_enum("ENABLE_IF_DEFAULT", allowed), Some("enable_if_default"));
        assert_eq!(parse_enum(" disable ", allowed), Some("disable"));
        assert_eq!(parse_enum("force", allowed), None);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("a.ftl, b.ftl").unwrap(), vec!["a.ftl", "b.ftl"]);
        assert_eq!(
            parse_list(r#"["a,1.ftl", 'b.ftl']"#).unwrap(),
            vec!["a,1.ftl", "b.ftl"]
        );
        assert!(parse_list("[]").unwrap().is_empty());
        assert!(parse_list("a, , b").is_err());
        assert!(parse_list("\"a").is_err());
    }

    #[test]
    fn test_parse_map_keeps_order_and_last_value() {
        let map = parse_map("t1: a.ftl, t2 = b.ftl, t3: \"s://c.ftl\", t2: b2.ftl").unwrap();
        let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["t1", "t3", "t2"]);
        assert_eq!(map["t2"], "b2.ftl");
        assert_eq!(map["t3"], "s://c.ftl");

        let map = parse_map("{lib: classpath:lib.ftl}").unwrap();
        assert_eq!(map["lib"], "classpath:lib.ftl");

        assert!(parse_map("{lib}").is_err());
    }

    #[test]
    fn test_format_round_trips_through_parse() {
        let list = SettingValue::List(vec!["a \"x\".ftl".into(), "b,c.ftl".into()]);
        assert_eq!(parse_value(ValueType::List, &format_value(&list)).unwrap(), list);

        let mut map = IndexMap::new();
        map.insert("lib".to_string(), "s://lib.ftl".to_string());
        let map = SettingValue::Map(map);
        assert_eq!(parse_value(ValueType::Map, &format_value(&map)).unwrap(), map);
    }

    #[test]
    fn test_integer_range() {
        let ty = ValueType::Integer { min: 1, max: 256 };
        assert_eq!(parse_value(ty, "8").unwrap(), SettingValue::Int(8));
        assert!(parse_value(ty, "0").is_err());
        assert!(parse_value(ty, "eight").is_err());
    }

    #[test]
    fn test_nullable_types() {
        assert_eq!(parse_value(ValueType::TriState, "inherit").unwrap(), SettingValue::Null);
        assert_eq!(parse_value(ValueType::TriState, "true").unwrap(), SettingValue::Bool(true));
        assert_eq!(parse_value(ValueType::OptionalCharset, "null").unwrap(), SettingValue::Null);
        assert!(parse_value(ValueType::Charset, "null").is_ok());
        assert!(parse_value(ValueType::Charset, "").is_err());
        assert!(from_json(ValueType::Boolean, &Value::Null).is_err());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            from_json(ValueType::Duration, &serde_json::json!(1500)).unwrap(),
            SettingValue::Duration(Duration::from_millis(1500))
        );
        assert_eq!(
            from_json(ValueType::Integer { min: 1, max: 256 }, &serde_json::json!(4)).unwrap(),
            SettingValue::Int(4)
        );
        assert_eq!(
            from_json(ValueType::List, &serde_json::json!(["a", "b"])).unwrap(),
            SettingValue::List(vec!["a".into(), "b".into()])
        );
        assert!(from_json(ValueType::List, &serde_json::json!([1])).is_err());
    }
}
