//! The built-in settings catalogue
//!
//! Every built-in setting has a snake_case and a camelCase name, a value type
//! (which codec parses it) and a merge policy (how layers combine it).

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the values of two layers combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The highest layer that sets the value wins.
    Override,
    /// Concatenate, then keep only the last occurrence of each element.
    ListUnion,
    /// Like `ListUnion` over entries, keyed by entry key.
    MapUnion,
    /// Per-key override of opaque values.
    CustomMap,
}

/// Semantic type of a setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Boolean,
    /// Boolean or explicit `null` ("inherit").
    TriState,
    Integer { min: i64, max: i64 },
    Duration,
    Locale,
    TimeZone,
    Charset,
    /// Charset or explicit `null`.
    OptionalCharset,
    String,
    Enum(&'static [&'static str]),
    List,
    Map,
}

impl ValueType {
    /// Name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::TriState => "boolean or null",
            ValueType::Integer { .. } => "integer",
            ValueType::Duration => "duration",
            ValueType::Locale => "locale",
            ValueType::TimeZone => "time zone",
            ValueType::Charset => "charset",
            ValueType::OptionalCharset => "charset or null",
            ValueType::String => "string",
            ValueType::Enum(_) => "enumeration",
            ValueType::List => "list",
            ValueType::Map => "map",
        }
    }

    /// Whether an explicit `null` is a legal value.
    pub fn is_nullable(&self) -> bool {
        matches!(self, ValueType::TriState | ValueType::OptionalCharset)
    }
}

/// Which naming convention to list setting names in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseConvention {
    SnakeCase,
    CamelCase,
}

/// Static description of one built-in setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingDescriptor {
    pub key: SettingKey,
    pub snake: &'static str,
    pub camel: &'static str,
    pub value_type: ValueType,
    pub policy: MergePolicy,
    /// Only the global layer may set it.
    pub engine_level: bool,
}

impl SettingDescriptor {
    pub fn name(&self, convention: CaseConvention) -> &'static str {
        match convention {
            CaseConvention::SnakeCase => self.snake,
            CaseConvention::CamelCase => self.camel,
        }
    }
}

const AUTO_ESCAPING_POLICIES: &[&str] = &[
    "enable_if_default",
    "enable_if_supported",
    "disable",
    "force",
];
const TAG_SYNTAXES: &[&str] = &["angle_bracket", "square_bracket", "auto_detect"];
const NAMING_CONVENTIONS: &[&str] = &["auto_detect", "legacy", "camel_case"];
const NAME_FORMATS: &[&str] = &["legacy", "normalized"];

macro_rules! settings {
    ($($variant:ident => $snake:literal, $camel:literal, $ty:expr, $policy:ident, $engine:literal;)*) => {
        /// Built-in setting keys.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum SettingKey {
            $($variant,)*
        }

        impl SettingKey {
            /// Every built-in key, in declaration order.
            pub const ALL: &'static [SettingKey] = &[$(SettingKey::$variant,)*];

            pub fn descriptor(&self) -> &'static SettingDescriptor {
                match self {
                    $(SettingKey::$variant => &SettingDescriptor {
                        key: SettingKey::$variant,
                        snake: $snake,
                        camel: $camel,
                        value_type: $ty,
                        policy: MergePolicy::$policy,
                        engine_level: $engine,
                    },)*
                }
            }
        }
    };
}

settings! {
    Locale => "locale", "locale", ValueType::Locale, Override, false;
    TimeZone => "time_zone", "timeZone", ValueType::TimeZone, Override, false;
    SourceEncoding => "source_encoding", "sourceEncoding", ValueType::Charset, Override, false;
    OutputEncoding => "output_encoding", "outputEncoding", ValueType::OptionalCharset, Override, false;
    UrlEscapingCharset => "url_escaping_charset", "urlEscapingCharset", ValueType::OptionalCharset, Override, false;
    NumberFormat => "number_format", "numberFormat", ValueType::String, Override, false;
    DateFormat => "date_format", "dateFormat", ValueType::String, Override, false;
    TimeFormat => "time_format", "timeFormat", ValueType::String, Override, false;
    DatetimeFormat => "datetime_format", "datetimeFormat", ValueType::String, Override, false;
    BooleanFormat => "boolean_format", "booleanFormat", ValueType::String, Override, false;
    OutputFormat => "output_format", "outputFormat", ValueType::String, Override, false;
    AutoEscapingPolicy => "auto_escaping_policy", "autoEscapingPolicy", ValueType::Enum(AUTO_ESCAPING_POLICIES), Override, false;
    WhitespaceStripping => "whitespace_stripping", "whitespaceStripping", ValueType::Boolean, Override, false;
    RecognizeStandardFileExtensions => "recognize_standard_file_extensions", "recognizeStandardFileExtensions", ValueType::Boolean, Override, false;
    TagSyntax => "tag_syntax", "tagSyntax", ValueType::Enum(TAG_SYNTAXES), Override, false;
    NamingConvention => "naming_convention", "namingConvention", ValueType::Enum(NAMING_CONVENTIONS), Override, false;
    TabSize => "tab_size", "tabSize", ValueType::Integer { min: 1, max: 256 }, Override, false;
    TemplateLanguage => "template_language", "templateLanguage", ValueType::String, Override, false;
    ApiBuiltinEnabled => "api_builtin_enabled", "apiBuiltinEnabled", ValueType::Boolean, Override, false;
    LogTemplateExceptions => "log_template_exceptions", "logTemplateExceptions", ValueType::Boolean, Override, false;
    ShowErrorTips => "show_error_tips", "showErrorTips", ValueType::Boolean, Override, false;
    AutoFlush => "auto_flush", "autoFlush", ValueType::Boolean, Override, false;
    LazyImports => "lazy_imports", "lazyImports", ValueType::Boolean, Override, false;
    LazyAutoImports => "lazy_auto_imports", "lazyAutoImports", ValueType::TriState, Override, false;
    TemplateUpdateDelay => "template_update_delay", "templateUpdateDelay", ValueType::Duration, Override, true;
    LocalizedLookup => "localized_lookup", "localizedLookup", ValueType::Boolean, Override, true;
    TemplateNameFormat => "template_name_format", "templateNameFormat", ValueType::Enum(NAME_FORMATS), Override, true;
    AutoImport => "auto_import", "autoImport", ValueType::Map, MapUnion, false;
    AutoInclude => "auto_include", "autoInclude", ValueType::List, ListUnion, false;
}

impl SettingKey {
    /// Find a key by its snake_case or camelCase name.
    pub fn from_name(name: &str) -> Option<SettingKey> {
        Self::ALL.iter().copied().find(|key| {
            let d = key.descriptor();
            d.snake == name || d.camel == name
        })
    }

    /// All names in one convention, sorted.
    pub fn names(convention: CaseConvention) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Self::ALL
            .iter()
            .map(|key| key.descriptor().name(convention))
            .collect();
        names.sort_unstable();
        names
    }

    pub fn snake_name(&self) -> &'static str {
        self.descriptor().snake
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.snake_name())
    }
}

/// `foo_bar_baz` to `fooBarBaz`.
pub fn snake_to_camel(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
