//! Built-in global defaults (lowest layer)
//!
//! Every built-in setting has a value here, so resolution of a built-in key
//! never falls off the bottom of the stack.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

use super::descriptor::SettingKey;
use super::effective::ConfigError;
use super::layer::{SettingValue, SettingsLayer};
use crate::lookup::Locale;

/// Built-in default setting values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalDefaults {
    /// Locale (default: "en_US")
    pub locale: String,

    /// Time zone (default: "UTC")
    pub time_zone: String,

    /// Charset used to decode template sources (default: "UTF-8")
    pub source_encoding: String,

    pub number_format: String,
    pub date_format: String,
    pub time_format: String,
    pub datetime_format: String,
    pub boolean_format: String,

    /// Output format name (default: "undefined")
    pub output_format: String,

    pub auto_escaping_policy: String,
    pub whitespace_stripping: bool,
    pub recognize_standard_file_extensions: bool,
    pub tag_syntax: String,
    pub naming_convention: String,

    /// Tab width for column numbers in error positions (default: 8)
    pub tab_size: i64,

    /// Name of the template language used to parse sources (default: "plain")
    pub template_language: String,

    pub api_builtin_enabled: bool,
    pub log_template_exceptions: bool,
    pub show_error_tips: bool,
    pub auto_flush: bool,

    /// Import namespaces lazily (default: false)
    pub lazy_imports: bool,

    /// Re-validation delay of cached templates in milliseconds (default: 5000)
    pub template_update_delay_ms: u64,

    /// Try locale-suffixed names first (default: true)
    pub localized_lookup: bool,

    /// "legacy" or "normalized" (default: "normalized")
    pub template_name_format: String,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            locale: "en_US".to_string(),
            time_zone: "UTC".to_string(),
            source_encoding: "UTF-8".to_string(),
            number_format: "number".to_string(),
            date_format: String::new(),
            time_format: String::new(),
            datetime_format: String::new(),
            boolean_format: "true,false".to_string(),
            output_format: "undefined".to_string(),
            auto_escaping_policy: "enable_if_default".to_string(),
            whitespace_stripping: true,
            recognize_standard_file_extensions: true,
            tag_syntax: "angle_bracket".to_string(),
            naming_convention: "auto_detect".to_string(),
            tab_size: 8,
            template_language: "plain".to_string(),
            api_builtin_enabled: false,
            log_template_exceptions: true,
            show_error_tips: true,
            auto_flush: true,
            lazy_imports: false,
            template_update_delay_ms: 5000,
            localized_lookup: true,
            template_name_format: "normalized".to_string(),
        }
    }
}

impl GlobalDefaults {
    /// Convert to the global layer.
    ///
    /// `output_encoding`, `url_escaping_charset` and `lazy_auto_imports` are
    /// stored as explicit nulls.
    pub fn to_layer(&self) -> Result<SettingsLayer, ConfigError> {
        use SettingKey as K;
        use SettingValue as V;

        let locale = Locale::parse(&self.locale).map_err(|e| ConfigError::InvalidValue {
            raw: e.raw,
            target: "locale",
            reason: e.reason.to_string(),
        })?;

        let values = [
            (K::Locale, V::Locale(locale)),
            (K::TimeZone, V::Str(self.time_zone.clone())),
            (K::SourceEncoding, V::Str(self.source_encoding.clone())),
            (K::OutputEncoding, V::Null),
            (K::UrlEscapingCharset, V::Null),
            (K::NumberFormat, V::Str(self.number_format.clone())),
            (K::DateFormat, V::Str(self.date_format.clone())),
            (K::TimeFormat, V::Str(self.time_format.clone())),
            (K::DatetimeFormat, V::Str(self.datetime_format.clone())),
            (K::BooleanFormat, V::Str(self.boolean_format.clone())),
            (K::OutputFormat, V::Str(self.output_format.clone())),
            (K::AutoEscapingPolicy, V::Str(self.auto_escaping_policy.clone())),
            (K::WhitespaceStripping, V::Bool(self.whitespace_stripping)),
            (
                K::RecognizeStandardFileExtensions,
                V::Bool(self.recognize_standard_file_extensions),
            ),
            (K::TagSyntax, V::Str(self.tag_syntax.clone())),
            (K::NamingConvention, V::Str(self.naming_convention.clone())),
            (K::TabSize, V::Int(self.tab_size)),
            (K::TemplateLanguage, V::Str(self.template_language.clone())),
            (K::ApiBuiltinEnabled, V::Bool(self.api_builtin_enabled)),
            (K::LogTemplateExceptions, V::Bool(self.log_template_exceptions)),
            (K::ShowErrorTips, V::Bool(self.show_error_tips)),
            (K::AutoFlush, V::Bool(self.auto_flush)),
            (K::LazyImports, V::Bool(self.lazy_imports)),
            (K::LazyAutoImports, V::Null),
            (
                K::TemplateUpdateDelay,
                V::Duration(Duration::from_millis(self.template_update_delay_ms)),
            ),
            (K::LocalizedLookup, V::Bool(self.localized_lookup)),
            (K::TemplateNameFormat, V::Str(self.template_name_format.clone())),
            (K::AutoImport, V::Map(IndexMap::new())),
            (K::AutoInclude, V::List(Vec::new())),
        ];

        let mut layer = SettingsLayer::new();
        for (key, value) in values {
            layer.set(key, value)?;
        }
        Ok(layer)
    }

    /// The layer of [`GlobalDefaults::default`], built once.
    pub fn builtin_layer() -> &'static SettingsLayer {
        static BUILTIN: OnceLock<SettingsLayer> = OnceLock::new();
        BUILTIN.get_or_init(|| GlobalDefaults::default().to_layer().unwrap_or_default())
    }
}
