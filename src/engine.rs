//! Engine facade
//!
//! Ties the global settings, the overlay selector, the lookup strategy and
//! the resolution cache together, and hands out render sessions.

use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::cache::{
    CacheStorage, Clock, LookupKey, ResolverParts, StrongCacheStorage, SystemClock,
    TemplateResolver,
};
use crate::config::{
    format_value, load_toml_file, merge_pair, parse_toml_str, CaseConvention, ConfigSource,
    CustomSnapshot, EffectiveSettings, GlobalDefaults, GlobalSettings, LayerKind, SettingKey,
    SettingValue, SettingsLayer,
};
use crate::error::{Error, Result};
use crate::lookup::{DefaultLookupStrategy, Locale, LookupStrategy, RoutingToken, TemplateLoader};
use crate::namespace::RenderSession;
use crate::overlay::OverlaySelector;
use crate::template::{LanguageRegistry, Template, TemplateLanguage};

/// Engine builder; configuration is validated in [`EngineBuilder::build`].
pub struct EngineBuilder {
    loader: Arc<dyn TemplateLoader>,
    strategy: Arc<dyn LookupStrategy>,
    overlays: Option<OverlaySelector>,
    languages: LanguageRegistry,
    storage: Option<Box<dyn CacheStorage>>,
    clock: Arc<dyn Clock>,
    defaults: GlobalDefaults,
    config_files: Vec<PathBuf>,
    config_texts: Vec<String>,
    settings: Vec<(String, String)>,
    custom: Vec<(String, Value)>,
}

impl EngineBuilder {
    pub fn new(loader: Arc<dyn TemplateLoader>) -> Self {
        Self {
            loader,
            strategy: Arc::new(DefaultLookupStrategy),
            overlays: None,
            languages: LanguageRegistry::new(),
            storage: None,
            clock: Arc::new(SystemClock),
            defaults: GlobalDefaults::default(),
            config_files: Vec::new(),
            config_texts: Vec::new(),
            settings: Vec::new(),
            custom: Vec::new(),
        }
    }

    pub fn lookup_strategy(mut self, strategy: impl LookupStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    pub fn overlays(mut self, selector: OverlaySelector) -> Self {
        self.overlays = Some(selector);
        self
    }

    /// Register a template language (selected by `template_language`).
    pub fn language(mut self, language: impl TemplateLanguage + 'static) -> Self {
        self.languages.register(Arc::new(language));
        self
    }

    /// Cache storage policy (default: unbounded)
    pub fn storage(mut self, storage: impl CacheStorage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the built-in defaults.
    pub fn defaults(mut self, defaults: GlobalDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Apply a TOML configuration file on top of the defaults.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push(path.into());
        self
    }

    /// Apply TOML configuration text on top of the defaults and files.
    pub fn config_toml(mut self, contents: impl Into<String>) -> Self {
        self.config_texts.push(contents.into());
        self
    }

    /// Set a global setting by name; applied after configuration files.
    pub fn setting(mut self, name: impl Into<String>, raw: impl Into<String>) -> Self {
        self.settings.push((name.into(), raw.into()));
        self
    }

    pub fn custom_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom.push((key.into(), value));
        self
    }

    pub fn build(self) -> Result<Engine> {
        let mut layer = self.defaults.to_layer()?;
        let mut sources = Vec::new();

        for path in &self.config_files {
            let loaded = load_toml_file(path)?;
            layer = merge_pair(&layer, &loaded.layer);
            sources.push(loaded.source);
        }
        for text in &self.config_texts {
            layer = merge_pair(&layer, &parse_toml_str(text)?);
            sources.push(ConfigSource {
                origin: LayerKind::GlobalDefaults,
                path: None,
                digest: None,
            });
        }
        for (name, raw) in &self.settings {
            layer.set_str(name, raw)?;
        }
        for (key, value) in self.custom {
            layer.set_custom(key, value);
        }

        let resolver = TemplateResolver::new(ResolverParts {
            loader: self.loader,
            strategy: self.strategy,
            overlays: self.overlays,
            languages: self.languages,
            storage: self
                .storage
                .unwrap_or_else(|| Box::new(StrongCacheStorage::new())),
            clock: self.clock,
        });

        Ok(Engine {
            globals: RwLock::new(Arc::new(GlobalSettings::new(layer))),
            resolver,
            sources,
        })
    }
}

/// The template engine: global settings plus the resolution cache.
///
/// Safe to share between threads; every render gets its own
/// [`RenderSession`].
pub struct Engine {
    globals: RwLock<Arc<GlobalSettings>>,
    resolver: TemplateResolver,
    sources: Vec<ConfigSource>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("resolver", &self.resolver)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder(loader: Arc<dyn TemplateLoader>) -> EngineBuilder {
        EngineBuilder::new(loader)
    }

    /// Current global settings snapshot.
    pub fn globals(&self) -> Arc<GlobalSettings> {
        Arc::clone(&self.globals.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    // resolution

    /// Resolve a template.
    ///
    /// The name is normalized before any loader access; a malformed name
    /// fails immediately. With `parse` false the template's body is its raw
    /// text.
    pub fn resolve(
        &self,
        name: &str,
        locale: Option<&Locale>,
        token: Option<&RoutingToken>,
        parse: bool,
    ) -> Result<Arc<Template>> {
        let globals = self.globals();
        let key = self.lookup_key(&globals, name, locale, token, parse)?;
        self.resolver.get_or_load(&key, &globals)
    }

    /// Resolve a parsed template in the global locale.
    pub fn template(&self, name: &str) -> Result<Arc<Template>> {
        let locale = self.globals().stack().locale();
        self.resolve(name, Some(&locale), None, true)
    }

    /// Drop the cached entries (parsed and unparsed) of one request.
    pub fn invalidate(
        &self,
        name: &str,
        locale: Option<&Locale>,
        token: Option<&RoutingToken>,
    ) -> Result<()> {
        let globals = self.globals();
        for parse in [true, false] {
            let key = self.lookup_key(&globals, name, locale, token, parse)?;
            self.resolver.remove(&key)?;
        }
        Ok(())
    }

    /// Drop every cached entry and reset the loader.
    pub fn clear_all(&self) -> Result<()> {
        self.resolver.clear()
    }

    fn lookup_key(
        &self,
        globals: &GlobalSettings,
        name: &str,
        locale: Option<&Locale>,
        token: Option<&RoutingToken>,
        parse: bool,
    ) -> Result<LookupKey> {
        let canonical = globals.name_format().normalize(name)?;
        Ok(LookupKey::new(
            canonical,
            locale.cloned(),
            token.cloned(),
            parse,
            globals.fingerprint(),
        ))
    }

    // rendering

    pub fn new_session(&self, template: Arc<Template>) -> RenderSession<'_> {
        RenderSession::new(self, template)
    }

    /// Resolve `name` in the global locale and render it.
    pub fn render(&self, name: &str) -> Result<String> {
        let template = self.template(name)?;
        self.new_session(template).render()
    }

    // settings

    /// Resolved global value of a built-in setting.
    pub fn setting(&self, key: SettingKey) -> SettingValue {
        self.globals().stack().get(key)
    }

    /// Global value of a built-in setting looked up by snake_case or camelCase name.
    pub fn get_setting(&self, name: &str) -> Result<SettingValue> {
        let key = SettingKey::from_name(name).ok_or_else(|| Error::UnknownSetting(name.into()))?;
        Ok(self.setting(key))
    }

    /// Textual form of a global setting.
    pub fn get_setting_string(&self, name: &str) -> Result<String> {
        self.get_setting(name).map(|value| format_value(&value))
    }

    /// Set a global setting from its textual form.
    pub fn set_setting(&self, name: &str, raw: &str) -> Result<()> {
        self.update_globals(|layer| {
            layer.set_str(name, raw)?;
            Ok(())
        })
    }

    pub fn set_value(&self, key: SettingKey, value: SettingValue) -> Result<()> {
        self.update_globals(|layer| Ok(layer.set(key, value)?))
    }

    /// Restore the built-in default of a setting.
    pub fn reset_setting(&self, key: SettingKey) -> Result<()> {
        let default = GlobalDefaults::builtin_layer()
            .get(key)
            .cloned()
            .unwrap_or(SettingValue::Null);
        self.set_value(key, default)
    }

    /// Built-in setting names in one case convention, sorted.
    pub fn setting_names(&self, convention: CaseConvention) -> Vec<&'static str> {
        SettingKey::names(convention)
    }

    pub fn custom(&self, key: &str) -> Result<Value> {
        self.globals().stack().custom(key)
    }

    pub fn custom_or(&self, key: &str, default: Value) -> Value {
        self.globals().stack().custom_or(key, default)
    }

    pub fn set_custom(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        self.update_globals(move |layer| {
            layer.set_custom(key, value);
            Ok(())
        })
    }

    pub fn unset_custom(&self, key: &str) -> Result<()> {
        self.update_globals(|layer| {
            layer.unset_custom(key);
            Ok(())
        })
    }

    pub fn custom_snapshot(&self) -> CustomSnapshot {
        self.globals().stack().custom_snapshot(true)
    }

    /// Resolved global settings with their origins and the loaded config files.
    pub fn effective_report(&self) -> EffectiveSettings {
        EffectiveSettings::build(&self.globals().stack(), self.sources.clone())
    }

    fn update_globals(&self, edit: impl FnOnce(&mut SettingsLayer) -> Result<()>) -> Result<()> {
        let mut globals = self.globals.write().unwrap_or_else(|e| e.into_inner());
        let mut layer = SettingsLayer::clone(globals.layer());
        edit(&mut layer)?;
        let updated = GlobalSettings::new(layer);
        if updated.fingerprint() != globals.fingerprint() {
            self.resolver.retain_fingerprint(updated.fingerprint());
        }
        *globals = Arc::new(updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::MapLoader;
    use std::time::Duration;

    fn engine(loader: Arc<MapLoader>) -> Engine {
        EngineBuilder::new(loader).build().unwrap()
    }

    #[test]
    fn test_builder_applies_settings_in_order() {
        let engine = EngineBuilder::new(Arc::new(MapLoader::new()))
            .config_toml("[settings]\ntab_size = 2\nlocale = \"de_DE\"\n")
            .setting("tabSize", "3")
            .custom_setting("site", serde_json::json!("x"))
            .build()
            .unwrap();
        assert_eq!(engine.setting(SettingKey::TabSize), SettingValue::Int(3));
        assert_eq!(engine.get_setting_string("locale").unwrap(), "de_DE");
        assert_eq!(engine.custom("site").unwrap(), serde_json::json!("x"));
    }

    #[test]
    fn test_builder_reports_bad_configuration() {
        let err = EngineBuilder::new(Arc::new(MapLoader::new()))
            .setting("tab_size", "zero")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSettingValue { ref raw, .. } if raw == "zero"));

        let err = EngineBuilder::new(Arc::new(MapLoader::new()))
            .setting("no_such_setting", "1")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownSetting(_)));
    }

    #[test]
    fn test_malformed_name_fails_before_loading() {
        let loader = Arc::new(MapLoader::new());
        let engine = engine(Arc::clone(&loader));
        for bad in ["a\\b", "a\0b", "../x", "a/../../x"] {
            let err = engine.resolve(bad, None, None, true).unwrap_err();
            assert!(matches!(err, Error::MalformedName(_)), "{:?}", bad);
        }
        assert!(loader.probes().is_empty());
    }

    #[test]
    fn test_engine_level_settings_on_global_layer() {
        let engine = engine(Arc::new(MapLoader::new()));
        engine.set_setting("template_update_delay", "0").unwrap();
        engine.set_setting("localizedLookup", "false").unwrap();
        assert!(!engine.globals().localized_lookup());
        assert_eq!(
            engine.setting(SettingKey::TemplateUpdateDelay),
            SettingValue::Duration(Duration::ZERO)
        );
        engine.reset_setting(SettingKey::LocalizedLookup).unwrap();
        assert!(engine.globals().localized_lookup());
    }

    #[test]
    fn test_setting_names_sorted_and_paired() {
        let engine = engine(Arc::new(MapLoader::new()));
        let snake = engine.setting_names(CaseConvention::SnakeCase);
        let camel = engine.setting_names(CaseConvention::CamelCase);
        assert_eq!(snake.len(), camel.len());
        assert!(snake.windows(2).all(|w| w[0] < w[1]));
        assert!(camel.windows(2).all(|w| w[0] < w[1]));
        let mut converted: Vec<String> = snake.iter().map(|s| crate::config::snake_to_camel(s)).collect();
        converted.sort();
        assert_eq!(converted, camel);
    }

    #[test]
    fn test_custom_settings_on_engine() {
        let engine = engine(Arc::new(MapLoader::new()));
        assert!(matches!(engine.custom("k"), Err(Error::SettingNotSet { .. })));
        engine.set_custom("k", Value::Null).unwrap();
        assert_eq!(engine.custom("k").unwrap(), Value::Null);

        let snapshot = engine.custom_snapshot();
        engine.set_custom("k", serde_json::json!(1)).unwrap();
        assert_eq!(snapshot.get("k"), Some(&Value::Null));

        engine.unset_custom("k").unwrap();
        assert_eq!(engine.custom_or("k", serde_json::json!("d")), serde_json::json!("d"));
    }
}
