//! One render of one template

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{Namespace, NamespaceState, NamespaceStatus};
use crate::config::{
    ConfigError, CustomSnapshot, LayerKind, LayerStack, SettingKey, SettingValue, SettingsLayer,
};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::lookup::Locale;
use crate::template::{Template, TemplateBody};

const MAIN: usize = 0;

#[derive(Debug)]
struct Frame {
    template_name: String,
    namespace: usize,
}

/// The mutable state of one render: the session settings layer, output,
/// variables and imported namespaces.
///
/// A session is owned by a single render and is never shared.
#[derive(Debug)]
pub struct RenderSession<'e> {
    engine: &'e Engine,
    template: Arc<Template>,
    settings: LayerStack,
    output: String,
    namespaces: Vec<Namespace>,
    by_name: HashMap<String, usize>,
    frames: Vec<Frame>,
    started: bool,
}

impl<'e> RenderSession<'e> {
    pub(crate) fn new(engine: &'e Engine, template: Arc<Template>) -> Self {
        let settings = template
            .settings
            .with_globals(Arc::clone(engine.globals().layer()))
            .with_layer(LayerKind::RenderSession, Arc::new(SettingsLayer::new()));
        let mut main = Namespace::new(template.name.clone(), String::new(), NamespaceState::Ready);
        main.template = Some(Arc::clone(&template));
        Self {
            engine,
            template,
            settings,
            output: String::new(),
            namespaces: vec![main],
            by_name: HashMap::new(),
            frames: Vec::new(),
            started: false,
        }
    }

    /// The template being rendered.
    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// Globals, overlays, header and this session's layer.
    pub fn settings(&self) -> &LayerStack {
        &self.settings
    }

    /// Name of the template currently executing.
    pub fn current_template_name(&self) -> &str {
        self.frames
            .last()
            .map(|f| f.template_name.as_str())
            .unwrap_or(&self.template.name)
    }

    fn current_namespace(&self) -> usize {
        self.frames.last().map(|f| f.namespace).unwrap_or(MAIN)
    }

    // settings

    pub fn setting(&self, key: SettingKey) -> SettingValue {
        self.settings.get(key)
    }

    /// Set a setting on the session layer from its textual form.
    pub fn set_setting(&mut self, name: &str, raw: &str) -> Result<()> {
        let key = SettingKey::from_name(name).ok_or_else(|| Error::UnknownSetting(name.into()))?;
        reject_engine_level(key)?;
        self.settings
            .layer_mut(LayerKind::RenderSession)
            .set_str(name, raw)?;
        Ok(())
    }

    pub fn set_value(&mut self, key: SettingKey, value: SettingValue) -> Result<()> {
        reject_engine_level(key)?;
        self.settings
            .layer_mut(LayerKind::RenderSession)
            .set(key, value)?;
        Ok(())
    }

    /// Session locale, else the template's.
    pub fn locale(&self) -> Locale {
        match self.settings.resolve(SettingKey::Locale) {
            Some(resolved) if resolved.origin == LayerKind::RenderSession => resolved
                .value
                .as_locale()
                .cloned()
                .unwrap_or_else(|| self.template.locale.clone()),
            _ => self.template.locale.clone(),
        }
    }

    pub fn set_locale(&mut self, locale: Locale) -> Result<()> {
        self.set_value(SettingKey::Locale, SettingValue::Locale(locale))
    }

    pub fn custom(&self, key: &str) -> Result<Value> {
        self.settings.custom(key)
    }

    pub fn custom_or(&self, key: &str, default: Value) -> Value {
        self.settings.custom_or(key, default)
    }

    pub fn set_custom(&mut self, key: impl Into<String>, value: Value) {
        self.settings
            .layer_mut(LayerKind::RenderSession)
            .set_custom(key, value);
    }

    /// With `include_inherited` false, only what this session set.
    pub fn custom_snapshot(&self, include_inherited: bool) -> CustomSnapshot {
        self.settings.custom_snapshot(include_inherited)
    }

    // output and variables

    pub fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Set a variable in the namespace currently executing.
    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        let ns = self.current_namespace();
        self.namespaces[ns].vars.insert(name.into(), value);
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.namespaces[self.current_namespace()].vars.get(name)
    }

    // imports and includes

    /// Import `path` (relative to the executing template) as `alias`,
    /// lazily if `lazy_imports` is on.
    pub fn import(&mut self, path: &str, alias: &str) -> Result<()> {
        let lazy = self.settings.lazy_imports();
        let name = self.resolve_name(path)?;
        self.import_canonical(name, alias, lazy)
    }

    /// Include `path` (relative to the executing template) into the current
    /// namespace and output. Includes are always eager.
    pub fn include(&mut self, path: &str) -> Result<()> {
        let name = self.resolve_name(path)?;
        self.include_canonical(&name)
    }

    /// Read a member of an imported namespace, initializing it first if it
    /// was imported lazily.
    pub fn namespace_var(&mut self, alias: &str, member: &str) -> Result<Option<Value>> {
        let index = self.alias_index(alias).ok_or_else(|| Error::Eval {
            template: self.current_template_name().to_string(),
            message: format!("no namespace is imported as {:?}", alias),
        })?;
        self.force_lazy(index)?;
        Ok(self.namespaces[index].vars.get(member).cloned())
    }

    pub fn namespace_status(&self, alias: &str) -> Option<NamespaceStatus> {
        self.alias_index(alias)
            .map(|index| self.namespaces[index].state.status())
    }

    /// The template behind an initialized namespace.
    pub fn namespace_template(&self, alias: &str) -> Option<&Arc<Template>> {
        self.alias_index(alias)
            .and_then(|index| self.namespaces[index].template.as_ref())
    }

    /// Aliases imported into the namespace currently executing.
    pub fn namespace_aliases(&self) -> Vec<&str> {
        self.namespaces[self.current_namespace()]
            .imports
            .keys()
            .map(String::as_str)
            .collect()
    }

    /// Run auto-imports, then auto-includes. Only the first call does work.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        let format = self.engine.globals().name_format();
        let lazy = self.settings.effective_lazy_auto_imports();
        for (alias, path) in self.settings.auto_imports() {
            let name = format.normalize(&path)?;
            self.import_canonical(name, &alias, lazy)?;
        }
        for path in self.settings.auto_includes() {
            let name = format.normalize(&path)?;
            self.include_canonical(&name)?;
        }
        Ok(())
    }

    /// Start, then execute the main template.
    pub fn process(&mut self) -> Result<()> {
        self.start()?;
        let template = Arc::clone(&self.template);
        self.execute_in(&template, MAIN)
    }

    /// Process and return the output.
    pub fn render(mut self) -> Result<String> {
        self.process()?;
        Ok(self.output)
    }

    fn resolve_name(&self, path: &str) -> Result<String> {
        let format = self.engine.globals().name_format();
        Ok(format
            .resolve_relative(self.current_template_name(), path)?
            .canonical)
    }

    fn alias_index(&self, alias: &str) -> Option<usize> {
        self.namespaces[self.current_namespace()]
            .imports
            .get(alias)
            .or_else(|| self.namespaces[MAIN].imports.get(alias))
            .copied()
    }

    fn import_canonical(&mut self, name: String, alias: &str, lazy: bool) -> Result<()> {
        let current = self.current_namespace();
        let index = match self.by_name.get(&name) {
            Some(index) => *index,
            None => {
                let index = self.namespaces.len();
                let state = NamespaceState::Unresolved {
                    locale: self.locale(),
                };
                let host = self.current_template_name().to_string();
                self.namespaces.push(Namespace::new(name.clone(), host, state));
                self.by_name.insert(name, index);
                index
            }
        };
        self.namespaces[current]
            .imports
            .insert(alias.to_string(), index);

        if lazy {
            debug!(alias, name = %self.namespaces[index].name, "lazy import installed");
            Ok(())
        } else {
            // a namespace still initializing (mutual imports) is bound as is
            self.initialize(index)
        }
    }

    fn include_canonical(&mut self, name: &str) -> Result<()> {
        let locale = self.locale();
        let template = self
            .engine
            .resolve(name, Some(&locale), self.template.token.as_ref(), true)?;
        let current = self.current_namespace();
        self.execute_in(&template, current)
    }

    /// Initialize a namespace, wrapping failures with the import context.
    fn force_lazy(&mut self, index: usize) -> Result<()> {
        self.initialize(index).map_err(|source| {
            let namespace = &self.namespaces[index];
            Error::LazyInit {
                import: namespace.name.clone(),
                host: namespace.host.clone(),
                source: Arc::new(source),
            }
        })
    }

    fn initialize(&mut self, index: usize) -> Result<()> {
        match &self.namespaces[index].state {
            NamespaceState::Ready => return Ok(()),
            NamespaceState::Failed(err) => return Err(err.clone()),
            // re-entered through an import cycle; members set so far are visible
            NamespaceState::Resolving => return Ok(()),
            NamespaceState::Unresolved { .. } => {}
        }

        let NamespaceState::Unresolved { locale } =
            std::mem::replace(&mut self.namespaces[index].state, NamespaceState::Resolving)
        else {
            return Ok(());
        };
        debug!(name = %self.namespaces[index].name, locale = %locale, "initializing imported namespace");

        let result = self.run_namespace(index, &locale);
        self.namespaces[index].state = match &result {
            Ok(()) => NamespaceState::Ready,
            Err(err) => NamespaceState::Failed(err.clone()),
        };
        result
    }

    /// Runs the imported template under the locale captured at import time.
    /// Its output is discarded.
    fn run_namespace(&mut self, index: usize, locale: &Locale) -> Result<()> {
        let name = self.namespaces[index].name.clone();
        let template = self
            .engine
            .resolve(&name, Some(locale), self.template.token.as_ref(), true)?;
        self.namespaces[index].template = Some(Arc::clone(&template));

        let session_layer = self.settings.layer_mut(LayerKind::RenderSession);
        let previous_locale = session_layer.unset(SettingKey::Locale);
        session_layer.set(SettingKey::Locale, SettingValue::Locale(locale.clone()))?;
        let output = std::mem::take(&mut self.output);

        let result = self.execute_in(&template, index);

        self.output = output;
        let session_layer = self.settings.layer_mut(LayerKind::RenderSession);
        session_layer.unset(SettingKey::Locale);
        if let Some(previous) = previous_locale {
            session_layer.set(SettingKey::Locale, previous)?;
        }
        result
    }

    fn execute_in(&mut self, template: &Arc<Template>, namespace: usize) -> Result<()> {
        match &template.body {
            TemplateBody::PlainText(text) => {
                self.output.push_str(text);
                Ok(())
            }
            TemplateBody::Parsed(body) => {
                let body = Arc::clone(body);
                self.frames.push(Frame {
                    template_name: template.name.clone(),
                    namespace,
                });
                let result = body.execute(self);
                self.frames.pop();
                result
            }
        }
    }
}

fn reject_engine_level(key: SettingKey) -> Result<()> {
    if key.descriptor().engine_level {
        Err(ConfigError::EngineLevelOnly(key.snake_name()).into())
    } else {
        Ok(())
    }
}
