//! Resolution cache
//!
//! Memoizes `(name, locale, token, parse, parse-config fingerprint)` to a
//! parsed template or a negative result. An entry younger than the update
//! delay is used as is; an older one is re-validated against the loader,
//! which either confirms the cached source unchanged or hands out a new one.
//!
//! Parsing is shared per source identity: concurrent requests that resolve
//! to the same source and version wait for one parse and get the same
//! template.

mod clock;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock, UpdateDelay};
pub use storage::{
    CacheStorage, MruCacheStorage, NullCacheStorage, SoftCacheStorage, StrongCacheStorage,
};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

use crate::config::{GlobalSettings, LayerKind, SettingKey};
use crate::error::{Error, Result};
use crate::lookup::{
    CachedVersion, LoadedSource, LoaderError, Locale, LookupContext, LookupHit, LookupStrategy,
    RoutingToken, TemplateLoader,
};
use crate::overlay::OverlaySelector;
use crate::template::{
    decode, LanguageRegistry, ParseError, ParseOutcome, ParseRequest, Template, TemplateBody,
};

/// Identity of one resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    /// Canonical root-based name
    pub name: String,
    pub locale: Option<Locale>,
    pub token: Option<RoutingToken>,
    /// Parsed template, or raw text
    pub parse: bool,
    /// Fingerprint of the parse-relevant global settings
    pub fingerprint: String,
}

impl LookupKey {
    pub fn new(
        name: impl Into<String>,
        locale: Option<Locale>,
        token: Option<RoutingToken>,
        parse: bool,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            locale,
            token,
            parse,
            fingerprint: fingerprint.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CachedOutcome {
    Found(Arc<Template>),
    /// Every candidate missed.
    Missing { tried: Vec<String> },
}

/// A cached lookup result. Entries are replaced, never mutated.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub outcome: CachedOutcome,
    pub last_checked: DateTime<Utc>,
}

impl CacheEntry {
    pub fn template(&self) -> Option<&Arc<Template>> {
        match &self.outcome {
            CachedOutcome::Found(template) => Some(template),
            CachedOutcome::Missing { .. } => None,
        }
    }

    fn cached_version(&self) -> Option<CachedVersion> {
        self.template().map(|t| CachedVersion {
            source_id: t.source_id.clone(),
            version: t.version.clone(),
        })
    }

    fn result(&self, name: &str) -> Result<Arc<Template>> {
        match &self.outcome {
            CachedOutcome::Found(template) => Ok(Arc::clone(template)),
            CachedOutcome::Missing { tried } => Err(Error::NotFound {
                name: name.to_string(),
                tried: tried.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ArtifactKey {
    source_id: String,
    candidate: String,
    locale: Option<Locale>,
    token: Option<RoutingToken>,
    parse: bool,
    fingerprint: String,
}

#[derive(Debug, Default)]
struct ArtifactSlot {
    version: Option<String>,
    template: Weak<Template>,
}

/// The collaborators a resolver works with.
pub struct ResolverParts {
    pub loader: Arc<dyn TemplateLoader>,
    pub strategy: Arc<dyn LookupStrategy>,
    pub overlays: Option<OverlaySelector>,
    pub languages: LanguageRegistry,
    pub storage: Box<dyn CacheStorage>,
    pub clock: Arc<dyn Clock>,
}

/// Looks templates up, parses them and caches the results.
pub struct TemplateResolver {
    loader: Arc<dyn TemplateLoader>,
    strategy: Arc<dyn LookupStrategy>,
    overlays: Option<OverlaySelector>,
    languages: LanguageRegistry,
    storage: Box<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<ArtifactKey, Arc<Mutex<ArtifactSlot>>>>,
    builds: AtomicUsize,
}

impl fmt::Debug for TemplateResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateResolver")
            .field("loader", &self.loader)
            .field("strategy", &self.strategy)
            .field("storage", &self.storage)
            .field("builds", &self.builds)
            .finish_non_exhaustive()
    }
}

impl TemplateResolver {
    pub fn new(parts: ResolverParts) -> Self {
        Self {
            loader: parts.loader,
            strategy: parts.strategy,
            overlays: parts.overlays,
            languages: parts.languages,
            storage: parts.storage,
            clock: parts.clock,
            slots: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn supports_caching(&self) -> bool {
        self.strategy.supports_caching()
    }

    pub fn loader(&self) -> &Arc<dyn TemplateLoader> {
        &self.loader
    }

    /// Number of templates built (parsed or decoded) so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Number of cached entries, negative ones included.
    pub fn cache_len(&self) -> usize {
        self.storage.len()
    }

    /// Return the cached template for `key`, re-validating or loading it as
    /// needed.
    pub fn get_or_load(&self, key: &LookupKey, globals: &GlobalSettings) -> Result<Arc<Template>> {
        let caching = self.supports_caching();
        let now = self.clock.now();
        let cached = if caching { self.storage.get(key) } else { None };

        match &cached {
            Some(entry) if globals.update_delay().is_fresh(entry.last_checked, now) => {
                debug!(name = %key.name, "cached copy not yet stale; using cached");
                return entry.result(&key.name);
            }
            Some(_) => debug!(name = %key.name, "cached copy stale; re-validating"),
            None => debug!(name = %key.name, locale = ?key.locale, "no cached result; looking up"),
        }

        let since = cached.as_ref().and_then(|e| e.cached_version());
        let mut ctx = LookupContext::new(
            self.loader.as_ref(),
            &key.name,
            key.locale.as_ref(),
            key.token.as_ref(),
            globals.localized_lookup(),
            since.as_ref(),
        );
        let hit = self.strategy.lookup(&mut ctx);
        let tried = ctx.finish();
        let hit = hit.map_err(|source| Error::Loader {
            name: key.name.clone(),
            source,
        })?;

        let outcome = match hit {
            None => {
                debug!(name = %key.name, tried = tried.len(), "no source found; caching negative result");
                CachedOutcome::Missing { tried }
            }
            Some(LookupHit::Unchanged { candidate }) => {
                match cached.as_ref().and_then(|e| e.template()) {
                    Some(template) => {
                        debug!(name = %key.name, candidate = %candidate, "source unchanged; keeping cached template");
                        CachedOutcome::Found(Arc::clone(template))
                    }
                    None => {
                        return Err(Error::Loader {
                            name: candidate,
                            source: LoaderError::UnexpectedUnchanged,
                        })
                    }
                }
            }
            Some(LookupHit::Found { candidate, source }) => {
                if since.is_some() {
                    debug!(name = %key.name, candidate = %candidate, "reloading because version or source changed");
                }
                CachedOutcome::Found(self.build_shared(key, candidate, source, globals)?)
            }
        };

        let entry = CacheEntry {
            outcome,
            last_checked: now,
        };
        let result = entry.result(&key.name);
        if caching {
            self.storage.put(key.clone(), Arc::new(entry));
        }
        result
    }

    /// Drop the entry of one key.
    pub fn remove(&self, key: &LookupKey) -> Result<()> {
        self.ensure_caching("remove")?;
        self.storage.remove(key);
        self.prune_slots();
        Ok(())
    }

    /// Drop every entry and reset the loader's state.
    pub fn clear(&self) -> Result<()> {
        self.ensure_caching("clear")?;
        self.storage.clear();
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.loader.reset_state();
        debug!("template cache cleared");
        Ok(())
    }

    /// Drop every entry built under another parse-config fingerprint; such
    /// keys can no longer be requested.
    pub fn retain_fingerprint(&self, fingerprint: &str) {
        if !self.supports_caching() {
            return;
        }
        let before = self.storage.len();
        self.storage.retain(&|key| key.fingerprint == fingerprint);
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|key, _| key.fingerprint == fingerprint);
        self.prune_slots();
        debug!(
            dropped = before.saturating_sub(self.storage.len()),
            "dropped cache entries of a previous configuration"
        );
    }

    /// Number of per-source build slots currently tracked.
    pub fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn ensure_caching(&self, operation: &str) -> Result<()> {
        if self.supports_caching() {
            Ok(())
        } else {
            Err(Error::UnsupportedOperation(format!(
                "cache {} is not supported by lookup strategy {:?}",
                operation, self.strategy
            )))
        }
    }

    fn prune_slots(&self) {
        retain_live_slots(&mut self.slots.lock().unwrap_or_else(|e| e.into_inner()));
    }

    /// Build a template, or share the one another request built from the
    /// same source version.
    fn build_shared(
        &self,
        key: &LookupKey,
        candidate: String,
        source: LoadedSource,
        globals: &GlobalSettings,
    ) -> Result<Arc<Template>> {
        let slot_key = ArtifactKey {
            source_id: source.source_id.clone(),
            candidate: candidate.clone(),
            locale: key.locale.clone(),
            token: key.token.clone(),
            parse: key.parse,
            fingerprint: key.fingerprint.clone(),
        };
        loop {
            let shared = {
                let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
                if !slots.contains_key(&slot_key) {
                    retain_live_slots(&mut slots);
                }
                Arc::clone(slots.entry(slot_key.clone()).or_default())
            };

            let mut slot = shared.lock().unwrap_or_else(|e| e.into_inner());
            // pruned between lookup and lock: building here would not be shared
            let registered = self
                .slots
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&slot_key)
                .is_some_and(|current| Arc::ptr_eq(current, &shared));
            if !registered {
                continue;
            }

            if slot.version.as_deref() == Some(source.version.as_str()) {
                if let Some(template) = slot.template.upgrade() {
                    debug!(candidate = %candidate, "sharing template built by another request");
                    return Ok(template);
                }
            }

            let template = Arc::new(self.build(key, candidate, source, globals)?);
            slot.version = Some(template.version.clone());
            slot.template = Arc::downgrade(&template);
            return Ok(template);
        }
    }

    fn build(
        &self,
        key: &LookupKey,
        candidate: String,
        source: LoadedSource,
        globals: &GlobalSettings,
    ) -> Result<Template> {
        let mut settings = globals.stack();
        if let Some(selector) = &self.overlays {
            if let Some(overlay) = selector.select(&candidate)? {
                settings.push(LayerKind::SourceOverlay, overlay.shared_settings());
            }
        }

        // an overlay's locale is stronger than the requested one
        let overlay_locale = settings
            .resolve(SettingKey::Locale)
            .filter(|r| r.origin > LayerKind::GlobalDefaults)
            .and_then(|r| r.value.as_locale().cloned());
        let mut locale = overlay_locale
            .or_else(|| key.locale.clone())
            .unwrap_or_else(|| settings.locale());
        let mut encoding = settings.source_encoding();

        let decode_error = |message: String| Error::Parse {
            name: candidate.clone(),
            source: ParseError::new(0, 0, message),
        };

        let body = if !key.parse {
            TemplateBody::PlainText(decode(&source.bytes, &encoding).map_err(decode_error)?)
        } else {
            let language_name = settings.template_language();
            let language = self.languages.get(&language_name).cloned().ok_or_else(|| {
                Error::Config(format!("unknown template language {:?}", language_name))
            })?;

            let mut retried = false;
            loop {
                let text = decode(&source.bytes, &encoding).map_err(decode_error)?;
                let request = ParseRequest {
                    name: &candidate,
                    source: &text,
                    encoding: &encoding,
                    locale: &locale,
                    settings: &settings,
                };
                let outcome = language.parse(&request).map_err(|e| Error::Parse {
                    name: candidate.clone(),
                    source: e,
                })?;
                match outcome {
                    ParseOutcome::Parsed { header, body } => {
                        if let Some(engine_key) = header.engine_level_keys().first() {
                            return Err(Error::Config(format!(
                                "setting {} can only be set on the engine level, not in the header of {:?}",
                                engine_key, candidate
                            )));
                        }
                        if !header.is_empty() {
                            settings.push(LayerKind::InSourceHeader, Arc::new(header));
                        }
                        break TemplateBody::Parsed(body);
                    }
                    ParseOutcome::WrongEncoding { requested }
                        if !retried && !requested.eq_ignore_ascii_case(&encoding) =>
                    {
                        debug!(candidate = %candidate, from = %encoding, to = %requested, "re-parsing with the encoding the header requested");
                        encoding = requested;
                        retried = true;
                    }
                    ParseOutcome::WrongEncoding { requested } => {
                        return Err(decode_error(format!(
                            "header requested encoding {:?} while parsing as {:?}",
                            requested, encoding
                        )));
                    }
                }
            }
        };

        if let Some(resolved) = settings.resolve(SettingKey::Locale) {
            if resolved.origin == LayerKind::InSourceHeader {
                if let Some(header_locale) = resolved.value.as_locale() {
                    locale = header_locale.clone();
                }
            }
        }

        self.builds.fetch_add(1, Ordering::SeqCst);
        debug!(candidate = %candidate, source_id = %source.source_id, parsed = key.parse, "template built");
        Ok(Template {
            name: candidate,
            requested_name: key.name.clone(),
            source_id: source.source_id,
            version: source.version,
            locale,
            token: key.token.clone(),
            encoding,
            settings,
            body,
        })
    }
}

/// Keep slots whose template is still alive or that are being filled.
fn retain_live_slots(slots: &mut HashMap<ArtifactKey, Arc<Mutex<ArtifactSlot>>>) {
    slots.retain(|_, slot| match slot.try_lock() {
        Ok(slot) => slot.template.strong_count() > 0,
        Err(_) => true,
    });
}
