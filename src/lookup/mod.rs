//! Template lookup
//!
//! A [`LookupStrategy`] turns a canonical name, a locale and a routing token
//! into loader probes. The default order is locale-suffix outer, acquisition
//! inner:
//!
//! - locale suffixes `_aa_BB_CC`, `_aa_BB`, `_aa`, then none
//! - for each suffix, the acquisition candidates of the name, deepest first
//!
//! Custom strategies reuse the same two primitives through [`LookupContext`].

mod loader;
mod locale;

pub use loader::{
    content_version, CachedVersion, LoadOutcome, LoadedSource, LoaderError, LoaderSession,
    MapLoader, TemplateLoader,
};
pub use locale::{insert_locale_suffix, Locale, LocaleError};

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{trace, warn};
use tplcore_names::ACQUISITION_MARKER;

/// An opaque application-supplied value used to route lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutingToken(String);

impl RoutingToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoutingToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// A successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupHit {
    Found {
        /// The candidate name that hit
        candidate: String,
        source: LoadedSource,
    },
    /// The cached source was hit again and has not changed.
    Unchanged { candidate: String },
}

impl LookupHit {
    pub fn candidate(&self) -> &str {
        match self {
            LookupHit::Found { candidate, .. } | LookupHit::Unchanged { candidate } => candidate,
        }
    }
}

/// Acquisition candidates of a root-based name, deepest first.
///
/// `a/b/*/sub/i` gives `a/b/sub/i`, `a/sub/i`, `sub/i`. Without a marker
/// step the name is the only candidate. When several marker steps occur
/// the last one drives the search and earlier ones are dropped.
pub fn acquisition_candidates(name: &str) -> Vec<String> {
    let (scheme, path) = match name.find("://") {
        Some(i) => name.split_at(i + 3),
        None => ("", name),
    };
    let steps: Vec<&str> = path.split('/').collect();
    let marker = match steps.iter().rposition(|s| *s == ACQUISITION_MARKER) {
        Some(i) if i + 1 < steps.len() => i,
        _ => return vec![name.to_string()],
    };

    let parents: Vec<&str> = steps[..marker]
        .iter()
        .copied()
        .filter(|s| *s != ACQUISITION_MARKER)
        .collect();
    let rest = steps[marker + 1..].join("/");
    (0..=parents.len())
        .rev()
        .map(|depth| {
            let mut candidate = String::from(scheme);
            for parent in &parents[..depth] {
                candidate.push_str(parent);
                candidate.push('/');
            }
            candidate.push_str(&rest);
            candidate
        })
        .collect()
}

/// State of one resolution: the request, the loader, and the probes so far.
pub struct LookupContext<'a> {
    loader: &'a dyn TemplateLoader,
    name: &'a str,
    locale: Option<&'a Locale>,
    token: Option<&'a RoutingToken>,
    localized_lookup: bool,
    since: Option<&'a CachedVersion>,
    session: Option<Box<dyn LoaderSession>>,
    tried: Vec<String>,
}

impl<'a> LookupContext<'a> {
    pub fn new(
        loader: &'a dyn TemplateLoader,
        name: &'a str,
        locale: Option<&'a Locale>,
        token: Option<&'a RoutingToken>,
        localized_lookup: bool,
        since: Option<&'a CachedVersion>,
    ) -> Self {
        Self {
            loader,
            name,
            locale,
            token,
            localized_lookup,
            since,
            session: loader.create_session(),
            tried: Vec::new(),
        }
    }

    /// The canonical requested name.
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn locale(&self) -> Option<&'a Locale> {
        self.locale
    }

    pub fn token(&self) -> Option<&'a RoutingToken> {
        self.token
    }

    pub fn localized_lookup(&self) -> bool {
        self.localized_lookup
    }

    /// Candidate names probed so far, in order.
    pub fn tried(&self) -> &[String] {
        &self.tried
    }

    /// Probe exactly one candidate.
    pub fn load(&mut self, candidate: &str) -> Result<Option<LookupHit>, LoaderError> {
        self.tried.push(candidate.to_string());
        let outcome = self
            .loader
            .load(candidate, self.since, self.session.as_deref_mut())?;
        trace!(candidate, found = !matches!(outcome, LoadOutcome::NotFound), "lookup probe");
        Ok(match outcome {
            LoadOutcome::NotFound => None,
            LoadOutcome::Unchanged => Some(LookupHit::Unchanged {
                candidate: candidate.to_string(),
            }),
            LoadOutcome::Found(source) => Some(LookupHit::Found {
                candidate: candidate.to_string(),
                source,
            }),
        })
    }

    /// Probe the acquisition candidates of `name`, deepest first.
    pub fn lookup_with_acquisition(
        &mut self,
        name: &str,
    ) -> Result<Option<LookupHit>, LoaderError> {
        for candidate in acquisition_candidates(name) {
            if let Some(hit) = self.load(&candidate)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Probe each locale suffix of `locale` (most specific first), each with
    /// acquisition. Without a locale, or with localized lookup disabled,
    /// only the unsuffixed name is tried.
    pub fn lookup_with_locale_then_acquisition(
        &mut self,
        name: &str,
        locale: Option<&Locale>,
    ) -> Result<Option<LookupHit>, LoaderError> {
        let suffixes = match locale {
            Some(locale) if self.localized_lookup => locale.suffixes(),
            _ => vec![String::new()],
        };
        for suffix in suffixes {
            let localized = insert_locale_suffix(name, &suffix);
            if let Some(hit) = self.lookup_with_acquisition(&localized)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Close the loader session and return the tried candidates.
    pub fn finish(mut self) -> Vec<String> {
        if let Some(session) = self.session.take() {
            if let Err(err) = session.close() {
                warn!(name = self.name, error = %err, "failed to close loader session");
            }
        }
        self.tried
    }
}

/// Decides which candidates to probe, in which order.
pub trait LookupStrategy: Send + Sync + fmt::Debug {
    fn lookup(&self, ctx: &mut LookupContext<'_>) -> Result<Option<LookupHit>, LoaderError>;

    /// Strategies whose results must never be cached return false; cache
    /// operations then fail with an unsupported-operation error.
    fn supports_caching(&self) -> bool {
        true
    }
}

/// Locale fallback outer, acquisition inner. The routing token is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLookupStrategy;

impl LookupStrategy for DefaultLookupStrategy {
    fn lookup(&self, ctx: &mut LookupContext<'_>) -> Result<Option<LookupHit>, LoaderError> {
        let (name, locale) = (ctx.name(), ctx.locale());
        ctx.lookup_with_locale_then_acquisition(name, locale)
    }
}

/// Tries `<token>/<name>` before the plain name when a routing token is given.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenPrefixLookupStrategy;

impl LookupStrategy for TokenPrefixLookupStrategy {
    fn lookup(&self, ctx: &mut LookupContext<'_>) -> Result<Option<LookupHit>, LoaderError> {
        let (name, locale) = (ctx.name(), ctx.locale());
        if let Some(token) = ctx.token() {
            let routed = format!("{}/{}", token.as_str(), name);
            if let Some(hit) = ctx.lookup_with_locale_then_acquisition(&routed, locale)? {
                return Ok(Some(hit));
            }
        }
        ctx.lookup_with_locale_then_acquisition(name, locale)
    }
}
