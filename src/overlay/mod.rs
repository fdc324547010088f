//! Source overlays and their selection
//!
//! An overlay is an immutable settings layer applied to templates whose name
//! a matcher accepts. Selectors compose overlays:
//!
//! - `Conditional`: one matcher guarding one selector
//! - `FirstMatch`: the first choice that yields an overlay wins
//! - `Merging`: every yielding choice, merged in listed order

mod matcher;

pub use matcher::{GlobPattern, Matcher, MatcherError, NameMatcher};

use std::fmt;
use std::sync::Arc;

use crate::config::{merge_pair, SettingKey, SettingValue, SettingsLayer};
use crate::error::{Error, Result};

/// An immutable, mergeable settings layer for matched templates.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    settings: Arc<SettingsLayer>,
}

impl Overlay {
    /// Engine-level settings are rejected.
    pub fn new(settings: SettingsLayer) -> Result<Self> {
        if let Some(key) = settings.engine_level_keys().first() {
            return Err(Error::Config(format!(
                "setting {} can only be set on the engine level, not in an overlay",
                key
            )));
        }
        Ok(Self {
            settings: Arc::new(settings),
        })
    }

    /// Build from `(name, raw value)` pairs.
    pub fn from_strs<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut settings = SettingsLayer::new();
        for (name, raw) in entries {
            settings.set_str(name, raw)?;
        }
        Self::new(settings)
    }

    /// One-setting overlay.
    pub fn single(key: SettingKey, value: SettingValue) -> Result<Self> {
        let mut settings = SettingsLayer::new();
        settings.set(key, value)?;
        Self::new(settings)
    }

    pub fn settings(&self) -> &SettingsLayer {
        &self.settings
    }

    pub(crate) fn shared_settings(&self) -> Arc<SettingsLayer> {
        Arc::clone(&self.settings)
    }

    /// A new overlay with `higher` applied on top of `self`.
    pub fn merge(&self, higher: &Overlay) -> Overlay {
        Overlay {
            settings: Arc::new(merge_pair(&self.settings, &higher.settings)),
        }
    }
}

/// User-supplied selection policy.
pub trait SelectOverlay: Send + Sync + fmt::Debug {
    fn select(&self, name: &str) -> Result<Option<Overlay>>;
}

/// How overlays are chosen for a template name.
#[derive(Debug, Clone)]
pub enum OverlaySelector {
    /// Always this overlay.
    Fixed(Overlay),
    Conditional {
        matcher: Matcher,
        then: Box<OverlaySelector>,
    },
    FirstMatch {
        choices: Vec<OverlaySelector>,
        /// Yield no overlay instead of failing when nothing matches
        allow_no_match: bool,
        /// Extra text for the no-match error
        no_match_message: Option<String>,
    },
    Merging(Vec<OverlaySelector>),
    Custom(Arc<dyn SelectOverlay>),
}

impl From<Overlay> for OverlaySelector {
    fn from(overlay: Overlay) -> Self {
        OverlaySelector::Fixed(overlay)
    }
}

impl OverlaySelector {
    pub fn conditional(matcher: Matcher, then: impl Into<OverlaySelector>) -> Self {
        OverlaySelector::Conditional {
            matcher,
            then: Box::new(then.into()),
        }
    }

    /// First-match selector that fails when nothing matches.
    pub fn first_match(choices: impl IntoIterator<Item = OverlaySelector>) -> Self {
        OverlaySelector::FirstMatch {
            choices: choices.into_iter().collect(),
            allow_no_match: false,
            no_match_message: None,
        }
    }

    pub fn merging(selectors: impl IntoIterator<Item = OverlaySelector>) -> Self {
        OverlaySelector::Merging(selectors.into_iter().collect())
    }

    pub fn custom(selector: impl SelectOverlay + 'static) -> Self {
        OverlaySelector::Custom(Arc::new(selector))
    }

    /// Set `allow_no_match` on a first-match selector; no effect on others.
    pub fn allow_no_match(mut self, allow: bool) -> Self {
        if let OverlaySelector::FirstMatch { allow_no_match, .. } = &mut self {
            *allow_no_match = allow;
        }
        self
    }

    /// Set the no-match message of a first-match selector.
    pub fn no_match_message(mut self, message: impl Into<String>) -> Self {
        if let OverlaySelector::FirstMatch {
            no_match_message, ..
        } = &mut self
        {
            *no_match_message = Some(message.into());
        }
        self
    }

    /// The overlay for `name`, if any. Pure: the same name always selects
    /// the same overlay.
    pub fn select(&self, name: &str) -> Result<Option<Overlay>> {
        match self {
            OverlaySelector::Fixed(overlay) => Ok(Some(overlay.clone())),
            OverlaySelector::Conditional { matcher, then } => {
                if matcher.matches(name) {
                    then.select(name)
                } else {
                    Ok(None)
                }
            }
            OverlaySelector::FirstMatch {
                choices,
                allow_no_match,
                no_match_message,
            } => {
                for choice in choices {
                    if let Some(overlay) = choice.select(name)? {
                        return Ok(Some(overlay));
                    }
                }
                if *allow_no_match {
                    Ok(None)
                } else {
                    Err(Error::AmbiguousOverlay {
                        name: name.to_string(),
                        message: no_match_message
                            .clone()
                            .unwrap_or_else(|| "none of the first-match choices matched".into()),
                    })
                }
            }
            OverlaySelector::Merging(selectors) => {
                let mut merged: Option<Overlay> = None;
                for selector in selectors {
                    if let Some(overlay) = selector.select(name)? {
                        merged = Some(match merged {
                            Some(lower) => lower.merge(&overlay),
                            None => overlay,
                        });
                    }
                }
                Ok(merged)
            }
            OverlaySelector::Custom(selector) => selector.select(name),
        }
    }
}
