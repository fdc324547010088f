//! tplcore - template engine configuration and resolution core
//!
//! This crate resolves the settings that apply to a template from layered
//! sources (global defaults, name-matched overlays, the template header and
//! the render session), turns template names into loaded and parsed
//! templates through a pluggable lookup strategy and loader, caches the
//! results with update-delay staleness checks, and initializes imported
//! namespaces eagerly or on first use.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod lookup;
pub mod namespace;
pub mod overlay;
pub mod template;

pub use tplcore_names::{MalformedNameError, NameFormat};

pub use config::{CaseConvention, GlobalDefaults, LayerStack, SettingKey, SettingValue, SettingsLayer};
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, Result};
pub use lookup::{Locale, LookupStrategy, MapLoader, RoutingToken, TemplateLoader};
pub use namespace::{NamespaceStatus, RenderSession};
pub use overlay::{Matcher, Overlay, OverlaySelector};
pub use template::{Template, TemplateLanguage};
