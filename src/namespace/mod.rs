//! Render sessions and imported namespaces
//!
//! Each import gets a namespace that moves through
//! `Unresolved -> Resolving -> Ready | Failed`. Eager imports run that
//! transition at import time; lazy ones run it on first member access, and a
//! failure then surfaces as [`Error::LazyInit`](crate::Error::LazyInit).

mod session;

pub use session::RenderSession;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Error;
use crate::lookup::Locale;
use crate::template::Template;

/// Observable state of an imported namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceStatus {
    Unresolved,
    Resolving,
    Ready,
    Failed,
}

#[derive(Debug)]
enum NamespaceState {
    /// Not initialized yet; remembers the locale current at import time.
    Unresolved { locale: Locale },
    Resolving,
    Ready,
    Failed(Error),
}

impl NamespaceState {
    fn status(&self) -> NamespaceStatus {
        match self {
            NamespaceState::Unresolved { .. } => NamespaceStatus::Unresolved,
            NamespaceState::Resolving => NamespaceStatus::Resolving,
            NamespaceState::Ready => NamespaceStatus::Ready,
            NamespaceState::Failed(_) => NamespaceStatus::Failed,
        }
    }
}

#[derive(Debug)]
struct Namespace {
    /// Canonical name of the imported template
    name: String,
    /// Name of the template that performed the import
    host: String,
    state: NamespaceState,
    template: Option<Arc<Template>>,
    vars: BTreeMap<String, Value>,
    /// alias -> namespace index
    imports: BTreeMap<String, usize>,
}

impl Namespace {
    fn new(name: String, host: String, state: NamespaceState) -> Self {
        Self {
            name,
            host,
            state,
            template: None,
            vars: BTreeMap::new(),
            imports: BTreeMap::new(),
        }
    }
}
