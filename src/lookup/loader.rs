//! The byte-level source loader interface and an in-memory loader

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Source identity and version of a previously loaded source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedVersion {
    pub source_id: String,
    pub version: String,
}

/// A source the loader found.
#[derive(Clone, PartialEq, Eq)]
pub struct LoadedSource {
    /// Loader-assigned identity of the byte source
    pub source_id: String,
    /// Opaque version used for change detection
    pub version: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for LoadedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedSource")
            .field("source_id", &self.source_id)
            .field("version", &self.version)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Result of one loader probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    NotFound,
    /// The source is the one described by `since` and has not changed.
    Unchanged,
    Found(LoadedSource),
}

/// Loader errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    #[error("I/O error while loading {name:?}: {message}")]
    Io { name: String, message: String },

    #[error("Loader unavailable: {0}")]
    Unavailable(String),

    #[error("Loader session error: {0}")]
    Session(String),

    #[error("Loader reported an unchanged source without a cached version")]
    UnexpectedUnchanged,
}

/// Per-resolution state a loader may keep (connections, handles).
pub trait LoaderSession: Send {
    fn close(self: Box<Self>) -> Result<(), LoaderError>;
}

/// Reads template sources by name.
pub trait TemplateLoader: Send + Sync + fmt::Debug {
    /// Probe one candidate name.
    ///
    /// With `since` given, a loader that can tell the source is unchanged
    /// returns [`LoadOutcome::Unchanged`] instead of re-reading it.
    fn load(
        &self,
        name: &str,
        since: Option<&CachedVersion>,
        session: Option<&mut (dyn LoaderSession + 'static)>,
    ) -> Result<LoadOutcome, LoaderError>;

    /// Open a session for one resolution; `None` if the loader has none.
    fn create_session(&self) -> Option<Box<dyn LoaderSession>> {
        None
    }

    /// Drop any internal state; called when the whole cache is cleared.
    fn reset_state(&self) {}
}

/// Version of a byte source: hex SHA-256 of its content.
pub fn content_version(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Default)]
struct MapLoaderStats {
    found: AtomicUsize,
    resets: AtomicUsize,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
}

/// Thread-safe in-memory loader.
///
/// The source identity is the template name; versions are content digests.
/// Every probed name is recorded for diagnostics.
#[derive(Debug, Default)]
pub struct MapLoader {
    templates: Mutex<BTreeMap<String, Vec<u8>>>,
    probes: Mutex<Vec<String>>,
    stats: Arc<MapLoaderStats>,
}

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MapLoader::put`].
    pub fn with(self, name: impl Into<String>, source: impl Into<Vec<u8>>) -> Self {
        self.put(name, source);
        self
    }

    /// Add or replace a source.
    pub fn put(&self, name: impl Into<String>, source: impl Into<Vec<u8>>) {
        self.templates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), source.into());
    }

    pub fn remove(&self, name: &str) -> bool {
        self.templates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some()
    }

    /// Names probed so far, in order.
    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Return and forget the probed names.
    pub fn take_probes(&self) -> Vec<String> {
        std::mem::take(&mut *self.probes.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Number of probes that returned the full source.
    pub fn found_count(&self) -> usize {
        self.stats.found.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> usize {
        self.stats.resets.load(Ordering::SeqCst)
    }

    /// (opened, closed) session counts.
    pub fn session_counts(&self) -> (usize, usize) {
        (
            self.stats.sessions_opened.load(Ordering::SeqCst),
            self.stats.sessions_closed.load(Ordering::SeqCst),
        )
    }
}

struct MapLoaderSession {
    stats: Arc<MapLoaderStats>,
}

impl LoaderSession for MapLoaderSession {
    fn close(self: Box<Self>) -> Result<(), LoaderError> {
        self.stats.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl TemplateLoader for MapLoader {
    fn load(
        &self,
        name: &str,
        since: Option<&CachedVersion>,
        _session: Option<&mut (dyn LoaderSession + 'static)>,
    ) -> Result<LoadOutcome, LoaderError> {
        trace!(name, "probing in-memory loader");
        self.probes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(name.to_string());

        let bytes = match self
            .templates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            Some(bytes) => bytes.clone(),
            None => return Ok(LoadOutcome::NotFound),
        };

        let version = content_version(&bytes);
        if let Some(since) = since {
            if since.source_id == name && since.version == version {
                return Ok(LoadOutcome::Unchanged);
            }
        }

        self.stats.found.fetch_add(1, Ordering::SeqCst);
        Ok(LoadOutcome::Found(LoadedSource {
            source_id: name.to_string(),
            version,
            bytes,
        }))
    }

    fn create_session(&self) -> Option<Box<dyn LoaderSession>> {
        self.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(MapLoaderSession {
            stats: Arc::clone(&self.stats),
        }))
    }

    fn reset_state(&self) {
        self.stats.resets.fetch_add(1, Ordering::SeqCst);
    }
}
