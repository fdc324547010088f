//! Error taxonomy
//!
//! Every error is recoverable by the caller: re-issue the request, change the
//! input, or register the missing overlay.

use std::sync::Arc;

use crate::config::ConfigError;
use crate::lookup::LoaderError;
use crate::template::ParseError;
use tplcore_names::MalformedNameError;

/// Errors of the configuration and resolution engine
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Bad raw template name; raised before any loader I/O.
    #[error(transparent)]
    MalformedName(#[from] MalformedNameError),

    /// Every lookup candidate missed.
    #[error("Template not found for name {name:?}; tried {}", format_tried(.tried))]
    NotFound { name: String, tried: Vec<String> },

    /// A first-match overlay selector found no acceptor.
    #[error("No overlay selected for template {name:?}: {message}")]
    AmbiguousOverlay { name: String, message: String },

    /// A custom setting was read that no layer sets.
    #[error("Custom setting {key:?} is not set")]
    SettingNotSet { key: String },

    #[error("Invalid value {raw:?} for a {target} setting: {reason}")]
    InvalidSettingValue {
        raw: String,
        target: &'static str,
        reason: String,
    },

    #[error("Unknown setting {0:?}")]
    UnknownSetting(String),

    /// A cache mutation against a lookup strategy that does not cache.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A lazily imported namespace failed on first access.
    #[error("Lazy initialization of the imported namespace for {import:?} failed (imported by {host:?}): {source}")]
    LazyInit {
        import: String,
        host: String,
        source: Arc<Error>,
    },

    #[error("Failed to parse template {name:?}: {source}")]
    Parse { name: String, source: ParseError },

    #[error("Error while executing template {template:?}: {message}")]
    Eval { template: String, message: String },

    #[error("Loader failed for {name:?}: {source}")]
    Loader { name: String, source: LoaderError },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_tried(tried: &[String]) -> String {
    if tried.is_empty() {
        "no candidates".to_string()
    } else {
        tried
            .iter()
            .map(|t| format!("{:?}", t))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Error {
    /// The underlying error of a lazy initialization failure, or `self`.
    pub fn root(&self) -> &Error {
        match self {
            Error::LazyInit { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidValue {
                raw,
                target,
                reason,
            } => Error::InvalidSettingValue {
                raw,
                target,
                reason,
            },
            ConfigError::UnknownSetting(name) => Error::UnknownSetting(name),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_candidates() {
        let err = Error::NotFound {
            name: "test".into(),
            tried: vec!["test_de".into(), "test".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("\"test_de\", \"test\""), "{}", msg);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: Error = ConfigError::InvalidValue {
            raw: "x".into(),
            target: "integer",
            reason: "not a number".into(),
        }
        .into();
        assert!(matches!(err, Error::InvalidSettingValue { target: "integer", .. }));

        let err: Error = ConfigError::EngineLevelOnly("localized_lookup").into();
        assert!(matches!(err, Error::Config(ref m) if m.contains("localized_lookup")));
    }

    #[test]
    fn test_lazy_init_root() {
        let inner = Error::NotFound {
            name: "lib.ftl".into(),
            tried: vec!["lib.ftl".into()],
        };
        let err = Error::LazyInit {
            import: "lib.ftl".into(),
            host: "main.ftl".into(),
            source: Arc::new(inner),
        };
        assert!(err.root().is_not_found());
        assert!(err.to_string().contains("main.ftl"));
    }
}
