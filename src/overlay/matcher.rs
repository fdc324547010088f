//! Predicates over normalized template names

use globset::{GlobBuilder, GlobMatcher};
use std::fmt;
use std::sync::Arc;

/// Matcher construction errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum MatcherError {
    #[error("Invalid glob {pattern:?}: {source}")]
    Glob {
        pattern: String,
        source: globset::Error,
    },

    #[error("Path glob {0:?} must not start with '/'")]
    LeadingSlash(String),

    #[error("File name glob {0:?} must not contain '/'")]
    SlashInFileName(String),

    #[error("Invalid extension {0:?}")]
    InvalidExtension(String),
}

/// User-supplied matcher.
pub trait NameMatcher: Send + Sync + fmt::Debug {
    fn matches(&self, name: &str) -> bool;
}

/// A compiled glob and the pattern it came from.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    matcher: GlobMatcher,
}

impl GlobPattern {
    /// `*` and `?` never cross `/`; `**` matches any number of steps.
    fn compile(pattern: &str, case_insensitive: bool) -> Result<Self, MatcherError> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .case_insensitive(case_insensitive)
            .backslash_escape(true)
            .build()
            .map_err(|source| MatcherError::Glob {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn is_match(&self, candidate: &str) -> bool {
        self.matcher.is_match(candidate)
    }
}

/// A predicate over a canonical root-based template name.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Glob over the whole path.
    PathGlob(GlobPattern),
    /// Glob over the last path step.
    FileNameGlob(GlobPattern),
    /// Extension of the last path step.
    Extension { extension: String, ignore_case: bool },
    Or(Vec<Matcher>),
    And(Vec<Matcher>),
    Not(Box<Matcher>),
    Custom(Arc<dyn NameMatcher>),
}

impl Matcher {
    pub fn path_glob(pattern: &str) -> Result<Self, MatcherError> {
        Self::build_path_glob(pattern, false)
    }

    pub fn path_glob_ignore_case(pattern: &str) -> Result<Self, MatcherError> {
        Self::build_path_glob(pattern, true)
    }

    fn build_path_glob(pattern: &str, ignore_case: bool) -> Result<Self, MatcherError> {
        if pattern.starts_with('/') {
            return Err(MatcherError::LeadingSlash(pattern.to_string()));
        }
        Ok(Matcher::PathGlob(GlobPattern::compile(pattern, ignore_case)?))
    }

    pub fn file_name_glob(pattern: &str) -> Result<Self, MatcherError> {
        if pattern.contains('/') {
            return Err(MatcherError::SlashInFileName(pattern.to_string()));
        }
        Ok(Matcher::FileNameGlob(GlobPattern::compile(pattern, false)?))
    }

    /// Exact extension match; `extension` is given without the dot.
    pub fn extension(extension: &str) -> Result<Self, MatcherError> {
        Self::build_extension(extension, false)
    }

    pub fn extension_ignore_case(extension: &str) -> Result<Self, MatcherError> {
        Self::build_extension(extension, true)
    }

    fn build_extension(extension: &str, ignore_case: bool) -> Result<Self, MatcherError> {
        let extension = extension.strip_prefix('.').unwrap_or(extension);
        if extension.is_empty() || extension.contains(['/', '.']) {
            return Err(MatcherError::InvalidExtension(extension.to_string()));
        }
        Ok(Matcher::Extension {
            extension: extension.to_string(),
            ignore_case,
        })
    }

    pub fn or(matchers: impl IntoIterator<Item = Matcher>) -> Self {
        Matcher::Or(matchers.into_iter().collect())
    }

    pub fn and(matchers: impl IntoIterator<Item = Matcher>) -> Self {
        Matcher::And(matchers.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(matcher: Matcher) -> Self {
        Matcher::Not(Box::new(matcher))
    }

    pub fn custom(matcher: impl NameMatcher + 'static) -> Self {
        Matcher::Custom(Arc::new(matcher))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Matcher::PathGlob(glob) => glob.is_match(name),
            Matcher::FileNameGlob(glob) => glob.is_match(file_name(name)),
            Matcher::Extension {
                extension,
                ignore_case,
            } => match file_name(name).rsplit_once('.') {
                Some((_, ext)) if *ignore_case => ext.eq_ignore_ascii_case(extension),
                Some((_, ext)) => ext == extension,
                None => false,
            },
            Matcher::Or(matchers) => matchers.iter().any(|m| m.matches(name)),
            Matcher::And(matchers) => matchers.iter().all(|m| m.matches(name)),
            Matcher::Not(matcher) => !matcher.matches(name),
            Matcher::Custom(matcher) => matcher.matches(name),
        }
    }
}

fn file_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
