//! Parsed templates and the template language interface
//!
//! The template language (grammar, evaluation) lives outside this crate and
//! is plugged in through [`TemplateLanguage`]. A language turns decoded
//! source text into an in-source header layer plus an executable body.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{LayerStack, SettingsLayer};
use crate::error::Result;
use crate::lookup::{Locale, RoutingToken};
use crate::namespace::RenderSession;

/// A parse error with its position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {line}, column {column})")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Everything a language needs to parse one source.
#[derive(Debug)]
pub struct ParseRequest<'a> {
    /// Template name (the matched candidate)
    pub name: &'a str,
    /// Source decoded with `encoding`
    pub source: &'a str,
    pub encoding: &'a str,
    pub locale: &'a Locale,
    /// Global defaults and source overlays
    pub settings: &'a LayerStack,
}

/// What a language produced.
#[derive(Debug)]
pub enum ParseOutcome {
    Parsed {
        /// Settings declared by the template's own header
        header: SettingsLayer,
        body: Arc<dyn ParsedBody>,
    },
    /// The header asks for a different source encoding; parse again with it.
    WrongEncoding { requested: String },
}

/// An external template language.
pub trait TemplateLanguage: Send + Sync + fmt::Debug {
    /// Name used by the `template_language` setting.
    fn name(&self) -> &str;

    fn parse(&self, request: &ParseRequest<'_>) -> std::result::Result<ParseOutcome, ParseError>;
}

/// An executable, immutable template body.
pub trait ParsedBody: Send + Sync + fmt::Debug {
    fn execute(&self, session: &mut RenderSession<'_>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub enum TemplateBody {
    /// Raw source text, never parsed.
    PlainText(String),
    Parsed(Arc<dyn ParsedBody>),
}

/// A resolved, immutable template.
#[derive(Debug, Clone)]
pub struct Template {
    /// Name of the candidate that hit; relative names resolve against it.
    pub name: String,
    /// Canonical name that was requested
    pub requested_name: String,
    pub source_id: String,
    pub version: String,
    pub locale: Locale,
    pub token: Option<RoutingToken>,
    /// Encoding the source was decoded with
    pub encoding: String,
    /// Global defaults, source overlays and the in-source header
    pub settings: LayerStack,
    pub body: TemplateBody,
}

impl Template {
    pub fn is_parsed(&self) -> bool {
        matches!(self.body, TemplateBody::Parsed(_))
    }

    /// Raw text of an unparsed template.
    pub fn source_text(&self) -> Option<&str> {
        match &self.body {
            TemplateBody::PlainText(text) => Some(text),
            TemplateBody::Parsed(_) => None,
        }
    }
}

/// The built-in "plain" language: the whole source is literal output.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextLanguage;

#[derive(Debug)]
struct PlainTextBody(String);

impl ParsedBody for PlainTextBody {
    fn execute(&self, session: &mut RenderSession<'_>) -> Result<()> {
        session.write(&self.0);
        Ok(())
    }
}

impl TemplateLanguage for PlainTextLanguage {
    fn name(&self) -> &str {
        "plain"
    }

    fn parse(&self, request: &ParseRequest<'_>) -> std::result::Result<ParseOutcome, ParseError> {
        Ok(ParseOutcome::Parsed {
            header: SettingsLayer::new(),
            body: Arc::new(PlainTextBody(request.source.to_string())),
        })
    }
}

/// Registered languages by lowercase name; always contains "plain".
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: IndexMap<String, Arc<dyn TemplateLanguage>>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        let mut registry = Self {
            languages: IndexMap::new(),
        };
        registry.register(Arc::new(PlainTextLanguage));
        registry
    }
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a language, replacing one of the same name.
    pub fn register(&mut self, language: Arc<dyn TemplateLanguage>) {
        self.languages
            .insert(language.name().to_ascii_lowercase(), language);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TemplateLanguage>> {
        self.languages.get(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }
}

/// Decode source bytes.
///
/// UTF-8 is strict; ISO-8859-1 maps bytes to code points; US-ASCII rejects
/// bytes above 0x7F.
pub fn decode(bytes: &[u8], encoding: &str) -> std::result::Result<String, String> {
    let normalized = encoding.to_ascii_lowercase().replace(['-', '_'], "");
    match normalized.as_str() {
        "utf8" => String::from_utf8(bytes.to_vec())
            .map_err(|e| format!("not valid UTF-8: {}", e)),
        "iso88591" | "latin1" => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
        "usascii" | "ascii" => match bytes.iter().position(|b| !b.is_ascii()) {
            Some(at) => Err(format!("non-ASCII byte at offset {}", at)),
            None => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
        },
        _ => Err(format!("unsupported source encoding {:?}", encoding)),
    }
}
