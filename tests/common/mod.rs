//! Shared helpers for the integration tests: a small line-oriented template
//! language and engine constructors.
#![allow(dead_code)]

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tplcore::config::SettingsLayer;
use tplcore::template::{ParseError, ParseOutcome, ParseRequest, ParsedBody};
use tplcore::{Engine, EngineBuilder, Error, MapLoader, RenderSession, TemplateLanguage};

/// Language name registered by [`DirectiveLanguage`].
pub const DIRECTIVE: &str = "directive";

/// A test language.
///
/// Leading header lines:
/// - `#set name=value` sets a built-in setting
/// - `#custom key=json` sets a custom setting
/// - `#encoding NAME` asks for a re-parse when NAME is not the encoding in use
///
/// Body lines are literal text (written with a trailing newline) or commands:
/// `@import path as alias`, `@include path`, `@set var=value`,
/// `@print alias.member`, `@custom key`, `@fail message`.
#[derive(Debug, Clone, Default)]
pub struct DirectiveLanguage {
    parses: Arc<AtomicUsize>,
}

impl DirectiveLanguage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared parse counter.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.parses)
    }
}

#[derive(Debug, Clone)]
enum Line {
    Text(String),
    Import { path: String, alias: String },
    Include(String),
    Set { var: String, value: String },
    Print { alias: String, member: String },
    Custom(String),
    Fail(String),
}

#[derive(Debug)]
struct DirectiveBody {
    lines: Vec<Line>,
}

impl ParsedBody for DirectiveBody {
    fn execute(&self, session: &mut RenderSession<'_>) -> tplcore::Result<()> {
        for line in &self.lines {
            match line {
                Line::Text(text) => {
                    session.write(text);
                    session.write("\n");
                }
                Line::Import { path, alias } => session.import(path, alias)?,
                Line::Include(path) => session.include(path)?,
                Line::Set { var, value } => session.set_var(var.clone(), Value::String(value.clone())),
                Line::Print { alias, member } => {
                    let value = session.namespace_var(alias, member)?;
                    session.write(&render_value(value.as_ref()));
                    session.write("\n");
                }
                Line::Custom(key) => {
                    let value = session.custom(key)?;
                    session.write(&render_value(Some(&value)));
                    session.write("\n");
                }
                Line::Fail(message) => {
                    return Err(Error::Eval {
                        template: session.current_template_name().to_string(),
                        message: message.clone(),
                    })
                }
            }
        }
        Ok(())
    }
}

fn render_value(value: Option<&Value>) -> String {
    match value {
        None => "<missing>".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl TemplateLanguage for DirectiveLanguage {
    fn name(&self) -> &str {
        DIRECTIVE
    }

    fn parse(&self, request: &ParseRequest<'_>) -> Result<ParseOutcome, ParseError> {
        self.parses.fetch_add(1, Ordering::SeqCst);

        let mut header = SettingsLayer::new();
        let mut lines = Vec::new();
        let mut in_header = true;

        for (index, raw) in request.source.lines().enumerate() {
            let line_no = index + 1;
            if in_header {
                if let Some(rest) = raw.strip_prefix("#encoding ") {
                    let requested = rest.trim();
                    if !requested.eq_ignore_ascii_case(request.encoding) {
                        return Ok(ParseOutcome::WrongEncoding {
                            requested: requested.to_string(),
                        });
                    }
                    continue;
                }
                if let Some(rest) = raw.strip_prefix("#set ") {
                    let (name, value) = split_assignment(rest, line_no)?;
                    header
                        .set_str(name, value)
                        .map_err(|e| ParseError::new(line_no, 6, e.to_string()))?;
                    continue;
                }
                if let Some(rest) = raw.strip_prefix("#custom ") {
                    let (key, value) = split_assignment(rest, line_no)?;
                    let value: Value = serde_json::from_str(value)
                        .map_err(|e| ParseError::new(line_no, 9, e.to_string()))?;
                    header.set_custom(key, value);
                    continue;
                }
                in_header = false;
            }
            lines.push(parse_line(raw, line_no)?);
        }

        Ok(ParseOutcome::Parsed {
            header,
            body: Arc::new(DirectiveBody { lines }),
        })
    }
}

fn split_assignment(rest: &str, line_no: usize) -> Result<(&str, &str), ParseError> {
    rest.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| ParseError::new(line_no, 1, format!("expected name=value in {:?}", rest)))
}

fn parse_line(raw: &str, line_no: usize) -> Result<Line, ParseError> {
    let Some(command) = raw.strip_prefix('@') else {
        return Ok(Line::Text(raw.to_string()));
    };
    let (word, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    let line = match word {
        "import" => {
            let (path, alias) = rest
                .split_once(" as ")
                .ok_or_else(|| ParseError::new(line_no, 9, "expected @import path as alias"))?;
            Line::Import {
                path: path.trim().to_string(),
                alias: alias.trim().to_string(),
            }
        }
        "include" => Line::Include(rest.to_string()),
        "set" => {
            let (var, value) = split_assignment(rest, line_no)?;
            Line::Set {
                var: var.to_string(),
                value: value.to_string(),
            }
        }
        "print" => {
            let (alias, member) = rest
                .split_once('.')
                .ok_or_else(|| ParseError::new(line_no, 8, "expected @print alias.member"))?;
            Line::Print {
                alias: alias.to_string(),
                member: member.to_string(),
            }
        }
        "custom" => Line::Custom(rest.to_string()),
        "fail" => Line::Fail(rest.to_string()),
        other => {
            return Err(ParseError::new(
                line_no,
                2,
                format!("unknown command @{}", other),
            ))
        }
    };
    Ok(line)
}

/// Engine builder over `loader` using [`DirectiveLanguage`].
pub fn builder(loader: &Arc<MapLoader>, language: &DirectiveLanguage) -> EngineBuilder {
    EngineBuilder::new(Arc::clone(loader) as Arc<dyn tplcore::TemplateLoader>)
        .language(language.clone())
        .setting("template_language", DIRECTIVE)
}

/// Engine with the directive language and default settings.
pub fn engine(loader: &Arc<MapLoader>) -> (Engine, Arc<AtomicUsize>) {
    let language = DirectiveLanguage::new();
    let counter = language.counter();
    let engine = builder(loader, &language).build().expect("engine builds");
    (engine, counter)
}

pub fn parses(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
