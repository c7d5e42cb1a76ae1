//! Validates a whole XML document held in memory, turning `xmlparser`
//! tokens into walker events.

use crate::error::ValidationError;
use crate::event::Event;
use crate::grammar_walker::GrammarWalker;
use crate::name_resolver::EName;
use fnv::FnvHashMap;
use relaxng_model::Grammar;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use xmlparser::{ElementEnd, EntityDefinition, StrSpan, Token, Tokenizer};

#[derive(Debug)]
pub enum DocumentError {
    Xml(xmlparser::Error),
    /// The grammar does not allow what was found at `span`. Validation
    /// continues after these.
    Validation {
        errors: Vec<ValidationError>,
        span: Range<usize>,
    },
    UndefinedPrefix {
        prefix: String,
        span: Range<usize>,
    },
    UndefinedEntity {
        name: String,
        span: Range<usize>,
    },
    InvalidOrUnclosedEntity {
        span: Range<usize>,
    },
    ExternalEntity {
        name: String,
        span: Range<usize>,
    },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::Xml(err) => write!(f, "{err}"),
            DocumentError::Validation { errors, .. } => {
                let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                f.write_str(&messages.join("; "))
            }
            DocumentError::UndefinedPrefix { prefix, .. } => {
                write!(f, "The prefix {prefix:?} is not defined")
            }
            DocumentError::UndefinedEntity { name, .. } => {
                write!(f, "The entity &{name}; is not defined")
            }
            DocumentError::InvalidOrUnclosedEntity { .. } => {
                f.write_str("Invalid or unclosed entity reference")
            }
            DocumentError::ExternalEntity { name, .. } => {
                write!(f, "The external entity {name:?} cannot be resolved")
            }
        }
    }
}

impl std::error::Error for DocumentError {}

impl DocumentError {
    /// Everything except `Validation` stops the document from being read
    /// any further.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DocumentError::Validation { .. })
    }
}

struct PendingAttribute<'a> {
    prefix: StrSpan<'a>,
    local: StrSpan<'a>,
    value: StrSpan<'a>,
    span: StrSpan<'a>,
}

impl PendingAttribute<'_> {
    /// The prefix this attribute declares, if it is a namespace declaration.
    fn declared_prefix(&self) -> Option<&str> {
        match (self.prefix.as_str(), self.local.as_str()) {
            ("xmlns", prefix) => Some(prefix),
            ("", "xmlns") => Some(""),
            _ => None,
        }
    }
}

struct PendingTag<'a> {
    prefix: StrSpan<'a>,
    local: StrSpan<'a>,
    span: StrSpan<'a>,
    attributes: Vec<PendingAttribute<'a>>,
}

pub struct DocumentValidator<'a> {
    walker: GrammarWalker,
    source: &'a str,
    tokenizer: Tokenizer<'a>,
    entity_definitions: FnvHashMap<String, String>,
    pending: Option<PendingTag<'a>>,
    depth: usize,
    /// Text and CDATA sections seen since the last markup, decoded.
    text_buffer: String,
    text_span: Option<Range<usize>>,
    queued: VecDeque<DocumentError>,
    finished: bool,
}

impl<'a> DocumentValidator<'a> {
    pub fn new(grammar: Rc<Grammar>, source: &'a str) -> DocumentValidator<'a> {
        let mut entity_definitions = FnvHashMap::default();
        entity_definitions.insert("lt".to_string(), "<".to_string());
        entity_definitions.insert("gt".to_string(), ">".to_string());
        entity_definitions.insert("amp".to_string(), "&".to_string());
        entity_definitions.insert("apos".to_string(), "'".to_string());
        entity_definitions.insert("quot".to_string(), "\"".to_string());
        DocumentValidator {
            walker: GrammarWalker::new(grammar),
            source,
            tokenizer: Tokenizer::from(source),
            entity_definitions,
            pending: None,
            depth: 0,
            text_buffer: String::new(),
            text_span: None,
            queued: VecDeque::new(),
            finished: false,
        }
    }

    pub fn walker(&self) -> &GrammarWalker {
        &self.walker
    }

    /// Reads one token and yields at most one error. Once the tokens run out
    /// the walker is ended and anything still missing is reported against
    /// the end of the document.
    pub fn validate_next(&mut self) -> Option<Result<(), DocumentError>> {
        if let Some(err) = self.queued.pop_front() {
            return Some(Err(err));
        }
        if self.finished {
            return None;
        }
        let result = match self.tokenizer.next() {
            Some(Ok(token)) => self.token(token),
            Some(Err(err)) => Err(DocumentError::Xml(err)),
            None => {
                self.finish();
                Ok(())
            }
        };
        if let Err(err) = result {
            self.finished = true;
            self.queued.push_back(err);
        }
        match self.queued.pop_front() {
            Some(err) => Some(Err(err)),
            None => Some(Ok(())),
        }
    }

    /// Runs to the end of the document, returning every error found.
    pub fn errors(mut self) -> Vec<DocumentError> {
        std::iter::from_fn(|| self.validate_next())
            .filter_map(Result::err)
            .collect()
    }

    fn token(&mut self, token: Token<'a>) -> Result<(), DocumentError> {
        match token {
            Token::Declaration { .. }
            | Token::DtdStart { .. }
            | Token::EmptyDtd { .. }
            | Token::DtdEnd { .. }
            | Token::Comment { .. }
            | Token::ProcessingInstruction { .. } => Ok(()),
            Token::EntityDeclaration {
                name,
                definition,
                span,
            } => match definition {
                EntityDefinition::EntityValue(value) => {
                    self.entity_definitions
                        .insert(name.to_string(), value.to_string());
                    Ok(())
                }
                EntityDefinition::ExternalId(_) => Err(DocumentError::ExternalEntity {
                    name: name.to_string(),
                    span: range(span),
                }),
            },
            Token::ElementStart {
                prefix,
                local,
                span,
            } => {
                self.flush_text();
                self.pending = Some(PendingTag {
                    prefix,
                    local,
                    span,
                    attributes: vec![],
                });
                Ok(())
            }
            Token::Attribute {
                prefix,
                local,
                value,
                span,
            } => {
                if let Some(tag) = &mut self.pending {
                    tag.attributes.push(PendingAttribute {
                        prefix,
                        local,
                        value,
                        span,
                    });
                }
                Ok(())
            }
            Token::ElementEnd {
                end: ElementEnd::Open,
                span,
            } => self.start_tag(false, span),
            Token::ElementEnd {
                end: ElementEnd::Empty,
                span,
            } => self.start_tag(true, span),
            Token::ElementEnd {
                end: ElementEnd::Close(prefix, local),
                span,
            } => {
                self.flush_text();
                let name = self.resolve(prefix, local, false)?;
                self.fire(Event::end_tag(&name.ns, &name.name), range(span));
                self.fire(Event::leave_context(), range(span));
                self.depth = self.depth.saturating_sub(1);
                Ok(())
            }
            Token::Text { text } => {
                let decoded = decode(text, &self.entity_definitions)?;
                self.buffer_text(&decoded, range(text));
                Ok(())
            }
            Token::Cdata { text, span } => {
                self.buffer_text(text.as_str(), range(span));
                Ok(())
            }
        }
    }

    fn start_tag(&mut self, empty: bool, end: StrSpan<'a>) -> Result<(), DocumentError> {
        let Some(tag) = self.pending.take() else {
            return Ok(());
        };
        self.fire(Event::enter_context(), range(tag.span));
        for att in &tag.attributes {
            if let Some(prefix) = att.declared_prefix() {
                let uri = decode(att.value, &self.entity_definitions)?;
                self.fire(Event::define_prefix(prefix, &uri), range(att.span));
            }
        }
        let name = self.resolve(tag.prefix, tag.local, false)?;
        self.fire(Event::enter_start_tag(&name.ns, &name.name), range(tag.span));
        for att in &tag.attributes {
            if att.declared_prefix().is_some() {
                continue;
            }
            let att_name = self.resolve(att.prefix, att.local, true)?;
            let value = decode(att.value, &self.entity_definitions)?;
            self.fire(
                Event::attribute_name(&att_name.ns, &att_name.name),
                range(att.span),
            );
            self.fire(Event::attribute_value(&value), range(att.value));
        }
        self.fire(Event::leave_start_tag(), range(end));
        if empty {
            self.fire(Event::end_tag(&name.ns, &name.name), range(end));
            self.fire(Event::leave_context(), range(end));
        } else {
            self.depth += 1;
        }
        Ok(())
    }

    fn resolve(
        &self,
        prefix: StrSpan<'a>,
        local: StrSpan<'a>,
        attribute: bool,
    ) -> Result<EName, DocumentError> {
        let qname = if prefix.as_str().is_empty() {
            local.to_string()
        } else {
            format!("{}:{}", prefix.as_str(), local.as_str())
        };
        match self.walker.resolve_name(&qname, attribute) {
            Ok(Some(name)) => Ok(name),
            Ok(None) | Err(_) => Err(DocumentError::UndefinedPrefix {
                prefix: prefix.to_string(),
                span: range(prefix),
            }),
        }
    }

    fn buffer_text(&mut self, text: &str, span: Range<usize>) {
        if self.depth == 0 {
            if !xml::common::is_whitespace_str(text) {
                self.queued.push_back(DocumentError::Validation {
                    errors: vec![ValidationError::message("text not allowed here")],
                    span,
                });
            }
            return;
        }
        self.text_buffer.push_str(text);
        self.text_span = Some(match self.text_span.take() {
            Some(previous) => previous.start..span.end,
            None => span,
        });
    }

    fn flush_text(&mut self) {
        if self.text_buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text_buffer);
        let span = self.text_span.take().unwrap_or_default();
        self.fire(Event::text(&text), span);
    }

    fn fire(&mut self, ev: Event, span: Range<usize>) {
        if let Err(errors) = self.walker.fire_event(ev) {
            self.queued
                .push_back(DocumentError::Validation { errors, span });
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.flush_text();
        if let Err(errors) = self.walker.end() {
            let end = self.source.len();
            self.queued.push_back(DocumentError::Validation {
                errors,
                span: end..end,
            });
        }
    }
}

fn range(span: StrSpan<'_>) -> Range<usize> {
    span.start()..span.end()
}

/// Replaces entity and character references in `text`.
fn decode<'t>(
    text: StrSpan<'t>,
    entities: &FnvHashMap<String, String>,
) -> Result<Cow<'t, str>, DocumentError> {
    let raw = text.as_str();
    if !raw.contains('&') {
        return Ok(Cow::Borrowed(raw));
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut offset = text.start();
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let start = offset + amp;
        let after = &rest[amp + 1..];
        let Some(semi) = after.find(';') else {
            return Err(DocumentError::InvalidOrUnclosedEntity {
                span: start..offset + rest.len(),
            });
        };
        let name = &after[..semi];
        let span = start..start + semi + 2;
        match name.strip_prefix('#') {
            Some(number) => match char_reference(number) {
                Some(c) => out.push(c),
                None => return Err(DocumentError::InvalidOrUnclosedEntity { span }),
            },
            None => match entities.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(DocumentError::UndefinedEntity {
                        name: name.to_string(),
                        span,
                    });
                }
            },
        }
        let consumed = amp + semi + 2;
        rest = &rest[consumed..];
        offset += consumed;
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

fn char_reference(number: &str) -> Option<char> {
    let code = match number.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => number.parse().ok()?,
    };
    char::from_u32(code)
}

pub fn diagnostic(
    name: String,
    source: String,
    err: &DocumentError,
) -> (codemap::CodeMap, Vec<codemap_diagnostic::Diagnostic>) {
    let mut map = codemap::CodeMap::new();
    let file = map.add_file(name, source);
    let subspan = |span: &Range<usize>| file.span.subspan(span.start as _, span.end as _);
    let mut diagnostics = vec![];
    match err {
        DocumentError::Xml(xml) => {
            let line = file.line_span((xml.pos().row as usize).saturating_sub(1));
            diagnostics.push(codemap_diagnostic::Diagnostic {
                level: codemap_diagnostic::Level::Error,
                message: format!("{xml}"),
                code: None,
                spans: vec![codemap_diagnostic::SpanLabel {
                    span: line,
                    label: None,
                    style: codemap_diagnostic::SpanStyle::Primary,
                }],
            });
        }
        DocumentError::Validation { errors, span } => {
            for error in errors {
                diagnostics.push(codemap_diagnostic::Diagnostic {
                    level: codemap_diagnostic::Level::Error,
                    message: error.to_string(),
                    code: None,
                    spans: vec![codemap_diagnostic::SpanLabel {
                        span: subspan(span),
                        label: Some("Not allowed".to_string()),
                        style: codemap_diagnostic::SpanStyle::Primary,
                    }],
                });
            }
        }
        DocumentError::UndefinedPrefix { prefix, span } => {
            diagnostics.push(codemap_diagnostic::Diagnostic {
                level: codemap_diagnostic::Level::Error,
                message: err.to_string(),
                code: None,
                spans: vec![codemap_diagnostic::SpanLabel {
                    span: subspan(span),
                    label: Some(format!(
                        "Add an xmlns:{prefix}=\"..\" attribute to define this prefix"
                    )),
                    style: codemap_diagnostic::SpanStyle::Primary,
                }],
            });
        }
        DocumentError::UndefinedEntity { span, .. }
        | DocumentError::InvalidOrUnclosedEntity { span }
        | DocumentError::ExternalEntity { span, .. } => {
            diagnostics.push(codemap_diagnostic::Diagnostic {
                level: codemap_diagnostic::Level::Error,
                message: err.to_string(),
                code: None,
                spans: vec![codemap_diagnostic::SpanLabel {
                    span: subspan(span),
                    label: None,
                    style: codemap_diagnostic::SpanStyle::Primary,
                }],
            });
        }
    }
    (map, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn entities() -> FnvHashMap<String, String> {
        let mut map = FnvHashMap::default();
        map.insert("amp".to_string(), "&".to_string());
        map.insert("me".to_string(), "Dave".to_string());
        map
    }

    #[test]
    fn decode_references() {
        let text = StrSpan::from("a &amp; b &#x41;&#66; &me;");
        assert_eq!(decode(text, &entities()).unwrap(), "a & b AB Dave");
        assert_matches!(decode(StrSpan::from("plain"), &entities()), Ok(Cow::Borrowed("plain")));
    }

    #[test]
    fn decode_errors_carry_spans() {
        assert_matches!(
            decode(StrSpan::from("x &nope; y"), &entities()),
            Err(DocumentError::UndefinedEntity { name, span }) if name == "nope" && span == (2..8)
        );
        assert_matches!(
            decode(StrSpan::from("x &amp"), &entities()),
            Err(DocumentError::InvalidOrUnclosedEntity { span }) if span == (2..6)
        );
        assert_matches!(
            decode(StrSpan::from("&#xZZ;"), &entities()),
            Err(DocumentError::InvalidOrUnclosedEntity { .. })
        );
    }
}
