//! The entry point for validation: feeds a document's events through the
//! walker for the grammar's start pattern.

use crate::error::ValidationError;
use crate::event::{Event, EventKind, EventSet};
use crate::name_resolver::{EName, NameResolver, ResolverError};
use crate::walker::{Env, FireResult, Walker, errors_of, result_of};
use log::{debug, trace, warn};
use relaxng_model::datatype::is_xml_whitespace;
use relaxng_model::{Grammar, NamePattern};
use std::rc::Rc;

#[derive(Clone, Debug)]
enum Frame {
    Walker(Walker),
    /// A misplaced subtree nobody could validate. Counts open tags until it
    /// closes.
    Depth(usize),
}

/// Validates one document.
///
/// Unlike the walkers it drives, `fire_event` never rejects: anything the
/// grammar does not allow becomes a `ValidationError` and validation
/// carries on.
#[derive(Debug)]
pub struct GrammarWalker {
    grammar: Rc<Grammar>,
    resolver: NameResolver,
    frames: Vec<Frame>,
    suspended_ws: Option<String>,
    ignore_next_ws: bool,
    swallow_attribute_value: bool,
    prev_was_text: bool,
}

/// `grammar.new_walker()` for a shared grammar.
pub trait NewWalker {
    fn new_walker(&self) -> GrammarWalker;
}

impl NewWalker for Rc<Grammar> {
    fn new_walker(&self) -> GrammarWalker {
        GrammarWalker::new(self.clone())
    }
}

impl GrammarWalker {
    pub fn new(grammar: Rc<Grammar>) -> GrammarWalker {
        let resolver = NameResolver::new();
        let root = Walker::new(
            &Env {
                grammar: &grammar,
                resolver: &resolver,
            },
            grammar.start(),
        );
        GrammarWalker {
            grammar,
            resolver,
            frames: vec![Frame::Walker(root)],
            suspended_ws: None,
            ignore_next_ws: false,
            swallow_attribute_value: false,
            prev_was_text: false,
        }
    }

    pub fn grammar(&self) -> &Rc<Grammar> {
        &self.grammar
    }

    pub fn resolve_name(&self, qname: &str, attribute: bool) -> Result<Option<EName>, ResolverError> {
        self.resolver.resolve_name(qname, attribute)
    }

    pub fn unresolve_name(&self, uri: &str, name: &str) -> Option<String> {
        self.resolver.unresolve_name(uri, name)
    }

    /// Events that would be accepted now. Empty while inside a misplaced
    /// element that could not be matched to any definition.
    pub fn possible(&self) -> EventSet {
        let env = Env {
            grammar: &self.grammar,
            resolver: &self.resolver,
        };
        match self.frames.last() {
            Some(Frame::Walker(walker)) => walker.possible(&env),
            Some(Frame::Depth(_)) | None => EventSet::new(),
        }
    }

    /// Processes one event.
    ///
    /// # Panics
    ///
    /// On caller errors that make further validation meaningless: two
    /// non-whitespace text events in a row, or `leaveContext` without a
    /// matching `enterContext`.
    pub fn fire_event(&mut self, mut ev: Event) -> Result<(), Vec<ValidationError>> {
        trace!("fire_event({ev})");
        match ev.kind() {
            EventKind::EnterContext => {
                self.resolver.enter_context();
                return Ok(());
            }
            EventKind::LeaveContext => {
                if let Err(e) = self.resolver.leave_context() {
                    panic!("{e}");
                }
                return Ok(());
            }
            EventKind::DefinePrefix { prefix, uri } => {
                self.resolver.define_prefix(prefix, uri);
                return Ok(());
            }
            _ => {}
        }

        if let EventKind::Text(text) = ev.kind() {
            if text.chars().all(is_xml_whitespace) {
                self.suspended_ws.get_or_insert_with(String::new).push_str(text);
                return Ok(());
            }
            if self.prev_was_text {
                panic!("two consecutive text events; text must be passed in one event");
            }
        }
        self.prev_was_text = matches!(ev.kind(), EventKind::Text(_));

        let env = Env {
            grammar: &self.grammar,
            resolver: &self.resolver,
        };
        let frames = &mut self.frames;

        let ignore_ws_now = std::mem::replace(&mut self.ignore_next_ws, false);
        let mut errors = vec![];
        match ev.kind() {
            EventKind::EnterStartTag { .. } => self.suspended_ws = None,
            EventKind::Text(text) => {
                if ignore_ws_now {
                    self.suspended_ws = None;
                    let trimmed = text.trim_start_matches(is_xml_whitespace);
                    if trimmed.len() != text.len() {
                        ev = Event::text(trimmed);
                    }
                } else if let Some(ws) = self.suspended_ws.take() {
                    errors.extend(fire_whitespace(&env, frames, &ws));
                }
            }
            kind => {
                if let EventKind::EndTag { .. } = kind {
                    self.ignore_next_ws = true;
                }
                if let Some(ws) = self.suspended_ws.take() {
                    if !ignore_ws_now {
                        errors.extend(fire_whitespace(&env, frames, &ws));
                    }
                }
            }
        }

        if let Some(Frame::Depth(depth)) = frames.last_mut() {
            match ev.kind() {
                EventKind::EnterStartTag { .. } => *depth += 1,
                EventKind::EndTag { .. } => *depth -= 1,
                _ => {}
            }
            if *depth == 0 {
                frames.pop();
            }
            return result_of(errors);
        }

        if self.swallow_attribute_value {
            self.swallow_attribute_value = false;
            if let EventKind::AttributeValue(_) = ev.kind() {
                return result_of(errors);
            }
            errors.push(ValidationError::message("attribute value required"));
        }

        let Some(Frame::Walker(top)) = frames.last_mut() else {
            return result_of(errors);
        };
        match top.fire_event(&env, ev) {
            FireResult::Accepted => {}
            FireResult::Errors(e) => errors.extend(e),
            FireResult::Rejected => match ev.kind() {
                EventKind::EnterStartTag { ns, name } => {
                    errors.push(ValidationError::element_name(
                        "tag not allowed here",
                        NamePattern::name(ns.as_str(), name.as_str()),
                    ));
                    frames.push(recovery_frame(&env, ev, ns, name));
                }
                EventKind::EndTag { ns, name } => errors.push(ValidationError::element_name(
                    "unexpected end tag",
                    NamePattern::name(ns.as_str(), name.as_str()),
                )),
                EventKind::AttributeName { ns, name } => {
                    errors.push(ValidationError::attribute_name(
                        "attribute not allowed here",
                        NamePattern::name(ns.as_str(), name.as_str()),
                    ));
                    self.swallow_attribute_value = true;
                }
                EventKind::AttributeValue(_) => errors.push(ValidationError::message(
                    "unexpected attributeValue event; it is likely that fireEvent is incorrectly called",
                )),
                EventKind::Text(_) => errors.push(ValidationError::message("text not allowed here")),
                _ => panic!("unexpected event type in GrammarWalker::fire_event: {ev}"),
            },
        }

        if frames.len() > 1 {
            if let Some(Frame::Walker(top)) = frames.last_mut() {
                if top.can_end(&env, false) {
                    errors.extend(errors_of(top.end(&env, false)));
                    frames.pop();
                }
            }
        }
        result_of(errors)
    }

    /// Whether the document could end here without errors.
    pub fn can_end(&self) -> bool {
        let env = Env {
            grammar: &self.grammar,
            resolver: &self.resolver,
        };
        match &self.frames[..] {
            [Frame::Walker(root)] => root.can_end(&env, false),
            _ => false,
        }
    }

    /// Reports everything still missing, innermost misplaced element first.
    pub fn end(&mut self) -> Result<(), Vec<ValidationError>> {
        let env = Env {
            grammar: &self.grammar,
            resolver: &self.resolver,
        };
        let mut errors = vec![];
        for frame in self.frames.iter_mut().rev() {
            if let Frame::Walker(walker) = frame {
                errors.extend(errors_of(walker.end(&env, false)));
            }
        }
        result_of(errors)
    }

    /// An independent copy. Events fired at one do not affect the other,
    /// namespace declarations included. The grammar stays shared.
    pub fn fork(&self) -> GrammarWalker {
        GrammarWalker {
            grammar: self.grammar.clone(),
            resolver: self.resolver.clone(),
            frames: self
                .frames
                .iter()
                .map(|frame| match frame {
                    Frame::Walker(walker) => Frame::Walker(walker.fork()),
                    Frame::Depth(depth) => Frame::Depth(*depth),
                })
                .collect(),
            suspended_ws: self.suspended_ws.clone(),
            ignore_next_ws: self.ignore_next_ws,
            swallow_attribute_value: self.swallow_attribute_value,
            prev_was_text: self.prev_was_text,
        }
    }
}

fn fire_whitespace(env: &Env, frames: &mut [Frame], ws: &str) -> Vec<ValidationError> {
    match frames.last_mut() {
        Some(Frame::Walker(walker)) => match walker.fire_event(env, Event::text(ws)) {
            FireResult::Accepted => vec![],
            FireResult::Errors(errors) => errors,
            FireResult::Rejected => vec![ValidationError::message("text not allowed here")],
        },
        Some(Frame::Depth(_)) | None => vec![],
    }
}

/// Chooses how to carry on inside an element the grammar does not allow at
/// this point.
fn recovery_frame(env: &Env, ev: Event, ns: &str, name: &str) -> Frame {
    match env.grammar.element_definitions(ns, name) {
        [only] => {
            debug!("validating misplaced {{{ns}}}{name} against its only definition");
            let mut walker = Walker::new(env, *only);
            if walker.fire_event(env, ev).is_rejected() {
                panic!("definition of {{{ns}}}{name} rejected its own start tag");
            }
            Frame::Walker(walker)
        }
        [] => {
            debug!("no definition for misplaced {{{ns}}}{name}; skipping its content");
            Frame::Depth(1)
        }
        several => {
            warn!(
                "{} definitions for misplaced {{{ns}}}{name}; skipping its content",
                several.len()
            );
            Frame::Depth(1)
        }
    }
}
