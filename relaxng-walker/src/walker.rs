//! Validation cursors, one kind per pattern kind.
//!
//! A walker answers each event with `FireResult::Accepted`,
//! `FireResult::Errors` (accepted, but the document is wrong) or
//! `FireResult::Rejected`, which lets an enclosing walker try another
//! alternative. A rejecting walker is left as it was before the event.

use crate::composite::{ChoiceWalker, GroupWalker, InterleaveWalker, OneOrMoreWalker};
use crate::element::{AttributeWalker, ElementWalker};
use crate::error::ValidationError;
use crate::event::{Event, EventKind, EventSet};
use crate::name_resolver::NameResolver;
use relaxng_model::datatype::{Datatype, Namespaces, is_xml_whitespace};
use relaxng_model::{Grammar, Pattern, PatternId};
use std::borrow::Cow;

/// What every walker operation needs from the validation session. Walkers
/// never keep the resolver; they see the namespace context current at each
/// call.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    pub grammar: &'a Grammar,
    pub resolver: &'a NameResolver,
}

impl<'a> Env<'a> {
    /// The resolver, if `datatype` needs one to interpret values.
    fn context(&self, datatype: &dyn Datatype) -> Option<&'a dyn Namespaces> {
        if datatype.needs_context() {
            Some(self.resolver as &dyn Namespaces)
        } else {
            None
        }
    }
}

impl Env<'_> {
    pub(crate) fn fresh(&self, id: PatternId, suppressed: bool) -> Walker {
        let mut walker = Walker::new(self, id);
        if suppressed {
            walker.suppress_attributes();
        }
        walker
    }

    /// The walker in `slot`, creating it first if needed.
    pub(crate) fn instantiate<'w>(
        &self,
        slot: &'w mut Option<Box<Walker>>,
        id: PatternId,
        suppressed: bool,
    ) -> &'w mut Walker {
        slot.get_or_insert_with(|| Box::new(self.fresh(id, suppressed)))
    }

    /// The walker in `slot`, or a fresh one that is thrown away after use.
    pub(crate) fn peek<'w>(
        &self,
        slot: &'w Option<Box<Walker>>,
        id: PatternId,
        suppressed: bool,
    ) -> Cow<'w, Walker> {
        match slot {
            Some(walker) => Cow::Borrowed(walker.as_ref()),
            None => Cow::Owned(self.fresh(id, suppressed)),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum FireResult {
    Accepted,
    Errors(Vec<ValidationError>),
    Rejected,
}

impl FireResult {
    pub fn is_rejected(&self) -> bool {
        matches!(self, FireResult::Rejected)
    }

    pub(crate) fn from_errors(errors: Vec<ValidationError>) -> FireResult {
        if errors.is_empty() {
            FireResult::Accepted
        } else {
            FireResult::Errors(errors)
        }
    }

    pub(crate) fn into_errors(self) -> Vec<ValidationError> {
        match self {
            FireResult::Errors(errors) => errors,
            FireResult::Accepted | FireResult::Rejected => vec![],
        }
    }
}

pub(crate) fn errors_of(result: Result<(), Vec<ValidationError>>) -> Vec<ValidationError> {
    result.err().unwrap_or_default()
}

pub(crate) fn result_of(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[derive(Clone, Debug)]
pub enum Walker {
    Empty,
    NotAllowed,
    Text,
    Data(DataWalker),
    Value(ValueWalker),
    List(ListWalker),
    Attribute(AttributeWalker),
    Element(ElementWalker),
    Choice(ChoiceWalker),
    Group(GroupWalker),
    Interleave(InterleaveWalker),
    OneOrMore(OneOrMoreWalker),
}

impl Walker {
    pub fn new(env: &Env, id: PatternId) -> Walker {
        match env.grammar.pattern(id) {
            Pattern::Empty => Walker::Empty,
            Pattern::NotAllowed => Walker::NotAllowed,
            Pattern::Text => Walker::Text,
            Pattern::Data { .. } => Walker::Data(DataWalker {
                pattern: id,
                matched: false,
            }),
            Pattern::Value { .. } => Walker::Value(ValueWalker {
                pattern: id,
                matched: false,
            }),
            Pattern::List(pat) => Walker::List(ListWalker {
                pat: *pat,
                sub: None,
                seen_tokens: false,
            }),
            Pattern::Attribute { .. } => Walker::Attribute(AttributeWalker::new(id)),
            Pattern::Element { pat, .. } => {
                if matches!(env.grammar.pattern(*pat), Pattern::NotAllowed) {
                    Walker::NotAllowed
                } else {
                    Walker::Element(ElementWalker::new(id))
                }
            }
            Pattern::Ref { target, .. } => Walker::new(env, *target),
            Pattern::Define { pat, .. } => Walker::new(env, *pat),
            Pattern::Choice(a, b) => Walker::Choice(ChoiceWalker::new(*a, *b)),
            Pattern::Group(a, b) => Walker::Group(GroupWalker::new(id, *a, *b)),
            Pattern::Interleave(a, b) => Walker::Interleave(InterleaveWalker::new(id, *a, *b)),
            Pattern::OneOrMore(pat) => Walker::OneOrMore(OneOrMoreWalker::new(id, *pat)),
        }
    }

    /// Events that would be accepted now. Never changes the walker.
    pub fn possible(&self, env: &Env) -> EventSet {
        match self {
            Walker::Empty | Walker::NotAllowed => EventSet::new(),
            Walker::Text => [Event::text("*")].into_iter().collect(),
            Walker::Data(w) => w.possible(env),
            Walker::Value(w) => w.possible(env),
            Walker::List(w) => w.possible(env),
            Walker::Attribute(w) => w.possible(env),
            Walker::Element(w) => w.possible(env),
            Walker::Choice(w) => w.possible(env),
            Walker::Group(w) => w.possible(env),
            Walker::Interleave(w) => w.possible(env),
            Walker::OneOrMore(w) => w.possible(env),
        }
    }

    pub fn fire_event(&mut self, env: &Env, ev: Event) -> FireResult {
        match self {
            Walker::Empty => match ev.kind() {
                EventKind::Empty => FireResult::Accepted,
                EventKind::Text(text) if text.chars().all(is_xml_whitespace) => {
                    FireResult::Accepted
                }
                _ => FireResult::Rejected,
            },
            Walker::NotAllowed => FireResult::Rejected,
            Walker::Text => match ev.kind() {
                EventKind::Text(_) => FireResult::Accepted,
                _ => FireResult::Rejected,
            },
            Walker::Data(w) => w.fire_event(env, ev),
            Walker::Value(w) => w.fire_event(env, ev),
            Walker::List(w) => w.fire_event(env, ev),
            Walker::Attribute(w) => w.fire_event(env, ev),
            Walker::Element(w) => w.fire_event(env, ev),
            Walker::Choice(w) => w.fire_event(env, ev),
            Walker::Group(w) => w.fire_event(env, ev),
            Walker::Interleave(w) => w.fire_event(env, ev),
            Walker::OneOrMore(w) => w.fire_event(env, ev),
        }
    }

    /// Whether `end` would succeed. In attribute scope only attributes
    /// matter.
    pub fn can_end(&self, env: &Env, attribute: bool) -> bool {
        match self {
            Walker::Empty | Walker::Text => true,
            Walker::NotAllowed => attribute,
            Walker::Data(w) => w.can_end(env, attribute),
            Walker::Value(w) => w.can_end(env, attribute),
            Walker::List(w) => w.can_end(env, attribute),
            Walker::Attribute(w) => w.can_end(),
            Walker::Element(w) => w.can_end(attribute),
            Walker::Choice(w) => w.can_end(env, attribute),
            Walker::Group(w) => w.can_end(env, attribute),
            Walker::Interleave(w) => w.can_end(env, attribute),
            Walker::OneOrMore(w) => w.can_end(env, attribute),
        }
    }

    /// Reports what is still missing. Calling it again without firing an
    /// event in between gives the same answer.
    pub fn end(&mut self, env: &Env, attribute: bool) -> Result<(), Vec<ValidationError>> {
        match self {
            Walker::Empty | Walker::Text => Ok(()),
            Walker::NotAllowed => {
                if attribute {
                    Ok(())
                } else {
                    Err(vec![ValidationError::message(
                        "no content can be valid here",
                    )])
                }
            }
            Walker::Data(w) => w.end(env, attribute),
            Walker::Value(w) => w.end(env, attribute),
            Walker::List(w) => w.end(env, attribute),
            Walker::Attribute(w) => w.end(env),
            Walker::Element(w) => w.end(env, attribute),
            Walker::Choice(w) => w.end(env, attribute),
            Walker::Group(w) => w.end(env, attribute),
            Walker::Interleave(w) => w.end(env, attribute),
            Walker::OneOrMore(w) => w.end(env, attribute),
        }
    }

    /// Called once the start tag is closed: attribute walkers stop accepting
    /// anything. Does not reach into child elements.
    pub fn suppress_attributes(&mut self) {
        match self {
            Walker::Attribute(w) => w.suppress_attributes(),
            Walker::Choice(w) => w.suppress_attributes(),
            Walker::Group(w) => w.suppress_attributes(),
            Walker::Interleave(w) => w.suppress_attributes(),
            Walker::OneOrMore(w) => w.suppress_attributes(),
            Walker::Empty
            | Walker::NotAllowed
            | Walker::Text
            | Walker::Data(_)
            | Walker::Value(_)
            | Walker::List(_)
            | Walker::Element(_) => {}
        }
    }

    /// An independent copy. Sub-walkers are owned, never shared, so a deep
    /// clone copies each exactly once.
    pub fn fork(&self) -> Walker {
        self.clone()
    }
}

/// Walks a `data` pattern.
#[derive(Clone, Debug)]
pub struct DataWalker {
    pattern: PatternId,
    matched: bool,
}

impl DataWalker {
    fn possible(&self, env: &Env) -> EventSet {
        match env.grammar.pattern(self.pattern) {
            Pattern::Data { datatype, .. } if !self.matched => {
                [Event::text(datatype.regexp())].into_iter().collect()
            }
            _ => EventSet::new(),
        }
    }

    fn allows(&self, env: &Env, value: &str) -> bool {
        let Pattern::Data {
            datatype, params, ..
        } = env.grammar.pattern(self.pattern)
        else {
            return false;
        };
        datatype
            .disallows(value, params, env.context(&**datatype))
            .is_none()
    }

    fn fire_event(&mut self, env: &Env, ev: Event) -> FireResult {
        let EventKind::Text(value) = ev.kind() else {
            return FireResult::Rejected;
        };
        if self.matched || !self.allows(env, value) {
            return FireResult::Rejected;
        }
        if let Pattern::Data {
            except: Some(except),
            ..
        } = env.grammar.pattern(self.pattern)
        {
            let mut walker = Walker::new(env, *except);
            let excluded = walker.fire_event(env, ev) == FireResult::Accepted
                && walker.can_end(env, false);
            if excluded {
                return FireResult::Rejected;
            }
        }
        self.matched = true;
        FireResult::Accepted
    }

    fn can_end(&self, env: &Env, attribute: bool) -> bool {
        attribute || self.matched || self.allows(env, "")
    }

    fn end(&mut self, env: &Env, attribute: bool) -> Result<(), Vec<ValidationError>> {
        if self.can_end(env, attribute) {
            Ok(())
        } else {
            Err(vec![ValidationError::message("value required")])
        }
    }
}

/// Walks a `value` pattern.
#[derive(Clone, Debug)]
pub struct ValueWalker {
    pattern: PatternId,
    matched: bool,
}

impl ValueWalker {
    fn possible(&self, env: &Env) -> EventSet {
        match env.grammar.pattern(self.pattern) {
            Pattern::Value { raw, .. } if !self.matched => {
                [Event::text(raw)].into_iter().collect()
            }
            _ => EventSet::new(),
        }
    }

    fn equal(&self, env: &Env, value: &str) -> bool {
        let Pattern::Value {
            datatype,
            value: expected,
            ..
        } = env.grammar.pattern(self.pattern)
        else {
            return false;
        };
        datatype.equal(value, expected, env.context(&**datatype))
    }

    fn fire_event(&mut self, env: &Env, ev: Event) -> FireResult {
        match ev.kind() {
            EventKind::Text(value) if !self.matched && self.equal(env, value) => {
                self.matched = true;
                FireResult::Accepted
            }
            _ => FireResult::Rejected,
        }
    }

    fn can_end(&self, env: &Env, attribute: bool) -> bool {
        attribute || self.matched || self.equal(env, "")
    }

    fn end(&mut self, env: &Env, attribute: bool) -> Result<(), Vec<ValidationError>> {
        if self.can_end(env, attribute) {
            return Ok(());
        }
        let raw = match env.grammar.pattern(self.pattern) {
            Pattern::Value { raw, .. } => raw.as_str(),
            _ => "",
        };
        Err(vec![ValidationError::message(format!(
            "value required: {raw}"
        ))])
    }
}

/// Walks a `list` pattern: text is split on whitespace and each token is
/// fed to the item pattern.
#[derive(Clone, Debug)]
pub struct ListWalker {
    pat: PatternId,
    sub: Option<Box<Walker>>,
    seen_tokens: bool,
}

impl ListWalker {
    fn possible(&self, env: &Env) -> EventSet {
        env.peek(&self.sub, self.pat, false).possible(env)
    }

    fn fire_event(&mut self, env: &Env, ev: Event) -> FireResult {
        let EventKind::Text(value) = ev.kind() else {
            return FireResult::Rejected;
        };
        let tokens: Vec<&str> = value
            .split(is_xml_whitespace)
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return FireResult::Accepted;
        }
        let mut working = env.peek(&self.sub, self.pat, false).into_owned();
        let mut errors = vec![];
        for token in tokens {
            match working.fire_event(env, Event::text(token)) {
                FireResult::Rejected => return FireResult::Rejected,
                r => errors.extend(r.into_errors()),
            }
        }
        self.sub = Some(Box::new(working));
        self.seen_tokens = true;
        FireResult::from_errors(errors)
    }

    fn can_end(&self, env: &Env, attribute: bool) -> bool {
        if attribute {
            return true;
        }
        if self.seen_tokens {
            return env.peek(&self.sub, self.pat, false).can_end(env, false);
        }
        let mut trial = Walker::new(env, self.pat);
        !trial.fire_event(env, Event::empty()).is_rejected() && trial.can_end(env, false)
    }

    fn end(&mut self, env: &Env, attribute: bool) -> Result<(), Vec<ValidationError>> {
        if attribute {
            return Ok(());
        }
        if self.seen_tokens {
            let sub = env.instantiate(&mut self.sub, self.pat, false);
            sub.end(env, false)?;
        }
        if self.can_end(env, false) {
            Ok(())
        } else {
            Err(vec![ValidationError::message("unfulfilled list")])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaxng_model::datatype::{Param, xsd};
    use relaxng_model::{GrammarBuilder, NamePattern};

    fn fire(env: &Env, w: &mut Walker, ev: Event) -> FireResult {
        w.fire_event(env, ev)
    }

    #[test]
    fn empty_accepts_whitespace_and_the_empty_event() {
        let mut b = GrammarBuilder::new();
        let start = b.empty();
        let g = b.build(start).unwrap();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };
        let mut w = Walker::new(&env, start);
        assert_eq!(fire(&env, &mut w, Event::text(" \n")), FireResult::Accepted);
        assert_eq!(fire(&env, &mut w, Event::empty()), FireResult::Accepted);
        assert_eq!(fire(&env, &mut w, Event::text("x")), FireResult::Rejected);
        assert!(w.possible(&env).is_empty());
    }

    #[test]
    fn data_with_except() {
        let mut b = GrammarBuilder::new();
        let bad = b.value("", "token", "13", "");
        let start = b.data(
            xsd::NAMESPACE_URI,
            "integer",
            &[Param::new("maxInclusive", "20")],
            Some(bad),
        );
        let g = b.build(start).unwrap();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };

        let w = Walker::new(&env, start);
        assert!(!w.can_end(&env, false));
        assert!(w.can_end(&env, true));
        assert_eq!(w.clone().end(&env, false), Err(vec![ValidationError::message("value required")]));

        assert_eq!(fire(&env, &mut w.clone(), Event::text("13")), FireResult::Rejected);
        assert_eq!(fire(&env, &mut w.clone(), Event::text("21")), FireResult::Rejected);
        let mut ok = w.clone();
        assert_eq!(fire(&env, &mut ok, Event::text(" 12 ")), FireResult::Accepted);
        assert_eq!(ok.end(&env, false), Ok(()));
        assert!(ok.possible(&env).is_empty());
    }

    #[test]
    fn value_needing_context_uses_the_resolver() {
        let mut b = GrammarBuilder::new();
        let ns = relaxng_model::datatype::StaticNamespaces::new("").bind("s", "urn:s");
        let start = b.value_in_context(xsd::NAMESPACE_URI, "QName", "s:x", &ns);
        let g = b.build(start).unwrap();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };
        let w = Walker::new(&env, start);
        assert_eq!(fire(&env, &mut w.clone(), Event::text("d:x")), FireResult::Rejected);
        assert_eq!(
            w.clone().end(&env, false),
            Err(vec![ValidationError::message("value required: s:x")])
        );

        let mut r = NameResolver::new();
        r.define_prefix("d", "urn:s");
        let env = Env { grammar: &g, resolver: &r };
        assert_eq!(fire(&env, &mut w.clone(), Event::text("d:x")), FireResult::Accepted);
    }

    #[test]
    fn list_tokens() {
        let mut b = GrammarBuilder::new();
        let int = b.data(xsd::NAMESPACE_URI, "integer", &[], None);
        let ints = b.one_or_more(int);
        let start = b.list(ints);
        let g = b.build(start).unwrap();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };

        let mut w = Walker::new(&env, start);
        assert!(!w.can_end(&env, false));
        assert_eq!(fire(&env, &mut w, Event::text("  ")), FireResult::Accepted);
        assert_eq!(
            w.end(&env, false),
            Err(vec![ValidationError::message("unfulfilled list")])
        );
        assert_eq!(fire(&env, &mut w, Event::text("1 x 3")), FireResult::Rejected);
        assert_eq!(fire(&env, &mut w, Event::text(" 1\n2 3 ")), FireResult::Accepted);
        assert_eq!(w.end(&env, false), Ok(()));
    }

    #[test]
    fn optional_list_can_be_empty() {
        let mut b = GrammarBuilder::new();
        let tok = b.data("", "token", &[], None);
        let toks = b.zero_or_more(tok);
        let start = b.list(toks);
        let g = b.build(start).unwrap();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };
        let w = Walker::new(&env, start);
        assert!(w.can_end(&env, false));
    }

    #[test]
    fn element_over_not_allowed_never_matches() {
        let mut b = GrammarBuilder::new();
        let na = b.not_allowed();
        let start = b.element(NamePattern::name("", "a"), na);
        let g = b.build(start).unwrap();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };
        let mut w = Walker::new(&env, start);
        assert!(matches!(w, Walker::NotAllowed));
        assert_eq!(fire(&env, &mut w, Event::enter_start_tag("", "a")), FireResult::Rejected);
        assert!(!w.can_end(&env, false));
    }
}
