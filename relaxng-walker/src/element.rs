//! Element and attribute walkers: the only walkers that consume names.

use crate::error::ValidationError;
use crate::event::{Event, EventKind, EventSet};
use crate::walker::{Env, FireResult, Walker, errors_of, result_of};
use log::debug;
use relaxng_model::name_pattern::ANY_NAMESPACE;
use relaxng_model::{NamePattern, Pattern, PatternId};

/// The name class and content of an `element` or `attribute` pattern.
fn parts<'g>(env: &Env<'g>, id: PatternId) -> (&'g NamePattern, PatternId) {
    match env.grammar.pattern(id) {
        Pattern::Element { name, pat } | Pattern::Attribute { name, pat } => (name, *pat),
        other => panic!("{} is not an element or attribute: {:?}", id.index(), other),
    }
}

/// Turns advertised name pairs back into name patterns, `"*"` marking the
/// unconstrained parts.
pub(crate) fn advertised_pattern(ns: &str, name: &str) -> NamePattern {
    match (ns, name) {
        (ANY_NAMESPACE, ANY_NAMESPACE) => NamePattern::any_name(None),
        (ns, ANY_NAMESPACE) => NamePattern::ns_name(ns, None),
        (ns, name) => NamePattern::name(ns, name),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttributeState {
    AwaitingName,
    AwaitingValue,
    Done,
}

/// Once the start tag is over an attribute walker accepts nothing. It can
/// still end only if its attribute was seen or a neutralize event closed it.
#[derive(Clone, Debug)]
pub struct AttributeWalker {
    pattern: PatternId,
    state: AttributeState,
    name: Option<(&'static str, &'static str)>,
    neutralized: bool,
    suppressed: bool,
}

impl AttributeWalker {
    pub(crate) fn new(pattern: PatternId) -> AttributeWalker {
        AttributeWalker {
            pattern,
            state: AttributeState::AwaitingName,
            name: None,
            neutralized: false,
            suppressed: false,
        }
    }

    fn concrete_name(&self, env: &Env) -> NamePattern {
        match self.name {
            Some((ns, name)) => NamePattern::name(ns, name),
            None => parts(env, self.pattern).0.clone(),
        }
    }

    pub(crate) fn possible(&self, env: &Env) -> EventSet {
        if self.suppressed || self.neutralized {
            return EventSet::new();
        }
        let (name, content) = parts(env, self.pattern);
        match self.state {
            AttributeState::AwaitingName => name
                .advertised_names()
                .into_iter()
                .map(|(ns, local)| Event::attribute_name(ns, local))
                .collect(),
            AttributeState::AwaitingValue => Walker::new(env, content)
                .possible(env)
                .iter()
                .filter_map(|ev| match ev.kind() {
                    EventKind::Text(value) => Some(Event::attribute_value(value)),
                    _ => None,
                })
                .collect(),
            AttributeState::Done => EventSet::new(),
        }
    }

    pub(crate) fn fire_event(&mut self, env: &Env, ev: Event) -> FireResult {
        if self.suppressed || self.neutralized {
            return FireResult::Rejected;
        }
        let (name, content) = parts(env, self.pattern);
        match (self.state, ev.kind()) {
            (AttributeState::AwaitingName, EventKind::NeutralizeAttribute(neutral))
                if neutral == name =>
            {
                self.neutralized = true;
                FireResult::Accepted
            }
            (AttributeState::AwaitingValue, EventKind::NeutralizeAttribute(neutral))
                if *neutral == self.concrete_name(env) =>
            {
                self.neutralized = true;
                FireResult::Accepted
            }
            (AttributeState::AwaitingName, EventKind::AttributeName { ns, name: local })
                if name.matches(ns, local) =>
            {
                self.state = AttributeState::AwaitingValue;
                self.name = Some((ns.as_str(), local.as_str()));
                FireResult::Accepted
            }
            (AttributeState::AwaitingValue, EventKind::AttributeValue(value)) => {
                self.state = AttributeState::Done;
                let mut walker = Walker::new(env, content);
                let valid = match walker.fire_event(env, Event::text(value)) {
                    FireResult::Accepted => walker.end(env, false).is_ok(),
                    FireResult::Errors(_) | FireResult::Rejected => false,
                };
                if valid {
                    FireResult::Accepted
                } else {
                    FireResult::Errors(vec![ValidationError::attribute_value(
                        "invalid attribute value",
                        self.concrete_name(env),
                    )])
                }
            }
            _ => FireResult::Rejected,
        }
    }

    pub(crate) fn can_end(&self) -> bool {
        self.neutralized || self.state == AttributeState::Done
    }

    pub(crate) fn end(&self, env: &Env) -> Result<(), Vec<ValidationError>> {
        if self.can_end() {
            return Ok(());
        }
        Err(vec![match self.state {
            AttributeState::AwaitingValue => {
                ValidationError::attribute_value("attribute value missing", self.concrete_name(env))
            }
            _ => ValidationError::attribute_name("attribute missing", self.concrete_name(env)),
        }])
    }

    pub(crate) fn suppress_attributes(&mut self) {
        self.suppressed = true;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ElementState {
    AwaitingName,
    InStartTag,
    InContent,
    Closed,
}

#[derive(Clone, Debug)]
pub struct ElementWalker {
    pattern: PatternId,
    state: ElementState,
    name: Option<(&'static str, &'static str)>,
    content: Option<Box<Walker>>,
}

impl ElementWalker {
    pub(crate) fn new(pattern: PatternId) -> ElementWalker {
        ElementWalker {
            pattern,
            state: ElementState::AwaitingName,
            name: None,
            content: None,
        }
    }

    fn concrete_name(&self, env: &Env) -> NamePattern {
        match self.name {
            Some((ns, name)) => NamePattern::name(ns, name),
            None => parts(env, self.pattern).0.clone(),
        }
    }

    pub(crate) fn possible(&self, env: &Env) -> EventSet {
        let (name, content_id) = parts(env, self.pattern);
        let content = env.peek(&self.content, content_id, false);
        match self.state {
            ElementState::AwaitingName => name
                .advertised_names()
                .into_iter()
                .map(|(ns, local)| Event::enter_start_tag(ns, local))
                .collect(),
            ElementState::InStartTag => {
                let mut set = EventSet::new();
                if env.grammar.has_attributes(content_id) {
                    let attrs = content.possible(env).filter(Event::is_attribute_event);
                    let values = attrs
                        .clone()
                        .filter(|ev| matches!(ev.kind(), EventKind::AttributeValue(_)));
                    if !values.is_empty() {
                        return values;
                    }
                    set.union(attrs);
                    if !content.can_end(env, true) {
                        return set;
                    }
                }
                set.add(Event::leave_start_tag());
                set
            }
            ElementState::InContent => {
                let mut set = content
                    .possible(env)
                    .filter(|ev| !ev.is_attribute_event());
                if content.can_end(env, false) {
                    if let Some((ns, local)) = self.name {
                        set.add(Event::end_tag(ns, local));
                    }
                }
                set
            }
            ElementState::Closed => EventSet::new(),
        }
    }

    pub(crate) fn fire_event(&mut self, env: &Env, ev: Event) -> FireResult {
        let (name, content_id) = parts(env, self.pattern);
        match self.state {
            ElementState::AwaitingName => match ev.kind() {
                EventKind::EnterStartTag { ns, name: local } if name.matches(ns, local) => {
                    self.name = Some((ns.as_str(), local.as_str()));
                    self.content = Some(Box::new(Walker::new(env, content_id)));
                    self.state = ElementState::InStartTag;
                    FireResult::Accepted
                }
                _ => FireResult::Rejected,
            },
            ElementState::InStartTag => {
                let content = env.instantiate(&mut self.content, content_id, false);
                match ev.kind() {
                    EventKind::LeaveStartTag => {
                        self.state = ElementState::InContent;
                        let errors = errors_of(content.end(env, true));
                        for name in errors.iter().flat_map(ValidationError::names) {
                            let neutralize = Event::neutralize_attribute(name.clone());
                            if content.fire_event(env, neutralize).is_rejected() {
                                debug!("no attribute walker to neutralize for {}", name);
                            }
                        }
                        content.suppress_attributes();
                        FireResult::from_errors(errors)
                    }
                    _ if ev.is_attribute_event() => content.fire_event(env, ev),
                    _ => FireResult::Rejected,
                }
            }
            ElementState::InContent => {
                let content = env.instantiate(&mut self.content, content_id, true);
                let result = content.fire_event(env, ev);
                if !result.is_rejected() {
                    return result;
                }
                match (ev.kind(), self.name) {
                    (EventKind::EndTag { ns, name }, Some((bound_ns, bound_name)))
                        if ns == bound_ns && name == bound_name =>
                    {
                        self.state = ElementState::Closed;
                        FireResult::from_errors(errors_of(content.end(env, false)))
                    }
                    (EventKind::LeaveStartTag, _) => FireResult::Errors(vec![
                        ValidationError::message(
                            "unexpected leaveStartTag event; it is likely that fireEvent is incorrectly called",
                        ),
                    ]),
                    _ => FireResult::Rejected,
                }
            }
            ElementState::Closed => FireResult::Rejected,
        }
    }

    pub(crate) fn can_end(&self, attribute: bool) -> bool {
        attribute || self.state == ElementState::Closed
    }

    pub(crate) fn end(&mut self, env: &Env, attribute: bool) -> Result<(), Vec<ValidationError>> {
        if attribute {
            return Ok(());
        }
        let msg = match self.state {
            ElementState::Closed => return Ok(()),
            ElementState::AwaitingName => {
                return Err(vec![ValidationError::element_name(
                    "tag required",
                    self.concrete_name(env),
                )]);
            }
            ElementState::InStartTag => "start tag not terminated",
            ElementState::InContent => "tag not closed",
        };
        let (_, content_id) = parts(env, self.pattern);
        let content = env.instantiate(&mut self.content, content_id, false);
        let mut errors = errors_of(content.end(env, false));
        errors.push(ValidationError::element_name(msg, self.concrete_name(env)));
        result_of(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name_resolver::NameResolver;
    use relaxng_model::{Grammar, GrammarBuilder};

    fn grammar() -> (Grammar, PatternId) {
        // element a { attribute x { "1" }, attribute y { text }?, element b { empty } }
        let mut b = GrammarBuilder::new();
        let one = b.value("", "token", "1", "");
        let x = b.attribute(NamePattern::name("", "x"), one);
        let text = b.text();
        let y = b.attribute(NamePattern::name("", "y"), text);
        let y = b.optional(y);
        let empty = b.empty();
        let child = b.element(NamePattern::name("", "b"), empty);
        let attrs = b.group(x, y);
        let content = b.group(attrs, child);
        let start = b.element(NamePattern::name("", "a"), content);
        (b.build(start).unwrap(), start)
    }

    #[test]
    fn start_tag_possibilities() {
        let (g, start) = grammar();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };
        let mut w = Walker::new(&env, start);
        assert_eq!(w.possible(&env).to_tree_string(), "enterStartTag:\n    :\n        a\n");
        w.fire_event(&env, Event::enter_start_tag("", "a"));
        assert_eq!(
            w.possible(&env).to_tree_string(),
            "attributeName:\n    :\n        x\n        y\n"
        );
        w.fire_event(&env, Event::attribute_name("", "x"));
        assert_eq!(w.possible(&env).to_tree_string(), "attributeValue:\n    1\n");
        assert_eq!(
            w.fire_event(&env, Event::attribute_value("1")),
            FireResult::Accepted
        );
        let after = w.possible(&env);
        assert!(after.contains(Event::leave_start_tag()));
        assert!(after.contains(Event::attribute_name("", "y")));
    }

    #[test]
    fn missing_attribute_reported_once() {
        let (g, start) = grammar();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };
        let mut w = Walker::new(&env, start);
        w.fire_event(&env, Event::enter_start_tag("", "a"));
        assert_eq!(
            w.fire_event(&env, Event::leave_start_tag()),
            FireResult::Errors(vec![ValidationError::attribute_name(
                "attribute missing",
                NamePattern::name("", "x")
            )])
        );
        assert_eq!(w.fire_event(&env, Event::enter_start_tag("", "b")), FireResult::Accepted);
        assert_eq!(w.fire_event(&env, Event::leave_start_tag()), FireResult::Accepted);
        assert_eq!(w.fire_event(&env, Event::end_tag("", "b")), FireResult::Accepted);
        assert_eq!(w.fire_event(&env, Event::end_tag("", "a")), FireResult::Accepted);
        assert!(w.can_end(&env, false));
    }

    #[test]
    fn only_neutralizing_closes_a_missing_attribute() {
        let mut b = GrammarBuilder::new();
        let text = b.text();
        let x = b.attribute(NamePattern::name("", "x"), text);
        let g = b.build(x).unwrap();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };

        let mut w = Walker::new(&env, x);
        w.suppress_attributes();
        assert!(!w.can_end(&env, true));
        assert_eq!(
            w.end(&env, false),
            Err(vec![ValidationError::message("attribute missing: x")])
        );

        let mut w = Walker::new(&env, x);
        let other = Event::neutralize_attribute(NamePattern::name("", "y"));
        assert_eq!(w.fire_event(&env, other), FireResult::Rejected);
        let neutralize = Event::neutralize_attribute(NamePattern::name("", "x"));
        assert_eq!(w.fire_event(&env, neutralize), FireResult::Accepted);
        w.suppress_attributes();
        assert!(w.can_end(&env, false));
        assert!(w.possible(&env).is_empty());

        // A name without its value is closed the same way.
        let mut w = Walker::new(&env, x);
        w.fire_event(&env, Event::attribute_name("", "x"));
        assert_eq!(w.fire_event(&env, neutralize), FireResult::Accepted);
        assert_eq!(w.end(&env, true), Ok(()));
    }

    #[test]
    fn bad_attribute_value() {
        let (g, start) = grammar();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };
        let mut w = Walker::new(&env, start);
        w.fire_event(&env, Event::enter_start_tag("", "a"));
        w.fire_event(&env, Event::attribute_name("", "x"));
        assert_eq!(
            w.fire_event(&env, Event::attribute_value("2")),
            FireResult::Errors(vec![ValidationError::message("invalid attribute value: x")])
        );
        assert_eq!(w.fire_event(&env, Event::leave_start_tag()), FireResult::Accepted);
    }

    #[test]
    fn unfinished_element() {
        let (g, start) = grammar();
        let r = NameResolver::new();
        let env = Env { grammar: &g, resolver: &r };
        let mut w = Walker::new(&env, start);
        assert_eq!(
            w.end(&env, false),
            Err(vec![ValidationError::message("tag required: a")])
        );
        assert_eq!(w.end(&env, true), Ok(()));
        w.fire_event(&env, Event::enter_start_tag("", "a"));
        w.fire_event(&env, Event::attribute_name("", "x"));
        w.fire_event(&env, Event::attribute_value("1"));
        w.fire_event(&env, Event::leave_start_tag());
        let expected = Err(vec![
            ValidationError::message("tag required: b"),
            ValidationError::message("tag not closed: a"),
        ]);
        assert_eq!(w.end(&env, false), expected);
        assert_eq!(w.end(&env, false), expected);
    }
}
