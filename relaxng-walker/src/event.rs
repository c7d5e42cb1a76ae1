//! Validation events. Events are interned, so two events with the same
//! parameters are the same allocation and compare by address.

use fnv::FnvHashSet;
use lazy_static::lazy_static;
use relaxng_model::NamePattern;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, PoisonError};

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum EventKind {
    EnterStartTag { ns: String, name: String },
    LeaveStartTag,
    EndTag { ns: String, name: String },
    AttributeName { ns: String, name: String },
    AttributeValue(String),
    Text(String),
    EnterContext,
    LeaveContext,
    DefinePrefix { prefix: String, uri: String },
    /// Tells attribute walkers that a missing attribute has been reported.
    NeutralizeAttribute(NamePattern),
    /// Tests whether a walker can match nothing at all.
    Empty,
}

impl EventKind {
    /// The event name followed by its parameters.
    pub fn params(&self) -> Vec<String> {
        match self {
            EventKind::EnterStartTag { ns, name } => {
                vec!["enterStartTag".to_string(), ns.clone(), name.clone()]
            }
            EventKind::LeaveStartTag => vec!["leaveStartTag".to_string()],
            EventKind::EndTag { ns, name } => vec!["endTag".to_string(), ns.clone(), name.clone()],
            EventKind::AttributeName { ns, name } => {
                vec!["attributeName".to_string(), ns.clone(), name.clone()]
            }
            EventKind::AttributeValue(value) => {
                vec!["attributeValue".to_string(), value.clone()]
            }
            EventKind::Text(value) => vec!["text".to_string(), value.clone()],
            EventKind::EnterContext => vec!["enterContext".to_string()],
            EventKind::LeaveContext => vec!["leaveContext".to_string()],
            EventKind::DefinePrefix { prefix, uri } => {
                vec!["definePrefix".to_string(), prefix.clone(), uri.clone()]
            }
            EventKind::NeutralizeAttribute(name) => {
                vec!["neutralizeAttribute".to_string(), name.to_string()]
            }
            EventKind::Empty => vec!["<empty>".to_string()],
        }
    }
}

lazy_static! {
    static ref CACHE: Mutex<FnvHashSet<&'static EventKind>> = Mutex::new(FnvHashSet::default());
}

/// Handle to an interned `EventKind`.
#[derive(Copy, Clone, Debug)]
pub struct Event(&'static EventKind);

impl Event {
    pub fn new(kind: EventKind) -> Event {
        let mut cache = CACHE.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = cache.get(&kind) {
            return Event(*existing);
        }
        let interned: &'static EventKind = Box::leak(Box::new(kind));
        cache.insert(interned);
        Event(interned)
    }

    pub fn enter_start_tag(ns: &str, name: &str) -> Event {
        Event::new(EventKind::EnterStartTag {
            ns: ns.to_string(),
            name: name.to_string(),
        })
    }

    pub fn leave_start_tag() -> Event {
        Event::new(EventKind::LeaveStartTag)
    }

    pub fn end_tag(ns: &str, name: &str) -> Event {
        Event::new(EventKind::EndTag {
            ns: ns.to_string(),
            name: name.to_string(),
        })
    }

    pub fn attribute_name(ns: &str, name: &str) -> Event {
        Event::new(EventKind::AttributeName {
            ns: ns.to_string(),
            name: name.to_string(),
        })
    }

    pub fn attribute_value(value: &str) -> Event {
        Event::new(EventKind::AttributeValue(value.to_string()))
    }

    pub fn text(value: &str) -> Event {
        Event::new(EventKind::Text(value.to_string()))
    }

    pub fn enter_context() -> Event {
        Event::new(EventKind::EnterContext)
    }

    pub fn leave_context() -> Event {
        Event::new(EventKind::LeaveContext)
    }

    pub fn define_prefix(prefix: &str, uri: &str) -> Event {
        Event::new(EventKind::DefinePrefix {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        })
    }

    pub fn neutralize_attribute(name: NamePattern) -> Event {
        Event::new(EventKind::NeutralizeAttribute(name))
    }

    pub fn empty() -> Event {
        Event::new(EventKind::Empty)
    }

    pub fn kind(self) -> &'static EventKind {
        self.0
    }

    pub fn is_attribute_event(self) -> bool {
        matches!(
            self.0,
            EventKind::AttributeName { .. }
                | EventKind::AttributeValue(_)
                | EventKind::NeutralizeAttribute(_)
        )
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event: {}", self.0.params().join(", "))
    }
}

/// A small set of events. Membership is by identity, which interning makes
/// equivalent to comparing parameters.
#[derive(Clone, Debug, Default)]
pub struct EventSet(Vec<Event>);

impl PartialEq for EventSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|ev| other.contains(ev))
    }
}

impl Eq for EventSet {}

impl EventSet {
    pub fn new() -> EventSet {
        EventSet(vec![])
    }

    pub fn add(&mut self, ev: Event) {
        if !self.contains(ev) {
            self.0.push(ev);
        }
    }

    pub fn contains(&self, ev: Event) -> bool {
        self.0.contains(&ev)
    }

    pub fn union(&mut self, other: EventSet) {
        for ev in other.0 {
            self.add(ev);
        }
    }

    pub fn filter(self, pred: impl Fn(Event) -> bool) -> EventSet {
        EventSet(self.0.into_iter().filter(|ev| pred(*ev)).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the events as a tree keyed by event name, then by each
    /// parameter in turn, with keys sorted at every level.
    pub fn to_tree_string(&self) -> String {
        #[derive(Default)]
        struct Tree(BTreeMap<String, Tree>);

        fn render(tree: &Tree, depth: usize, out: &mut String) {
            for (key, child) in &tree.0 {
                for _ in 0..depth {
                    out.push_str("    ");
                }
                out.push_str(key);
                if !child.0.is_empty() {
                    out.push(':');
                }
                out.push('\n');
                render(child, depth + 1, out);
            }
        }

        let mut root = Tree::default();
        for ev in &self.0 {
            let mut node = &mut root;
            for param in ev.kind().params() {
                node = node.0.entry(param).or_default();
            }
        }
        let mut out = String::new();
        render(&root, 0, &mut out);
        out
    }
}

impl FromIterator<Event> for EventSet {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        let mut set = EventSet::new();
        for ev in iter {
            set.add(ev);
        }
        set
    }
}

impl IntoIterator for EventSet {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned() {
        let a = Event::enter_start_tag("urn:x", "a");
        let b = Event::enter_start_tag("urn:x", "a");
        assert_eq!(a, b);
        assert!(std::ptr::eq(a.kind(), b.kind()));
        assert_ne!(a, Event::end_tag("urn:x", "a"));
        assert_ne!(Event::text("a"), Event::attribute_value("a"));
    }

    #[test]
    fn attribute_events() {
        assert!(Event::attribute_name("", "x").is_attribute_event());
        assert!(Event::attribute_value("1").is_attribute_event());
        assert!(Event::neutralize_attribute(NamePattern::name("", "x")).is_attribute_event());
        assert!(!Event::leave_start_tag().is_attribute_event());
        assert!(!Event::text("1").is_attribute_event());
    }

    #[test]
    fn set_deduplicates() {
        let mut set = EventSet::new();
        set.add(Event::text("*"));
        set.add(Event::text("*"));
        set.union([Event::leave_start_tag(), Event::text("*")].into_iter().collect());
        assert_eq!(set.len(), 2);
        assert!(set.contains(Event::leave_start_tag()));
    }

    #[test]
    fn tree_string() {
        let set: EventSet = [
            Event::enter_start_tag("urn:b", "x"),
            Event::leave_start_tag(),
            Event::enter_start_tag("urn:a", "z"),
            Event::enter_start_tag("urn:a", "y"),
            Event::attribute_name("", "id"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            set.to_tree_string(),
            "attributeName:\n    :\n        id\nenterStartTag:\n    urn:a:\n        y\n        z\n    urn:b:\n        x\nleaveStartTag\n"
        );
    }

    #[test]
    fn display() {
        assert_eq!(
            Event::define_prefix("p", "urn:p").to_string(),
            "Event: definePrefix, p, urn:p"
        );
    }
}
