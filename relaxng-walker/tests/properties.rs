//! Property-based tests for the grammar walker.
//!
//! Documents are generated as random element trees over a small vocabulary,
//! so most of them are invalid in some way; the properties must hold either
//! way.

use proptest::prelude::*;
use relaxng_model::datatype::xsd;
use relaxng_model::{Grammar, GrammarBuilder, NamePattern};
use relaxng_walker::{Event, GrammarWalker, NewWalker};
use std::rc::Rc;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    }
}

/// ```text
/// start = element a { attribute x { xsd:integer }?,
///                     (element b { text } | element c { empty })*,
///                     d? }
/// d = element d { attribute y { text }, (d | text)* }
/// ```
fn grammar() -> Rc<Grammar> {
    let mut b = GrammarBuilder::new();
    let int = b.data(xsd::NAMESPACE_URI, "integer", &[], None);
    let x = b.attribute(NamePattern::name("", "x"), int);
    let opt_x = b.optional(x);

    let text = b.text();
    let elem_b = b.element(NamePattern::name("", "b"), text);
    let empty = b.empty();
    let elem_c = b.element(NamePattern::name("", "c"), empty);
    let b_or_c = b.choice(elem_b, elem_c);
    let children = b.zero_or_more(b_or_c);

    let y = b.attribute(NamePattern::name("", "y"), text);
    let d_ref = b.reference("d");
    let d_or_text = b.choice(d_ref, text);
    let d_children = b.zero_or_more(d_or_text);
    let d_content = b.group(y, d_children);
    let elem_d = b.element(NamePattern::name("", "d"), d_content);
    b.define("d", elem_d);
    let outer_ref = b.reference("d");
    let opt_d = b.optional(outer_ref);

    let rest = b.group(children, opt_d);
    let content = b.group(opt_x, rest);
    let root = b.element(NamePattern::name("", "a"), content);
    Rc::new(b.build(root).unwrap())
}

#[derive(Clone, Debug)]
struct Node {
    name: &'static str,
    attributes: Vec<(&'static str, &'static str)>,
    children: Vec<Child>,
}

#[derive(Clone, Debug)]
enum Child {
    Element(Node),
    Text(&'static str),
}

fn element_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["a", "b", "c", "d", "e"])
}

fn attributes() -> impl Strategy<Value = Vec<(&'static str, &'static str)>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["x", "y", "z"]),
            prop::sample::select(vec!["1", "two", ""]),
        ),
        0..3,
    )
}

fn node() -> impl Strategy<Value = Node> {
    let leaf = (element_name(), attributes()).prop_map(|(name, attributes)| Node {
        name,
        attributes,
        children: vec![],
    });
    leaf.prop_recursive(4, 32, 4, |inner| {
        (
            element_name(),
            attributes(),
            prop::collection::vec(
                prop_oneof![
                    inner.prop_map(Child::Element),
                    prop::sample::select(vec!["hi", " ", "\n  ", "42"]).prop_map(Child::Text),
                ],
                0..4,
            ),
        )
            .prop_map(|(name, attributes, children)| Node {
                name,
                attributes,
                children,
            })
    })
}

/// The events an XML parser would produce for `node`. Adjacent text
/// children are merged into one event.
fn events(node: &Node, out: &mut Vec<Event>) {
    out.push(Event::enter_start_tag("", node.name));
    for (name, value) in &node.attributes {
        out.push(Event::attribute_name("", name));
        out.push(Event::attribute_value(value));
    }
    out.push(Event::leave_start_tag());
    let mut text = String::new();
    for child in &node.children {
        match child {
            Child::Text(t) => text.push_str(t),
            Child::Element(element) => {
                if !text.is_empty() {
                    out.push(Event::text(&std::mem::take(&mut text)));
                }
                events(element, out);
            }
        }
    }
    if !text.is_empty() {
        out.push(Event::text(&text));
    }
    out.push(Event::end_tag("", node.name));
}

fn document(node: &Node) -> Vec<Event> {
    let mut out = vec![];
    events(node, &mut out);
    out
}

fn run(w: &mut GrammarWalker, events: &[Event]) -> Vec<Vec<String>> {
    events
        .iter()
        .map(|ev| {
            w.fire_event(*ev)
                .err()
                .unwrap_or_default()
                .iter()
                .map(|e| e.to_string())
                .collect()
        })
        .collect()
}

fn end(w: &mut GrammarWalker) -> Vec<String> {
    w.end()
        .err()
        .unwrap_or_default()
        .iter()
        .map(|e| e.to_string())
        .collect()
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn validation_is_deterministic(doc in node()) {
        let g = grammar();
        let events = document(&doc);
        let mut first = g.new_walker();
        let mut second = g.new_walker();
        prop_assert_eq!(run(&mut first, &events), run(&mut second, &events));
        prop_assert_eq!(end(&mut first), end(&mut second));
    }

    #[test]
    fn end_is_idempotent(doc in node(), cut in any::<prop::sample::Index>()) {
        let g = grammar();
        let events = document(&doc);
        let cut = cut.index(events.len() + 1);
        let mut w = g.new_walker();
        run(&mut w, &events[..cut]);
        let once = end(&mut w);
        prop_assert_eq!(&once, &end(&mut w));
    }

    #[test]
    fn fork_is_independent(doc in node(), cut in any::<prop::sample::Index>()) {
        let g = grammar();
        let events = document(&doc);
        let cut = cut.index(events.len() + 1);
        let mut original = g.new_walker();
        run(&mut original, &events[..cut]);
        let mut fork = original.fork();
        prop_assert_eq!(original.possible(), fork.possible());
        prop_assert_eq!(run(&mut original, &events[cut..]), run(&mut fork, &events[cut..]));
        prop_assert_eq!(end(&mut original), end(&mut fork));
    }

    #[test]
    fn fork_ignores_later_events_on_the_original(doc in node()) {
        let g = grammar();
        let events = document(&doc);
        let fresh = g.new_walker();
        let untouched = fresh.fork();
        let mut driven = fresh;
        run(&mut driven, &events);
        prop_assert_eq!(untouched.possible(), g.new_walker().possible());
        prop_assert_eq!(untouched.can_end(), g.new_walker().can_end());
    }
}

#[test]
fn forks_do_not_see_each_others_prefixes() {
    let g = grammar();
    let mut original = g.new_walker();
    original.fire_event(Event::enter_context()).unwrap();
    original.fire_event(Event::define_prefix("p", "urn:one")).unwrap();
    let mut fork = original.fork();

    original.fire_event(Event::define_prefix("q", "urn:two")).unwrap();
    fork.fire_event(Event::define_prefix("p", "urn:three")).unwrap();

    let ns = |w: &GrammarWalker, qname: &str| {
        w.resolve_name(qname, false)
            .unwrap()
            .map(|name| name.ns)
    };
    assert_eq!(ns(&original, "p:e").as_deref(), Some("urn:one"));
    assert_eq!(ns(&original, "q:e").as_deref(), Some("urn:two"));
    assert_eq!(ns(&fork, "p:e").as_deref(), Some("urn:three"));
    assert_eq!(ns(&fork, "q:e"), None);

    fork.fire_event(Event::leave_context()).unwrap();
    assert_eq!(ns(&fork, "p:e"), None);
    assert_eq!(ns(&original, "p:e").as_deref(), Some("urn:one"));
}

#[test]
fn recursive_grammar_accepts_nested_document() {
    let g = grammar();
    let doc = Node {
        name: "a",
        attributes: vec![("x", "7")],
        children: vec![
            Child::Element(Node {
                name: "b",
                attributes: vec![],
                children: vec![Child::Text("hi")],
            }),
            Child::Text("\n"),
            Child::Element(Node {
                name: "c",
                attributes: vec![],
                children: vec![],
            }),
            Child::Element(Node {
                name: "d",
                attributes: vec![("y", "")],
                children: vec![
                    Child::Text("t"),
                    Child::Element(Node {
                        name: "d",
                        attributes: vec![("y", "1")],
                        children: vec![],
                    }),
                ],
            }),
        ],
    };
    let mut w = g.new_walker();
    let errors: Vec<String> = run(&mut w, &document(&doc)).concat();
    assert!(errors.is_empty(), "{errors:?}");
    assert!(end(&mut w).is_empty());
}
