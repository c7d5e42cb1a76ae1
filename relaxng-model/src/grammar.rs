//! Grammar construction: reference resolution and the per-pattern views the
//! walkers consult while validating.

use crate::datatype::{Datatype, Namespaces, Param, Registry, StaticNamespaces};
use crate::name_pattern::NamePattern;
use crate::pattern::{Node, Pattern, PatternId};
use crate::{GrammarError, GrammarErrors};
use fnv::{FnvHashMap, FnvHashSet};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::rc::Rc;

enum Slot {
    Ready(Pattern),
    Ref(String),
}

/// Builds the pattern arena for a `Grammar`.
///
/// Every method returns the id of the pattern it adds. Problems with datatypes
/// are recorded and reported by `build`, together with any references that
/// could not be resolved.
pub struct GrammarBuilder {
    registry: Registry,
    slots: Vec<Slot>,
    paths: Vec<String>,
    definitions: BTreeMap<String, PatternId>,
    errors: Vec<GrammarError>,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        GrammarBuilder::with_registry(Registry::default())
    }
}

impl GrammarBuilder {
    pub fn new() -> GrammarBuilder {
        GrammarBuilder::default()
    }

    pub fn with_registry(registry: Registry) -> GrammarBuilder {
        GrammarBuilder {
            registry,
            slots: vec![],
            paths: vec![],
            definitions: BTreeMap::new(),
            errors: vec![],
        }
    }

    fn push(&mut self, slot: Slot, kind: &str) -> PatternId {
        let id = PatternId(self.slots.len() as u32);
        self.slots.push(slot);
        self.paths.push(format!("{}#{}", kind, id.0));
        id
    }

    fn add(&mut self, pattern: Pattern) -> PatternId {
        let kind = pattern.kind();
        self.push(Slot::Ready(pattern), kind)
    }

    /// Replaces the generated path of `id`, used in error messages.
    pub fn set_path(&mut self, id: PatternId, path: impl Into<String>) {
        self.paths[id.index()] = path.into();
    }

    pub fn empty(&mut self) -> PatternId {
        self.add(Pattern::Empty)
    }

    pub fn not_allowed(&mut self) -> PatternId {
        self.add(Pattern::NotAllowed)
    }

    pub fn text(&mut self) -> PatternId {
        self.add(Pattern::Text)
    }

    fn lookup(&mut self, library: &str, name: &str) -> Option<Rc<dyn Datatype>> {
        match self.registry.find(library) {
            None => {
                self.errors
                    .push(GrammarError::UnknownLibrary(library.to_string()));
                None
            }
            Some(lib) => {
                let dt = lib.get(name);
                if dt.is_none() {
                    self.errors.push(GrammarError::UnknownDatatype {
                        library: library.to_string(),
                        name: name.to_string(),
                    });
                }
                dt
            }
        }
    }

    fn next_path(&self, kind: &str) -> String {
        format!("{}#{}", kind, self.slots.len())
    }

    pub fn data(
        &mut self,
        library: &str,
        name: &str,
        params: &[Param],
        except: Option<PatternId>,
    ) -> PatternId {
        let location = self.next_path("data");
        let parsed = self
            .lookup(library, name)
            .map(|dt| (dt.parse_params(&location, params), dt));
        match parsed {
            Some((Ok(params), datatype)) => self.add(Pattern::Data {
                datatype,
                params,
                except,
            }),
            Some((Err(e), _)) => {
                self.errors.push(GrammarError::Params(e));
                self.not_allowed()
            }
            None => self.not_allowed(),
        }
    }

    /// A `value` pattern whose literal is interpreted with `ns` as the only
    /// namespace binding.
    pub fn value(&mut self, library: &str, name: &str, raw: &str, ns: &str) -> PatternId {
        self.value_in_context(library, name, raw, &StaticNamespaces::new(ns))
    }

    pub fn value_in_context(
        &mut self,
        library: &str,
        name: &str,
        raw: &str,
        namespaces: &StaticNamespaces,
    ) -> PatternId {
        let path = self.next_path("value");
        let Some(datatype) = self.lookup(library, name) else {
            return self.not_allowed();
        };
        let context: Option<&dyn Namespaces> = if datatype.needs_context() {
            Some(namespaces)
        } else {
            None
        };
        match datatype.parse_value(&path, raw, context) {
            Ok(value) => {
                let ns = namespaces.resolve("").unwrap_or("").to_string();
                self.add(Pattern::Value {
                    datatype,
                    ns,
                    raw: raw.to_string(),
                    value,
                })
            }
            Err(error) => {
                self.errors.push(GrammarError::Value { path, error });
                self.not_allowed()
            }
        }
    }

    pub fn list(&mut self, pat: PatternId) -> PatternId {
        self.add(Pattern::List(pat))
    }

    pub fn attribute(&mut self, name: NamePattern, pat: PatternId) -> PatternId {
        self.add(Pattern::Attribute { name, pat })
    }

    pub fn element(&mut self, name: NamePattern, pat: PatternId) -> PatternId {
        self.add(Pattern::Element { name, pat })
    }

    /// A reference to a definition that may not have been added yet.
    pub fn reference(&mut self, name: &str) -> PatternId {
        self.push(Slot::Ref(name.to_string()), "ref")
    }

    pub fn define(&mut self, name: &str, pat: PatternId) -> PatternId {
        let id = self.add(Pattern::Define {
            name: name.to_string(),
            pat,
        });
        if self.definitions.insert(name.to_string(), id).is_some() {
            self.errors
                .push(GrammarError::DuplicateDefine(name.to_string()));
        }
        id
    }

    pub fn choice(&mut self, a: PatternId, b: PatternId) -> PatternId {
        self.add(Pattern::Choice(a, b))
    }

    pub fn group(&mut self, a: PatternId, b: PatternId) -> PatternId {
        self.add(Pattern::Group(a, b))
    }

    pub fn interleave(&mut self, a: PatternId, b: PatternId) -> PatternId {
        self.add(Pattern::Interleave(a, b))
    }

    pub fn one_or_more(&mut self, pat: PatternId) -> PatternId {
        self.add(Pattern::OneOrMore(pat))
    }

    pub fn optional(&mut self, pat: PatternId) -> PatternId {
        let empty = self.empty();
        self.choice(pat, empty)
    }

    pub fn zero_or_more(&mut self, pat: PatternId) -> PatternId {
        let more = self.one_or_more(pat);
        self.optional(more)
    }

    pub fn mixed(&mut self, pat: PatternId) -> PatternId {
        let text = self.text();
        self.interleave(pat, text)
    }

    /// Resolves references and prepares the grammar rooted at `start`.
    pub fn build(self, start: PatternId) -> Result<Grammar, GrammarErrors> {
        let GrammarBuilder {
            slots,
            paths,
            definitions,
            mut errors,
            ..
        } = self;
        let mut missing = BTreeSet::new();
        let mut nodes = Vec::with_capacity(slots.len());
        for (slot, path) in slots.into_iter().zip(paths) {
            let pattern = match slot {
                Slot::Ready(pattern) => pattern,
                Slot::Ref(name) => match definitions.get(&name) {
                    Some(target) => Pattern::Ref {
                        name,
                        target: *target,
                    },
                    None => {
                        missing.insert(name);
                        Pattern::NotAllowed
                    }
                },
            };
            nodes.push(Node { pattern, path });
        }
        if !missing.is_empty() {
            errors.push(GrammarError::UnresolvedReferences(
                missing.into_iter().collect(),
            ));
        }
        for (name, define) in &definitions {
            if is_circular(&nodes, *define) {
                errors.push(GrammarError::CircularReference(name.clone()));
            }
        }
        if !errors.is_empty() {
            return Err(GrammarErrors(errors));
        }
        Ok(Grammar::prepare(nodes, start, definitions))
    }
}

/// A definition that can reach itself through references without passing
/// through an element.
fn is_circular(nodes: &[Node], define: PatternId) -> bool {
    let mut seen = FnvHashSet::default();
    let mut work = vec![define];
    while let Some(id) = work.pop() {
        if !seen.insert(id) {
            continue;
        }
        match &nodes[id.index()].pattern {
            Pattern::Element { .. } => {}
            Pattern::Ref { target, .. } if *target == define => return true,
            Pattern::Ref { target, .. } => work.push(*target),
            p => work.extend(p.children()),
        }
    }
    false
}

/// A resolved grammar, ready to be walked.
#[derive(Debug)]
pub struct Grammar {
    nodes: Vec<Node>,
    start: PatternId,
    definitions: BTreeMap<String, PatternId>,
    has_attrs: Vec<bool>,
    namespaces: BTreeSet<String>,
    elements: FnvHashMap<(String, String), Vec<PatternId>>,
}

impl Grammar {
    fn prepare(
        nodes: Vec<Node>,
        start: PatternId,
        definitions: BTreeMap<String, PatternId>,
    ) -> Grammar {
        let has_attrs = attribute_views(&nodes);
        let mut namespaces = BTreeSet::new();
        let mut elements: FnvHashMap<(String, String), Vec<PatternId>> = FnvHashMap::default();

        let mut seen = FnvHashSet::default();
        let mut work: Vec<PatternId> = definitions.values().copied().collect();
        work.push(start);
        work.sort();
        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            let pattern = &nodes[id.index()].pattern;
            match pattern {
                Pattern::Element { name, pat } => {
                    name.record_namespaces(&mut namespaces);
                    if matches!(nodes[pat.index()].pattern, Pattern::NotAllowed) {
                        debug!("element {} can never match", name);
                    } else if name.is_wildcard() {
                        debug!("element {} has a wildcard name and is not indexed", name);
                    } else {
                        for (ns, local) in name.to_names().into_iter().flatten() {
                            elements
                                .entry((ns.to_string(), local.to_string()))
                                .or_default()
                                .push(id);
                        }
                    }
                }
                Pattern::Attribute { name, .. } => {
                    let mut attr_namespaces = BTreeSet::new();
                    name.record_namespaces(&mut attr_namespaces);
                    attr_namespaces.remove("");
                    namespaces.extend(attr_namespaces);
                }
                _ => {}
            }
            work.extend(pattern.children());
        }
        for ids in elements.values_mut() {
            ids.sort();
            ids.dedup();
        }

        Grammar {
            nodes,
            start,
            definitions,
            has_attrs,
            namespaces,
            elements,
        }
    }

    pub fn start(&self) -> PatternId {
        self.start
    }

    pub fn pattern(&self, id: PatternId) -> &Pattern {
        &self.nodes[id.index()].pattern
    }

    pub fn path(&self, id: PatternId) -> &str {
        &self.nodes[id.index()].path
    }

    pub fn definition(&self, name: &str) -> Option<PatternId> {
        self.definitions.get(name).copied()
    }

    /// Whether attribute patterns can be reached from `id` without entering
    /// an element.
    pub fn has_attributes(&self, id: PatternId) -> bool {
        self.has_attrs[id.index()]
    }

    /// Namespaces mentioned by element and attribute names, including the
    /// `"*"` and `"::except"` markers for wildcards.
    pub fn namespaces(&self) -> &BTreeSet<String> {
        &self.namespaces
    }

    /// Every `element` pattern that can match the expanded name.
    pub fn element_definitions(&self, ns: &str, name: &str) -> &[PatternId] {
        self.elements
            .get(&(ns.to_string(), name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True when no expanded element name is defined more than once, so an
    /// element's content model never depends on where it appears.
    pub fn wholly_context_independent(&self) -> bool {
        self.elements.values().all(|ids| ids.len() <= 1)
    }

    pub fn dump<W: io::Write>(&self, w: &mut W) -> Result<(), io::Error> {
        let mut seen = HashSet::new();
        self.dump_pattern(0, self.start, w, &mut seen)
    }

    fn dump_pattern<W: io::Write>(
        &self,
        depth: usize,
        id: PatternId,
        w: &mut W,
        seen: &mut HashSet<PatternId>,
    ) -> Result<(), io::Error> {
        indent(depth, w)?;
        let pattern = self.pattern(id);
        if !seen.insert(id) {
            return writeln!(w, "{}{}!", label(pattern), id.0);
        }
        let children = match pattern {
            Pattern::Ref { target, .. } => vec![*target],
            p => p.children(),
        };
        match pattern {
            Pattern::Attribute { name, .. } | Pattern::Element { name, .. } => {
                writeln!(w, "{}{}({}=", label(pattern), id.0, name)?
            }
            Pattern::Ref { name, .. } | Pattern::Define { name, .. } => {
                writeln!(w, "{}{}({}", label(pattern), id.0, name)?
            }
            Pattern::Data { datatype, .. } => {
                writeln!(w, "Data{}({}", id.0, datatype.name())?
            }
            Pattern::Value { datatype, raw, .. } => {
                return writeln!(w, "Value{}({} {:?})", id.0, datatype.name(), raw);
            }
            _ if children.is_empty() => return writeln!(w, "{}{}", label(pattern), id.0),
            _ => writeln!(w, "{}{}(", label(pattern), id.0)?,
        }
        for child in children {
            self.dump_pattern(depth + 1, child, w, seen)?;
        }
        indent(depth, w)?;
        writeln!(w, ")")
    }
}

fn label(pattern: &Pattern) -> &'static str {
    match pattern {
        Pattern::Empty => "Empty",
        Pattern::NotAllowed => "NotAllowed",
        Pattern::Text => "Text",
        Pattern::Data { .. } => "Data",
        Pattern::Value { .. } => "Value",
        Pattern::List(_) => "List",
        Pattern::Attribute { .. } => "Att",
        Pattern::Element { .. } => "Elem",
        Pattern::Ref { .. } => "Ref",
        Pattern::Define { .. } => "Define",
        Pattern::Choice(..) => "Choice",
        Pattern::Group(..) => "Group",
        Pattern::Interleave(..) => "Interleave",
        Pattern::OneOrMore(_) => "OneOrMany",
    }
}

fn indent<W: io::Write>(depth: usize, w: &mut W) -> Result<(), io::Error> {
    for _ in 0..depth {
        w.write_all(b"  ")?;
    }
    Ok(())
}

/// Solves "can this pattern carry attributes" for every node at once. Each
/// step only looks at a node's direct children, and a `Ref` reads the value
/// already computed for its target, so recursive definitions converge.
fn attribute_views(nodes: &[Node]) -> Vec<bool> {
    let mut has = vec![false; nodes.len()];
    loop {
        let mut changed = false;
        for (i, node) in nodes.iter().enumerate() {
            if has[i] {
                continue;
            }
            let value = match &node.pattern {
                Pattern::Attribute { .. } => true,
                Pattern::Element { .. }
                | Pattern::Empty
                | Pattern::NotAllowed
                | Pattern::Text
                | Pattern::Data { .. }
                | Pattern::Value { .. }
                | Pattern::List(_) => false,
                Pattern::Ref { target: p, .. }
                | Pattern::Define { pat: p, .. }
                | Pattern::OneOrMore(p) => has[p.index()],
                Pattern::Choice(a, b) | Pattern::Group(a, b) | Pattern::Interleave(a, b) => {
                    has[a.index()] || has[b.index()]
                }
            };
            if value {
                has[i] = true;
                changed = true;
            }
        }
        if !changed {
            return has;
        }
    }
}
