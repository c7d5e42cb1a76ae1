//! The immutable pattern tree, stored as an arena inside a `Grammar`.

use crate::datatype::{Datatype, ParsedParams, ParsedValue};
use crate::name_pattern::NamePattern;
use std::rc::Rc;

/// Index of a pattern in its grammar's arena.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, PartialOrd, Ord)]
pub struct PatternId(pub(crate) u32);

impl PatternId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub enum Pattern {
    Empty,
    NotAllowed,
    Text,
    Data {
        datatype: Rc<dyn Datatype>,
        params: ParsedParams,
        except: Option<PatternId>,
    },
    Value {
        datatype: Rc<dyn Datatype>,
        ns: String,
        raw: String,
        value: ParsedValue,
    },
    List(PatternId),
    Attribute {
        name: NamePattern,
        pat: PatternId,
    },
    Element {
        name: NamePattern,
        pat: PatternId,
    },
    /// Bound to its `Define` when the grammar is built.
    Ref {
        name: String,
        target: PatternId,
    },
    Define {
        name: String,
        pat: PatternId,
    },
    Choice(PatternId, PatternId),
    Group(PatternId, PatternId),
    Interleave(PatternId, PatternId),
    OneOrMore(PatternId),
}

impl Pattern {
    pub fn kind(&self) -> &'static str {
        match self {
            Pattern::Empty => "empty",
            Pattern::NotAllowed => "notAllowed",
            Pattern::Text => "text",
            Pattern::Data { .. } => "data",
            Pattern::Value { .. } => "value",
            Pattern::List(_) => "list",
            Pattern::Attribute { .. } => "attribute",
            Pattern::Element { .. } => "element",
            Pattern::Ref { .. } => "ref",
            Pattern::Define { .. } => "define",
            Pattern::Choice(..) => "choice",
            Pattern::Group(..) => "group",
            Pattern::Interleave(..) => "interleave",
            Pattern::OneOrMore(_) => "oneOrMore",
        }
    }

    /// Direct sub-patterns, not following a `Ref` to its target.
    pub(crate) fn children(&self) -> Vec<PatternId> {
        match self {
            Pattern::Empty
            | Pattern::NotAllowed
            | Pattern::Text
            | Pattern::Value { .. }
            | Pattern::Ref { .. } => vec![],
            Pattern::Data { except, .. } => except.iter().copied().collect(),
            Pattern::List(p) | Pattern::OneOrMore(p) => vec![*p],
            Pattern::Attribute { pat, .. }
            | Pattern::Element { pat, .. }
            | Pattern::Define { pat, .. } => vec![*pat],
            Pattern::Choice(a, b) | Pattern::Group(a, b) | Pattern::Interleave(a, b) => {
                vec![*a, *b]
            }
        }
    }
}

/// A pattern together with the path used to identify it in messages.
#[derive(Clone, Debug)]
pub struct Node {
    pub pattern: Pattern,
    pub path: String,
}
