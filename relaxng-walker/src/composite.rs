//! Walkers for the combining patterns.

use crate::element::advertised_pattern;
use crate::error::ValidationError;
use crate::event::{Event, EventKind, EventSet};
use crate::walker::{Env, FireResult, Walker, errors_of, result_of};
use relaxng_model::{NamePattern, PatternId};
use std::borrow::Cow;

#[derive(Clone, Debug)]
enum Branch {
    Fresh,
    Live(Box<Walker>),
    Discarded,
}

/// Both alternatives are followed until an event tells them apart. While
/// both accept, both stay live and the first one's result is reported.
#[derive(Clone, Debug)]
pub struct ChoiceWalker {
    ids: [PatternId; 2],
    branches: [Branch; 2],
    suppressed: bool,
}

impl ChoiceWalker {
    pub(crate) fn new(a: PatternId, b: PatternId) -> ChoiceWalker {
        ChoiceWalker {
            ids: [a, b],
            branches: [Branch::Fresh, Branch::Fresh],
            suppressed: false,
        }
    }

    fn live(&mut self, env: &Env, i: usize) -> Option<&mut Walker> {
        if let Branch::Fresh = self.branches[i] {
            self.branches[i] = Branch::Live(Box::new(env.fresh(self.ids[i], self.suppressed)));
        }
        match &mut self.branches[i] {
            Branch::Live(walker) => Some(walker.as_mut()),
            Branch::Fresh | Branch::Discarded => None,
        }
    }

    /// Live branches, with fresh walkers standing in for those not yet
    /// started.
    fn peek_live(&self, env: &Env) -> Vec<(usize, Cow<'_, Walker>)> {
        (0..2)
            .filter_map(|i| match &self.branches[i] {
                Branch::Fresh => Some((i, Cow::Owned(env.fresh(self.ids[i], self.suppressed)))),
                Branch::Live(walker) => Some((i, Cow::Borrowed(walker.as_ref()))),
                Branch::Discarded => None,
            })
            .collect()
    }

    pub(crate) fn possible(&self, env: &Env) -> EventSet {
        let mut set = EventSet::new();
        for (_, walker) in self.peek_live(env) {
            set.union(walker.possible(env));
        }
        set
    }

    pub(crate) fn fire_event(&mut self, env: &Env, ev: Event) -> FireResult {
        let ra = self.live(env, 0).map(|w| w.fire_event(env, ev));
        let rb = self.live(env, 1).map(|w| w.fire_event(env, ev));
        match (ra, rb) {
            (Some(FireResult::Rejected), Some(FireResult::Rejected)) => FireResult::Rejected,
            (Some(FireResult::Rejected), Some(rb)) => {
                self.branches[0] = Branch::Discarded;
                rb
            }
            (Some(ra), Some(FireResult::Rejected)) => {
                self.branches[1] = Branch::Discarded;
                ra
            }
            (Some(ra), Some(_)) => ra,
            (Some(r), None) | (None, Some(r)) => r,
            (None, None) => FireResult::Rejected,
        }
    }

    pub(crate) fn can_end(&self, env: &Env, attribute: bool) -> bool {
        self.peek_live(env)
            .iter()
            .any(|(_, walker)| walker.can_end(env, attribute))
    }

    /// Ending the content settles an ambiguity: when only one live branch
    /// can end, the other is dropped. The start tag ending leaves both, since
    /// the content may still tell them apart.
    pub(crate) fn end(&mut self, env: &Env, attribute: bool) -> Result<(), Vec<ValidationError>> {
        let endable: Vec<usize> = self
            .peek_live(env)
            .iter()
            .filter(|(_, walker)| walker.can_end(env, attribute))
            .map(|(i, _)| *i)
            .collect();
        if let ([keep], false) = (&endable[..], attribute) {
            self.branches[1 - *keep] = Branch::Discarded;
        }
        if !endable.is_empty() {
            return Ok(());
        }

        let mut failing = vec![];
        for i in 0..2 {
            if let Some(walker) = self.live(env, i) {
                let errors = errors_of(walker.end(env, attribute));
                if !errors.is_empty() {
                    failing.push(errors);
                }
            }
        }
        if failing.len() == 2 {
            let names = |i: usize| match &self.branches[i] {
                Branch::Live(walker) => choice_names(&walker.possible(env)),
                Branch::Fresh | Branch::Discarded => None,
            };
            if let (Some(names_a), Some(names_b)) = (names(0), names(1)) {
                return Err(vec![ValidationError::Choice { names_a, names_b }]);
            }
        }
        match failing.into_iter().next() {
            Some(errors) => Err(errors),
            None => Ok(()),
        }
    }

    pub(crate) fn suppress_attributes(&mut self) {
        self.suppressed = true;
        for branch in &mut self.branches {
            if let Branch::Live(walker) = branch {
                walker.suppress_attributes();
            }
        }
    }

}

/// The names a branch is waiting for, if it is waiting for nothing but
/// start tags or attribute names.
fn choice_names(possible: &EventSet) -> Option<Vec<NamePattern>> {
    if possible.is_empty() {
        return None;
    }
    possible
        .iter()
        .map(|ev| match ev.kind() {
            EventKind::EnterStartTag { ns, name } | EventKind::AttributeName { ns, name } => {
                Some(advertised_pattern(ns, name))
            }
            _ => None,
        })
        .collect()
}

/// A sequence. Attributes of the second half may arrive before the first
/// half is complete.
#[derive(Clone, Debug)]
pub struct GroupWalker {
    pattern: PatternId,
    ids: [PatternId; 2],
    a: Option<Box<Walker>>,
    b: Option<Box<Walker>>,
    ended_a: bool,
    suppressed: bool,
}

impl GroupWalker {
    pub(crate) fn new(pattern: PatternId, a: PatternId, b: PatternId) -> GroupWalker {
        GroupWalker {
            pattern,
            ids: [a, b],
            a: None,
            b: None,
            ended_a: false,
            suppressed: false,
        }
    }

    pub(crate) fn possible(&self, env: &Env) -> EventSet {
        let b = env.peek(&self.b, self.ids[1], self.suppressed).possible(env);
        if self.ended_a {
            return b;
        }
        let a = env.peek(&self.a, self.ids[0], self.suppressed);
        let mut set = a.possible(env);
        if a.can_end(env, false) {
            set.union(b);
        } else {
            set.union(b.filter(Event::is_attribute_event));
        }
        set
    }

    pub(crate) fn fire_event(&mut self, env: &Env, ev: Event) -> FireResult {
        let attribute = ev.is_attribute_event();
        if attribute && !self.suppressed && !env.grammar.has_attributes(self.pattern) {
            return FireResult::Rejected;
        }
        if !self.ended_a {
            let a = env.instantiate(&mut self.a, self.ids[0], self.suppressed);
            let ra = a.fire_event(env, ev);
            if !ra.is_rejected() {
                return ra;
            }
            if !attribute && !a.can_end(env, false) {
                return FireResult::Rejected;
            }
        }
        let b = env.instantiate(&mut self.b, self.ids[1], self.suppressed);
        let rb = b.fire_event(env, ev);
        if rb.is_rejected() || attribute || self.ended_a {
            return rb;
        }
        self.ended_a = true;
        let a = env.instantiate(&mut self.a, self.ids[0], self.suppressed);
        let mut errors = errors_of(a.end(env, false));
        errors.extend(rb.into_errors());
        FireResult::from_errors(errors)
    }

    pub(crate) fn can_end(&self, env: &Env, attribute: bool) -> bool {
        (self.ended_a || env.peek(&self.a, self.ids[0], self.suppressed).can_end(env, attribute))
            && env.peek(&self.b, self.ids[1], self.suppressed).can_end(env, attribute)
    }

    pub(crate) fn end(&mut self, env: &Env, attribute: bool) -> Result<(), Vec<ValidationError>> {
        let mut errors = vec![];
        if !self.ended_a {
            let a = env.instantiate(&mut self.a, self.ids[0], self.suppressed);
            errors.extend(errors_of(a.end(env, attribute)));
        }
        let b = env.instantiate(&mut self.b, self.ids[1], self.suppressed);
        errors.extend(errors_of(b.end(env, attribute)));
        result_of(errors)
    }

    pub(crate) fn suppress_attributes(&mut self) {
        self.suppressed = true;
        for walker in [&mut self.a, &mut self.b].into_iter().flatten() {
            walker.suppress_attributes();
        }
    }
}

/// Both halves in any order. Once a half accepts an event it is in
/// progress, and receives every event, until it can end.
#[derive(Clone, Debug)]
pub struct InterleaveWalker {
    pattern: PatternId,
    ids: [PatternId; 2],
    walkers: [Option<Box<Walker>>; 2],
    in_progress: Option<usize>,
    suppressed: bool,
}

impl InterleaveWalker {
    pub(crate) fn new(pattern: PatternId, a: PatternId, b: PatternId) -> InterleaveWalker {
        InterleaveWalker {
            pattern,
            ids: [a, b],
            walkers: [None, None],
            in_progress: None,
            suppressed: false,
        }
    }

    fn peek(&self, env: &Env, i: usize) -> Cow<'_, Walker> {
        env.peek(&self.walkers[i], self.ids[i], self.suppressed)
    }

    pub(crate) fn possible(&self, env: &Env) -> EventSet {
        match self.in_progress {
            Some(i) => self.peek(env, i).possible(env),
            None => {
                let mut set = self.peek(env, 0).possible(env);
                set.union(self.peek(env, 1).possible(env));
                set
            }
        }
    }

    fn fire_on(&mut self, env: &Env, i: usize, ev: Event) -> FireResult {
        let walker = env.instantiate(&mut self.walkers[i], self.ids[i], self.suppressed);
        let result = walker.fire_event(env, ev);
        if result.is_rejected() {
            return result;
        }
        // Before the start tag closes only the attributes have to be complete.
        let finished = walker.can_end(env, !self.suppressed);
        self.in_progress = if finished { None } else { Some(i) };
        result
    }

    pub(crate) fn fire_event(&mut self, env: &Env, ev: Event) -> FireResult {
        if ev.is_attribute_event() && !self.suppressed && !env.grammar.has_attributes(self.pattern) {
            return FireResult::Rejected;
        }
        if let Some(i) = self.in_progress {
            return self.fire_on(env, i, ev);
        }
        match self.fire_on(env, 0, ev) {
            FireResult::Rejected => self.fire_on(env, 1, ev),
            result => result,
        }
    }

    pub(crate) fn can_end(&self, env: &Env, attribute: bool) -> bool {
        self.peek(env, 0).can_end(env, attribute) && self.peek(env, 1).can_end(env, attribute)
    }

    pub(crate) fn end(&mut self, env: &Env, attribute: bool) -> Result<(), Vec<ValidationError>> {
        let mut errors = vec![];
        for i in 0..2 {
            let walker = env.instantiate(&mut self.walkers[i], self.ids[i], self.suppressed);
            errors.extend(errors_of(walker.end(env, attribute)));
        }
        result_of(errors)
    }

    pub(crate) fn suppress_attributes(&mut self) {
        self.suppressed = true;
        for walker in self.walkers.iter_mut().flatten() {
            walker.suppress_attributes();
        }
    }
}

/// Repetition. Once the current iteration can end, an event it rejects is
/// offered to a new iteration, which then becomes current.
#[derive(Clone, Debug)]
pub struct OneOrMoreWalker {
    pattern: PatternId,
    sub: PatternId,
    current: Option<Box<Walker>>,
    next: Option<Box<Walker>>,
    suppressed: bool,
}

impl OneOrMoreWalker {
    pub(crate) fn new(pattern: PatternId, sub: PatternId) -> OneOrMoreWalker {
        OneOrMoreWalker {
            pattern,
            sub,
            current: None,
            next: None,
            suppressed: false,
        }
    }

    pub(crate) fn possible(&self, env: &Env) -> EventSet {
        let current = env.peek(&self.current, self.sub, self.suppressed);
        let mut set = current.possible(env);
        if current.can_end(env, false) {
            set.union(env.peek(&self.next, self.sub, self.suppressed).possible(env));
        }
        set
    }

    pub(crate) fn fire_event(&mut self, env: &Env, ev: Event) -> FireResult {
        let attribute = ev.is_attribute_event();
        if attribute && !self.suppressed && !env.grammar.has_attributes(self.pattern) {
            return FireResult::Rejected;
        }
        let current = env.instantiate(&mut self.current, self.sub, self.suppressed);
        let result = current.fire_event(env, ev);
        if !result.is_rejected() {
            return result;
        }
        if !current.can_end(env, attribute) {
            return FireResult::Rejected;
        }
        let next = env.instantiate(&mut self.next, self.sub, self.suppressed);
        let result = next.fire_event(env, ev);
        if result.is_rejected() {
            return result;
        }
        let mut errors = match std::mem::replace(&mut self.current, self.next.take()) {
            Some(mut finished) => errors_of(finished.end(env, attribute)),
            None => vec![],
        };
        errors.extend(result.into_errors());
        FireResult::from_errors(errors)
    }

    pub(crate) fn can_end(&self, env: &Env, attribute: bool) -> bool {
        if attribute && !env.grammar.has_attributes(self.pattern) {
            return true;
        }
        env.peek(&self.current, self.sub, self.suppressed)
            .can_end(env, attribute)
    }

    pub(crate) fn end(&mut self, env: &Env, attribute: bool) -> Result<(), Vec<ValidationError>> {
        env.instantiate(&mut self.current, self.sub, self.suppressed)
            .end(env, attribute)
    }

    pub(crate) fn suppress_attributes(&mut self) {
        self.suppressed = true;
        for walker in [&mut self.current, &mut self.next].into_iter().flatten() {
            walker.suppress_attributes();
        }
    }
}
