mod composite;
pub mod document;
mod element;
pub mod error;
pub mod event;
pub mod grammar_walker;
pub mod name_resolver;
pub mod walker;

pub use composite::{ChoiceWalker, GroupWalker, InterleaveWalker, OneOrMoreWalker};
pub use document::{DocumentError, DocumentValidator, diagnostic};
pub use element::{AttributeWalker, ElementWalker};
pub use error::ValidationError;
pub use event::{Event, EventKind, EventSet};
pub use grammar_walker::{GrammarWalker, NewWalker};
pub use name_resolver::{EName, NameResolver, ResolverError};
pub use walker::{Env, FireResult, Walker};
