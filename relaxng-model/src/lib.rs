pub mod datatype;
pub mod grammar;
pub mod name_pattern;
pub mod pattern;

pub use grammar::{Grammar, GrammarBuilder};
pub use name_pattern::NamePattern;
pub use pattern::{Pattern, PatternId};

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum GrammarError {
    /// Every reference name without a matching definition, sorted.
    UnresolvedReferences(Vec<String>),
    UnknownLibrary(String),
    UnknownDatatype { library: String, name: String },
    Params(datatype::ParameterParsingError),
    Value {
        path: String,
        error: datatype::ValueValidationError,
    },
    DuplicateDefine(String),
    CircularReference(String),
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::UnresolvedReferences(names) => write!(
                f,
                "cannot resolve the following references: {}",
                names.join(", ")
            ),
            GrammarError::UnknownLibrary(uri) => {
                write!(f, "unknown datatype library: {uri:?}")
            }
            GrammarError::UnknownDatatype { library, name } => {
                write!(f, "unknown datatype {name} in library {library:?}")
            }
            GrammarError::Params(e) => write!(f, "{e}"),
            GrammarError::Value { path, error } => write!(f, "{path}: {error}"),
            GrammarError::DuplicateDefine(name) => {
                write!(f, "definition {name} appears more than once")
            }
            GrammarError::CircularReference(name) => {
                write!(f, "definition {name} refers only to itself")
            }
        }
    }
}

impl std::error::Error for GrammarError {}

/// All problems found while building one grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarErrors(pub Vec<GrammarError>);

impl fmt::Display for GrammarErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for GrammarErrors {}
