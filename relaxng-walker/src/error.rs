use relaxng_model::NamePattern;
use std::fmt;

/// A problem found in the document. Validation carries on after any of these.
#[derive(Debug, Clone)]
pub enum ValidationError {
    Message(String),
    AttributeName { msg: String, name: NamePattern },
    AttributeValue { msg: String, name: NamePattern },
    ElementName { msg: String, name: NamePattern },
    /// Neither alternative of a choice was satisfied.
    Choice {
        names_a: Vec<NamePattern>,
        names_b: Vec<NamePattern>,
    },
}

impl ValidationError {
    pub fn message(msg: impl Into<String>) -> ValidationError {
        ValidationError::Message(msg.into())
    }

    pub fn element_name(msg: impl Into<String>, name: NamePattern) -> ValidationError {
        ValidationError::ElementName {
            msg: msg.into(),
            name,
        }
    }

    pub fn attribute_name(msg: impl Into<String>, name: NamePattern) -> ValidationError {
        ValidationError::AttributeName {
            msg: msg.into(),
            name,
        }
    }

    pub fn attribute_value(msg: impl Into<String>, name: NamePattern) -> ValidationError {
        ValidationError::AttributeValue {
            msg: msg.into(),
            name,
        }
    }

    /// The names referenced by the message, in the order
    /// `to_string_with_names` expects replacements for them.
    pub fn names(&self) -> Vec<&NamePattern> {
        match self {
            ValidationError::Message(_) => vec![],
            ValidationError::AttributeName { name, .. }
            | ValidationError::AttributeValue { name, .. }
            | ValidationError::ElementName { name, .. } => vec![name],
            ValidationError::Choice { names_a, names_b } => {
                names_a.iter().chain(names_b.iter()).collect()
            }
        }
    }

    /// Renders the message with caller-supplied text for each of `names()`,
    /// for example prefixed names in place of `{uri}local`.
    pub fn to_string_with_names(&self, names: &[String]) -> String {
        let name = |i: usize| names.get(i).map(String::as_str).unwrap_or("");
        match self {
            ValidationError::Message(msg) => msg.clone(),
            ValidationError::AttributeName { msg, .. }
            | ValidationError::AttributeValue { msg, .. }
            | ValidationError::ElementName { msg, .. } => format!("{}: {}", msg, name(0)),
            ValidationError::Choice { names_a, names_b } => {
                let a: Vec<_> = (0..names_a.len()).map(name).collect();
                let b: Vec<_> = (names_a.len()..names_a.len() + names_b.len())
                    .map(name)
                    .collect();
                format!("must choose either {} or {}", a.join(", "), b.join(", "))
            }
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.names().iter().map(|n| n.to_string()).collect();
        f.write_str(&self.to_string_with_names(&names))
    }
}

impl PartialEq for ValidationError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for ValidationError {}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_name() {
        let e = ValidationError::element_name("tag not allowed here", NamePattern::name("urn:a", "b"));
        assert_eq!(e.to_string(), "tag not allowed here: {urn:a}b");
        assert_eq!(e.to_string_with_names(&["a:b".to_string()]), "tag not allowed here: a:b");
    }

    #[test]
    fn choice() {
        let e = ValidationError::Choice {
            names_a: vec![NamePattern::name("", "a"), NamePattern::name("", "b")],
            names_b: vec![NamePattern::name("", "c")],
        };
        assert_eq!(e.to_string(), "must choose either a, b or c");
        assert_eq!(e.names().len(), 3);
        let renamed: Vec<String> = ["x:a", "x:b", "y:c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(e.to_string_with_names(&renamed), "must choose either x:a, x:b or y:c");
    }

    #[test]
    fn equality_is_by_message() {
        assert_eq!(
            ValidationError::message("text not allowed here: a"),
            ValidationError::element_name("text not allowed here", NamePattern::name("", "a"))
        );
        assert_ne!(
            ValidationError::message("tag required"),
            ValidationError::message("tag not closed")
        );
    }
}
