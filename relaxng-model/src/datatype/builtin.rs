//! The Relax NG built-in datatype library: `string` and `token`.

use super::{
    Datatype, Library, Namespaces, ParamError, ParameterParsingError, ParsedParams, ParsedValue,
    ValueError, ValueValidationError, collapse_whitespace,
};
use std::rc::Rc;

pub const NAMESPACE_URI: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinDatatype {
    String,
    Token,
}

pub fn library() -> Library {
    Library::new(NAMESPACE_URI)
        .with(Rc::new(BuiltinDatatype::String))
        .with(Rc::new(BuiltinDatatype::Token))
}

impl BuiltinDatatype {
    fn normalize(&self, value: &str) -> String {
        match self {
            BuiltinDatatype::String => value.to_string(),
            BuiltinDatatype::Token => collapse_whitespace(value),
        }
    }
}

impl Datatype for BuiltinDatatype {
    fn name(&self) -> &str {
        match self {
            BuiltinDatatype::String => "string",
            BuiltinDatatype::Token => "token",
        }
    }

    fn needs_context(&self) -> bool {
        false
    }

    fn regexp(&self) -> &str {
        ".*"
    }

    fn parse_params(
        &self,
        location: &str,
        params: &[super::Param],
    ) -> Result<ParsedParams, ParameterParsingError> {
        if params.is_empty() {
            return Ok(ParsedParams::default());
        }
        Err(ParameterParsingError {
            location: location.to_string(),
            errors: params
                .iter()
                .map(|p| ParamError::new(format!("unexpected parameter: {}", p.name)))
                .collect(),
        })
    }

    fn parse_value(
        &self,
        _location: &str,
        raw: &str,
        _context: Option<&dyn Namespaces>,
    ) -> Result<ParsedValue, ValueValidationError> {
        Ok(ParsedValue::Text(self.normalize(raw)))
    }

    fn disallows(
        &self,
        _value: &str,
        _params: &ParsedParams,
        _context: Option<&dyn Namespaces>,
    ) -> Option<Vec<ValueError>> {
        None
    }

    fn equal(
        &self,
        value: &str,
        schema_value: &ParsedValue,
        _context: Option<&dyn Namespaces>,
    ) -> bool {
        match schema_value {
            ParsedValue::Text(expected) => self.normalize(value) == *expected,
            _ => false,
        }
    }

    fn value_length(&self, value: &str) -> usize {
        value.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::Param;
    use assert_matches::assert_matches;

    #[test]
    fn token_equality_collapses() {
        let dt = BuiltinDatatype::Token;
        let v = dt.parse_value("", "  a   b ", None).unwrap();
        assert!(dt.equal("a b", &v, None));
        assert!(dt.equal("\ta\nb", &v, None));
        assert!(!dt.equal("ab", &v, None));
    }

    #[test]
    fn string_equality_is_exact() {
        let dt = BuiltinDatatype::String;
        let v = dt.parse_value("", " a", None).unwrap();
        assert!(dt.equal(" a", &v, None));
        assert!(!dt.equal("a", &v, None));
    }

    #[test]
    fn no_params_allowed() {
        let err = BuiltinDatatype::String
            .parse_params("here", &[Param::new("length", "1")])
            .unwrap_err();
        assert_matches!(&err.errors[..], [e] if e.message == "unexpected parameter: length");
        assert_eq!(err.location, "here");
    }
}
