//! Datatype libraries consumed by `data` and `value` patterns.

use fnv::FnvHashMap;
use std::fmt;
use std::rc::Rc;

pub mod builtin;
pub mod pattern;
pub mod xsd;

/// Prefix lookup used by datatypes whose values depend on in-scope namespace
/// declarations (`QName`, `NOTATION`).
pub trait Namespaces {
    fn resolve(&self, prefix: &str) -> Option<&str>;
}

/// A fixed set of prefix bindings, as found on the schema side of a `value`
/// pattern.
#[derive(Debug, Clone, Default)]
pub struct StaticNamespaces {
    bindings: Vec<(String, String)>,
}

impl StaticNamespaces {
    pub fn new(default_ns: &str) -> StaticNamespaces {
        StaticNamespaces {
            bindings: vec![(String::new(), default_ns.to_string())],
        }
    }

    pub fn bind(mut self, prefix: &str, uri: &str) -> StaticNamespaces {
        self.bindings.push((prefix.to_string(), uri.to_string()));
        self
    }
}

impl Namespaces for StaticNamespaces {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Param {
        Param {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A problem with one parameter of a `data` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamError {
    pub message: String,
}

impl ParamError {
    pub fn new(message: impl Into<String>) -> ParamError {
        ParamError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Every parameter problem found on one `data` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterParsingError {
    pub location: String,
    pub errors: Vec<ParamError>,
}

impl fmt::Display for ParameterParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.location)?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParameterParsingError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueError {
    pub message: String,
}

impl ValueError {
    pub fn new(message: impl Into<String>) -> ValueError {
        ValueError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueValidationError {
    pub errors: Vec<ValueError>,
}

impl fmt::Display for ValueValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValueValidationError {}

#[derive(PartialEq, Eq, Hash, Clone, Debug, Default)]
pub enum LengthFacet {
    #[default]
    Unbounded,
    MinLength(usize),
    MaxLength(usize),
    MinMaxLength(usize, usize),
    Length(usize),
}

impl LengthFacet {
    fn from_parts(
        length: Option<usize>,
        min: Option<usize>,
        max: Option<usize>,
    ) -> LengthFacet {
        match (length, min, max) {
            (Some(len), _, _) => LengthFacet::Length(len),
            (None, Some(min), Some(max)) => LengthFacet::MinMaxLength(min, max),
            (None, Some(min), None) => LengthFacet::MinLength(min),
            (None, None, Some(max)) => LengthFacet::MaxLength(max),
            (None, None, None) => LengthFacet::Unbounded,
        }
    }

    pub fn check(&self, actual: usize) -> Option<ValueError> {
        match self {
            LengthFacet::Unbounded => None,
            LengthFacet::Length(len) if actual != *len => Some(ValueError::new(format!(
                "length of value should be {len}"
            ))),
            LengthFacet::MinLength(min) | LengthFacet::MinMaxLength(min, _) if actual < *min => {
                Some(ValueError::new(format!(
                    "length of value should be greater than or equal to {min}"
                )))
            }
            LengthFacet::MaxLength(max) | LengthFacet::MinMaxLength(_, max) if actual > *max => {
                Some(ValueError::new(format!(
                    "length of value should be less than or equal to {max}"
                )))
            }
            _ => None,
        }
    }
}

#[derive(PartialEq, Clone, Debug)]
enum Min<T: PartialOrd> {
    Unbounded,
    Inclusive(T),
    Exclusive(T),
}

#[derive(PartialEq, Clone, Debug)]
enum Max<T: PartialOrd> {
    Unbounded,
    Inclusive(T),
    Exclusive(T),
}

/// Range facets over an ordered value space.
#[derive(PartialEq, Clone, Debug)]
pub struct MinMaxFacet<T: PartialOrd> {
    min: Min<T>,
    max: Max<T>,
}

impl<T: PartialOrd> Default for MinMaxFacet<T> {
    fn default() -> Self {
        MinMaxFacet {
            min: Min::Unbounded,
            max: Max::Unbounded,
        }
    }
}

impl<T> MinMaxFacet<T>
where
    T: PartialOrd + fmt::Display,
{
    pub fn bounded(&self) -> bool {
        !matches!((&self.min, &self.max), (Min::Unbounded, Max::Unbounded))
    }

    pub(crate) fn min_inclusive(&mut self, val: T) {
        self.min = Min::Inclusive(val);
    }

    pub(crate) fn min_exclusive(&mut self, val: T) {
        self.min = Min::Exclusive(val);
    }

    pub(crate) fn max_inclusive(&mut self, val: T) {
        self.max = Max::Inclusive(val);
    }

    pub(crate) fn max_exclusive(&mut self, val: T) {
        self.max = Max::Exclusive(val);
    }

    /// Inter-facet consistency, reported in the same terms as the schema uses.
    pub(crate) fn conflicts(&self) -> Vec<ParamError> {
        let mut errors = vec![];
        match (&self.min, &self.max) {
            (Min::Exclusive(min), Max::Inclusive(max)) if min >= max => {
                errors.push(ParamError::new("minExclusive must be less than maxInclusive"))
            }
            (Min::Inclusive(min), Max::Inclusive(max)) if min > max => errors.push(
                ParamError::new("minInclusive must be less than or equal to maxInclusive"),
            ),
            (Min::Inclusive(min), Max::Exclusive(max)) if min >= max => {
                errors.push(ParamError::new("minInclusive must be less than maxExclusive"))
            }
            (Min::Exclusive(min), Max::Exclusive(max)) if min > max => errors.push(
                ParamError::new("minExclusive must be less than or equal to maxExclusive"),
            ),
            _ => {}
        }
        errors
    }

    pub(crate) fn check(&self, v: &T) -> Vec<ValueError> {
        let mut errors = vec![];
        match &self.min {
            Min::Unbounded => {}
            Min::Inclusive(min) => {
                if v < min {
                    errors.push(ValueError::new(format!(
                        "value must be greater than or equal to {min}"
                    )));
                }
            }
            Min::Exclusive(min) => {
                if v <= min {
                    errors.push(ValueError::new(format!("value must be greater than {min}")));
                }
            }
        }
        match &self.max {
            Max::Unbounded => {}
            Max::Inclusive(max) => {
                if v > max {
                    errors.push(ValueError::new(format!(
                        "value must be less than or equal to {max}"
                    )));
                }
            }
            Max::Exclusive(max) => {
                if v >= max {
                    errors.push(ValueError::new(format!("value must be less than {max}")));
                }
            }
        }
        errors
    }
}

/// A compiled `pattern` facet. The schema text is kept for messages.
#[derive(Clone)]
pub struct PatternFacet(String, pattern::Matcher);

impl PatternFacet {
    pub fn source(&self) -> &str {
        &self.0
    }

    fn is_valid(&self, value: &str) -> bool {
        self.1.test(value)
    }
}

impl PartialEq for PatternFacet {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl fmt::Debug for PatternFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("PatternFacet").field(&self.0).finish()
    }
}

/// Parameters of a `data` pattern once a library has checked them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedParams {
    pub length: LengthFacet,
    pub patterns: Vec<PatternFacet>,
    pub decimal_bounds: MinMaxFacet<bigdecimal::BigDecimal>,
    pub float_bounds: MinMaxFacet<f64>,
    pub total_digits: Option<u64>,
    pub fraction_digits: Option<u64>,
}

impl ParsedParams {
    pub fn is_empty(&self) -> bool {
        *self == ParsedParams::default()
    }

    pub(crate) fn check_patterns(&self, value: &str) -> Option<ValueError> {
        self.patterns
            .iter()
            .find(|p| !p.is_valid(value))
            .map(|p| ValueError::new(format!("value does not match the pattern {}", p.source())))
    }
}

/// A schema-side value, converted once at grammar construction time.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedValue {
    Text(String),
    Decimal(bigdecimal::BigDecimal),
    Float(f64),
    Boolean(bool),
    QName { ns: String, local: String },
}

/// The interface through which patterns reach a datatype implementation.
pub trait Datatype: fmt::Debug {
    fn name(&self) -> &str;

    /// Whether `parse_value`, `disallows` and `equal` need prefix bindings.
    fn needs_context(&self) -> bool;

    /// A representative expression of the lexical space, for advertising what
    /// a `data` pattern would accept.
    fn regexp(&self) -> &str;

    fn parse_params(
        &self,
        location: &str,
        params: &[Param],
    ) -> Result<ParsedParams, ParameterParsingError>;

    fn parse_value(
        &self,
        location: &str,
        raw: &str,
        context: Option<&dyn Namespaces>,
    ) -> Result<ParsedValue, ValueValidationError>;

    /// `None` when the value is allowed.
    fn disallows(
        &self,
        value: &str,
        params: &ParsedParams,
        context: Option<&dyn Namespaces>,
    ) -> Option<Vec<ValueError>>;

    fn equal(
        &self,
        value: &str,
        schema_value: &ParsedValue,
        context: Option<&dyn Namespaces>,
    ) -> bool;

    fn value_length(&self, value: &str) -> usize;
}

/// A named collection of datatypes.
pub struct Library {
    uri: String,
    types: FnvHashMap<String, Rc<dyn Datatype>>,
}

impl Library {
    pub fn new(uri: impl Into<String>) -> Library {
        Library {
            uri: uri.into(),
            types: FnvHashMap::default(),
        }
    }

    pub fn with(mut self, dt: Rc<dyn Datatype>) -> Library {
        self.types.insert(dt.name().to_string(), dt);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Datatype>> {
        self.types.get(name).cloned()
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.types.keys().collect();
        names.sort();
        f.debug_struct("Library")
            .field("uri", &self.uri)
            .field("types", &names)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    UriClash(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::UriClash(uri) => write!(f, "URI clash: {uri}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Datatype libraries by URI.
#[derive(Debug)]
pub struct Registry {
    libraries: FnvHashMap<String, Library>,
}

impl Registry {
    pub fn empty() -> Registry {
        Registry {
            libraries: FnvHashMap::default(),
        }
    }

    pub fn add(&mut self, library: Library) -> Result<(), RegistryError> {
        if self.libraries.contains_key(library.uri()) {
            return Err(RegistryError::UriClash(library.uri().to_string()));
        }
        self.libraries.insert(library.uri().to_string(), library);
        Ok(())
    }

    pub fn find(&self, uri: &str) -> Option<&Library> {
        self.libraries.get(uri)
    }
}

impl Default for Registry {
    /// The built-in library and the XML Schema datatypes.
    fn default() -> Self {
        let mut libraries = FnvHashMap::default();
        for lib in [builtin::library(), xsd::library()] {
            libraries.insert(lib.uri().to_string(), lib);
        }
        Registry { libraries }
    }
}

/// XML whitespace: space, tab, carriage return, line feed.
pub fn is_xml_whitespace(c: char) -> bool {
    matches!(c, '\x20' | '\x09' | '\x0d' | '\x0a')
}

/// Collapses runs of whitespace to single spaces and trims both ends.
pub fn collapse_whitespace(value: &str) -> String {
    value
        .split(is_xml_whitespace)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn default_registry_has_both_libraries() {
        let reg = Registry::default();
        assert!(reg.find("").and_then(|l| l.get("token")).is_some());
        assert!(reg.find(xsd::NAMESPACE_URI).and_then(|l| l.get("integer")).is_some());
        assert!(reg.find("urn:nope").is_none());
    }

    #[test]
    fn registry_rejects_clash() {
        let mut reg = Registry::default();
        assert_matches!(
            reg.add(Library::new("")),
            Err(RegistryError::UriClash(uri)) if uri.is_empty()
        );
        assert_matches!(reg.add(Library::new("urn:custom")), Ok(()));
    }

    #[test]
    fn collapse() {
        assert_eq!(collapse_whitespace("  a \t\n b  "), "a b");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn length_messages() {
        assert_eq!(
            LengthFacet::Length(2).check(3).map(|e| e.message),
            Some("length of value should be 2".to_string())
        );
        assert_eq!(LengthFacet::MinMaxLength(1, 3).check(2), None);
        assert_eq!(
            LengthFacet::MinMaxLength(1, 3).check(4).map(|e| e.message),
            Some("length of value should be less than or equal to 3".to_string())
        );
    }

    #[test]
    fn static_namespaces() {
        let ns = StaticNamespaces::new("urn:d").bind("p", "urn:p");
        assert_eq!(ns.resolve(""), Some("urn:d"));
        assert_eq!(ns.resolve("p"), Some("urn:p"));
        assert_eq!(ns.resolve("q"), None);
    }
}
