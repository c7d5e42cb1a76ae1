//! Prefix to namespace URI mapping for the elements currently open.

use fnv::FnvHashMap;
use relaxng_model::datatype::Namespaces;
use std::fmt;
use std::rc::Rc;

pub const XML1_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// An expanded name.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct EName {
    pub ns: String,
    pub name: String,
}

impl EName {
    pub fn new(ns: impl Into<String>, name: impl Into<String>) -> EName {
        EName {
            ns: ns.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.ns, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    MalformedName(String),
    LeaveDefaultContext,
}

impl fmt::Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverError::MalformedName(name) => write!(f, "invalid name: {name}"),
            ResolverError::LeaveDefaultContext => {
                f.write_str("trying to leave the default context")
            }
        }
    }
}

impl std::error::Error for ResolverError {}

#[derive(Clone, Debug, Default)]
struct Context {
    forward: FnvHashMap<String, String>,
    // uri -> prefixes in declaration order, except that "" is always first
    backwards: FnvHashMap<String, Vec<String>>,
}

impl Context {
    fn define(&mut self, prefix: &str, uri: &str) {
        if let Some(old) = self.forward.insert(prefix.to_string(), uri.to_string()) {
            if let Some(prefixes) = self.backwards.get_mut(&old) {
                prefixes.retain(|p| p != prefix);
            }
        }
        let prefixes = self.backwards.entry(uri.to_string()).or_default();
        if prefix.is_empty() {
            prefixes.insert(0, String::new());
        } else {
            prefixes.push(prefix.to_string());
        }
    }
}

/// A stack of namespace contexts, innermost last.
///
/// Contexts are shared between clones of a resolver. Only the innermost
/// context is ever changed, and it is copied first if another resolver can
/// see it.
#[derive(Clone, Debug)]
pub struct NameResolver {
    contexts: Vec<Rc<Context>>,
}

impl Default for NameResolver {
    fn default() -> Self {
        NameResolver::new()
    }
}

impl NameResolver {
    pub fn new() -> NameResolver {
        let mut default = Context::default();
        default.define("xml", XML1_NAMESPACE);
        default.define("xmlns", XMLNS_NAMESPACE);
        NameResolver {
            contexts: vec![Rc::new(default)],
        }
    }

    pub fn define_prefix(&mut self, prefix: &str, uri: &str) {
        if let Some(innermost) = self.contexts.last_mut() {
            Rc::make_mut(innermost).define(prefix, uri);
        }
    }

    pub fn enter_context(&mut self) {
        self.contexts.push(Rc::new(Context::default()));
    }

    pub fn leave_context(&mut self) -> Result<(), ResolverError> {
        if self.contexts.len() <= 1 {
            return Err(ResolverError::LeaveDefaultContext);
        }
        self.contexts.pop();
        Ok(())
    }

    pub fn prefix_to_uri(&self, prefix: &str) -> Option<&str> {
        self.contexts
            .iter()
            .rev()
            .find_map(|c| c.forward.get(prefix))
            .map(String::as_str)
    }

    /// Resolves a qualified name. Unprefixed attribute names are never in a
    /// namespace; unprefixed element names take the default namespace, if
    /// any. `Ok(None)` means the prefix is not declared.
    pub fn resolve_name(&self, qname: &str, attribute: bool) -> Result<Option<EName>, ResolverError> {
        let malformed = || ResolverError::MalformedName(qname.to_string());
        let mut parts = qname.split(':');
        let (prefix, local) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), None, None) => ("", local),
            (Some(prefix), Some(local), None) if !prefix.is_empty() => (prefix, local),
            _ => return Err(malformed()),
        };
        if local.is_empty() {
            return Err(malformed());
        }
        if prefix.is_empty() {
            if attribute {
                return Ok(Some(EName::new("", local)));
            }
            return Ok(Some(EName::new(self.prefix_to_uri("").unwrap_or(""), local)));
        }
        Ok(self.prefix_to_uri(prefix).map(|uri| EName::new(uri, local)))
    }

    /// The inverse of `resolve_name` for elements: a qualified name that
    /// resolves to `{uri}name` in the current context, if one exists.
    pub fn unresolve_name(&self, uri: &str, name: &str) -> Option<String> {
        if uri.is_empty() {
            return Some(name.to_string());
        }
        for context in self.contexts.iter().rev() {
            let Some(prefixes) = context.backwards.get(uri) else {
                continue;
            };
            let visible = |p: &&String| self.prefix_to_uri(p) == Some(uri);
            let prefix = prefixes
                .first()
                .filter(|p| p.is_empty())
                .filter(visible)
                .or_else(|| prefixes.iter().rev().find(visible));
            if let Some(prefix) = prefix {
                return Some(if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{prefix}:{name}")
                });
            }
        }
        None
    }
}

impl Namespaces for NameResolver {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.prefix_to_uri(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn predefined_prefixes() {
        let r = NameResolver::new();
        assert_eq!(
            r.resolve_name("xml:lang", true).unwrap(),
            Some(EName::new(XML1_NAMESPACE, "lang"))
        );
        assert_eq!(r.unresolve_name(XML1_NAMESPACE, "lang").as_deref(), Some("xml:lang"));
    }

    #[test]
    fn default_namespace_only_applies_to_elements() {
        let mut r = NameResolver::new();
        r.enter_context();
        r.define_prefix("", "urn:d");
        assert_eq!(
            r.resolve_name("a", false).unwrap(),
            Some(EName::new("urn:d", "a"))
        );
        assert_eq!(r.resolve_name("a", true).unwrap(), Some(EName::new("", "a")));
    }

    #[test]
    fn undeclared_prefix() {
        let r = NameResolver::new();
        assert_eq!(r.resolve_name("p:a", false).unwrap(), None);
        assert_eq!(r.resolve_name("a", false).unwrap(), Some(EName::new("", "a")));
    }

    #[test]
    fn malformed_names() {
        let r = NameResolver::new();
        assert_matches!(r.resolve_name("a:b:c", false), Err(ResolverError::MalformedName(_)));
        assert_matches!(r.resolve_name(":b", false), Err(ResolverError::MalformedName(_)));
        assert_matches!(r.resolve_name("a:", false), Err(ResolverError::MalformedName(_)));
    }

    #[test]
    fn inner_context_shadows() {
        let mut r = NameResolver::new();
        r.enter_context();
        r.define_prefix("p", "urn:outer");
        r.enter_context();
        r.define_prefix("p", "urn:inner");
        assert_eq!(
            r.resolve_name("p:a", false).unwrap(),
            Some(EName::new("urn:inner", "a"))
        );
        // the outer binding of p is hidden
        assert_eq!(r.unresolve_name("urn:outer", "a"), None);
        r.leave_context().unwrap();
        assert_eq!(
            r.resolve_name("p:a", false).unwrap(),
            Some(EName::new("urn:outer", "a"))
        );
        assert_eq!(r.unresolve_name("urn:outer", "a").as_deref(), Some("p:a"));
    }

    #[test]
    fn unresolve_prefers_default_then_latest() {
        let mut r = NameResolver::new();
        r.enter_context();
        r.define_prefix("a", "urn:x");
        r.define_prefix("b", "urn:x");
        assert_eq!(r.unresolve_name("urn:x", "n").as_deref(), Some("b:n"));
        r.define_prefix("", "urn:x");
        assert_eq!(r.unresolve_name("urn:x", "n").as_deref(), Some("n"));
        assert_eq!(r.unresolve_name("", "n").as_deref(), Some("n"));
        assert_eq!(r.unresolve_name("urn:unknown", "n"), None);
    }

    #[test]
    fn default_context_cannot_be_left() {
        let mut r = NameResolver::new();
        r.enter_context();
        assert_eq!(r.leave_context(), Ok(()));
        assert_eq!(r.leave_context(), Err(ResolverError::LeaveDefaultContext));
    }

    #[test]
    fn clones_do_not_see_each_others_definitions() {
        let mut a = NameResolver::new();
        a.enter_context();
        a.define_prefix("p", "urn:a");
        let mut b = a.clone();
        b.define_prefix("q", "urn:b");
        a.define_prefix("p", "urn:changed");
        assert_eq!(a.prefix_to_uri("q"), None);
        assert_eq!(b.prefix_to_uri("p"), Some("urn:a"));
        assert_eq!(a.prefix_to_uri("p"), Some("urn:changed"));
    }
}
