//! Name classes used by `element` and `attribute` patterns.

use std::collections::BTreeSet;
use std::fmt;

/// Marker recorded in a grammar's namespace set when a name class matches any namespace.
pub const ANY_NAMESPACE: &str = "*";
/// Marker recorded in a grammar's namespace set when a wildcard has an `except` clause.
pub const EXCEPT_MARKER: &str = "::except";

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum NamePattern {
    Name {
        ns: String,
        name: String,
    },
    NsName {
        ns: String,
        except: Option<Box<NamePattern>>,
    },
    AnyName {
        except: Option<Box<NamePattern>>,
    },
    NameChoice(Box<NamePattern>, Box<NamePattern>),
}

impl NamePattern {
    pub fn name(ns: impl Into<String>, name: impl Into<String>) -> NamePattern {
        NamePattern::Name {
            ns: ns.into(),
            name: name.into(),
        }
    }

    pub fn ns_name(ns: impl Into<String>, except: Option<NamePattern>) -> NamePattern {
        NamePattern::NsName {
            ns: ns.into(),
            except: except.map(Box::new),
        }
    }

    pub fn any_name(except: Option<NamePattern>) -> NamePattern {
        NamePattern::AnyName {
            except: except.map(Box::new),
        }
    }

    pub fn choice(a: NamePattern, b: NamePattern) -> NamePattern {
        NamePattern::NameChoice(Box::new(a), Box::new(b))
    }

    /// Membership test for an expanded name.
    pub fn matches(&self, ns: &str, name: &str) -> bool {
        match self {
            NamePattern::Name { ns: n, name: l } => n == ns && l == name,
            NamePattern::NsName { ns: n, except } => {
                n == ns && !except.as_ref().is_some_and(|e| e.matches(ns, name))
            }
            NamePattern::AnyName { except } => {
                !except.as_ref().is_some_and(|e| e.matches(ns, name))
            }
            NamePattern::NameChoice(a, b) => a.matches(ns, name) || b.matches(ns, name),
        }
    }

    /// Whether any part of the name class is `nsName` or `anyName`.
    pub fn is_wildcard(&self) -> bool {
        match self {
            NamePattern::Name { .. } => false,
            NamePattern::NsName { .. } | NamePattern::AnyName { .. } => true,
            NamePattern::NameChoice(a, b) => a.is_wildcard() || b.is_wildcard(),
        }
    }

    /// Enumerates the expanded names matched, or `None` when the set is infinite.
    pub fn to_names(&self) -> Option<Vec<(&str, &str)>> {
        match self {
            NamePattern::Name { ns, name } => Some(vec![(ns.as_str(), name.as_str())]),
            NamePattern::NsName { .. } | NamePattern::AnyName { .. } => None,
            NamePattern::NameChoice(a, b) => {
                let mut names = a.to_names()?;
                names.extend(b.to_names()?);
                Some(names)
            }
        }
    }

    /// Representative `(ns, name)` pairs, using `"*"` where a wildcard leaves a
    /// part unconstrained.
    pub fn advertised_names(&self) -> Vec<(&str, &str)> {
        match self {
            NamePattern::Name { ns, name } => vec![(ns.as_str(), name.as_str())],
            NamePattern::NsName { ns, .. } => vec![(ns.as_str(), ANY_NAMESPACE)],
            NamePattern::AnyName { .. } => vec![(ANY_NAMESPACE, ANY_NAMESPACE)],
            NamePattern::NameChoice(a, b) => {
                let mut names = a.advertised_names();
                names.extend(b.advertised_names());
                names
            }
        }
    }

    pub fn record_namespaces(&self, namespaces: &mut BTreeSet<String>) {
        match self {
            NamePattern::Name { ns, .. } => {
                namespaces.insert(ns.clone());
            }
            NamePattern::NsName { ns, except } => {
                namespaces.insert(ns.clone());
                if except.is_some() {
                    namespaces.insert(EXCEPT_MARKER.to_string());
                }
            }
            NamePattern::AnyName { except } => {
                namespaces.insert(ANY_NAMESPACE.to_string());
                if except.is_some() {
                    namespaces.insert(EXCEPT_MARKER.to_string());
                }
            }
            NamePattern::NameChoice(a, b) => {
                a.record_namespaces(namespaces);
                b.record_namespaces(namespaces);
            }
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePattern::Name { ns, name } => {
                if ns.is_empty() {
                    f.write_str(name)
                } else {
                    write!(f, "{{{ns}}}{name}")
                }
            }
            NamePattern::NsName { ns, except } => {
                write!(f, "{{{ns}}}*")?;
                if let Some(except) = except {
                    write!(f, "-({except})")?;
                }
                Ok(())
            }
            NamePattern::AnyName { except } => {
                f.write_str("*")?;
                if let Some(except) = except {
                    write!(f, "-({except})")?;
                }
                Ok(())
            }
            NamePattern::NameChoice(a, b) => write!(f, "{a}|{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_name() {
        let n = NamePattern::name("urn:a", "foo");
        assert!(n.matches("urn:a", "foo"));
        assert!(!n.matches("", "foo"));
        assert!(!n.is_wildcard());
        assert_eq!(n.to_names(), Some(vec![("urn:a", "foo")]));
        assert_eq!(n.to_string(), "{urn:a}foo");
    }

    #[test]
    fn ns_name_except() {
        let n = NamePattern::ns_name("urn:a", Some(NamePattern::name("urn:a", "bad")));
        assert!(n.matches("urn:a", "good"));
        assert!(!n.matches("urn:a", "bad"));
        assert!(!n.matches("urn:b", "good"));
        assert!(n.is_wildcard());
        assert_eq!(n.to_names(), None);
    }

    #[test]
    fn any_name_except() {
        let n = NamePattern::any_name(Some(NamePattern::ns_name("", None)));
        assert!(n.matches("urn:x", "y"));
        assert!(!n.matches("", "y"));
        assert_eq!(n.to_string(), "*-({}*)");
    }

    #[test]
    fn choice_enumeration() {
        let n = NamePattern::choice(NamePattern::name("", "a"), NamePattern::name("", "b"));
        assert_eq!(n.to_names(), Some(vec![("", "a"), ("", "b")]));
        assert!(n.matches("", "b"));
        assert!(!n.is_wildcard());

        let w = NamePattern::choice(NamePattern::name("", "a"), NamePattern::any_name(None));
        assert_eq!(w.to_names(), None);
        assert!(w.is_wildcard());
        assert!(w.matches("", "zzz"));
        assert_eq!(w.advertised_names(), vec![("", "a"), ("*", "*")]);
    }

    #[test]
    fn namespaces_recorded() {
        let mut set = BTreeSet::new();
        NamePattern::choice(
            NamePattern::name("urn:a", "x"),
            NamePattern::any_name(Some(NamePattern::name("urn:b", "y"))),
        )
        .record_namespaces(&mut set);
        let got: Vec<_> = set.iter().map(String::as_str).collect();
        assert_eq!(got, vec!["*", "::except", "urn:a"]);
    }
}
