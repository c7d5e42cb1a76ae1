//! Translation of XML Schema regular expressions (the `pattern` facet) to the
//! `regex` crate's dialect.
//!
//! XSD expressions are implicitly anchored, have no `^`/`$` metacharacters,
//! and add the `\i \I \c \C` escapes for XML name characters.

use std::fmt;

pub(crate) const NAME_START: &str = r"\p{L}\p{Nl}_:";
pub(crate) const NAME_CHAR: &str = r"\p{L}\p{Nl}\p{Nd}\p{Mn}\p{Mc}\p{Lm}\x{B7}._:\-";
pub(crate) const NC_NAME_START: &str = r"\p{L}\p{Nl}_";
pub(crate) const NC_NAME_CHAR: &str = r"\p{L}\p{Nl}\p{Nd}\p{Mn}\p{Mc}\p{Lm}\x{B7}._\-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    Unsupported { pos: usize, construct: &'static str },
    UnexpectedEnd,
    Syntax(String),
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::Unsupported { pos, construct } => {
                write!(f, "{construct} is not supported (at offset {pos})")
            }
            PatternError::UnexpectedEnd => f.write_str("unexpected end of pattern"),
            PatternError::Syntax(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for PatternError {}

#[derive(Clone, Debug)]
pub struct Matcher {
    re: regex::Regex,
}

impl Matcher {
    pub fn test(&self, value: &str) -> bool {
        self.re.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        self.re.as_str()
    }
}

pub fn compile(xsd: &str) -> Result<Matcher, PatternError> {
    let translated = translate(xsd)?;
    let anchored = format!("^(?:{translated})$");
    regex::Regex::new(&anchored)
        .map(|re| Matcher { re })
        .map_err(|e| PatternError::Syntax(e.to_string()))
}

fn multi_char_escape(c: char) -> Option<String> {
    Some(match c {
        's' => "[ \\t\\n\\r]".to_string(),
        'S' => "[^ \\t\\n\\r]".to_string(),
        'i' => format!("[{NAME_START}]"),
        'I' => format!("[^{NAME_START}]"),
        'c' => format!("[{NAME_CHAR}]"),
        'C' => format!("[^{NAME_CHAR}]"),
        'd' => "\\p{Nd}".to_string(),
        'D' => "\\P{Nd}".to_string(),
        'w' => "[^\\p{P}\\p{Z}\\p{C}]".to_string(),
        'W' => "[\\p{P}\\p{Z}\\p{C}]".to_string(),
        _ => return None,
    })
}

fn translate(xsd: &str) -> Result<String, PatternError> {
    let mut out = String::with_capacity(xsd.len() + 8);
    let mut chars = xsd.char_indices().peekable();
    let mut class_depth = 0usize;
    while let Some((pos, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, esc) = chars.next().ok_or(PatternError::UnexpectedEnd)?;
                if let Some(expansion) = multi_char_escape(esc) {
                    out.push_str(&expansion);
                } else if esc == 'p' || esc == 'P' {
                    out.push('\\');
                    out.push(esc);
                    let mut prop = String::new();
                    for (_, pc) in chars.by_ref() {
                        prop.push(pc);
                        if pc == '}' {
                            break;
                        }
                    }
                    if prop.starts_with("{Is") {
                        return Err(PatternError::Unsupported {
                            pos,
                            construct: "block escape",
                        });
                    }
                    out.push_str(&prop);
                } else {
                    out.push('\\');
                    out.push(esc);
                }
            }
            '[' => {
                class_depth += 1;
                out.push('[');
                if let Some((_, '^')) = chars.peek() {
                    chars.next();
                    out.push('^');
                }
            }
            '-' if class_depth > 0 && matches!(chars.peek(), Some((_, '['))) => {
                return Err(PatternError::Unsupported {
                    pos,
                    construct: "character class subtraction",
                });
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(']');
            }
            '^' | '$' if class_depth == 0 => {
                out.push('\\');
                out.push(c);
            }
            '.' if class_depth == 0 => out.push_str("[^\\n\\r]"),
            '&' | '~' if class_depth > 0 => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn anchored() {
        let m = compile("abc").unwrap();
        assert!(m.test("abc"));
        assert!(!m.test("xabc"));
        assert!(!m.test("abcx"));
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let m = compile("a|bc").unwrap();
        assert!(m.test("a"));
        assert!(m.test("bc"));
        assert!(!m.test("abc"));
    }

    #[test]
    fn name_escapes() {
        let m = compile(r"\i\c*").unwrap();
        assert!(m.test("foo-bar.1"));
        assert!(m.test("_x"));
        assert!(!m.test("1abc"));
        let m = compile(r"[\i.]+").unwrap();
        assert!(m.test("a.b"));
        assert!(!m.test("a-b"));
    }

    #[test]
    fn dollar_is_literal() {
        let m = compile(r"\d+$").unwrap();
        assert!(m.test("12$"));
        assert!(!m.test("12"));
    }

    #[test]
    fn dot_excludes_newline() {
        let m = compile("a.b").unwrap();
        assert!(m.test("a b"));
        assert!(!m.test("a\nb"));
    }

    #[test]
    fn subtraction_rejected() {
        assert_matches!(
            compile("[a-z-[aeiou]]"),
            Err(PatternError::Unsupported {
                construct: "character class subtraction",
                ..
            })
        );
    }

    #[test]
    fn syntax_error() {
        assert_matches!(compile("(ab"), Err(PatternError::Syntax(_)));
        assert_matches!(compile("ab\\"), Err(PatternError::UnexpectedEnd));
    }
}
