use super::pattern::{NAME_CHAR, NAME_START, NC_NAME_CHAR, NC_NAME_START};
use super::{
    Datatype, Library, MinMaxFacet, Namespaces, Param, ParamError, ParameterParsingError,
    ParsedParams, ParsedValue, PatternFacet, ValueError, ValueValidationError, collapse_whitespace,
    is_xml_whitespace, pattern,
};
use bigdecimal::BigDecimal;
use lazy_static::lazy_static;
use regex::Regex;
use std::rc::Rc;
use std::str::FromStr;

pub const NAMESPACE_URI: &str = "http://www.w3.org/2001/XMLSchema-datatypes";

const TZ: &str = r"(?P<tz>Z|[+-](?P<tzh>\d{2}):(?P<tzm>\d{2}))?";
const YEAR: &str = r"(?P<year>-?(?:[1-9]\d*)?\d{4})";
const MONTH: &str = r"(?P<month>\d{2})";
const DAY: &str = r"(?P<day>\d{2})";
const TIME: &str = r"(?P<hour>\d{2}):(?P<minute>\d{2}):(?P<second>\d{2}(?:\.\d+)?)";
const DECIMAL: &str = r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)";

lazy_static! {
    static ref STRING_RE: Regex = Regex::new(r"(?s)^.*$").unwrap();
    static ref NORMALIZED_RE: Regex = Regex::new(r"^[^\r\n\t]*$").unwrap();
    static ref TOKEN_RE: Regex = Regex::new(r"^(?:[^\r\n\t ]+(?: [^\r\n\t ]+)*)?$").unwrap();
    static ref LANG_RE: Regex = Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap();
    static ref NAME_RE: Regex = Regex::new(&format!("^[{NAME_START}][{NAME_CHAR}]*$")).unwrap();
    static ref NCNAME_RE: Regex =
        Regex::new(&format!("^[{NC_NAME_START}][{NC_NAME_CHAR}]*$")).unwrap();
    static ref NCNAMES_RE: Regex = Regex::new(&format!(
        "^[{NC_NAME_START}][{NC_NAME_CHAR}]*(?: [{NC_NAME_START}][{NC_NAME_CHAR}]*)*$"
    ))
    .unwrap();
    static ref NMTOKEN_RE: Regex = Regex::new(&format!("^[{NAME_CHAR}]+$")).unwrap();
    static ref NMTOKENS_RE: Regex =
        Regex::new(&format!("^[{NAME_CHAR}]+(?: [{NAME_CHAR}]+)*$")).unwrap();
    static ref QNAME_RE: Regex = Regex::new(&format!(
        "^(?:[{NC_NAME_START}][{NC_NAME_CHAR}]*:)?[{NC_NAME_START}][{NC_NAME_CHAR}]*$"
    ))
    .unwrap();
    static ref ANY_URI_RE: Regex = Regex::new(r"^[^\x00-\x1F\x7F]*$").unwrap();
    static ref DECIMAL_RE: Regex = Regex::new(&format!("^{DECIMAL}$")).unwrap();
    static ref INTEGER_RE: Regex = Regex::new(r"^[-+]?\d+$").unwrap();
    static ref NON_POSITIVE_RE: Regex = Regex::new(r"^(?:\+?0+|-\d+)$").unwrap();
    static ref NEGATIVE_RE: Regex = Regex::new(r"^-\d+$").unwrap();
    static ref UNSIGNED_RE: Regex = Regex::new(r"^\+?\d+$").unwrap();
    static ref FLOAT_RE: Regex =
        Regex::new(&format!(r"^(?:[-+]?INF|NaN|{DECIMAL}(?:[Ee][-+]?\d+)?)$")).unwrap();
    static ref BOOLEAN_RE: Regex = Regex::new(r"^(?:1|0|true|false)$").unwrap();
    static ref BASE64_RE: Regex = {
        let b64 = "[A-Za-z0-9+/]";
        let b64s = format!("(?:{b64} ?)");
        let b16s = "(?:[AEIMQUYcgkosw048] ?)";
        let b04s = "(?:[AQgw] ?)";
        Regex::new(&format!(
            "^(?:(?:{b64s}{{4}})*(?:(?:{b64s}{{3}}{b64})|(?:{b64s}{{2}}{b16s}=)|(?:{b64s}{b04s}= ?=)))?$"
        ))
        .unwrap()
    };
    static ref HEX_BINARY_RE: Regex = Regex::new(r"^(?:[0-9A-Fa-f]{2})*$").unwrap();
    static ref DURATION_RE: Regex = Regex::new(
        r"^-?P(?:\d+Y)?(?:\d+M)?(?:\d+D)?(?:T(?:\d+H)?(?:\d+M)?(?:\d+(?:\.\d+)?S)?)?$"
    )
    .unwrap();
    static ref DATETIME_RE: Regex =
        Regex::new(&format!("^{YEAR}-{MONTH}-{DAY}T{TIME}{TZ}$")).unwrap();
    static ref DATE_RE: Regex = Regex::new(&format!("^{YEAR}-{MONTH}-{DAY}{TZ}$")).unwrap();
    static ref TIME_RE: Regex = Regex::new(&format!("^{TIME}{TZ}$")).unwrap();
    static ref GYEARMONTH_RE: Regex = Regex::new(&format!("^{YEAR}-{MONTH}{TZ}$")).unwrap();
    static ref GYEAR_RE: Regex = Regex::new(&format!("^{YEAR}{TZ}$")).unwrap();
    static ref GMONTHDAY_RE: Regex = Regex::new(&format!("^--{MONTH}-{DAY}{TZ}$")).unwrap();
    static ref GDAY_RE: Regex = Regex::new(&format!("^---{DAY}{TZ}$")).unwrap();
    static ref GMONTH_RE: Regex = Regex::new(&format!("^--{MONTH}{TZ}$")).unwrap();
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

impl WhiteSpace {
    fn apply(self, value: &str) -> String {
        match self {
            WhiteSpace::Preserve => value.to_string(),
            WhiteSpace::Replace => value
                .chars()
                .map(|c| if is_xml_whitespace(c) { ' ' } else { c })
                .collect(),
            WhiteSpace::Collapse => collapse_whitespace(value),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Facet {
    Length,
    MinLength,
    MaxLength,
    Pattern,
    TotalDigits,
    FractionDigits,
    MinInclusive,
    MinExclusive,
    MaxInclusive,
    MaxExclusive,
}

impl Facet {
    fn from_name(name: &str) -> Option<Facet> {
        Some(match name {
            "length" => Facet::Length,
            "minLength" => Facet::MinLength,
            "maxLength" => Facet::MaxLength,
            "pattern" => Facet::Pattern,
            "totalDigits" => Facet::TotalDigits,
            "fractionDigits" => Facet::FractionDigits,
            "minInclusive" => Facet::MinInclusive,
            "minExclusive" => Facet::MinExclusive,
            "maxInclusive" => Facet::MaxInclusive,
            "maxExclusive" => Facet::MaxExclusive,
            _ => return None,
        })
    }

    fn is_bound(self) -> bool {
        matches!(
            self,
            Facet::MinInclusive | Facet::MinExclusive | Facet::MaxInclusive | Facet::MaxExclusive
        )
    }
}

const STRING_FACETS: &[Facet] = &[
    Facet::Length,
    Facet::MinLength,
    Facet::MaxLength,
    Facet::Pattern,
];
const DECIMAL_FACETS: &[Facet] = &[
    Facet::TotalDigits,
    Facet::FractionDigits,
    Facet::Pattern,
    Facet::MinExclusive,
    Facet::MinInclusive,
    Facet::MaxExclusive,
    Facet::MaxInclusive,
];
const INTEGER_FACETS: &[Facet] = &[
    Facet::TotalDigits,
    Facet::Pattern,
    Facet::MinExclusive,
    Facet::MinInclusive,
    Facet::MaxExclusive,
    Facet::MaxInclusive,
];
const FLOAT_FACETS: &[Facet] = &[
    Facet::Pattern,
    Facet::MinInclusive,
    Facet::MinExclusive,
    Facet::MaxInclusive,
    Facet::MaxExclusive,
];
const PATTERN_ONLY: &[Facet] = &[Facet::Pattern];

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Kind {
    Text,
    /// Whitespace-separated items; length facets count items.
    List,
    Decimal,
    Integer {
        lowest: Option<&'static str>,
        highest: Option<&'static str>,
    },
    Float,
    Boolean,
    QName,
    Base64,
    Hex,
    Duration,
    /// Date and time types. The lexical expression carries the named groups
    /// checked against the calendar.
    Calendar,
}

#[derive(Debug)]
pub struct XsdDatatype {
    name: &'static str,
    type_error: &'static str,
    lexical: &'static Regex,
    white_space: WhiteSpace,
    facets: &'static [Facet],
    kind: Kind,
}

fn integer(
    name: &'static str,
    type_error: &'static str,
    lexical: &'static Regex,
    lowest: Option<&'static str>,
    highest: Option<&'static str>,
) -> XsdDatatype {
    XsdDatatype {
        name,
        type_error,
        lexical,
        white_space: WhiteSpace::Collapse,
        facets: INTEGER_FACETS,
        kind: Kind::Integer { lowest, highest },
    }
}

fn simple(
    name: &'static str,
    type_error: &'static str,
    lexical: &'static Regex,
    facets: &'static [Facet],
    kind: Kind,
) -> XsdDatatype {
    XsdDatatype {
        name,
        type_error,
        lexical,
        white_space: WhiteSpace::Collapse,
        facets,
        kind,
    }
}

pub fn library() -> Library {
    let types = vec![
        XsdDatatype {
            name: "string",
            type_error: "value is not a string",
            lexical: &STRING_RE,
            white_space: WhiteSpace::Preserve,
            facets: STRING_FACETS,
            kind: Kind::Text,
        },
        XsdDatatype {
            name: "normalizedString",
            type_error: "string contains a tab, carriage return or newline",
            lexical: &NORMALIZED_RE,
            white_space: WhiteSpace::Replace,
            facets: STRING_FACETS,
            kind: Kind::Text,
        },
        simple("token", "not a valid token", &TOKEN_RE, STRING_FACETS, Kind::Text),
        simple(
            "language",
            "not a valid language identifier",
            &LANG_RE,
            STRING_FACETS,
            Kind::Text,
        ),
        simple("Name", "not a valid Name", &NAME_RE, STRING_FACETS, Kind::Text),
        simple("NCName", "not a valid NCName", &NCNAME_RE, STRING_FACETS, Kind::Text),
        simple("NMTOKEN", "not a valid NMTOKEN", &NMTOKEN_RE, STRING_FACETS, Kind::Text),
        simple("NMTOKENS", "not a valid NMTOKENS", &NMTOKENS_RE, STRING_FACETS, Kind::List),
        simple("ID", "not a valid ID", &NCNAME_RE, STRING_FACETS, Kind::Text),
        simple("IDREF", "not a valid IDREF", &NCNAME_RE, STRING_FACETS, Kind::Text),
        simple("IDREFS", "not a valid IDREFS", &NCNAMES_RE, STRING_FACETS, Kind::List),
        simple("ENTITY", "not a valid ENTITY", &NCNAME_RE, STRING_FACETS, Kind::Text),
        simple("ENTITIES", "not a valid ENTITIES", &NCNAMES_RE, STRING_FACETS, Kind::List),
        simple("anyURI", "not a valid anyURI", &ANY_URI_RE, STRING_FACETS, Kind::Text),
        simple("QName", "not a valid QName", &QNAME_RE, STRING_FACETS, Kind::QName),
        simple("NOTATION", "not a valid NOTATION", &QNAME_RE, STRING_FACETS, Kind::QName),
        simple(
            "decimal",
            "value not a decimal number",
            &DECIMAL_RE,
            DECIMAL_FACETS,
            Kind::Decimal,
        ),
        integer("integer", "value is not an integer", &INTEGER_RE, None, None),
        integer(
            "nonPositiveInteger",
            "value is not a nonPositiveInteger",
            &NON_POSITIVE_RE,
            None,
            Some("0"),
        ),
        integer(
            "negativeInteger",
            "value is not a negativeInteger",
            &NEGATIVE_RE,
            None,
            Some("-1"),
        ),
        integer(
            "nonNegativeInteger",
            "value is not a nonNegativeInteger",
            &UNSIGNED_RE,
            Some("0"),
            None,
        ),
        integer(
            "positiveInteger",
            "value is not a positiveInteger",
            &UNSIGNED_RE,
            Some("1"),
            None,
        ),
        integer(
            "long",
            "value is not a long",
            &INTEGER_RE,
            Some("-9223372036854775808"),
            Some("9223372036854775807"),
        ),
        integer(
            "int",
            "value is not an int",
            &INTEGER_RE,
            Some("-2147483648"),
            Some("2147483647"),
        ),
        integer(
            "short",
            "value is not a short",
            &INTEGER_RE,
            Some("-32768"),
            Some("32767"),
        ),
        integer("byte", "value is not a byte", &INTEGER_RE, Some("-128"), Some("127")),
        integer(
            "unsignedLong",
            "value is not an unsignedLong",
            &UNSIGNED_RE,
            Some("0"),
            Some("18446744073709551615"),
        ),
        integer(
            "unsignedInt",
            "value is not an unsignedInt",
            &UNSIGNED_RE,
            Some("0"),
            Some("4294967295"),
        ),
        integer(
            "unsignedShort",
            "value is not an unsignedShort",
            &UNSIGNED_RE,
            Some("0"),
            Some("65535"),
        ),
        integer(
            "unsignedByte",
            "value is not an unsignedByte",
            &UNSIGNED_RE,
            Some("0"),
            Some("255"),
        ),
        simple("float", "not a valid float", &FLOAT_RE, FLOAT_FACETS, Kind::Float),
        simple("double", "not a valid double", &FLOAT_RE, FLOAT_FACETS, Kind::Float),
        simple("boolean", "not a valid boolean", &BOOLEAN_RE, PATTERN_ONLY, Kind::Boolean),
        simple(
            "base64Binary",
            "not a valid base64Binary",
            &BASE64_RE,
            STRING_FACETS,
            Kind::Base64,
        ),
        simple(
            "hexBinary",
            "not a valid hexBinary",
            &HEX_BINARY_RE,
            STRING_FACETS,
            Kind::Hex,
        ),
        simple(
            "duration",
            "not a valid duration",
            &DURATION_RE,
            PATTERN_ONLY,
            Kind::Duration,
        ),
        simple(
            "dateTime",
            "not a valid dateTime",
            &DATETIME_RE,
            PATTERN_ONLY,
            Kind::Calendar,
        ),
        simple("date", "not a valid date", &DATE_RE, PATTERN_ONLY, Kind::Calendar),
        simple("time", "not a valid time", &TIME_RE, PATTERN_ONLY, Kind::Calendar),
        simple(
            "gYearMonth",
            "not a valid gYearMonth",
            &GYEARMONTH_RE,
            PATTERN_ONLY,
            Kind::Calendar,
        ),
        simple("gYear", "not a valid gYear", &GYEAR_RE, PATTERN_ONLY, Kind::Calendar),
        simple(
            "gMonthDay",
            "not a valid gMonthDay",
            &GMONTHDAY_RE,
            PATTERN_ONLY,
            Kind::Calendar,
        ),
        simple("gDay", "not a valid gDay", &GDAY_RE, PATTERN_ONLY, Kind::Calendar),
        simple("gMonth", "not a valid gMonth", &GMONTH_RE, PATTERN_ONLY, Kind::Calendar),
    ];
    types
        .into_iter()
        .fold(Library::new(NAMESPACE_URI), |lib, dt| lib.with(Rc::new(dt)))
}

/// Parses the lexical forms `decimal` allows, which `BigDecimal` is stricter about.
fn decimal_value(lexical: &str) -> Option<BigDecimal> {
    let (sign, digits) = match lexical.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", lexical.strip_prefix('+').unwrap_or(lexical)),
    };
    let mut s = String::with_capacity(lexical.len() + 2);
    s.push_str(sign);
    if digits.starts_with('.') {
        s.push('0');
    }
    s.push_str(digits);
    if digits.ends_with('.') {
        s.push('0');
    }
    BigDecimal::from_str(&s).ok()
}

fn float_value(lexical: &str) -> Option<f64> {
    match lexical {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => lexical.parse().ok(),
    }
}

/// `(total digits, fraction digits)` of a decimal lexical form, ignoring
/// insignificant zeros.
fn digit_counts(lexical: &str) -> (u64, u64) {
    let unsigned = lexical.trim_start_matches(['+', '-']);
    let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int = int.trim_start_matches('0');
    let frac = frac.trim_end_matches('0');
    ((int.len() + frac.len()) as u64, frac.len() as u64)
}

fn resolve_qname(value: &str, ns: Option<&dyn Namespaces>) -> Result<(String, String), ValueError> {
    let unresolvable = || ValueError::new(format!("cannot resolve the name {value}"));
    let ns = ns.ok_or_else(unresolvable)?;
    match value.split_once(':') {
        Some((prefix, local)) => {
            let uri = ns.resolve(prefix).ok_or_else(unresolvable)?;
            Ok((uri.to_string(), local.to_string()))
        }
        None => Ok((ns.resolve("").unwrap_or("").to_string(), value.to_string())),
    }
}

fn check_calendar(caps: &regex::Captures) -> bool {
    let num = |name: &str, default: u32| -> Option<u32> {
        match caps.name(name) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(default),
        }
    };
    // A leap year, so that --02-29 is accepted where no year is given.
    let year = match caps.name("year") {
        Some(m) => match m.as_str().parse::<i32>() {
            Ok(y) => y,
            Err(_) => return false,
        },
        None => 2000,
    };
    let (Some(month), Some(day)) = (num("month", 1), num("day", 1)) else {
        return false;
    };
    if chrono::NaiveDate::from_ymd_opt(year, month, day).is_none() {
        return false;
    }
    if let Some(hour) = caps.name("hour") {
        let hour: u32 = hour.as_str().parse().unwrap_or(99);
        let minute = num("minute", 0).unwrap_or(99);
        let second: f64 = caps
            .name("second")
            .and_then(|s| s.as_str().parse().ok())
            .unwrap_or(99.0);
        if minute > 59 || second >= 60.0 {
            return false;
        }
        let midnight = minute == 0 && second == 0.0;
        if hour > 24 || (hour == 24 && !midnight) {
            return false;
        }
    }
    if let (Some(tzh), Some(tzm)) = (caps.name("tzh"), caps.name("tzm")) {
        let tzh: u32 = tzh.as_str().parse().unwrap_or(99);
        let tzm: u32 = tzm.as_str().parse().unwrap_or(99);
        if tzh > 14 || tzm > 59 || (tzh == 14 && tzm != 0) {
            return false;
        }
    }
    true
}

impl XsdDatatype {
    fn lexical_errors(&self, processed: &str) -> Option<Vec<ValueError>> {
        let well_formed = match self.kind {
            Kind::Calendar => self
                .lexical
                .captures(processed)
                .is_some_and(|caps| check_calendar(&caps)),
            Kind::Duration => {
                self.lexical.is_match(processed)
                    && !processed.ends_with('P')
                    && !processed.ends_with('T')
            }
            _ => self.lexical.is_match(processed),
        };
        if well_formed {
            None
        } else {
            Some(vec![ValueError::new(self.type_error)])
        }
    }

    /// Converts an already whitespace-processed, lexically valid value.
    fn convert(
        &self,
        processed: &str,
        context: Option<&dyn Namespaces>,
    ) -> Result<ParsedValue, ValueError> {
        Ok(match self.kind {
            Kind::Decimal | Kind::Integer { .. } => ParsedValue::Decimal(
                decimal_value(processed).ok_or_else(|| ValueError::new(self.type_error))?,
            ),
            Kind::Float => ParsedValue::Float(
                float_value(processed).ok_or_else(|| ValueError::new(self.type_error))?,
            ),
            Kind::Boolean => ParsedValue::Boolean(processed == "1" || processed == "true"),
            Kind::QName => {
                let (ns, local) = resolve_qname(processed, context)?;
                ParsedValue::QName { ns, local }
            }
            Kind::Base64 => ParsedValue::Text(processed.replace(' ', "")),
            Kind::Hex => ParsedValue::Text(processed.to_ascii_uppercase()),
            Kind::Text | Kind::List | Kind::Duration | Kind::Calendar => {
                ParsedValue::Text(processed.to_string())
            }
        })
    }

    fn integer_limits(&self) -> (Option<BigDecimal>, Option<BigDecimal>) {
        match self.kind {
            Kind::Integer { lowest, highest } => (
                lowest.and_then(decimal_value),
                highest.and_then(decimal_value),
            ),
            _ => (None, None),
        }
    }

    fn non_negative(param: &Param) -> Result<u64, ParamError> {
        param.value.trim().parse().map_err(|_| {
            ParamError::new(format!(
                "{} must have a non-negative integer value",
                param.name
            ))
        })
    }

    fn positive(param: &Param) -> Result<u64, ParamError> {
        match param.value.trim().parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ParamError::new(format!(
                "{} must have a positive value",
                param.name
            ))),
        }
    }

    fn apply_bound<T>(facets: &mut MinMaxFacet<T>, facet: Facet, v: T)
    where
        T: PartialOrd + std::fmt::Display,
    {
        match facet {
            Facet::MinInclusive => facets.min_inclusive(v),
            Facet::MinExclusive => facets.min_exclusive(v),
            Facet::MaxInclusive => facets.max_inclusive(v),
            Facet::MaxExclusive => facets.max_exclusive(v),
            _ => {}
        }
    }
}

impl Datatype for XsdDatatype {
    fn name(&self) -> &str {
        self.name
    }

    fn needs_context(&self) -> bool {
        self.kind == Kind::QName
    }

    fn regexp(&self) -> &str {
        self.lexical.as_str()
    }

    fn parse_params(
        &self,
        location: &str,
        params: &[Param],
    ) -> Result<ParsedParams, ParameterParsingError> {
        let mut errors = vec![];
        let mut seen: Vec<Facet> = vec![];
        let mut out = ParsedParams::default();
        let (mut length, mut min_length, mut max_length) = (None, None, None);
        let mut decimal_bounds: Vec<(Facet, BigDecimal)> = vec![];

        for param in params {
            let facet = match Facet::from_name(&param.name) {
                Some(f) if self.facets.contains(&f) => f,
                _ => {
                    errors.push(ParamError::new(format!(
                        "unexpected parameter: {}",
                        param.name
                    )));
                    continue;
                }
            };
            if facet != Facet::Pattern && seen.contains(&facet) {
                errors.push(ParamError::new(format!(
                    "cannot repeat parameter {}",
                    param.name
                )));
            }
            seen.push(facet);

            let result = match facet {
                Facet::Length => Self::non_negative(param).map(|n| length = Some(n as usize)),
                Facet::MinLength => {
                    Self::non_negative(param).map(|n| min_length = Some(n as usize))
                }
                Facet::MaxLength => {
                    Self::non_negative(param).map(|n| max_length = Some(n as usize))
                }
                Facet::Pattern => pattern::compile(&param.value)
                    .map(|m| out.patterns.push(PatternFacet(param.value.clone(), m)))
                    .map_err(|e| ParamError::new(e.to_string())),
                Facet::TotalDigits => Self::positive(param).map(|n| out.total_digits = Some(n)),
                Facet::FractionDigits => {
                    Self::non_negative(param).map(|n| out.fraction_digits = Some(n))
                }
                Facet::MinInclusive
                | Facet::MinExclusive
                | Facet::MaxInclusive
                | Facet::MaxExclusive => {
                    let processed = self.white_space.apply(&param.value);
                    if let Some(errs) = self.lexical_errors(&processed) {
                        errors.extend(
                            errs.into_iter()
                                .map(|e| ParamError::new(format!("{}: {e}", param.name))),
                        );
                        continue;
                    }
                    match self.kind {
                        Kind::Float => {
                            let v = float_value(&processed).unwrap_or(f64::NAN);
                            Self::apply_bound(&mut out.float_bounds, facet, v);
                        }
                        _ => match decimal_value(&processed) {
                            Some(v) => decimal_bounds.push((facet, v)),
                            None => errors.push(ParamError::new(format!(
                                "{}: {}",
                                param.name, self.type_error
                            ))),
                        },
                    }
                    Ok(())
                }
            };
            if let Err(e) = result {
                errors.push(e);
            }
        }

        if let (Some(min), Some(max)) = (min_length, max_length) {
            if min > max {
                errors.push(ParamError::new(
                    "minLength must be less than or equal to maxLength",
                ));
            }
        }
        if length.is_some() {
            if min_length.is_some() {
                errors.push(ParamError::new(
                    "length and minLength cannot appear together",
                ));
            }
            if max_length.is_some() {
                errors.push(ParamError::new(
                    "length and maxLength cannot appear together",
                ));
            }
        }
        out.length = super::LengthFacet::from_parts(length, min_length, max_length);

        if seen.contains(&Facet::MaxInclusive) && seen.contains(&Facet::MaxExclusive) {
            errors.push(ParamError::new(
                "maxInclusive and maxExclusive cannot appear together",
            ));
        }
        if seen.contains(&Facet::MinInclusive) && seen.contains(&Facet::MinExclusive) {
            errors.push(ParamError::new(
                "minInclusive and minExclusive cannot appear together",
            ));
        }

        let (lowest, highest) = self.integer_limits();
        for (facet, v) in decimal_bounds {
            let name = match facet {
                Facet::MinInclusive => "minInclusive",
                Facet::MinExclusive => "minExclusive",
                Facet::MaxInclusive => "maxInclusive",
                _ => "maxExclusive",
            };
            match facet {
                Facet::MaxInclusive | Facet::MaxExclusive => {
                    if let Some(highest) = highest.as_ref().filter(|h| v > **h) {
                        errors.push(ParamError::new(format!(
                            "{name} cannot be greater than {highest}"
                        )));
                    }
                }
                _ => {
                    if let Some(lowest) = lowest.as_ref().filter(|l| v < **l) {
                        errors.push(ParamError::new(format!(
                            "{name} cannot be lower than {lowest}"
                        )));
                    }
                }
            }
            Self::apply_bound(&mut out.decimal_bounds, facet, v);
        }
        if seen.iter().any(|f| f.is_bound()) {
            errors.extend(out.decimal_bounds.conflicts());
            errors.extend(out.float_bounds.conflicts());
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(ParameterParsingError {
                location: location.to_string(),
                errors,
            })
        }
    }

    fn parse_value(
        &self,
        _location: &str,
        raw: &str,
        context: Option<&dyn Namespaces>,
    ) -> Result<ParsedValue, ValueValidationError> {
        if let Some(errors) = self.disallows(raw, &ParsedParams::default(), context) {
            return Err(ValueValidationError { errors });
        }
        self.convert(&self.white_space.apply(raw), context)
            .map_err(|e| ValueValidationError { errors: vec![e] })
    }

    fn disallows(
        &self,
        value: &str,
        params: &ParsedParams,
        context: Option<&dyn Namespaces>,
    ) -> Option<Vec<ValueError>> {
        let processed = self.white_space.apply(value);
        if let Some(errors) = self.lexical_errors(&processed) {
            return Some(errors);
        }
        let converted = match self.convert(&processed, context) {
            Ok(v) => v,
            Err(e) => return Some(vec![e]),
        };

        let mut errors = vec![];
        if let Some(e) = params.length.check(self.value_length(&processed)) {
            errors.push(e);
        }
        if let Some(e) = params.check_patterns(&processed) {
            errors.push(e);
        }
        match &converted {
            ParsedValue::Decimal(v) => {
                let (lowest, highest) = self.integer_limits();
                if let Some(lowest) = lowest.filter(|l| v < l) {
                    errors.push(ValueError::new(format!(
                        "value must be greater than or equal to {lowest}"
                    )));
                }
                if let Some(highest) = highest.filter(|h| v > h) {
                    errors.push(ValueError::new(format!(
                        "value must be less than or equal to {highest}"
                    )));
                }
                errors.extend(params.decimal_bounds.check(v));
                let (total, fraction) = digit_counts(&processed);
                if let Some(max) = params.total_digits.filter(|max| total > *max) {
                    errors.push(ValueError::new(format!(
                        "value must have at most {max} digits"
                    )));
                }
                if let Some(max) = params.fraction_digits.filter(|max| fraction > *max) {
                    errors.push(ValueError::new(format!(
                        "value must have at most {max} fraction digits"
                    )));
                }
            }
            ParsedValue::Float(v) => errors.extend(params.float_bounds.check(v)),
            _ => {}
        }

        if errors.is_empty() {
            None
        } else {
            Some(errors)
        }
    }

    fn equal(
        &self,
        value: &str,
        schema_value: &ParsedValue,
        context: Option<&dyn Namespaces>,
    ) -> bool {
        let processed = self.white_space.apply(value);
        if self.lexical_errors(&processed).is_some() {
            return false;
        }
        match (self.convert(&processed, context), schema_value) {
            (Ok(ParsedValue::Float(a)), ParsedValue::Float(b)) if a.is_nan() => b.is_nan(),
            (Ok(v), expected) => v == *expected,
            (Err(_), _) => false,
        }
    }

    fn value_length(&self, value: &str) -> usize {
        match self.kind {
            Kind::List => value.split(is_xml_whitespace).filter(|s| !s.is_empty()).count(),
            Kind::Base64 => {
                value
                    .chars()
                    .filter(|c| !is_xml_whitespace(*c) && *c != '=')
                    .count()
                    * 3
                    / 4
            }
            Kind::Hex => value.len() / 2,
            _ => value.chars().count(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::datatype::{LengthFacet, StaticNamespaces};
    use assert_matches::assert_matches;

    fn get(name: &str) -> Rc<dyn Datatype> {
        library().get(name).unwrap()
    }

    fn messages(errs: Option<Vec<ValueError>>) -> Vec<String> {
        errs.unwrap_or_default()
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn it_works() {
        let res = get("normalizedString").parse_params("here", &[Param::new("length", "1")]);
        assert_matches!(
            res,
            Ok(ParsedParams {
                length: LengthFacet::Length(1),
                ..
            })
        );
    }

    #[test]
    fn every_param_problem_is_reported() {
        let err = get("string")
            .parse_params(
                "p",
                &[
                    Param::new("length", "x"),
                    Param::new("bogus", "1"),
                    Param::new("minLength", "1"),
                    Param::new("minLength", "2"),
                ],
            )
            .unwrap_err();
        let got: Vec<_> = err.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            got,
            vec![
                "length must have a non-negative integer value",
                "unexpected parameter: bogus",
                "cannot repeat parameter minLength",
            ]
        );
    }

    #[test]
    fn length_and_min_length_conflict() {
        let err = get("token")
            .parse_params(
                "p",
                &[Param::new("length", "2"), Param::new("minLength", "1")],
            )
            .unwrap_err();
        assert_eq!(
            err.errors[0].message,
            "length and minLength cannot appear together"
        );
    }

    #[test]
    fn repeated_patterns_all_apply() {
        let dt = get("string");
        let params = dt
            .parse_params(
                "p",
                &[Param::new("pattern", "[a-z]+"), Param::new("pattern", ".{3}")],
            )
            .unwrap();
        assert_eq!(dt.disallows("abc", &params, None), None);
        assert_eq!(
            messages(dt.disallows("abcd", &params, None)),
            vec!["value does not match the pattern .{3}"]
        );
        assert_eq!(
            messages(dt.disallows("AB1", &params, None)),
            vec!["value does not match the pattern [a-z]+"]
        );
    }

    #[test]
    fn bad_pattern_is_a_param_error() {
        let err = get("string")
            .parse_params("p", &[Param::new("pattern", "[a-z-[aeiou]]")])
            .unwrap_err();
        assert_eq!(err.errors.len(), 1);
    }

    #[test]
    fn integer_ranges() {
        let byte = get("byte");
        let params = byte.parse_params("p", &[]).unwrap();
        assert_eq!(byte.disallows("127", &params, None), None);
        assert_eq!(byte.disallows(" -128 ", &params, None), None);
        assert_eq!(
            messages(byte.disallows("128", &params, None)),
            vec!["value must be less than or equal to 127"]
        );
        assert_eq!(
            messages(byte.disallows("1.5", &params, None)),
            vec!["value is not a byte"]
        );
        let err = byte
            .parse_params("p", &[Param::new("maxInclusive", "300")])
            .unwrap_err();
        assert_eq!(err.errors[0].message, "maxInclusive cannot be greater than 127");
    }

    #[test]
    fn decimal_facets() {
        let dt = get("decimal");
        let params = dt
            .parse_params(
                "p",
                &[
                    Param::new("minExclusive", "0"),
                    Param::new("maxInclusive", "10.5"),
                    Param::new("totalDigits", "3"),
                    Param::new("fractionDigits", "1"),
                ],
            )
            .unwrap();
        assert_eq!(dt.disallows("10.5", &params, None), None);
        assert_eq!(dt.disallows(".5", &params, None), None);
        assert_eq!(dt.disallows("007.50", &params, None), None);
        assert_eq!(
            messages(dt.disallows("0", &params, None)),
            vec!["value must be greater than 0"]
        );
        assert_eq!(
            messages(dt.disallows("1.25", &params, None)),
            vec!["value must have at most 1 fraction digits"]
        );
        let err = dt
            .parse_params(
                "p",
                &[Param::new("minInclusive", "5"), Param::new("maxInclusive", "1")],
            )
            .unwrap_err();
        assert_eq!(
            err.errors[0].message,
            "minInclusive must be less than or equal to maxInclusive"
        );
    }

    #[test]
    fn floats() {
        let dt = get("double");
        let params = dt.parse_params("p", &[Param::new("maxExclusive", "1e3")]).unwrap();
        assert_eq!(dt.disallows("-INF", &params, None), None);
        assert_eq!(dt.disallows("999.9", &params, None), None);
        assert_eq!(
            messages(dt.disallows("1000", &params, None)),
            vec!["value must be less than 1000"]
        );
        assert_eq!(
            messages(dt.disallows("inf", &params, None)),
            vec!["not a valid double"]
        );
        let nan = dt.parse_value("p", "NaN", None).unwrap();
        assert!(dt.equal("NaN", &nan, None));
    }

    #[test]
    fn dates() {
        let dt = get("date");
        let p = ParsedParams::default();
        assert_eq!(dt.disallows("2024-02-29", &p, None), None);
        assert_eq!(dt.disallows("2024-02-29Z", &p, None), None);
        assert_eq!(
            messages(dt.disallows("2023-02-29", &p, None)),
            vec!["not a valid date"]
        );
        let dt = get("dateTime");
        assert_eq!(dt.disallows("2001-10-26T21:32:52+02:00", &p, None), None);
        assert_eq!(dt.disallows("2001-10-26T24:00:00", &p, None), None);
        assert!(dt.disallows("2001-10-26T24:00:01", &p, None).is_some());
        assert!(dt.disallows("2001-10-26T21:32:52+15:00", &p, None).is_some());
        assert_eq!(get("gMonthDay").disallows("--02-29", &p, None), None);
        assert!(get("gMonth").disallows("--13", &p, None).is_some());
        assert_eq!(get("gDay").disallows("---31", &p, None), None);
        assert_eq!(get("duration").disallows("P1Y2MT3H", &p, None), None);
        assert!(get("duration").disallows("P", &p, None).is_some());
        assert!(get("duration").disallows("P1T", &p, None).is_some());
    }

    #[test]
    fn token_values_compare_collapsed() {
        let dt = get("token");
        let v = dt.parse_value("p", " a  b ", None).unwrap();
        assert!(dt.equal("a\nb", &v, None));
        assert!(!dt.equal("ab", &v, None));
    }

    #[test]
    fn list_lengths_count_items() {
        let dt = get("NMTOKENS");
        let params = dt.parse_params("p", &[Param::new("maxLength", "2")]).unwrap();
        assert_eq!(dt.disallows(" a  b ", &params, None), None);
        assert!(dt.disallows("a b c", &params, None).is_some());
    }

    #[test]
    fn binary_lengths() {
        assert_eq!(get("hexBinary").value_length("0FB7"), 2);
        assert_eq!(get("base64Binary").value_length("AQID"), 3);
        assert_eq!(get("base64Binary").value_length("AQ=="), 1);
        let p = ParsedParams::default();
        assert!(get("base64Binary").disallows("AQ=", &p, None).is_some());
        let hex = get("hexBinary");
        let v = hex.parse_value("p", "0fb7", None).unwrap();
        assert!(hex.equal("0FB7", &v, None));
    }

    #[test]
    fn qname_needs_context() {
        let dt = get("QName");
        assert!(dt.needs_context());
        let ns = StaticNamespaces::new("urn:default").bind("x", "urn:x");
        let v = dt.parse_value("p", "x:foo", Some(&ns)).unwrap();
        assert_matches!(&v, ParsedValue::QName { ns, local } if ns == "urn:x" && local == "foo");

        let other = StaticNamespaces::new("").bind("y", "urn:x");
        assert!(dt.equal("y:foo", &v, Some(&other)));
        assert!(!dt.equal("foo", &v, Some(&other)));
        assert_eq!(
            messages(dt.disallows("z:foo", &ParsedParams::default(), Some(&other))),
            vec!["cannot resolve the name z:foo"]
        );
    }

    #[test]
    fn booleans() {
        let dt = get("boolean");
        let v = dt.parse_value("p", "true", None).unwrap();
        assert!(dt.equal("1", &v, None));
        assert!(!dt.equal("0", &v, None));
        assert!(dt.disallows("yes", &ParsedParams::default(), None).is_some());
    }
}
