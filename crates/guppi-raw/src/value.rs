use crate::error::{Error, Result};

/// Rendered numeric and logical values are right-justified to this width
/// (columns 11-30 of a card).
const FIXED_VALUE_WIDTH: usize = 20;

/// String contents are padded to at least this many characters between quotes.
const MIN_STRING_LEN: usize = 8;

/// A typed GUPPI header value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Logical value (`T` or `F`).
    Logical(bool),
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
    /// Character string (content between single quotes, trailing spaces dropped).
    String(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Logical(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(String::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Split the text after a `/` separator into a comment.
///
/// One optional space after the slash is skipped and trailing spaces are
/// dropped. An empty comment is reported as `None`.
fn comment_after_slash(text: &str) -> Option<&str> {
    let text = text.strip_prefix(' ').unwrap_or(text);
    let text = text.trim_end();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Parse a quoted string starting at `field[0] == '\''`.
///
/// Doubled single quotes inside the string stand for a literal quote. Only
/// spaces or a `/` comment may follow the closing quote.
fn parse_string(field: &str) -> Result<(Value, Option<&str>)> {
    let bytes = field.as_bytes();
    let mut value = String::new();
    let mut i = 1;

    let close = loop {
        match bytes.get(i) {
            None => {
                return Err(Error::MalformedCard {
                    reason: "unterminated string value",
                })
            }
            Some(b'\'') if bytes.get(i + 1) == Some(&b'\'') => {
                value.push('\'');
                i += 2;
            }
            Some(b'\'') => break i,
            Some(&b) => {
                value.push(b as char);
                i += 1;
            }
        }
    };

    let remainder = field[close + 1..].trim_start();
    let comment = if remainder.is_empty() {
        None
    } else if let Some(rest) = remainder.strip_prefix('/') {
        comment_after_slash(rest)
    } else {
        return Err(Error::MalformedCard {
            reason: "unexpected text after string value",
        });
    };

    value.truncate(value.trim_end().len());
    Ok((Value::String(value), comment))
}

fn looks_numeric(text: &str) -> bool {
    matches!(
        text.as_bytes().first(),
        Some(b'0'..=b'9' | b'+' | b'-' | b'.')
    )
}

/// Parse a float string, accepting the `D` exponent notation.
fn parse_float_str(s: &str) -> Option<f64> {
    let normalized = s.replace(['D', 'd'], "E");
    normalized.parse::<f64>().ok()
}

/// Parse the value field of a card (the bytes after the `=` indicator).
///
/// Returns the parsed [`Value`] and an optional comment string.
pub fn parse_value(field: &str) -> Result<(Value, Option<&str>)> {
    let field = field.trim_start();
    if field.is_empty() {
        return Err(Error::MalformedCard {
            reason: "missing value after '='",
        });
    }

    if field.starts_with('\'') {
        return parse_string(field);
    }

    let (val_text, comment) = match field.find('/') {
        Some(idx) => (&field[..idx], comment_after_slash(&field[idx + 1..])),
        None => (field, None),
    };
    let val_text = val_text.trim();

    match val_text {
        "" => Err(Error::MalformedCard {
            reason: "missing value after '='",
        }),
        "T" => Ok((Value::Logical(true), comment)),
        "F" => Ok((Value::Logical(false), comment)),
        _ if !looks_numeric(val_text) => Err(Error::MalformedCard {
            reason: "unparseable value",
        }),
        _ => {
            let is_integral = !val_text.contains(['.', 'E', 'e', 'D', 'd']);
            if is_integral {
                if let Ok(n) = val_text.parse::<i64>() {
                    return Ok((Value::Integer(n), comment));
                }
            }
            parse_float_str(val_text)
                .filter(|f| f.is_finite())
                .map(|f| (Value::Float(f), comment))
                .ok_or(Error::MalformedCard {
                    reason: "unparseable value",
                })
        }
    }
}

/// Render a [`Value`] as it appears after the `= ` indicator.
///
/// Numeric and logical values are right-justified in 20 columns; strings are
/// quoted, with embedded quotes doubled and content padded to 8 characters.
pub fn format_value(value: &Value) -> Result<String> {
    match value {
        Value::Logical(b) => Ok(right_justify(if *b { "T" } else { "F" })),
        Value::Integer(n) => Ok(right_justify(&n.to_string())),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(Error::InvalidValue("non-finite float"));
            }
            Ok(right_justify(&format_float(*f)))
        }
        Value::String(s) => format_string(s),
    }
}

fn right_justify(text: &str) -> String {
    format!("{text:>width$}", width = FIXED_VALUE_WIDTH)
}

/// Shortest text that parses back to the same `f64` and is never mistaken
/// for an integer.
fn format_float(f: f64) -> String {
    // Integral floats need the `.0` or an exponent to stay floats.
    let plain = if f == f.trunc() {
        format!("{f:.1}")
    } else {
        f.to_string()
    };
    if plain.len() <= FIXED_VALUE_WIDTH {
        plain
    } else {
        format!("{f:E}")
    }
}

fn format_string(s: &str) -> Result<String> {
    if !s.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return Err(Error::InvalidValue("string is not printable ASCII"));
    }
    if s.ends_with(' ') {
        return Err(Error::InvalidValue(
            "string has trailing spaces, which decode drops",
        ));
    }
    let escaped = s.replace('\'', "''");
    Ok(format!("'{escaped:<width$}'", width = MIN_STRING_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Logical ----

    #[test]
    fn parse_logical_true() {
        let (val, comment) = parse_value("                   T").unwrap();
        assert_eq!(val, Value::Logical(true));
        assert!(comment.is_none());
    }

    #[test]
    fn parse_logical_with_comment() {
        let (val, comment) = parse_value("                   F / no directio").unwrap();
        assert_eq!(val, Value::Logical(false));
        assert_eq!(comment, Some("no directio"));
    }

    // ---- Integer ----

    #[test]
    fn parse_integer_positive() {
        let (val, _) = parse_value("           134217728").unwrap();
        assert_eq!(val, Value::Integer(134217728));
    }

    #[test]
    fn parse_integer_negative() {
        let (val, _) = parse_value("                 -99").unwrap();
        assert_eq!(val, Value::Integer(-99));
    }

    #[test]
    fn parse_integer_with_comment() {
        let (val, comment) = parse_value("                   8 / bits per sample").unwrap();
        assert_eq!(val, Value::Integer(8));
        assert_eq!(comment, Some("bits per sample"));
    }

    #[test]
    fn parse_integer_left_justified() {
        let (val, _) = parse_value("64").unwrap();
        assert_eq!(val, Value::Integer(64));
    }

    // ---- Float ----

    #[test]
    fn parse_float_simple() {
        let (val, _) = parse_value("             1420.25").unwrap();
        assert_eq!(val, Value::Float(1420.25));
    }

    #[test]
    fn parse_float_d_exponent() {
        let (val, _) = parse_value("           1.234D+05").unwrap();
        match val {
            Value::Float(f) => assert!((f - 1.234e5).abs() < 1e-5),
            other => panic!("Expected Float, got {:?}", other),
        }
    }

    #[test]
    fn parse_float_exponent_without_point() {
        let (val, _) = parse_value("                1E20").unwrap();
        assert_eq!(val, Value::Float(1e20));
    }

    #[test]
    fn integer_overflow_falls_back_to_float() {
        let (val, _) = parse_value("99999999999999999999").unwrap();
        assert!(matches!(val, Value::Float(_)));
    }

    // ---- String ----

    #[test]
    fn parse_string_simple() {
        let (val, comment) = parse_value("'ATA     '").unwrap();
        assert_eq!(val, Value::String(String::from("ATA")));
        assert!(comment.is_none());
    }

    #[test]
    fn parse_string_with_comment() {
        let (val, comment) = parse_value("'MeerKAT '           / telescope").unwrap();
        assert_eq!(val, Value::String(String::from("MeerKAT")));
        assert_eq!(comment, Some("telescope"));
    }

    #[test]
    fn parse_string_embedded_quotes() {
        let (val, _) = parse_value("'it''s ok'").unwrap();
        assert_eq!(val, Value::String(String::from("it's ok")));
    }

    #[test]
    fn parse_string_keeps_slash_inside_quotes() {
        let (val, comment) = parse_value("'a/b     '").unwrap();
        assert_eq!(val, Value::String(String::from("a/b")));
        assert!(comment.is_none());
    }

    #[test]
    fn parse_string_empty() {
        let (val, _) = parse_value("'        '").unwrap();
        assert_eq!(val, Value::String(String::new()));
    }

    // ---- Malformed ----

    #[test]
    fn unterminated_string_is_malformed() {
        assert!(matches!(
            parse_value("'never closed"),
            Err(Error::MalformedCard { .. })
        ));
    }

    #[test]
    fn text_after_string_is_malformed() {
        assert!(matches!(
            parse_value("'abc' junk"),
            Err(Error::MalformedCard { .. })
        ));
    }

    #[test]
    fn bare_word_is_malformed() {
        assert!(matches!(
            parse_value("      hello"),
            Err(Error::MalformedCard { .. })
        ));
        assert!(matches!(parse_value("inf"), Err(Error::MalformedCard { .. })));
    }

    #[test]
    fn empty_value_is_malformed() {
        assert!(matches!(
            parse_value("          "),
            Err(Error::MalformedCard { .. })
        ));
        assert!(matches!(
            parse_value("          / only a comment"),
            Err(Error::MalformedCard { .. })
        ));
    }

    // ---- Formatting ----

    #[test]
    fn format_integer_right_justified() {
        let s = format_value(&Value::Integer(42)).unwrap();
        assert_eq!(s.len(), 20);
        assert!(s.ends_with("42"));
    }

    #[test]
    fn format_logical_in_column_thirty() {
        let s = format_value(&Value::Logical(true)).unwrap();
        assert_eq!(s.len(), 20);
        assert_eq!(s.as_bytes()[19], b'T');
    }

    #[test]
    fn format_integral_float_keeps_point() {
        assert_eq!(format_value(&Value::Float(1500.0)).unwrap().trim(), "1500.0");
    }

    #[test]
    fn format_large_float_uses_exponent() {
        let s = format_value(&Value::Float(1.5e300)).unwrap();
        assert_eq!(s.trim(), "1.5E300");
    }

    #[test]
    fn format_non_finite_float_fails() {
        assert!(matches!(
            format_value(&Value::Float(f64::NAN)),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn format_string_pads_and_escapes() {
        assert_eq!(format_value(&Value::from("AB")).unwrap(), "'AB      '");
        assert_eq!(format_value(&Value::from("it's")).unwrap(), "'it''s   '");
    }

    #[test]
    fn format_string_rejects_non_ascii() {
        assert!(matches!(
            format_value(&Value::from("µs")),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn float_format_parses_back() {
        for f in [0.0, -0.0, 1.5, -2.25e-7, 1420.405751786, 6.02214076e23, 1e-300] {
            let text = format_value(&Value::Float(f)).unwrap();
            let (val, _) = parse_value(&text).unwrap();
            assert_eq!(val, Value::Float(f), "round trip of {text}");
        }
    }

    #[test]
    fn large_integral_floats_stay_floats() {
        for f in [1e16, 1.5e16, 9.2e18, -1e17, 1e300, 1e-300] {
            let text = format_value(&Value::Float(f)).unwrap();
            assert!(text.contains(['.', 'E']), "no float marker in {text}");
            let (val, _) = parse_value(&text).unwrap();
            assert_eq!(val, Value::Float(f), "round trip of {text}");
        }
        assert_eq!(format_value(&Value::Float(1e16)).unwrap().trim(), "10000000000000000.0");
        assert_eq!(format_value(&Value::Float(9.2e18)).unwrap().trim(), "9.2E18");
    }

    #[test]
    fn format_string_rejects_trailing_spaces() {
        assert!(matches!(
            format_value(&Value::from("abc ")),
            Err(Error::InvalidValue(_))
        ));
        assert_eq!(format_value(&Value::from(" abc")).unwrap(), "' abc    '");
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::Integer(3).as_int(), Some(3));
        assert_eq!(Value::Integer(3).as_float(), Some(3.0));
        assert_eq!(Value::Float(0.5).as_int(), None);
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::Logical(true).as_bool(), Some(true));
    }
}
