//! Single-card codec: one 80-byte keyword record to and from a [`Card`].

use core::fmt;
use core::str;

use crate::block::CARD_SIZE;
use crate::error::{Error, Result};
use crate::value::{format_value, parse_value, Value};

/// Width of the keyword field (columns 1-8).
pub const KEYWORD_LEN: usize = 8;

const END_KEYWORD: &str = "END";

/// A parsed GUPPI header card (one 80-byte keyword record).
///
/// Cards decoded from bytes remember their raw image and re-encode to it
/// exactly. Cards built in memory are rendered on encode.
///
/// Quoted strings decode with trailing spaces removed, so a string value
/// ending in a space is refused at encode time.
#[derive(Clone)]
pub struct Card {
    keyword: String,
    value: Option<Value>,
    comment: Option<String>,
    raw: Option<[u8; CARD_SIZE]>,
}

impl Card {
    /// Create a keyword/value card. The keyword is upper-cased.
    pub fn new(keyword: &str, value: impl Into<Value>) -> Self {
        Card {
            keyword: keyword.to_ascii_uppercase(),
            value: Some(value.into()),
            comment: None,
            raw: None,
        }
    }

    /// Create a commentary card carrying free text and no value.
    pub fn commentary(keyword: &str, text: &str) -> Self {
        Card {
            keyword: keyword.to_ascii_uppercase(),
            value: None,
            comment: non_empty(text),
            raw: None,
        }
    }

    /// Attach a trailing ` / comment`.
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = non_empty(comment);
        self.raw = None;
        self
    }

    /// The terminator card.
    pub fn end() -> Self {
        Card {
            keyword: String::from(END_KEYWORD),
            value: None,
            comment: None,
            raw: Some(end_card()),
        }
    }

    /// The trimmed, upper-case keyword.
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// The 80-byte image this card was decoded from, if any.
    pub fn raw(&self) -> Option<&[u8; CARD_SIZE]> {
        self.raw.as_ref()
    }

    /// Returns `true` if this card is the END terminator (`END` and 77 spaces).
    pub fn is_end(&self) -> bool {
        self.raw == Some(end_card())
    }

    /// Returns `true` if the keyword field is all spaces.
    pub fn is_blank(&self) -> bool {
        self.keyword.is_empty()
    }
}

impl PartialEq for Card {
    /// Cards compare by keyword, value and comment; the raw image is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.keyword == other.keyword && self.value == other.value && self.comment == other.comment
    }
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Card")
            .field("keyword", &self.keyword)
            .field("value", &self.value)
            .field("comment", &self.comment)
            .finish()
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim_end();
    if text.is_empty() {
        None
    } else {
        Some(String::from(text))
    }
}

fn is_keyword_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Validate and normalise the keyword field (columns 1-8).
fn decode_keyword(field: &[u8]) -> Result<String> {
    let end = field
        .iter()
        .rposition(|&b| b != b' ')
        .map(|i| i + 1)
        .unwrap_or(0);
    let significant = &field[..end];

    if significant.contains(&b' ') {
        return Err(Error::MalformedCard {
            reason: "embedded space in keyword",
        });
    }
    if !significant.iter().all(|&b| is_keyword_byte(b)) {
        return Err(Error::MalformedCard {
            reason: "illegal character in keyword",
        });
    }

    // ASCII was checked above, so this cannot fail.
    let keyword = str::from_utf8(significant).map_err(|_| Error::MalformedCard {
        reason: "non-ASCII byte",
    })?;
    Ok(keyword.to_ascii_uppercase())
}

/// Parse a single 80-byte GUPPI header card.
///
/// Columns 1-8 hold the keyword. A `=` in column 9 introduces a typed value
/// with an optional ` / comment`; otherwise columns 9-80 are commentary text.
pub fn decode_card(card_bytes: &[u8; CARD_SIZE]) -> Result<Card> {
    if !card_bytes.iter().all(|&b| (0x20..0x7f).contains(&b)) {
        return Err(Error::MalformedCard {
            reason: "non-printable or non-ASCII byte",
        });
    }

    let keyword = decode_keyword(&card_bytes[..KEYWORD_LEN])?;
    if keyword == END_KEYWORD && *card_bytes != end_card() {
        return Err(Error::MalformedCard {
            reason: "END keyword followed by text",
        });
    }
    // Every byte is printable ASCII.
    let text = str::from_utf8(&card_bytes[KEYWORD_LEN..]).map_err(|_| Error::MalformedCard {
        reason: "non-ASCII byte",
    })?;

    let (value, comment) = match text.strip_prefix('=') {
        Some(field) => {
            let (value, comment) = parse_value(field)?;
            (Some(value), comment.map(String::from))
        }
        _ => (None, non_empty(text)),
    };

    Ok(Card {
        keyword,
        value,
        comment,
        raw: Some(*card_bytes),
    })
}

/// Check that `keyword` fits the 8-column field and uses legal characters.
fn validate_keyword(keyword: &str) -> Result<()> {
    if keyword.len() > KEYWORD_LEN {
        return Err(Error::FieldTooLong {
            field: "keyword",
            len: keyword.len(),
            max: KEYWORD_LEN,
        });
    }
    if !keyword.bytes().all(is_keyword_byte) || keyword.eq_ignore_ascii_case(END_KEYWORD) {
        return Err(Error::InvalidKeyword(String::from(keyword)));
    }
    Ok(())
}

/// Serialize a [`Card`] into an 80-byte card image.
///
/// Cards that still carry their decoded raw image re-emit it unchanged.
pub fn encode_card(card: &Card) -> Result<[u8; CARD_SIZE]> {
    if let Some(raw) = card.raw {
        return Ok(raw);
    }

    validate_keyword(&card.keyword)?;

    let mut text = format!("{:<width$}", card.keyword, width = KEYWORD_LEN);
    match (&card.value, &card.comment) {
        (Some(value), comment) => {
            text.push_str("= ");
            text.push_str(&format_value(value)?);
            if let Some(comment) = comment {
                text.push_str(" / ");
                text.push_str(comment);
            }
        }
        (None, Some(comment)) => {
            if comment.starts_with('=') {
                return Err(Error::InvalidValue(
                    "commentary text would read as a value indicator",
                ));
            }
            text.push_str(comment);
        }
        (None, None) => {}
    }

    if !text.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return Err(Error::InvalidValue("card text is not printable ASCII"));
    }
    if text.len() > CARD_SIZE {
        return Err(Error::FieldTooLong {
            field: "card",
            len: text.len(),
            max: CARD_SIZE,
        });
    }

    let mut buf = [b' '; CARD_SIZE];
    buf[..text.len()].copy_from_slice(text.as_bytes());
    Ok(buf)
}

/// Create the END terminator card: `END` followed by 77 spaces.
pub fn end_card() -> [u8; CARD_SIZE] {
    let mut buf = [b' '; CARD_SIZE];
    buf[..END_KEYWORD.len()].copy_from_slice(END_KEYWORD.as_bytes());
    buf
}
