//! Header value parsing and formatting.

use std::str;

/// A parsed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Logical value (`T` or `F`).
    Logical(bool),
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
    /// Character string (content between single quotes).
    String(String),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Logical(b)
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

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Split a non-string value field at the comment separator.
///
/// Returns `(value_part, optional_comment)`. The standard separator is
/// ` / ` but files written by older tools omit the trailing space, so a
/// bare ` /` is accepted too.
fn split_comment(field: &[u8]) -> (&[u8], Option<&str>) {
    let len = field.len();
    let mut i = 0;
    while i + 1 < len {
        if field[i] == b' ' && field[i + 1] == b'/' {
            let value_part = &field[..i];
            let mut comment_start = i + 2;
            if comment_start < len && field[comment_start] == b' ' {
                comment_start += 1;
            }
            let comment = str::from_utf8(&field[comment_start..])
                .ok()
                .map(|s| s.trim_end());
            return (value_part, comment.filter(|s| !s.is_empty()));
        }
        i += 1;
    }
    (field, None)
}

/// Parse a character-string value from the value field.
///
/// String values begin with `'` at the first byte; a doubled `''` inside
/// the string is a literal quote. Everything after the closing quote is
/// whitespace or a ` /` comment separator followed by the comment.
fn parse_string(field: &[u8]) -> Option<(Value, Option<&str>)> {
    if field.is_empty() || field[0] != b'\'' {
        return None;
    }

    let mut value = String::new();
    let mut i = 1;
    let len = field.len();

    loop {
        if i >= len {
            // Unterminated string, accept what we have.
            break;
        }
        if field[i] == b'\'' {
            if i + 1 < len && field[i + 1] == b'\'' {
                value.push('\'');
                i += 2;
            } else {
                i += 1;
                break;
            }
        } else {
            value.push(field[i] as char);
            i += 1;
        }
    }

    // Strings are space-padded to a minimum width on disk.
    let trimmed = value.trim_end().to_string();
    let (_, comment) = split_comment(&field[i..]);

    Some((Value::String(trimmed), comment))
}

/// Parse a float string, handling the `D` exponent notation used for
/// double-precision values.
fn parse_float_str(s: &str) -> Option<f64> {
    let normalized = s.replace(['D', 'd'], "E");
    normalized.parse::<f64>().ok()
}

/// Parse a header value from the 70-byte value portion of an 80-byte card
/// (bytes 10..80).
///
/// Returns the parsed [`Value`] and an optional comment. The caller must
/// have checked that bytes 8..10 of the card are the `= ` value indicator.
pub fn parse_value(value_bytes: &[u8]) -> Option<(Value, Option<&str>)> {
    if value_bytes.is_empty() {
        return None;
    }

    if value_bytes[0] == b'\'' {
        return parse_string(value_bytes);
    }

    let (val_part, comment) = split_comment(value_bytes);
    let val_text = str::from_utf8(val_part).ok()?.trim();
    if val_text.is_empty() {
        return None;
    }

    if val_text == "T" {
        return Some((Value::Logical(true), comment));
    }
    if val_text == "F" {
        return Some((Value::Logical(false), comment));
    }

    // Integer: no decimal point or exponent characters.
    if !val_text.contains(['.', 'E', 'e', 'D', 'd']) {
        if let Ok(n) = val_text.parse::<i64>() {
            return Some((Value::Integer(n), comment));
        }
    }

    if let Some(f) = parse_float_str(val_text) {
        return Some((Value::Float(f), comment));
    }

    None
}

/// Serialize a [`Value`] into a 70-byte field suitable for bytes 10..80 of
/// an 80-byte card.
///
/// Numeric and logical values are right-justified in the first 20 bytes
/// (columns 11-30 of the card). String values start at byte 0 with a
/// single quote.
pub fn format_value(value: &Value) -> [u8; 70] {
    let mut buf = [b' '; 70];

    match value {
        Value::Logical(b) => {
            buf[19] = if *b { b'T' } else { b'F' };
        }
        Value::Integer(n) => {
            right_justify(format!("{}", n).as_bytes(), &mut buf[..20]);
        }
        Value::Float(f) => {
            right_justify(format_float(*f).as_bytes(), &mut buf[..20]);
        }
        Value::String(s) => {
            write_string(s, &mut buf);
        }
    }

    buf
}

/// Right-justify `src` within `dest`, padding the left with spaces.
fn right_justify(src: &[u8], dest: &mut [u8]) {
    let len = src.len().min(dest.len());
    let start = dest.len() - len;
    for b in dest.iter_mut() {
        *b = b' ';
    }
    dest[start..start + len].copy_from_slice(&src[..len]);
}

fn format_float(f: f64) -> String {
    if f == 0.0 {
        return String::from("0.0");
    }
    // Start with full precision and reduce until the result fits.
    let mut precision = 15usize;
    loop {
        let s = format!("{:.prec$E}", f, prec = precision);
        if s.len() <= 20 || precision == 0 {
            return s;
        }
        precision -= 1;
    }
}

fn write_string(s: &str, buf: &mut [u8; 70]) {
    let mut pos = 0;
    buf[pos] = b'\'';
    pos += 1;

    for ch in s.bytes() {
        if pos >= 69 {
            break; // Leave room for the closing quote.
        }
        if ch == b'\'' {
            if pos + 1 >= 69 {
                break;
            }
            buf[pos] = b'\'';
            buf[pos + 1] = b'\'';
            pos += 2;
        } else {
            buf[pos] = ch;
            pos += 1;
        }
    }

    // Pad to a minimum of 8 characters between the quotes.
    while pos < 9 {
        buf[pos] = b' ';
        pos += 1;
    }

    if pos < 70 {
        buf[pos] = b'\'';
    }
}
