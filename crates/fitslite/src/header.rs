//! Header card parsing, writing, and the ordered keyword map.

use std::str;

use crate::block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
use crate::error::{Error, Result};
use crate::value::{format_value, parse_value, Value};

// ── Cards ──

/// A parsed header card (one 80-byte keyword record).
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// The 8-byte keyword name, ASCII, left-justified, space-padded.
    pub keyword: [u8; 8],
    /// The parsed value, if this card has a value indicator (`= ` in bytes 8..10).
    pub value: Option<Value>,
    /// An optional comment string.
    pub comment: Option<String>,
}

impl Card {
    /// Return the keyword as a trimmed UTF-8 string.
    pub fn keyword_str(&self) -> &str {
        let end = self
            .keyword
            .iter()
            .rposition(|&b| b != b' ')
            .map(|i| i + 1)
            .unwrap_or(0);
        str::from_utf8(&self.keyword[..end]).unwrap_or("")
    }

    /// Returns `true` if this card is the END keyword.
    pub fn is_end(&self) -> bool {
        &self.keyword == b"END     "
    }

    /// Returns `true` if this is a blank card (keyword is all spaces).
    pub fn is_blank(&self) -> bool {
        self.keyword.iter().all(|&b| b == b' ')
    }

    /// Returns `true` if this card carries a commentary keyword
    /// (COMMENT, HISTORY, or blank).
    pub fn is_commentary(&self) -> bool {
        let kw = self.keyword_str();
        kw == "COMMENT" || kw == "HISTORY" || self.is_blank()
    }
}

/// The two reserved commentary keywords whose records append instead of
/// overwriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commentary {
    History,
    Comment,
}

impl Commentary {
    fn keyword(self) -> [u8; 8] {
        match self {
            Commentary::History => *b"HISTORY ",
            Commentary::Comment => *b"COMMENT ",
        }
    }
}

/// Normalize a keyword name to its 8-byte uppercase on-disk form.
///
/// Lookup and mutation are case-insensitive, so lowercase input is folded
/// to uppercase here. Names longer than 8 bytes or containing characters
/// outside `[A-Z0-9_-]` are rejected.
pub fn normalize_keyword(name: &str) -> Result<[u8; 8]> {
    if name.len() > 8 {
        return Err(Error::format(format!(
            "keyword longer than 8 characters: {:?}",
            name
        )));
    }
    let mut kw = [b' '; 8];
    for (i, b) in name.bytes().enumerate() {
        let up = b.to_ascii_uppercase();
        match up {
            b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => kw[i] = up,
            _ => {
                return Err(Error::format(format!(
                    "invalid character in keyword {:?}",
                    name
                )))
            }
        }
    }
    Ok(kw)
}

fn is_commentary_keyword(keyword: &[u8; 8]) -> bool {
    keyword == b"COMMENT " || keyword == b"HISTORY " || keyword == b"        "
}

/// Parse a single 80-byte header card.
pub fn parse_card(card_bytes: &[u8; CARD_SIZE]) -> Result<Card> {
    let mut keyword = [b' '; 8];
    keyword.copy_from_slice(&card_bytes[..8]);

    for &b in &keyword {
        match b {
            b'A'..=b'Z' | b'0'..=b'9' | b' ' | b'-' | b'_' => {}
            _ => return Err(Error::format("invalid keyword name in card")),
        }
    }

    if &keyword == b"END     " {
        return Ok(Card {
            keyword,
            value: None,
            comment: None,
        });
    }

    // Cards with a value indicator but no parsable value (undefined values)
    // may still carry a ` / comment`.
    if !is_commentary_keyword(&keyword) && card_bytes[8] == b'=' && card_bytes[9] == b' ' {
        let value_field = &card_bytes[10..CARD_SIZE];
        if let Some((val, comment)) = parse_value(value_field) {
            return Ok(Card {
                keyword,
                value: Some(val),
                comment: comment.map(String::from),
            });
        }
        let field = str::from_utf8(value_field)
            .map_err(|_| Error::format("non-UTF8 bytes in header card"))?;
        return Ok(Card {
            keyword,
            value: None,
            comment: extract_trailing_comment(field),
        });
    }

    // Commentary and value-less cards carry free-form text in bytes 8..80.
    let text = str::from_utf8(&card_bytes[8..CARD_SIZE])
        .map_err(|_| Error::format("non-UTF8 bytes in header card"))?
        .trim_end();
    let comment = if text.is_empty() {
        None
    } else {
        Some(String::from(text))
    };
    Ok(Card {
        keyword,
        value: None,
        comment,
    })
}

/// Extract a ` / comment` from an otherwise-empty value field.
fn extract_trailing_comment(field: &str) -> Option<String> {
    let idx = field.find(" /")?;
    let after_slash = idx + 2;
    let start = if field.as_bytes().get(after_slash) == Some(&b' ') {
        after_slash + 1
    } else {
        after_slash
    };
    let comment = field[start..].trim_end();
    if comment.is_empty() {
        None
    } else {
        Some(String::from(comment))
    }
}

/// Parse consecutive 2880-byte header blocks until the END card is found.
///
/// The returned cards do not include the END card. Only complete blocks are
/// scanned; trailing bytes shorter than a block are ignored.
pub fn parse_header_blocks(data: &[u8]) -> Result<Vec<Card>> {
    if data.len() < BLOCK_SIZE {
        return Err(Error::UnexpectedEof);
    }

    let mut cards = Vec::new();
    let num_blocks = data.len() / BLOCK_SIZE;

    for block_idx in 0..num_blocks {
        let block_start = block_idx * BLOCK_SIZE;
        for card_idx in 0..CARDS_PER_BLOCK {
            let card_start = block_start + card_idx * CARD_SIZE;
            let card_bytes: &[u8; CARD_SIZE] = data[card_start..card_start + CARD_SIZE]
                .try_into()
                .map_err(|_| Error::format("short header card"))?;

            let card = parse_card(card_bytes)?;
            if card.is_end() {
                return Ok(cards);
            }
            cards.push(card);
        }
    }

    Err(Error::UnexpectedEof)
}

/// Return the number of bytes consumed by the header (always a multiple of
/// [`BLOCK_SIZE`]), scanning complete blocks for the END card.
pub fn header_byte_len(data: &[u8]) -> Result<usize> {
    if data.len() < BLOCK_SIZE {
        return Err(Error::UnexpectedEof);
    }

    let num_blocks = data.len() / BLOCK_SIZE;

    for block_idx in 0..num_blocks {
        let block_start = block_idx * BLOCK_SIZE;
        for card_idx in 0..CARDS_PER_BLOCK {
            let card_start = block_start + card_idx * CARD_SIZE;
            if &data[card_start..card_start + 8] == b"END     " {
                return Ok((block_idx + 1) * BLOCK_SIZE);
            }
        }
    }

    Err(Error::UnexpectedEof)
}

/// Serialize a [`Card`] into an 80-byte card image.
pub fn format_card(card: &Card) -> [u8; CARD_SIZE] {
    let mut buf = [b' '; CARD_SIZE];
    buf[..8].copy_from_slice(&card.keyword);

    if let Some(ref value) = card.value {
        buf[8] = b'=';
        buf[9] = b' ';

        let mut field = format_value(value);
        if let Some(ref comment) = card.comment {
            insert_comment(&mut field, comment);
        }
        buf[10..80].copy_from_slice(&field);
    } else if !card.is_blank() {
        if let Some(ref comment) = card.comment {
            let bytes = comment.as_bytes();
            let len = bytes.len().min(72);
            buf[8..8 + len].copy_from_slice(&bytes[..len]);
        }
    }

    buf
}

/// Insert a ` / comment` string into a 70-byte value field.
fn insert_comment(field: &mut [u8; 70], comment: &str) {
    let content_end = if field[0] == b'\'' {
        let mut i = 1;
        loop {
            if i >= 70 {
                break i;
            }
            if field[i] == b'\'' {
                if i + 1 < 70 && field[i + 1] == b'\'' {
                    i += 2;
                } else {
                    break i + 1;
                }
            } else {
                i += 1;
            }
        }
    } else {
        20
    };

    let sep_start = content_end + 1;
    if sep_start + 3 >= 70 {
        return;
    }

    field[sep_start] = b'/';
    field[sep_start + 1] = b' ';

    let comment_start = sep_start + 2;
    let comment_bytes = comment.as_bytes();
    let len = comment_bytes.len().min(70 - comment_start);
    field[comment_start..comment_start + len].copy_from_slice(&comment_bytes[..len]);
}

/// Create the standard END card.
pub fn format_end_card() -> [u8; CARD_SIZE] {
    let mut buf = [b' '; CARD_SIZE];
    buf[..3].copy_from_slice(b"END");
    buf
}

/// Serialize a sequence of header cards into complete header blocks.
///
/// Appends the END card and pads the final block with blank cards. The
/// returned length is always a multiple of [`BLOCK_SIZE`].
pub fn serialize_cards(cards: &[Card]) -> Vec<u8> {
    let total_cards = cards.len() + 1; // +1 for END
    let total_blocks = total_cards.div_ceil(CARDS_PER_BLOCK);
    let mut buf = vec![b' '; total_blocks * BLOCK_SIZE];

    for (i, card) in cards.iter().enumerate() {
        let offset = i * CARD_SIZE;
        buf[offset..offset + CARD_SIZE].copy_from_slice(&format_card(card));
    }

    let end_offset = cards.len() * CARD_SIZE;
    buf[end_offset..end_offset + CARD_SIZE].copy_from_slice(&format_end_card());

    buf
}

// ── Header ──

/// An ordered sequence of header cards with keyword-addressed access.
///
/// Keyword lookup is case-insensitive; insertion order is preserved for
/// serialization. Ordinary keywords hold at most one record and `set`
/// overwrites in place; the HISTORY and COMMENT keywords are append-only
/// and may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    /// Create an empty header.
    pub fn new() -> Self {
        Header { cards: Vec::new() }
    }

    /// Build a header from already-parsed cards, dropping any END card.
    pub fn from_cards(cards: Vec<Card>) -> Self {
        Header {
            cards: cards.into_iter().filter(|c| !c.is_end()).collect(),
        }
    }

    /// Parse a header from raw block data (up to and excluding END).
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(Header::from_cards(parse_header_blocks(data)?))
    }

    /// All cards in insertion order.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Number of cards (END excluded).
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Returns `true` if the header holds no cards.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    fn position(&self, keyword: &[u8; 8]) -> Option<usize> {
        self.cards.iter().position(|c| &c.keyword == keyword)
    }

    /// The first card for `keyword`, if any. Case-insensitive.
    pub fn card(&self, keyword: &str) -> Option<&Card> {
        let kw = normalize_keyword(keyword).ok()?;
        self.position(&kw).map(|i| &self.cards[i])
    }

    /// Returns `true` if a card with `keyword` exists.
    pub fn contains(&self, keyword: &str) -> bool {
        self.card(keyword).is_some()
    }

    /// Look up the value for `keyword`.
    ///
    /// Fails with [`Error::Lookup`] if the keyword is absent or its card
    /// carries no value (commentary records).
    pub fn value(&self, keyword: &str) -> Result<&Value> {
        self.card(keyword)
            .and_then(|c| c.value.as_ref())
            .ok_or_else(|| Error::lookup(format!("keyword {:?} not found", keyword)))
    }

    /// Set `keyword` to `value`.
    ///
    /// Creates the card at the end of the header if absent; otherwise
    /// overwrites the value in place, preserving the card's position. The
    /// existing comment is kept unless a new one is supplied. Commentary
    /// keywords are rejected; use [`Header::append_commentary`].
    ///
    /// On any failure the header is left unchanged.
    pub fn set(&mut self, keyword: &str, value: impl Into<Value>, comment: Option<&str>) -> Result<()> {
        let kw = normalize_keyword(keyword)?;
        if is_commentary_keyword(&kw) {
            return Err(Error::format(format!(
                "{:?} records are append-only",
                keyword
            )));
        }

        match self.position(&kw) {
            Some(i) => {
                let card = &mut self.cards[i];
                card.value = Some(value.into());
                if let Some(c) = comment {
                    card.comment = Some(c.to_string());
                }
            }
            None => self.cards.push(Card {
                keyword: kw,
                value: Some(value.into()),
                comment: comment.map(String::from),
            }),
        }
        Ok(())
    }

    /// Remove the first card matching `keyword`.
    ///
    /// Fails with [`Error::Lookup`] if no card matches, leaving the header
    /// unchanged.
    pub fn delete(&mut self, keyword: &str) -> Result<()> {
        let kw = normalize_keyword(keyword)?;
        match self.position(&kw) {
            Some(i) => {
                self.cards.remove(i);
                Ok(())
            }
            None => Err(Error::lookup(format!("keyword {:?} not found", keyword))),
        }
    }

    /// Append a HISTORY or COMMENT record. Always adds a new card, never
    /// overwrites, regardless of duplicate text.
    pub fn append_commentary(&mut self, kind: Commentary, text: &str) {
        self.cards.push(Card {
            keyword: kind.keyword(),
            value: None,
            comment: Some(text.to_string()),
        });
    }

    fn commentary_texts(&self, keyword: [u8; 8]) -> impl Iterator<Item = &str> {
        self.cards
            .iter()
            .filter(move |c| c.keyword == keyword)
            .map(|c| c.comment.as_deref().unwrap_or(""))
    }

    /// All HISTORY record texts in order.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.commentary_texts(*b"HISTORY ")
    }

    /// All COMMENT record texts in order.
    pub fn comments(&self) -> impl Iterator<Item = &str> {
        self.commentary_texts(*b"COMMENT ")
    }

    /// Typed getter: integer value for `keyword`, if present.
    pub fn integer(&self, keyword: &str) -> Option<i64> {
        match self.card(keyword)?.value.as_ref()? {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Typed getter: float value for `keyword` (integers coerce), if present.
    pub fn float(&self, keyword: &str) -> Option<f64> {
        match self.card(keyword)?.value.as_ref()? {
            Value::Float(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Typed getter: trimmed string value for `keyword`, if present.
    pub fn string(&self, keyword: &str) -> Option<String> {
        match self.card(keyword)?.value.as_ref()? {
            Value::String(s) => Some(s.trim().to_string()),
            _ => None,
        }
    }

    /// Typed getter: logical value for `keyword`, if present.
    pub fn logical(&self, keyword: &str) -> Option<bool> {
        match self.card(keyword)?.value.as_ref()? {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }

    /// Serialize into complete header blocks, END card included.
    pub fn serialize(&self) -> Vec<u8> {
        serialize_cards(&self.cards)
    }
}

// ── Tests ──

#[cfg(test)]
mod card_tests {
    use super::*;

    fn make_card(s: &str) -> [u8; CARD_SIZE] {
        let mut buf = [b' '; CARD_SIZE];
        let bytes = s.as_bytes();
        let len = bytes.len().min(CARD_SIZE);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    #[test]
    fn parse_card_string_value() {
        let c = parse_card(&make_card("TELESCOP= 'Hubble  '           / telescope name")).unwrap();
        assert_eq!(c.keyword_str(), "TELESCOP");
        assert_eq!(c.value, Some(Value::String(String::from("Hubble"))));
        assert_eq!(c.comment, Some(String::from("telescope name")));
    }

    #[test]
    fn parse_card_integer_value() {
        let c = parse_card(&make_card("BITPIX  =                    16 / bits per pixel")).unwrap();
        assert_eq!(c.value, Some(Value::Integer(16)));
        assert_eq!(c.comment, Some(String::from("bits per pixel")));
    }

    #[test]
    fn parse_card_logical() {
        let c = parse_card(&make_card("SIMPLE  =                    T")).unwrap();
        assert_eq!(c.value, Some(Value::Logical(true)));
    }

    #[test]
    fn parse_card_comment_keyword() {
        let c = parse_card(&make_card("COMMENT This is a comment.")).unwrap();
        assert_eq!(c.keyword_str(), "COMMENT");
        assert!(c.value.is_none());
        assert_eq!(c.comment, Some(String::from("This is a comment.")));
        assert!(c.is_commentary());
    }

    #[test]
    fn parse_card_history_keyword() {
        let c = parse_card(&make_card("HISTORY pass 1 complete")).unwrap();
        assert_eq!(c.keyword_str(), "HISTORY");
        assert!(c.is_commentary());
    }

    #[test]
    fn parse_card_blank_keyword() {
        let c = parse_card(&[b' '; CARD_SIZE]).unwrap();
        assert!(c.is_blank());
        assert!(c.comment.is_none());
    }

    #[test]
    fn parse_card_end() {
        assert!(parse_card(&make_card("END")).unwrap().is_end());
    }

    #[test]
    fn parse_card_lowercase_keyword_fails() {
        assert!(parse_card(&make_card("bitpix  =                   16")).is_err());
    }

    #[test]
    fn parse_card_hyphen_keyword() {
        let c = parse_card(&make_card("DATE-OBS= '2024-01-15'")).unwrap();
        assert_eq!(c.keyword_str(), "DATE-OBS");
    }

    #[test]
    fn parse_card_empty_value_with_comment() {
        let c = parse_card(&make_card("BLANK   =                      / undefined")).unwrap();
        assert!(c.value.is_none());
        assert_eq!(c.comment.as_deref(), Some("undefined"));
    }

    #[test]
    fn parse_blocks_simple() {
        let mut block = vec![b' '; BLOCK_SIZE];
        for (i, s) in [
            "SIMPLE  =                    T / conforms",
            "BITPIX  =                   16",
            "NAXIS   =                    0",
            "END",
        ]
        .iter()
        .enumerate()
        {
            block[i * CARD_SIZE..i * CARD_SIZE + CARD_SIZE].copy_from_slice(&make_card(s));
        }
        let cards = parse_header_blocks(&block).unwrap();
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].keyword_str(), "SIMPLE");
    }

    #[test]
    fn parse_blocks_no_end_card() {
        let mut block = vec![b' '; BLOCK_SIZE];
        block[..CARD_SIZE].copy_from_slice(&make_card("SIMPLE  =                    T"));
        assert!(matches!(
            parse_header_blocks(&block),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn parse_blocks_too_small() {
        assert!(matches!(
            parse_header_blocks(&[b' '; 100]),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn header_byte_len_one_block() {
        let mut block = vec![b' '; BLOCK_SIZE];
        block[..CARD_SIZE].copy_from_slice(&make_card("END"));
        assert_eq!(header_byte_len(&block).unwrap(), BLOCK_SIZE);
    }

    #[test]
    fn format_card_is_80_bytes_with_indicator() {
        let card = Card {
            keyword: normalize_keyword("NAXIS").unwrap(),
            value: Some(Value::Integer(2)),
            comment: Some(String::from("number of axes")),
        };
        let buf = format_card(&card);
        assert_eq!(buf.len(), 80);
        assert_eq!(&buf[8..10], b"= ");
        let s = str::from_utf8(&buf).unwrap();
        assert!(s.contains("/ number of axes"));
    }

    #[test]
    fn serialize_cards_block_aligned_with_end() {
        let cards = vec![Card {
            keyword: normalize_keyword("SIMPLE").unwrap(),
            value: Some(Value::Logical(true)),
            comment: None,
        }];
        let bytes = serialize_cards(&cards);
        assert_eq!(bytes.len(), BLOCK_SIZE);
        assert_eq!(&bytes[80..83], b"END");
        for &b in &bytes[160..] {
            assert_eq!(b, b' ');
        }
    }

    #[test]
    fn serialize_cards_spills_to_two_blocks() {
        let cards: Vec<Card> = (0..36)
            .map(|i| Card {
                keyword: normalize_keyword(&format!("KEY{:05}", i)).unwrap(),
                value: Some(Value::Integer(i)),
                comment: None,
            })
            .collect();
        assert_eq!(serialize_cards(&cards).len(), 2 * BLOCK_SIZE);
    }

    #[test]
    fn roundtrip_serialize_then_parse() {
        let mut header = Header::new();
        header.set("SIMPLE", true, Some("conforms")).unwrap();
        header.set("BITPIX", 16i64, None).unwrap();
        header.set("NAXIS", 0i64, None).unwrap();

        let bytes = header.serialize();
        let parsed = Header::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
    }
}
