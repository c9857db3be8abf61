//! Header-Data Units: the building blocks of a container file.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::block::{padded_byte_len, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::header::{header_byte_len, Header};

/// Shared payload storage. Lazy data views clone this handle, so a mutation
/// through a view is visible to every other reader of the same unit.
pub type SharedBytes = Rc<RefCell<Vec<u8>>>;

const VALID_BITPIX: [i64; 6] = [8, 16, 32, 64, -32, -64];

/// Describes the kind and shape of data in a single HDU, derived from its
/// header.
#[derive(Debug, Clone, PartialEq)]
pub enum HduInfo {
    /// Primary HDU, optionally carrying image data.
    Primary {
        /// BITPIX value (8, 16, 32, 64, -32, -64).
        bitpix: i64,
        /// Axis dimensions (NAXIS1, NAXIS2, ...).
        naxes: Vec<usize>,
    },
    /// Image extension (XTENSION = 'IMAGE').
    Image {
        /// BITPIX value.
        bitpix: i64,
        /// Axis dimensions.
        naxes: Vec<usize>,
    },
    /// ASCII table extension (XTENSION = 'TABLE').
    AsciiTable {
        /// Row width in bytes.
        naxis1: usize,
        /// Number of rows.
        naxis2: usize,
        /// Number of columns.
        tfields: usize,
    },
}

impl HduInfo {
    /// The number of payload bytes implied by the header shape.
    pub fn data_byte_len(&self) -> usize {
        match self {
            HduInfo::Primary { bitpix, naxes } | HduInfo::Image { bitpix, naxes } => {
                if naxes.is_empty() {
                    return 0;
                }
                let bytes_per_value = (bitpix.unsigned_abs() as usize) / 8;
                naxes.iter().product::<usize>() * bytes_per_value
            }
            HduInfo::AsciiTable { naxis1, naxis2, .. } => naxis1 * naxis2,
        }
    }
}

/// Human-readable name for a BITPIX element type.
pub fn bitpix_name(bitpix: i64) -> &'static str {
    match bitpix {
        8 => "uint8",
        16 => "int16",
        32 => "int32",
        64 => "int64",
        -32 => "float32",
        -64 => "float64",
        _ => "unknown",
    }
}

/// A single Header-Data Unit: an ordered header plus shared payload bytes.
#[derive(Debug)]
pub struct Hdu {
    header: Header,
    raw: SharedBytes,
}

impl Hdu {
    /// Build a unit from a parsed header and its unpadded payload bytes.
    pub fn new(header: Header, raw: Vec<u8>) -> Self {
        Hdu {
            header,
            raw: Rc::new(RefCell::new(raw)),
        }
    }

    /// The unit's header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Mutable access to the unit's header.
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Derive the unit kind and shape from the header.
    pub fn info(&self) -> Result<HduInfo> {
        let first_is_simple = self
            .header
            .cards()
            .first()
            .map(|c| c.keyword_str() == "SIMPLE")
            .unwrap_or(false);
        if first_is_simple {
            let (bitpix, naxes) = image_shape(&self.header)?;
            return Ok(HduInfo::Primary { bitpix, naxes });
        }

        match self.header.string("XTENSION").as_deref() {
            Some("IMAGE") => {
                let (bitpix, naxes) = image_shape(&self.header)?;
                Ok(HduInfo::Image { bitpix, naxes })
            }
            Some("TABLE") => {
                let naxis1 = require_dim(&self.header, "NAXIS1")?;
                let naxis2 = require_dim(&self.header, "NAXIS2")?;
                let tfields = require_dim(&self.header, "TFIELDS")?;
                Ok(HduInfo::AsciiTable {
                    naxis1,
                    naxis2,
                    tfields,
                })
            }
            Some(other) => Err(Error::format(format!(
                "unsupported extension type {:?}",
                other
            ))),
            None => Err(Error::format("missing SIMPLE or XTENSION keyword")),
        }
    }

    /// The unit's EXTNAME, if any.
    pub fn name(&self) -> Option<String> {
        self.header.string("EXTNAME")
    }

    /// The unit's EXTVER, defaulting to 1 when absent.
    pub fn version(&self) -> i64 {
        self.header.integer("EXTVER").unwrap_or(1)
    }

    /// The current payload length in bytes (unpadded).
    pub fn data_len(&self) -> usize {
        self.raw.borrow().len()
    }

    /// Handle to the shared payload storage.
    pub(crate) fn raw(&self) -> &SharedBytes {
        &self.raw
    }

    /// Replace the payload bytes. Outstanding views alias the new bytes.
    pub(crate) fn replace_raw(&self, bytes: Vec<u8>) {
        *self.raw.borrow_mut() = bytes;
    }

    /// Returns `true` if lazy views of this unit's payload are outstanding.
    pub(crate) fn has_live_views(&self) -> bool {
        Rc::strong_count(&self.raw) > 1
    }

    /// Build a one-line inventory summary for this unit.
    pub fn summary(&self, index: usize) -> Result<UnitSummary> {
        let info = self.info()?;
        let payload = match &info {
            HduInfo::Primary { naxes, .. } | HduInfo::Image { naxes, .. } if naxes.is_empty() => {
                String::from("no data")
            }
            HduInfo::Primary { bitpix, naxes } | HduInfo::Image { bitpix, naxes } => {
                let dims: Vec<String> = naxes.iter().map(|d| d.to_string()).collect();
                format!("{} ({})", dims.join(" x "), bitpix_name(*bitpix))
            }
            HduInfo::AsciiTable {
                naxis2, tfields, ..
            } => format!("{} cols x {} rows", tfields, naxis2),
        };
        let kind = match info {
            HduInfo::Primary { .. } => "PRIMARY",
            HduInfo::Image { .. } => "IMAGE",
            HduInfo::AsciiTable { .. } => "TABLE",
        };
        Ok(UnitSummary {
            index,
            name: self.name(),
            version: self.version(),
            kind,
            payload,
        })
    }
}

fn image_shape(header: &Header) -> Result<(i64, Vec<usize>)> {
    let bitpix = header
        .integer("BITPIX")
        .ok_or_else(|| Error::format("missing BITPIX keyword"))?;
    if !VALID_BITPIX.contains(&bitpix) {
        return Err(Error::format(format!("invalid BITPIX value: {}", bitpix)));
    }

    let naxis = header
        .integer("NAXIS")
        .ok_or_else(|| Error::format("missing NAXIS keyword"))?;
    if naxis < 0 {
        return Err(Error::format("negative NAXIS"));
    }

    let mut naxes = Vec::with_capacity(naxis as usize);
    for i in 1..=naxis {
        let kw = format!("NAXIS{}", i);
        let dim = require_dim(header, &kw)?;
        naxes.push(dim);
    }
    Ok((bitpix, naxes))
}

fn require_dim(header: &Header, keyword: &str) -> Result<usize> {
    let val = header
        .integer(keyword)
        .ok_or_else(|| Error::format(format!("missing {} keyword", keyword)))?;
    if val < 0 {
        return Err(Error::format(format!("negative {}", keyword)));
    }
    Ok(val as usize)
}

// ── Summaries ──

/// One line of the container inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSummary {
    /// Position of the unit in the container.
    pub index: usize,
    /// EXTNAME, if present.
    pub name: Option<String>,
    /// EXTVER (defaults to 1).
    pub version: i64,
    /// Unit kind: `PRIMARY`, `IMAGE`, or `TABLE`.
    pub kind: &'static str,
    /// Payload description, e.g. `100 x 200 (int16)` or `no data`.
    pub payload: String,
}

impl fmt::Display for UnitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &self.name {
            Some(name) => format!("{},{}", name, self.version),
            None => String::from("-"),
        };
        write!(
            f,
            "{:>3}  {:<16} {:<8} {}",
            self.index, label, self.kind, self.payload
        )
    }
}

// ── Stream parsing ──

/// Parse a complete container byte stream into its units.
///
/// The stream must begin with a `SIMPLE` card; every unit must carry all
/// the payload bytes its header promises (trailing block padding may be
/// absent on the last unit).
pub fn parse_units(data: &[u8]) -> Result<Vec<Hdu>> {
    if data.len() < BLOCK_SIZE {
        return Err(Error::UnexpectedEof);
    }
    if &data[..6] != b"SIMPLE" {
        return Err(Error::format("leading bytes are not a SIMPLE card"));
    }

    let mut hdus: Vec<Hdu> = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let remaining = &data[offset..];
        if remaining.len() < BLOCK_SIZE {
            // Trailing non-block garbage after a complete unit is tolerated.
            break;
        }

        let header_len = match header_byte_len(remaining) {
            Ok(len) => len,
            Err(_) if !hdus.is_empty() => break,
            Err(e) => return Err(e),
        };
        let header = Header::parse(&remaining[..header_len])?;

        let hdu = Hdu::new(header, Vec::new());
        let data_len = hdu.info()?.data_byte_len();

        let data_start = offset + header_len;
        if data_len > 0 && data_start + data_len > data.len() {
            return Err(Error::UnexpectedEof);
        }
        hdu.replace_raw(data[data_start..data_start + data_len].to_vec());

        hdus.push(hdu);
        offset = data_start + padded_byte_len(data_len);
    }

    if hdus.is_empty() {
        return Err(Error::format("no valid units found"));
    }

    Ok(hdus)
}

// ── Tests ──
