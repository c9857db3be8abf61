//! ASCII table payload reading and writing.
//!
//! Table layout is described by the TFIELDS/TFORMn/TBCOLn/TTYPEn keywords:
//! each row is a fixed-width text record of NAXIS1 bytes, each column a
//! fixed field within it.

use std::str;

use crate::error::{Error, Result};
use crate::header::Header;

// ── Column format ──

/// The format code for a table column, parsed from a TFORMn keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnFormat {
    /// `Aw` -- character string, `w` characters wide.
    Character(usize),
    /// `Iw` -- integer, `w` characters wide.
    Integer(usize),
    /// `Fw.d` -- fixed-point decimal, `w` wide with `d` decimal places.
    FloatF(usize, usize),
    /// `Ew.d` -- single-precision exponential, `w` wide with `d` decimal places.
    FloatE(usize, usize),
    /// `Dw.d` -- double-precision exponential, `w` wide with `d` decimal places.
    DoubleE(usize, usize),
}

impl ColumnFormat {
    /// Total width in bytes of a field with this format.
    pub fn width(&self) -> usize {
        match self {
            ColumnFormat::Character(w)
            | ColumnFormat::Integer(w)
            | ColumnFormat::FloatF(w, _)
            | ColumnFormat::FloatE(w, _)
            | ColumnFormat::DoubleE(w, _) => *w,
        }
    }
}

/// Parse a TFORM string such as `"A20"`, `"I10"`, `"F12.4"`, `"E15.7"`,
/// or `"D25.17"`.
pub fn parse_tform(s: &str) -> Result<ColumnFormat> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::format("empty TFORM"));
    }

    let code = s.as_bytes()[0];
    let rest = &s[1..];

    match code {
        b'A' => Ok(ColumnFormat::Character(parse_usize(rest)?)),
        b'I' => Ok(ColumnFormat::Integer(parse_usize(rest)?)),
        b'F' => {
            let (w, d) = parse_width_decimal(rest)?;
            Ok(ColumnFormat::FloatF(w, d))
        }
        b'E' => {
            let (w, d) = parse_width_decimal(rest)?;
            Ok(ColumnFormat::FloatE(w, d))
        }
        b'D' => {
            let (w, d) = parse_width_decimal(rest)?;
            Ok(ColumnFormat::DoubleE(w, d))
        }
        _ => Err(Error::format(format!("unrecognized TFORM {:?}", s))),
    }
}

fn parse_usize(s: &str) -> Result<usize> {
    s.parse::<usize>()
        .map_err(|_| Error::format(format!("bad TFORM width {:?}", s)))
}

fn parse_width_decimal(s: &str) -> Result<(usize, usize)> {
    let dot = s
        .find('.')
        .ok_or_else(|| Error::format(format!("missing decimal count in TFORM {:?}", s)))?;
    Ok((parse_usize(&s[..dot])?, parse_usize(&s[dot + 1..])?))
}

/// Render a [`ColumnFormat`] back to its TFORM string.
pub fn format_tform(fmt: &ColumnFormat) -> String {
    match fmt {
        ColumnFormat::Character(w) => format!("A{}", w),
        ColumnFormat::Integer(w) => format!("I{}", w),
        ColumnFormat::FloatF(w, d) => format!("F{}.{}", w, d),
        ColumnFormat::FloatE(w, d) => format!("E{}.{}", w, d),
        ColumnFormat::DoubleE(w, d) => format!("D{}.{}", w, d),
    }
}

// ── Column data ──

/// The values of one column across all rows.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Character/string column.
    Text(Vec<String>),
    /// Integer column.
    Integer(Vec<i64>),
    /// Float column (covers Fw.d, Ew.d, and Dw.d).
    Float(Vec<f64>),
}

impl ColumnData {
    /// Number of rows in this column.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(v) => v.len(),
            ColumnData::Integer(v) => v.len(),
            ColumnData::Float(v) => v.len(),
        }
    }

    /// Returns `true` if the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the element type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnData::Text(_) => "str",
            ColumnData::Integer(_) => "int64",
            ColumnData::Float(_) => "float64",
        }
    }
}

/// A named column with its values.
#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    /// Column name from TTYPEn (may be absent on disk).
    pub name: Option<String>,
    /// The column values.
    pub data: ColumnData,
}

/// A decoded table payload: ordered named columns sharing one row count.
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    columns: Vec<TableColumn>,
}

impl TableData {
    /// Build a table, checking that every column has the same row count.
    pub fn new(columns: Vec<TableColumn>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let n = first.data.len();
            if columns.iter().any(|c| c.data.len() != n) {
                return Err(Error::format("columns differ in row count"));
            }
        }
        Ok(TableData { columns })
    }

    /// All columns in order.
    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Look up a column by name. Fails with [`Error::Lookup`] when no
    /// column carries that name.
    pub fn column(&self, name: &str) -> Result<&ColumnData> {
        self.columns
            .iter()
            .find(|c| c.name.as_deref() == Some(name))
            .map(|c| &c.data)
            .ok_or_else(|| Error::lookup(format!("column {:?} not found", name)))
    }
}

// ── Column descriptors ──

/// Describes one column position within a table row.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Column name from TTYPEn, if present.
    pub name: Option<String>,
    /// The format code from TFORMn.
    pub format: ColumnFormat,
    /// 0-indexed byte position within the row (from 1-indexed TBCOLn).
    pub tbcol: usize,
}

/// Extract the column descriptors from a table unit's header.
pub fn parse_table_columns(header: &Header, tfields: usize) -> Result<Vec<ColumnDescriptor>> {
    let mut columns = Vec::with_capacity(tfields);

    for i in 1..=tfields {
        let tform = header
            .string(&format!("TFORM{}", i))
            .ok_or_else(|| Error::format(format!("missing TFORM{} keyword", i)))?;
        let format = parse_tform(&tform)?;

        let tbcol = header
            .integer(&format!("TBCOL{}", i))
            .ok_or_else(|| Error::format(format!("missing TBCOL{} keyword", i)))?;
        if tbcol < 1 {
            return Err(Error::format(format!("TBCOL{} must be positive", i)));
        }

        columns.push(ColumnDescriptor {
            name: header.string(&format!("TTYPE{}", i)),
            format,
            tbcol: (tbcol - 1) as usize,
        });
    }

    Ok(columns)
}

// ── Decoding ──

/// Decode a raw table payload into typed columns using the header layout.
pub fn decode_table(raw: &[u8], header: &Header) -> Result<TableData> {
    let naxis1 = header
        .integer("NAXIS1")
        .ok_or_else(|| Error::format("missing NAXIS1 keyword"))? as usize;
    let naxis2 = header
        .integer("NAXIS2")
        .ok_or_else(|| Error::format("missing NAXIS2 keyword"))? as usize;
    let tfields = header
        .integer("TFIELDS")
        .ok_or_else(|| Error::format("missing TFIELDS keyword"))? as usize;

    if raw.len() < naxis1 * naxis2 {
        return Err(Error::UnexpectedEof);
    }

    let descriptors = parse_table_columns(header, tfields)?;
    let mut columns = Vec::with_capacity(tfields);

    for desc in &descriptors {
        let width = desc.format.width();
        let mut fields = Vec::with_capacity(naxis2);
        for row in 0..naxis2 {
            let start = row * naxis1 + desc.tbcol;
            let end = start + width;
            if end > row * naxis1 + naxis1 {
                return Err(Error::format(format!(
                    "column {:?} overruns the row width",
                    desc.name.as_deref().unwrap_or("?")
                )));
            }
            let field = str::from_utf8(&raw[start..end])
                .map_err(|_| Error::format("non-UTF8 bytes in table field"))?;
            fields.push(field.trim());
        }

        let data = match desc.format {
            ColumnFormat::Character(_) => {
                ColumnData::Text(fields.iter().map(|s| s.to_string()).collect())
            }
            ColumnFormat::Integer(_) => {
                let mut vals = Vec::with_capacity(fields.len());
                for f in &fields {
                    vals.push(f.parse::<i64>().map_err(|_| {
                        Error::format(format!("bad integer field {:?}", f))
                    })?);
                }
                ColumnData::Integer(vals)
            }
            _ => {
                let mut vals = Vec::with_capacity(fields.len());
                for f in &fields {
                    let normalized = f.replace(['D', 'd'], "E");
                    vals.push(normalized.parse::<f64>().map_err(|_| {
                        Error::format(format!("bad float field {:?}", f))
                    })?);
                }
                ColumnData::Float(vals)
            }
        };

        columns.push(TableColumn {
            name: desc.name.clone(),
            data,
        });
    }

    TableData::new(columns)
}

// ── Encoding ──

/// A computed row layout for a table about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    /// Per-column formats.
    pub formats: Vec<ColumnFormat>,
    /// Per-column 0-indexed byte positions.
    pub tbcols: Vec<usize>,
    /// Row width in bytes.
    pub naxis1: usize,
}

/// Choose formats and byte positions for the given columns.
///
/// Text columns get their widest value, integers their widest decimal
/// rendering, floats a D25.17 field (17 significant digits round-trips an
/// IEEE double exactly). Columns are separated by one space.
pub fn plan_layout(columns: &[TableColumn]) -> TableLayout {
    let mut formats = Vec::with_capacity(columns.len());
    let mut tbcols = Vec::with_capacity(columns.len());
    let mut cursor = 0usize;

    for col in columns {
        let format = match &col.data {
            ColumnData::Text(v) => {
                let w = v.iter().map(|s| s.len()).max().unwrap_or(0).max(1);
                ColumnFormat::Character(w)
            }
            ColumnData::Integer(v) => {
                let w = v
                    .iter()
                    .map(|n| format!("{}", n).len())
                    .max()
                    .unwrap_or(0)
                    .max(1);
                ColumnFormat::Integer(w)
            }
            ColumnData::Float(_) => ColumnFormat::DoubleE(25, 17),
        };
        tbcols.push(cursor);
        cursor += format.width() + 1;
        formats.push(format);
    }

    // Drop the trailing separator.
    let naxis1 = cursor.saturating_sub(1);
    TableLayout {
        formats,
        tbcols,
        naxis1,
    }
}

fn right_justify(s: &str, width: usize) -> String {
    format!("{:>width$}", s, width = width)
}

fn format_field(data: &ColumnData, fmt: &ColumnFormat, row: usize) -> Result<String> {
    let w = fmt.width();
    match (data, fmt) {
        (ColumnData::Text(v), ColumnFormat::Character(_)) => {
            let s = &v[row];
            let mut out = s.clone();
            out.truncate(w);
            Ok(format!("{:<width$}", out, width = w))
        }
        (ColumnData::Integer(v), ColumnFormat::Integer(_)) => {
            Ok(right_justify(&format!("{}", v[row]), w))
        }
        (ColumnData::Float(v), ColumnFormat::FloatF(_, d)) => {
            Ok(right_justify(&format!("{:.*}", *d, v[row]), w))
        }
        (ColumnData::Float(v), ColumnFormat::FloatE(_, d) | ColumnFormat::DoubleE(_, d)) => {
            let s = format!("{:.prec$E}", v[row], prec = *d);
            let s = if matches!(fmt, ColumnFormat::DoubleE(..)) {
                s.replace('E', "D")
            } else {
                s
            };
            Ok(right_justify(&s, w))
        }
        _ => Err(Error::format("column data does not match its format")),
    }
}

/// Serialize columns into raw row bytes (unpadded) using `layout`.
pub fn encode_table(columns: &[TableColumn], layout: &TableLayout) -> Result<Vec<u8>> {
    let n_rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
    let mut buf = vec![b' '; layout.naxis1 * n_rows];

    for row in 0..n_rows {
        let row_start = row * layout.naxis1;
        for ((col, fmt), &tbcol) in columns.iter().zip(&layout.formats).zip(&layout.tbcols) {
            let field = format_field(&col.data, fmt, row)?;
            let bytes = field.as_bytes();
            let len = bytes.len().min(fmt.width());
            let dest = row_start + tbcol;
            buf[dest..dest + len].copy_from_slice(&bytes[..len]);
        }
    }

    Ok(buf)
}

/// Write the structural layout keywords for a table into `header`,
/// replacing any stale per-column keywords from a previous layout.
pub fn apply_table_layout(
    header: &mut Header,
    columns: &[TableColumn],
    layout: &TableLayout,
) -> Result<()> {
    let n_rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
    let old_tfields = header.integer("TFIELDS").unwrap_or(0).max(0) as usize;

    header.set("BITPIX", 8i64, None)?;
    header.set("NAXIS", 2i64, None)?;
    header.set("NAXIS1", layout.naxis1 as i64, Some("row width in bytes"))?;
    header.set("NAXIS2", n_rows as i64, Some("number of rows"))?;
    header.set("PCOUNT", 0i64, None)?;
    header.set("GCOUNT", 1i64, None)?;
    header.set("TFIELDS", columns.len() as i64, Some("number of columns"))?;

    for (i, ((col, fmt), &tbcol)) in columns
        .iter()
        .zip(&layout.formats)
        .zip(&layout.tbcols)
        .enumerate()
    {
        let n = i + 1;
        header.set(&format!("TFORM{}", n), format_tform(fmt), None)?;
        header.set(&format!("TBCOL{}", n), (tbcol + 1) as i64, None)?;
        match &col.name {
            Some(name) => header.set(&format!("TTYPE{}", n), name.as_str(), None)?,
            None => {
                let _ = header.delete(&format!("TTYPE{}", n));
            }
        }
    }

    for n in columns.len() + 1..=old_tfields {
        let _ = header.delete(&format!("TFORM{}", n));
        let _ = header.delete(&format!("TBCOL{}", n));
        let _ = header.delete(&format!("TTYPE{}", n));
    }

    Ok(())
}

/// Build a complete header for a new table extension.
pub fn build_table_header(
    columns: &[TableColumn],
    layout: &TableLayout,
    extname: Option<&str>,
) -> Result<Header> {
    let mut h = Header::new();
    h.set("XTENSION", "TABLE", Some("ASCII table extension"))?;
    apply_table_layout(&mut h, columns, layout)?;
    if let Some(name) = extname {
        h.set("EXTNAME", name, None)?;
    }
    Ok(h)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_columns() -> Vec<TableColumn> {
        vec![
            TableColumn {
                name: Some(String::from("TARGET")),
                data: ColumnData::Text(vec![
                    String::from("NGC1234"),
                    String::from("M31"),
                    String::from("VEGA"),
                ]),
            },
            TableColumn {
                name: Some(String::from("NOBS")),
                data: ColumnData::Integer(vec![12, 7, 1530]),
            },
            TableColumn {
                name: Some(String::from("MAG")),
                data: ColumnData::Float(vec![9.25, 3.44, 0.03]),
            },
        ]
    }

    #[test]
    fn parse_tform_variants() {
        assert_eq!(parse_tform("A20").unwrap(), ColumnFormat::Character(20));
        assert_eq!(parse_tform("I10").unwrap(), ColumnFormat::Integer(10));
        assert_eq!(parse_tform("F12.4").unwrap(), ColumnFormat::FloatF(12, 4));
        assert_eq!(parse_tform("E15.7").unwrap(), ColumnFormat::FloatE(15, 7));
        assert_eq!(parse_tform("D25.17").unwrap(), ColumnFormat::DoubleE(25, 17));
    }

    #[test]
    fn parse_tform_rejects_garbage() {
        assert!(parse_tform("").is_err());
        assert!(parse_tform("X5").is_err());
        assert!(parse_tform("F12").is_err());
        assert!(parse_tform("Iten").is_err());
    }

    #[test]
    fn tform_round_trip() {
        for s in ["A7", "I4", "F8.3", "E15.7", "D25.17"] {
            assert_eq!(format_tform(&parse_tform(s).unwrap()), s);
        }
    }

    #[test]
    fn table_data_rejects_uneven_columns() {
        let cols = vec![
            TableColumn {
                name: None,
                data: ColumnData::Integer(vec![1, 2]),
            },
            TableColumn {
                name: None,
                data: ColumnData::Integer(vec![1]),
            },
        ];
        assert!(TableData::new(cols).is_err());
    }

    #[test]
    fn column_lookup_by_name() {
        let table = TableData::new(sample_columns()).unwrap();
        assert_eq!(
            table.column("NOBS").unwrap(),
            &ColumnData::Integer(vec![12, 7, 1530])
        );
        assert!(matches!(table.column("MISSING"), Err(Error::Lookup(_))));
    }

    #[test]
    fn layout_packs_columns_with_separators() {
        let cols = sample_columns();
        let layout = plan_layout(&cols);
        assert_eq!(layout.formats[0], ColumnFormat::Character(7));
        assert_eq!(layout.formats[1], ColumnFormat::Integer(4));
        assert_eq!(layout.formats[2], ColumnFormat::DoubleE(25, 17));
        assert_eq!(layout.tbcols, vec![0, 8, 13]);
        assert_eq!(layout.naxis1, 38);
    }

    #[test]
    fn encode_decode_round_trip() {
        let cols = sample_columns();
        let layout = plan_layout(&cols);
        let header = build_table_header(&cols, &layout, Some("OBS")).unwrap();
        let raw = encode_table(&cols, &layout).unwrap();

        let table = decode_table(&raw, &header).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column("TARGET").unwrap(), &cols[0].data);
        assert_eq!(table.column("NOBS").unwrap(), &cols[1].data);
        assert_eq!(table.column("MAG").unwrap(), &cols[2].data);
    }

    #[test]
    fn float_round_trip_is_exact() {
        let cols = vec![TableColumn {
            name: Some(String::from("V")),
            data: ColumnData::Float(vec![0.1, -9.80665, 1.0 / 3.0, 6.02214076e23]),
        }];
        let layout = plan_layout(&cols);
        let header = build_table_header(&cols, &layout, None).unwrap();
        let raw = encode_table(&cols, &layout).unwrap();
        let table = decode_table(&raw, &header).unwrap();
        assert_eq!(table.columns()[0].data, cols[0].data);
    }

    #[test]
    fn decode_rejects_bad_integer_field() {
        let cols = vec![TableColumn {
            name: Some(String::from("N")),
            data: ColumnData::Integer(vec![1]),
        }];
        let layout = plan_layout(&cols);
        let header = build_table_header(&cols, &layout, None).unwrap();
        let raw = b"x".to_vec();
        assert!(decode_table(&raw, &header).is_err());
    }

    #[test]
    fn decode_rejects_short_payload() {
        let cols = sample_columns();
        let layout = plan_layout(&cols);
        let header = build_table_header(&cols, &layout, None).unwrap();
        assert!(matches!(
            decode_table(&[], &header),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn layout_update_removes_stale_column_keywords() {
        let cols = sample_columns();
        let layout = plan_layout(&cols);
        let mut header = build_table_header(&cols, &layout, None).unwrap();

        let fewer = vec![cols[0].clone()];
        let new_layout = plan_layout(&fewer);
        apply_table_layout(&mut header, &fewer, &new_layout).unwrap();

        assert_eq!(header.integer("TFIELDS"), Some(1));
        assert!(!header.contains("TFORM2"));
        assert!(!header.contains("TBCOL3"));
        assert!(!header.contains("TTYPE2"));
    }

    #[test]
    fn unnamed_columns_have_no_ttype() {
        let cols = vec![TableColumn {
            name: None,
            data: ColumnData::Integer(vec![5]),
        }];
        let layout = plan_layout(&cols);
        let header = build_table_header(&cols, &layout, None).unwrap();
        assert!(!header.contains("TTYPE1"));
    }
}
