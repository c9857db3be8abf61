//! Delimited text table reading.
//!
//! Parses whitespace- or character-delimited text files with a configurable
//! header line and data start line, tolerating leading commentary lines.
//! Column types are inferred per column: integer if every field parses as
//! an integer, else float if every field parses as a float, else string.

use std::path::Path;

use log::warn;

use crate::error::{Error, Result};
use crate::table::ColumnData;

/// How to interpret a delimited text file.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// 1-indexed line holding the column names.
    pub header_line: usize,
    /// 1-indexed first data line.
    pub data_start: usize,
    /// Field delimiter; `None` splits on runs of whitespace.
    pub delimiter: Option<char>,
    /// Explicit column names. When set, the header row's names are ignored
    /// (the row itself is still skipped).
    pub names: Option<Vec<String>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            header_line: 1,
            data_start: 2,
            delimiter: None,
            names: None,
        }
    }
}

/// A single cell value from a text table row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Integer(i64),
    Float(f64),
}

/// An in-memory text table: ordered named columns of uniform type.
#[derive(Debug, Clone, PartialEq)]
pub struct TextTable {
    columns: Vec<(String, ColumnData)>,
}

impl TextTable {
    /// Column names in order.
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    /// Look up a column by name. Fails with [`Error::Lookup`] on an
    /// unknown name.
    pub fn column(&self, name: &str) -> Result<&ColumnData> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| Error::lookup(format!("column {:?} not found", name)))
    }

    /// The row at `index` as name/value pairs in column order. Fails with
    /// [`Error::Range`] out of bounds.
    pub fn row(&self, index: usize) -> Result<Vec<(&str, Cell)>> {
        let len = self.n_rows();
        if index >= len {
            return Err(Error::Range { index, len });
        }
        Ok(self
            .columns
            .iter()
            .map(|(name, col)| {
                let cell = match col {
                    ColumnData::Text(v) => Cell::Text(v[index].clone()),
                    ColumnData::Integer(v) => Cell::Integer(v[index]),
                    ColumnData::Float(v) => Cell::Float(v[index]),
                };
                (name.as_str(), cell)
            })
            .collect())
    }
}

/// Read a delimited text file into a [`TextTable`].
pub fn read_table<P: AsRef<Path>>(path: P, opts: &ReadOptions) -> Result<TextTable> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;
    parse_table(&text, opts)
}

/// Parse already-loaded text into a [`TextTable`].
pub fn parse_table(text: &str, opts: &ReadOptions) -> Result<TextTable> {
    if opts.header_line == 0 || opts.data_start == 0 {
        return Err(Error::format("line numbers are 1-indexed"));
    }
    if opts.data_start <= opts.header_line {
        warn!(
            "data start line {} does not follow header line {}; header text may be reparsed as data",
            opts.data_start, opts.header_line
        );
    }

    let lines: Vec<&str> = text.lines().collect();

    let split = |line: &str| -> Vec<String> {
        match opts.delimiter {
            Some(d) => line.split(d).map(|s| s.trim().to_string()).collect(),
            None => line.split_whitespace().map(String::from).collect(),
        }
    };

    let names: Vec<String> = match &opts.names {
        Some(names) => names.clone(),
        None => {
            let header = lines.get(opts.header_line - 1).ok_or_else(|| {
                Error::format(format!(
                    "header line {} is beyond the end of the file",
                    opts.header_line
                ))
            })?;
            split(header)
        }
    };
    if names.is_empty() {
        return Err(Error::format("no column names found"));
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, line) in lines.iter().enumerate().skip(opts.data_start - 1) {
        // The header row never counts as data, wherever the data starts.
        if idx + 1 == opts.header_line {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let fields = split(line);
        if fields.len() != names.len() {
            return Err(Error::format(format!(
                "line {}: expected {} fields, found {}",
                idx + 1,
                names.len(),
                fields.len()
            )));
        }
        rows.push(fields);
    }

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(j, name)| {
            let cells: Vec<&str> = rows.iter().map(|r| r[j].as_str()).collect();
            (name, infer_column(&cells))
        })
        .collect();

    Ok(TextTable { columns })
}

/// Infer the narrowest uniform type for a column of raw fields.
fn infer_column(cells: &[&str]) -> ColumnData {
    if cells.iter().all(|c| c.parse::<i64>().is_ok()) && !cells.is_empty() {
        return ColumnData::Integer(cells.iter().map(|c| c.parse().unwrap()).collect());
    }
    if cells.iter().all(|c| c.parse::<f64>().is_ok()) && !cells.is_empty() {
        return ColumnData::Float(cells.iter().map(|c| c.parse().unwrap()).collect());
    }
    ColumnData::Text(cells.iter().map(|c| c.to_string()).collect())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const THROUGHPUT: &str = "\
# instrument throughput curve
lambda throughput

3500.0 0.12
4500.0 0.68
5500.0 0.84
6500.0 0.71
";

    fn opts(header_line: usize, data_start: usize) -> ReadOptions {
        ReadOptions {
            header_line,
            data_start,
            ..ReadOptions::default()
        }
    }

    #[test]
    fn reads_names_from_header_line() {
        let table = parse_table(THROUGHPUT, &opts(2, 3)).unwrap();
        assert_eq!(table.names(), vec!["lambda", "throughput"]);
        assert_eq!(table.n_rows(), 4);
        assert_eq!(
            table.column("lambda").unwrap(),
            &ColumnData::Float(vec![3500.0, 4500.0, 5500.0, 6500.0])
        );
    }

    #[test]
    fn explicit_names_override_header_row() {
        let o = ReadOptions {
            names: Some(vec![String::from("wave"), String::from("thru")]),
            ..opts(2, 3)
        };
        let table = parse_table(THROUGHPUT, &o).unwrap();
        assert_eq!(table.names(), vec!["wave", "thru"]);
        // The header row is still skipped, not parsed as data.
        assert_eq!(table.n_rows(), 4);
    }

    #[test]
    fn integer_column_inference() {
        let text = "n x\n1 1.5\n2 2.5\n3 nope\n";
        let table = parse_table(text, &opts(1, 2)).unwrap();
        assert_eq!(table.column("n").unwrap(), &ColumnData::Integer(vec![1, 2, 3]));
        assert_eq!(
            table.column("x").unwrap(),
            &ColumnData::Text(vec![
                String::from("1.5"),
                String::from("2.5"),
                String::from("nope")
            ])
        );
    }

    #[test]
    fn mixed_int_and_float_becomes_float() {
        let text = "v\n1\n2.5\n";
        let table = parse_table(text, &opts(1, 2)).unwrap();
        assert_eq!(table.column("v").unwrap(), &ColumnData::Float(vec![1.0, 2.5]));
    }

    #[test]
    fn delimiter_override() {
        let text = "a,b,c\n1, 2, x\n4,5, y\n";
        let o = ReadOptions {
            delimiter: Some(','),
            ..ReadOptions::default()
        };
        let table = parse_table(text, &o).unwrap();
        assert_eq!(table.names(), vec!["a", "b", "c"]);
        assert_eq!(table.column("a").unwrap(), &ColumnData::Integer(vec![1, 4]));
        assert_eq!(
            table.column("c").unwrap(),
            &ColumnData::Text(vec![String::from("x"), String::from("y")])
        );
    }

    #[test]
    fn inconsistent_field_count_fails() {
        let text = "a b\n1 2\n3\n";
        assert!(matches!(
            parse_table(text, &ReadOptions::default()),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let text = "a\n\n1\n\n2\n";
        let table = parse_table(text, &ReadOptions::default()).unwrap();
        assert_eq!(table.column("a").unwrap(), &ColumnData::Integer(vec![1, 2]));
    }

    #[test]
    fn data_start_before_header_reparses_commentary() {
        // Permitted, but the leading commentary line lands in the data, so
        // the columns degrade to text.
        let text = "one two\nlambda throughput\n1.0 2.0\n";
        let table = parse_table(text, &opts(2, 1)).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(
            table.column("lambda").unwrap(),
            &ColumnData::Text(vec![String::from("one"), String::from("1.0")])
        );
    }

    #[test]
    fn zero_line_numbers_rejected() {
        assert!(parse_table("a\n1\n", &opts(0, 1)).is_err());
        assert!(parse_table("a\n1\n", &opts(1, 0)).is_err());
    }

    #[test]
    fn header_line_beyond_eof_fails() {
        assert!(matches!(
            parse_table("a\n", &opts(9, 10)),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn row_access() {
        let table = parse_table(THROUGHPUT, &opts(2, 3)).unwrap();
        let row = table.row(1).unwrap();
        assert_eq!(row[0], ("lambda", Cell::Float(4500.0)));
        assert_eq!(row[1], ("throughput", Cell::Float(0.68)));
        assert!(matches!(table.row(4), Err(Error::Range { index: 4, len: 4 })));
    }

    #[test]
    fn unknown_column_fails_lookup() {
        let table = parse_table(THROUGHPUT, &opts(2, 3)).unwrap();
        assert!(matches!(table.column("flux"), Err(Error::Lookup(_))));
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.txt");
        assert!(matches!(
            read_table(&path, &ReadOptions::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curve.txt");
        std::fs::write(&path, THROUGHPUT).unwrap();
        let table = read_table(&path, &opts(2, 3)).unwrap();
        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.n_columns(), 2);
    }
}
