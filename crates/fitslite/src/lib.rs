//! Minimal pure Rust reader and writer for FITS-style structured binary
//! containers, plus a delimited text table reader.
//!
//! A container file is a sequence of Header-Data Units (HDUs): an ordered
//! keyword/value/comment header followed by an optional payload, either an
//! N-dimensional numeric array or an ASCII table. [`fitsfile::FitsFile`]
//! loads, inspects, mutates, and atomically saves such files;
//! [`texttable::read_table`] ingests delimited text files with configurable
//! header and data line positions.

pub mod block;
pub mod endian;
pub mod error;
pub mod fitsfile;
pub mod hdu;
pub mod header;
pub mod image;
pub mod render;
pub mod table;
pub mod texttable;
pub mod value;

pub use block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use error::{Error, Result};
pub use fitsfile::{DescribesHdu, FileOpenMode, FitsFile, HduData};
pub use hdu::{Hdu, HduInfo, UnitSummary};
pub use header::{Card, Commentary, Header};
pub use image::{ImageData, ImageView};
pub use table::{ColumnData, TableColumn, TableData};
pub use texttable::{read_table, Cell, ReadOptions, TextTable};
pub use value::Value;
