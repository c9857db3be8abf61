//! Data handed to an external rendering surface.
//!
//! Plotting itself is out of scope; this module only defines what a
//! backend receives: sample values, shapes, axis labels, and a scale mode.

use crate::error::{Error, Result};
use crate::hdu::{Hdu, HduInfo};
use crate::image::decode_image;
use crate::table::ColumnData;

/// How sample values map to display intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleMode {
    #[default]
    Linear,
    Log,
}

/// A 2-D (or N-D) image ready for a rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlot {
    /// Sample values in storage order (first axis varies fastest).
    pub values: Vec<f64>,
    /// Axis lengths in on-disk order.
    pub shape: Vec<usize>,
    /// Horizontal axis label.
    pub x_label: String,
    /// Vertical axis label.
    pub y_label: String,
    /// Label for the sample values themselves, if known.
    pub value_label: Option<String>,
    /// Intensity scaling.
    pub scale: ScaleMode,
}

/// An x/y series ready for a rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPlot {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub x_label: String,
    pub y_label: String,
}

/// A rendering backend. Implementations receive fully-prepared data and
/// are free to draw it however they like.
pub trait RenderSurface {
    fn draw_image(&mut self, plot: &ImagePlot);
    fn draw_series(&mut self, plot: &SeriesPlot);
}

/// Prepare a unit's image payload for rendering.
///
/// Axis labels come from the CTYPE1/CTYPE2 keywords when present and the
/// value label from BUNIT.
pub fn image_plot(hdu: &Hdu, scale: ScaleMode) -> Result<ImagePlot> {
    let (bitpix, naxes) = match hdu.info()? {
        HduInfo::Primary { bitpix, naxes } | HduInfo::Image { bitpix, naxes } => (bitpix, naxes),
        HduInfo::AsciiTable { .. } => {
            return Err(Error::format("unit payload is a table, not an image"))
        }
    };
    let raw = hdu.raw().borrow();
    let values = decode_image(&raw, bitpix)?.to_f64_vec();
    let header = hdu.header();

    Ok(ImagePlot {
        values,
        shape: naxes,
        x_label: header.string("CTYPE1").unwrap_or_else(|| String::from("x")),
        y_label: header.string("CTYPE2").unwrap_or_else(|| String::from("y")),
        value_label: header.string("BUNIT"),
        scale,
    })
}

fn column_to_f64(name: &str, column: &ColumnData) -> Result<Vec<f64>> {
    match column {
        ColumnData::Integer(v) => Ok(v.iter().map(|&n| n as f64).collect()),
        ColumnData::Float(v) => Ok(v.clone()),
        ColumnData::Text(_) => Err(Error::format(format!(
            "column {:?} is not numeric",
            name
        ))),
    }
}

/// Prepare two numeric columns as an x/y series. The column names become
/// the axis labels.
pub fn series_plot(x: (&str, &ColumnData), y: (&str, &ColumnData)) -> Result<SeriesPlot> {
    let (x_name, x_col) = x;
    let (y_name, y_col) = y;
    if x_col.len() != y_col.len() {
        return Err(Error::format(format!(
            "series length mismatch: {} vs {}",
            x_col.len(),
            y_col.len()
        )));
    }
    Ok(SeriesPlot {
        x: column_to_f64(x_name, x_col)?,
        y: column_to_f64(y_name, y_col)?,
        x_label: x_name.to_string(),
        y_label: y_name.to_string(),
    })
}

// ── Tests ──
