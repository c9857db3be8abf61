//! Image payload decoding, encoding, and lazy element access.
//!
//! On-disk pixel data is big-endian. Eager access decodes the whole payload
//! into a typed vector; lazy access goes through [`ImageView`], which reads
//! and writes single elements directly in the shared backing bytes.

use bytemuck::pod_collect_to_vec;

use crate::endian;
use crate::error::{Error, Result};
use crate::hdu::SharedBytes;
use crate::header::Header;

/// Image pixel data, typed by BITPIX.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ImageData {
    /// The BITPIX value matching this element type.
    pub fn bitpix(&self) -> i64 {
        match self {
            ImageData::U8(_) => 8,
            ImageData::I16(_) => 16,
            ImageData::I32(_) => 32,
            ImageData::I64(_) => 64,
            ImageData::F32(_) => -32,
            ImageData::F64(_) => -64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            ImageData::U8(v) => v.len(),
            ImageData::I16(v) => v.len(),
            ImageData::I32(v) => v.len(),
            ImageData::I64(v) => v.len(),
            ImageData::F32(v) => v.len(),
            ImageData::F64(v) => v.len(),
        }
    }

    /// Returns `true` if the payload holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index` widened to `f64`.
    pub fn get_f64(&self, index: usize) -> Result<f64> {
        let len = self.len();
        if index >= len {
            return Err(Error::Range { index, len });
        }
        Ok(match self {
            ImageData::U8(v) => v[index] as f64,
            ImageData::I16(v) => v[index] as f64,
            ImageData::I32(v) => v[index] as f64,
            ImageData::I64(v) => v[index] as f64,
            ImageData::F32(v) => v[index] as f64,
            ImageData::F64(v) => v[index],
        })
    }

    /// All elements widened to `f64`, in storage order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            ImageData::U8(v) => v.iter().map(|&p| p as f64).collect(),
            ImageData::I16(v) => v.iter().map(|&p| p as f64).collect(),
            ImageData::I32(v) => v.iter().map(|&p| p as f64).collect(),
            ImageData::I64(v) => v.iter().map(|&p| p as f64).collect(),
            ImageData::F32(v) => v.iter().map(|&p| p as f64).collect(),
            ImageData::F64(v) => v.clone(),
        }
    }

    /// Convert into an `ndarray` dynamic-dimension array, widening to `f64`.
    ///
    /// `naxes` lists the axis lengths in on-disk order (first axis varies
    /// fastest); the resulting array shape is reversed to match row-major
    /// layout.
    #[cfg(feature = "array")]
    pub fn into_ndarray_f64(self, naxes: &[usize]) -> Result<ndarray::ArrayD<f64>> {
        let shape: Vec<usize> = naxes.iter().rev().copied().collect();
        ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&shape), self.to_f64_vec())
            .map_err(|_| Error::format("element count does not match axis lengths"))
    }
}

/// Bytes per element for a BITPIX value.
pub fn bytes_per_pixel(bitpix: i64) -> Result<usize> {
    match bitpix {
        8 | 16 | 32 | 64 | -32 | -64 => Ok((bitpix.unsigned_abs() as usize) / 8),
        other => Err(Error::format(format!("invalid BITPIX value: {}", other))),
    }
}

/// Decode raw big-endian payload bytes into typed pixel data.
pub fn decode_image(raw: &[u8], bitpix: i64) -> Result<ImageData> {
    let bpp = bytes_per_pixel(bitpix)?;
    if !raw.len().is_multiple_of(bpp) {
        return Err(Error::format(format!(
            "payload length {} is not a multiple of the {}-byte element size",
            raw.len(),
            bpp
        )));
    }

    Ok(match bitpix {
        8 => ImageData::U8(raw.to_vec()),
        16 => {
            // Collect into a properly-aligned Vec, then swap each element
            // to native endianness in place.
            let mut pixels: Vec<i16> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i16::from_be(*v);
            }
            ImageData::I16(pixels)
        }
        32 => {
            let mut pixels: Vec<i32> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i32::from_be(*v);
            }
            ImageData::I32(pixels)
        }
        64 => {
            let mut pixels: Vec<i64> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i64::from_be(*v);
            }
            ImageData::I64(pixels)
        }
        -32 => {
            let mut pixels: Vec<f32> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = f32::from_bits(u32::from_be(v.to_bits()));
            }
            ImageData::F32(pixels)
        }
        _ => {
            let mut pixels: Vec<f64> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = f64::from_bits(u64::from_be(v.to_bits()));
            }
            ImageData::F64(pixels)
        }
    })
}

/// Encode typed pixel data into raw big-endian payload bytes (unpadded).
pub fn encode_image(data: &ImageData) -> Vec<u8> {
    match data {
        ImageData::U8(v) => v.clone(),
        ImageData::I16(v) => {
            let mut out = Vec::with_capacity(v.len() * 2);
            for &x in v {
                out.extend_from_slice(&x.to_be_bytes());
            }
            out
        }
        ImageData::I32(v) => {
            let mut out = Vec::with_capacity(v.len() * 4);
            for &x in v {
                out.extend_from_slice(&x.to_be_bytes());
            }
            out
        }
        ImageData::I64(v) => {
            let mut out = Vec::with_capacity(v.len() * 8);
            for &x in v {
                out.extend_from_slice(&x.to_be_bytes());
            }
            out
        }
        ImageData::F32(v) => {
            let mut out = Vec::with_capacity(v.len() * 4);
            for &x in v {
                out.extend_from_slice(&x.to_be_bytes());
            }
            out
        }
        ImageData::F64(v) => {
            let mut out = Vec::with_capacity(v.len() * 8);
            for &x in v {
                out.extend_from_slice(&x.to_be_bytes());
            }
            out
        }
    }
}

// ── Header builders ──

fn check_bitpix(bitpix: i64) -> Result<()> {
    bytes_per_pixel(bitpix).map(|_| ())
}

/// Build the header for a primary HDU with the given shape.
pub fn build_primary_header(bitpix: i64, naxes: &[usize]) -> Result<Header> {
    check_bitpix(bitpix)?;
    let mut h = Header::new();
    h.set("SIMPLE", true, Some("conforms to FITS standard"))?;
    h.set("BITPIX", bitpix, Some("bits per data value"))?;
    h.set("NAXIS", naxes.len() as i64, Some("number of axes"))?;
    for (i, &d) in naxes.iter().enumerate() {
        h.set(&format!("NAXIS{}", i + 1), d as i64, None)?;
    }
    Ok(h)
}

/// Rewrite the shape keywords of an existing image header in place,
/// removing stale NAXISn entries from a previous, higher-rank shape.
pub fn apply_image_shape(header: &mut Header, bitpix: i64, naxes: &[usize]) -> Result<()> {
    check_bitpix(bitpix)?;
    let old_naxis = header.integer("NAXIS").unwrap_or(0).max(0) as usize;

    header.set("BITPIX", bitpix, None)?;
    header.set("NAXIS", naxes.len() as i64, None)?;
    for (i, &d) in naxes.iter().enumerate() {
        header.set(&format!("NAXIS{}", i + 1), d as i64, None)?;
    }
    for i in naxes.len() + 1..=old_naxis {
        let _ = header.delete(&format!("NAXIS{}", i));
    }
    Ok(())
}

/// Build the header for an image extension with the given shape.
pub fn build_image_extension_header(
    bitpix: i64,
    naxes: &[usize],
    extname: Option<&str>,
) -> Result<Header> {
    check_bitpix(bitpix)?;
    let mut h = Header::new();
    h.set("XTENSION", "IMAGE", Some("image extension"))?;
    h.set("BITPIX", bitpix, None)?;
    h.set("NAXIS", naxes.len() as i64, None)?;
    for (i, &d) in naxes.iter().enumerate() {
        h.set(&format!("NAXIS{}", i + 1), d as i64, None)?;
    }
    h.set("PCOUNT", 0i64, None)?;
    h.set("GCOUNT", 1i64, None)?;
    if let Some(name) = extname {
        h.set("EXTNAME", name, None)?;
    }
    Ok(h)
}

// ── Lazy views ──

/// A lazy image accessor that aliases the unit's backing bytes.
///
/// No element is materialized until it is read, and writes go straight to
/// the shared storage, so a mutation through a view is visible to every
/// subsequent eager read of the same unit and to `save`.
#[derive(Debug, Clone)]
pub struct ImageView {
    raw: SharedBytes,
    bitpix: i64,
    shape: Vec<usize>,
}

impl ImageView {
    pub(crate) fn new(raw: SharedBytes, bitpix: i64, shape: Vec<usize>) -> Self {
        ImageView { raw, bitpix, shape }
    }

    /// Axis lengths in on-disk order.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The BITPIX element type of the backing payload.
    pub fn bitpix(&self) -> i64 {
        self.bitpix
    }

    /// Number of elements in the backing payload.
    pub fn len(&self) -> usize {
        let bpp = (self.bitpix.unsigned_abs() as usize) / 8;
        self.raw.borrow().len() / bpp
    }

    /// Returns `true` if the backing payload holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the element at `index` (storage order), widened to `f64`.
    pub fn get(&self, index: usize) -> Result<f64> {
        let len = self.len();
        if index >= len {
            return Err(Error::Range { index, len });
        }
        let bpp = (self.bitpix.unsigned_abs() as usize) / 8;
        let raw = self.raw.borrow();
        let at = &raw[index * bpp..];
        Ok(match self.bitpix {
            8 => at[0] as f64,
            16 => endian::read_i16_be(at) as f64,
            32 => endian::read_i32_be(at) as f64,
            64 => endian::read_i64_be(at) as f64,
            -32 => endian::read_f32_be(at) as f64,
            _ => endian::read_f64_be(at),
        })
    }

    /// Write `value` to the element at `index`, narrowing to the backing
    /// element type (integer types truncate toward zero).
    pub fn set(&self, index: usize, value: f64) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(Error::Range { index, len });
        }
        let bpp = (self.bitpix.unsigned_abs() as usize) / 8;
        let mut raw = self.raw.borrow_mut();
        let at = &mut raw[index * bpp..];
        match self.bitpix {
            8 => at[0] = value as u8,
            16 => endian::write_i16_be(at, value as i16),
            32 => endian::write_i32_be(at, value as i32),
            64 => endian::write_i64_be(at, value as i64),
            -32 => endian::write_f32_be(at, value as f32),
            _ => endian::write_f64_be(at, value),
        }
        Ok(())
    }
}

// ── Tests ──
