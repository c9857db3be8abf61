//! The container: loading, unit selection, mutation, and atomic save.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;
use tempfile::NamedTempFile;

use crate::block::extend_data_padded;
use crate::error::{Error, Result};
use crate::hdu::{parse_units, Hdu, HduInfo, UnitSummary};
use crate::image::{
    apply_image_shape, build_image_extension_header, build_primary_header, decode_image,
    encode_image, ImageData, ImageView,
};
use crate::table::{
    apply_table_layout, build_table_header, decode_table, encode_table, plan_layout, TableData,
};

/// Whether a container is opened for reading or writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpenMode {
    ReadOnly,
    ReadWrite,
}

/// A decoded data payload, typed by the unit's header.
#[derive(Debug, Clone, PartialEq)]
pub enum HduData {
    Image(ImageData),
    Table(TableData),
}

impl HduData {
    /// Unwrap an image payload.
    pub fn into_image(self) -> Result<ImageData> {
        match self {
            HduData::Image(img) => Ok(img),
            HduData::Table(_) => Err(Error::format("payload is a table, not an image")),
        }
    }

    /// Unwrap a table payload.
    pub fn into_table(self) -> Result<TableData> {
        match self {
            HduData::Table(t) => Ok(t),
            HduData::Image(_) => Err(Error::format("payload is an image, not a table")),
        }
    }
}

/// Trait for types that can select a unit (by index, name, or name+version).
pub trait DescribesHdu {
    fn resolve(&self, hdus: &[Hdu]) -> Result<usize>;
}

impl DescribesHdu for usize {
    fn resolve(&self, hdus: &[Hdu]) -> Result<usize> {
        if *self < hdus.len() {
            Ok(*self)
        } else {
            Err(Error::lookup(format!("no unit at index {}", self)))
        }
    }
}

impl DescribesHdu for &str {
    fn resolve(&self, hdus: &[Hdu]) -> Result<usize> {
        let matches: Vec<usize> = hdus
            .iter()
            .enumerate()
            .filter(|(_, h)| h.name().as_deref() == Some(*self))
            .map(|(i, _)| i)
            .collect();
        match matches.as_slice() {
            [] => Err(Error::lookup(format!("no unit named {:?}", self))),
            [one] => Ok(*one),
            _ => Err(Error::lookup(format!(
                "unit name {:?} is ambiguous; select by (name, version)",
                self
            ))),
        }
    }
}

impl DescribesHdu for String {
    fn resolve(&self, hdus: &[Hdu]) -> Result<usize> {
        self.as_str().resolve(hdus)
    }
}

impl DescribesHdu for (&str, i64) {
    fn resolve(&self, hdus: &[Hdu]) -> Result<usize> {
        let (name, version) = *self;
        hdus.iter()
            .position(|h| h.name().as_deref() == Some(name) && h.version() == version)
            .ok_or_else(|| Error::lookup(format!("no unit named ({:?}, {})", name, version)))
    }
}

/// An open container file: a non-empty ordered sequence of units.
///
/// Update-mode containers flush pending changes on [`FitsFile::close`] (or,
/// best-effort, on drop). Lazy views returned by [`FitsFile::image_view`]
/// alias the unit's backing bytes; closing the container while any view is
/// outstanding is an error.
#[derive(Debug)]
pub struct FitsFile {
    path: PathBuf,
    mode: FileOpenMode,
    hdus: Vec<Hdu>,
    closed: bool,
}

/// Builder for creating a new container file.
pub struct NewFitsFile {
    path: PathBuf,
    overwrite: bool,
}

impl FitsFile {
    /// Open an existing container in read-only mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(path.as_ref(), FileOpenMode::ReadOnly)
    }

    /// Open an existing container for editing.
    pub fn edit<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(path.as_ref(), FileOpenMode::ReadWrite)
    }

    /// Return a builder for creating a new container file.
    pub fn create<P: AsRef<Path>>(path: P) -> NewFitsFile {
        NewFitsFile {
            path: path.as_ref().to_path_buf(),
            overwrite: false,
        }
    }

    /// Open `path` for editing, run `f`, then flush and release exactly
    /// once, whether `f` succeeds or fails.
    pub fn with_edit<P, T, F>(path: P, f: F) -> Result<T>
    where
        P: AsRef<Path>,
        F: FnOnce(&mut FitsFile) -> Result<T>,
    {
        let mut file = FitsFile::edit(path)?;
        let result = f(&mut file);
        let flushed = file.close();
        let value = result?;
        flushed?;
        Ok(value)
    }

    fn load(path: &Path, mode: FileOpenMode) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        let hdus = parse_units(&bytes)?;
        validate_unique_names(&hdus)?;
        debug!("loaded {} unit(s) from {}", hdus.len(), path.display());
        Ok(FitsFile {
            path: path.to_path_buf(),
            mode,
            hdus,
            closed: false,
        })
    }

    /// The file path this container was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The open mode.
    pub fn mode(&self) -> FileOpenMode {
        self.mode
    }

    /// Number of units in the container.
    pub fn num_units(&self) -> usize {
        self.hdus.len()
    }

    /// All units in order.
    pub fn units(&self) -> &[Hdu] {
        &self.hdus
    }

    /// The primary (first) unit.
    pub fn primary(&self) -> &Hdu {
        &self.hdus[0]
    }

    /// Mutable access to the primary unit.
    pub fn primary_mut(&mut self) -> &mut Hdu {
        &mut self.hdus[0]
    }

    /// The unit selected by `desc` (index, name, or name+version pair).
    pub fn hdu<D: DescribesHdu>(&self, desc: D) -> Result<&Hdu> {
        let idx = desc.resolve(&self.hdus)?;
        Ok(&self.hdus[idx])
    }

    /// Mutable access to the unit selected by `desc`.
    pub fn hdu_mut<D: DescribesHdu>(&mut self, desc: D) -> Result<&mut Hdu> {
        let idx = desc.resolve(&self.hdus)?;
        Ok(&mut self.hdus[idx])
    }

    /// One inventory line per unit, in order.
    pub fn list_units(&self) -> Result<Vec<UnitSummary>> {
        self.hdus
            .iter()
            .enumerate()
            .map(|(i, h)| h.summary(i))
            .collect()
    }

    /// Eagerly decode the payload of the selected unit.
    pub fn data<D: DescribesHdu>(&self, desc: D) -> Result<HduData> {
        let hdu = self.hdu(desc)?;
        match hdu.info()? {
            HduInfo::Primary { bitpix, .. } | HduInfo::Image { bitpix, .. } => {
                let raw = hdu.raw().borrow();
                Ok(HduData::Image(decode_image(&raw, bitpix)?))
            }
            HduInfo::AsciiTable { .. } => {
                let raw = hdu.raw().borrow();
                Ok(HduData::Table(decode_table(&raw, hdu.header())?))
            }
        }
    }

    /// A lazy view of the selected unit's image payload.
    ///
    /// The view aliases the unit's backing bytes: elements are decoded on
    /// access and writes are visible to subsequent [`FitsFile::data`] calls
    /// and to `save`.
    pub fn image_view<D: DescribesHdu>(&self, desc: D) -> Result<ImageView> {
        let hdu = self.hdu(desc)?;
        match hdu.info()? {
            HduInfo::Primary { bitpix, naxes } | HduInfo::Image { bitpix, naxes } => {
                Ok(ImageView::new(Rc::clone(hdu.raw()), bitpix, naxes))
            }
            HduInfo::AsciiTable { .. } => {
                Err(Error::format("unit payload is a table, not an image"))
            }
        }
    }

    /// Replace the selected unit's image payload, updating the shape
    /// keywords to match.
    pub fn write_image<D: DescribesHdu>(
        &mut self,
        desc: D,
        naxes: &[usize],
        data: &ImageData,
    ) -> Result<()> {
        check_image_shape(naxes, data)?;
        let hdu = self.hdu_mut(desc)?;
        match hdu.info()? {
            HduInfo::Primary { .. } | HduInfo::Image { .. } => {}
            HduInfo::AsciiTable { .. } => {
                return Err(Error::format("unit payload is a table, not an image"))
            }
        }
        apply_image_shape(hdu.header_mut(), data.bitpix(), naxes)?;
        hdu.replace_raw(encode_image(data));
        Ok(())
    }

    /// Replace the selected unit's table payload, updating the layout
    /// keywords to match.
    pub fn write_table<D: DescribesHdu>(&mut self, desc: D, table: &TableData) -> Result<()> {
        let hdu = self.hdu_mut(desc)?;
        match hdu.info()? {
            HduInfo::AsciiTable { .. } => {}
            _ => return Err(Error::format("unit payload is an image, not a table")),
        }
        let layout = plan_layout(table.columns());
        let raw = encode_table(table.columns(), &layout)?;
        apply_table_layout(hdu.header_mut(), table.columns(), &layout)?;
        hdu.replace_raw(raw);
        Ok(())
    }

    /// Append a new image extension named `extname`.
    ///
    /// Returns the new unit's index.
    pub fn append_image(
        &mut self,
        extname: &str,
        naxes: &[usize],
        data: &ImageData,
    ) -> Result<usize> {
        check_image_shape(naxes, data)?;
        self.check_name_free(extname, 1)?;
        let header = build_image_extension_header(data.bitpix(), naxes, Some(extname))?;
        self.hdus.push(Hdu::new(header, encode_image(data)));
        Ok(self.hdus.len() - 1)
    }

    /// Append a new table extension named `extname`.
    ///
    /// Returns the new unit's index.
    pub fn append_table(&mut self, extname: &str, table: &TableData) -> Result<usize> {
        self.check_name_free(extname, 1)?;
        let layout = plan_layout(table.columns());
        let raw = encode_table(table.columns(), &layout)?;
        let header = build_table_header(table.columns(), &layout, Some(extname))?;
        self.hdus.push(Hdu::new(header, raw));
        Ok(self.hdus.len() - 1)
    }

    fn check_name_free(&self, name: &str, version: i64) -> Result<()> {
        let taken = self
            .hdus
            .iter()
            .any(|h| h.name().as_deref() == Some(name) && h.version() == version);
        if taken {
            Err(Error::format(format!(
                "a unit named ({:?}, {}) already exists",
                name, version
            )))
        } else {
            Ok(())
        }
    }

    /// Serialize every unit in order into complete blocks.
    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for hdu in &self.hdus {
            out.extend_from_slice(&hdu.header().serialize());
            extend_data_padded(&mut out, &hdu.raw().borrow());
        }
        out
    }

    /// Write the container back to its original path.
    ///
    /// The write is atomic: bytes go to a temporary file in the same
    /// directory which is then renamed over the target, so a failed save
    /// never corrupts the existing file. Fails with [`Error::ReadOnly`] on
    /// a read-only container.
    pub fn save(&mut self) -> Result<()> {
        if self.mode == FileOpenMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        let bytes = self.serialize();
        atomic_write(&self.path, &bytes)?;
        debug!("saved {} unit(s) to {}", self.hdus.len(), self.path.display());
        Ok(())
    }

    /// Write the container to a different path (the original file and open
    /// mode are untouched).
    pub fn save_as<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.serialize();
        atomic_write(path.as_ref(), &bytes)?;
        debug!(
            "saved {} unit(s) to {}",
            self.hdus.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    fn live_views(&self) -> bool {
        self.hdus.iter().any(|h| h.has_live_views())
    }

    /// Flush pending changes (update mode) and release the container.
    ///
    /// Fails with [`Error::UseAfterClose`] if lazy data views are still
    /// outstanding: the backing bytes they alias must not be released out
    /// from under them.
    pub fn close(mut self) -> Result<()> {
        if self.live_views() {
            return Err(Error::UseAfterClose);
        }
        if self.mode == FileOpenMode::ReadWrite {
            self.save()?;
        }
        self.closed = true;
        Ok(())
    }
}

impl Drop for FitsFile {
    fn drop(&mut self) {
        if !self.closed && self.mode == FileOpenMode::ReadWrite {
            let _ = atomic_write(&self.path, &self.serialize());
        }
    }
}

impl NewFitsFile {
    /// Allow overwriting an existing file.
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Finalize creation: write a minimal primary unit (BITPIX=8, NAXIS=0)
    /// and return the container opened for editing.
    pub fn open(self) -> Result<FitsFile> {
        if !self.overwrite && self.path.exists() {
            return Err(Error::format(format!(
                "file already exists: {}",
                self.path.display()
            )));
        }

        let header = build_primary_header(8, &[])?;
        let mut file = FitsFile {
            path: self.path,
            mode: FileOpenMode::ReadWrite,
            hdus: vec![Hdu::new(header, Vec::new())],
            closed: false,
        };
        file.save()?;
        Ok(file)
    }
}

fn check_image_shape(naxes: &[usize], data: &ImageData) -> Result<()> {
    let expected: usize = if naxes.is_empty() {
        0
    } else {
        naxes.iter().product()
    };
    if expected != data.len() {
        return Err(Error::format(format!(
            "axis lengths {:?} imply {} elements but payload has {}",
            naxes,
            expected,
            data.len()
        )));
    }
    Ok(())
}

fn validate_unique_names(hdus: &[Hdu]) -> Result<()> {
    let mut seen = HashSet::new();
    for hdu in hdus {
        if let Some(name) = hdu.name() {
            if !seen.insert((name.clone(), hdu.version())) {
                return Err(Error::format(format!(
                    "duplicate unit name ({:?}, {})",
                    name,
                    hdu.version()
                )));
            }
        }
    }
    Ok(())
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

// ── Tests ──
