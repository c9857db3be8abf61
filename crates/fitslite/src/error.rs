use std::path::PathBuf;

/// All errors that can occur during container and table I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed structural bytes, an invalid header card, or inconsistent
    /// table rows.
    #[error("format error: {0}")]
    Format(String),
    /// Premature end of data while reading.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// The path does not exist and the open mode does not create it.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// A keyword, unit, or column was not found (or matched ambiguously).
    #[error("lookup failed: {0}")]
    Lookup(String),
    /// An index was out of bounds.
    #[error("index {index} out of range (length {len})")]
    Range { index: usize, len: usize },
    /// A container was closed (or asked to close) while lazy data views
    /// were still outstanding.
    #[error("container released while data views are still live")]
    UseAfterClose,
    /// A write was attempted on a container opened read-only.
    #[error("container is opened read-only")]
    ReadOnly,
    /// An I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a [`Error::Format`] with a formatted message.
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Shorthand for a [`Error::Lookup`] with a formatted message.
    pub(crate) fn lookup(msg: impl Into<String>) -> Self {
        Error::Lookup(msg.into())
    }
}
