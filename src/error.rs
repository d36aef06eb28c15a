//! Error types for the tablekv storage primitives.

use std::fmt;
use std::io;

/// The result type used throughout tablekv.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for tablekv operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred while appending to or flushing a sink.
    Io(io::Error),

    /// Data corruption was detected while decoding.
    Corruption(String),

    /// An invalid argument was provided.
    InvalidArgument(String),

    /// A checksum mismatch was detected.
    ChecksumMismatch {
        /// The expected checksum value.
        expected: u32,
        /// The actual checksum value.
        actual: u32,
    },
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Corruption(msg) => write!(f, "Corruption: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::ChecksumMismatch { expected, actual } => {
                write!(f, "Checksum mismatch: expected {:#x}, got {:#x}", expected, actual)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

// The table builder stores its first error and hands copies back from
// `status()`. An `io::Error` is not `Clone`, so the copy keeps the kind
// and message but drops any inner source.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
            Error::Corruption(msg) => Error::Corruption(msg.clone()),
            Error::InvalidArgument(msg) => Error::InvalidArgument(msg.clone()),
            Error::ChecksumMismatch { expected, actual } => {
                Error::ChecksumMismatch { expected: *expected, actual: *actual }
            }
        }
    }
}
