//! Error types for pixstore.
//!
//! Every failing operation returns exactly one [`Error`]; its [`ErrorKind`]
//! is the machine-readable code and its `Display` output the diagnostic.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pixstore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FileOpen,
    FileSeek,
    FileRead,
    FileWrite,
    BadData,
    InvalidArgument,
    BufferFull,
    MemoryAllocation,
    Unsupported,
    ItemNotFound,
    Exists,
}

/// Error type shared by all pixstore components.
#[derive(Error, Debug)]
pub enum Error {
    /// A file could not be opened or created.
    #[error("cannot open file \"{}\": {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Seeking within a file failed.
    #[error("cannot seek in file \"{}\" to position {position}: {source}", path.display())]
    FileSeek {
        path: PathBuf,
        position: u64,
        #[source]
        source: std::io::Error,
    },

    /// Reading from a file failed.
    #[error("cannot read from file \"{}\": {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing to a file failed.
    #[error("cannot write to file \"{}\": {source}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File contents do not match the expected format, or the files of a
    /// stream disagree with each other.
    #[error("invalid data in \"{}\": {message}", path.display())]
    BadData { path: PathBuf, message: String },

    /// An argument is out of range or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A frame other than the first was requested from a stream that has
    /// no index file and whose layout cannot be addressed without one.
    #[error("cannot open frame {index} of \"{}\": index file missing", path.display())]
    MissingIndex { path: PathBuf, index: u64 },

    /// The fixed-capacity event buffer cannot take the requested events.
    #[error("event buffer full: {requested} events requested, {available} available")]
    BufferFull { requested: usize, available: usize },

    /// A buffer could not be allocated.
    #[error("cannot allocate {0} bytes")]
    MemoryAllocation(usize),

    /// The element type / layout combination is not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Metadata lookup failed.
    #[error("metadata item \"{0}\" not found")]
    ItemNotFound(String),

    /// Metadata insert collided with an existing key.
    #[error("metadata item \"{0}\" already exists")]
    Exists(String),
}

impl Error {
    /// Returns the machine-readable classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileOpen { .. } => ErrorKind::FileOpen,
            Self::FileSeek { .. } => ErrorKind::FileSeek,
            Self::FileRead { .. } => ErrorKind::FileRead,
            Self::FileWrite { .. } => ErrorKind::FileWrite,
            Self::BadData { .. } => ErrorKind::BadData,
            Self::InvalidArgument(_) | Self::MissingIndex { .. } => ErrorKind::InvalidArgument,
            Self::BufferFull { .. } => ErrorKind::BufferFull,
            Self::MemoryAllocation(_) => ErrorKind::MemoryAllocation,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::ItemNotFound(_) => ErrorKind::ItemNotFound,
            Self::Exists(_) => ErrorKind::Exists,
        }
    }

    /// Builds a [`Error::BadData`] for `path`.
    pub fn bad_data(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::BadData {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Classifies a read failure: a short read means the file is truncated
    /// or malformed, anything else is an I/O failure.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::BadData {
                path,
                message: "unexpected end of file".to_string(),
            }
        } else {
            Self::FileRead { path, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_index_is_invalid_argument() {
        let err = Error::MissingIndex {
            path: PathBuf::from("stream.bin"),
            index: 3,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("frame 3"));
    }

    #[test]
    fn test_short_read_is_bad_data() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(Error::read("a", eof).kind(), ErrorKind::BadData);

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert_eq!(Error::read("a", denied).kind(), ErrorKind::FileRead);
    }

    #[test]
    fn test_message_carries_path() {
        let err = Error::bad_data("/tmp/x.dsc", "header mismatch");
        assert_eq!(
            err.to_string(),
            "invalid data in \"/tmp/x.dsc\": header mismatch"
        );
    }
}
