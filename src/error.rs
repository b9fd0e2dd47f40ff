//! Error types for stream log files.
//!
//! I/O failures are fatal at this layer and are propagated as-is. The
//! remaining variants report protocol misuse by the caller (samples on
//! undeclared streams, double declarations) or malformed input on the
//! reading side.

use std::io;
use thiserror::Error;

/// Result type alias for log file operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while writing or reading a stream log file
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying OS open/write/close failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A sample referenced a stream index that was never declared
    #[error("stream {0} was never declared")]
    UndeclaredStream(u32),

    /// A stream index was declared a second time
    #[error("stream {0} is already declared")]
    DuplicateDeclaration(u32),

    /// A stream logger wrote a sample before `register_stream()`
    #[error("stream `{0}` is not registered")]
    StreamNotRegistered(String),

    /// `register_stream()` was called twice on the same stream logger
    #[error("stream `{0}` is already registered")]
    AlreadyRegistered(String),

    /// Every `u32` stream index has been allocated in this file
    #[error("no stream index left in this log file")]
    StreamIndexExhausted,

    /// A length does not fit the 32-bit size fields of the format
    #[error("{what} of {len} bytes exceeds the 32-bit size range")]
    TooLarge {
        /// What was being encoded
        what: &'static str,
        /// Offending length
        len: usize,
    },

    /// An incrementally written payload did not match its announced size
    #[error("payload size mismatch: announced {expected} bytes, got {actual}")]
    PayloadSizeMismatch {
        /// Size written in the sample header
        expected: usize,
        /// Bytes actually supplied
        actual: usize,
    },

    /// Malformed log data
    #[error("corrupt log file: {0}")]
    Corrupt(String),
}

/// Converts a length to the on-disk `u32` size field.
pub(crate) fn size_field(what: &'static str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::TooLarge { what, len })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = Error::from(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_size_field() {
        assert_eq!(size_field("payload", 42).unwrap(), 42);
        #[cfg(target_pointer_width = "64")]
        {
            let err = size_field("payload", u32::MAX as usize + 1).unwrap_err();
            assert!(matches!(err, Error::TooLarge { what: "payload", .. }));
        }
    }
}
