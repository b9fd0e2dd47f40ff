//! Buffered file sink for stream log files.
//!
//! Every byte of a log file goes through a `File`. Small writes are
//! accumulated in memory and handed to the OS in large blocking writes, so
//! the per-sample cost stays a memory copy.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::{error, trace};

/// Default capacity of the in-memory buffer: 4 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 4096 * 1024;

/// An OS file accepting only blocking, append-only writes.
///
/// Bytes are copied into a fixed-capacity buffer. When a write does not fit
/// in the remaining space the buffer is flushed first; a write larger than
/// the whole buffer bypasses it and goes straight to the OS.
///
/// # Shutdown
///
/// Dropping a `File` flushes whatever is still buffered. A failure at that
/// point cannot be returned, so it is only logged; call [`File::close`] to
/// observe it.
///
/// # Examples
///
/// ```
/// # use stream_logfile::File;
/// # let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("raw.bin");
/// let mut file = File::with_capacity(&path, 16).unwrap();
/// file.write(b"abc").unwrap();
/// assert_eq!(file.buffered_len(), 3);
/// file.close().unwrap();
/// assert_eq!(std::fs::read(&path).unwrap(), b"abc");
/// ```
pub struct File {
    inner: fs::File,
    buffer: Vec<u8>,
    capacity: usize,
    bytes_written: u64,
}

impl File {
    /// Creates (or truncates) `path` with the default 4 MiB buffer.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_capacity(path, DEFAULT_BUFFER_SIZE)
    }

    /// Creates (or truncates) `path` with a buffer of `capacity` bytes.
    ///
    /// A zero capacity is accepted and turns every write into a direct one.
    pub fn with_capacity(path: impl AsRef<Path>, capacity: usize) -> io::Result<Self> {
        let inner = fs::File::create(path)?;
        Ok(Self {
            inner,
            buffer: Vec::with_capacity(capacity),
            capacity,
            bytes_written: 0,
        })
    }

    /// Appends `data` to the file.
    ///
    /// # Errors
    ///
    /// Any OS write failure triggered by a flush is returned unchanged; the
    /// sink never retries.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.buffer.len() + data.len() > self.capacity {
            self.flush()?;
            if data.len() > self.capacity {
                trace!(len = data.len(), "direct write bypassing buffer");
                self.inner.write_all(data)?;
                self.bytes_written += data.len() as u64;
                return Ok(());
            }
        }
        self.buffer.extend_from_slice(data);
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Writes all buffered bytes to the OS and empties the buffer.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        trace!(len = self.buffer.len(), "flushing buffer");
        let result = self.inner.write_all(&self.buffer);
        self.buffer.clear();
        result
    }

    /// Flushes and closes the file, reporting any failure.
    pub fn close(mut self) -> io::Result<()> {
        self.flush()?;
        self.inner.sync_all()
    }

    /// Number of bytes currently held in memory.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Capacity of the in-memory buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total bytes accepted by `write` so far, buffered or not.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            error!(%err, "failed to flush log file on drop");
        }
    }
}
