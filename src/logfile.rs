//! Typed encoding of stream log files.
//!
//! `Logfile` is the only path through which bytes reach a [`File`]. It owns
//! the byte-order rules of the format and the bookkeeping of stream indices.

use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{size_field, Error, Result};
use crate::file::{File, DEFAULT_BUFFER_SIZE};
use crate::format::{
    BlockHeader, BlockType, CommandType, SampleHeader, StreamType, FORMAT_MAGIC, FORMAT_VERSION,
    SAMPLE_HEADER_SIZE, TIME_SIZE,
};
use crate::time::Time;

mod sealed {
    pub trait Sealed {}
}

/// A value with a defined on-disk shape.
///
/// The set of implementors is closed: unsigned 8/16/32-bit integers,
/// strings, [`Time`], [`BlockHeader`], [`SampleHeader`] and the three
/// protocol enums. Writing anything else is a compile error:
///
/// ```compile_fail
/// # use stream_logfile::Logfile;
/// fn log_u64(file: &mut Logfile) {
///     file.write(&42u64).unwrap();
/// }
/// ```
pub trait Encode: sealed::Sealed {
    /// Number of bytes this value occupies on disk.
    fn encoded_size(&self) -> usize;

    /// Writes the value through `out`. Prefer [`Logfile::write`].
    fn encode(&self, out: &mut Logfile) -> Result<()>;
}

macro_rules! encode_integer {
    ($($ty:ty),*) => {$(
        impl sealed::Sealed for $ty {}

        impl Encode for $ty {
            fn encoded_size(&self) -> usize {
                std::mem::size_of::<$ty>()
            }

            fn encode(&self, out: &mut Logfile) -> Result<()> {
                out.write_raw(&self.to_le_bytes())
            }
        }
    )*};
}

encode_integer!(u8, u16, u32);

impl sealed::Sealed for str {}

impl Encode for str {
    fn encoded_size(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, out: &mut Logfile) -> Result<()> {
        let length = size_field("string", self.len())?;
        out.write(&length)?.write_raw(self.as_bytes())
    }
}

impl sealed::Sealed for String {}

impl Encode for String {
    fn encoded_size(&self) -> usize {
        self.as_str().encoded_size()
    }

    fn encode(&self, out: &mut Logfile) -> Result<()> {
        self.as_str().encode(out)
    }
}

impl sealed::Sealed for Time {}

impl Encode for Time {
    fn encoded_size(&self) -> usize {
        TIME_SIZE
    }

    fn encode(&self, out: &mut Logfile) -> Result<()> {
        let (sec, usec) = self.to_timeval();
        out.write(&sec)?.write(&usec)?;
        Ok(())
    }
}

impl sealed::Sealed for BlockHeader {}

impl Encode for BlockHeader {
    fn encoded_size(&self) -> usize {
        self.block_type.encoded_size()
            + self.padding.encoded_size()
            + self.stream_idx.encoded_size()
            + self.data_size.encoded_size()
    }

    fn encode(&self, out: &mut Logfile) -> Result<()> {
        out.write(&self.block_type)?
            .write(&self.padding)?
            .write(&self.stream_idx)?
            .write(&self.data_size)?;
        Ok(())
    }
}

impl sealed::Sealed for SampleHeader {}

impl Encode for SampleHeader {
    fn encoded_size(&self) -> usize {
        self.realtime.encoded_size()
            + self.timestamp.encoded_size()
            + self.data_size.encoded_size()
            + self.compressed.encoded_size()
    }

    fn encode(&self, out: &mut Logfile) -> Result<()> {
        out.write(&self.realtime)?
            .write(&self.timestamp)?
            .write(&self.data_size)?
            .write(&self.compressed)?;
        Ok(())
    }
}

macro_rules! encode_enum {
    ($($ty:ty),*) => {$(
        impl sealed::Sealed for $ty {}

        impl Encode for $ty {
            fn encoded_size(&self) -> usize {
                1
            }

            fn encode(&self, out: &mut Logfile) -> Result<()> {
                out.write(&(*self as u8))?;
                Ok(())
            }
        }
    )*};
}

encode_enum!(BlockType, StreamType, CommandType);

/// A log file shared between several stream loggers.
///
/// One lock guards the whole encoder, which keeps every block (header and
/// payload) contiguous in the file.
pub type SharedLogfile = Arc<Mutex<Logfile>>;

/// Writer of stream log files.
///
/// A `Logfile` owns its [`File`] sink, allocates stream indices and emits
/// the two block kinds of the format: stream declarations and samples.
/// Samples are refused for streams that were never declared, and a stream
/// cannot be declared twice.
///
/// # Thread Safety
///
/// `Logfile` is a plain single-writer object; all methods take `&mut self`.
/// To log from several places at once, wrap it with [`Logfile::shared`] and
/// hand the resulting [`SharedLogfile`] to each [`StreamLogger`].
///
/// [`StreamLogger`]: crate::StreamLogger
///
/// # Examples
///
/// ```
/// # use stream_logfile::{Logfile, StreamType, Time};
/// # let dir = tempfile::tempdir().unwrap();
/// let mut logfile = Logfile::create(dir.path().join("run.log")).unwrap();
///
/// let imu = logfile.new_stream_index().unwrap();
/// logfile
///     .write_stream_declaration(imu, StreamType::Data, "imu", "Vector3d", "")
///     .unwrap();
///
/// let t = Time::from_seconds_micros(100, 0);
/// logfile.write_sample(imu, t, t, &[1, 2, 3, 4]).unwrap();
/// logfile.close().unwrap();
/// ```
pub struct Logfile {
    file: File,
    // `None` once every u32 index has been handed out
    next_stream_idx: Option<u32>,
    declared: HashSet<u32>,
}

impl Logfile {
    /// Creates `path` with the default buffer size and writes the prologue.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    /// Creates `path` with a `buffer_size`-byte sink and writes the prologue.
    pub fn with_buffer_size(path: impl AsRef<Path>, buffer_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::with_capacity(path, buffer_size)?;
        write_prologue(&mut file)?;
        info!(path = %path.display(), buffer_size, "created stream log file");
        Ok(Self::new(file))
    }

    /// Wraps an existing sink.
    ///
    /// Nothing is written; the caller is responsible for the prologue (see
    /// [`write_prologue`]).
    pub fn new(file: File) -> Self {
        Self {
            file,
            next_stream_idx: Some(0),
            declared: HashSet::new(),
        }
    }

    /// Moves the log file behind a lock so that it can be shared.
    pub fn shared(self) -> SharedLogfile {
        Arc::new(Mutex::new(self))
    }

    /// Writes `value` in its little-endian on-disk shape.
    ///
    /// Returns `self` so that writes chain:
    ///
    /// ```
    /// # use stream_logfile::{File, Logfile};
    /// # let dir = tempfile::tempdir().unwrap();
    /// # let mut logfile = Logfile::new(File::create(dir.path().join("x")).unwrap());
    /// logfile.write(&1u8).unwrap().write(&0x0203u16).unwrap().write("name").unwrap();
    /// ```
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        value.encode(self)?;
        Ok(self)
    }

    /// Copies opaque payload bytes verbatim.
    ///
    /// This is how the bytes announced by [`Logfile::write_sample_header`]
    /// are supplied.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.file.write(data)?;
        Ok(())
    }

    /// Allocates the next stream index.
    ///
    /// Indices start at 0 and are never handed out twice.
    ///
    /// # Errors
    ///
    /// `Error::StreamIndexExhausted` once all `u32` indices are in use.
    pub fn new_stream_index(&mut self) -> Result<u32> {
        let idx = self.next_stream_idx.ok_or(Error::StreamIndexExhausted)?;
        self.next_stream_idx = idx.checked_add(1);
        Ok(idx)
    }

    /// Whether `stream_idx` has been declared in this file.
    pub fn is_declared(&self, stream_idx: u32) -> bool {
        self.declared.contains(&stream_idx)
    }

    /// Writes the declaration block of a stream.
    ///
    /// # Errors
    ///
    /// * `Error::DuplicateDeclaration` if `stream_idx` was already declared;
    ///   nothing is written in that case.
    /// * `Error::TooLarge` if the declaration does not fit a block.
    pub fn write_stream_declaration(
        &mut self,
        stream_idx: u32,
        stream_type: StreamType,
        name: &str,
        type_name: &str,
        type_def: &str,
    ) -> Result<()> {
        if self.is_declared(stream_idx) {
            return Err(Error::DuplicateDeclaration(stream_idx));
        }

        let payload_size = stream_type.encoded_size()
            + name.encoded_size()
            + type_name.encoded_size()
            + type_def.encoded_size();
        let header = BlockHeader::new(
            BlockType::Stream,
            stream_idx,
            size_field("stream declaration", payload_size)?,
        );

        self.write(&header)?
            .write(&stream_type)?
            .write(name)?
            .write(type_name)?
            .write(type_def)?;
        self.declared.insert(stream_idx);

        debug!(stream_idx, name, type_name, "declared stream");
        Ok(())
    }

    /// Writes the block and sample headers of a `size`-byte sample.
    ///
    /// Exactly `size` payload bytes must follow through
    /// [`Logfile::write_raw`] before any other block is written.
    ///
    /// # Errors
    ///
    /// `Error::UndeclaredStream` if `stream_idx` was never declared; nothing
    /// is written in that case.
    pub fn write_sample_header(
        &mut self,
        stream_idx: u32,
        realtime: Time,
        logical: Time,
        size: usize,
    ) -> Result<()> {
        if !self.is_declared(stream_idx) {
            return Err(Error::UndeclaredStream(stream_idx));
        }

        let data_size = size_field("sample payload", size)?;
        let block_size = size_field("data block", SAMPLE_HEADER_SIZE + size)?;

        let block = BlockHeader::new(BlockType::Data, stream_idx, block_size);
        let sample = SampleHeader::new(realtime, logical, data_size);
        self.write(&block)?.write(&sample)?;
        Ok(())
    }

    /// Writes a complete sample block.
    pub fn write_sample(
        &mut self,
        stream_idx: u32,
        realtime: Time,
        logical: Time,
        payload: &[u8],
    ) -> Result<()> {
        self.write_sample_header(stream_idx, realtime, logical, payload.len())?;
        self.write_raw(payload)
    }

    /// Pushes buffered bytes to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Flushes and closes the underlying file.
    pub fn close(self) -> Result<()> {
        self.file.close()?;
        Ok(())
    }

    /// Total bytes written so far, prologue included.
    pub fn bytes_written(&self) -> u64 {
        self.file.bytes_written()
    }
}

/// Writes the file prologue: magic, format version and flags.
///
/// Must be the first bytes of every log file.
pub fn write_prologue(file: &mut File) -> io::Result<()> {
    file.write(FORMAT_MAGIC)?;
    file.write(&FORMAT_VERSION.to_le_bytes())?;
    file.write(&0u32.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{BLOCK_HEADER_SIZE, PROLOGUE_SIZE};
    use tempfile::tempdir;

    /// Runs `f` on a prologue-less log file and returns the bytes it wrote.
    fn written(f: impl FnOnce(&mut Logfile)) -> Vec<u8> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("encode.log");
        let mut logfile = Logfile::new(File::create(&path).unwrap());
        f(&mut logfile);
        logfile.close().unwrap();
        std::fs::read(&path).unwrap()
    }

    #[test]
    fn test_integers_are_little_endian() {
        let bytes = written(|log| {
            log.write(&0xABu8).unwrap();
            log.write(&0x1234u16).unwrap();
            log.write(&0xDEADBEEFu32).unwrap();
        });
        assert_eq!(bytes, vec![0xAB, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let bytes = written(|log| {
            log.write("imu").unwrap();
            log.write(&String::new()).unwrap();
        });
        assert_eq!(bytes, vec![3, 0, 0, 0, b'i', b'm', b'u', 0, 0, 0, 0]);
    }

    #[test]
    fn test_time_is_seconds_then_micros() {
        let bytes = written(|log| {
            log.write(&Time::from_seconds_micros(100, 7)).unwrap();
        });
        assert_eq!(bytes, vec![100, 0, 0, 0, 7, 0, 0, 0]);
    }

    #[test]
    fn test_enums_are_single_bytes() {
        let bytes = written(|log| {
            log.write(&BlockType::Control)
                .unwrap()
                .write(&StreamType::Data)
                .unwrap()
                .write(&CommandType::SetTimeOffset)
                .unwrap();
        });
        assert_eq!(bytes, vec![3, 1, 1]);
    }

    #[test]
    fn test_header_sizes_match_layout() {
        let block = BlockHeader::new(BlockType::Data, 1, 2);
        let sample = SampleHeader::new(Time::default(), Time::default(), 0);
        assert_eq!(block.encoded_size(), BLOCK_HEADER_SIZE);
        assert_eq!(sample.encoded_size(), SAMPLE_HEADER_SIZE);

        let bytes = written(|log| {
            log.write(&block).unwrap().write(&sample).unwrap();
        });
        assert_eq!(bytes.len(), BLOCK_HEADER_SIZE + SAMPLE_HEADER_SIZE);
        assert_eq!(&bytes[..BLOCK_HEADER_SIZE], &[2, 0, 1, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn test_stream_indices_increase() {
        written(|log| {
            let first = log.new_stream_index().unwrap();
            let second = log.new_stream_index().unwrap();
            let third = log.new_stream_index().unwrap();
            assert_eq!((first, second, third), (0, 1, 2));
        });
    }

    #[test]
    fn test_stream_indices_run_out_at_u32_max() {
        written(|log| {
            log.next_stream_idx = Some(u32::MAX - 1);
            assert_eq!(log.new_stream_index().unwrap(), u32::MAX - 1);
            assert_eq!(log.new_stream_index().unwrap(), u32::MAX);
            let err = log.new_stream_index().unwrap_err();
            assert!(matches!(err, Error::StreamIndexExhausted));
            // Stays exhausted
            assert!(log.new_stream_index().is_err());
        });
    }

    #[test]
    fn test_declaration_block() {
        let bytes = written(|log| {
            log.write_stream_declaration(5, StreamType::Data, "a", "b", "")
                .unwrap();
            assert!(log.is_declared(5));
        });
        // stream_type + 3 strings = 1 + 5 + 5 + 4
        let mut expected = vec![1, 0, 5, 0, 0, 0, 15, 0, 0, 0, 1];
        expected.extend_from_slice(&[1, 0, 0, 0, b'a', 1, 0, 0, 0, b'b', 0, 0, 0, 0]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_duplicate_declaration_is_rejected() {
        let bytes = written(|log| {
            log.write_stream_declaration(0, StreamType::Data, "a", "b", "")
                .unwrap();
            let err = log
                .write_stream_declaration(0, StreamType::Data, "a", "b", "")
                .unwrap_err();
            assert!(matches!(err, Error::DuplicateDeclaration(0)));
        });
        assert_eq!(bytes.len(), BLOCK_HEADER_SIZE + 15);
    }

    #[test]
    fn test_sample_on_undeclared_stream_writes_nothing() {
        let bytes = written(|log| {
            let t = Time::from_seconds_micros(1, 0);
            let err = log.write_sample(3, t, t, &[1, 2]).unwrap_err();
            assert!(matches!(err, Error::UndeclaredStream(3)));
        });
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_sample_block_sizes() {
        let bytes = written(|log| {
            log.write_stream_declaration(0, StreamType::Data, "s", "t", "")
                .unwrap();
            let t = Time::from_seconds_micros(100, 0);
            log.write_sample(0, t, t, &[9, 8, 7]).unwrap();
        });
        let block = &bytes[BLOCK_HEADER_SIZE + 15..];
        let block_size = u32::from_le_bytes(block[6..10].try_into().unwrap()) as usize;
        assert_eq!(block_size, SAMPLE_HEADER_SIZE + 3);
        assert_eq!(block.len(), BLOCK_HEADER_SIZE + block_size);

        let sample = &block[BLOCK_HEADER_SIZE..];
        assert_eq!(u32::from_le_bytes(sample[16..20].try_into().unwrap()), 3);
        assert_eq!(sample[20], 0);
        assert_eq!(&sample[SAMPLE_HEADER_SIZE..], &[9, 8, 7]);
    }

    #[test]
    fn test_create_writes_prologue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prologue.log");
        let logfile = Logfile::create(&path).unwrap();
        assert_eq!(logfile.bytes_written(), PROLOGUE_SIZE as u64);
        logfile.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..7], b"POCOSIM");
        assert_eq!(&bytes[7..11], &FORMAT_VERSION.to_le_bytes());
        assert_eq!(&bytes[11..15], &[0, 0, 0, 0]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_sink_failure_surfaces_as_io_error() {
        let mut log = Logfile::new(File::with_capacity("/dev/full", 64).unwrap());
        // Fits the buffer, so nothing reaches the OS yet
        log.write_stream_declaration(0, StreamType::Data, "s", "t", "")
            .unwrap();

        let t = Time::from_seconds_micros(1, 0);
        let err = log.write_sample(0, t, t, &[0u8; 100]).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
