//! Sequential decoding of stream log files.
//!
//! The reader is the mirror image of [`Logfile`](crate::Logfile): it walks
//! the blocks of a file in order, checks that every sample belongs to a
//! previously declared stream, and returns the decoded fields.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::format::{
    BlockType, StreamType, BLOCK_HEADER_SIZE, FLAG_BIG_ENDIAN, FORMAT_MAGIC, FORMAT_VERSION,
    PROLOGUE_SIZE, SAMPLE_HEADER_SIZE,
};
use crate::time::Time;

/// A decoded stream declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDeclaration {
    pub stream_idx: u32,
    pub stream_type: StreamType,
    pub name: String,
    pub type_name: String,
    /// Empty when the writer had no definition for the type
    pub type_def: String,
}

/// A decoded sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample<'a> {
    pub stream_idx: u32,
    pub realtime: Time,
    pub timestamp: Time,
    pub compressed: bool,
    /// Raw payload, borrowed from the log data
    pub data: &'a [u8],
}

/// One block of a log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block<'a> {
    Declaration(StreamDeclaration),
    Sample(Sample<'a>),
}

/// Reader over the bytes of a complete log file.
///
/// # How It Works
///
/// The prologue is checked by [`LogReader::new`]. Each call to
/// [`LogReader::read_block`] then decodes one block. A block cut short by
/// the end of the data is the trace of an interrupted writer: it is
/// discarded and reading stops there. Control blocks are skipped.
///
/// # Examples
///
/// ```
/// # use stream_logfile::{Block, Logfile, LogReader, StreamType, Time};
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("run.log");
/// # let mut logfile = Logfile::create(&path).unwrap();
/// # logfile.write_stream_declaration(0, StreamType::Data, "imu", "Vector3d", "").unwrap();
/// # let t = Time::from_seconds_micros(100, 0);
/// # logfile.write_sample(0, t, t, &[1, 2, 3, 4]).unwrap();
/// # logfile.close().unwrap();
/// let data = std::fs::read(&path).unwrap();
/// let mut reader = LogReader::new(&data).unwrap();
///
/// while let Some(block) = reader.read_block().unwrap() {
///     match block {
///         Block::Declaration(decl) => println!("stream {} = {}", decl.stream_idx, decl.name),
///         Block::Sample(sample) => println!("{} bytes at {}", sample.data.len(), sample.timestamp),
///     }
/// }
/// ```
pub struct LogReader<'a> {
    data: &'a [u8],
    pos: usize,
    streams: HashMap<u32, StreamDeclaration>,
}

impl<'a> LogReader<'a> {
    /// Creates a reader, validating the file prologue.
    ///
    /// # Errors
    ///
    /// `Error::Corrupt` for a missing or foreign prologue, an unsupported
    /// version, or big-endian payloads.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut reader = Self {
            data,
            pos: 0,
            streams: HashMap::new(),
        };

        if data.len() < PROLOGUE_SIZE {
            return Err(Error::Corrupt("file shorter than its prologue".into()));
        }
        let magic = reader.read_bytes(FORMAT_MAGIC.len()).unwrap_or_default();
        if magic != FORMAT_MAGIC {
            return Err(Error::Corrupt("invalid magic bytes".into()));
        }
        let version = reader.read_u32().unwrap_or_default();
        if version != FORMAT_VERSION {
            return Err(Error::Corrupt(format!("unsupported format version {}", version)));
        }
        let flags = reader.read_u32().unwrap_or_default();
        if flags & FLAG_BIG_ENDIAN != 0 {
            return Err(Error::Corrupt("big-endian log files are not supported".into()));
        }

        Ok(reader)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.read_bytes(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_time(&mut self) -> Option<Time> {
        let sec = self.read_u32()?;
        let usec = self.read_u32()?;
        Some(Time::from_seconds_micros(sec as i64, usec as i64))
    }

    fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn read_string(&mut self) -> Option<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Reads the next block.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(block))` - The next declaration or sample
    /// * `Ok(None)` - End of data, or a truncated trailing block
    ///
    /// # Errors
    ///
    /// * `Error::UndeclaredStream` - A sample for a stream never declared
    /// * `Error::DuplicateDeclaration` - A stream declared twice
    /// * `Error::Corrupt` - Unknown block type or inconsistent sizes
    pub fn read_block(&mut self) -> Result<Option<Block<'a>>> {
        loop {
            if self.pos >= self.data.len() {
                return Ok(None);
            }

            let start = self.pos;
            let header = match self.read_bytes(BLOCK_HEADER_SIZE) {
                Some(header) => header,
                None => return Ok(self.truncated(start)),
            };
            let block_type = header[0];
            let stream_idx = u32::from_le_bytes([header[2], header[3], header[4], header[5]]);
            let data_size = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;

            let payload = match self.read_bytes(data_size) {
                Some(payload) => payload,
                None => return Ok(self.truncated(start)),
            };

            match BlockType::try_from(block_type) {
                Ok(BlockType::Stream) => {
                    return self.decode_declaration(stream_idx, payload).map(Some);
                }
                Ok(BlockType::Data) => {
                    return self.decode_sample(stream_idx, payload).map(Some);
                }
                Ok(BlockType::Control) => {
                    trace!(offset = start, "skipping control block");
                }
                Err(other) => {
                    return Err(Error::Corrupt(format!(
                        "unknown block type {} at offset {}",
                        other, start
                    )));
                }
            }
        }
    }

    fn truncated(&mut self, start: usize) -> Option<Block<'a>> {
        warn!(
            offset = start,
            remaining = self.data.len() - start,
            "discarding truncated trailing block"
        );
        self.pos = self.data.len();
        None
    }

    fn decode_declaration(&mut self, stream_idx: u32, payload: &'a [u8]) -> Result<Block<'a>> {
        let mut fields = LogReader {
            data: payload,
            pos: 0,
            streams: HashMap::new(),
        };
        let corrupt = || Error::Corrupt(format!("malformed declaration of stream {}", stream_idx));

        let stream_type = fields
            .read_u8()
            .and_then(|t| StreamType::try_from(t).ok())
            .ok_or_else(corrupt)?;
        let name = fields.read_string().ok_or_else(corrupt)?;
        let type_name = fields.read_string().ok_or_else(corrupt)?;
        let type_def = fields.read_string().ok_or_else(corrupt)?;
        if fields.pos != payload.len() {
            return Err(corrupt());
        }

        if self.streams.contains_key(&stream_idx) {
            return Err(Error::DuplicateDeclaration(stream_idx));
        }
        let declaration = StreamDeclaration {
            stream_idx,
            stream_type,
            name,
            type_name,
            type_def,
        };
        self.streams.insert(stream_idx, declaration.clone());
        Ok(Block::Declaration(declaration))
    }

    fn decode_sample(&mut self, stream_idx: u32, payload: &'a [u8]) -> Result<Block<'a>> {
        if !self.streams.contains_key(&stream_idx) {
            return Err(Error::UndeclaredStream(stream_idx));
        }

        let mut fields = LogReader {
            data: payload,
            pos: 0,
            streams: HashMap::new(),
        };
        let corrupt = || Error::Corrupt(format!("malformed sample of stream {}", stream_idx));

        let realtime = fields.read_time().ok_or_else(corrupt)?;
        let timestamp = fields.read_time().ok_or_else(corrupt)?;
        let data_size = fields.read_u32().ok_or_else(corrupt)? as usize;
        let compressed = fields.read_u8().ok_or_else(corrupt)? != 0;
        if SAMPLE_HEADER_SIZE + data_size != payload.len() {
            return Err(Error::Corrupt(format!(
                "sample of stream {} announces {} bytes in a {}-byte block",
                stream_idx,
                data_size,
                payload.len()
            )));
        }

        Ok(Block::Sample(Sample {
            stream_idx,
            realtime,
            timestamp,
            compressed,
            data: &payload[SAMPLE_HEADER_SIZE..],
        }))
    }

    /// Declaration of `stream_idx`, if already read.
    pub fn stream(&self, stream_idx: u32) -> Option<&StreamDeclaration> {
        self.streams.get(&stream_idx)
    }

    /// Iterator over the remaining blocks, stopping after the first error.
    pub fn blocks(self) -> Blocks<'a> {
        Blocks {
            reader: self,
            failed: false,
        }
    }
}

/// Iterator returned by [`LogReader::blocks`].
pub struct Blocks<'a> {
    reader: LogReader<'a>,
    failed: bool,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = Result<Block<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.read_block() {
            Ok(block) => block.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
