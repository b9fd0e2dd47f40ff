//! On-disk layout of stream log files.
//!
//! ```text
//! [PROLOGUE: magic[7] | version:u32 | flags:u32]
//! [BLOCK]*
//!   BlockHeader { type:u8 | padding:u8 | stream_idx:u32 | data_size:u32 }
//!   payload[data_size]
//!     Stream block: stream_type:u8 | name:string | type_name:string | type_def:string
//!     Data block:   SampleHeader { realtime:time | timestamp:time | data_size:u32 | compressed:u8 }
//!                   raw[SampleHeader.data_size]
//! string := len:u32 | bytes[len]
//! time   := sec:u32 | usec:u32
//! ```
//!
//! All multi-byte integers are little-endian. For data blocks,
//! `BlockHeader.data_size == SAMPLE_HEADER_SIZE + SampleHeader.data_size`.

use crate::time::Time;

/// Magic bytes opening every log file.
pub const FORMAT_MAGIC: &[u8; 7] = b"POCOSIM";

/// Format version written in the prologue.
pub const FORMAT_VERSION: u32 = 2;

/// Prologue flag: payloads were written in big-endian order. Never set here.
pub const FLAG_BIG_ENDIAN: u32 = 1 << 0;

/// magic[7] + version:u32 + flags:u32 = 15
pub const PROLOGUE_SIZE: usize = 7 + 4 + 4;

/// type:u8 + padding:u8 + stream_idx:u32 + data_size:u32 = 10
pub const BLOCK_HEADER_SIZE: usize = 1 + 1 + 4 + 4;

/// realtime:8 + timestamp:8 + data_size:u32 + compressed:u8 = 21
pub const SAMPLE_HEADER_SIZE: usize = 8 + 8 + 4 + 1;

/// Size of an encoded time value.
pub const TIME_SIZE: usize = 8;

/// Kind of a block, first byte of every block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockType {
    /// Stream declaration
    Stream = 1,
    /// Sample of a declared stream
    Data = 2,
    /// Control command (time base changes)
    Control = 3,
}

/// Kind of a declared stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamType {
    Unknown = 0,
    Data = 1,
    Control = 2,
}

/// Commands carried by control blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    SetTimeBase = 0,
    SetTimeOffset = 1,
}

impl TryFrom<u8> for BlockType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            1 => Ok(BlockType::Stream),
            2 => Ok(BlockType::Data),
            3 => Ok(BlockType::Control),
            other => Err(other),
        }
    }
}

impl TryFrom<u8> for StreamType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(StreamType::Unknown),
            1 => Ok(StreamType::Data),
            2 => Ok(StreamType::Control),
            other => Err(other),
        }
    }
}

impl TryFrom<u8> for CommandType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(CommandType::SetTimeBase),
            1 => Ok(CommandType::SetTimeOffset),
            other => Err(other),
        }
    }
}

/// Header prefixing every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_type: BlockType,
    /// Reserved, always zero
    pub padding: u8,
    pub stream_idx: u32,
    /// Exact length of the payload following this header
    pub data_size: u32,
}

impl BlockHeader {
    pub fn new(block_type: BlockType, stream_idx: u32, data_size: u32) -> Self {
        Self {
            block_type,
            padding: 0,
            stream_idx,
            data_size,
        }
    }
}

/// Header opening the payload of a data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleHeader {
    /// Wall-clock time at which the sample was logged
    pub realtime: Time,
    /// Logical time of the sample
    pub timestamp: Time,
    /// Length of the raw payload following this header
    pub data_size: u32,
    /// Reserved for compressed payloads, always zero
    pub compressed: u8,
}

impl SampleHeader {
    pub fn new(realtime: Time, timestamp: Time, data_size: u32) -> Self {
        Self {
            realtime,
            timestamp,
            data_size,
            compressed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_ordinals() {
        assert_eq!(BlockType::Stream as u8, 1);
        assert_eq!(BlockType::Data as u8, 2);
        assert_eq!(StreamType::Data as u8, 1);
        assert_eq!(CommandType::SetTimeOffset as u8, 1);
    }

    #[test]
    fn test_enum_decoding() {
        assert_eq!(BlockType::try_from(2), Ok(BlockType::Data));
        assert_eq!(BlockType::try_from(0), Err(0));
        assert_eq!(StreamType::try_from(2), Ok(StreamType::Control));
        assert_eq!(CommandType::try_from(7), Err(7));
    }

    #[test]
    fn test_headers_default_reserved_fields() {
        assert_eq!(BlockHeader::new(BlockType::Data, 3, 25).padding, 0);
        assert_eq!(SampleHeader::new(Time::default(), Time::default(), 4).compressed, 0);
    }
}
