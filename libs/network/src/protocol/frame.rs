//! Wire Frame
//!
//! Every serialized message travels in one frame:
//!
//! ```text
//! ┌──────────┬─────────┬───────┬───────────┬────────────┬─────────┬──────────┐
//! │ "DMSH"   │ version │ flags │ algorithm │ length u32 │ payload │ crc32    │
//! │ 4 bytes  │ 1 byte  │ 1 B   │ 1 byte    │ LE         │ N bytes │ LE u32   │
//! └──────────┴─────────┴───────┴───────────┴────────────┴─────────┴──────────┘
//! ```
//!
//! The checksum covers everything before it.

use crate::{Result, TransportError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Wire format constants
pub struct WireFormat;

impl WireFormat {
    pub const MAGIC: &'static [u8; 4] = b"DMSH";
    pub const VERSION: u8 = 1;
    /// Magic, version, flags, algorithm id, payload length
    pub const HEADER_SIZE: usize = 4 + 1 + 1 + 1 + 4;
    pub const CHECKSUM_SIZE: usize = 4;
}

/// Frame flags packed into one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags {
    /// Payload is compressed with the frame's algorithm
    pub compressed: bool,
}

impl FrameFlags {
    const COMPRESSED: u8 = 0x01;

    pub fn to_byte(self) -> u8 {
        let mut byte = 0u8;
        if self.compressed {
            byte |= Self::COMPRESSED;
        }
        byte
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            compressed: byte & Self::COMPRESSED != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flags: FrameFlags,
    /// Compressor id; meaningful only when `flags.compressed` is set
    pub algorithm_id: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Uncompressed frame
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            flags: FrameFlags::default(),
            algorithm_id: 0,
            payload,
        }
    }

    pub fn compressed(algorithm_id: u8, payload: Vec<u8>) -> Self {
        Self {
            flags: FrameFlags { compressed: true },
            algorithm_id,
            payload,
        }
    }

    pub fn encoded_len(&self) -> usize {
        WireFormat::HEADER_SIZE + self.payload.len() + WireFormat::CHECKSUM_SIZE
    }

    /// Serialize to wire bytes, refusing payloads above `max_payload`
    pub fn encode(&self, max_payload: usize) -> Result<Vec<u8>> {
        check_size(self.payload.len(), max_payload)?;
        let length = u32::try_from(self.payload.len()).map_err(|_| {
            TransportError::protocol(format!(
                "Payload size {} does not fit a frame",
                self.payload.len()
            ))
        })?;

        let mut buffer = Vec::with_capacity(self.encoded_len());
        buffer.write_all(WireFormat::MAGIC)?;
        buffer.write_u8(WireFormat::VERSION)?;
        buffer.write_u8(self.flags.to_byte())?;
        buffer.write_u8(self.algorithm_id)?;
        buffer.write_u32::<LittleEndian>(length)?;
        buffer.write_all(&self.payload)?;

        let checksum = crc32fast::hash(&buffer);
        buffer.write_u32::<LittleEndian>(checksum)?;
        Ok(buffer)
    }

    /// Parse wire bytes; the input must hold exactly one frame
    pub fn decode(data: &[u8], max_payload: usize) -> Result<Self> {
        if data.len() < WireFormat::HEADER_SIZE + WireFormat::CHECKSUM_SIZE {
            return Err(TransportError::protocol(format!(
                "Frame too short: {} bytes",
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != *WireFormat::MAGIC {
            return Err(TransportError::protocol("Invalid magic bytes"));
        }

        let version = cursor.read_u8()?;
        if version != WireFormat::VERSION {
            return Err(TransportError::protocol(format!(
                "Unsupported frame version: {}",
                version
            )));
        }

        let checksum_pos = data.len() - WireFormat::CHECKSUM_SIZE;
        let mut tail = &data[checksum_pos..];
        let expected_checksum = tail.read_u32::<LittleEndian>()?;
        if crc32fast::hash(&data[..checksum_pos]) != expected_checksum {
            return Err(TransportError::protocol("Checksum mismatch"));
        }

        let flags = FrameFlags::from_byte(cursor.read_u8()?);
        let algorithm_id = cursor.read_u8()?;
        let length = cursor.read_u32::<LittleEndian>()? as usize;
        check_size(length, max_payload)?;

        if WireFormat::HEADER_SIZE + length != checksum_pos {
            return Err(TransportError::protocol(format!(
                "Payload length {} disagrees with frame size {}",
                length,
                data.len()
            )));
        }

        let mut payload = vec![0u8; length];
        cursor.read_exact(&mut payload)?;
        Ok(Self {
            flags,
            algorithm_id,
            payload,
        })
    }
}

fn check_size(size: usize, max_payload: usize) -> Result<()> {
    if size > max_payload {
        return Err(TransportError::protocol(format!(
            "Message size {} exceeds maximum {}",
            size, max_payload
        )));
    }
    Ok(())
}
