//! Wire protocol shared by the demo server and client.
//!
//! Every packet is one frame of the netframe framing layer:
//!
//! ```text
//! [frame length: u16 LE, includes header][packet id: u16 LE][payload]
//! ```
//!
//! Payload fields are fixed-width little-endian integers; strings are a
//! u16 byte-length prefix followed by UTF-8 bytes. Packets serialize into
//! [`SendBuffer`] regions so a broadcast reuses one backing allocation
//! across every recipient.

use bytes::Bytes;
use netframe::{SendBuffer, HEADER_SIZE};
use thiserror::Error;

/// Byte offset of the packet id field within a frame.
pub const ID_OFFSET: usize = HEADER_SIZE;
/// Byte offset of the payload within a frame.
pub const PAYLOAD_OFFSET: usize = HEADER_SIZE + 2;
/// Largest value the length prefix can carry.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Demo packet identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PacketId {
    /// Client → server chat line.
    ClientChat = 1,
    /// Server → clients chat broadcast.
    ServerChat = 2,
}

impl PacketId {
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(PacketId::ClientChat),
            2 => Some(PacketId::ServerChat),
            _ => None,
        }
    }
}

/// Reads the packet id out of a complete frame.
pub fn packet_id(frame: &[u8]) -> Option<u16> {
    frame
        .get(ID_OFFSET..PAYLOAD_OFFSET)
        .map(|id| u16::from_le_bytes([id[0], id[1]]))
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("packet of {size} bytes exceeds the {MAX_FRAME_SIZE}-byte frame limit")]
    TooLarge { size: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame of {len} bytes is shorter than the {expected}-byte minimum for this packet")]
    Truncated { len: usize, expected: usize },
    #[error("unexpected packet id {got}, expected {expected}")]
    WrongId { got: u16, expected: u16 },
    #[error("string field is not valid utf-8")]
    BadString,
}

/// Incremental little-endian field writer over an open frame region.
struct FrameWriter<'a> {
    region: &'a mut [u8],
    pos: usize,
}

impl<'a> FrameWriter<'a> {
    fn new(region: &'a mut [u8], id: PacketId) -> Self {
        let len = region.len() as u16;
        region[..HEADER_SIZE].copy_from_slice(&len.to_le_bytes());
        region[ID_OFFSET..PAYLOAD_OFFSET].copy_from_slice(&(id as u16).to_le_bytes());
        Self {
            region,
            pos: PAYLOAD_OFFSET,
        }
    }

    fn put_u64(&mut self, value: u64) {
        self.region[self.pos..self.pos + 8].copy_from_slice(&value.to_le_bytes());
        self.pos += 8;
    }

    fn put_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        self.region[self.pos..self.pos + 2]
            .copy_from_slice(&(bytes.len() as u16).to_le_bytes());
        self.pos += 2;
        self.region[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }
}

/// Incremental field reader over a frame payload.
struct FrameReader<'a> {
    frame: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(frame: &'a [u8], expected: PacketId) -> Result<Self, DecodeError> {
        if frame.len() < PAYLOAD_OFFSET {
            return Err(DecodeError::Truncated {
                len: frame.len(),
                expected: PAYLOAD_OFFSET,
            });
        }
        let id = u16::from_le_bytes([frame[ID_OFFSET], frame[ID_OFFSET + 1]]);
        if id != expected as u16 {
            return Err(DecodeError::WrongId {
                got: id,
                expected: expected as u16,
            });
        }
        Ok(Self {
            frame,
            pos: PAYLOAD_OFFSET,
        })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos + n;
        if end > self.frame.len() {
            return Err(DecodeError::Truncated {
                len: self.frame.len(),
                expected: end,
            });
        }
        let slice = &self.frame[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn get_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn get_string(&mut self) -> Result<String, DecodeError> {
        let len_bytes = self.take(2)?;
        let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::BadString)
    }
}

/// Chat line sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientChat {
    pub chat: String,
}

impl ClientChat {
    /// `[header][id][chat len u16][chat bytes]`
    pub fn encode(&self, buf: &mut SendBuffer) -> Result<Bytes, EncodeError> {
        let size = PAYLOAD_OFFSET + 2 + self.chat.len();
        if size > MAX_FRAME_SIZE {
            return Err(EncodeError::TooLarge { size });
        }
        let mut writer = FrameWriter::new(buf.open(size), PacketId::ClientChat);
        writer.put_string(&self.chat);
        Ok(buf.close(size))
    }

    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = FrameReader::new(frame, PacketId::ClientChat)?;
        Ok(Self {
            chat: reader.get_string()?,
        })
    }
}

/// Chat broadcast from the server, attributed to a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerChat {
    pub player_id: u64,
    pub chat: String,
}

impl ServerChat {
    /// `[header][id][player id u64][chat len u16][chat bytes]`
    pub fn encode(&self, buf: &mut SendBuffer) -> Result<Bytes, EncodeError> {
        let size = PAYLOAD_OFFSET + 8 + 2 + self.chat.len();
        if size > MAX_FRAME_SIZE {
            return Err(EncodeError::TooLarge { size });
        }
        let mut writer = FrameWriter::new(buf.open(size), PacketId::ServerChat);
        writer.put_u64(self.player_id);
        writer.put_string(&self.chat);
        Ok(buf.close(size))
    }

    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = FrameReader::new(frame, PacketId::ServerChat)?;
        Ok(Self {
            player_id: reader.get_u64()?,
            chat: reader.get_string()?,
        })
    }
}
