//! Chunked scratch space for outbound packet serialization.
//!
//! Serializing every packet into its own allocation would put one heap round
//! trip on the hot path of every send. A `SendBuffer` instead carves small
//! reservations out of one large backing chunk: `open` hands out a writable
//! region, `close` finalizes how much of it was actually used and returns a
//! [`Bytes`] handle that shares the chunk's allocation. When a chunk runs
//! out it is replaced, not grown; superseded chunks stay alive only as long
//! as regions carved from them do.
//!
//! One `SendBuffer` belongs to one serializing context (a room actor, a
//! client send loop). It is deliberately not a shared global: whoever owns
//! the serialization path owns its scratch space.

use bytes::{Bytes, BytesMut};

/// Default backing chunk size: room for a hundred maximum-size frames.
pub const SEND_CHUNK_SIZE: usize = 65535 * 100;

/// Chunk-backed allocator for outgoing byte regions.
pub struct SendBuffer {
    chunk: BytesMut,
    chunk_size: usize,
}

impl SendBuffer {
    pub fn new() -> Self {
        Self::with_chunk_size(SEND_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk: BytesMut::with_capacity(chunk_size),
            chunk_size,
        }
    }

    /// Bytes still available in the current chunk.
    pub fn free_size(&self) -> usize {
        self.chunk.capacity() - self.chunk.len()
    }

    /// Reserves exactly `reserve` writable bytes, replacing the chunk first
    /// if the current one cannot fit them.
    ///
    /// Every `open` must be paired with a [`close`](Self::close) before the
    /// next `open`; an unclosed reservation is discarded by the next call.
    pub fn open(&mut self, reserve: usize) -> &mut [u8] {
        // Drop any unclosed reservation from a mispaired call.
        self.chunk.truncate(0);
        if self.chunk.capacity() < reserve {
            self.chunk = BytesMut::with_capacity(self.chunk_size.max(reserve));
        }
        self.chunk.resize(reserve, 0);
        &mut self.chunk[..]
    }

    /// Finalizes the open reservation: the first `used` bytes become an
    /// immutable region ready for transmission, the rest of the reservation
    /// returns to the chunk.
    pub fn close(&mut self, used: usize) -> Bytes {
        debug_assert!(used <= self.chunk.len(), "close({used}) exceeds open reservation");
        self.chunk.truncate(used);
        self.chunk.split_to(used).freeze()
    }
}

impl Default for SendBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close_returns_written_region() {
        let mut buf = SendBuffer::with_chunk_size(64);
        let region = buf.open(8);
        region.copy_from_slice(b"abcdefgh");
        let sealed = buf.close(8);
        assert_eq!(&sealed[..], b"abcdefgh");
    }

    #[test]
    fn test_close_shorter_than_reservation() {
        let mut buf = SendBuffer::with_chunk_size(64);
        let region = buf.open(16);
        region[..3].copy_from_slice(b"abc");
        let sealed = buf.close(3);
        assert_eq!(&sealed[..], b"abc");
        // Unused reservation space returned to the chunk
        assert_eq!(buf.free_size(), 61);
    }

    #[test]
    fn test_used_size_grows_monotonically_within_chunk() {
        let mut buf = SendBuffer::with_chunk_size(32);
        let free_before = buf.free_size();
        let _ = buf.open(10);
        let first = buf.close(10);
        let _ = buf.open(10);
        let second = buf.close(10);
        assert_eq!(buf.free_size(), free_before - 20);
        // Earlier regions are unaffected by later carving
        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 10);
    }

    #[test]
    fn test_chunk_replaced_when_exhausted() {
        let mut buf = SendBuffer::with_chunk_size(16);
        let region = buf.open(12);
        region.copy_from_slice(b"0123456789ab");
        let first = buf.close(12);
        assert!(buf.free_size() < 12);

        // Forces a fresh chunk; the old region stays intact
        let region = buf.open(12);
        region.copy_from_slice(b"cdefghijklmn");
        let second = buf.close(12);

        assert_eq!(&first[..], b"0123456789ab");
        assert_eq!(&second[..], b"cdefghijklmn");
    }

    #[test]
    fn test_reservation_larger_than_chunk_size() {
        let mut buf = SendBuffer::with_chunk_size(8);
        let region = buf.open(100);
        assert_eq!(region.len(), 100);
        let sealed = buf.close(100);
        assert_eq!(sealed.len(), 100);
    }

    #[test]
    fn test_regions_are_cheap_to_clone() {
        let mut buf = SendBuffer::with_chunk_size(32);
        buf.open(4).copy_from_slice(b"ping");
        let sealed = buf.close(4);
        let other = sealed.clone();
        // Same backing storage, not a copy
        assert_eq!(sealed.as_ptr(), other.as_ptr());
    }
}
