//! Linear receive buffer with compaction.
//!
//! The session reads from the socket into the free tail of the buffer and
//! hands the unread middle to its handler. Two cursors partition the storage:
//!
//! ```text
//! [----consumed----|-----data-----|-------free-------]
//!                  read_pos       write_pos
//! ```
//!
//! Between I/O operations `clean` reclaims the consumed prefix so the free
//! region stays large enough for the next read. A circular buffer would avoid
//! the copy, but a linear layout keeps every segment contiguous, which the
//! framing decoder and vectored reads both rely on.

/// Fixed-capacity byte buffer for one session's inbound stream.
///
/// Invariant: `read_pos <= write_pos <= capacity`.
pub struct RecvBuffer {
    buffer: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl RecvBuffer {
    /// Creates a buffer of `capacity` bytes, typically the maximum frame size.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Number of received bytes not yet consumed by the handler.
    pub fn data_size(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Number of bytes the next read may deposit.
    pub fn free_size(&self) -> usize {
        self.buffer.len() - self.write_pos
    }

    /// Unread data as a zero-copy view.
    pub fn read_segment(&self) -> &[u8] {
        &self.buffer[self.read_pos..self.write_pos]
    }

    /// Writable free region as a zero-copy view.
    pub fn write_segment(&mut self) -> &mut [u8] {
        &mut self.buffer[self.write_pos..]
    }

    /// Compacts the buffer: unread data moves to offset 0 and the consumed
    /// prefix becomes free space again.
    ///
    /// Only safe between I/O operations; callers must not hold a segment
    /// across this call (the borrow checker enforces that here).
    pub fn clean(&mut self) {
        let data_size = self.data_size();
        if data_size == 0 {
            // Nothing pending, cursor reset is enough.
            self.read_pos = 0;
            self.write_pos = 0;
        } else {
            self.buffer.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = data_size;
        }
    }

    /// Advances the read cursor after the handler consumed `n` bytes.
    ///
    /// Returns `false` without moving anything if `n` exceeds the unread
    /// data — the caller treats that as a protocol fault, not a crash.
    pub fn on_read(&mut self, n: usize) -> bool {
        if n > self.data_size() {
            return false;
        }
        self.read_pos += n;
        true
    }

    /// Advances the write cursor after the socket deposited `n` bytes.
    ///
    /// Returns `false` without moving anything if `n` exceeds the free
    /// space — a transport/protocol inconsistency the session must escalate.
    pub fn on_write(&mut self, n: usize) -> bool {
        if n > self.free_size() {
            return false;
        }
        self.write_pos += n;
        true
    }
}
