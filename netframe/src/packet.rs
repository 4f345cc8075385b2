//! Length-prefixed packet framing over the raw byte stream.
//!
//! TCP has no message boundaries: one frame can arrive split across several
//! reads (fragmentation), and several frames can arrive in one read
//! (coalescing). The wire format here is
//! `[frame length: u16 little-endian, includes this header][payload]`,
//! so the decoder can always tell from the first two bytes whether a whole
//! frame is present.
//!
//! [`PacketSession`] adapts a [`PacketHandler`] — which sees whole frames
//! only — to the byte-oriented [`SessionHandler`] interface.

use std::net::SocketAddr;
use std::sync::Arc;

use log::trace;

use crate::error::SessionError;
use crate::session::{Session, SessionHandler};

/// Width of the length prefix. Two bytes caps a frame at 65535 bytes total.
pub const HEADER_SIZE: usize = 2;

/// Frame-level session callbacks. `on_recv_packet` always receives exactly
/// one complete frame, header included. The lifecycle callbacks default to
/// no-ops so handlers only spell out what they care about.
pub trait PacketHandler: Send + Sync + 'static {
    fn on_connected(&self, _session: &Arc<Session>, _peer: SocketAddr) {}

    /// One complete frame: `[len u16 LE][len - 2 bytes]`.
    fn on_recv_packet(&self, session: &Arc<Session>, frame: &[u8]);

    fn on_send(&self, _session: &Arc<Session>, _bytes: usize) {}

    fn on_disconnected(&self, _session: &Arc<Session>, _peer: SocketAddr) {}
}

/// Extracts every complete frame from the front of `data`, dispatching each
/// in order, and returns how many bytes were consumed. A partial header or
/// partial body stops the scan; those bytes stay in the receive buffer until
/// more data arrives.
///
/// A frame that declares a length smaller than the header can never
/// complete, so it is rejected as a protocol violation rather than left to
/// wedge the stream.
pub fn extract_frames(
    data: &[u8],
    mut dispatch: impl FnMut(&[u8]),
) -> Result<usize, SessionError> {
    let mut consumed = 0;

    loop {
        let rest = &data[consumed..];
        if rest.len() < HEADER_SIZE {
            break;
        }

        let frame_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        if frame_len < HEADER_SIZE {
            return Err(SessionError::FrameTooShort { len: frame_len });
        }
        if rest.len() < frame_len {
            // Fragmented: the tail of this frame is still in flight.
            break;
        }

        dispatch(&rest[..frame_len]);
        consumed += frame_len;
    }

    Ok(consumed)
}

/// Wraps a [`PacketHandler`], sealing `on_recv` with the framing decoder.
pub struct PacketSession<H> {
    handler: H,
}

impl<H: PacketHandler> PacketSession<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    /// The wrapped frame-level handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: PacketHandler> SessionHandler for PacketSession<H> {
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.handler.on_connected(session, peer);
    }

    fn on_recv(&self, session: &Arc<Session>, data: &[u8]) -> Result<usize, SessionError> {
        let mut frames = 0;
        let consumed = extract_frames(data, |frame| {
            frames += 1;
            self.handler.on_recv_packet(session, frame);
        })?;
        if frames > 1 {
            trace!(
                "session {}: {} coalesced frames in one receive",
                session.peer_addr(),
                frames
            );
        }
        Ok(consumed)
    }

    fn on_send(&self, session: &Arc<Session>, bytes: usize) {
        self.handler.on_send(session, bytes);
    }

    fn on_disconnected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.handler.on_disconnected(session, peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let len = (payload.len() + HEADER_SIZE) as u16;
        let mut out = len.to_le_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    fn collect(data: &[u8]) -> (usize, Vec<Vec<u8>>) {
        let mut frames = Vec::new();
        let consumed = extract_frames(data, |f| frames.push(f.to_vec())).unwrap();
        (consumed, frames)
    }

    #[test]
    fn test_single_complete_frame() {
        // length = 4: header plus a 2-byte body
        let data = [0x04, 0x00, 0x01, 0x00];
        let (consumed, frames) = collect(&data);
        assert_eq!(consumed, 4);
        assert_eq!(frames, vec![data.to_vec()]);
    }

    #[test]
    fn test_header_only_frame() {
        let data = [0x02, 0x00];
        let (consumed, frames) = collect(&data);
        assert_eq!(consumed, 2);
        assert_eq!(frames, vec![vec![0x02, 0x00]]);
    }

    #[test]
    fn test_partial_header_waits() {
        let (consumed, frames) = collect(&[0x04]);
        assert_eq!(consumed, 0);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_partial_body_waits() {
        // Declares 6 bytes, only 4 present
        let data = [0x06, 0x00, 0xAA, 0xBB];
        let (consumed, frames) = collect(&data);
        assert_eq!(consumed, 0);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_coalesced_frames_dispatch_in_order() {
        let mut data = frame(b"first");
        data.extend(frame(b"second"));
        data.extend(frame(b""));

        let (consumed, frames) = collect(&data);
        assert_eq!(consumed, data.len());
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][HEADER_SIZE..], b"first");
        assert_eq!(&frames[1][HEADER_SIZE..], b"second");
        assert_eq!(frames[2].len(), HEADER_SIZE);
    }

    #[test]
    fn test_complete_frames_before_partial_tail() {
        let mut data = frame(b"whole");
        data.extend([0x40, 0x00, 0x01]); // 64-byte frame, mostly missing
        let (consumed, frames) = collect(&data);
        assert_eq!(consumed, frame(b"whole").len());
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_runt_frame_is_a_protocol_violation() {
        for runt in [[0x00, 0x00], [0x01, 0x00]] {
            let err = extract_frames(&runt, |_| panic!("runt frame dispatched")).unwrap_err();
            match err {
                SessionError::FrameTooShort { len } => assert!(len < HEADER_SIZE),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_valid_frames_before_runt_are_not_dispatched_as_consumed() {
        // The scan fails atomically: an error reports no consumption, the
        // session disconnects rather than resynchronize.
        let mut data = frame(b"ok");
        data.extend([0x01, 0x00]);
        let mut seen = 0;
        let result = extract_frames(&data, |_| seen += 1);
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_maximum_length_frame() {
        let payload = vec![0x5A; 65535 - HEADER_SIZE];
        let data = frame(&payload);
        assert_eq!(data.len(), 65535);
        let (consumed, frames) = collect(&data);
        assert_eq!(consumed, 65535);
        assert_eq!(frames[0].len(), 65535);
    }

    #[test]
    fn test_arbitrary_split_points_reassemble_identically() {
        // Deliver the same three frames with every possible split point in
        // the first eight bytes; total dispatched frames must not depend on
        // the chunking.
        let mut stream = frame(b"alpha");
        stream.extend(frame(b"bravo"));
        stream.extend(frame(b"charlie"));

        for split in 0..=8 {
            let mut buffered = Vec::new();
            let mut frames = Vec::new();

            for chunk in [&stream[..split], &stream[split..]] {
                buffered.extend_from_slice(chunk);
                let consumed =
                    extract_frames(&buffered, |f| frames.push(f.to_vec())).unwrap();
                buffered.drain(..consumed);
            }

            assert_eq!(frames.len(), 3, "split at {split}");
            assert_eq!(&frames[0][HEADER_SIZE..], b"alpha");
            assert_eq!(&frames[1][HEADER_SIZE..], b"bravo");
            assert_eq!(&frames[2][HEADER_SIZE..], b"charlie");
            assert!(buffered.is_empty());
        }
    }
}
