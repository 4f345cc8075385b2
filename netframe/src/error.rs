use std::io;
use thiserror::Error;

/// Errors surfaced by the session layer.
///
/// Transport and protocol failures never cross a completion boundary as a
/// panic: the session resolves them by disconnecting and reports the cause
/// through logging. This type exists for the seams where a caller can still
/// react (receive handlers, the connector).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Underlying socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The transport reported more received bytes than the buffer had free.
    #[error("received {got} bytes but only {free} bytes were free")]
    BufferOverflow { got: usize, free: usize },

    /// A receive handler claimed to consume more bytes than were readable.
    #[error("handler consumed {consumed} bytes but only {available} were readable")]
    BadConsume { consumed: usize, available: usize },

    /// A frame declared a total length smaller than the framing header.
    #[error("frame length {len} is smaller than the {header}-byte header", header = crate::packet::HEADER_SIZE)]
    FrameTooShort { len: usize },

    /// Every connect attempt failed; carries the last socket error.
    #[error("connect failed after {attempts} attempt(s): {source}")]
    ConnectFailed { attempts: u32, source: io::Error },
}
