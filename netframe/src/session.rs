//! Per-connection asynchronous I/O engine.
//!
//! A [`Session`] owns one connected TCP stream and drives both directions:
//!
//! - **Receive**: a single spawned task loops compact → read → advance →
//!   dispatch to the handler → validate consumed bytes. One receive is in
//!   flight at a time by construction, so `on_recv` never races itself for
//!   the same session.
//! - **Send**: [`Session::send`] enqueues finalized byte regions under a
//!   short lock; the caller that finds no transmit in flight arms one. The
//!   transmit task drains everything queued into one vectored write, reports
//!   the completion, and chains another pass if the queue refilled meanwhile,
//!   so buffers never starve while the socket stays busy and FIFO order is
//!   preserved end to end.
//! - **Disconnect**: an atomic flag flip. Exactly one caller wins, runs
//!   `on_disconnected`, clears queued sends, wakes the receive task, and
//!   sends FIN. Everyone else returns immediately.
//!
//! Any transport error, peer close, or protocol violation resolves to
//! `disconnect`; nothing propagates out of the I/O tasks.

use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, error, trace, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::error::SessionError;
use crate::recv_buffer::RecvBuffer;

/// Receive buffer capacity: the maximum frame a 2-byte length prefix can
/// declare, so any single frame fits contiguously.
pub const RECV_BUFFER_SIZE: usize = 65535;

/// Callbacks a session owner implements to observe and react to connection
/// events. Every callback receives the session handle, so handlers can call
/// [`Session::send`] or [`Session::disconnect`] from inside any event.
///
/// Callbacks run on runtime worker threads, never on a thread dedicated to
/// the session; implementations must be `Send + Sync` and keep their own
/// state behind interior mutability (or behind a [`JobQueue`](crate::JobQueue)).
pub trait SessionHandler: Send + Sync + 'static {
    /// The connection is established and the receive loop is armed.
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr);

    /// Bytes arrived. `data` is the entire unread region; the return value
    /// is how many leading bytes were consumed. Returning more than
    /// `data.len()` or an error disconnects the session.
    fn on_recv(&self, session: &Arc<Session>, data: &[u8]) -> Result<usize, SessionError>;

    /// A transmit completed; `bytes` is the total transferred in that pass.
    fn on_send(&self, session: &Arc<Session>, bytes: usize);

    /// The session is terminating. Called exactly once per session, before
    /// the socket is released, no matter how many places requested the
    /// disconnect.
    fn on_disconnected(&self, session: &Arc<Session>, peer: SocketAddr);
}

struct SendState {
    /// Regions awaiting transmission, in enqueue order.
    queue: VecDeque<Bytes>,
    /// True while a transmit task is in flight.
    sending: bool,
}

/// One live (or terminating) TCP connection.
pub struct Session {
    peer: SocketAddr,
    handler: Arc<dyn SessionHandler>,
    /// One-way flip: false = active, true = disconnected.
    disconnected: AtomicBool,
    send_state: Mutex<SendState>,
    /// Held only by the single in-flight transmit pass and by the final
    /// FIN; the `sending` flag keeps it uncontended.
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    /// Wakes the receive task out of a blocked read on local disconnect.
    recv_wake: Notify,
}

impl Session {
    /// Binds a freshly connected stream to a new session and arms the first
    /// receive. Construction and start are one step, so a session can never
    /// exist half-started. Must run inside a tokio runtime.
    ///
    /// Callers (listener, connector) invoke the handler's `on_connected`
    /// after this returns.
    pub fn start(
        socket: TcpStream,
        handler: Arc<dyn SessionHandler>,
    ) -> io::Result<Arc<Session>> {
        let peer = socket.peer_addr()?;
        // Frames are small and latency-bound; never wait for coalescing.
        if let Err(e) = socket.set_nodelay(true) {
            debug!("session {}: failed to set TCP_NODELAY: {}", peer, e);
        }
        let (read_half, write_half) = socket.into_split();

        let session = Arc::new(Session {
            peer,
            handler,
            disconnected: AtomicBool::new(false),
            send_state: Mutex::new(SendState {
                queue: VecDeque::new(),
                sending: false,
            }),
            writer: tokio::sync::Mutex::new(write_half),
            recv_wake: Notify::new(),
        });

        tokio::spawn(Self::recv_loop(Arc::clone(&session), read_half));
        Ok(session)
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// True once the session has begun (or finished) terminating.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Enqueues one region for transmission. See [`send_many`](Self::send_many).
    pub fn send(self: &Arc<Self>, buf: Bytes) {
        self.send_many(std::iter::once(buf));
    }

    /// Enqueues regions for transmission in iteration order and, if no
    /// transmit is currently in flight, arms one covering everything queued.
    ///
    /// Callable from any thread. Enqueue-and-maybe-arm is atomic with
    /// respect to other senders and to the transmit task, so the peer
    /// observes exactly the concatenation of enqueued regions in enqueue
    /// order.
    pub fn send_many(self: &Arc<Self>, bufs: impl IntoIterator<Item = Bytes>) {
        if self.is_disconnected() {
            return;
        }

        let arm = {
            let mut state = self.send_state.lock();
            let mut queued_any = false;
            for buf in bufs {
                if buf.is_empty() {
                    continue;
                }
                state.queue.push_back(buf);
                queued_any = true;
            }
            if !queued_any || state.sending {
                false
            } else {
                state.sending = true;
                true
            }
        };

        if arm {
            tokio::spawn(Self::send_loop(Arc::clone(self)));
        }
    }

    /// Requests termination. Idempotent and safe under arbitrary
    /// concurrency: only the one caller that flips the flag runs the
    /// teardown (`on_disconnected`, queued-send clear, receive-task wake,
    /// graceful FIN); all others return with no side effects.
    pub fn disconnect(self: &Arc<Self>) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("session {}: disconnecting", self.peer);
        self.handler.on_disconnected(self, self.peer);

        self.send_state.lock().queue.clear();
        self.recv_wake.notify_one();

        // FIN after whatever transmit pass still holds the writer finishes.
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut writer = session.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                trace!("session {}: shutdown after disconnect: {}", session.peer, e);
            }
        });
    }

    /// Receive pipeline. `reader` and the buffer stay owned by this task,
    /// which is what makes "at most one receive in flight" structural.
    async fn recv_loop(session: Arc<Session>, mut reader: OwnedReadHalf) {
        let mut buffer = RecvBuffer::new(RECV_BUFFER_SIZE);

        loop {
            if session.is_disconnected() {
                break;
            }

            // Reclaim consumed space before arming the next read.
            buffer.clean();

            let read = tokio::select! {
                read = reader.read(buffer.write_segment()) => read,
                _ = session.recv_wake.notified() => break,
            };

            let n = match read {
                Ok(0) => {
                    debug!("session {}: peer closed the connection", session.peer);
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!("session {}: read failed: {}", session.peer, e);
                    break;
                }
            };

            // Defensive bound: a completion larger than the free region
            // means the transport and buffer disagree about reality.
            if !buffer.on_write(n) {
                error!(
                    "session {}: {}",
                    session.peer,
                    SessionError::BufferOverflow {
                        got: n,
                        free: buffer.free_size(),
                    }
                );
                break;
            }

            let consumed = match session.handler.on_recv(&session, buffer.read_segment()) {
                Ok(consumed) => consumed,
                Err(e) => {
                    warn!("session {}: receive handler failed: {}", session.peer, e);
                    break;
                }
            };

            // A handler consuming more than it was shown is a framing bug.
            if !buffer.on_read(consumed) {
                error!(
                    "session {}: {}",
                    session.peer,
                    SessionError::BadConsume {
                        consumed,
                        available: buffer.data_size(),
                    }
                );
                break;
            }
        }

        session.disconnect();
    }

    /// Transmit pipeline: one pass per vectored write, chained while the
    /// queue keeps refilling. At most one of these tasks exists per session
    /// (the `sending` flag), which is the single-in-flight-send invariant.
    async fn send_loop(session: Arc<Session>) {
        loop {
            if session.is_disconnected() {
                session.send_state.lock().sending = false;
                return;
            }

            // Move everything queued so far into this pass's pending list.
            let pending: Vec<Bytes> = {
                let mut state = session.send_state.lock();
                state.queue.drain(..).collect()
            };
            if pending.is_empty() {
                // Disconnect cleared the queue under us.
                session.send_state.lock().sending = false;
                return;
            }

            let total: usize = pending.iter().map(Bytes::len).sum();
            let result = {
                let mut writer = session.writer.lock().await;
                write_all_vectored(&mut *writer, &pending).await
            };

            match result {
                Ok(()) => {
                    trace!(
                        "session {}: transmitted {} bytes in {} region(s)",
                        session.peer,
                        total,
                        pending.len()
                    );
                    session.handler.on_send(&session, total);

                    let mut state = session.send_state.lock();
                    if state.queue.is_empty() {
                        state.sending = false;
                        return;
                    }
                    // More arrived while transmitting; chain another pass.
                }
                Err(e) => {
                    warn!("session {}: send failed: {}", session.peer, e);
                    session.send_state.lock().sending = false;
                    session.disconnect();
                    return;
                }
            }
        }
    }
}

/// Writes every region completely, as few syscalls as the transport allows.
/// `write_vectored` may accept any prefix of the scattered bytes, so the
/// slice list is rebuilt past the already-written point on each attempt.
async fn write_all_vectored<W>(writer: &mut W, bufs: &[Bytes]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut skip = 0; // regions fully written
    let mut offset = 0; // bytes written within bufs[skip]

    while skip < bufs.len() {
        let mut slices = Vec::with_capacity(bufs.len() - skip);
        slices.push(IoSlice::new(&bufs[skip][offset..]));
        for buf in &bufs[skip + 1..] {
            slices.push(IoSlice::new(buf));
        }

        let mut written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "transport accepted zero bytes",
            ));
        }

        while written > 0 {
            let remaining = bufs[skip].len() - offset;
            if written >= remaining {
                written -= remaining;
                skip += 1;
                offset = 0;
                if skip == bufs.len() {
                    break;
                }
            } else {
                offset += written;
                written = 0;
            }
        }
    }
    Ok(())
}
