//! # netframe
//!
//! An asynchronous TCP session framework for low-latency, high-connection-count
//! servers — the kind of engine a real-time multiplayer game sits on top of.
//!
//! ## What it provides
//!
//! ### Session Engine
//! [`Session`] owns one connection and drives its receive and send pipelines
//! on the tokio runtime: at most one receive and one send in flight per
//! session, vectored send-queue coalescing, and exactly-once disconnect
//! semantics no matter how many threads race to terminate.
//!
//! ### Packet Framing
//! [`PacketSession`] layers a length-prefixed framing protocol
//! (`[len u16 LE][payload]`) over the raw stream, reassembling fragmented
//! frames and splitting coalesced ones so [`PacketHandler`] implementations
//! only ever see whole packets.
//!
//! ### Connection Establishment
//! [`Listener`] keeps a fixed number of accepts outstanding and builds a
//! session per inbound connection through a caller-supplied factory;
//! [`Connector`] is its outbound mirror with bounded retry.
//!
//! ### Buffering
//! [`RecvBuffer`] is the per-session linear receive buffer with compaction;
//! [`SendBuffer`] amortizes outbound serialization by carving regions out of
//! large reusable chunks, handing them around as refcounted [`bytes::Bytes`].
//!
//! ### Concurrency Primitives
//! [`JobQueue`] serializes closures against shared state (the actor pattern
//! the demo room is built on); [`RwSpinLock`] is a recursive reader-writer
//! spinlock for the rare spot that needs shared reads under a short lock.
//!
//! ## Threading model
//!
//! All callbacks run on tokio worker threads — there is no thread pinned to
//! a session. Within one session, receives are sequential and sends are
//! FIFO; across sessions nothing is ordered. State shared between sessions
//! belongs behind a [`JobQueue`].
//!
//! ## Error model
//!
//! Transport errors and protocol violations terminate the offending session
//! via [`Session::disconnect`] and are logged; they never panic an I/O task
//! and never affect other sessions. Buffer-boundary violations are rejected
//! at the buffer API and escalated to a disconnect by the session.

pub mod connector;
pub mod error;
pub mod job_queue;
pub mod listener;
pub mod packet;
pub mod recv_buffer;
pub mod send_buffer;
pub mod session;
pub mod spinlock;

pub use connector::{Connector, ConnectorConfig};
pub use error::SessionError;
pub use job_queue::JobQueue;
pub use listener::{Listener, ListenerConfig, SessionFactory};
pub use packet::{extract_frames, PacketHandler, PacketSession, HEADER_SIZE};
pub use recv_buffer::RecvBuffer;
pub use send_buffer::{SendBuffer, SEND_CHUNK_SIZE};
pub use session::{Session, SessionHandler, RECV_BUFFER_SIZE};
pub use spinlock::RwSpinLock;
