//! The broadcast room actor.
//!
//! All room state lives behind a [`JobQueue`]: I/O callbacks never touch the
//! roster or the pending list directly, they push jobs, and the queue runs
//! them one at a time in arrival order. The mutex inside exists because Rust
//! cannot see that guarantee; it is uncontended by construction.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};
use netframe::{JobQueue, SendBuffer, Session};
use parking_lot::Mutex;
use protocol::ServerChat;

struct RoomState {
    /// Sessions currently in the room, by player id.
    sessions: HashMap<u64, Arc<Session>>,
    /// Broadcasts serialized since the last flush, in order.
    pending: Vec<Bytes>,
    /// Scratch space for packet serialization; owned by the room because
    /// the job queue serializes every use of it.
    send_buffer: SendBuffer,
}

/// A chat room that batches broadcasts and fans them out on flush.
///
/// Batching is the point: one flush hands the whole pending list to each
/// session as a single vectored send instead of one syscall per packet per
/// recipient. The flush cadence is the caller's business (the server main
/// pushes a flush job on a fixed interval).
pub struct GameRoom {
    jobs: JobQueue,
    state: Mutex<RoomState>,
}

impl GameRoom {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            jobs: JobQueue::new(),
            state: Mutex::new(RoomState {
                sessions: HashMap::new(),
                pending: Vec::new(),
                send_buffer: SendBuffer::new(),
            }),
        })
    }

    /// Schedules work against the room. Everything that mutates room state
    /// goes through here.
    pub fn push(&self, job: impl FnOnce() + Send + 'static) {
        self.jobs.push(job);
    }

    /// Adds a session to the roster. Run as a job.
    pub fn enter(&self, player_id: u64, session: Arc<Session>) {
        let mut state = self.state.lock();
        state.sessions.insert(player_id, session);
        debug!("player {} entered ({} in room)", player_id, state.sessions.len());
    }

    /// Removes a session from the roster. Run as a job.
    pub fn leave(&self, player_id: u64) {
        let mut state = self.state.lock();
        state.sessions.remove(&player_id);
        debug!("player {} left ({} in room)", player_id, state.sessions.len());
    }

    /// Serializes one chat broadcast and queues it for the next flush.
    /// Run as a job.
    pub fn broadcast(&self, player_id: u64, chat: &str) {
        let mut state = self.state.lock();
        let packet = ServerChat {
            player_id,
            chat: chat.to_string(),
        };
        match packet.encode(&mut state.send_buffer) {
            Ok(frame) => state.pending.push(frame),
            Err(e) => warn!("dropping broadcast from player {}: {}", player_id, e),
        }
    }

    /// Hands every pending broadcast to every session in one vectored send
    /// each. Run as a job.
    pub fn flush(&self) {
        let (pending, sessions) = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                return;
            }
            let pending = std::mem::take(&mut state.pending);
            let sessions: Vec<Arc<Session>> = state.sessions.values().cloned().collect();
            (pending, sessions)
        };

        for session in &sessions {
            // Bytes clones are refcount bumps; every recipient shares the
            // same serialized frames.
            session.send_many(pending.iter().cloned());
        }
        debug!(
            "flushed {} packet(s) to {} session(s)",
            pending.len(),
            sessions.len()
        );
    }

    /// Number of sessions currently in the room.
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Number of broadcasts waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}
