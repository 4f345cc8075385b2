//! Session bookkeeping: player id allocation and the live-session count.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use log::info;
use netframe::{PacketSession, SessionHandler};

use crate::room::GameRoom;
use crate::session::ClientSession;

/// Allocates player ids and tracks how many sessions are live.
pub struct SessionManager {
    next_id: AtomicU64,
    active: AtomicUsize,
}

impl SessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            active: AtomicUsize::new(0),
        })
    }

    /// Builds the handler for one incoming connection. Called by the
    /// listener's session factory, possibly from several accept tasks
    /// at once. The session is not counted live until its `on_connected`
    /// fires; a connection that dies before the session starts never
    /// touches the count.
    pub fn generate(self: &Arc<Self>, room: &Arc<GameRoom>) -> Arc<dyn SessionHandler> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!("allocated player {}", id);
        Arc::new(PacketSession::new(ClientSession::new(
            id,
            Arc::clone(room),
            Arc::clone(self),
        )))
    }

    /// Called once per session when its connection is established.
    pub fn add(&self, id: u64) {
        let count = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        info!("player {} live ({} active)", id, count);
    }

    /// Called once per session when it disconnects.
    pub fn remove(&self, id: u64) {
        let count = self.active.fetch_sub(1, Ordering::Relaxed) - 1;
        info!("released player {} ({} active)", id, count);
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}
