//! Client-side packet handling.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{info, warn};
use netframe::{PacketHandler, Session};
use protocol::{packet_id, PacketId, ServerChat};

/// Handler for one connection to the chat server. Decodes broadcasts and
/// counts them; the binary reads the counter for its summary line.
pub struct ServerSession {
    received: AtomicU64,
}

impl ServerSession {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
        }
    }

    /// Broadcasts decoded so far on this connection.
    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl Default for ServerSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketHandler for ServerSession {
    fn on_connected(&self, _session: &Arc<Session>, peer: SocketAddr) {
        info!("connected to {}", peer);
    }

    fn on_recv_packet(&self, session: &Arc<Session>, frame: &[u8]) {
        match packet_id(frame).and_then(PacketId::from_u16) {
            Some(PacketId::ServerChat) => match ServerChat::decode(frame) {
                Ok(packet) => {
                    self.received.fetch_add(1, Ordering::Relaxed);
                    info!("player {}: {}", packet.player_id, packet.chat);
                }
                Err(e) => {
                    warn!("malformed broadcast from server: {}", e);
                    session.disconnect();
                }
            },
            _ => {
                warn!("unexpected packet from server");
                session.disconnect();
            }
        }
    }

    fn on_disconnected(&self, _session: &Arc<Session>, peer: SocketAddr) {
        info!(
            "disconnected from {} after {} broadcast(s)",
            peer,
            self.received_count()
        );
    }
}
