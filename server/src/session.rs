//! Per-connection packet handling for the chat server.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use netframe::{PacketHandler, Session};
use protocol::{packet_id, ClientChat, PacketId};

use crate::manager::SessionManager;
use crate::room::GameRoom;

/// One connected player. I/O callbacks arrive here; anything that touches
/// room state is forwarded to the room's job queue.
pub struct ClientSession {
    id: u64,
    room: Arc<GameRoom>,
    manager: Arc<SessionManager>,
}

impl ClientSession {
    pub fn new(id: u64, room: Arc<GameRoom>, manager: Arc<SessionManager>) -> Self {
        Self { id, room, manager }
    }
}

impl PacketHandler for ClientSession {
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr) {
        info!("player {} connected from {}", self.id, peer);
        self.manager.add(self.id);
        let room = Arc::clone(&self.room);
        let id = self.id;
        let session = Arc::clone(session);
        self.room.push(move || room.enter(id, session));
    }

    fn on_recv_packet(&self, session: &Arc<Session>, frame: &[u8]) {
        match packet_id(frame).and_then(PacketId::from_u16) {
            Some(PacketId::ClientChat) => match ClientChat::decode(frame) {
                Ok(packet) => {
                    let room = Arc::clone(&self.room);
                    let id = self.id;
                    self.room.push(move || room.broadcast(id, &packet.chat));
                }
                Err(e) => {
                    warn!("player {} sent malformed chat: {}", self.id, e);
                    session.disconnect();
                }
            },
            Some(other) => {
                warn!("player {} sent server-only packet {:?}", self.id, other);
                session.disconnect();
            }
            None => {
                warn!("player {} sent unknown packet id", self.id);
                session.disconnect();
            }
        }
    }

    fn on_send(&self, _session: &Arc<Session>, bytes: usize) {
        debug!("player {}: transferred {} bytes", self.id, bytes);
    }

    fn on_disconnected(&self, _session: &Arc<Session>, peer: SocketAddr) {
        info!("player {} disconnected from {}", self.id, peer);
        self.manager.remove(self.id);
        let room = Arc::clone(&self.room);
        let id = self.id;
        self.room.push(move || room.leave(id));
    }
}
