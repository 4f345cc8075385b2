//! Inbound connection acceptance.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::net::{TcpListener, TcpSocket};

use crate::session::{Session, SessionHandler};

/// Constructs the handler for each new connection. One handler instance per
/// session; the factory decides the concrete type.
pub type SessionFactory = Arc<dyn Fn() -> Arc<dyn SessionHandler> + Send + Sync>;

/// Acceptance tuning knobs.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Number of accept operations kept outstanding at all times.
    pub concurrent_accepts: usize,
    /// Kernel accept-queue depth.
    pub backlog: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            concurrent_accepts: 10,
            backlog: 100,
        }
    }
}

/// Accepts inbound connections and turns each into a started [`Session`].
///
/// Each accepted socket goes through the same sequence the connector uses:
/// factory → `Session::start` → `on_connected`. A failed accept is logged
/// and its slot re-arms; the listener survives transient accept errors.
pub struct Listener {
    local_addr: SocketAddr,
}

impl Listener {
    /// Binds `addr`, starts listening with the configured backlog, and arms
    /// the configured number of concurrent accept tasks. Must run inside a
    /// tokio runtime. Bind/listen failures surface to the caller.
    pub fn bind(
        addr: SocketAddr,
        factory: SessionFactory,
        config: ListenerConfig,
    ) -> io::Result<Listener> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        // Restarts would otherwise trip over sockets in TIME_WAIT.
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = Arc::new(socket.listen(config.backlog)?);
        let local_addr = listener.local_addr()?;

        info!(
            "listening on {} ({} concurrent accepts, backlog {})",
            local_addr, config.concurrent_accepts, config.backlog
        );

        for slot in 0..config.concurrent_accepts {
            let listener = Arc::clone(&listener);
            let factory = Arc::clone(&factory);
            tokio::spawn(accept_loop(listener, factory, slot));
        }

        Ok(Listener { local_addr })
    }

    /// The bound address; useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// One accept slot: accept, start a session, re-arm. Runs forever.
async fn accept_loop(listener: Arc<TcpListener>, factory: SessionFactory, slot: usize) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let handler = factory();
                match Session::start(stream, Arc::clone(&handler)) {
                    Ok(session) => {
                        info!("accepted connection from {}", peer);
                        handler.on_connected(&session, peer);
                    }
                    Err(e) => {
                        warn!("failed to start session for {}: {}", peer, e);
                    }
                }
            }
            Err(e) => {
                // Transient (EMFILE, aborted handshake): keep the slot alive.
                warn!("accept failed on slot {}: {}", slot, e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpStream;

    struct Counting {
        connected: AtomicUsize,
    }

    impl SessionHandler for Counting {
        fn on_connected(&self, _s: &Arc<Session>, _p: SocketAddr) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        fn on_recv(&self, _s: &Arc<Session>, data: &[u8]) -> Result<usize, SessionError> {
            Ok(data.len())
        }
        fn on_send(&self, _s: &Arc<Session>, _b: usize) {}
        fn on_disconnected(&self, _s: &Arc<Session>, _p: SocketAddr) {}
    }

    #[tokio::test]
    async fn test_listener_accepts_many_connections() {
        let counting = Arc::new(Counting {
            connected: AtomicUsize::new(0),
        });
        let factory: SessionFactory = {
            let counting = Arc::clone(&counting);
            Arc::new(move || Arc::clone(&counting) as Arc<dyn SessionHandler>)
        };

        let listener = Listener::bind(
            "127.0.0.1:0".parse().unwrap(),
            factory,
            ListenerConfig::default(),
        )
        .unwrap();

        let mut clients = Vec::new();
        for _ in 0..20 {
            clients.push(TcpStream::connect(listener.local_addr()).await.unwrap());
        }

        for _ in 0..500 {
            if counting.connected.load(Ordering::SeqCst) == 20 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "only {} of 20 connections were accepted",
            counting.connected.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_bind_conflict_surfaces_error() {
        let factory: SessionFactory = Arc::new(|| {
            Arc::new(Counting {
                connected: AtomicUsize::new(0),
            }) as Arc<dyn SessionHandler>
        });

        let first = Listener::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&factory),
            ListenerConfig::default(),
        )
        .unwrap();

        // Second listener on the same port must fail at bind/listen time.
        let result = std::net::TcpListener::bind(first.local_addr());
        assert!(result.is_err());
    }
}
