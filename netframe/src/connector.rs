//! Outbound connection establishment.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::net::TcpStream;

use crate::error::SessionError;
use crate::listener::SessionFactory;
use crate::session::Session;

/// Retry policy for outbound connects.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Total connect attempts before giving up (at least 1).
    pub max_attempts: u32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Outbound counterpart of [`Listener`](crate::Listener): connects to a
/// target, then runs the identical construction sequence — factory →
/// [`Session::start`] → `on_connected`.
pub struct Connector {
    config: ConnectorConfig,
}

impl Connector {
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }

    /// Connects to `addr`, retrying up to the configured attempt count with
    /// the configured delay. Failure after the final attempt surfaces as
    /// [`SessionError::ConnectFailed`] carrying the last socket error.
    pub async fn connect(
        &self,
        addr: SocketAddr,
        factory: SessionFactory,
    ) -> Result<Arc<Session>, SessionError> {
        let attempts = self.config.max_attempts.max(1);

        let mut last_err = None;
        for attempt in 1..=attempts {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    let handler = factory();
                    let session = Session::start(stream, Arc::clone(&handler))?;
                    info!("connected to {} (attempt {})", addr, attempt);
                    handler.on_connected(&session, session.peer_addr());
                    return Ok(session);
                }
                Err(e) => {
                    warn!("connect to {} failed (attempt {}/{}): {}", addr, attempt, attempts, e);
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(SessionError::ConnectFailed {
            attempts,
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "no attempts made")
            }),
        })
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new(ConnectorConfig::default())
    }
}
