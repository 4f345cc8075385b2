use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use client::session::ServerSession;
use log::{error, info};
use netframe::{Connector, ConnectorConfig, PacketSession, SendBuffer, Session};
use protocol::ClientChat;
use rand::seq::SliceRandom;
use tokio::time::{interval, Duration, MissedTickBehavior};

const CHAT_LINES: &[&str] = &[
    "hello there",
    "anyone around?",
    "ping",
    "nice weather on this server",
    "gg",
];

/// Main-method of the application.
/// Parses command-line arguments, opens the requested number of sessions
/// and chats on an interval until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to connect to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to connect to
        #[clap(short, long, default_value = "8888")]
        port: u16,
        /// Number of concurrent sessions to open
        #[clap(short, long, default_value = "1")]
        sessions: usize,
        /// Milliseconds between chat messages per session
        #[clap(short, long, default_value = "1000")]
        chat_interval: u64,
    }

    let args = Args::parse();
    let address: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let connector = Connector::new(ConnectorConfig::default());

    let mut chatters = Vec::with_capacity(args.sessions);
    for _ in 0..args.sessions {
        let session = connector
            .connect(
                address,
                Arc::new(|| {
                    Arc::new(PacketSession::new(ServerSession::new()))
                        as Arc<dyn netframe::SessionHandler>
                }),
            )
            .await?;
        chatters.push(tokio::spawn(chat_loop(session, args.chat_interval)));
    }
    info!(
        "{} session(s) chatting every {}ms",
        args.sessions, args.chat_interval
    );

    tokio::select! {
        _ = join_all(chatters) => {
            error!("all sessions ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

/// Sends a random chat line on each tick until the session disconnects.
async fn chat_loop(session: Arc<Session>, interval_ms: u64) {
    let mut send_buffer = SendBuffer::new();
    let mut ticker = interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !session.is_disconnected() {
        ticker.tick().await;
        let line = CHAT_LINES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("hello");
        let packet = ClientChat {
            chat: line.to_string(),
        };
        match packet.encode(&mut send_buffer) {
            Ok(frame) => session.send(frame),
            Err(e) => {
                error!("failed to encode chat: {}", e);
                break;
            }
        }
    }
}

/// Waits for every chat task to finish.
async fn join_all(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}
