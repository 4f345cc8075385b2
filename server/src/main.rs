use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use log::info;
use netframe::{Listener, ListenerConfig, SessionFactory};
use server::manager::SessionManager;
use server::room::GameRoom;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Main-method of the application.
/// Parses command-line arguments, binds the listener and drives the room
/// flush interval until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8888")]
        port: u16,
        /// Broadcast flush interval in milliseconds
        #[clap(short, long, default_value = "250")]
        flush_interval: u64,
    }

    let args = Args::parse();

    let room = GameRoom::new();
    let manager = SessionManager::new();

    // Every accepted connection gets its own packet-framed handler.
    let factory: SessionFactory = {
        let room = Arc::clone(&room);
        let manager = Arc::clone(&manager);
        Arc::new(move || manager.generate(&room))
    };

    let address: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = Listener::bind(address, factory, ListenerConfig::default())?;
    info!("chat server listening on {}", listener.local_addr());

    // Broadcasts accumulate in the room and leave in batches on this cadence.
    let flush_handle = {
        let room = Arc::clone(&room);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(args.flush_interval));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let room_job = Arc::clone(&room);
                room.push(move || room_job.flush());
            }
        })
    };

    tokio::select! {
        result = flush_handle => {
            if let Err(e) = result {
                eprintln!("Flush task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
