//! Chat server built on the netframe session engine.
//!
//! Incoming connections get a [`session::ClientSession`] behind packet
//! framing. Chat packets are decoded on the I/O task and handed to the
//! single [`room::GameRoom`], which batches broadcasts and flushes them
//! on a fixed interval driven by the binary's main loop.

pub mod manager;
pub mod room;
pub mod session;
