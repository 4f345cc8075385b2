//! Chat client for the netframe chat server.
//!
//! The binary opens a configurable number of sessions and sends random
//! chat lines on an interval; [`session::ServerSession`] logs and counts
//! the broadcasts coming back.

pub mod session;
