//! Plaza Server Library
//!
//! A real-time chatroom presence server for a shared 3D plaza, using
//! WebTransport. Tracks who is present, where they stand, and what
//! animation they are playing, and relays chat between them.

pub mod config;
pub mod net;
pub mod world;
