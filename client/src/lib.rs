//! Interactive chat client for the duochat relay.
//!
//! [`client::Client`] joins over a [`link`] implementation ([`tcp_link`] or
//! [`udp_link`]) and then runs the session: a spawned task prints what the
//! server relays while the caller's task reads user input.

pub mod types;

// transport
pub mod link;
pub mod tcp_link;
pub mod udp_link;

// io
pub mod display;
pub mod input_reader;

// session
pub mod client;

pub use client::Client;
pub use types::{ClientError, SessionEnd};
