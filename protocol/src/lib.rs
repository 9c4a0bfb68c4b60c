//! Shared wire vocabulary for the chat relay.
//!
//! Every message on the wire is a plain UTF-8 text unit of at most
//! [`MAX_UNIT_LEN`] bytes. On a datagram transport one datagram carries one
//! unit; on a byte stream units are delimited by `\n` (see [`ChatCodec`]).

use std::fmt;

mod codec;

pub use codec::{check_unit, ChatCodec, ProtocolError};

// hard limit of one read buffer / datagram
pub const MAX_UNIT_LEN: usize = 1024;

pub const WELCOME: &str = "Welcome";
pub const NAME_TAKEN: &str = "Name already taken";
pub const SHUTDOWN: &str = "server-shutdown";

// leave request sent over a stream connection
pub const EXIT: &str = "exit";

// datagram join request prefix, e.g. "join:alice"
pub const JOIN_PREFIX: &str = "join:";

/// Server generated line fanned out to participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Joined(String),
    Left(String),
    Chat { name: String, text: String },
    Shutdown,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Joined(name) => write!(f, "User {} joined", name),
            Event::Left(name) => write!(f, "User {} left", name),
            Event::Chat { name, text } => write!(f, "{}: {}", name, text),
            Event::Shutdown => f.write_str(SHUTDOWN),
        }
    }
}

/// Reply to a join request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinReply {
    Welcome,
    Rejected(String),
}

impl JoinReply {
    pub fn parse(unit: &str) -> Self {
        if unit == WELCOME {
            JoinReply::Welcome
        } else {
            JoinReply::Rejected(unit.to_owned())
        }
    }
}

/// Classification of an inbound datagram before the sender is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    Join(&'a str),
    Line(&'a str),
}

impl<'a> Inbound<'a> {
    pub fn parse(payload: &'a str) -> Self {
        match payload.strip_prefix(JOIN_PREFIX) {
            Some(name) => Inbound::Join(name),
            None => Inbound::Line(payload),
        }
    }
}

pub fn join_request(name: &str) -> String {
    format!("{}{}", JOIN_PREFIX, name)
}

// A datagram participant leaves by sending its own name prefixed exit token.
// This collides with a chat line of the very same text, which is accepted.
pub fn datagram_exit(name: &str) -> String {
    format!("{}: {}", name, EXIT)
}

pub fn datagram_line(name: &str, text: &str) -> String {
    format!("{}: {}", name, text)
}
