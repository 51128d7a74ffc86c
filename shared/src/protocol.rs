//! Protocol constants both sides have to agree on, and the string limits the
//! wire format imposes on player names and chat messages.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use thiserror::Error;

use crate::messages::PlayerId;

/// Identifies Orbs Havoc traffic; datagrams carrying anything else are dropped.
pub const APP_IDENTIFIER: u32 = 0xF270_87C5;
/// Bumped whenever the wire format changes incompatibly.
pub const REVISION: u8 = 4;

pub const MAX_PACKET_SIZE: usize = 1200;
pub const DEFAULT_SERVER_PORT: u16 = 32422;
pub const MULTICAST_GROUP: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 77, 88), 32423);

pub const SERVER_NAME_LENGTH: usize = 32;
pub const PLAYER_NAME_LENGTH: usize = 32;
pub const CHAT_MESSAGE_LENGTH: usize = 255;

pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DISCOVERY_FREQUENCY: Duration = Duration::from_secs(1);

/// How long the client waits for the server to accept or reject it.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Silence after which a connection is reported as lagging.
pub const LAG_THRESHOLD: Duration = Duration::from_secs(1);
/// Silence after which a connection is considered dead.
pub const DROP_TIMEOUT: Duration = Duration::from_secs(15);
/// Pause between tearing down a session and connecting again, so the server
/// processes the leave before the same client shows up again.
pub const RECONNECT_SETTLE_DELAY: Duration = Duration::from_millis(75);

pub const MAX_PLAYERS: usize = 8;
/// Reserved identity used for messages originating from the server itself.
pub const SERVER_PLAYER_ID: PlayerId = 0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} is {length} bytes long, the limit is {limit} bytes")]
    TooLong {
        field: &'static str,
        length: usize,
        limit: usize,
    },
}

fn check_length(field: &'static str, value: &str, limit: usize) -> Result<(), LimitError> {
    if value.trim().is_empty() {
        return Err(LimitError::Empty { field });
    }
    if value.len() > limit {
        return Err(LimitError::TooLong {
            field,
            length: value.len(),
            limit,
        });
    }
    Ok(())
}

pub fn check_player_name(name: &str) -> Result<(), LimitError> {
    check_length("player name", name, PLAYER_NAME_LENGTH)
}

pub fn check_chat_message(message: &str) -> Result<(), LimitError> {
    check_length("chat message", message, CHAT_MESSAGE_LENGTH)
}

/// Truncates `value` to at most `max` bytes without splitting a character.
pub fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
