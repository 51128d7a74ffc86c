//! Datagram framing for session traffic.
//!
//! A datagram is a small header followed by a batch of sequenced messages.
//! Integers are fixed-width little-endian and strings length-prefixed; the
//! encoded size never exceeds `MAX_PACKET_SIZE`.

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::Message;
use crate::protocol::{APP_IDENTIFIER, MAX_PACKET_SIZE};

/// Encoded size of `PacketHeader` plus the length prefix of the message list.
pub const DATAGRAM_OVERHEAD: usize = 4 + 4 + 8;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode datagram: {0}")]
    Encode(bincode::Error),
    #[error("failed to decode datagram: {0}")]
    Decode(bincode::Error),
    #[error("datagram exceeds the maximum packet size")]
    PacketTooLarge,
    #[error("{message} message of {size} bytes does not fit into a datagram")]
    MessageTooLarge { message: &'static str, size: usize },
    #[error("datagram of {0} bytes is too short")]
    Truncated(usize),
    #[error("unexpected application identifier {0:#010x}")]
    InvalidAppIdentifier(u32),
    #[error("unsupported protocol revision {0}")]
    InvalidRevision(u8),
    #[error("server name is not valid UTF-8")]
    InvalidServerName,
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(MAX_PACKET_SIZE as u64)
}

fn is_size_limit(error: &bincode::Error) -> bool {
    matches!(error.as_ref(), bincode::ErrorKind::SizeLimit)
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub app_identifier: u32,
    /// Highest reliable sequence the sender has received in order.
    pub acknowledgement: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SequencedMessage {
    pub sequence: u32,
    pub message: Message,
}

impl SequencedMessage {
    pub fn encoded_size(&self) -> Result<usize, ProtocolError> {
        match wire_options().serialized_size(self) {
            Ok(size) => Ok(size as usize),
            Err(e) if is_size_limit(&e) => Err(ProtocolError::MessageTooLarge {
                message: self.message.name(),
                size: MAX_PACKET_SIZE + 1,
            }),
            Err(e) => Err(ProtocolError::Encode(e)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Datagram {
    pub header: PacketHeader,
    pub messages: Vec<SequencedMessage>,
}

impl Datagram {
    pub fn new(acknowledgement: u32) -> Self {
        Self {
            header: PacketHeader {
                app_identifier: APP_IDENTIFIER,
                acknowledgement,
            },
            messages: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        wire_options().serialize(self).map_err(|e| {
            if is_size_limit(&e) {
                ProtocolError::PacketTooLarge
            } else {
                ProtocolError::Encode(e)
            }
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < DATAGRAM_OVERHEAD {
            return Err(ProtocolError::Truncated(bytes.len()));
        }
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge);
        }

        let app_identifier = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if app_identifier != APP_IDENTIFIER {
            return Err(ProtocolError::InvalidAppIdentifier(app_identifier));
        }

        wire_options()
            .deserialize(bytes)
            .map_err(ProtocolError::Decode)
    }
}
