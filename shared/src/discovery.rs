//! LAN discovery announcements.
//!
//! Servers periodically multicast a fixed-size, big-endian record:
//!
//! ```text
//! u32 app_identifier | u8 revision | u16 server_port | [u8; SERVER_NAME_LENGTH] name
//! ```
//!
//! The name is UTF-8, padded with zero bytes.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::codec::ProtocolError;
use crate::protocol::{truncate_utf8, APP_IDENTIFIER, REVISION, SERVER_NAME_LENGTH};

pub const DISCOVERY_MESSAGE_SIZE: usize = 4 + 1 + 2 + SERVER_NAME_LENGTH;

#[derive(Serialize, Deserialize)]
struct WireAnnouncement {
    app_identifier: u32,
    revision: u8,
    port: u16,
    name: [u8; SERVER_NAME_LENGTH],
}

fn discovery_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryMessage {
    pub port: u16,
    pub server_name: String,
}

impl DiscoveryMessage {
    pub fn new(port: u16, server_name: &str) -> Self {
        Self {
            port,
            server_name: truncate_utf8(server_name, SERVER_NAME_LENGTH).to_string(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut name = [0u8; SERVER_NAME_LENGTH];
        let bytes = truncate_utf8(&self.server_name, SERVER_NAME_LENGTH).as_bytes();
        name[..bytes.len()].copy_from_slice(bytes);

        let wire = WireAnnouncement {
            app_identifier: APP_IDENTIFIER,
            revision: REVISION,
            port: self.port,
            name,
        };
        discovery_options()
            .serialize(&wire)
            .map_err(ProtocolError::Encode)
    }

    /// Parses an announcement; anything not produced by a compatible server
    /// is an error.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < DISCOVERY_MESSAGE_SIZE {
            return Err(ProtocolError::Truncated(bytes.len()));
        }

        let wire: WireAnnouncement = discovery_options()
            .deserialize(bytes)
            .map_err(ProtocolError::Decode)?;

        if wire.app_identifier != APP_IDENTIFIER {
            return Err(ProtocolError::InvalidAppIdentifier(wire.app_identifier));
        }
        if wire.revision != REVISION {
            return Err(ProtocolError::InvalidRevision(wire.revision));
        }

        let length = wire
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(SERVER_NAME_LENGTH);
        let server_name = std::str::from_utf8(&wire.name[..length])
            .map_err(|_| ProtocolError::InvalidServerName)?
            .to_string();

        Ok(Self {
            port: wire.port,
            server_name,
        })
    }
}
