//! Faults that end a game session.
//!
//! Every variant is caught exactly once, by `GameView::update`, which tears
//! the session down and shows the dialog returned by [`NetworkError::dialog`].

use shared::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("unable to resolve '{host}': {reason}")]
    AddressResolution { host: String, reason: String },
    #[error("the server did not respond in time")]
    ConnectionTimeout,
    #[error("the server is full")]
    ServerFull,
    #[error("the server uses an incompatible protocol revision")]
    ProtocolMismatch,
    #[error("the server has ended the game session")]
    ServerQuit,
    #[error("the connection to the server was lost")]
    ConnectionDropped,
    #[error("network error: {0}")]
    Network(String),
}

impl NetworkError {
    /// Title and text of the dialog presented for this fault. Only transport
    /// faults surface their underlying message.
    pub fn dialog(&self) -> (&'static str, String) {
        match self {
            NetworkError::AddressResolution { host, .. } => (
                "Connection Failed",
                format!("The host name '{}' could not be resolved.", host),
            ),
            NetworkError::ConnectionTimeout => (
                "Connection Failed",
                "The server did not respond to the connection request.".to_string(),
            ),
            NetworkError::ServerFull => (
                "Connection Rejected",
                "The server is full. Try again later.".to_string(),
            ),
            NetworkError::ProtocolMismatch => (
                "Connection Rejected",
                "The server uses an incompatible version of the game.".to_string(),
            ),
            NetworkError::ServerQuit => (
                "Server Shutdown",
                "The server has ended the game session.".to_string(),
            ),
            NetworkError::ConnectionDropped => (
                "Connection Lost",
                "The connection to the server was lost.".to_string(),
            ),
            NetworkError::Network(message) => ("Network Error", message.clone()),
        }
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(error: std::io::Error) -> Self {
        NetworkError::Network(error.to_string())
    }
}

impl From<ProtocolError> for NetworkError {
    fn from(error: ProtocolError) -> Self {
        NetworkError::Network(error.to_string())
    }
}
