//! Client end of a game session's network link.
//!
//! A `Connection` never blocks and never runs on its own: the game view
//! calls [`Connection::dispatch_received_messages`] and
//! [`Connection::send_queued_messages`] once per frame. Any error returned
//! from either is terminal; the connection enters `Faulted` and stays there.

use log::{debug, info, warn};
use shared::{
    Channel, Message, RejectReason, DROP_TIMEOUT, LAG_THRESHOLD, MAX_PACKET_SIZE,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::error::NetworkError;
use crate::transport::Transport;

/// Receives the session messages a connection dispatches.
pub trait MessageHandler {
    fn on_message(&mut self, message: Message) -> Result<(), NetworkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Faulted,
}

pub struct Connection {
    transport: Box<dyn Transport>,
    remote_endpoint: SocketAddr,
    channel: Channel,
    state: ConnectionState,
    created_at: Instant,
    last_received: Instant,
    connect_timeout: Duration,
}

impl Connection {
    pub fn create(transport: Box<dyn Transport>, remote_endpoint: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            transport,
            remote_endpoint,
            channel: Channel::new(),
            state: ConnectionState::Connecting,
            created_at: now,
            last_received: now,
            connect_timeout: shared::CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn remote_endpoint(&self) -> SocketAddr {
        self.remote_endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Queues a message for the next call to `send_queued_messages`.
    /// Nothing is written to the network here.
    pub fn enqueue_message(&mut self, message: Message) -> Result<(), NetworkError> {
        self.ensure_usable()?;
        self.channel.enqueue(message).map_err(NetworkError::from)
    }

    /// Writes every queued message, pending retransmissions and the current
    /// acknowledgement to the server.
    pub fn send_queued_messages(&mut self) -> Result<(), NetworkError> {
        self.ensure_usable()?;

        let datagrams = match self.channel.flush() {
            Ok(datagrams) => datagrams,
            Err(e) => return Err(self.fault(e.into())),
        };

        for datagram in datagrams {
            if let Err(e) = self
                .transport
                .send_datagram(&datagram, self.remote_endpoint)
            {
                return Err(self.fault(e.into()));
            }
        }
        Ok(())
    }

    /// Drains the socket and hands every deliverable message to `handler`,
    /// then checks the liveness of the link.
    pub fn dispatch_received_messages(
        &mut self,
        handler: &mut dyn MessageHandler,
    ) -> Result<(), NetworkError> {
        self.ensure_usable()?;

        // One spare byte so oversized datagrams are detected instead of truncated.
        let mut buffer = [0u8; MAX_PACKET_SIZE + 1];
        loop {
            let (len, sender) = match self.transport.receive_datagram(&mut buffer) {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) => return Err(self.fault(e.into())),
            };

            if sender != self.remote_endpoint {
                warn!("Ignoring datagram from unexpected endpoint {}", sender);
                continue;
            }

            let messages = match self.channel.receive(&buffer[..len]) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("Dropping malformed datagram from {}: {}", sender, e);
                    continue;
                }
            };
            self.last_received = Instant::now();

            for message in messages {
                if let Err(e) = self.dispatch(message, handler) {
                    return Err(self.fault(e));
                }
            }
        }

        match self.check_liveness() {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fault(e)),
        }
    }

    fn dispatch(
        &mut self,
        message: Message,
        handler: &mut dyn MessageHandler,
    ) -> Result<(), NetworkError> {
        match message {
            Message::ClientRejected {
                reason: RejectReason::Full,
            } => Err(NetworkError::ServerFull),
            Message::ClientRejected {
                reason: RejectReason::VersionMismatch,
            } => Err(NetworkError::ProtocolMismatch),
            Message::Disconnect => Err(NetworkError::ServerQuit),
            message => {
                if self.state == ConnectionState::Connecting {
                    info!("Connection to {} established", self.remote_endpoint);
                    self.state = ConnectionState::Connected;
                }
                handler.on_message(message)
            }
        }
    }

    fn check_liveness(&self) -> Result<(), NetworkError> {
        match self.state {
            ConnectionState::Connecting if self.created_at.elapsed() > self.connect_timeout => {
                Err(NetworkError::ConnectionTimeout)
            }
            ConnectionState::Connected if self.last_received.elapsed() > DROP_TIMEOUT => {
                Err(NetworkError::ConnectionDropped)
            }
            _ => Ok(()),
        }
    }

    /// True once the server has been silent for longer than the lag threshold.
    pub fn is_lagging(&self) -> bool {
        self.state == ConnectionState::Connected && self.last_received.elapsed() > LAG_THRESHOLD
    }

    /// Milliseconds left until the link is considered dropped.
    pub fn time_to_drop(&self) -> u64 {
        DROP_TIMEOUT
            .saturating_sub(self.last_received.elapsed())
            .as_millis() as u64
    }

    /// Tells the server we are leaving, best effort, and closes the socket.
    pub fn disconnect(mut self) {
        if self.state == ConnectionState::Faulted {
            return;
        }
        let farewell = self
            .channel
            .enqueue(Message::Disconnect)
            .map_err(NetworkError::from)
            .and_then(|_| self.send_queued_messages());
        if let Err(e) = farewell {
            debug!("Could not notify {} of disconnect: {}", self.remote_endpoint, e);
        }
        info!("Connection to {} closed", self.remote_endpoint);
    }

    fn ensure_usable(&self) -> Result<(), NetworkError> {
        if self.state == ConnectionState::Faulted {
            return Err(NetworkError::Network(
                "the connection has already failed".to_string(),
            ));
        }
        Ok(())
    }

    fn fault(&mut self, error: NetworkError) -> NetworkError {
        warn!("Connection to {} faulted: {}", self.remote_endpoint, error);
        self.state = ConnectionState::Faulted;
        error
    }
}
