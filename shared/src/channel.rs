//! Sequenced message channel on top of unreliable datagrams.
//!
//! Reliable messages are numbered consecutively, retransmitted until the peer
//! acknowledges them and delivered strictly in order. Unreliable messages use
//! their own counter and are delivered only if newer than anything seen
//! before; stale ones are dropped.

use log::debug;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::codec::{Datagram, ProtocolError, SequencedMessage, DATAGRAM_OVERHEAD};
use crate::messages::Message;
use crate::protocol::MAX_PACKET_SIZE;

/// Minimum time between two transmissions of the same reliable message.
pub const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct PendingReliable {
    sequenced: SequencedMessage,
    last_sent: Instant,
}

#[derive(Debug)]
pub struct Channel {
    next_reliable_sequence: u32,
    next_unreliable_sequence: u32,
    /// Reliable messages sent at least once and not yet acknowledged.
    unacknowledged: VecDeque<PendingReliable>,
    /// Messages waiting for their first transmission, in enqueue order.
    queued: Vec<SequencedMessage>,
    last_reliable_received: u32,
    last_unreliable_received: u32,
}

impl Channel {
    pub fn new() -> Self {
        Self {
            next_reliable_sequence: 1,
            next_unreliable_sequence: 1,
            unacknowledged: VecDeque::new(),
            queued: Vec::new(),
            last_reliable_received: 0,
            last_unreliable_received: 0,
        }
    }

    /// Queues a message for the next flush. Fails only if the message could
    /// never fit into a datagram.
    pub fn enqueue(&mut self, message: Message) -> Result<(), ProtocolError> {
        let counter = if message.is_reliable() {
            &mut self.next_reliable_sequence
        } else {
            &mut self.next_unreliable_sequence
        };
        let sequenced = SequencedMessage {
            sequence: *counter,
            message,
        };

        let size = sequenced.encoded_size()?;
        if DATAGRAM_OVERHEAD + size > MAX_PACKET_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                message: sequenced.message.name(),
                size,
            });
        }

        *counter += 1;
        self.queued.push(sequenced);
        Ok(())
    }

    /// Encodes everything due for transmission: reliable messages whose
    /// retransmission interval elapsed, then all newly queued messages.
    /// Always yields at least one datagram so acknowledgements keep flowing.
    pub fn flush(&mut self) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let now = Instant::now();
        let mut batch = Vec::new();

        for pending in self.unacknowledged.iter_mut() {
            if now.duration_since(pending.last_sent) >= RETRANSMIT_INTERVAL {
                pending.last_sent = now;
                batch.push(pending.sequenced.clone());
            }
        }

        for sequenced in self.queued.drain(..) {
            if sequenced.message.is_reliable() {
                self.unacknowledged.push_back(PendingReliable {
                    sequenced: sequenced.clone(),
                    last_sent: now,
                });
            }
            batch.push(sequenced);
        }

        self.pack(batch)
    }

    fn pack(&self, batch: Vec<SequencedMessage>) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let mut datagrams = Vec::new();
        let mut current = Datagram::new(self.last_reliable_received);
        let mut size = DATAGRAM_OVERHEAD;

        for sequenced in batch {
            let message_size = sequenced.encoded_size()?;
            if size + message_size > MAX_PACKET_SIZE && !current.messages.is_empty() {
                datagrams.push(current.encode()?);
                current = Datagram::new(self.last_reliable_received);
                size = DATAGRAM_OVERHEAD;
            }
            size += message_size;
            current.messages.push(sequenced);
        }

        datagrams.push(current.encode()?);
        Ok(datagrams)
    }

    /// Decodes a datagram from the peer and returns the messages that are
    /// due for delivery, in the order they appear on the wire.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Vec<Message>, ProtocolError> {
        let datagram = Datagram::decode(bytes)?;
        self.acknowledge(datagram.header.acknowledgement);

        let mut delivered = Vec::new();
        for SequencedMessage { sequence, message } in datagram.messages {
            if message.is_reliable() {
                if sequence == self.last_reliable_received + 1 {
                    self.last_reliable_received = sequence;
                    delivered.push(message);
                } else if sequence > self.last_reliable_received {
                    debug!(
                        "Reliable message {} arrived before {}, awaiting retransmission",
                        sequence,
                        self.last_reliable_received + 1
                    );
                }
            } else if sequence > self.last_unreliable_received {
                self.last_unreliable_received = sequence;
                delivered.push(message);
            }
        }

        Ok(delivered)
    }

    fn acknowledge(&mut self, acknowledgement: u32) {
        while self
            .unacknowledged
            .front()
            .is_some_and(|pending| pending.sequenced.sequence <= acknowledgement)
        {
            self.unacknowledged.pop_front();
        }
    }

    /// Reliable messages that are queued or still awaiting acknowledgement.
    pub fn pending_reliable(&self) -> usize {
        self.unacknowledged.len()
            + self
                .queued
                .iter()
                .filter(|s| s.message.is_reliable())
                .count()
    }

    pub fn last_reliable_received(&self) -> u32 {
        self.last_reliable_received
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}
