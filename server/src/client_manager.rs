//! Client connection management and input queuing for the game server
//!
//! This module handles the server-side management of connected clients, including:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - One sequenced message channel per client
//! - Input reconstruction from the loss-tolerant history clients send
//! - Kill and death statistics shown on the scoreboard
//!
//! The client manager is the only place that maps network addresses to
//! player ids; everything else in the server works with ids.

use log::info;
use shared::{Channel, InputState, PlayerId, PlayerInput, PlayerStat, DROP_TIMEOUT};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected client and the state the server keeps for it
#[derive(Debug)]
pub struct Client {
    /// Player id assigned by the server, never `SERVER_PLAYER_ID`
    pub id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    pub name: String,
    /// Last time we received a valid datagram from this client
    pub last_seen: Instant,
    pub channel: Channel,
    /// Highest input sequence number applied to the simulation
    pub last_processed_input: u32,
    /// Reconstructed input frames waiting for the next tick, oldest first
    pub pending_inputs: Vec<(u32, InputState)>,
    pub kills: u16,
    pub deaths: u16,
}

impl Client {
    pub fn new(id: PlayerId, addr: SocketAddr, name: String, channel: Channel) -> Self {
        Self {
            id,
            addr,
            name,
            last_seen: Instant::now(),
            channel,
            last_processed_input: 0,
            pending_inputs: Vec::new(),
            kills: 0,
            deaths: 0,
        }
    }

    /// Queues every frame of `input` the server has not seen yet.
    ///
    /// Frames lost together with their datagram are recovered from the
    /// history of a later one; frames already queued or processed are skipped.
    pub fn add_input(&mut self, input: &PlayerInput) {
        let newest_known = self
            .pending_inputs
            .last()
            .map(|(sequence, _)| *sequence)
            .unwrap_or(0)
            .max(self.last_processed_input);

        self.pending_inputs
            .extend(input.states_after(newest_known));
    }

    /// Hands out the queued frames and records them as processed.
    pub fn take_inputs(&mut self) -> Vec<(u32, InputState)> {
        if let Some((sequence, _)) = self.pending_inputs.last() {
            self.last_processed_input = *sequence;
        }
        std::mem::take(&mut self.pending_inputs)
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    pub fn stat(&self) -> PlayerStat {
        PlayerStat {
            player: self.id,
            kills: self.kills,
            deaths: self.deaths,
        }
    }
}

/// Capacity-limited table of connected clients
pub struct ClientManager {
    clients: HashMap<PlayerId, Client>,
    /// Next available player id; 0 is reserved for the server
    next_client_id: PlayerId,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Adds a client that completed the connection request.
    ///
    /// Returns None if the server is at capacity. `channel` is the channel
    /// the request arrived on, so sequence numbers continue seamlessly.
    pub fn add_client(&mut self, addr: SocketAddr, name: String, channel: Channel) -> Option<PlayerId> {
        if self.is_full() {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} ('{}') connected from {}", client_id, name, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, name, channel));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &PlayerId) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} ('{}') disconnected", client.id, client.name);
        Some(client)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: PlayerId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: PlayerId) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    /// Clients in id order.
    pub fn clients(&self) -> Vec<&Client> {
        let mut clients: Vec<&Client> = self.clients.values().collect();
        clients.sort_by_key(|client| client.id);
        clients
    }

    pub fn clients_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.values_mut()
    }

    pub fn stats(&self) -> Vec<PlayerStat> {
        self.clients().into_iter().map(Client::stat).collect()
    }

    /// Removes and returns the ids of clients silent for longer than the
    /// drop timeout.
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        self.remove_silent_clients(DROP_TIMEOUT)
    }

    fn remove_silent_clients(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn add(manager: &mut ClientManager, addr: SocketAddr) -> Option<PlayerId> {
        manager.add_client(addr, "player".to_string(), Channel::new())
    }

    /// Builds the input a client sends at `sequence` when `forward` was
    /// held during the frames listed in `held`.
    fn input(sequence: u32, held: &[u32]) -> PlayerInput {
        let mut forward = 0u8;
        for frame in held {
            if *frame <= sequence && sequence - frame < 8 {
                forward |= 1 << (sequence - frame);
            }
        }
        PlayerInput {
            sequence,
            forward,
            ..Default::default()
        }
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr, "orb".to_string(), Channel::new());

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert_eq!(client.last_processed_input, 0);
        assert!(client.pending_inputs.is_empty());
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr(), "orb".to_string(), Channel::new());
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_client_ids_skip_server_id() {
        let mut manager = ClientManager::new(3);

        assert_eq!(add(&mut manager, test_addr()), Some(1));
        assert_eq!(add(&mut manager, test_addr2()), Some(2));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(add(&mut manager, test_addr()).is_some());
        assert!(manager.is_full());
        assert!(add(&mut manager, test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let client_id = add(&mut manager, test_addr()).unwrap();

        assert!(manager.remove_client(&client_id).is_some());
        assert!(manager.remove_client(&client_id).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let client_id1 = add(&mut manager, test_addr()).unwrap();
        add(&mut manager, test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));
        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_inputs_are_reconstructed_after_loss() {
        let mut client = Client::new(1, test_addr(), "orb".to_string(), Channel::new());

        client.add_input(&input(1, &[1]));
        // Inputs 2 and 3 were lost; input 4 still carries them.
        client.add_input(&input(4, &[1, 3, 4]));

        let frames: Vec<(u32, bool)> = client
            .take_inputs()
            .into_iter()
            .map(|(sequence, state)| (sequence, state.forward))
            .collect();
        assert_eq!(frames, vec![(1, true), (2, false), (3, true), (4, true)]);
        assert_eq!(client.last_processed_input, 4);
    }

    #[test]
    fn test_duplicate_and_stale_inputs_are_skipped() {
        let mut client = Client::new(1, test_addr(), "orb".to_string(), Channel::new());

        client.add_input(&input(2, &[]));
        client.take_inputs();
        client.add_input(&input(2, &[]));
        client.add_input(&input(1, &[]));
        assert!(client.pending_inputs.is_empty());

        client.add_input(&input(3, &[]));
        client.add_input(&input(3, &[]));
        assert_eq!(client.pending_inputs.len(), 1);
    }

    #[test]
    fn test_stats_are_ordered_by_id() {
        let mut manager = ClientManager::new(3);
        let first = add(&mut manager, test_addr()).unwrap();
        let second = add(&mut manager, test_addr2()).unwrap();
        manager.get_mut(second).unwrap().kills = 2;

        let stats = manager.stats();
        assert_eq!(stats[0].player, first);
        assert_eq!(stats[1].kills, 2);
    }

    #[test]
    fn test_silent_clients_are_removed() {
        let mut manager = ClientManager::new(2);
        let silent = add(&mut manager, test_addr()).unwrap();
        add(&mut manager, test_addr2()).unwrap();
        manager.get_mut(silent).unwrap().last_seen = Instant::now() - Duration::from_secs(2);

        assert_eq!(manager.remove_silent_clients(Duration::from_secs(1)), vec![silent]);
        assert_eq!(manager.len(), 1);
        assert!(manager.check_timeouts().is_empty());
    }
}
