//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::game::{GameEvent, GameState};
use log::{debug, error, info, warn};
use shared::{
    check_chat_message, truncate_utf8, Channel, DiscoveryMessage, EntityState, LeaveReason,
    Message, PlayerId, RejectReason, DISCOVERY_FREQUENCY, FRAME_DT, MAX_PACKET_SIZE,
    MULTICAST_GROUP, PLAYER_NAME_LENGTH, REVISION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Entities per `Update` message; keeps every snapshot chunk inside one datagram.
pub const ENTITIES_PER_UPDATE: usize = 40;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    DatagramReceived { data: Vec<u8>, addr: SocketAddr },
    ClientTimeout { client_id: PlayerId },
    Shutdown,
}

/// Messages sent from game loop to the network sender task
#[derive(Debug)]
pub enum GameMessage {
    SendDatagram { data: Vec<u8>, addr: SocketAddr },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub tick_duration: Duration,
    pub max_clients: usize,
    /// Announce the server on the multicast discovery group.
    pub announce: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Orbs Havoc".to_string(),
            tick_duration: Duration::from_secs_f32(FRAME_DT),
            max_clients: shared::MAX_PLAYERS,
            announce: true,
        }
    }
}

/// Asks a running server to say goodbye to its clients and stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server '{}' listening on {}", config.name, socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            game_state: GameState::new(),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE + 1];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let message = ServerMessage::DatagramReceived {
                            data: buffer[..len].to_vec(),
                            addr,
                        };
                        if let Err(e) = server_tx.send(message) {
                            error!("Failed to send datagram to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing datagram queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(GameMessage::SendDatagram { data, addr }) = game_rx.recv().await {
                if let Err(e) = socket.send_to(&data, addr).await {
                    error!("Failed to send datagram to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// Spawns task that announces the server on the local network
    fn spawn_discovery_announcer(&self) -> Result<(), Box<dyn std::error::Error>> {
        let port = self.local_addr()?.port();
        let announcement = DiscoveryMessage::new(port, &self.config.name).encode()?;

        tokio::spawn(async move {
            let socket = match UdpSocket::bind("0.0.0.0:0").await {
                Ok(socket) => socket,
                Err(e) => {
                    error!("Discovery announcements disabled: {}", e);
                    return;
                }
            };
            let mut interval = tokio::time::interval(DISCOVERY_FREQUENCY);

            loop {
                interval.tick().await;
                if let Err(e) = socket.send_to(&announcement, MULTICAST_GROUP).await {
                    warn!("Failed to announce server: {}", e);
                }
            }
        });
        Ok(())
    }

    fn enqueue(clients: &mut ClientManager, client_id: PlayerId, message: Message) {
        if let Some(client) = clients.get_mut(client_id) {
            if let Err(e) = client.channel.enqueue(message) {
                error!("Dropping message for client {}: {}", client_id, e);
            }
        }
    }

    fn broadcast(clients: &mut ClientManager, message: &Message, exclude: Option<PlayerId>) {
        for client in clients.clients_mut() {
            if Some(client.id) == exclude {
                continue;
            }
            if let Err(e) = client.channel.enqueue(message.clone()) {
                error!("Dropping message for client {}: {}", client.id, e);
            }
        }
    }

    fn send_datagram(&self, data: Vec<u8>, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendDatagram { data, addr }) {
            error!("Failed to queue datagram for sending: {}", e);
        }
    }

    /// Routes a datagram to its client, or treats it as a connection request
    async fn handle_datagram(&mut self, data: Vec<u8>, addr: SocketAddr) {
        let client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };

        let Some(client_id) = client_id else {
            self.handle_connection_request(&data, addr).await;
            return;
        };

        let messages = {
            let mut clients = self.clients.write().await;
            let Some(client) = clients.get_mut(client_id) else {
                return;
            };
            match client.channel.receive(&data) {
                Ok(messages) => {
                    client.last_seen = Instant::now();
                    messages
                }
                Err(e) => {
                    warn!("Dropping malformed datagram from client {}: {}", client_id, e);
                    return;
                }
            }
        };

        for message in messages {
            self.handle_client_message(client_id, message).await;
        }
    }

    async fn handle_connection_request(&mut self, data: &[u8], addr: SocketAddr) {
        let mut channel = Channel::new();
        let messages = match channel.receive(data) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Ignoring datagram from unknown address {}: {}", addr, e);
                return;
            }
        };

        let Some((revision, player_name)) = messages.into_iter().find_map(|m| match m {
            Message::ClientConnect {
                revision,
                player_name,
            } => Some((revision, player_name)),
            _ => None,
        }) else {
            debug!("Ignoring datagram without connection request from {}", addr);
            return;
        };

        info!("Client connecting from {} (revision {})", addr, revision);

        if revision != REVISION {
            warn!("Rejecting {}: revision {} does not match {}", addr, revision, REVISION);
            self.reject(channel, RejectReason::VersionMismatch, addr);
            return;
        }

        let name = sanitize_name(&player_name);
        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr, name.clone(), channel)
        };
        let Some(client_id) = client_id else {
            warn!("Rejecting {}: server full", addr);
            self.reject(Channel::new(), RejectReason::Full, addr);
            return;
        };

        self.game_state.add_player(client_id);
        let events = self.game_state.take_events();

        let mut clients = self.clients.write().await;
        Self::broadcast(
            &mut clients,
            &Message::PlayerJoin {
                player: client_id,
                name,
            },
            Some(client_id),
        );
        self.dispatch_events(&mut clients, events, Some(client_id));

        // Complete session state, then the sync marker.
        let joins: Vec<Message> = clients
            .clients()
            .into_iter()
            .map(|client| Message::PlayerJoin {
                player: client.id,
                name: client.name.clone(),
            })
            .collect();
        for join in joins {
            Self::enqueue(&mut clients, client_id, join);
        }
        for (entity, player, kind) in self.game_state.entities() {
            Self::enqueue(
                &mut clients,
                client_id,
                Message::EntityAdd {
                    entity,
                    player,
                    kind,
                },
            );
        }
        let stats = clients.stats();
        Self::enqueue(&mut clients, client_id, Message::PlayerStats { stats });
        Self::enqueue(
            &mut clients,
            client_id,
            Message::ClientSynced { player: client_id },
        );
    }

    fn reject(&self, mut channel: Channel, reason: RejectReason, addr: SocketAddr) {
        if let Err(e) = channel.enqueue(Message::ClientRejected { reason }) {
            error!("Failed to build rejection for {}: {}", addr, e);
            return;
        }
        match channel.flush() {
            Ok(datagrams) => {
                for data in datagrams {
                    self.send_datagram(data, addr);
                }
            }
            Err(e) => error!("Failed to encode rejection for {}: {}", addr, e),
        }
    }

    async fn handle_client_message(&mut self, client_id: PlayerId, message: Message) {
        match message {
            Message::PlayerInput(input) => {
                let mut clients = self.clients.write().await;
                if let Some(client) = clients.get_mut(client_id) {
                    client.add_input(&input);
                }
            }

            Message::PlayerName { name, .. } => {
                let name = sanitize_name(&name);
                let mut clients = self.clients.write().await;
                let Some(client) = clients.get_mut(client_id) else {
                    return;
                };
                if client.name == name {
                    return;
                }
                info!("Client {} renamed from '{}' to '{}'", client_id, client.name, name);
                client.name = name.clone();
                Self::broadcast(
                    &mut clients,
                    &Message::PlayerName {
                        player: client_id,
                        name,
                    },
                    None,
                );
            }

            Message::PlayerChat { message, .. } => {
                if let Err(e) = check_chat_message(&message) {
                    warn!("Dropping chat from client {}: {}", client_id, e);
                    return;
                }
                let mut clients = self.clients.write().await;
                Self::broadcast(
                    &mut clients,
                    &Message::PlayerChat {
                        player: client_id,
                        message,
                    },
                    None,
                );
            }

            Message::Disconnect => {
                self.remove_client(client_id, LeaveReason::Quit).await;
            }

            Message::ClientConnect { .. } => {
                debug!("Client {} repeated its connection request", client_id);
            }

            other => {
                warn!("Unexpected {} message from client {}", other.name(), client_id);
            }
        }
    }

    async fn remove_client(&mut self, client_id: PlayerId, reason: LeaveReason) {
        self.game_state.remove_player(&client_id);
        let events = self.game_state.take_events();

        let mut clients = self.clients.write().await;
        clients.remove_client(&client_id);
        Self::broadcast(
            &mut clients,
            &Message::PlayerLeave {
                player: client_id,
                reason,
            },
            None,
        );
        self.dispatch_events(&mut clients, events, None);
    }

    fn dispatch_events(
        &self,
        clients: &mut ClientManager,
        events: Vec<GameEvent>,
        exclude: Option<PlayerId>,
    ) {
        let mut stats_changed = false;
        for event in events {
            let message = match event {
                GameEvent::EntityAdded {
                    entity,
                    player,
                    kind,
                } => Message::EntityAdd {
                    entity,
                    player,
                    kind,
                },
                GameEvent::EntityRemoved { entity } => Message::EntityRemove { entity },
                GameEvent::Kill { killer, victim } => {
                    if let Some(client) = clients.get_mut(killer) {
                        client.kills = client.kills.saturating_add(1);
                    }
                    if let Some(client) = clients.get_mut(victim) {
                        client.deaths = client.deaths.saturating_add(1);
                    }
                    stats_changed = true;
                    Message::PlayerKill { killer, victim }
                }
            };
            Self::broadcast(clients, &message, exclude);
        }

        if stats_changed {
            let stats = clients.stats();
            Self::broadcast(clients, &Message::PlayerStats { stats }, exclude);
        }
    }

    /// Applies queued inputs, advances the simulation and sends snapshots
    async fn tick(&mut self) {
        let dt = self.config.tick_duration.as_secs_f32();
        let mut clients = self.clients.write().await;

        for client in clients.clients_mut() {
            for (_, input) in client.take_inputs() {
                self.game_state.apply_input(client.id, &input, FRAME_DT);
            }
        }
        self.game_state.update_physics(dt);
        self.game_state.tick += 1;

        let events = self.game_state.take_events();
        self.dispatch_events(&mut clients, events, None);

        let ticks_per_second = (1.0 / dt).round().max(1.0) as u32;
        if self.game_state.tick % ticks_per_second == 0 && !clients.is_empty() {
            let stats = clients.stats();
            Self::broadcast(&mut clients, &Message::PlayerStats { stats }, None);
            debug!("Tick {}: {} clients", self.game_state.tick, clients.len());
        }

        let snapshot = self.game_state.snapshot();
        for client in clients.clients_mut() {
            for message in snapshot_messages(self.game_state.tick, client.last_processed_input, &snapshot) {
                if let Err(e) = client.channel.enqueue(message) {
                    error!("Dropping snapshot for client {}: {}", client.id, e);
                }
            }
        }

        let mut outgoing = Vec::new();
        for client in clients.clients_mut() {
            match client.channel.flush() {
                Ok(datagrams) => outgoing.extend(datagrams.into_iter().map(|d| (d, client.addr))),
                Err(e) => error!("Failed to encode datagrams for client {}: {}", client.id, e),
            }
        }
        drop(clients);

        for (data, addr) in outgoing {
            self.send_datagram(data, addr);
        }
    }

    /// Tells every client the session is over, bypassing the sender task so
    /// the goodbye is on the wire before we return.
    async fn shutdown(&mut self) {
        let mut clients = self.clients.write().await;
        Self::broadcast(&mut clients, &Message::Disconnect, None);

        for client in clients.clients_mut() {
            let datagrams = match client.channel.flush() {
                Ok(datagrams) => datagrams,
                Err(e) => {
                    error!("Failed to encode goodbye for client {}: {}", client.id, e);
                    continue;
                }
            };
            for data in datagrams {
                if let Err(e) = self.socket.send_to(&data, client.addr).await {
                    warn!("Failed to say goodbye to client {}: {}", client.id, e);
                }
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();
        if self.config.announce {
            self.spawn_discovery_announcer()?;
        }

        let mut tick_interval = interval(self.config.tick_duration);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::DatagramReceived { data, addr }) => {
                            self.handle_datagram(data, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.remove_client(client_id, LeaveReason::Dropped).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            self.shutdown().await;
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.tick().await;
                },
            }
        }

        Ok(())
    }
}

/// Trims a requested player name to something displayable.
pub fn sanitize_name(name: &str) -> String {
    let name = truncate_utf8(name.trim(), PLAYER_NAME_LENGTH).trim();
    if name.is_empty() {
        "Player".to_string()
    } else {
        name.to_string()
    }
}

/// Splits a snapshot into `Update` messages that each fit a datagram.
/// An empty snapshot still yields one message so the client keeps
/// receiving input acknowledgements.
pub fn snapshot_messages(tick: u32, last_processed_input: u32, snapshot: &[EntityState]) -> Vec<Message> {
    if snapshot.is_empty() {
        return vec![Message::Update {
            tick,
            last_processed_input,
            entities: Vec::new(),
        }];
    }

    snapshot
        .chunks(ENTITIES_PER_UPDATE)
        .map(|chunk| Message::Update {
            tick,
            last_processed_input,
            entities: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{codec::DATAGRAM_OVERHEAD, Datagram};

    fn entity(id: u32) -> EntityState {
        EntityState {
            entity: id,
            x: 1.0,
            y: 2.0,
            vel_x: 0.0,
            vel_y: 0.0,
            health: 100,
        }
    }

    #[test]
    fn test_empty_snapshot_still_produces_update() {
        let messages = snapshot_messages(5, 3, &[]);
        assert_eq!(
            messages,
            vec![Message::Update {
                tick: 5,
                last_processed_input: 3,
                entities: vec![]
            }]
        );
    }

    #[test]
    fn test_large_snapshots_are_chunked_to_fit_a_datagram() {
        let snapshot: Vec<EntityState> = (0..(ENTITIES_PER_UPDATE as u32 * 2 + 5)).map(entity).collect();
        let messages = snapshot_messages(1, 0, &snapshot);

        assert_eq!(messages.len(), 3);
        let mut channel = Channel::new();
        for message in messages {
            channel.enqueue(message).unwrap();
        }
        for datagram in channel.flush().unwrap() {
            assert!(datagram.len() <= MAX_PACKET_SIZE);
            assert!(datagram.len() > DATAGRAM_OVERHEAD);
            assert!(!Datagram::decode(&datagram).unwrap().messages.is_empty());
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Orbital "), "Orbital");
        assert_eq!(sanitize_name("   "), "Player");
        assert_eq!(sanitize_name(&"n".repeat(100)).len(), PLAYER_NAME_LENGTH);
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_clients, shared::MAX_PLAYERS);
        assert!(config.announce);
        assert!(config.tick_duration.as_millis() >= 16);
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let server = Server::new(
            "127.0.0.1:0",
            ServerConfig {
                announce: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_handle_stops_run() {
        let mut server = Server::new(
            "127.0.0.1:0",
            ServerConfig {
                announce: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        server.shutdown_handle().shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), server.run()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
