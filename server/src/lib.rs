//! # Orbs Havoc Server Library
//!
//! This library provides the authoritative dedicated server for Orbs Havoc.
//! It owns the canonical arena state, reconstructs client inputs from the
//! frame history they carry and streams events and snapshots back so every
//! client can predict its own orb and reconcile against the server.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Orbs move only through the input frames their players send, using the
//! same `Orb::apply_input` step the clients predict with. Bullets, damage,
//! kills and respawns are decided here alone.
//!
//! ### Session Management
//! Handles the complete lifecycle of a player session:
//! - Connection requests, accepted or rejected for a revision mismatch or a
//!   full server
//! - The join state (players, entities, statistics) followed by `ClientSynced`
//! - Name changes and chat, relayed to everyone
//! - Leaving players, whether they quit or went silent for too long
//!
//! ### State Broadcasting
//! Every tick each client receives the entity snapshot, split into as many
//! `Update` messages as needed to fit a datagram, tagged with the last input
//! frame the server applied for that client.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All network events and game updates are processed sequentially by one
//! loop. Helper tasks only move bytes and timers; they never touch game state.
//!
//! ### Sequenced Channels over UDP
//! Each client owns a `shared::Channel`. Reliable messages are retransmitted
//! until acknowledged and delivered in order; input and snapshots are
//! unreliable and superseded by newer ones.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! - Address to player id mapping and id assignment
//! - Per-client channel and reconstructed input queue
//! - Timeout detection
//! - Kill and death statistics
//!
//! ### Game Module (`game`)
//! - Player orbs, bullets and their lifetimes
//! - Fire cooldown, damage, kills and respawns
//! - Orb collision resolution
//! - Events describing entity churn and kills
//!
//! ### Network Module (`network`)
//! - UDP socket and helper tasks
//! - Connection handshake and session messages
//! - Tick loop, snapshot chunking and statistics
//! - Multicast discovery announcements and shutdown
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind the server with default settings: 60Hz ticks, eight players,
//!     // announcements on the local network
//!     let mut server = Server::new("0.0.0.0:32422", ServerConfig::default()).await?;
//!
//!     // Start the server - this runs the main game loop which:
//!     // - Accepts or rejects connection requests
//!     // - Reconstructs client inputs from their frame history
//!     // - Runs the simulation at the configured tick rate
//!     // - Sends every client the events and snapshots it needs
//!     // - Handles client timeouts and disconnections
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: Continuously listens for incoming datagrams
//! - **Network Sender**: Processes the outgoing datagram queue
//! - **Timeout Checker**: Monitors client health and removes silent clients
//! - **Discovery Announcer**: Advertises the server on the multicast group
//! - **Main Game Loop**: Processes inputs, runs the simulation, and sends state
//!
//! ## Trust Model
//!
//! Clients only ever send input triggers and an aim point; positions,
//! health and scores are computed by the server. Names and chat are
//! trimmed to their protocol limits before being relayed.

pub mod client_manager;
pub mod game;
pub mod network;
