//! # Orbs Havoc Client Library
//!
//! This library provides the client side of an Orbs Havoc game session: finding
//! servers on the local network, connecting to one, keeping a local mirror of
//! the game in sync with the server and sending the player's input back.
//!
//! ## Architecture Overview
//!
//! Everything runs on the main loop. Once per frame the [`game_view::GameView`]
//! drains the socket, applies the received messages, samples input and flushes
//! the outgoing queue. Nothing blocks and no other thread touches session
//! state; the console reader only enqueues [`commands::Command`]s.
//!
//! ### Synchronization
//! After the connection request the server streams its complete session state
//! (players, entities) and finishes with `ClientSynced`. Until then the client
//! only exchanges messages; afterwards it produces one input per frame.
//!
//! ### Client-Side Prediction
//! The local orb moves immediately with the player's input. Every snapshot
//! names the last input the server processed; if the confirmed position
//! diverges too far from the prediction, the unconfirmed inputs are replayed
//! on top of it.
//!
//! ### Fault Handling
//! Rejections, timeouts, server shutdown and socket failures surface as a
//! [`error::NetworkError`]. The game view catches them in one place, tears the
//! session down and shows a dialog; there is no automatic reconnect.
//!
//! ## Module Organization
//!
//! - `transport`: non-blocking datagram socket seam
//! - `connection`: reliable/unreliable message exchange with one server
//! - `logic` and `session`: message handling and the mirrored game state
//! - `input`: per-frame input sampling with loss-tolerant history
//! - `discovery`: multicast server announcements for the join menu
//! - `game_view`: session lifecycle and per-frame orchestration
//! - `ui`, `config`, `commands`: presentation seam, settings, console commands

pub mod commands;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod game_view;
pub mod input;
pub mod logic;
pub mod session;
pub mod transport;
pub mod ui;

#[cfg(test)]
mod test_support;
