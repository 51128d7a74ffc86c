//! Applies server messages to the client's [`GameSession`].

use log::{debug, info, warn};
use shared::{LeaveReason, Message, PlayerId, SERVER_PLAYER_ID};
use std::fmt;

use crate::connection::MessageHandler;
use crate::error::NetworkError;
use crate::session::GameSession;

/// Something the player should read about in the event log.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PlayerJoined { name: String },
    PlayerLeft { name: String, reason: LeaveReason },
    NameChanged { old: String, new: String },
    Chat { name: String, message: String },
    Kill { killer: String, victim: String },
    Suicide { victim: String },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::PlayerJoined { name } => write!(f, "{} joined the game", name),
            SessionEvent::PlayerLeft {
                name,
                reason: LeaveReason::Quit,
            } => write!(f, "{} left the game", name),
            SessionEvent::PlayerLeft {
                name,
                reason: LeaveReason::Dropped,
            } => write!(f, "{} lost the connection", name),
            SessionEvent::NameChanged { old, new } => write!(f, "{} is now known as {}", old, new),
            SessionEvent::Chat { name, message } => write!(f, "{}: {}", name, message),
            SessionEvent::Kill { killer, victim } => write!(f, "{} killed {}", killer, victim),
            SessionEvent::Suicide { victim } => write!(f, "{} died", victim),
        }
    }
}

pub struct ClientLogic {
    session: GameSession,
    synced: bool,
    events: Vec<SessionEvent>,
}

impl ClientLogic {
    pub fn new() -> Self {
        Self {
            session: GameSession::new(),
            synced: false,
            events: Vec::new(),
        }
    }

    /// True once the server has sent the complete session state. Never
    /// reverts for the lifetime of the connection.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut GameSession {
        &mut self.session
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    fn on_kill(&mut self, killer: PlayerId, victim: PlayerId) {
        let victim = self.session.player_name(victim);
        let event = if killer == SERVER_PLAYER_ID {
            SessionEvent::Suicide { victim }
        } else {
            SessionEvent::Kill {
                killer: self.session.player_name(killer),
                victim,
            }
        };
        self.events.push(event);
    }
}

impl Default for ClientLogic {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for ClientLogic {
    fn on_message(&mut self, message: Message) -> Result<(), NetworkError> {
        match message {
            Message::PlayerJoin { player, name } => {
                debug!("Player {} joined as '{}'", player, name);
                self.session.add_player(player, name.clone());
                if self.synced {
                    self.events.push(SessionEvent::PlayerJoined { name });
                }
            }
            Message::PlayerLeave { player, reason } => {
                if let Some(info) = self.session.remove_player(player) {
                    self.events.push(SessionEvent::PlayerLeft {
                        name: info.name,
                        reason,
                    });
                }
            }
            Message::PlayerName { player, name } => {
                if let Some(old) = self.session.rename_player(player, name.clone()) {
                    self.events.push(SessionEvent::NameChanged { old, new: name });
                }
            }
            Message::PlayerChat { player, message } => {
                let name = self.session.player_name(player);
                self.events.push(SessionEvent::Chat { name, message });
            }
            Message::PlayerKill { killer, victim } => self.on_kill(killer, victim),
            Message::PlayerStats { stats } => self.session.apply_stats(&stats),
            Message::EntityAdd {
                entity,
                player,
                kind,
            } => self.session.add_entity(entity, player, kind),
            Message::EntityRemove { entity } => self.session.remove_entity(entity),
            Message::Update {
                tick,
                last_processed_input,
                entities,
            } => self
                .session
                .apply_update(tick, last_processed_input, &entities),
            Message::ClientSynced { player } => {
                if self.synced {
                    warn!("Ignoring repeated synchronization for player {}", player);
                } else if self.session.player(player).is_none() {
                    return Err(NetworkError::Network(format!(
                        "server synchronized unknown player {}",
                        player
                    )));
                } else {
                    info!("Synchronized with server as player {}", player);
                    self.session.set_local_player(player);
                    self.synced = true;
                    // Lines from before synchronization are never shown.
                    self.events.clear();
                }
            }
            other => warn!("Unexpected {} message from server", other.name()),
        }
        Ok(())
    }
}
