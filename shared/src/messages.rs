//! Session messages exchanged between client and server.

use serde::{Deserialize, Serialize};

use crate::InputState;

pub type PlayerId = u32;
pub type EntityId = u32;

/// Number of frames a single `PlayerInput` covers.
pub const INPUT_HISTORY: u32 = 8;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Full,
    VersionMismatch,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    Quit,
    Dropped,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Orb,
    Bullet,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct EntityState {
    pub entity: EntityId,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub health: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PlayerStat {
    pub player: PlayerId,
    pub kills: u16,
    pub deaths: u16,
}

/// Input of frame `sequence` together with the seven frames before it.
///
/// Every trigger is a bitmask: bit 0 holds the state at `sequence`, bit `n`
/// the state at `sequence - n`. Input travels unreliably, so a lost datagram
/// is recovered from the history carried by any of the following seven.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct PlayerInput {
    pub sequence: u32,
    pub forward: u8,
    pub backward: u8,
    pub strafe_left: u8,
    pub strafe_right: u8,
    pub fire_primary: u8,
    pub fire_secondary: u8,
    pub target_x: f32,
    pub target_y: f32,
}

impl PlayerInput {
    /// Returns the input state `age` frames before `sequence`, if still covered.
    pub fn state_at(&self, age: u32) -> Option<InputState> {
        if age >= INPUT_HISTORY {
            return None;
        }
        let bit = |mask: u8| mask & (1 << age) != 0;
        Some(InputState {
            forward: bit(self.forward),
            backward: bit(self.backward),
            strafe_left: bit(self.strafe_left),
            strafe_right: bit(self.strafe_right),
            fire_primary: bit(self.fire_primary),
            fire_secondary: bit(self.fire_secondary),
            target_x: self.target_x,
            target_y: self.target_y,
        })
    }

    pub fn latest(&self) -> InputState {
        self.state_at(0).unwrap_or_default()
    }

    /// Reconstructs every frame newer than `last_processed` that the history
    /// still covers, oldest first.
    pub fn states_after(&self, last_processed: u32) -> Vec<(u32, InputState)> {
        if self.sequence <= last_processed {
            return Vec::new();
        }
        let oldest_covered = self.sequence.saturating_sub(INPUT_HISTORY - 1).max(1);
        let first = oldest_covered.max(last_processed + 1);

        (first..=self.sequence)
            .filter_map(|frame| {
                self.state_at(self.sequence - frame)
                    .map(|state| (frame, state))
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Message {
    // Client to server
    ClientConnect {
        revision: u8,
        player_name: String,
    },
    PlayerInput(PlayerInput),

    // Both directions
    PlayerName {
        player: PlayerId,
        name: String,
    },
    PlayerChat {
        player: PlayerId,
        message: String,
    },
    Disconnect,

    // Server to client
    ClientRejected {
        reason: RejectReason,
    },
    PlayerJoin {
        player: PlayerId,
        name: String,
    },
    PlayerLeave {
        player: PlayerId,
        reason: LeaveReason,
    },
    PlayerKill {
        killer: PlayerId,
        victim: PlayerId,
    },
    PlayerStats {
        stats: Vec<PlayerStat>,
    },
    EntityAdd {
        entity: EntityId,
        player: PlayerId,
        kind: EntityKind,
    },
    EntityRemove {
        entity: EntityId,
    },
    Update {
        tick: u32,
        last_processed_input: u32,
        entities: Vec<EntityState>,
    },
    ClientSynced {
        player: PlayerId,
    },
}

impl Message {
    /// Unreliable messages are superseded by newer ones of their kind, so
    /// retransmitting them would only deliver stale data.
    pub fn is_reliable(&self) -> bool {
        !matches!(self, Message::PlayerInput(_) | Message::Update { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::ClientConnect { .. } => "ClientConnect",
            Message::PlayerInput(_) => "PlayerInput",
            Message::PlayerName { .. } => "PlayerName",
            Message::PlayerChat { .. } => "PlayerChat",
            Message::Disconnect => "Disconnect",
            Message::ClientRejected { .. } => "ClientRejected",
            Message::PlayerJoin { .. } => "PlayerJoin",
            Message::PlayerLeave { .. } => "PlayerLeave",
            Message::PlayerKill { .. } => "PlayerKill",
            Message::PlayerStats { .. } => "PlayerStats",
            Message::EntityAdd { .. } => "EntityAdd",
            Message::EntityRemove { .. } => "EntityRemove",
            Message::Update { .. } => "Update",
            Message::ClientSynced { .. } => "ClientSynced",
        }
    }
}
