use log::debug;
use shared::{EntityId, EntityKind, EntityState, InputState, Orb, PlayerId, PlayerStat, FRAME_DT};
use std::collections::{BTreeMap, HashMap};

/// Distance between predicted and confirmed position that forces a rollback.
pub const RECONCILIATION_THRESHOLD: f32 = 5.0;

/// Upper bound of unacknowledged inputs kept for replay.
const MAX_INPUT_HISTORY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub kills: u16,
    pub deaths: u16,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub player: PlayerId,
    pub body: Orb,
    pub health: u8,
}

/// Client mirror of the server's game state.
///
/// Remote entities are dead-reckoned between snapshots. The local orb is
/// predicted from our own input and reconciled whenever a snapshot tells us
/// which inputs the server has processed.
pub struct GameSession {
    players: BTreeMap<PlayerId, PlayerInfo>,
    entities: HashMap<EntityId, Entity>,
    local_player: Option<PlayerId>,
    predicted: Option<Orb>,
    input_history: Vec<(u32, InputState)>,
    last_tick: u32,
    time: f64,
}

impl GameSession {
    pub fn new() -> Self {
        Self {
            players: BTreeMap::new(),
            entities: HashMap::new(),
            local_player: None,
            predicted: None,
            input_history: Vec::new(),
            last_tick: 0,
            time: 0.0,
        }
    }

    pub fn add_player(&mut self, id: PlayerId, name: String) {
        self.players.insert(
            id,
            PlayerInfo {
                id,
                name,
                kills: 0,
                deaths: 0,
            },
        );
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<PlayerInfo> {
        self.players.remove(&id)
    }

    /// Returns the previous name if the player exists and the name changed.
    pub fn rename_player(&mut self, id: PlayerId, name: String) -> Option<String> {
        let player = self.players.get_mut(&id)?;
        if player.name == name {
            return None;
        }
        Some(std::mem::replace(&mut player.name, name))
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerInfo> {
        self.players.get(&id)
    }

    pub fn player_name(&self, id: PlayerId) -> String {
        self.players
            .get(&id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("player {}", id))
    }

    /// Players in id order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerInfo> {
        self.players.values()
    }

    pub fn apply_stats(&mut self, stats: &[PlayerStat]) {
        for stat in stats {
            if let Some(player) = self.players.get_mut(&stat.player) {
                player.kills = stat.kills;
                player.deaths = stat.deaths;
            }
        }
    }

    pub fn set_local_player(&mut self, id: PlayerId) {
        self.local_player = Some(id);
    }

    pub fn local_player(&self) -> Option<PlayerId> {
        self.local_player
    }

    pub fn add_entity(&mut self, id: EntityId, player: PlayerId, kind: EntityKind) {
        self.entities.insert(
            id,
            Entity {
                id,
                kind,
                player,
                body: Orb::default(),
                health: 0,
            },
        );
    }

    pub fn remove_entity(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.remove(&id) {
            if self.is_local_orb(&entity) {
                self.predicted = None;
                self.input_history.clear();
            }
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    fn is_local_orb(&self, entity: &Entity) -> bool {
        entity.kind == EntityKind::Orb && Some(entity.player) == self.local_player
    }

    /// The local player's orb as last confirmed by the server.
    pub fn local_entity(&self) -> Option<&Entity> {
        self.entities.values().find(|e| self.is_local_orb(e))
    }

    /// Predicted position of the local orb.
    pub fn predicted_orb(&self) -> Option<Orb> {
        self.predicted
    }

    pub fn last_tick(&self) -> u32 {
        self.last_tick
    }

    /// Seconds of session time since synchronization.
    pub fn elapsed_time(&self) -> f64 {
        self.time
    }

    pub fn apply_update(
        &mut self,
        tick: u32,
        last_processed_input: u32,
        entities: &[EntityState],
    ) {
        let local_id = self.local_entity().map(|entity| entity.id);
        let carries_local_orb = entities
            .iter()
            .any(|state| Some(state.entity) == local_id);

        for state in entities {
            if let Some(entity) = self.entities.get_mut(&state.entity) {
                entity.body = Orb {
                    x: state.x,
                    y: state.y,
                    vel_x: state.vel_x,
                    vel_y: state.vel_y,
                };
                entity.health = state.health;
            }
        }
        self.last_tick = self.last_tick.max(tick);

        // Chunks without the local orb say nothing about our prediction.
        if carries_local_orb {
            self.perform_reconciliation(last_processed_input);
        }
    }

    fn perform_reconciliation(&mut self, last_processed_input: u32) {
        self.input_history
            .retain(|(sequence, _)| *sequence > last_processed_input);

        let confirmed = match self.local_entity() {
            Some(entity) => entity.body,
            None => {
                self.predicted = None;
                return;
            }
        };

        let needs_rollback = match self.predicted {
            Some(predicted) => {
                let distance = predicted.distance_to(&confirmed);
                if distance > RECONCILIATION_THRESHOLD {
                    debug!("Rollback needed! Distance: {:.2}", distance);
                    true
                } else {
                    false
                }
            }
            None => true,
        };

        if needs_rollback {
            let mut replayed = confirmed;
            for (_, input) in &self.input_history {
                replayed.apply_input(input, FRAME_DT);
            }
            self.predicted = Some(replayed);
        }
    }

    /// Advances the local orb by one frame of `input` and remembers the
    /// input for replay until the server confirms it.
    pub fn apply_prediction(&mut self, sequence: u32, input: &InputState) {
        let Some(orb) = self.predicted.as_mut() else {
            return;
        };
        orb.apply_input(input, FRAME_DT);

        self.input_history.push((sequence, *input));
        if self.input_history.len() > MAX_INPUT_HISTORY {
            self.input_history.remove(0);
        }
    }

    /// Moves session time forward and extrapolates every remote entity.
    pub fn update_client(&mut self, elapsed: f64) {
        self.time += elapsed;

        let dt = elapsed as f32;
        let local_player = self.local_player;
        for entity in self.entities.values_mut() {
            let local = entity.kind == EntityKind::Orb && Some(entity.player) == local_player;
            if !local {
                entity.body.integrate(dt);
            }
        }
    }

    /// Entities as they should be drawn: the local orb at its predicted
    /// position, everything else as extrapolated.
    pub fn render_entities(&self) -> Vec<Entity> {
        self.entities
            .values()
            .map(|entity| {
                let mut entity = entity.clone();
                if self.is_local_orb(&entity) {
                    if let Some(predicted) = self.predicted {
                        entity.body = predicted;
                    }
                }
                entity
            })
            .collect()
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}
