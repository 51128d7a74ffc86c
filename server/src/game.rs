use log::{debug, info};
use rand::Rng;
use shared::{
    normalize_vector, resolve_collision, EntityId, EntityKind, EntityState, InputState, Orb,
    PlayerId, ARENA_HEIGHT, ARENA_WIDTH, ORB_RADIUS,
};
use std::collections::HashMap;

pub const MAX_HEALTH: u8 = 100;
pub const BULLET_RADIUS: f32 = 4.0;
pub const BULLET_SPEED: f32 = 900.0;
pub const BULLET_LIFETIME: f32 = 1.5;
pub const BULLET_DAMAGE: u8 = 25;
pub const FIRE_COOLDOWN: f32 = 0.25;
pub const RESPAWN_DELAY: f32 = 2.0;

/// Changes clients have to be told about reliably.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    EntityAdded {
        entity: EntityId,
        player: PlayerId,
        kind: EntityKind,
    },
    EntityRemoved {
        entity: EntityId,
    },
    Kill {
        killer: PlayerId,
        victim: PlayerId,
    },
}

#[derive(Debug, Clone)]
struct PlayerOrb {
    id: EntityId,
    body: Orb,
    health: u8,
    cooldown: f32,
}

#[derive(Debug, Clone)]
struct Bullet {
    id: EntityId,
    owner: PlayerId,
    body: Orb,
    remaining: f32,
}

/// Authoritative simulation of orbs and bullets.
#[derive(Debug)]
pub struct GameState {
    pub tick: u32,
    next_entity_id: EntityId,
    orbs: HashMap<PlayerId, PlayerOrb>,
    bullets: Vec<Bullet>,
    respawns: HashMap<PlayerId, f32>,
    events: Vec<GameEvent>,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            next_entity_id: 1,
            orbs: HashMap::new(),
            bullets: Vec::new(),
            respawns: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn add_player(&mut self, player: PlayerId) {
        self.spawn_orb(player);
    }

    pub fn remove_player(&mut self, player: &PlayerId) {
        self.respawns.remove(player);
        if let Some(orb) = self.orbs.remove(player) {
            self.events.push(GameEvent::EntityRemoved { entity: orb.id });
        }
        info!("Removed player {}", player);
    }

    fn allocate_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    fn spawn_orb(&mut self, player: PlayerId) {
        let margin = ORB_RADIUS * 4.0;
        let mut rng = rand::thread_rng();
        let body = Orb::new(
            rng.gen_range(margin..ARENA_WIDTH - margin),
            rng.gen_range(margin..ARENA_HEIGHT - margin),
        );

        let id = self.allocate_entity_id();
        info!("Spawned orb {} for player {} at ({:.0}, {:.0})", id, player, body.x, body.y);
        self.orbs.insert(
            player,
            PlayerOrb {
                id,
                body,
                health: MAX_HEALTH,
                cooldown: 0.0,
            },
        );
        self.events.push(GameEvent::EntityAdded {
            entity: id,
            player,
            kind: EntityKind::Orb,
        });
    }

    /// Applies one input frame of `player`. Orbs move only through their
    /// inputs, exactly as the client predicts them.
    pub fn apply_input(&mut self, player: PlayerId, input: &InputState, dt: f32) {
        let Some(orb) = self.orbs.get_mut(&player) else {
            return;
        };

        orb.body.apply_input(input, dt);
        orb.cooldown = (orb.cooldown - dt).max(0.0);
        if !input.fire_primary || orb.cooldown > 0.0 {
            return;
        }
        orb.cooldown = FIRE_COOLDOWN;

        let (mut dir_x, mut dir_y) =
            normalize_vector(input.target_x - orb.body.x, input.target_y - orb.body.y);
        if dir_x == 0.0 && dir_y == 0.0 {
            (dir_x, dir_y) = (0.0, -1.0);
        }
        let offset = ORB_RADIUS + BULLET_RADIUS + 1.0;
        let body = Orb {
            x: orb.body.x + dir_x * offset,
            y: orb.body.y + dir_y * offset,
            vel_x: dir_x * BULLET_SPEED,
            vel_y: dir_y * BULLET_SPEED,
        };

        let id = self.allocate_entity_id();
        self.bullets.push(Bullet {
            id,
            owner: player,
            body,
            remaining: BULLET_LIFETIME,
        });
        self.events.push(GameEvent::EntityAdded {
            entity: id,
            player,
            kind: EntityKind::Bullet,
        });
    }

    /// Advances bullets, hits, respawns and orb collisions by `dt`.
    pub fn update_physics(&mut self, dt: f32) {
        self.update_bullets(dt);
        self.update_respawns(dt);
        self.handle_collisions();
    }

    fn update_bullets(&mut self, dt: f32) {
        let mut expired = Vec::new();
        let mut hits = Vec::new();

        for bullet in &mut self.bullets {
            bullet.body.x += bullet.body.vel_x * dt;
            bullet.body.y += bullet.body.vel_y * dt;
            bullet.remaining -= dt;

            let outside = bullet.body.x < 0.0
                || bullet.body.x > ARENA_WIDTH
                || bullet.body.y < 0.0
                || bullet.body.y > ARENA_HEIGHT;
            if outside || bullet.remaining <= 0.0 {
                expired.push(bullet.id);
                continue;
            }

            let target = self.orbs.iter().find(|(player, orb)| {
                **player != bullet.owner
                    && orb.body.distance_to(&bullet.body) < ORB_RADIUS + BULLET_RADIUS
            });
            if let Some((victim, _)) = target {
                hits.push((bullet.owner, *victim));
                expired.push(bullet.id);
            }
        }

        self.bullets.retain(|bullet| !expired.contains(&bullet.id));
        for entity in expired {
            self.events.push(GameEvent::EntityRemoved { entity });
        }

        for (killer, victim) in hits {
            self.damage(killer, victim);
        }
    }

    fn damage(&mut self, killer: PlayerId, victim: PlayerId) {
        let Some(orb) = self.orbs.get_mut(&victim) else {
            return;
        };
        orb.health = orb.health.saturating_sub(BULLET_DAMAGE);
        debug!("Player {} hit player {}, health {}", killer, victim, orb.health);
        if orb.health > 0 {
            return;
        }

        let entity = orb.id;
        self.orbs.remove(&victim);
        self.respawns.insert(victim, RESPAWN_DELAY);
        self.events.push(GameEvent::EntityRemoved { entity });
        self.events.push(GameEvent::Kill { killer, victim });
        info!("Player {} killed player {}", killer, victim);
    }

    fn update_respawns(&mut self, dt: f32) {
        let mut ready = Vec::new();
        for (player, remaining) in self.respawns.iter_mut() {
            *remaining -= dt;
            if *remaining <= 0.0 {
                ready.push(*player);
            }
        }

        for player in ready {
            self.respawns.remove(&player);
            self.spawn_orb(player);
        }
    }

    fn handle_collisions(&mut self) {
        let players: Vec<PlayerId> = self.orbs.keys().cloned().collect();

        for i in 0..players.len() {
            for j in (i + 1)..players.len() {
                let (Some(first), Some(second)) =
                    (self.orbs.get(&players[i]), self.orbs.get(&players[j]))
                else {
                    continue;
                };

                let mut first = first.body;
                let mut second = second.body;
                resolve_collision(&mut first, &mut second);

                if let Some(orb) = self.orbs.get_mut(&players[i]) {
                    orb.body = first;
                }
                if let Some(orb) = self.orbs.get_mut(&players[j]) {
                    orb.body = second;
                }
            }
        }
    }

    /// Every entity as (entity, owner, kind), for clients joining mid-game.
    pub fn entities(&self) -> Vec<(EntityId, PlayerId, EntityKind)> {
        let orbs = self
            .orbs
            .iter()
            .map(|(player, orb)| (orb.id, *player, EntityKind::Orb));
        let bullets = self
            .bullets
            .iter()
            .map(|bullet| (bullet.id, bullet.owner, EntityKind::Bullet));
        orbs.chain(bullets).collect()
    }

    pub fn snapshot(&self) -> Vec<EntityState> {
        let orbs = self.orbs.values().map(|orb| state(orb.id, &orb.body, orb.health));
        let bullets = self
            .bullets
            .iter()
            .map(|bullet| state(bullet.id, &bullet.body, 0));
        orbs.chain(bullets).collect()
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn orb_of(&self, player: PlayerId) -> Option<(EntityId, Orb, u8)> {
        self.orbs
            .get(&player)
            .map(|orb| (orb.id, orb.body, orb.health))
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

fn state(entity: EntityId, body: &Orb, health: u8) -> EntityState {
    EntityState {
        entity,
        x: body.x,
        y: body.y,
        vel_x: body.vel_x,
        vel_y: body.vel_y,
        health,
    }
}
