//! Code shared by the Orbs Havoc client and server: the protocol contract,
//! the wire codecs, the reliable channel and the deterministic orb physics
//! both sides must agree on for prediction to work.

use serde::{Deserialize, Serialize};

pub mod channel;
pub mod codec;
pub mod discovery;
pub mod messages;
pub mod protocol;

pub use channel::Channel;
pub use codec::{Datagram, PacketHeader, ProtocolError, SequencedMessage};
pub use discovery::DiscoveryMessage;
pub use messages::{
    EntityId, EntityKind, EntityState, LeaveReason, Message, PlayerId, PlayerInput, PlayerStat,
    RejectReason,
};
pub use protocol::*;

pub const ARENA_WIDTH: f32 = 1600.0;
pub const ARENA_HEIGHT: f32 = 1200.0;
pub const ORB_RADIUS: f32 = 24.0;
pub const ORB_ACCELERATION: f32 = 1800.0;
pub const ORB_MAX_SPEED: f32 = 400.0;
pub const ORB_FRICTION: f32 = 6.0;
/// Speed multiplier while the secondary trigger is held.
pub const BOOST_FACTOR: f32 = 1.5;
/// Simulated time covered by a single input frame, on client and server alike.
pub const FRAME_DT: f32 = 1.0 / 60.0;

/// Trigger state of one input frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub forward: bool,
    pub backward: bool,
    pub strafe_left: bool,
    pub strafe_right: bool,
    pub fire_primary: bool,
    pub fire_secondary: bool,
    pub target_x: f32,
    pub target_y: f32,
}

impl InputState {
    /// All triggers released, still aiming at the given target.
    pub fn inactive(target_x: f32, target_y: f32) -> Self {
        Self {
            target_x,
            target_y,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.forward
            || self.backward
            || self.strafe_left
            || self.strafe_right
            || self.fire_primary
            || self.fire_secondary
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct Orb {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
}

impl Orb {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
        }
    }

    pub fn distance_to(&self, other: &Orb) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn speed(&self) -> f32 {
        (self.vel_x * self.vel_x + self.vel_y * self.vel_y).sqrt()
    }

    /// Applies one input frame: thrust relative to the aim direction, friction
    /// when no thrust is given, speed cap, then integration over `dt`.
    pub fn apply_input(&mut self, input: &InputState, dt: f32) {
        let (dir_x, mut dir_y) = normalize_vector(input.target_x - self.x, input.target_y - self.y);
        if dir_x == 0.0 && dir_y == 0.0 {
            dir_y = -1.0;
        }
        let (perp_x, perp_y) = (-dir_y, dir_x);

        let mut thrust_x = 0.0;
        let mut thrust_y = 0.0;
        if input.forward {
            thrust_x += dir_x;
            thrust_y += dir_y;
        }
        if input.backward {
            thrust_x -= dir_x;
            thrust_y -= dir_y;
        }
        if input.strafe_right {
            thrust_x += perp_x;
            thrust_y += perp_y;
        }
        if input.strafe_left {
            thrust_x -= perp_x;
            thrust_y -= perp_y;
        }

        let (thrust_x, thrust_y) = normalize_vector(thrust_x, thrust_y);
        if thrust_x == 0.0 && thrust_y == 0.0 {
            let damping = (1.0 - ORB_FRICTION * dt).max(0.0);
            self.vel_x *= damping;
            self.vel_y *= damping;
        } else {
            self.vel_x += thrust_x * ORB_ACCELERATION * dt;
            self.vel_y += thrust_y * ORB_ACCELERATION * dt;
        }

        let max_speed = if input.fire_secondary {
            ORB_MAX_SPEED * BOOST_FACTOR
        } else {
            ORB_MAX_SPEED
        };
        let speed = self.speed();
        if speed > max_speed {
            let scale = max_speed / speed;
            self.vel_x *= scale;
            self.vel_y *= scale;
        }

        self.integrate(dt);
    }

    /// Moves the orb along its velocity and keeps it inside the arena.
    pub fn integrate(&mut self, dt: f32) {
        self.x += self.vel_x * dt;
        self.y += self.vel_y * dt;
        self.clamp_to_arena();
    }

    fn clamp_to_arena(&mut self) {
        if self.x < ORB_RADIUS || self.x > ARENA_WIDTH - ORB_RADIUS {
            self.x = self.x.clamp(ORB_RADIUS, ARENA_WIDTH - ORB_RADIUS);
            self.vel_x = 0.0;
        }
        if self.y < ORB_RADIUS || self.y > ARENA_HEIGHT - ORB_RADIUS {
            self.y = self.y.clamp(ORB_RADIUS, ARENA_HEIGHT - ORB_RADIUS);
            self.vel_y = 0.0;
        }
    }
}

pub fn normalize_vector(x: f32, y: f32) -> (f32, f32) {
    let magnitude = (x * x + y * y).sqrt();
    if magnitude > 0.0 {
        (x / magnitude, y / magnitude)
    } else {
        (0.0, 0.0)
    }
}

pub fn check_collision(orb1: &Orb, orb2: &Orb) -> bool {
    orb1.distance_to(orb2) < ORB_RADIUS * 2.0
}

pub fn resolve_collision(orb1: &mut Orb, orb2: &mut Orb) {
    if !check_collision(orb1, orb2) {
        return;
    }

    let dx = orb2.x - orb1.x;
    let dy = orb2.y - orb1.y;
    let distance = (dx * dx + dy * dy).sqrt();

    if distance < 0.001 {
        orb1.x -= ORB_RADIUS;
        orb2.x += ORB_RADIUS;
        orb1.clamp_to_arena();
        orb2.clamp_to_arena();
        return;
    }

    let nx = dx / distance;
    let ny = dy / distance;
    let separation = (ORB_RADIUS * 2.0 - distance) / 2.0;

    orb1.x -= nx * separation;
    orb1.y -= ny * separation;
    orb2.x += nx * separation;
    orb2.y += ny * separation;

    orb1.clamp_to_arena();
    orb2.clamp_to_arena();

    let temp_vx = orb1.vel_x;
    let temp_vy = orb1.vel_y;
    orb1.vel_x = orb2.vel_x * 0.8;
    orb1.vel_y = orb2.vel_y * 0.8;
    orb2.vel_x = temp_vx * 0.8;
    orb2.vel_y = temp_vy * 0.8;
}
