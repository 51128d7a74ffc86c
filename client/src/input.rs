//! Client input management with sequencing and loss-tolerant history

use shared::{InputState, PlayerId, PlayerInput};

/// Where the triggers of the current frame come from.
pub trait InputSource {
    fn sample(&self) -> InputState;
}

/// Source that never presses anything; used by the console client.
pub struct NeutralInput;

impl InputSource for NeutralInput {
    fn sample(&self) -> InputState {
        InputState::default()
    }
}

/// Turns per-frame trigger samples into sequenced `PlayerInput` messages
pub struct InputManager {
    player: PlayerId,
    next_sequence: u32,
    // Trigger history carried over from the previous frame
    history: PlayerInput,
}

impl InputManager {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            next_sequence: 1,
            history: PlayerInput::default(),
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Produces the input of the next frame. One is produced every frame;
    /// while the view is unfocused the frame is inactive but keeps aiming
    /// where it last did.
    pub fn update(&mut self, source: &dyn InputSource, focused: bool) -> PlayerInput {
        let state = if focused {
            source.sample()
        } else {
            InputState::inactive(self.history.target_x, self.history.target_y)
        };

        let push = |mask: u8, pressed: bool| (mask << 1) | pressed as u8;
        self.history = PlayerInput {
            sequence: self.next_sequence,
            forward: push(self.history.forward, state.forward),
            backward: push(self.history.backward, state.backward),
            strafe_left: push(self.history.strafe_left, state.strafe_left),
            strafe_right: push(self.history.strafe_right, state.strafe_right),
            fire_primary: push(self.history.fire_primary, state.fire_primary),
            fire_secondary: push(self.history.fire_secondary, state.fire_secondary),
            target_x: state.target_x,
            target_y: state.target_y,
        };
        self.next_sequence += 1;

        self.history
    }
}
