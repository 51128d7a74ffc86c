//! Client configuration variables.
//!
//! A single `Cvars` value is created at start-up from the command line and
//! handed to [`GameView`](crate::game_view::GameView); nothing reads
//! configuration from global state.

use shared::{check_player_name, LimitError, CONNECT_TIMEOUT, DEFAULT_SERVER_PORT};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Cvars {
    player_name: String,
    /// Port used when a server address does not name one.
    pub default_port: u16,
    /// How long to wait for the server to accept the connection.
    pub connect_timeout: Duration,
}

impl Cvars {
    pub fn new(player_name: &str, default_port: u16) -> Result<Self, LimitError> {
        let mut cvars = Self {
            default_port,
            ..Self::default()
        };
        cvars.set_player_name(player_name)?;
        Ok(cvars)
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn set_player_name(&mut self, name: &str) -> Result<(), LimitError> {
        let name = name.trim();
        check_player_name(name)?;
        self.player_name = name.to_string();
        Ok(())
    }
}

impl Default for Cvars {
    fn default() -> Self {
        Self {
            player_name: "Player".to_string(),
            default_port: DEFAULT_SERVER_PORT,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}
